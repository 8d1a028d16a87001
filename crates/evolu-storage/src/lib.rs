//! Client-side history/projection storage: the driver collaborator contract,
//! an in-memory reference driver, table-naming rules, and the engine that
//! stamps, stores, and re-derives the fingerprint index for every mutation.

pub mod driver;
pub mod engine;
pub mod error;
pub mod schema;

pub use driver::{ExecResult, MemoryDriver, RowId, Statement, StorageDriver};
pub use engine::StorageEngine;
pub use error::{Result, StorageError};
pub use schema::{is_local_only, is_reserved, RESERVED_COLUMNS};
