//! Configuration and error types shared between the CLI's subcommands.

pub mod config;
pub mod error;

pub use config::{Config, IndexDeclaration, TransportConfig};
pub use error::{CliError, Result};
