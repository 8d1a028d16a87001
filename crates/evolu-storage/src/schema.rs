//! Table/column naming rules shared across the engine.

/// Columns the caller may never write directly; the engine manages them.
pub const RESERVED_COLUMNS: [&str; 4] = ["id", "createdAt", "updatedAt", "isDeleted"];

/// `_`-prefixed tables are local-only and never synced or fingerprinted.
pub fn is_local_only(table: &str) -> bool {
    table.starts_with('_')
}

/// Whether `column` is one of [`RESERVED_COLUMNS`].
pub fn is_reserved(column: &str) -> bool {
    RESERVED_COLUMNS.contains(&column)
}
