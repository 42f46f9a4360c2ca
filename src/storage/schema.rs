//! Database schema definitions

/// SQL to create the dags table
///
/// `metadata`, `nodes` and `edges` hold canonical JSON text.
pub const CREATE_DAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS dags (
    dag_id TEXT PRIMARY KEY,
    name TEXT,
    metadata TEXT,
    nodes TEXT,
    edges TEXT,
    created_at TEXT
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_dags_name ON dags(name)",
    "CREATE INDEX IF NOT EXISTS idx_dags_created_at ON dags(created_at)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_DAGS_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
