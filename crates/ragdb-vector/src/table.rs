//! LanceDB connection and housekeeping helpers.
use lancedb::{connect, Connection};

use arrow_array::RecordBatchIterator;
use std::sync::Arc;

pub async fn open_db(uri: &str) -> lancedb::Result<Connection> {
    connect(uri).execute().await
}

/// Creates an empty table with `schema` unless one named `name` exists.
pub async fn ensure_table(conn: &Connection, name: &str, schema: Arc<arrow_schema::Schema>) -> lancedb::Result<()> {
    let names = conn.table_names().execute().await?;
    if names.iter().any(|n| n == name) {
        return Ok(());
    }
    let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
    conn.create_table(name, Box::new(iter)).execute().await?;
    Ok(())
}

/// Quotes a string literal for a Lance SQL predicate.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
