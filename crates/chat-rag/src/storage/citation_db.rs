//! SQLite-backed citation lookup
//!
//! Resolves a chunk locator such as `{Chapter: 2, Verse: 47}` into the
//! configured display columns of one table row.

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};
use serde_json::{Map, Number, Value};
use std::sync::Arc;

use crate::config::SqliteCitationConfig;
use crate::error::{Error, Result};
use crate::providers::CitationStore;
use crate::types::{ChunkMetadata, CitationRecord};

/// Citation store reading display rows from a SQLite table
pub struct SqliteCitationStore {
    conn: Arc<Mutex<Connection>>,
    key_fields: Vec<String>,
    columns: Vec<String>,
    query: String,
}

impl SqliteCitationStore {
    /// Open the configured database read-only
    pub fn open(config: &SqliteCitationConfig, key_fields: &[String]) -> Result<Self> {
        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            Error::Config(format!(
                "Failed to open citation database {}: {}",
                config.path.display(),
                e
            ))
        })?;

        Self::from_connection(conn, &config.table, &config.columns, key_fields)
    }

    /// Wrap an existing connection
    pub fn from_connection(
        conn: Connection,
        table: &str,
        columns: &[String],
        key_fields: &[String],
    ) -> Result<Self> {
        if key_fields.is_empty() {
            return Err(Error::Config("SQLite citations need at least one key field".to_string()));
        }
        if columns.is_empty() {
            return Err(Error::Config("SQLite citations need at least one column".to_string()));
        }

        let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_ ]*$")
            .map_err(|e| Error::internal(format!("Identifier pattern: {}", e)))?;
        for name in std::iter::once(table)
            .chain(columns.iter().map(String::as_str))
            .chain(key_fields.iter().map(String::as_str))
        {
            if !ident.is_match(name) {
                return Err(Error::Config(format!("Invalid SQL identifier: '{}'", name)));
            }
        }

        let select = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let filter = key_fields
            .iter()
            .enumerate()
            .map(|(i, k)| format!("{} = ?{}", quote_identifier(k), i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        let query = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            select,
            quote_identifier(table),
            filter
        );

        // Fail at startup rather than on the first question
        conn.prepare(&query)?;

        tracing::info!("Citation lookups: {}", query);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            key_fields: key_fields.to_vec(),
            columns: columns.to_vec(),
            query,
        })
    }

    fn lookup_blocking(
        conn: &Mutex<Connection>,
        query: &str,
        columns: &[String],
        params: Vec<SqlValue>,
    ) -> Result<Option<CitationRecord>> {
        let conn = conn.lock();
        let mut stmt = conn.prepare_cached(query)?;

        let record = stmt
            .query_row(params_from_iter(params), |row| {
                let mut fields = Map::new();
                for (i, column) in columns.iter().enumerate() {
                    fields.insert(column.clone(), sql_to_json(row.get_ref(i)?));
                }
                Ok(CitationRecord::new(fields))
            })
            .optional()?;

        Ok(record)
    }
}

#[async_trait]
impl CitationStore for SqliteCitationStore {
    async fn lookup(&self, locator: &ChunkMetadata) -> Result<Option<CitationRecord>> {
        let mut params = Vec::with_capacity(self.key_fields.len());
        for field in &self.key_fields {
            match locator.get(field) {
                Some(value) => params.push(json_to_sql(value)),
                None => return Ok(None),
            }
        }

        let conn = Arc::clone(&self.conn);
        let query = self.query.clone();
        let columns = self.columns.clone();

        tokio::task::spawn_blocking(move || Self::lookup_blocking(&conn, &query, &columns, params))
            .await
            .map_err(|e| Error::internal(format!("Citation lookup task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident)
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(hex::encode(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verse_store() -> SqliteCitationStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE gita (
                Chapter INTEGER NOT NULL,
                Verse INTEGER NOT NULL,
                Devanagari TEXT,
                Translation TEXT
            );
            INSERT INTO gita VALUES (2, 47, 'कर्मण्येवाधिकारस्ते', 'You have a right to action alone.');
            INSERT INTO gita VALUES (2, 48, 'योगस्थः कुरु कर्माणि', 'Perform action, abandoning attachment.');
            "#,
        )
        .unwrap();

        let columns = vec![
            "Chapter".to_string(),
            "Verse".to_string(),
            "Translation".to_string(),
        ];
        let keys = vec!["Chapter".to_string(), "Verse".to_string()];
        SqliteCitationStore::from_connection(conn, "gita", &columns, &keys).unwrap()
    }

    fn locator(chapter: Value, verse: Value) -> ChunkMetadata {
        let mut meta = ChunkMetadata::new();
        meta.insert("Chapter".to_string(), chapter);
        meta.insert("Verse".to_string(), verse);
        meta.insert("source".to_string(), json!("gita.csv"));
        meta
    }

    #[tokio::test]
    async fn test_lookup_found_in_column_order() {
        let store = verse_store();
        let record = store
            .lookup(&locator(json!(2), json!(47)))
            .await
            .unwrap()
            .unwrap();

        let keys: Vec<&String> = record.fields.keys().collect();
        assert_eq!(keys, vec!["Chapter", "Verse", "Translation"]);
        assert_eq!(record.get("Verse"), Some(&json!(47)));
        assert_eq!(
            record.get("Translation"),
            Some(&json!("You have a right to action alone."))
        );
    }

    #[tokio::test]
    async fn test_lookup_missing_row_or_key() {
        let store = verse_store();
        assert!(store.lookup(&locator(json!(9), json!(9))).await.unwrap().is_none());

        let mut partial = ChunkMetadata::new();
        partial.insert("Chapter".to_string(), json!(2));
        assert!(store.lookup(&partial).await.unwrap().is_none());
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        let conn = Connection::open_in_memory().unwrap();
        let result = SqliteCitationStore::from_connection(
            conn,
            "gita; DROP TABLE gita",
            &["Verse".to_string()],
            &["Verse".to_string()],
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_table_fails_at_open() {
        let conn = Connection::open_in_memory().unwrap();
        let result = SqliteCitationStore::from_connection(
            conn,
            "missing",
            &["Verse".to_string()],
            &["Verse".to_string()],
        );
        assert!(matches!(result, Err(Error::Database(_))));
    }
}
