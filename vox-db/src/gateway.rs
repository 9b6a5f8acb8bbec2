//! Read-only access to the rules and localization databases.

use crate::error::GatewayError;
use crate::localize::{collect_text_keys, substitute_text_keys};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Async facade over the two game databases.
///
/// Cloning is cheap; all clones share the same connections. Queries run
/// on the blocking pool, one at a time per connection.
#[derive(Clone)]
pub struct DbGateway {
    rules: Arc<Mutex<Connection>>,
    localization: Arc<Mutex<Connection>>,
    language: String,
}

impl DbGateway {
    /// Open both databases read-only.
    ///
    /// A missing or unreadable file is fatal: the caller should abort
    /// initialization.
    pub fn open(
        rules_path: impl AsRef<Path>,
        localization_path: impl AsRef<Path>,
        language: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let language = language.into();
        // Table names are derived from the language code; reject anything
        // that could not be a language identifier.
        assert!(
            language
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_'),
            "language code must be alphanumeric"
        );
        let rules = open_read_only(rules_path.as_ref())?;
        let localization = open_read_only(localization_path.as_ref())?;
        Ok(Self {
            rules: Arc::new(Mutex::new(rules)),
            localization: Arc::new(Mutex::new(localization)),
            language,
        })
    }

    /// The active language code.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Run a query against the rules database; rows come back as JSON
    /// objects keyed by column name.
    pub async fn query(
        &self,
        sql: impl Into<String>,
        params: Vec<serde_json::Value>,
    ) -> Result<Vec<serde_json::Value>, GatewayError> {
        let conn = Arc::clone(&self.rules);
        let sql = sql.into();
        run_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            query_rows(&conn, &sql, &params)
        })
        .await
    }

    /// Resolve one localization key. Missing keys come back unchanged.
    pub async fn localize(&self, key: &str) -> String {
        let mut keys = BTreeSet::new();
        keys.insert(key.to_string());
        match self.localize_batch(keys).await {
            Ok(mut resolved) => resolved.remove(key).unwrap_or_else(|| key.to_string()),
            Err(e) => {
                tracing::warn!(key, error = %e, "localization lookup failed");
                key.to_string()
            }
        }
    }

    /// Resolve a batch of keys in one query. Keys absent from the
    /// localization table are omitted from the result.
    pub async fn localize_batch(
        &self,
        keys: BTreeSet<String>,
    ) -> Result<HashMap<String, String>, GatewayError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = Arc::clone(&self.localization);
        let table = format!("Language_{}", self.language);
        run_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let placeholders = vec!["?"; keys.len()].join(", ");
            let sql = format!("SELECT Tag, Text FROM {table} WHERE Tag IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let mut resolved = HashMap::with_capacity(keys.len());
            let mut rows = stmt.query(rusqlite::params_from_iter(keys.iter()))?;
            while let Some(row) = rows.next()? {
                let tag: String = row.get(0)?;
                let text: String = row.get(1)?;
                resolved.insert(tag, text);
            }
            Ok(resolved)
        })
        .await
    }

    /// Deep-localize a JSON value: every `TXT_KEY_*` string is replaced
    /// by its language text, everything else (including container shape
    /// and key order) is preserved. On lookup failure the input comes
    /// back unchanged.
    pub async fn localize_recursive(&self, value: &serde_json::Value) -> serde_json::Value {
        let mut keys = BTreeSet::new();
        collect_text_keys(value, &mut keys);
        if keys.is_empty() {
            return value.clone();
        }
        match self.localize_batch(keys).await {
            Ok(resolved) => substitute_text_keys(value, &resolved),
            Err(e) => {
                tracing::warn!(error = %e, "batched localization failed, passing value through");
                value.clone()
            }
        }
    }

    /// Dump the rules database schema: table name → column list.
    pub async fn schema(&self) -> Result<serde_json::Value, GatewayError> {
        let conn = Arc::clone(&self.rules);
        run_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
            )?;
            let names: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<_, _>>()?;
            let mut out = serde_json::Map::new();
            for name in names {
                let mut info = conn.prepare(&format!("PRAGMA table_info({name})"))?;
                let columns: Vec<serde_json::Value> = info
                    .query_map([], |row| {
                        Ok(serde_json::json!({
                            "name": row.get::<_, String>(1)?,
                            "type": row.get::<_, String>(2)?,
                        }))
                    })?
                    .collect::<Result<_, _>>()?;
                out.insert(name, serde_json::Value::Array(columns));
            }
            Ok(serde_json::Value::Object(out))
        })
        .await
    }
}

fn open_read_only(path: &Path) -> Result<Connection, GatewayError> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|source| GatewayError::Open {
        path: path.display().to_string(),
        source,
    })
}

async fn run_blocking<T, F>(f: F) -> Result<T, GatewayError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, GatewayError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GatewayError::Task(e.to_string()))?
}

fn query_rows(
    conn: &Connection,
    sql: &str,
    params: &[serde_json::Value],
) -> Result<Vec<serde_json::Value>, GatewayError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let sql_params: Vec<rusqlite::types::Value> = params.iter().map(json_to_sql).collect();
    let mut rows = stmt.query(rusqlite::params_from_iter(sql_params))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut obj = serde_json::Map::with_capacity(columns.len());
        for (i, name) in columns.iter().enumerate() {
            obj.insert(name.clone(), sql_to_json(row.get_ref(i)?));
        }
        out.push(serde_json::Value::Object(obj));
    }
    Ok(out)
}

fn json_to_sql(value: &serde_json::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        serde_json::Value::Null => Sql::Null,
        serde_json::Value::Bool(b) => Sql::Integer(i64::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Sql::Text(s.clone()),
        // Containers are not bindable; pass their JSON text.
        other => Sql::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::Array(
            b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
        ),
    }
}
