//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist JSON documents in the `documents` table.
//! - Translate `QueryParams` into `json_extract` predicates.
//! - Push fresh snapshots to watchers after each committed write.
//!
//! # Invariants
//! - Watch snapshots are produced and delivered while the connection lock is
//!   held, so every sink observes commits in order.
//! - Lock order is connection, then watchers.

use crate::model::query::{Comparator, QueryParam, QueryParams};
use crate::store::schema::{open_db, open_db_in_memory};
use crate::store::{
    Document, DocumentStore, SnapshotSink, StoreError, StoreResult, Transaction, WatchId,
};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

static FIELD_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid field regex")
});

struct Watcher {
    collection: String,
    params: QueryParams,
    sink: SnapshotSink,
}

/// `DocumentStore` over one SQLite connection.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    watchers: Mutex<BTreeMap<WatchId, Watcher>>,
    next_watch_id: AtomicU64,
}

impl SqliteDocumentStore {
    /// Wraps a connection whose schema is already upgraded.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            watchers: Mutex::new(BTreeMap::new()),
            next_watch_id: AtomicU64::new(1),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Number of live watches.
    pub fn watch_count(&self) -> usize {
        self.watchers.lock().map(|w| w.len()).unwrap_or(0)
    }

    fn lock_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Re-runs every watch on the touched collections and delivers snapshots.
    fn notify(&self, conn: &Connection, touched: &BTreeSet<String>) {
        if touched.is_empty() {
            return;
        }
        let Ok(watchers) = self.watchers.lock() else {
            warn!("event=watch_notify module=store status=error error_code=lock_poisoned");
            return;
        };
        for (watch_id, watcher) in watchers.iter() {
            if !touched.contains(&watcher.collection) {
                continue;
            }
            let snapshot = query_with(conn, &watcher.collection, &watcher.params);
            if let Err(err) = &snapshot {
                warn!(
                    "event=watch_notify module=store status=error watch_id={} collection={} error={err}",
                    watch_id.0, watcher.collection
                );
            }
            (watcher.sink)(snapshot);
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn create_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    fn create_doc(&self, collection: &str, data: &Value) -> StoreResult<String> {
        let id = self.create_id();
        let conn = self.lock_conn()?;
        insert_with(&conn, collection, &id, data)?;
        debug!("event=doc_write module=store status=ok op=create collection={collection}");
        self.notify(&conn, &BTreeSet::from([collection.to_string()]));
        Ok(id)
    }

    fn set_doc(&self, collection: &str, id: &str, data: &Value) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        upsert_with(&conn, collection, id, data)?;
        debug!("event=doc_write module=store status=ok op=set collection={collection}");
        self.notify(&conn, &BTreeSet::from([collection.to_string()]));
        Ok(())
    }

    fn get_doc(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let conn = self.lock_conn()?;
        get_with(&conn, collection, id)
    }

    fn delete_doc(&self, collection: &str, id: &str) -> StoreResult<()> {
        let conn = self.lock_conn()?;
        delete_with(&conn, collection, id)?;
        debug!("event=doc_write module=store status=ok op=delete collection={collection}");
        self.notify(&conn, &BTreeSet::from([collection.to_string()]));
        Ok(())
    }

    fn query(&self, collection: &str, params: &QueryParams) -> StoreResult<Vec<Document>> {
        let conn = self.lock_conn()?;
        query_with(&conn, collection, params)
    }

    fn watch(
        &self,
        collection: &str,
        params: &QueryParams,
        sink: SnapshotSink,
    ) -> StoreResult<WatchId> {
        let conn = self.lock_conn()?;
        // Validate before registering so a bad query never becomes a watch.
        let initial = query_with(&conn, collection, params)?;

        let watch_id = WatchId(self.next_watch_id.fetch_add(1, Ordering::Relaxed));
        self.watchers
            .lock()
            .map_err(|_| StoreError::Poisoned)?
            .insert(
                watch_id,
                Watcher {
                    collection: collection.to_string(),
                    params: params.clone(),
                    sink: sink.clone(),
                },
            );
        debug!(
            "event=watch_start module=store status=ok watch_id={} collection={collection} conditions={}",
            watch_id.0,
            params.conditions().len()
        );

        sink(Ok(initial));
        Ok(watch_id)
    }

    fn unwatch(&self, id: WatchId) -> bool {
        let removed = match self.watchers.lock() {
            Ok(mut watchers) => watchers.remove(&id).is_some(),
            Err(_) => false,
        };
        if removed {
            debug!("event=watch_stop module=store status=ok watch_id={}", id.0);
        }
        removed
    }

    fn run_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn Transaction) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let mut scope = SqliteTransaction {
            conn: &tx,
            touched: BTreeSet::new(),
        };

        if let Err(err) = work(&mut scope) {
            debug!("event=doc_transaction module=store status=rolled_back error={err}");
            return Err(err);
        }
        let touched = scope.touched;
        tx.commit()?;
        debug!(
            "event=doc_transaction module=store status=ok collections={}",
            touched.len()
        );

        self.notify(&conn, &touched);
        Ok(())
    }
}

struct SqliteTransaction<'t> {
    conn: &'t Connection,
    touched: BTreeSet<String>,
}

impl Transaction for SqliteTransaction<'_> {
    fn get(&mut self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        get_with(self.conn, collection, id)
    }

    fn set(&mut self, collection: &str, id: &str, data: &Value) -> StoreResult<()> {
        upsert_with(self.conn, collection, id, data)?;
        self.touched.insert(collection.to_string());
        Ok(())
    }

    fn delete(&mut self, collection: &str, id: &str) -> StoreResult<()> {
        delete_with(self.conn, collection, id)?;
        self.touched.insert(collection.to_string());
        Ok(())
    }
}

fn insert_with(conn: &Connection, collection: &str, id: &str, data: &Value) -> StoreResult<()> {
    let encoded = encode_document(collection, id, data)?;
    conn.execute(
        "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3);",
        params![collection, id, encoded],
    )?;
    Ok(())
}

fn upsert_with(conn: &Connection, collection: &str, id: &str, data: &Value) -> StoreResult<()> {
    let encoded = encode_document(collection, id, data)?;
    conn.execute(
        "INSERT INTO documents (collection, id, data) VALUES (?1, ?2, ?3)
         ON CONFLICT (collection, id) DO UPDATE SET
            data = excluded.data,
            updated_at = (strftime('%s', 'now') * 1000);",
        params![collection, id, encoded],
    )?;
    Ok(())
}

fn get_with(conn: &Connection, collection: &str, id: &str) -> StoreResult<Option<Document>> {
    let raw = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2;",
            params![collection, id],
            |row| row.get::<_, String>(0),
        )
        .optional()?;

    raw.map(|text| decode_document(collection, id.to_string(), &text))
        .transpose()
}

fn delete_with(conn: &Connection, collection: &str, id: &str) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM documents WHERE collection = ?1 AND id = ?2;",
        params![collection, id],
    )?;
    Ok(())
}

fn query_with(
    conn: &Connection,
    collection: &str,
    params: &QueryParams,
) -> StoreResult<Vec<Document>> {
    let (sql, bind_values) = select_sql(collection, params)?;
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut documents = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let text: String = row.get(1)?;
        documents.push(decode_document(collection, id, &text)?);
    }
    Ok(documents)
}

fn select_sql(collection: &str, params: &QueryParams) -> StoreResult<(String, Vec<SqlValue>)> {
    let mut sql = String::from("SELECT id, data FROM documents WHERE collection = ?");
    let mut bind_values = vec![SqlValue::Text(collection.to_string())];

    for param in params.conditions() {
        append_condition(&mut sql, &mut bind_values, param)?;
    }
    sql.push_str(" ORDER BY rowid ASC");
    Ok((sql, bind_values))
}

/// Appends one predicate.
///
/// The JSON path is inlined as a literal so that expression indexes such as
/// `idx_documents_owner` can match. `FIELD_PATH_RE` admits no quotes.
fn append_condition(
    sql: &mut String,
    bind_values: &mut Vec<SqlValue>,
    param: &QueryParam,
) -> StoreResult<()> {
    if !FIELD_PATH_RE.is_match(&param.field) {
        return Err(StoreError::InvalidQuery(format!(
            "unsupported field path `{}`",
            param.field
        )));
    }
    let extract = format!("json_extract(data, '$.{}')", param.field);

    if param.value.is_null() {
        let predicate = match param.comparator {
            Comparator::Eq => "IS NULL",
            Comparator::NotEq => "IS NOT NULL",
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "comparator `{other}` cannot be used with null on `{}`",
                    param.field
                )));
            }
        };
        sql.push_str(&format!(" AND {extract} {predicate}"));
        return Ok(());
    }

    let operator = match param.comparator {
        Comparator::Eq => "=",
        Comparator::NotEq => "<>",
        Comparator::Lt => "<",
        Comparator::Le => "<=",
        Comparator::Gt => ">",
        Comparator::Ge => ">=",
    };
    sql.push_str(&format!(" AND {extract} {operator} ?"));
    bind_values.push(json_to_sql(&param.field, &param.value)?);
    Ok(())
}

/// Maps a JSON scalar to the SQL value `json_extract` yields for it.
fn json_to_sql(field: &str, value: &Value) -> StoreResult<SqlValue> {
    match value {
        Value::Bool(flag) => Ok(SqlValue::Integer(i64::from(*flag))),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                Ok(SqlValue::Integer(int))
            } else {
                number.as_f64().map(SqlValue::Real).ok_or_else(|| {
                    StoreError::InvalidQuery(format!("number out of range on `{field}`"))
                })
            }
        }
        Value::String(text) => Ok(SqlValue::Text(text.clone())),
        Value::Null => Ok(SqlValue::Null),
        Value::Array(_) | Value::Object(_) => Err(StoreError::InvalidQuery(format!(
            "only scalar values can be compared on `{field}`"
        ))),
    }
}

fn encode_document(collection: &str, id: &str, data: &Value) -> StoreResult<String> {
    if collection.trim().is_empty() || id.trim().is_empty() {
        return Err(StoreError::InvalidData(
            "collection and id cannot be empty".to_string(),
        ));
    }
    if !data.is_object() {
        return Err(StoreError::InvalidData(format!(
            "{collection}/{id} must be a JSON object"
        )));
    }
    serde_json::to_string(data)
        .map_err(|err| StoreError::InvalidData(format!("{collection}/{id}: {err}")))
}

fn decode_document(collection: &str, id: String, text: &str) -> StoreResult<Document> {
    let data = serde_json::from_str(text)
        .map_err(|err| StoreError::InvalidData(format!("{collection}/{id}: {err}")))?;
    Ok(Document { id, data })
}

#[cfg(test)]
mod tests {
    use super::{json_to_sql, select_sql, FIELD_PATH_RE};
    use crate::model::query::QueryParams;
    use crate::store::schema::open_db_in_memory;
    use rusqlite::params_from_iter;
    use rusqlite::types::Value as SqlValue;
    use serde_json::json;

    #[test]
    fn field_paths_allow_dotted_identifiers_only() {
        assert!(FIELD_PATH_RE.is_match("created_uid"));
        assert!(FIELD_PATH_RE.is_match("meta.owner"));
        assert!(!FIELD_PATH_RE.is_match("a'); DROP TABLE documents; --"));
        assert!(!FIELD_PATH_RE.is_match("answers[0]"));
        assert!(!FIELD_PATH_RE.is_match(""));
    }

    #[test]
    fn json_scalars_map_to_json_extract_types() {
        assert_eq!(json_to_sql("f", &json!(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(json_to_sql("f", &json!(3)).unwrap(), SqlValue::Integer(3));
        assert_eq!(json_to_sql("f", &json!(1.5)).unwrap(), SqlValue::Real(1.5));
        assert_eq!(
            json_to_sql("f", &json!("x")).unwrap(),
            SqlValue::Text("x".to_string())
        );
        assert!(json_to_sql("f", &json!([1])).is_err());
    }

    #[test]
    fn owner_queries_use_the_owner_expression_index() {
        let conn = open_db_in_memory().unwrap();
        let params = QueryParams::new().where_eq("created_uid", "u1");
        let (sql, bind_values) = select_sql("questions", &params).unwrap();

        let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {sql}")).unwrap();
        let plan = stmt
            .query_map(params_from_iter(bind_values), |row| row.get::<_, String>(3))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(
            plan.iter().any(|step| step.contains("idx_documents_owner")),
            "plan: {plan:?}"
        );
    }
}
