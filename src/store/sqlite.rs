use super::{ChangeEvent, ChangeKind, RemoteStore, StoreError, SubscriptionId};
use crate::model::{ColumnKind, FieldMap, Row, Table};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                StoreError::Unavailable(e.to_string())
            }
            _ => StoreError::Rejected(e.to_string()),
        }
    }
}

/// SQLite binding of the remote store. Every sidecar opened on the same
/// workspace file shares the tables and the `changes` outbox, so writes
/// from one session reach the others through `poll`.
pub struct SqliteStore {
    conn: Connection,
    cursors: HashMap<u64, i64>,
    next_sub: u64,
}

impl SqliteStore {
    pub fn open(path: &Path, timeout: Duration) -> anyhow::Result<SqliteStore> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(timeout)?;
        Self::with_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<SqliteStore> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<SqliteStore> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        create_schema(&conn)?;
        Ok(SqliteStore {
            conn,
            cursors: HashMap::new(),
            next_sub: 1,
        })
    }
}

fn create_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grade TEXT,
            year INTEGER,
            shift TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            teacher_ids TEXT,
            is_remediation INTEGER NOT NULL DEFAULT 0,
            focus_skills TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            class_id TEXT,
            avatar_url TEXT,
            registration_number TEXT,
            birth_date TEXT,
            parent_name TEXT,
            phone TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            remediation_entry_date TEXT,
            remediation_exit_date TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS skills(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL,
            description TEXT,
            subject TEXT NOT NULL
        )",
        [],
    )?;

    // Orphaned assessments are tolerated, so no foreign keys here.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            skill_id TEXT,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            term TEXT,
            participation_score REAL,
            behavior_score REAL,
            exam_score REAL,
            notes TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessments_student ON assessments(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_logs(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            date TEXT NOT NULL,
            content TEXT,
            attendance TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_logs_class ON class_logs(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password TEXT,
            role TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS changes(
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            table_name TEXT NOT NULL,
            kind TEXT NOT NULL,
            record_id TEXT NOT NULL,
            new_row TEXT,
            old_row TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )",
        [],
    )?;

    Ok(())
}

fn column(table: Table, name: &str) -> Result<&'static FieldMap, StoreError> {
    table
        .fields()
        .iter()
        .find(|f| f.remote == name)
        .ok_or_else(|| StoreError::Rejected(format!("unknown column {}.{}", table, name)))
}

fn to_sql(f: &FieldMap, v: &serde_json::Value) -> Result<SqlValue, StoreError> {
    use serde_json::Value as J;
    if v.is_null() {
        return Ok(SqlValue::Null);
    }
    let mismatch = || StoreError::Rejected(format!("invalid value for column {}", f.remote));
    match f.kind {
        ColumnKind::Text => match v {
            J::String(s) => Ok(SqlValue::Text(s.clone())),
            J::Number(n) => Ok(SqlValue::Text(n.to_string())),
            _ => Err(mismatch()),
        },
        ColumnKind::Integer => v.as_i64().map(SqlValue::Integer).ok_or_else(mismatch),
        ColumnKind::Real => v.as_f64().map(SqlValue::Real).ok_or_else(mismatch),
        ColumnKind::Bool => match v {
            J::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            J::Number(n) => Ok(SqlValue::Integer(i64::from(n.as_i64() != Some(0)))),
            _ => Err(mismatch()),
        },
        ColumnKind::Json => Ok(SqlValue::Text(v.to_string())),
    }
}

fn from_sql(f: &FieldMap, v: SqlValue) -> serde_json::Value {
    use serde_json::Value as J;
    match (f.kind, v) {
        (_, SqlValue::Null) => J::Null,
        (ColumnKind::Bool, SqlValue::Integer(i)) => J::Bool(i != 0),
        (_, SqlValue::Integer(i)) => J::from(i),
        (_, SqlValue::Real(r)) => serde_json::Number::from_f64(r)
            .map(J::Number)
            .unwrap_or(J::Null),
        (ColumnKind::Json, SqlValue::Text(s)) => serde_json::from_str(&s).unwrap_or(J::Null),
        (_, SqlValue::Text(s)) => J::String(s),
        (_, SqlValue::Blob(_)) => J::Null,
    }
}

fn select_sql(table: Table) -> String {
    let cols: Vec<&str> = table.fields().iter().map(|f| f.remote).collect();
    format!("SELECT {} FROM {}", cols.join(", "), table.as_str())
}

fn read_row(table: Table, r: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (i, f) in table.fields().iter().enumerate() {
        let v: SqlValue = r.get(i)?;
        out.insert(f.remote.to_string(), from_sql(f, v));
    }
    Ok(out)
}

fn select_one(conn: &Connection, table: Table, id: &str) -> Result<Option<Row>, StoreError> {
    let sql = format!("{} WHERE id = ?", select_sql(table));
    let row = conn
        .query_row(&sql, [id], |r| read_row(table, r))
        .optional()?;
    Ok(row)
}

fn record_change(
    conn: &Connection,
    table: Table,
    kind: ChangeKind,
    id: &str,
    new_row: Option<&Row>,
    old_row: Option<&Row>,
) -> Result<(), StoreError> {
    let encode = |r: Option<&Row>| r.map(|r| serde_json::Value::Object(r.clone()).to_string());
    conn.execute(
        "INSERT INTO changes(table_name, kind, record_id, new_row, old_row) VALUES(?, ?, ?, ?, ?)",
        (
            table.as_str(),
            kind.as_str(),
            id,
            encode(new_row),
            encode(old_row),
        ),
    )?;
    Ok(())
}

impl RemoteStore for SqliteStore {
    fn insert(&mut self, table: Table, row: &Row) -> Result<(), StoreError> {
        let id = row
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StoreError::Rejected("missing id".to_string()))?
            .to_string();

        let mut names = Vec::with_capacity(row.len());
        let mut values = Vec::with_capacity(row.len());
        for (k, v) in row {
            let f = column(table, k)?;
            names.push(f.remote);
            values.push(to_sql(f, v)?);
        }
        let marks = vec!["?"; names.len()].join(", ");

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {}({}) VALUES({})",
                table.as_str(),
                names.join(", "),
                marks
            ),
            params_from_iter(values.iter()),
        )?;
        let stored = select_one(&tx, table, &id)?;
        record_change(&tx, table, ChangeKind::Insert, &id, stored.as_ref(), None)?;
        tx.commit()?;
        Ok(())
    }

    fn update(&mut self, table: Table, id: &str, patch: &Row) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut sets = Vec::with_capacity(patch.len());
        let mut values = Vec::with_capacity(patch.len() + 1);
        for (k, v) in patch {
            if k == "id" {
                return Err(StoreError::Rejected("id is immutable".to_string()));
            }
            let f = column(table, k)?;
            sets.push(format!("{} = ?", f.remote));
            values.push(to_sql(f, v)?);
        }
        values.push(SqlValue::Text(id.to_string()));

        let tx = self.conn.unchecked_transaction()?;
        let Some(before) = select_one(&tx, table, id)? else {
            tracing::debug!(table = %table, id, "update matched no row");
            return Ok(());
        };
        tx.execute(
            &format!(
                "UPDATE {} SET {} WHERE id = ?",
                table.as_str(),
                sets.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;
        let after = select_one(&tx, table, id)?;
        record_change(
            &tx,
            table,
            ChangeKind::Update,
            id,
            after.as_ref(),
            Some(&before),
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&mut self, table: Table, id: &str) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let Some(before) = select_one(&tx, table, id)? else {
            tracing::debug!(table = %table, id, "delete matched no row");
            return Ok(());
        };
        tx.execute(&format!("DELETE FROM {} WHERE id = ?", table.as_str()), [id])?;
        record_change(&tx, table, ChangeKind::Delete, id, None, Some(&before))?;
        tx.commit()?;
        Ok(())
    }

    fn select_all(&mut self, table: Table) -> Result<Vec<Row>, StoreError> {
        let sql = format!("{} ORDER BY rowid", select_sql(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |r| read_row(table, r))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn subscribe(&mut self) -> Result<SubscriptionId, StoreError> {
        let head: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(seq), 0) FROM changes", [], |r| r.get(0))?;
        let id = self.next_sub;
        self.next_sub += 1;
        self.cursors.insert(id, head);
        Ok(SubscriptionId(id))
    }

    fn unsubscribe(&mut self, sub: SubscriptionId) {
        self.cursors.remove(&sub.0);
    }

    fn poll(&mut self, sub: SubscriptionId) -> Result<Vec<ChangeEvent>, StoreError> {
        let Some(cursor) = self.cursors.get(&sub.0).copied() else {
            return Err(StoreError::Rejected(format!(
                "unknown subscription {}",
                sub.0
            )));
        };

        let mut stmt = self.conn.prepare(
            "SELECT seq, table_name, kind, new_row, old_row
             FROM changes
             WHERE seq > ?
             ORDER BY seq",
        )?;
        let raw = stmt
            .query_map([cursor], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let decode = |s: Option<String>| -> Option<Row> {
            match serde_json::from_str::<serde_json::Value>(&s?) {
                Ok(serde_json::Value::Object(m)) => Some(m),
                _ => None,
            }
        };

        let mut last = cursor;
        let mut events = Vec::with_capacity(raw.len());
        for (seq, table_name, kind, new_row, old_row) in raw {
            last = seq;
            let (Some(table), Some(kind)) = (Table::parse(&table_name), ChangeKind::parse(&kind))
            else {
                tracing::warn!(seq, table = %table_name, "skipping unreadable change row");
                continue;
            };
            events.push(ChangeEvent {
                table,
                kind,
                new: decode(new_row),
                old: decode(old_row),
            });
        }
        self.cursors.insert(sub.0, last);
        Ok(events)
    }
}
