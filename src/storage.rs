use anyhow::{anyhow, Result};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::now_s;

/// One aggregate row: total historical detection instances for a class.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClassCount {
    pub name: String,
    pub count: u64,
}

/// Persistence gateway for detected pest instances.
///
/// `record` appends one row per detected *instance* (not per class per
/// run), so `aggregate` reflects total historical instances. Rows are
/// never updated or deleted; reads happen only through `aggregate`.
pub trait SightingStore: Send {
    /// Insert one sighting row in its own transaction scope.
    ///
    /// Failures roll back the transaction and surface to the caller,
    /// which logs and continues with the remaining instances of the run.
    fn record(&mut self, class_name: &str) -> Result<()>;

    /// Group all historical rows by class name and count occurrences.
    /// No explicit ordering is applied.
    fn aggregate(&mut self) -> Result<Vec<ClassCount>>;
}

pub struct SqliteSightingStore {
    conn: Connection,
}

impl SqliteSightingStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS pest_sightings (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              created_at INTEGER NOT NULL,
              name TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sightings_name ON pest_sightings(name);
            "#,
        )?;
        Ok(())
    }
}

impl SightingStore for SqliteSightingStore {
    fn record(&mut self, class_name: &str) -> Result<()> {
        if class_name.trim().is_empty() {
            return Err(anyhow!("class name must not be empty"));
        }
        let created_at = now_s()? as i64;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO pest_sightings(created_at, name) VALUES (?1, ?2)",
            params![created_at, class_name],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn aggregate(&mut self) -> Result<Vec<ClassCount>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, COUNT(*) FROM pest_sightings GROUP BY name")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            out.push(ClassCount {
                name,
                count: count as u64,
            });
        }
        Ok(out)
    }
}

/// In-memory store for tests and model-less demos.
#[derive(Clone, Debug, Default)]
pub struct InMemorySightingStore {
    rows: Vec<String>,
}

impl InMemorySightingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SightingStore for InMemorySightingStore {
    fn record(&mut self, class_name: &str) -> Result<()> {
        if class_name.trim().is_empty() {
            return Err(anyhow!("class name must not be empty"));
        }
        self.rows.push(class_name.to_string());
        Ok(())
    }

    fn aggregate(&mut self) -> Result<Vec<ClassCount>> {
        let mut out: Vec<ClassCount> = Vec::new();
        for name in &self.rows {
            match out.iter_mut().find(|entry| &entry.name == name) {
                Some(entry) => entry.count += 1,
                None => out.push(ClassCount {
                    name: name.clone(),
                    count: 1,
                }),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut rows: Vec<ClassCount>) -> Vec<ClassCount> {
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    #[test]
    fn record_n_times_aggregates_to_n() {
        let mut store = InMemorySightingStore::new();
        for _ in 0..5 {
            store.record("tuta").unwrap();
        }
        store.record("bactericera").unwrap();

        let rows = sorted(store.aggregate().unwrap());
        assert_eq!(
            rows,
            vec![
                ClassCount {
                    name: "bactericera".to_string(),
                    count: 1
                },
                ClassCount {
                    name: "tuta".to_string(),
                    count: 5
                },
            ]
        );
    }

    #[test]
    fn sqlite_store_counts_instances_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sightings.db");
        let db_path = db_path.to_str().unwrap();

        {
            let mut store = SqliteSightingStore::open(db_path).unwrap();
            store.record("tuta").unwrap();
            store.record("tuta").unwrap();
        }

        // Reopen: the aggregate is historical, not per run.
        let mut store = SqliteSightingStore::open(db_path).unwrap();
        store.record("tuta").unwrap();
        store.record("bactericera").unwrap();

        let rows = sorted(store.aggregate().unwrap());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "bactericera");
        assert_eq!(rows[0].count, 1);
        assert_eq!(rows[1].name, "tuta");
        assert_eq!(rows[1].count, 3);
    }

    #[test]
    fn record_rejects_empty_class_name() {
        let mut store = InMemorySightingStore::new();
        assert!(store.record("  ").is_err());
        assert!(store.aggregate().unwrap().is_empty());
    }

    #[test]
    fn failed_record_does_not_block_later_records() {
        let mut store = InMemorySightingStore::new();
        assert!(store.record("").is_err());
        store.record("tuta").unwrap();
        let rows = store.aggregate().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 1);
    }
}
