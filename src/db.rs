use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use tracing::debug;

use crate::error::StoreError;
use crate::model::CounterRecord;
use crate::orchestrator::{RecordFilter, Repository};

/// `counter_records` behind a single SQLite connection.
pub struct SqliteRepository {
    conn: Connection,
}

impl SqliteRepository {
    pub fn connect(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let repo = Self {
            conn: Connection::open_in_memory()?,
        };
        repo.init_schema()?;
        Ok(repo)
    }

    pub fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS counter_records (
                id                      INTEGER PRIMARY KEY,
                subject_id              TEXT NOT NULL,
                subject_name            TEXT NOT NULL,
                role                    TEXT NOT NULL,
                patch                   TEXT NOT NULL,
                rank                    TEXT NOT NULL,
                region                  TEXT NOT NULL,
                weak_against            TEXT NOT NULL,
                strong_against          TEXT NOT NULL,
                best_lane_counters      TEXT NOT NULL,
                worst_lane_counters     TEXT NOT NULL,
                weaknesses_content      TEXT NOT NULL,
                counter_items_content   TEXT NOT NULL,
                strategies_content      TEXT NOT NULL,
                additional_tips_content TEXT NOT NULL,
                additional_data         TEXT NOT NULL,
                errors                  TEXT NOT NULL,
                created_at              TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_counter_records_key
                ON counter_records(subject_id, role, patch, rank, region);
            CREATE INDEX IF NOT EXISTS idx_counter_records_created
                ON counter_records(created_at);
            ",
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM counter_records", [], |r| r.get(0))?;
        Ok(n as usize)
    }

    fn exists(&self, record: &CounterRecord) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT id FROM counter_records
                 WHERE subject_id = ?1 AND role = ?2 AND patch = ?3 AND rank = ?4 AND region = ?5",
                rusqlite::params![
                    record.subject_id,
                    record.role,
                    record.patch,
                    record.rank,
                    record.region
                ],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn record_key(record: &CounterRecord) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        record.subject_id, record.role, record.patch, record.rank, record.region
    )
}

/// Raw TEXT columns; JSON is decoded after the statement is done.
struct StoredRow {
    subject_id: String,
    subject_name: String,
    role: String,
    patch: String,
    rank: String,
    region: String,
    lists: [String; 4],
    contents: [String; 4],
    additional_data: String,
    errors: String,
}

impl StoredRow {
    fn decode(self) -> Result<CounterRecord, StoreError> {
        let [weak, strong, best, worst] = self.lists;
        let [weaknesses, items, strategies, tips] = self.contents;
        Ok(CounterRecord {
            subject_id: self.subject_id,
            subject_name: self.subject_name,
            role: self.role,
            patch: self.patch,
            rank: self.rank,
            region: self.region,
            weak_against: serde_json::from_str(&weak)?,
            strong_against: serde_json::from_str(&strong)?,
            best_lane_counters: serde_json::from_str(&best)?,
            worst_lane_counters: serde_json::from_str(&worst)?,
            weaknesses_content: weaknesses,
            counter_items_content: items,
            strategies_content: strategies,
            additional_tips_content: tips,
            additional_data: serde_json::from_str(&self.additional_data)?,
            errors: serde_json::from_str(&self.errors)?,
        })
    }
}

impl Repository for SqliteRepository {
    /// Read-then-write; the unique index still catches a racing writer.
    fn create(&self, record: &CounterRecord) -> Result<(), StoreError> {
        if self.exists(record)? {
            return Err(StoreError::DuplicateKey {
                key: record_key(record),
            });
        }

        let result = self.conn.execute(
            "INSERT INTO counter_records (
                subject_id, subject_name, role, patch, rank, region,
                weak_against, strong_against, best_lane_counters, worst_lane_counters,
                weaknesses_content, counter_items_content, strategies_content, additional_tips_content,
                additional_data, errors
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            rusqlite::params![
                record.subject_id,
                record.subject_name,
                record.role,
                record.patch,
                record.rank,
                record.region,
                serde_json::to_string(&record.weak_against)?,
                serde_json::to_string(&record.strong_against)?,
                serde_json::to_string(&record.best_lane_counters)?,
                serde_json::to_string(&record.worst_lane_counters)?,
                record.weaknesses_content,
                record.counter_items_content,
                record.strategies_content,
                record.additional_tips_content,
                serde_json::to_string(&record.additional_data)?,
                serde_json::to_string(&record.errors)?,
            ],
        );

        match result {
            Ok(_) => {
                debug!("Inserted counter record {}", record_key(record));
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateKey {
                    key: record_key(record),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Newest first.
    fn find(&self, filter: &RecordFilter) -> Result<Vec<CounterRecord>, StoreError> {
        let mut conditions = Vec::new();
        let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::new();

        for (column, value) in [
            ("subject_id", &filter.subject_id),
            ("role", &filter.role),
            ("patch", &filter.patch),
            ("rank", &filter.rank),
            ("region", &filter.region),
        ] {
            if let Some(v) = value {
                params.push(v);
                conditions.push(format!("{} = ?{}", column, params.len()));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let limit = filter.limit.map_or(-1, |n| n as i64);

        let sql = format!(
            "SELECT subject_id, subject_name, role, patch, rank, region,
                    weak_against, strong_against, best_lane_counters, worst_lane_counters,
                    weaknesses_content, counter_items_content, strategies_content, additional_tips_content,
                    additional_data, errors
             FROM counter_records{}
             ORDER BY created_at DESC, id DESC
             LIMIT {}",
            where_clause, limit
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params.as_slice(), |row| {
                Ok(StoredRow {
                    subject_id: row.get(0)?,
                    subject_name: row.get(1)?,
                    role: row.get(2)?,
                    patch: row.get(3)?,
                    rank: row.get(4)?,
                    region: row.get(5)?,
                    lists: [row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?],
                    contents: [row.get(10)?, row.get(11)?, row.get(12)?, row.get(13)?],
                    additional_data: row.get(14)?,
                    errors: row.get(15)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(StoredRow::decode).collect()
    }
}
