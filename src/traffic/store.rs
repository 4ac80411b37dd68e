//! SQLite store for daily repository views (`{repo}_views.db`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use std::path::Path;

/// One day of traffic as reported by GitHub
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DailyViews {
    pub timestamp: DateTime<Utc>,
    pub count: i64,
    pub uniques: i64,
}

/// Outcome of merging a traffic report into the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

pub struct ViewsDb {
    conn: Connection,
}

impl ViewsDb {
    /// Open or create the database file
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Cannot open views database: {}", path.display()))?;

        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS views (
                timestamp TEXT PRIMARY KEY,
                count INTEGER NOT NULL,
                uniques INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Merges `days` into the store.
    ///
    /// GitHub keeps reporting the current day while it is in progress, so an
    /// existing day is overwritten when its numbers changed.
    pub fn record(&mut self, days: &[DailyViews]) -> Result<RecordSummary> {
        let tx = self.conn.transaction()?;
        let mut summary = RecordSummary::default();

        for day in days {
            let timestamp = day.timestamp.to_rfc3339();
            let existing: Option<(i64, i64)> = tx
                .query_row(
                    "SELECT count, uniques FROM views WHERE timestamp = ?1",
                    params![timestamp],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match existing {
                None => {
                    tx.execute(
                        "INSERT INTO views (timestamp, count, uniques) VALUES (?1, ?2, ?3)",
                        params![timestamp, day.count, day.uniques],
                    )?;
                    summary.inserted += 1;
                }
                Some(stored) if stored != (day.count, day.uniques) => {
                    tx.execute(
                        "UPDATE views SET count = ?2, uniques = ?3 WHERE timestamp = ?1",
                        params![timestamp, day.count, day.uniques],
                    )?;
                    summary.updated += 1;
                }
                Some(_) => summary.unchanged += 1,
            }
        }

        tx.commit()?;
        Ok(summary)
    }

    /// All recorded days, oldest first
    pub fn all(&self) -> Result<Vec<DailyViews>> {
        let mut stmt = self
            .conn
            .prepare("SELECT timestamp, count, uniques FROM views ORDER BY timestamp")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut days = Vec::new();
        for row in rows {
            let (timestamp, count, uniques) = row?;
            let timestamp = DateTime::parse_from_rfc3339(&timestamp)
                .with_context(|| format!("Invalid timestamp in views table: {}", timestamp))?
                .with_timezone(&Utc);
            days.push(DailyViews {
                timestamp,
                count,
                uniques,
            });
        }
        Ok(days)
    }
}
