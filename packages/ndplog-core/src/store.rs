//! Persistent arplog table backed by SQLite.

use rusqlite::{params, Connection};
use thiserror::Error;

use crate::config::DbUrl;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
}

/// One observation of an `(ip, mac)` binding, already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub ip_addr: String,
    pub mac_addr: String,
    /// Unix seconds at the time the host was polled.
    pub seen_at: i64,
}

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS arplog (
    ip_addr    TEXT NOT NULL,
    mac_addr   TEXT NOT NULL,
    first_seen INTEGER NOT NULL,
    last_seen  INTEGER NOT NULL,
    PRIMARY KEY (ip_addr, mac_addr)
);
";

/// The arplog table: one row per `(ip, mac)` pair with first/last seen
/// timestamps.
pub struct ArpLogStore {
    conn: Connection,
}

impl ArpLogStore {
    /// Open (creating if needed) the database named by the config URL.
    pub fn open(url: &DbUrl) -> Result<Self, StoreError> {
        let conn = Connection::open(&url.path)?;
        Self::with_connection(conn)
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(ArpLogStore { conn })
    }

    /// Upsert a batch of sightings in one transaction. A new pair gets
    /// `first_seen = last_seen = seen_at`; an existing pair keeps its
    /// `first_seen` and only moves `last_seen` forward.
    pub fn log_sightings(&mut self, sightings: &[Sighting]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO arplog (ip_addr, mac_addr, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT (ip_addr, mac_addr) DO UPDATE SET last_seen = excluded.last_seen",
            )?;
            for s in sightings {
                stmt.execute(params![s.ip_addr, s.mac_addr, s.seen_at])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete rows not seen since `cutoff`; returns how many went away.
    pub fn prune_older_than(&self, cutoff: i64) -> Result<usize, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM arplog WHERE last_seen < ?1", params![cutoff])?;
        Ok(removed)
    }

    /// All rows, ordered, as `(ip, mac, first_seen, last_seen)`.
    pub fn rows(&self) -> Result<Vec<(String, String, i64, i64)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT ip_addr, mac_addr, first_seen, last_seen
             FROM arplog ORDER BY ip_addr, mac_addr",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
