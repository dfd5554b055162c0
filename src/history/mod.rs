// src/history/mod.rs

//! Transaction history
//!
//! Every executed transaction is persisted as a [`HistoryRecord`]: when it ran,
//! how it ended and what happened to each item, including items that were
//! never attempted because an earlier one failed. Records are append-only.
//! A DONE record can be inverted into a goal that undoes it (see [`invert`]).

mod invert;
mod schema;

pub use invert::invert;
pub use schema::{SCHEMA_VERSION, get_schema_version, migrate};

use crate::error::{Error, Result};
use crate::package::PackageRef;
use crate::transaction::{
    Reason, TransactionAction, TransactionPackage, TransactionState, advance_transaction_ids,
};
use crate::version::Evr;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// What happened to one item during execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemOutcome {
    Applied,
    Failed,
    /// Not reached because an earlier item failed
    Unattempted,
}

impl ItemOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "APPLIED",
            Self::Failed => "FAILED",
            Self::Unattempted => "UNATTEMPTED",
        }
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemOutcome {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "APPLIED" => Ok(Self::Applied),
            "FAILED" => Ok(Self::Failed),
            "UNATTEMPTED" => Ok(Self::Unattempted),
            _ => Err(format!("Invalid item outcome: {s}")),
        }
    }
}

/// One item of a recorded transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub name: String,
    pub arch: String,
    #[serde(rename = "epoch_version_release")]
    pub evr: Evr,
    pub action: TransactionAction,
    pub reason: Reason,
    pub outcome: ItemOutcome,
    pub repo: String,
    /// Build the item replaced (upgrade and downgrade)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_evr: Option<Evr>,
    /// Installer error for a FAILED item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl HistoryItem {
    pub fn from_package(item: &TransactionPackage, outcome: ItemOutcome, cause: Option<String>) -> Self {
        let previous_evr = item
            .replaces
            .as_ref()
            .filter(|old| old.evr() != item.package.evr())
            .map(|old| old.evr().clone());
        Self {
            name: item.package.name().to_string(),
            arch: item.package.arch().to_string(),
            evr: item.package.evr().clone(),
            action: item.action,
            reason: item.reason,
            outcome,
            repo: item.package.repo().to_string(),
            previous_evr,
            cause,
        }
    }

    /// The package this item acted on
    pub fn package(&self) -> PackageRef {
        PackageRef::new(&self.name, &self.arch, self.evr.clone(), &self.repo)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let previous_evr: Option<String> = row.get(7)?;
        Ok(Self {
            name: row.get(0)?,
            arch: row.get(1)?,
            evr: parse_column(row, 2)?,
            repo: row.get(3)?,
            action: parse_column(row, 4)?,
            reason: parse_column(row, 5)?,
            outcome: parse_column(row, 6)?,
            previous_evr: previous_evr
                .map(|s| Evr::parse(&s))
                .transpose()
                .map_err(|e| conversion_error(7, e.to_string()))?,
            cause: row.get(8)?,
        })
    }
}

/// Persisted snapshot of one executed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: u64,
    pub start_epoch: i64,
    pub end_epoch: i64,
    pub state: TransactionState,
    pub items: Vec<HistoryItem>,
}

impl HistoryRecord {
    /// Serialize in the external history layout
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn count(&self, outcome: ItemOutcome) -> usize {
        self.items.iter().filter(|i| i.outcome == outcome).count()
    }
}

/// Half-open interval `[start, end)` over transaction start times
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn since(start: i64) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

/// Append-only SQLite store of history records
pub struct HistoryStore {
    conn: Connection,
}

impl HistoryStore {
    /// Open (or create) the history database
    ///
    /// Also advances the process transaction id counter past every recorded
    /// id so new transactions never reuse one.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let store = Self::init(Connection::open(path)?)?;
        info!("Opened history database at {}", path.display());
        Ok(store)
    }

    /// Throwaway store, for tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        let store = Self { conn };
        if let Some(last) = store.last_id()? {
            advance_transaction_ids(last);
        }
        Ok(store)
    }

    /// Append a record; a record with the same id may not already exist
    pub fn record(&mut self, record: &HistoryRecord) -> Result<()> {
        if !record.state.is_final() {
            return Err(Error::InvalidHistoryRecord(format!(
                "transaction {} is {}, only finished transactions are recorded",
                record.id, record.state
            )));
        }

        let tx = self.conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE id = ?1)",
            [record.id as i64],
            |row| row.get(0),
        )?;
        if exists {
            return Err(Error::InvalidHistoryRecord(format!(
                "transaction {} is already recorded",
                record.id
            )));
        }

        tx.execute(
            "INSERT INTO transactions (id, start_epoch, end_epoch, state) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id as i64,
                record.start_epoch,
                record.end_epoch,
                record.state.as_str()
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transaction_items
                    (transaction_id, position, name, arch, evr, repo, action, reason, outcome, previous_evr, cause)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for (position, item) in record.items.iter().enumerate() {
                stmt.execute(params![
                    record.id as i64,
                    position as i64,
                    item.name,
                    item.arch,
                    item.evr.to_string(),
                    item.repo,
                    item.action.as_str(),
                    item.reason.as_str(),
                    item.outcome.as_str(),
                    item.previous_evr.as_ref().map(|e| e.to_string()),
                    item.cause,
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            "Recorded transaction {} ({}, {} items)",
            record.id,
            record.state,
            record.items.len()
        );
        Ok(())
    }

    /// Fetch one record
    pub fn get(&self, id: u64) -> Result<Option<HistoryRecord>> {
        let header = self
            .conn
            .query_row(
                "SELECT id, start_epoch, end_epoch, state FROM transactions WHERE id = ?1",
                [id as i64],
                header_from_row,
            )
            .optional()?;

        match header {
            Some(header) => Ok(Some(self.with_items(header)?)),
            None => Ok(None),
        }
    }

    /// Records whose start time falls in `range`, oldest first
    pub fn query(&self, range: TimeRange) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_epoch, end_epoch, state FROM transactions
             WHERE (?1 IS NULL OR start_epoch >= ?1) AND (?2 IS NULL OR start_epoch < ?2)
             ORDER BY id",
        )?;
        let headers = stmt
            .query_map(params![range.start, range.end], header_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        headers.into_iter().map(|h| self.with_items(h)).collect()
    }

    /// The `limit` most recent records, newest first
    pub fn list_recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_epoch, end_epoch, state FROM transactions ORDER BY id DESC LIMIT ?1",
        )?;
        let headers = stmt
            .query_map([limit as i64], header_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        headers.into_iter().map(|h| self.with_items(h)).collect()
    }

    /// Highest recorded transaction id
    pub fn last_id(&self) -> Result<Option<u64>> {
        let id: Option<i64> =
            self.conn
                .query_row("SELECT MAX(id) FROM transactions", [], |row| row.get(0))?;
        Ok(id.map(|id| id as u64))
    }

    fn with_items(&self, mut record: HistoryRecord) -> Result<HistoryRecord> {
        let mut stmt = self.conn.prepare(
            "SELECT name, arch, evr, repo, action, reason, outcome, previous_evr, cause
             FROM transaction_items WHERE transaction_id = ?1 ORDER BY position",
        )?;
        record.items = stmt
            .query_map([record.id as i64], HistoryItem::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(record)
    }
}

fn header_from_row(row: &Row) -> rusqlite::Result<HistoryRecord> {
    let id: i64 = row.get(0)?;
    Ok(HistoryRecord {
        id: id as u64,
        start_epoch: row.get(1)?,
        end_epoch: row.get(2)?,
        state: parse_column(row, 3)?,
        items: Vec::new(),
    })
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| conversion_error(idx, e.to_string()))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(name: &str, action: TransactionAction, outcome: ItemOutcome) -> HistoryItem {
        HistoryItem {
            name: name.to_string(),
            arch: "x86_64".to_string(),
            evr: Evr::parse("2.0-1").unwrap(),
            action,
            reason: Reason::User,
            outcome,
            repo: "updates".to_string(),
            previous_evr: match action {
                TransactionAction::Upgrade => Some(Evr::parse("1.0-1").unwrap()),
                _ => None,
            },
            cause: match outcome {
                ItemOutcome::Failed => Some("payload of foo is corrupt".to_string()),
                _ => None,
            },
        }
    }

    fn record(id: u64, start_epoch: i64, state: TransactionState) -> HistoryRecord {
        HistoryRecord {
            id,
            start_epoch,
            end_epoch: start_epoch + 5,
            state,
            items: vec![
                item("foo", TransactionAction::Upgrade, ItemOutcome::Applied),
                item("bar", TransactionAction::Install, ItemOutcome::Failed),
                item("baz", TransactionAction::Install, ItemOutcome::Unattempted),
            ],
        }
    }

    #[test]
    fn test_record_and_get() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        let original = record(7, 1_700_000_000, TransactionState::Failed);
        store.record(&original).unwrap();

        let loaded = store.get(7).unwrap().unwrap();
        assert_eq!(loaded, original);
        assert!(store.get(8).unwrap().is_none());
        assert_eq!(store.last_id().unwrap(), Some(7));
        assert_eq!(loaded.count(ItemOutcome::Unattempted), 1);
    }

    #[test]
    fn test_append_only() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        store.record(&record(1, 100, TransactionState::Done)).unwrap();
        let err = store
            .record(&record(1, 200, TransactionState::Done))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidHistoryRecord(_)));
        assert_eq!(store.get(1).unwrap().unwrap().start_epoch, 100);

        let unfinished = record(2, 300, TransactionState::InProgress);
        assert!(store.record(&unfinished).is_err());
    }

    #[test]
    fn test_query_and_list_recent() {
        let mut store = HistoryStore::open_in_memory().unwrap();
        for (id, start) in [(1, 100), (2, 200), (3, 300)] {
            store.record(&record(id, start, TransactionState::Done)).unwrap();
        }

        let ids = |records: Vec<HistoryRecord>| records.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(store.query(TimeRange::all()).unwrap()), vec![1, 2, 3]);
        assert_eq!(ids(store.query(TimeRange::since(200)).unwrap()), vec![2, 3]);
        assert_eq!(ids(store.query(TimeRange::between(100, 300)).unwrap()), vec![1, 2]);
        assert_eq!(ids(store.list_recent(2).unwrap()), vec![3, 2]);
    }

    #[test]
    fn test_reopen_advances_ids() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("history.db");
        {
            let mut store = HistoryStore::open(&path).unwrap();
            store.record(&record(5_000, 100, TransactionState::Done)).unwrap();
        }
        let _store = HistoryStore::open(&path).unwrap();
        assert!(crate::transaction::next_transaction_id() > 5_000);
    }

    #[test]
    fn test_json_layout() {
        let json = record(3, 100, TransactionState::Failed).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], 3);
        assert_eq!(value["state"], "FAILED");
        assert_eq!(value["items"][0]["epoch_version_release"], "2.0-1");
        assert_eq!(value["items"][0]["action"], "UPGRADE");
        assert_eq!(value["items"][2]["outcome"], "UNATTEMPTED");
        assert_eq!(value["items"][1]["reason"], "USER");
    }
}
