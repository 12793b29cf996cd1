use std::{path::Path, sync::LazyLock};

use derive_getters::Getters;
use include_dir::{Dir, include_dir};
use jiff::Timestamp;
use log::{debug, warn};
use rusqlite::{Connection, OptionalExtension as _, Row, types::Type};
use rusqlite_migration::Migrations;

use crate::{
    archive::StoreError,
    repository::{Uid, UidValidity},
};

static MIGRATIONS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/migrations");

static MIGRATIONS: LazyLock<Migrations<'static>> = LazyLock::new(|| {
    Migrations::from_directory(&MIGRATIONS_DIR)
        .expect("embedded migrations should be well formed")
});

/// Where one archived message lives inside its folder's mbox file.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct ArchiveEntry {
    #[getter(skip)]
    uid_validity: UidValidity,
    #[getter(skip)]
    uid: Uid,
    offset: u64,
    length: u64,
    body_length: u64,
    #[getter(skip)]
    sender: Option<String>,
    #[getter(skip)]
    date: Option<Timestamp>,
}

impl ArchiveEntry {
    pub fn new(
        uid_validity: UidValidity,
        uid: Uid,
        offset: u64,
        length: u64,
        body_length: u64,
    ) -> Self {
        Self {
            uid_validity,
            uid,
            offset,
            length,
            body_length,
            sender: None,
            date: None,
        }
    }

    pub fn uid_validity(&self) -> UidValidity {
        self.uid_validity
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn date(&self) -> Option<Timestamp> {
        self.date
    }

    #[must_use]
    pub fn with_envelope(mut self, sender: Option<&str>, date: Option<Timestamp>) -> Self {
        self.sender = sender.map(ToOwned::to_owned);
        self.date = date;
        self
    }
}

impl TryFrom<&Row<'_>> for ArchiveEntry {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        let invalid = |column, e: &str| {
            rusqlite::Error::FromSqlConversionFailure(column, Type::Integer, e.to_owned().into())
        };
        let uid_validity: u32 = row.get(0)?;
        let uid: u32 = row.get(1)?;
        let date: Option<i64> = row.get(6)?;
        Ok(Self {
            uid_validity: UidValidity::try_from(uid_validity).map_err(|e| invalid(0, e))?,
            uid: Uid::try_from(uid).map_err(|e| invalid(1, e))?,
            offset: unsigned(row, 2)?,
            length: unsigned(row, 3)?,
            body_length: unsigned(row, 4)?,
            sender: row.get(5)?,
            date: date
                .map(Timestamp::from_second)
                .transpose()
                .map_err(|e| invalid(6, &e.to_string()))?,
        })
    }
}

/// SQLite index of all archived messages of one account.
#[derive(Debug)]
pub struct Index {
    db: Connection,
}

impl Index {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        debug!("opening archive index {}", path.display());
        let mut db = Connection::open(path)?;
        db.execute_batch(
            "pragma journal_mode=wal;
            pragma synchronous=1;",
        )?;
        MIGRATIONS.to_latest(&mut db)?;
        Ok(Self { db })
    }

    pub fn lookup(
        &self,
        folder: &str,
        uid_validity: UidValidity,
        uid: Uid,
    ) -> Result<Option<u64>, StoreError> {
        let mut stmt = self.db.prepare_cached(
            "select \"offset\" from messages where folder = ?1 and uid_validity = ?2 and uid = ?3",
        )?;
        let offset = stmt
            .query_row((folder, u32::from(uid_validity), u32::from(uid)), |row| {
                unsigned(row, 0)
            })
            .optional()?;
        Ok(offset)
    }

    pub fn insert(&self, folder: &str, entry: &ArchiveEntry) -> Result<(), StoreError> {
        let mut stmt = self.db.prepare_cached(
            "insert into messages
                (folder, uid_validity, uid, \"offset\", length, body_length, sender, date)
                values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        stmt.execute((
            folder,
            u32::from(entry.uid_validity),
            u32::from(entry.uid),
            signed(entry.offset)?,
            signed(entry.length)?,
            signed(entry.body_length)?,
            entry.sender.as_deref(),
            entry.date.map(Timestamp::as_second),
        ))?;
        Ok(())
    }

    /// Entries of `folder` in file order.
    pub fn entries(&self, folder: &str) -> Result<Vec<ArchiveEntry>, StoreError> {
        let mut stmt = self.db.prepare_cached(
            "select uid_validity, uid, \"offset\", length, body_length, sender, date
                from messages where folder = ?1 order by \"offset\"",
        )?;
        let entries = stmt
            .query_map([folder], |row| ArchiveEntry::try_from(row))?
            .collect::<Result<_, _>>()?;
        Ok(entries)
    }

    /// End of the last indexed record of `folder`.
    pub fn indexed_end(&self, folder: &str) -> Result<u64, StoreError> {
        let mut stmt = self.db.prepare_cached(
            "select coalesce(max(\"offset\" + length), 0) from messages where folder = ?1",
        )?;
        Ok(stmt.query_row([folder], |row| unsigned(row, 0))?)
    }

    pub fn folders(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .db
            .prepare_cached("select distinct folder from messages order by folder")?;
        let folders = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        Ok(folders)
    }
}

fn signed(value: u64) -> rusqlite::Result<i64> {
    i64::try_from(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(e.into()))
}

fn unsigned(row: &Row<'_>, column: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(column)?;
    u64::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Integer, e.into()))
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(e) = self.db.execute_batch("pragma optimize;") {
            warn!("optimizing archive index failed: {e}");
        }
    }
}
