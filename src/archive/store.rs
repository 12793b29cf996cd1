use std::{
    fs::{File, OpenOptions, create_dir_all},
    io::{self, Write as _},
    os::unix::fs::FileExt as _,
    path::{Path, PathBuf},
};

use log::{debug, trace, warn};
use rustix::{
    fs::{FlockOperation, flock},
    io::Errno,
};

use crate::archive::{
    Appended, ArchiveRecord, MessageStore, StoreError, folder_name,
    index::{ArchiveEntry, Index},
    mbox,
};

const INDEX_FILE: &str = "index.db";

/// The local archive of one account: an index plus one mbox file per folder.
#[derive(Debug)]
pub struct Archive {
    root: PathBuf,
    index: Index,
}

impl Archive {
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        create_dir_all(root)?;
        let index = Index::open(&root.join(INDEX_FILE))?;
        Ok(Self {
            root: root.to_path_buf(),
            index,
        })
    }

    /// Opens the archive of `name` for exclusive use, creating it if needed.
    pub fn folder(&self, name: &str) -> Result<FolderArchive<'_>, StoreError> {
        let path = self
            .root
            .join(format!("{}.mbox", folder_name::encode(name)));
        trace!("opening {}", path.display());
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;
        match flock(&file, FlockOperation::NonBlockingLockExclusive) {
            Ok(()) => {}
            Err(e) if e == Errno::WOULDBLOCK => {
                return Err(StoreError::Locked {
                    folder: name.to_owned(),
                });
            }
            Err(e) => return Err(io::Error::from(e).into()),
        }

        let indexed_end = self.index.indexed_end(name)?;
        let file_end = file.metadata()?.len();
        if file_end < indexed_end {
            return Err(StoreError::Corrupt {
                folder: name.to_owned(),
                offset: file_end,
                reason: "mbox file is shorter than its index",
            });
        }
        if file_end > indexed_end {
            warn!(
                "{name}: {} unindexed bytes at the end of {}, left by an interrupted run",
                file_end - indexed_end,
                path.display()
            );
        }

        Ok(FolderArchive {
            name: name.to_owned(),
            index: &self.index,
            file,
        })
    }

    /// Names of all folders with at least one archived message.
    pub fn folders(&self) -> Result<Vec<String>, StoreError> {
        self.index.folders()
    }
}

/// Write handle on the archive of one folder. Holds an exclusive lock on its mbox file.
#[derive(Debug)]
pub struct FolderArchive<'a> {
    name: String,
    index: &'a Index,
    file: File,
}

impl FolderArchive<'_> {
    pub fn entries(&self) -> Result<Vec<ArchiveEntry>, StoreError> {
        self.index.entries(&self.name)
    }

    /// Returns the original bytes of an archived message.
    pub fn read(&self, entry: &ArchiveEntry) -> Result<Vec<u8>, StoreError> {
        let corrupt = |reason| StoreError::Corrupt {
            folder: self.name.clone(),
            offset: entry.offset(),
            reason,
        };
        let length = usize::try_from(entry.length()).map_err(|_| corrupt("record too large"))?;
        let body_length =
            usize::try_from(entry.body_length()).map_err(|_| corrupt("record too large"))?;
        let mut record = vec![0; length];
        self.file.read_exact_at(&mut record, entry.offset())?;
        mbox::unframe(&record, body_length).map_err(corrupt)
    }
}

impl MessageStore for FolderArchive<'_> {
    fn append(&mut self, record: &ArchiveRecord<'_>) -> Result<Appended, StoreError> {
        if let Some(offset) = self
            .index
            .lookup(&self.name, record.uid_validity, record.uid)?
        {
            trace!("{}: uid {} already archived", self.name, record.uid);
            return Ok(Appended::AlreadyArchived { offset });
        }

        let framed = mbox::frame(record.sender, record.date, record.body);
        let offset = self.file.metadata()?.len();
        self.file.write_all(&framed)?;
        self.file.sync_data()?;

        let entry = ArchiveEntry::new(
            record.uid_validity,
            record.uid,
            offset,
            framed.len() as u64,
            record.body.len() as u64,
        )
        .with_envelope(record.sender, record.date);
        self.index.insert(&self.name, &entry)?;
        debug!(
            "{}: archived uid {} ({} bytes) at offset {offset}",
            self.name,
            record.uid,
            record.body.len()
        );
        Ok(Appended::Written { offset })
    }
}
