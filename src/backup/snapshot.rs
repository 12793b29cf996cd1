use std::collections::BTreeMap;

use derive_getters::Getters;
use log::{debug, info};

use crate::{
    backup::{BackupError, RemoteSession, select_folder},
    repository::{SequenceSet, Uid, UidValidity},
};

/// The messages of a folder as seen by one metadata pass.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct FolderSnapshot {
    name: String,
    #[getter(skip)]
    uid_validity: UidValidity,
    total_size: u64,
    messages: Vec<MessageMeta>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct MessageMeta {
    /// Only valid for the selection the snapshot was taken in.
    seq_num: u32,
    #[getter(skip)]
    uid_validity: UidValidity,
    #[getter(skip)]
    uid: Uid,
    size: u32,
    #[getter(skip)]
    offset: Option<u64>,
}

impl MessageMeta {
    pub fn uid_validity(&self) -> UidValidity {
        self.uid_validity
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// `None` until the archive accepted the message.
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }
}

impl FolderSnapshot {
    pub fn uid_validity(&self) -> UidValidity {
        self.uid_validity
    }

    fn empty(name: &str, uid_validity: UidValidity) -> Self {
        Self {
            name: name.to_owned(),
            uid_validity,
            total_size: 0,
            messages: Vec::new(),
        }
    }

    /// Copy of this snapshot with the archive offsets of a download filled in.
    ///
    /// Offsets that are already resolved are kept.
    #[must_use]
    pub fn resolved(&self, offsets: &BTreeMap<Uid, u64>) -> Self {
        let mut resolved = self.clone();
        for message in &mut resolved.messages {
            if message.offset.is_none() {
                message.offset = offsets.get(&message.uid).copied();
            }
        }
        resolved
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &MessageMeta> {
        self.messages
            .iter()
            .filter(|message| message.offset.is_none())
    }
}

pub async fn build_snapshot<S: RemoteSession>(
    session: &mut S,
    folder: &str,
) -> Result<FolderSnapshot, BackupError> {
    let selection = select_folder(session, folder).await?;
    info!("{folder} contains {} messages", selection.exists());
    let mut snapshot = FolderSnapshot::empty(folder, selection.uid_validity());
    let Ok(all) = SequenceSet::first(selection.exists()) else {
        return Ok(snapshot);
    };

    let messages = session.fetch_metadata(&all).await?;
    snapshot.messages.reserve(messages.len());
    for message in messages {
        snapshot.total_size += u64::from(message.size());
        snapshot.messages.push(MessageMeta {
            seq_num: message.seq_num(),
            uid_validity: snapshot.uid_validity,
            uid: message.uid(),
            size: message.size(),
            offset: None,
        });
    }
    debug!(
        "{folder}: snapshot of {} messages, {} bytes",
        snapshot.messages.len(),
        snapshot.total_size
    );
    Ok(snapshot)
}
