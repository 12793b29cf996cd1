//! In-memory [`RemoteSession`] for engine tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bytes::Bytes;
use jiff::{Timestamp, civil::Date, tz::TimeZone};

use crate::{
    backup::{MessageStream, Progress, RemoteSession},
    imap::{FetchItem, ImapError, MessageInfo, Selection, SelectionBuilder},
    repository::{SequenceSet, Uid, UidValidity},
};

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub uid: Uid,
    pub size: u32,
    pub from: Option<String>,
    pub date: Timestamp,
    pub body: Vec<u8>,
}

#[derive(Debug)]
struct FakeFolder {
    uid_validity: UidValidity,
    next_uid: u32,
    messages: Vec<FakeMessage>,
    deleted: BTreeSet<Uid>,
}

struct Recycle {
    folder: String,
    selects: usize,
    uid_validity: UidValidity,
}

#[derive(Default)]
pub struct FakeServer {
    folders: BTreeMap<String, FakeFolder>,
    selected: Option<String>,
    commands: Vec<String>,
    open_fetches: usize,
    fail_fetch_at: Option<usize>,
    recycle: Option<Recycle>,
}

pub fn validity(value: u32) -> UidValidity {
    UidValidity::try_from(value).expect("test uid validity should be nonzero")
}

pub fn timestamp(date: Date) -> Timestamp {
    date.to_zoned(TimeZone::UTC)
        .expect("test date should be representable")
        .timestamp()
}

impl FakeServer {
    #[must_use]
    pub fn with_folder(mut self, name: &str, uid_validity: u32) -> Self {
        self.folders.insert(
            name.to_owned(),
            FakeFolder {
                uid_validity: validity(uid_validity),
                next_uid: 1,
                messages: Vec::new(),
                deleted: BTreeSet::new(),
            },
        );
        self
    }

    fn folder_mut(&mut self, name: &str) -> &mut FakeFolder {
        self.folders
            .get_mut(name)
            .expect("test folder should have been created")
    }

    /// Adds a message whose declared size matches its body.
    pub fn add_message(&mut self, folder: &str, date: Date, body: &[u8]) -> Uid {
        let size = u32::try_from(body.len()).expect("test body should be small");
        self.add_message_with_size(folder, date, body, size)
    }

    pub fn add_message_with_size(&mut self, folder: &str, date: Date, body: &[u8], size: u32) -> Uid {
        let folder = self.folder_mut(folder);
        let uid = Uid::try_from(folder.next_uid).expect("test uid should be nonzero");
        folder.next_uid += 1;
        folder.messages.push(FakeMessage {
            uid,
            size,
            from: Some("alice@example.com".to_owned()),
            date: timestamp(date),
            body: body.to_vec(),
        });
        uid
    }

    /// Gives `folder` a new epoch, as a server does when it recreates a mailbox.
    pub fn set_uid_validity(&mut self, folder: &str, uid_validity: u32) {
        self.folder_mut(folder).uid_validity = validity(uid_validity);
    }

    /// Switches `folder` to a new epoch once it has been selected `selects` times.
    pub fn recycle_after(&mut self, folder: &str, selects: usize, uid_validity: u32) {
        self.recycle = Some(Recycle {
            folder: folder.to_owned(),
            selects,
            uid_validity: validity(uid_validity),
        });
    }

    /// Lets the next full fetch break off with a closed connection at message index `at`.
    pub fn fail_fetch_at(&mut self, at: usize) {
        self.fail_fetch_at = Some(at);
    }

    pub fn messages(&self, folder: &str) -> &[FakeMessage] {
        self.folders
            .get(folder)
            .map_or(&[][..], |folder| folder.messages.as_slice())
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn issued(&self, command: &str) -> usize {
        self.commands
            .iter()
            .filter(|issued| issued.starts_with(command))
            .count()
    }

    pub fn open_fetches(&self) -> usize {
        self.open_fetches
    }

    fn selected(&mut self) -> Result<&mut FakeFolder, ImapError> {
        let name = self.selected.clone().ok_or(ImapError::Bad {
            command: "UID",
            information: "No mailbox selected".to_owned(),
        })?;
        Ok(self.folder_mut(&name))
    }

    fn selected_messages(&mut self, set: &SequenceSet) -> Result<Vec<FakeMessage>, ImapError> {
        let folder = self.selected()?;
        set.iter()
            .map(|seq_num| {
                usize::try_from(seq_num.get() - 1)
                    .ok()
                    .and_then(|index| folder.messages.get(index))
                    .cloned()
                    .ok_or(ImapError::Bad {
                        command: "FETCH",
                        information: "Invalid messageset".to_owned(),
                    })
            })
            .collect()
    }
}

impl RemoteSession for FakeServer {
    type Messages<'a> = FakeMessages<'a>;

    async fn list_folders(&mut self, pattern: &str) -> Result<Vec<String>, ImapError> {
        self.commands.push(format!("LIST {pattern}"));
        // reverse order, the engine has to sort
        Ok(self.folders.keys().rev().cloned().collect())
    }

    async fn select(&mut self, folder: &str) -> Result<Selection, ImapError> {
        self.commands.push(format!("SELECT {folder}"));
        let selects = self.issued(&format!("SELECT {folder}"));
        if let Some(recycle) = self
            .recycle
            .take_if(|recycle| recycle.folder == folder && recycle.selects < selects)
        {
            self.folder_mut(folder).uid_validity = recycle.uid_validity;
        }
        let Some(found) = self.folders.get(folder) else {
            self.selected = None;
            return Err(ImapError::No {
                command: "SELECT",
                information: format!("Mailbox doesn't exist: {folder}"),
            });
        };
        let selection = SelectionBuilder::default()
            .name(folder.to_owned())
            .uid_validity(found.uid_validity)
            .exists(u32::try_from(found.messages.len()).expect("test folder should be small"))
            .build()
            .expect("selection should be complete");
        self.selected = Some(folder.to_owned());
        Ok(selection)
    }

    async fn fetch_metadata(&mut self, set: &SequenceSet) -> Result<Vec<MessageInfo>, ImapError> {
        self.commands.push(format!("FETCH {set} (UID RFC822.SIZE)"));
        let messages = self.selected_messages(set)?;
        Ok(set
            .iter()
            .zip(messages)
            .map(|(seq_num, message)| MessageInfo::new(seq_num.get(), message.uid, message.size))
            .collect())
    }

    fn fetch_full(&mut self, set: &SequenceSet) -> Self::Messages<'_> {
        self.commands.push(format!("FETCH {set} (UID RFC822.SIZE ENVELOPE BODY.PEEK[])"));
        let mut queue = VecDeque::new();
        match self.selected_messages(set) {
            Ok(messages) => {
                for (index, message) in messages.into_iter().enumerate() {
                    if self.fail_fetch_at.take_if(|at| *at == index).is_some() {
                        queue.push_back(Err(ImapError::Closed { command: "FETCH" }));
                        break;
                    }
                    queue.push_back(Ok(items(index, message)));
                }
            }
            Err(e) => queue.push_back(Err(e)),
        }
        self.open_fetches += 1;
        FakeMessages {
            queue,
            open_fetches: &mut self.open_fetches,
        }
    }

    async fn uid_search_before(&mut self, date: Date) -> Result<Vec<Uid>, ImapError> {
        self.commands.push(format!("UID SEARCH BEFORE {date}"));
        let cutoff = timestamp(date);
        Ok(self
            .selected()?
            .messages
            .iter()
            .filter(|message| message.date < cutoff)
            .map(|message| message.uid)
            .collect())
    }

    async fn uid_store_deleted(&mut self, uids: &SequenceSet) -> Result<(), ImapError> {
        self.commands.push(format!("UID STORE {uids} +FLAGS.SILENT (\\Deleted)"));
        let folder = self.selected()?;
        folder.deleted.extend(uids.iter().map(Uid::from));
        Ok(())
    }

    async fn expunge(&mut self) -> Result<(), ImapError> {
        self.commands.push("EXPUNGE".to_owned());
        let folder = self.selected()?;
        let deleted = std::mem::take(&mut folder.deleted);
        folder.messages.retain(|message| !deleted.contains(&message.uid));
        Ok(())
    }

    async fn append(&mut self, folder: &str, message: &[u8]) -> Result<(), ImapError> {
        self.commands.push(format!("APPEND {folder}"));
        if !self.folders.contains_key(folder) {
            return Err(ImapError::No {
                command: "APPEND",
                information: "[TRYCREATE] Mailbox doesn't exist".to_owned(),
            });
        }
        self.add_message(folder, Date::constant(1970, 1, 1), message);
        Ok(())
    }
}

/// Items of one message, in an order that depends on its position.
fn items(index: usize, message: FakeMessage) -> Vec<FetchItem> {
    let mut items = vec![
        FetchItem::Uid(message.uid),
        FetchItem::Size(message.size),
        FetchItem::Envelope {
            from: message.from,
            date: Some(message.date),
        },
        FetchItem::Body(Bytes::from(message.body)),
    ];
    if index % 2 == 1 {
        items.reverse();
    }
    items
}

pub struct FakeMessages<'a> {
    queue: VecDeque<Result<Vec<FetchItem>, ImapError>>,
    open_fetches: &'a mut usize,
}

impl MessageStream for FakeMessages<'_> {
    async fn next_message(&mut self) -> Option<Result<Vec<FetchItem>, ImapError>> {
        self.queue.pop_front()
    }

    async fn close(self) -> Result<(), ImapError> {
        *self.open_fetches -= 1;
        Ok(())
    }
}

/// Remembers every progress step.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub advances: Vec<u64>,
}

impl RecordingProgress {
    pub fn total(&self) -> u64 {
        self.advances.iter().sum()
    }
}

impl Progress for RecordingProgress {
    fn advance(&mut self, bytes: u64) {
        self.advances.push(bytes);
    }
}
