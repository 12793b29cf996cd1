use std::collections::BTreeMap;

use bytes::Bytes;
use derive_getters::Getters;
use jiff::Timestamp;
use log::{debug, info, warn};

use crate::{
    archive::{Appended, ArchiveRecord, MessageStore},
    backup::{
        BackupError, FolderSnapshot, MessageStream, Progress, RemoteSession, select_folder,
    },
    imap::FetchItem,
    repository::{SequenceSet, Uid, UidValidity},
};

/// What one download pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq, Getters)]
pub struct DownloadReport {
    appended: usize,
    already_archived: usize,
    empty_bodies: usize,
    without_uid: usize,
    /// Sum of declared sizes of the appended messages.
    bytes: u64,
    /// Archive offset of every message that is archived after this pass.
    offsets: BTreeMap<Uid, u64>,
}

impl DownloadReport {
    /// Whether every fetched message ended up in the archive.
    pub fn is_complete(&self) -> bool {
        self.empty_bodies == 0 && self.without_uid == 0
    }
}

#[derive(Default)]
struct PendingMessage {
    uid: Option<Uid>,
    size: Option<u32>,
    from: Option<String>,
    date: Option<Timestamp>,
    body: Bytes,
}

impl PendingMessage {
    fn collect(items: Vec<FetchItem>) -> Self {
        let mut message = Self::default();
        for item in items {
            match item {
                FetchItem::Uid(uid) => message.uid = Some(uid),
                FetchItem::Size(size) => message.size = Some(size),
                FetchItem::Envelope { from, date } => {
                    message.from = from;
                    message.date = date;
                }
                FetchItem::Body(body) => message.body = body,
            }
        }
        message
    }

    fn declared_size(&self) -> u64 {
        self.size
            .map_or(self.body.len() as u64, u64::from)
    }
}

/// Streams every message of the snapshot's folder into `store`.
///
/// Fails with [`BackupError::Consistency`] without touching `store` if the folder got a new
/// uid validity since `snapshot` was taken.
pub async fn download<S, M, P>(
    session: &mut S,
    snapshot: &FolderSnapshot,
    store: &mut M,
    progress: &mut P,
) -> Result<DownloadReport, BackupError>
where
    S: RemoteSession,
    M: MessageStore,
    P: Progress,
{
    let folder = snapshot.name();
    let selection = select_folder(session, folder).await?;
    if selection.uid_validity() != snapshot.uid_validity() {
        return Err(BackupError::Consistency {
            folder: folder.clone(),
            expected: snapshot.uid_validity(),
            found: selection.uid_validity(),
        });
    }
    let Ok(all) = SequenceSet::first(selection.exists()) else {
        debug!("{folder} is empty, nothing to download");
        return Ok(DownloadReport::default());
    };

    let mut messages = session.fetch_full(&all);
    let archived = archive_messages(
        &mut messages,
        folder,
        selection.uid_validity(),
        store,
        progress,
    )
    .await;
    let closed = messages.close().await;
    let report = archived?;
    closed?;

    info!(
        "{folder}: archived {} new messages ({} bytes), {} already archived",
        report.appended, report.bytes, report.already_archived
    );
    Ok(report)
}

async fn archive_messages<T, M, P>(
    messages: &mut T,
    folder: &str,
    uid_validity: UidValidity,
    store: &mut M,
    progress: &mut P,
) -> Result<DownloadReport, BackupError>
where
    T: MessageStream,
    M: MessageStore,
    P: Progress,
{
    let mut report = DownloadReport::default();
    while let Some(items) = messages.next_message().await {
        let message = PendingMessage::collect(items?);
        let Some(uid) = message.uid else {
            warn!("{folder}: skipping message without UID");
            report.without_uid += 1;
            continue;
        };
        if message.body.is_empty() {
            warn!("{folder}: skipping uid {uid}, server returned no body");
            report.empty_bodies += 1;
            continue;
        }

        let record = ArchiveRecord {
            uid_validity,
            uid,
            sender: message.from.as_deref(),
            date: message.date,
            body: &message.body,
        };
        let appended = store.append(&record)?;
        report.offsets.insert(uid, appended.offset());
        if let Appended::Written { .. } = appended {
            let size = message.declared_size();
            report.appended += 1;
            report.bytes += size;
            progress.advance(size);
        } else {
            report.already_archived += 1;
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use assertables::*;
    use jiff::civil::date;
    use rstest::*;
    use tempfile::{TempDir, tempdir};

    use crate::{
        archive::Archive,
        backup::{
            build_snapshot,
            fake_server::{FakeServer, RecordingProgress, validity},
        },
        imap::{ImapError, MockConnection, Session},
    };

    use super::*;

    #[fixture]
    fn dir() -> TempDir {
        tempdir().expect("temporary directory should be creatable")
    }

    fn inbox() -> FakeServer {
        let mut server = FakeServer::default().with_folder("INBOX", 100);
        server.add_message("INBOX", date(2024, 1, 1), b"Subject: one\r\n\r\nfirst\r\n");
        server.add_message("INBOX", date(2024, 1, 2), b"Subject: two\r\n\r\nsecond\r\n");
        server.add_message("INBOX", date(2024, 1, 3), b"Subject: three\r\n\r\nthird\r\n");
        server
    }

    #[rstest]
    #[tokio::test]
    async fn test_download_archives_every_message(dir: TempDir) {
        let mut server = inbox();
        let archive = assert_ok!(Archive::open(dir.path()));
        let mut store = assert_ok!(archive.folder("INBOX"));
        let mut progress = RecordingProgress::default();
        let snapshot = assert_ok!(build_snapshot(&mut server, "INBOX").await);

        let report = assert_ok!(download(&mut server, &snapshot, &mut store, &mut progress).await);

        assert_eq!(3, report.appended());
        assert_eq!(0, report.already_archived());
        let entries = assert_ok!(store.entries());
        assert_eq!(3, entries.len());
        for (entry, message) in entries.iter().zip(server.messages("INBOX")) {
            assert_eq!(message.uid, entry.uid());
            assert_eq!(message.body, assert_ok!(store.read(entry)));
            assert_eq!(Some(message.date), entry.date());
        }
        assert_eq!(0, server.open_fetches());
    }

    #[rstest]
    #[tokio::test]
    async fn test_changed_uid_validity_writes_nothing(dir: TempDir) {
        let mut server = inbox();
        let archive = assert_ok!(Archive::open(dir.path()));
        let mut store = assert_ok!(archive.folder("INBOX"));
        let mut progress = RecordingProgress::default();
        let snapshot = assert_ok!(build_snapshot(&mut server, "INBOX").await);
        server.set_uid_validity("INBOX", 101);

        let error =
            assert_err!(download(&mut server, &snapshot, &mut store, &mut progress).await);

        assert_matches!(
            error,
            BackupError::Consistency { ref folder, expected, found }
                if folder == "INBOX" && expected == validity(100) && found == validity(101)
        );
        assert_is_empty!(assert_ok!(store.entries()));
        assert_eq!(0, assert_ok!(std::fs::metadata(dir.path().join("INBOX.mbox"))).len());
        assert_is_empty!(progress.advances);
        assert_eq!(1, server.issued("FETCH"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_second_download_archives_nothing_new(dir: TempDir) {
        let mut server = inbox();
        let archive = assert_ok!(Archive::open(dir.path()));
        let mut store = assert_ok!(archive.folder("INBOX"));
        let mut progress = RecordingProgress::default();
        let snapshot = assert_ok!(build_snapshot(&mut server, "INBOX").await);

        let first = assert_ok!(download(&mut server, &snapshot, &mut store, &mut progress).await);
        let second = assert_ok!(download(&mut server, &snapshot, &mut store, &mut progress).await);

        assert_eq!(0, second.appended());
        assert_eq!(3, second.already_archived());
        assert_eq!(first.offsets(), second.offsets());
        assert_eq!(3, assert_ok!(store.entries()).len());
        assert_eq!(3, progress.advances.len());
    }

    #[rstest]
    #[tokio::test]
    async fn test_offsets_are_unique(dir: TempDir) {
        let mut server = inbox();
        server.add_message("INBOX", date(2024, 1, 4), b"From: x\r\n\r\nFrom the start\r\n");
        let archive = assert_ok!(Archive::open(dir.path()));
        let mut store = assert_ok!(archive.folder("INBOX"));
        let mut progress = RecordingProgress::default();
        let snapshot = assert_ok!(build_snapshot(&mut server, "INBOX").await);

        let report = assert_ok!(download(&mut server, &snapshot, &mut store, &mut progress).await);

        let offsets: BTreeSet<u64> = report.offsets().values().copied().collect();
        assert_eq!(4, offsets.len());
        assert_eq!(
            offsets,
            assert_ok!(store.entries())
                .iter()
                .map(|entry| entry.offset())
                .collect::<BTreeSet<_>>()
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_progress_sums_declared_sizes_of_archived_messages(dir: TempDir) {
        let mut server = FakeServer::default().with_folder("INBOX", 7);
        server.add_message_with_size("INBOX", date(2024, 1, 1), b"one", 1000);
        server.add_message_with_size("INBOX", date(2024, 1, 2), b"", 2000);
        server.add_message_with_size("INBOX", date(2024, 1, 3), b"three", 3000);
        let archive = assert_ok!(Archive::open(dir.path()));
        let mut store = assert_ok!(archive.folder("INBOX"));
        let mut progress = RecordingProgress::default();
        let snapshot = assert_ok!(build_snapshot(&mut server, "INBOX").await);

        let report = assert_ok!(download(&mut server, &snapshot, &mut store, &mut progress).await);

        assert_eq!(vec![1000, 3000], progress.advances);
        assert_eq!(4000, progress.total());
        assert_eq!(4000, report.bytes());
        assert_eq!(2, report.appended());
        assert_eq!(1, report.empty_bodies());
        assert!(!report.is_complete());
    }

    #[rstest]
    #[tokio::test]
    async fn test_messages_arriving_after_snapshot_are_archived(dir: TempDir) {
        let mut server = inbox();
        let archive = assert_ok!(Archive::open(dir.path()));
        let mut store = assert_ok!(archive.folder("INBOX"));
        let mut progress = RecordingProgress::default();
        let snapshot = assert_ok!(build_snapshot(&mut server, "INBOX").await);
        let late = server.add_message("INBOX", date(2024, 2, 1), b"late arrival");

        let report = assert_ok!(download(&mut server, &snapshot, &mut store, &mut progress).await);

        assert_eq!(4, report.appended());
        assert!(report.offsets().contains_key(&late));
        assert_eq!(
            ["FETCH 1:4 (UID RFC822.SIZE ENVELOPE BODY.PEEK[])"],
            &server.commands()[3..]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_broken_fetch_keeps_archived_messages_and_closes_stream(dir: TempDir) {
        let mut server = inbox();
        let archive = assert_ok!(Archive::open(dir.path()));
        let mut store = assert_ok!(archive.folder("INBOX"));
        let mut progress = RecordingProgress::default();
        let snapshot = assert_ok!(build_snapshot(&mut server, "INBOX").await);
        server.fail_fetch_at(2);

        let error =
            assert_err!(download(&mut server, &snapshot, &mut store, &mut progress).await);

        assert!(error.is_fatal());
        assert_matches!(error, BackupError::Protocol(ImapError::Closed { .. }));
        assert_eq!(2, assert_ok!(store.entries()).len());
        assert_eq!(0, server.open_fetches());
    }

    #[rstest]
    #[tokio::test]
    async fn test_empty_folder_downloads_nothing(dir: TempDir) {
        let mut server = FakeServer::default().with_folder("Trash", 3);
        let archive = assert_ok!(Archive::open(dir.path()));
        let mut store = assert_ok!(archive.folder("Trash"));
        let mut progress = RecordingProgress::default();
        let snapshot = assert_ok!(build_snapshot(&mut server, "Trash").await);

        let report = assert_ok!(download(&mut server, &snapshot, &mut store, &mut progress).await);

        assert_eq!(DownloadReport::default(), report);
        assert_eq!(0, server.issued("FETCH"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_flag_updates_during_download_keep_report_complete(dir: TempDir) {
        const SELECT: &str = concat!(
            "* 1 EXISTS\r\n",
            "* OK [UIDVALIDITY 100] UIDs valid\r\n",
            "0000 OK [READ-WRITE] Select completed.\r\n",
        );
        let mut session = Session::new(MockConnection::new([
            SELECT,
            "* 1 FETCH (UID 10 RFC822.SIZE 5)\r\n0001 OK Fetch completed.\r\n",
            SELECT,
            concat!(
                "* 1 FETCH (UID 10 RFC822.SIZE 5 BODY[] {5}\r\nHello)\r\n",
                "* 1 FETCH (FLAGS (\\Seen))\r\n",
                "0003 OK Fetch completed.\r\n",
            ),
        ]));
        let archive = assert_ok!(Archive::open(dir.path()));
        let mut store = assert_ok!(archive.folder("INBOX"));
        let mut progress = RecordingProgress::default();
        let snapshot = assert_ok!(build_snapshot(&mut session, "INBOX").await);

        let report = assert_ok!(download(&mut session, &snapshot, &mut store, &mut progress).await);

        assert_eq!(1, report.appended());
        assert_eq!(0, report.without_uid());
        assert!(report.is_complete());
        assert_eq!(1, assert_ok!(store.entries()).len());
    }

    #[rstest]
    fn test_pending_message_collects_items_in_any_order() {
        let uid = assert_ok!(Uid::try_from(9u32));
        let message = PendingMessage::collect(vec![
            FetchItem::Body(Bytes::from_static(b"body")),
            FetchItem::Envelope {
                from: Some("bob@example.com".to_owned()),
                date: None,
            },
            FetchItem::Uid(uid),
        ]);

        assert_eq!(Some(uid), message.uid);
        assert_eq!(Some("bob@example.com"), message.from.as_deref());
        assert_eq!(4, message.declared_size());
    }
}
