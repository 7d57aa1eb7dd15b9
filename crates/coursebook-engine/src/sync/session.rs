//! Async driver for [`Synchronizer`].
//!
//! One tokio task owns the state machine, the editor document and the
//! debounce timer, and processes requests and completions one at a time.
//! Store calls and rendering run in spawned tasks that report back through
//! an internal channel.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::models::{Block, Chapter, ChapterId, Snapshot};
use crate::render::{HtmlRenderer, render_snapshot};
use crate::store::{ChapterStore, StoreError};
use crate::sync::machine::{Effect, SaveStatus, SyncSettings, SyncState, Synchronizer};
use crate::sync::timer::DebounceTimer;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Editor session has stopped")]
    Closed,
}

/// What the editor currently shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorDocument {
    pub chapter_id: Option<ChapterId>,
    pub blocks: Vec<Block>,
}

enum SessionRequest {
    Open {
        chapter_id: ChapterId,
    },
    Edited {
        blocks: Vec<Block>,
    },
    Flush,
    Document {
        response: oneshot::Sender<EditorDocument>,
    },
    Close {
        response: oneshot::Sender<SaveStatus>,
    },
}

enum Completion {
    Loaded {
        chapter_id: ChapterId,
        result: Result<Chapter, StoreError>,
    },
    Rendered {
        seq: u64,
        snapshot: Snapshot,
    },
    Saved {
        chapter_id: ChapterId,
        result: Result<Chapter, StoreError>,
    },
    DebounceElapsed {
        generation: u64,
    },
}

pub struct EditorSession {
    store: Arc<dyn ChapterStore>,
    renderer: Arc<dyn HtmlRenderer>,
    machine: Synchronizer,
    editor: Vec<Block>,
    timer: DebounceTimer,
    status: watch::Sender<SaveStatus>,
    completions: mpsc::UnboundedSender<Completion>,
    /// Sequence number of the latest edit
    seq: u64,
    /// Sequence number of the latest render handed to the machine
    applied_seq: u64,
    renders_in_flight: usize,
    /// Latest edit rendered before the chapter finished loading
    deferred: Option<Snapshot>,
    closing: Option<oneshot::Sender<SaveStatus>>,
    close_save_failed: bool,
}

impl EditorSession {
    /// Start a session on the current tokio runtime
    pub fn spawn(
        store: Arc<dyn ChapterStore>,
        renderer: Arc<dyn HtmlRenderer>,
        settings: SyncSettings,
    ) -> SessionHandle {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SaveStatus::Idle);

        let session = EditorSession {
            store,
            renderer,
            machine: Synchronizer::new(settings),
            editor: Vec::new(),
            timer: DebounceTimer::new(),
            status: status_tx,
            completions: completions_tx,
            seq: 0,
            applied_seq: 0,
            renders_in_flight: 0,
            deferred: None,
            closing: None,
            close_save_failed: false,
        };
        let task = tokio::spawn(session.run(requests_rx, completions_rx));

        SessionHandle {
            requests: requests_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<SessionRequest>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                request = requests.recv(), if self.closing.is_none() => match request {
                    Some(request) => self.handle_request(request),
                    None => {
                        log::debug!("Editor session handle dropped");
                        break;
                    }
                },
                Some(completion) = completions.recv() => self.handle_completion(completion),
                else => break,
            }

            if self.close_finished() {
                break;
            }
        }

        self.timer.cancel();
        if let Some(response) = self.closing.take() {
            let _ = response.send(self.status.borrow().clone());
        }
    }

    fn handle_request(&mut self, request: SessionRequest) {
        match request {
            SessionRequest::Open { chapter_id } => {
                log::info!("Opening chapter {chapter_id}");
                let effects = self.machine.switch_chapter(chapter_id);
                self.apply(effects);
            }
            SessionRequest::Edited { blocks } => self.edited(blocks),
            SessionRequest::Flush => {
                let effects = self.machine.flush();
                self.apply(effects);
            }
            SessionRequest::Document { response } => {
                let _ = response.send(EditorDocument {
                    chapter_id: self.machine.active_chapter().cloned(),
                    blocks: self.editor.clone(),
                });
            }
            SessionRequest::Close { response } => {
                self.closing = Some(response);
                self.close_save_failed = false;
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        let effects = match completion {
            Completion::Loaded { chapter_id, result } => match result {
                Ok(chapter) => {
                    let mut effects = self.machine.loaded(chapter, self.editor.is_empty());
                    if let Some(snapshot) = self.deferred.take() {
                        effects.extend(self.machine.local_change(snapshot));
                    }
                    effects
                }
                Err(e) => {
                    log::error!("Failed to load chapter {chapter_id}: {e}");
                    self.machine.load_failed(&chapter_id)
                }
            },
            Completion::Rendered { seq, snapshot } => {
                self.renders_in_flight = self.renders_in_flight.saturating_sub(1);
                if seq <= self.applied_seq {
                    log::debug!("Discarding stale render #{seq}");
                    return;
                }
                self.applied_seq = seq;
                if seq == self.seq && self.machine.active_chapter() == Some(&snapshot.chapter_id) {
                    self.editor = snapshot.blocks.clone();
                }
                if matches!(self.machine.state(), SyncState::Uninitialized { .. }) {
                    log::debug!("Holding edit #{seq} until chapter {} loads", snapshot.chapter_id);
                    self.deferred = Some(snapshot);
                    return;
                }
                self.machine.local_change(snapshot)
            }
            Completion::Saved { chapter_id, result } => match result {
                Ok(chapter) => {
                    log::info!("Saved chapter {chapter_id}");
                    self.machine.save_succeeded(chapter)
                }
                Err(e) => {
                    log::error!("Failed to save chapter {chapter_id}: {e}");
                    if self.closing.is_some() {
                        self.close_save_failed = true;
                    }
                    self.machine.save_failed(&chapter_id)
                }
            },
            Completion::DebounceElapsed { generation } => {
                if !self.timer.fired(generation) {
                    return;
                }
                self.machine.debounce_elapsed()
            }
        };
        self.apply(effects);
    }

    fn edited(&mut self, blocks: Vec<Block>) {
        self.editor = blocks.clone();
        let Some(chapter_id) = self.machine.active_chapter().cloned() else {
            log::debug!("Ignoring edit with no chapter open");
            return;
        };

        self.seq += 1;
        self.renders_in_flight += 1;
        let seq = self.seq;
        let renderer = Arc::clone(&self.renderer);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let snapshot = render_snapshot(renderer, chapter_id, blocks).await;
            let _ = completions.send(Completion::Rendered { seq, snapshot });
        });
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::CancelTimer => self.timer.cancel(),
                Effect::ArmTimer(delay) => {
                    self.timer.arm(delay, self.completions.clone(), |generation| {
                        Completion::DebounceElapsed { generation }
                    });
                }
                Effect::Load(chapter_id) => {
                    let store = Arc::clone(&self.store);
                    let completions = self.completions.clone();
                    tokio::spawn(async move {
                        let result = store.get(&chapter_id).await;
                        let _ = completions.send(Completion::Loaded { chapter_id, result });
                    });
                }
                Effect::ClearEditor => {
                    self.editor.clear();
                    self.deferred = None;
                }
                Effect::ReplaceEditor(blocks) => self.editor = blocks,
                Effect::Save(snapshot) => {
                    let store = Arc::clone(&self.store);
                    let completions = self.completions.clone();
                    tokio::spawn(async move {
                        let Snapshot { chapter_id, blocks } = snapshot;
                        let result = store.save(&chapter_id, blocks).await;
                        let _ = completions.send(Completion::Saved { chapter_id, result });
                    });
                }
                Effect::Invalidate(chapter_id) => self.store.invalidate(&chapter_id),
                Effect::Status(status) => {
                    log::debug!("Save status: {status:?}");
                    self.status.send_replace(status);
                }
            }
        }
    }

    /// Drive a requested close forward; true once the session may stop.
    fn close_finished(&mut self) -> bool {
        if self.closing.is_none() || self.renders_in_flight > 0 {
            return false;
        }
        match self.machine.state() {
            SyncState::Saving { .. } => false,
            SyncState::PendingSave { .. } if !self.close_save_failed => {
                let effects = self.machine.flush();
                self.apply(effects);
                !matches!(self.machine.state(), SyncState::Saving { .. })
            }
            SyncState::PendingSave { pending, .. } => {
                log::warn!(
                    "Closing with unsaved edits in chapter {}",
                    pending.chapter_id
                );
                true
            }
            _ => true,
        }
    }
}

/// Handle to a running [`EditorSession`]
#[derive(Debug)]
pub struct SessionHandle {
    requests: mpsc::UnboundedSender<SessionRequest>,
    status: watch::Receiver<SaveStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Switch the editor to another chapter, abandoning unsaved edits
    pub fn open_chapter(&self, chapter_id: impl Into<ChapterId>) -> Result<(), SessionError> {
        self.send(SessionRequest::Open {
            chapter_id: chapter_id.into(),
        })
    }

    /// Report the editor's full block list after a change
    pub fn content_changed(&self, blocks: Vec<Block>) -> Result<(), SessionError> {
        self.send(SessionRequest::Edited { blocks })
    }

    /// Save pending edits without waiting for the debounce
    pub fn flush(&self) -> Result<(), SessionError> {
        self.send(SessionRequest::Flush)
    }

    pub async fn document(&self) -> Result<EditorDocument, SessionError> {
        let (response, rx) = oneshot::channel();
        self.send(SessionRequest::Document { response })?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.status.clone()
    }

    /// Wait until the status satisfies `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SaveStatus) -> bool,
    ) -> Result<SaveStatus, SessionError> {
        let mut status = self.status.clone();
        let reached = status
            .wait_for(predicate)
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(reached.clone())
    }

    /// Save what is pending, then stop the session. Returns the final status.
    pub async fn close(self) -> Result<SaveStatus, SessionError> {
        let (response, rx) = oneshot::channel();
        self.send(SessionRequest::Close { response })?;
        let status = rx.await.map_err(|_| SessionError::Closed)?;
        if let Err(e) = self.task.await {
            log::warn!("Editor session task ended abnormally: {e}");
        }
        Ok(status)
    }

    fn send(&self, request: SessionRequest) -> Result<(), SessionError> {
        self.requests.send(request).map_err(|_| SessionError::Closed)
    }
}

impl std::fmt::Debug for SessionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionRequest::Open { chapter_id } => write!(f, "Open({chapter_id})"),
            SessionRequest::Edited { blocks } => write!(f, "Edited({} blocks)", blocks.len()),
            SessionRequest::Flush => f.write_str("Flush"),
            SessionRequest::Document { .. } => f.write_str("Document"),
            SessionRequest::Close { .. } => f.write_str("Close"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::DefaultHtmlRenderer;
    use crate::store::CachedChapterStore;
    use crate::sync::RetryPolicy;
    use crate::tests::RecordingStore;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::sleep;

    fn paragraph(text: &str) -> Vec<Block> {
        vec![Block::paragraph(text).with_id("b1")]
    }

    async fn open_session(store: &Arc<RecordingStore>, settings: SyncSettings) -> SessionHandle {
        let session = EditorSession::spawn(
            store.clone(),
            Arc::new(DefaultHtmlRenderer),
            settings,
        );
        session.open_chapter("c1").unwrap();
        session
            .wait_for(|status| *status == SaveStatus::Saved)
            .await
            .unwrap();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn loads_chapter_into_empty_editor() {
        let store = Arc::new(RecordingStore::with_chapter("c1", "hello"));
        let session = open_session(&store, SyncSettings::default()).await;

        let document = session.document().await.unwrap();
        assert_eq!(document.chapter_id, Some(ChapterId::from("c1")));
        assert_eq!(document.blocks[0].plain_text(), "hello");
    }

    #[tokio::test(start_paused = true)]
    async fn saves_once_after_debounce() {
        let store = Arc::new(RecordingStore::with_chapter("c1", "hello"));
        let session = open_session(&store, SyncSettings::default()).await;

        session.content_changed(paragraph("edited")).unwrap();
        sleep(Duration::from_millis(4900)).await;
        assert_eq!(store.save_count(), 0);
        assert_eq!(session.status(), SaveStatus::Unsaved);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(store.save_count(), 1);
        assert_eq!(session.status(), SaveStatus::Saved);

        let saved = store.saves();
        assert_eq!(saved[0].1[0].html.as_deref(), Some("<p>edited</p>"));
    }

    #[tokio::test(start_paused = true)]
    async fn coalesces_edits_within_debounce() {
        let store = Arc::new(RecordingStore::with_chapter("c1", "hello"));
        let session = open_session(&store, SyncSettings::default()).await;

        session.content_changed(paragraph("first")).unwrap();
        sleep(Duration::from_secs(1)).await;
        session.content_changed(paragraph("second")).unwrap();
        sleep(Duration::from_secs(10)).await;

        let saves = store.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].1[0].plain_text(), "second");
    }

    #[tokio::test(start_paused = true)]
    async fn chapter_switch_cancels_pending_save() {
        let store = Arc::new(RecordingStore::with_chapter("c1", "hello"));
        store.insert("c2", "other");
        let session = open_session(&store, SyncSettings::default()).await;

        session.content_changed(paragraph("edited")).unwrap();
        sleep(Duration::from_secs(1)).await;
        session.open_chapter("c2").unwrap();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(store.save_count(), 0);
        let document = session.document().await.unwrap();
        assert_eq!(document.chapter_id, Some(ChapterId::from("c2")));
        assert_eq!(document.blocks[0].plain_text(), "other");
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_content_is_not_saved() {
        let store = Arc::new(RecordingStore::with_chapter("c1", "hello"));
        let session = open_session(&store, SyncSettings::default()).await;

        let document = session.document().await.unwrap();
        session.content_changed(document.blocks).unwrap();
        sleep(Duration::from_secs(6)).await;

        assert_eq!(store.save_count(), 0);
        assert_eq!(session.status(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_failed_save_with_backoff() {
        let store = Arc::new(RecordingStore::with_chapter("c1", "hello"));
        let session = open_session(&store, SyncSettings::default()).await;
        store.fail_next_saves(1);

        session.content_changed(paragraph("edited")).unwrap();
        sleep(Duration::from_millis(5100)).await;
        assert_eq!(session.status(), SaveStatus::Retrying { attempt: 1 });

        sleep(Duration::from_secs(1)).await;
        assert_eq!(session.status(), SaveStatus::Saved);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_retries_are_disabled() {
        let store = Arc::new(RecordingStore::with_chapter("c1", "hello"));
        let settings = SyncSettings {
            retry: RetryPolicy::disabled(),
            ..SyncSettings::default()
        };
        let session = open_session(&store, settings).await;
        store.fail_next_saves(1);

        session.content_changed(paragraph("edited")).unwrap();
        sleep(Duration::from_secs(30)).await;

        assert_eq!(session.status(), SaveStatus::Failed { attempts: 1 });
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn close_flushes_pending_edits() {
        let store = Arc::new(RecordingStore::with_chapter("c1", "hello"));
        let session = open_session(&store, SyncSettings::default()).await;

        session.content_changed(paragraph("edited")).unwrap();
        let status = session.close().await.unwrap();

        assert_eq!(status, SaveStatus::Saved);
        assert_eq!(store.saves()[0].1[0].plain_text(), "edited");
    }

    #[tokio::test(start_paused = true)]
    async fn edit_typed_while_loading_is_saved() {
        let store = Arc::new(RecordingStore::with_chapter("c1", "hello"));
        store.set_load_delay(Duration::from_secs(1));
        let session = EditorSession::spawn(
            store.clone(),
            Arc::new(DefaultHtmlRenderer),
            SyncSettings::default(),
        );

        session.open_chapter("c1").unwrap();
        session.content_changed(paragraph("typed early")).unwrap();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(session.status(), SaveStatus::Saved);
        let saves = store.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].1[0].plain_text(), "typed early");
        let document = session.document().await.unwrap();
        assert_eq!(document.blocks[0].plain_text(), "typed early");

        // Later edits keep flowing through the debounce
        session.content_changed(paragraph("typed later")).unwrap();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(store.save_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_after_load_failure_loads_again() {
        let store = Arc::new(RecordingStore::default());
        let session = EditorSession::spawn(
            store.clone(),
            Arc::new(DefaultHtmlRenderer),
            SyncSettings::default(),
        );
        session.open_chapter("c1").unwrap();
        session
            .wait_for(|status| *status == SaveStatus::LoadFailed)
            .await
            .unwrap();

        store.insert("c1", "arrived");
        session.open_chapter("c1").unwrap();
        session
            .wait_for(|status| *status == SaveStatus::Saved)
            .await
            .unwrap();

        let document = session.document().await.unwrap();
        assert_eq!(document.blocks[0].plain_text(), "arrived");
    }

    #[tokio::test(start_paused = true)]
    async fn save_overlapping_a_cached_read_leaves_fresh_data() {
        let store = Arc::new(CachedChapterStore::new(RecordingStore::with_chapter(
            "c1", "old",
        )));
        let session = EditorSession::spawn(
            store.clone(),
            Arc::new(DefaultHtmlRenderer),
            SyncSettings::default(),
        );
        session.open_chapter("c1").unwrap();
        session
            .wait_for(|status| *status == SaveStatus::Saved)
            .await
            .unwrap();

        store.invalidate(&ChapterId::from("c1"));
        store.inner().set_load_delay(Duration::from_millis(100));
        let reader = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.get(&ChapterId::from("c1")).await.unwrap() }
        });
        sleep(Duration::from_millis(10)).await;

        session.content_changed(paragraph("new")).unwrap();
        assert_eq!(session.close().await.unwrap(), SaveStatus::Saved);
        reader.await.unwrap();

        let chapter = store.get(&ChapterId::from("c1")).await.unwrap();
        assert_eq!(chapter.blocks[0].plain_text(), "new");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_chapter_reports_load_failure() {
        let store = Arc::new(RecordingStore::default());
        let session = EditorSession::spawn(
            store.clone(),
            Arc::new(DefaultHtmlRenderer),
            SyncSettings::default(),
        );
        session.open_chapter("nope").unwrap();

        let status = session
            .wait_for(|status| *status != SaveStatus::Loading && *status != SaveStatus::Idle)
            .await
            .unwrap();
        assert_eq!(status, SaveStatus::LoadFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_reports_stopped_session() {
        let store = Arc::new(RecordingStore::default());
        let session = EditorSession::spawn(
            store,
            Arc::new(DefaultHtmlRenderer),
            SyncSettings::default(),
        );
        let status = session.subscribe();
        session.close().await.unwrap();

        assert!(status.has_changed().is_err());
    }
}
