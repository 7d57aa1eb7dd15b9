//! Pure state machine deciding when editor content becomes persisted.
//!
//! The machine never performs I/O. Each input returns the [`Effect`]s the
//! driver must carry out, in order.

use std::time::Duration;

use crate::models::{Block, Chapter, ChapterId, Snapshot};
use crate::sync::retry::RetryPolicy;

/// Tunables of the synchronizer
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Quiet period after the last edit before a save is attempted
    pub debounce: Duration,
    pub retry: RetryPolicy,
}

impl SyncSettings {
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(5000);
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Self::DEFAULT_DEBOUNCE,
            retry: RetryPolicy::default(),
        }
    }
}

/// User-visible persistence state of the open chapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveStatus {
    /// No chapter open
    Idle,
    Loading,
    LoadFailed,
    /// Editor content matches what the server last confirmed
    Saved,
    /// Local edits not yet persisted
    Unsaved,
    Saving,
    /// A save failed and another attempt is scheduled
    Retrying { attempt: u32 },
    /// Saving gave up; the edits are kept until the next change
    Failed { attempts: u32 },
}

impl SaveStatus {
    pub fn has_unsaved_changes(&self) -> bool {
        matches!(
            self,
            SaveStatus::Unsaved
                | SaveStatus::Saving
                | SaveStatus::Retrying { .. }
                | SaveStatus::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized {
        chapter_id: Option<ChapterId>,
    },
    Loaded {
        baseline: Snapshot,
    },
    PendingSave {
        baseline: Snapshot,
        pending: Snapshot,
    },
    Saving {
        baseline: Snapshot,
        in_flight: Snapshot,
        /// Edit that arrived while the save was in flight
        queued: Option<Snapshot>,
        /// The debounce fired during the save, so `queued` is already due
        flush_on_complete: bool,
    },
}

/// Instruction for the driver
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CancelTimer,
    ArmTimer(Duration),
    Load(ChapterId),
    ClearEditor,
    ReplaceEditor(Vec<Block>),
    Save(Snapshot),
    Invalidate(ChapterId),
    Status(SaveStatus),
}

#[derive(Debug)]
pub struct Synchronizer {
    settings: SyncSettings,
    active: Option<ChapterId>,
    state: SyncState,
    failed_attempts: u32,
}

impl Synchronizer {
    pub fn new(settings: SyncSettings) -> Self {
        Self {
            settings,
            active: None,
            state: SyncState::Uninitialized { chapter_id: None },
            failed_attempts: 0,
        }
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn active_chapter(&self) -> Option<&ChapterId> {
        self.active.as_ref()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Abandon everything belonging to the previous chapter and start
    /// loading `chapter_id`.
    pub fn switch_chapter(&mut self, chapter_id: ChapterId) -> Vec<Effect> {
        if self.active.as_ref() == Some(&chapter_id) {
            // Reopening a chapter whose load never landed retries the load
            return match self.state {
                SyncState::Uninitialized { .. } => vec![
                    Effect::Load(chapter_id),
                    Effect::Status(SaveStatus::Loading),
                ],
                _ => Vec::new(),
            };
        }
        if let Some(pending) = self.pending() {
            log::info!(
                "Discarding unsaved edits of chapter {} on switch to {chapter_id}",
                pending.chapter_id
            );
        }

        self.active = Some(chapter_id.clone());
        self.state = SyncState::Uninitialized {
            chapter_id: Some(chapter_id.clone()),
        };
        self.failed_attempts = 0;

        vec![
            Effect::CancelTimer,
            Effect::ClearEditor,
            Effect::Load(chapter_id),
            Effect::Status(SaveStatus::Loading),
        ]
    }

    /// Server data arrived for a chapter.
    ///
    /// Sets the baseline at most once per load. The editor content is only
    /// replaced when the editor is still empty; edits typed while loading
    /// stay in the editor and are fed back by the driver as a local change.
    pub fn loaded(&mut self, chapter: Chapter, editor_is_empty: bool) -> Vec<Effect> {
        if self.active.as_ref() != Some(&chapter.id) {
            log::debug!("Ignoring load of inactive chapter {}", chapter.id);
            return Vec::new();
        }
        if !matches!(self.state, SyncState::Uninitialized { .. }) {
            log::debug!("Chapter {} already initialized", chapter.id);
            return Vec::new();
        }

        let baseline = chapter.snapshot();
        self.state = SyncState::Loaded { baseline };
        if !editor_is_empty {
            log::info!("Keeping edits made while chapter {} was loading", chapter.id);
            return vec![Effect::Status(SaveStatus::Saved)];
        }
        vec![
            Effect::ReplaceEditor(chapter.blocks),
            Effect::Status(SaveStatus::Saved),
        ]
    }

    pub fn load_failed(&mut self, chapter_id: &ChapterId) -> Vec<Effect> {
        if self.active.as_ref() != Some(chapter_id) {
            return Vec::new();
        }
        vec![Effect::Status(SaveStatus::LoadFailed)]
    }

    /// A rendered snapshot of the editor content is ready
    pub fn local_change(&mut self, snapshot: Snapshot) -> Vec<Effect> {
        if self.active.as_ref() != Some(&snapshot.chapter_id) {
            log::debug!(
                "Dropping edit for inactive chapter {}",
                snapshot.chapter_id
            );
            return Vec::new();
        }

        if matches!(self.state, SyncState::Uninitialized { .. }) {
            log::debug!("Dropping edit made before chapter {} loaded", snapshot.chapter_id);
            return Vec::new();
        }

        self.state = match self.take_state() {
            SyncState::Loaded { baseline } | SyncState::PendingSave { baseline, .. } => {
                SyncState::PendingSave {
                    baseline,
                    pending: snapshot,
                }
            }
            SyncState::Saving {
                baseline,
                in_flight,
                ..
            } => SyncState::Saving {
                baseline,
                in_flight,
                queued: Some(snapshot),
                flush_on_complete: false,
            },
            uninitialized @ SyncState::Uninitialized { .. } => uninitialized,
        };
        self.failed_attempts = 0;

        vec![
            Effect::ArmTimer(self.settings.debounce),
            Effect::Status(SaveStatus::Unsaved),
        ]
    }

    /// The debounce timer fired
    pub fn debounce_elapsed(&mut self) -> Vec<Effect> {
        let (state, effects) = match self.take_state() {
            SyncState::PendingSave { baseline, pending } => {
                if pending == baseline {
                    (
                        SyncState::Loaded { baseline },
                        vec![Effect::Status(SaveStatus::Saved)],
                    )
                } else if self.active.as_ref() != Some(&pending.chapter_id)
                    || baseline.chapter_id != pending.chapter_id
                {
                    log::warn!(
                        "Not saving chapter {}: active chapter changed",
                        pending.chapter_id
                    );
                    (SyncState::PendingSave { baseline, pending }, Vec::new())
                } else {
                    let save = Effect::Save(pending.clone());
                    (
                        SyncState::Saving {
                            baseline,
                            in_flight: pending,
                            queued: None,
                            flush_on_complete: false,
                        },
                        vec![save, Effect::Status(SaveStatus::Saving)],
                    )
                }
            }
            SyncState::Saving {
                baseline,
                in_flight,
                queued,
                ..
            } => (
                SyncState::Saving {
                    baseline,
                    in_flight,
                    queued,
                    flush_on_complete: true,
                },
                Vec::new(),
            ),
            other => (other, Vec::new()),
        };

        self.state = state;
        effects
    }

    /// Save now instead of waiting for the debounce
    pub fn flush(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::CancelTimer];
        effects.extend(self.debounce_elapsed());
        effects
    }

    /// The store confirmed a save; `chapter` is what it persisted
    pub fn save_succeeded(&mut self, chapter: Chapter) -> Vec<Effect> {
        if self.active.as_ref() != Some(&chapter.id) {
            log::debug!("Ignoring save result for inactive chapter {}", chapter.id);
            return Vec::new();
        }
        if !matches!(self.state, SyncState::Saving { .. }) {
            log::warn!("Save result for chapter {} arrived while not saving", chapter.id);
            return Vec::new();
        }
        let SyncState::Saving {
            queued,
            flush_on_complete,
            ..
        } = self.take_state()
        else {
            return Vec::new();
        };

        self.failed_attempts = 0;
        let baseline = chapter.snapshot();
        let mut effects = vec![Effect::Invalidate(chapter.id)];

        match queued {
            Some(pending) => {
                self.state = SyncState::PendingSave { baseline, pending };
                if flush_on_complete {
                    effects.push(Effect::ArmTimer(Duration::ZERO));
                }
                effects.push(Effect::Status(SaveStatus::Unsaved));
            }
            None => {
                self.state = SyncState::Loaded { baseline };
                effects.push(Effect::Status(SaveStatus::Saved));
            }
        }
        effects
    }

    /// The store rejected a save. The edits stay pending.
    pub fn save_failed(&mut self, chapter_id: &ChapterId) -> Vec<Effect> {
        if self.active.as_ref() != Some(chapter_id) {
            return Vec::new();
        }
        if !matches!(self.state, SyncState::Saving { .. }) {
            log::warn!("Save failure for chapter {chapter_id} arrived while not saving");
            return Vec::new();
        }
        let SyncState::Saving {
            baseline,
            in_flight,
            queued,
            flush_on_complete,
        } = self.take_state()
        else {
            return Vec::new();
        };

        let edited_meanwhile = queued.is_some();
        self.state = SyncState::PendingSave {
            baseline,
            pending: queued.unwrap_or(in_flight),
        };

        if edited_meanwhile {
            // A newer edit already reset the retry budget and armed the timer
            return if flush_on_complete {
                vec![
                    Effect::ArmTimer(Duration::ZERO),
                    Effect::Status(SaveStatus::Unsaved),
                ]
            } else {
                vec![Effect::Status(SaveStatus::Unsaved)]
            };
        }

        self.failed_attempts += 1;
        match self.settings.retry.backoff(self.failed_attempts) {
            Some(delay) => vec![
                Effect::ArmTimer(delay),
                Effect::Status(SaveStatus::Retrying {
                    attempt: self.failed_attempts,
                }),
            ],
            None => vec![Effect::Status(SaveStatus::Failed {
                attempts: self.failed_attempts,
            })],
        }
    }

    fn take_state(&mut self) -> SyncState {
        let placeholder = SyncState::Uninitialized {
            chapter_id: self.active.clone(),
        };
        std::mem::replace(&mut self.state, placeholder)
    }

    fn pending(&self) -> Option<&Snapshot> {
        match &self.state {
            SyncState::PendingSave { pending, .. } => Some(pending),
            SyncState::Saving {
                queued, in_flight, ..
            } => Some(queued.as_ref().unwrap_or(in_flight)),
            _ => None,
        }
    }
}
