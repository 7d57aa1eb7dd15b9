//! Client-side editor synchronization: debounced, chapter-aware saving.

pub mod machine;
pub mod retry;
pub mod session;
pub mod timer;

pub use machine::{Effect, SaveStatus, SyncSettings, SyncState, Synchronizer};
pub use retry::RetryPolicy;
pub use session::{EditorDocument, EditorSession, SessionError, SessionHandle};
pub use timer::DebounceTimer;
