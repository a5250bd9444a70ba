//! Per-chat playback sessions.
//!
//! - `types`: chat ids, commands, queue items and snapshots
//! - `machine`: the playback state machine of one chat
//! - `registry`: lazily created actors, one per chat

mod actor;
mod handle;
mod machine;
mod registry;
pub(crate) mod replies;
#[cfg(test)]
pub(crate) mod test_fixtures;
mod types;

pub use handle::SessionHandle;
pub use machine::{ChatSession, Generations, SessionDeps};
pub use registry::SessionRegistry;
pub use types::{ChatId, ChatKind, Command, QueueItem, SessionEvent, SessionSnapshot, SessionStatus};
