//! Fan-in of every channel that can report the active session.

pub mod cache_watch;
pub mod poll;
pub mod push;
pub mod reconciler;
pub mod source;
pub mod store;

pub use cache_watch::CacheSource;
pub use poll::PollSource;
pub use push::{PushPublisher, PushSource};
pub use source::{SessionSource, SourceError, SourceKind, SourceUpdate};
pub use store::{SessionStateStore, Subscription};
