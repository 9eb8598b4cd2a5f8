//! Outgoing change messages and the recipients they are sent to

pub mod protocol;
pub mod watch;

pub use protocol::ClientMessage;
pub use watch::{Recipient, Viewer, ViewerSet, WatchSet};
