//! Recipients of flushed chunk changes

use std::sync::{Mutex, PoisonError};

use crate::core::types::ChunkPos;
use crate::net::protocol::ClientMessage;

/// Something that can receive a chunk change message
pub trait Recipient {
    fn send(&self, message: &ClientMessage);
}

/// The set of recipients watching chunks.
pub trait WatchSet {
    type Recipient: Recipient;

    /// Recipients watching `pos`. With `edge_only`, just those whose view
    /// distance ends exactly at `pos`.
    fn recipients_for(&self, pos: ChunkPos, edge_only: bool) -> impl Iterator<Item = &Self::Recipient>;
}

/// A client viewing a square of chunks around its center
#[derive(Debug)]
pub struct Viewer {
    pub id: u32,
    pub center: ChunkPos,
    pub view_distance: u32,
    inbox: Mutex<Vec<ClientMessage>>,
}

impl Viewer {
    pub fn new(id: u32, center: ChunkPos, view_distance: u32) -> Self {
        Self {
            id,
            center,
            view_distance,
            inbox: Mutex::new(Vec::new()),
        }
    }

    /// Whether `pos` is inside this viewer's view square
    pub fn watches(&self, pos: ChunkPos) -> bool {
        self.center.chessboard_distance(pos) <= self.view_distance
    }

    /// Whether `pos` lies on the outermost ring of the view square
    pub fn is_on_edge(&self, pos: ChunkPos) -> bool {
        self.center.chessboard_distance(pos) == self.view_distance
    }

    /// Take all messages received so far
    pub fn drain(&self) -> Vec<ClientMessage> {
        std::mem::take(&mut *self.inbox.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Recipient for Viewer {
    fn send(&self, message: &ClientMessage) {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
    }
}

/// Flat list of viewers
#[derive(Debug, Default)]
pub struct ViewerSet {
    viewers: Vec<Viewer>,
}

impl ViewerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, viewer: Viewer) {
        self.viewers.push(viewer);
    }

    pub fn get(&self, id: u32) -> Option<&Viewer> {
        self.viewers.iter().find(|viewer| viewer.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Viewer> {
        self.viewers.iter()
    }
}

impl WatchSet for ViewerSet {
    type Recipient = Viewer;

    fn recipients_for(&self, pos: ChunkPos, edge_only: bool) -> impl Iterator<Item = &Viewer> {
        self.viewers
            .iter()
            .filter(move |viewer| viewer.watches(pos) && (!edge_only || viewer.is_on_edge(pos)))
    }
}

/// Send `message` to every recipient for `pos`
pub fn broadcast<W: WatchSet>(watchers: &W, pos: ChunkPos, edge_only: bool, message: &ClientMessage) {
    for recipient in watchers.recipients_for(pos, edge_only) {
        recipient.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::BlockState;
    use glam::IVec3;

    fn message() -> ClientMessage {
        ClientMessage::BlockUpdate {
            pos: IVec3::new(0, 0, 0),
            state: BlockState(1),
        }
    }

    #[test]
    fn test_recipients_by_distance() {
        let mut set = ViewerSet::new();
        set.add(Viewer::new(1, ChunkPos::new(0, 0), 2));
        set.add(Viewer::new(2, ChunkPos::new(10, 0), 2));

        let ids: Vec<u32> = set.recipients_for(ChunkPos::new(1, 1), false).map(|v| v.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_edge_only() {
        let mut set = ViewerSet::new();
        set.add(Viewer::new(1, ChunkPos::new(0, 0), 2));
        set.add(Viewer::new(2, ChunkPos::new(1, 0), 5));

        let edge: Vec<u32> = set.recipients_for(ChunkPos::new(2, 0), true).map(|v| v.id).collect();
        assert_eq!(edge, vec![1]);
    }

    #[test]
    fn test_broadcast_reaches_inbox() {
        let mut set = ViewerSet::new();
        set.add(Viewer::new(7, ChunkPos::new(0, 0), 1));

        broadcast(&set, ChunkPos::new(0, 0), false, &message());
        let viewer = set.get(7).unwrap();
        assert_eq!(viewer.drain(), vec![message()]);
        assert!(viewer.drain().is_empty());
    }
}
