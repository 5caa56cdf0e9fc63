use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Direction, FetchError, PendingTask};

/// Lifecycle notifications emitted by a [`crate::ChunksArray`].
#[derive(Clone, Debug)]
pub enum ArrayEvent {
    /// A backward fetch is about to insert `inserted` slots at the head of the buffer.
    ///
    /// Emitted before the buffer changes, so a subscriber can pre-compensate scroll position.
    /// `pending` settles once the insertion is applied.
    HeadAboutToChange {
        pending: PendingTask,
        inserted: usize,
    },
    /// A backward fetch reached the beginning of the collection and is about to remove the
    /// `removed` placeholders left at the head. The window moves up by the same amount.
    ///
    /// Emitted before the buffer changes; `pending` settles once the removal is applied.
    HeadTrimmed {
        pending: PendingTask,
        removed: usize,
    },
    FetchStarted(Direction),
    FetchResolved(Direction),
    FetchRejected(Direction, FetchError),
    /// A head reload or a jump started; the whole buffer will be replaced.
    FullResetStarted { pending: PendingTask },
}

pub type Listener = Arc<dyn Fn(&ArrayEvent) + Send + Sync>;

/// Token returned by [`crate::ChunksArray::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    entries: Vec<(ListenerId, Listener)>,
}

impl Listeners {
    pub(crate) fn add(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    fn snapshot(&self) -> Vec<Listener> {
        self.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
    }
}

/// Invokes every listener without holding the registry lock, so listeners may subscribe,
/// unsubscribe, or query the array.
pub(crate) fn emit(listeners: &Mutex<Listeners>, event: ArrayEvent) {
    let snapshot = listeners.lock().snapshot();
    rtrace!(event = ?event, listeners = snapshot.len(), "emit");
    for listener in snapshot {
        listener(&event);
    }
}
