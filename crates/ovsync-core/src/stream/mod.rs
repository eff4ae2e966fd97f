// ── Cache change feeds ──
//
// Each typed cache publishes one name-ordered snapshot per applied batch
// that touched its table. `EntityStream` follows those snapshots whole;
// `EntityWatch` narrows them to the one entity a caller cares about.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_core::Stream;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::Entity;

/// All entities of one kind, sorted by name then uuid.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// First entity named `name` in a name-sorted snapshot.
fn find_named<T: Entity>(snapshot: &[Arc<T>], name: &str) -> Option<Arc<T>> {
    let at = snapshot.partition_point(|entity| entity.name() < name);
    snapshot
        .get(at)
        .filter(|entity| entity.name() == name)
        .cloned()
}

/// A subscription to one typed cache.
pub struct EntityStream<T: Entity> {
    seen: Snapshot<T>,
    receiver: watch::Receiver<Snapshot<T>>,
}

impl<T: Entity> EntityStream<T> {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot<T>>) -> Self {
        let seen = receiver.borrow().clone();
        Self { seen, receiver }
    }

    /// The snapshot taken at subscription or at the last `changed()`.
    pub fn current(&self) -> &Snapshot<T> {
        &self.seen
    }

    /// The newest published snapshot, possibly ahead of `current()`.
    pub fn latest(&self) -> Snapshot<T> {
        self.receiver.borrow().clone()
    }

    /// Look `name` up in `current()`.
    pub fn get(&self, name: &str) -> Option<Arc<T>> {
        find_named(&self.seen, name)
    }

    /// Wait for the next batch that touched this table. Returns `None`
    /// once the DataStore is gone.
    pub async fn changed(&mut self) -> Option<Snapshot<T>> {
        self.receiver.changed().await.ok()?;
        self.seen = self.receiver.borrow_and_update().clone();
        Some(self.seen.clone())
    }

    /// Every snapshot as a `Stream`, starting with the newest one.
    pub fn into_stream(self) -> WatchStream<Snapshot<T>> {
        WatchStream::new(self.receiver)
    }

    /// Follow the entity named `name` only.
    pub fn watch(self, name: &str) -> EntityWatch<T> {
        let last = find_named(&self.latest(), name);
        EntityWatch {
            name: name.to_owned(),
            last,
            inner: WatchStream::new(self.receiver),
        }
    }
}

/// `Stream` of one named entity. Yields `Some(entity)` when it appears or
/// its row changes and `None` when it is removed; batches that leave it
/// untouched yield nothing.
pub struct EntityWatch<T: Entity> {
    name: String,
    last: Option<Arc<T>>,
    inner: WatchStream<Snapshot<T>>,
}

impl<T: Entity> EntityWatch<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entity as of the last yielded item.
    pub fn current(&self) -> Option<&Arc<T>> {
        self.last.as_ref()
    }
}

fn unchanged<T: Entity>(before: Option<&Arc<T>>, after: Option<&Arc<T>>) -> bool {
    match (before, after) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b) || a == b,
        _ => false,
    }
}

impl<T: Entity> Stream for EntityWatch<T> {
    type Item = Option<Arc<T>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let Some(snapshot) = ready!(Pin::new(&mut self.inner).poll_next(cx)) else {
                return Poll::Ready(None);
            };
            let next = find_named(&snapshot, &self.name);
            if !unchanged(self.last.as_ref(), next.as_ref()) {
                self.last.clone_from(&next);
                return Poll::Ready(Some(next));
            }
        }
    }
}
