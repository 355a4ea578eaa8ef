//! Sequential event delivery.
//!
//! Events are queued in production order and delivered on a single worker
//! thread. All listeners of one event finish before the next event starts, so
//! a listener is never re-entered.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::{ChannelError, Result};
use crate::event::{Category, Event};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a listener call. `Err` is reported to the peer as an error frame.
pub type ListenerResult = std::result::Result<(), BoxError>;

pub(crate) type Callback = Arc<dyn Fn(&Event) -> ListenerResult + Send + Sync>;

/// Handle returned when a listener is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

#[derive(Clone)]
struct Entry {
    id: ListenerId,
    callback: Callback,
}

/// Listener lists per category, replaced wholesale on every change.
///
/// Dispatch takes a snapshot, so registration changes only affect later events.
pub(crate) struct Listeners {
    next_id: AtomicU64,
    lists: RwLock<[Arc<[Entry]>; 4]>,
}

impl Listeners {
    pub(crate) fn new() -> Self {
        let empty: Arc<[Entry]> = Arc::from(Vec::new());
        Self {
            next_id: AtomicU64::new(1),
            lists: RwLock::new([
                Arc::clone(&empty),
                Arc::clone(&empty),
                Arc::clone(&empty),
                empty,
            ]),
        }
    }

    pub(crate) fn add(&self, category: Category, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        let slot = &mut lists[category.index()];
        let mut entries = slot.to_vec();
        entries.push(Entry { id, callback });
        *slot = Arc::from(entries);
        debug!(%id, ?category, "listener registered");
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        for slot in lists.iter_mut() {
            if slot.iter().any(|entry| entry.id == id) {
                let entries: Vec<Entry> = slot.iter().filter(|e| e.id != id).cloned().collect();
                *slot = Arc::from(entries);
                debug!(%id, "listener removed");
                return true;
            }
        }
        false
    }

    /// Drop every listener, releasing whatever the callbacks captured.
    pub(crate) fn clear(&self) {
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        let empty: Arc<[Entry]> = Arc::from(Vec::new());
        for slot in lists.iter_mut() {
            *slot = Arc::clone(&empty);
        }
    }

    fn snapshot(&self, category: Category) -> Arc<[Entry]> {
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&lists[category.index()])
    }

    #[cfg(test)]
    pub(crate) fn count(&self, category: Category) -> usize {
        self.snapshot(category).len()
    }
}

/// FIFO queue plus the worker thread that drains it.
///
/// Listeners are released once the queue has drained after close.
pub(crate) struct Dispatcher {
    listeners: Arc<Listeners>,
    queue: Mutex<Option<Sender<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    drained: Arc<(Mutex<bool>, Condvar)>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Arc::new(Listeners::new()),
            queue: Mutex::new(None),
            worker: Mutex::new(None),
            drained: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Open the queue and spawn the worker.
    ///
    /// `on_failure` runs on the worker thread with the message of every
    /// listener that returned `Err` or panicked.
    pub(crate) fn open<F>(&self, thread_name: String, on_failure: F) -> Result<()>
    where
        F: Fn(&str) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Event>();
        let listeners = Arc::clone(&self.listeners);
        let drained = Arc::clone(&self.drained);

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                for event in rx {
                    deliver(&listeners, &event, &on_failure);
                }
                trace!("dispatch queue drained");
                // Callbacks often hold channel handles; release them so the
                // channel can be freed.
                listeners.clear();
                let (flag, cvar) = &*drained;
                *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
                cvar.notify_all();
            })
            .map_err(|source| ChannelError::Spawn {
                name: thread_name,
                source,
            })?;

        *self.queue.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Queue an event. Returns `false` once the queue is closed.
    pub(crate) fn publish(&self, event: Event) -> bool {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match queue.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                trace!(category = ?event.category(), "event dropped, dispatch queue closed");
                false
            }
        }
    }

    /// Queue `last` and close the queue. Already queued events still drain.
    pub(crate) fn close_with(&self, last: Event) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = queue.take() {
            let _ = tx.send(last);
        }
    }

    /// Wait for the worker to exit. A no-op on the worker thread itself.
    pub(crate) fn join(&self) {
        let handle = {
            let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            match worker.as_ref() {
                Some(handle) if handle.thread().id() == thread::current().id() => return,
                _ => worker.take(),
            }
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("dispatch thread panicked");
            }
        }
    }

    /// Wait until every queued event has been delivered and the worker exited.
    pub(crate) fn wait_drained(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.drained;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |drained| !*drained)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

fn deliver<F>(listeners: &Listeners, event: &Event, on_failure: &F)
where
    F: Fn(&str),
{
    let category = event.category();
    let entries = listeners.snapshot(category);
    trace!(?category, listeners = entries.len(), "dispatching event");

    for entry in entries.iter() {
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)(event))) {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        warn!(listener = %entry.id, ?category, error = %failure, "listener failed");
        on_failure(&failure);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("listener panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("listener panicked: {msg}")
    } else {
        "listener panicked".to_string()
    }
}
