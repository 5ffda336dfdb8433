//! The dispatch context a thread-hosted loop runs on.
//!
//! A `LoopContext` is the multiplexer a loop blocks on: a queue of posted
//! tasks doubling as the wakeup channel. `poll` is the loop's blocking
//! wait; the hosting worker wraps it so the loop lock is released for
//! exactly the duration of the wait (see `ThreadLoop`).

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::thread_loop::LoopDispatch;

/// Work posted to a loop. Runs on the worker with the loop lock held.
pub type LoopTask = Box<dyn FnOnce(&mut LoopDispatch<'_>) + Send + 'static>;

pub(crate) enum LoopMsg {
    Invoke(LoopTask),
    Quit,
}

/// A cloneable handle on one dispatch queue.
///
/// All clones feed the same queue; a loop hosting the context drains it.
#[derive(Clone)]
pub struct LoopContext {
    tx: Sender<LoopMsg>,
    rx: Receiver<LoopMsg>,
}

impl LoopContext {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Post a task to run on the hosting worker thread.
    ///
    /// Wakes the loop if it is blocked in `poll`. Tasks run in post order.
    pub fn invoke<F>(&self, f: F)
    where
        F: FnOnce(&mut LoopDispatch<'_>) + Send + 'static,
    {
        // The queue is unbounded and the receiver lives as long as any
        // sender, so this cannot fail while the context exists.
        let _ = self.tx.send(LoopMsg::Invoke(Box::new(f)));
    }

    /// The blocking wait of the dispatch loop.
    ///
    /// Returns `Quit` if every other handle on the queue is gone.
    pub(crate) fn poll(&self) -> LoopMsg {
        self.rx.recv().unwrap_or(LoopMsg::Quit)
    }

    /// Ask the hosting loop to leave its dispatch loop.
    pub(crate) fn post_quit(&self) {
        let _ = self.tx.send(LoopMsg::Quit);
    }
}

impl Default for LoopContext {
    fn default() -> Self {
        Self::new()
    }
}
