//! A dispatch loop owned by a dedicated worker thread.
//!
//! The worker holds the loop lock while it dispatches tasks and releases
//! it only while blocked waiting for new work, so external threads can
//! take the lock to mutate loop-visible state (node formats, buffers)
//! without ever racing a handler. Two condition variables implement the
//! signal/wait/accept rendezvous by which a handler hands a value to a
//! waiting external thread:
//!
//! - app thread: `lock(); invoke(work); wait(); ...read result...;
//!   accept(); drop(guard);`
//! - handler: `...produce result...; dispatch.signal(true);` which blocks
//!   until the app thread calls `accept`.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::thread::ThreadId;

use crate::error::LoopStartError;
use crate::loop_context::{LoopContext, LoopMsg};

struct LoopState {
    n_waiting: u32,
    n_waiting_for_accept: u32,
}

struct LoopInner {
    state: Mutex<LoopState>,
    /// Condition A: signalled by the worker, awaited by external threads.
    signal_cond: Condvar,
    /// Condition B: signalled by `accept`, awaited by the worker inside
    /// `signal(true)`.
    accept_cond: Condvar,
}

/// A loop context driven by its own named worker thread.
pub struct ThreadLoop {
    name: String,
    context: LoopContext,
    inner: Arc<LoopInner>,
    thread: Option<thread::JoinHandle<()>>,
    worker_id: Option<ThreadId>,
}

impl ThreadLoop {
    /// Create a loop around a fresh context.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_context(LoopContext::new(), name)
    }

    /// Create a loop hosting an existing context.
    pub fn with_context(context: LoopContext, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context,
            inner: Arc::new(LoopInner {
                state: Mutex::new(LoopState { n_waiting: 0, n_waiting_for_accept: 0 }),
                signal_cond: Condvar::new(),
                accept_cond: Condvar::new(),
            }),
            thread: None,
            worker_id: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The hosted context; clone it to post tasks from anywhere.
    pub fn context(&self) -> &LoopContext {
        &self.context
    }

    /// Spawn the worker thread.
    ///
    /// Returns once the thread exists; it may not have entered the
    /// dispatch loop yet.
    pub fn start(&mut self) -> Result<(), LoopStartError> {
        if self.thread.is_some() {
            return Err(LoopStartError::AlreadyStarted);
        }

        let inner = Arc::clone(&self.inner);
        let context = self.context.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || worker(&inner, &context))
            .map_err(LoopStartError::Spawn)?;

        self.worker_id = Some(handle.thread().id());
        self.thread = Some(handle);

        log::debug!("thread-loop {}: started", self.name);
        Ok(())
    }

    /// Ask the loop to quit and join the worker.
    ///
    /// Must not be called from inside the worker thread.
    pub fn stop(&mut self) {
        assert!(!self.in_thread(), "ThreadLoop::stop called from its own worker thread");

        if let Some(handle) = self.thread.take() {
            self.context.post_quit();
            let _ = handle.join();
            self.worker_id = None;
            log::debug!("thread-loop {}: stopped", self.name);
        }
    }

    /// True iff called from this loop's worker thread.
    pub fn in_thread(&self) -> bool {
        self.worker_id == Some(thread::current().id())
    }

    /// Acquire the loop lock from an external thread.
    ///
    /// While the guard is held the worker cannot resume dispatch, so any
    /// loop-visible state may be mutated. Dropping the guard unlocks.
    /// Must not be called from inside the worker thread: the worker
    /// already holds the lock except while polling.
    pub fn lock(&self) -> LoopGuard<'_> {
        assert!(!self.in_thread(), "ThreadLoop::lock called from its own worker thread");

        LoopGuard {
            inner: &self.inner,
            context: &self.context,
            guard: Some(self.inner.state.lock().unwrap()),
        }
    }
}

impl Drop for ThreadLoop {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

/// The loop lock as held by an external thread.
pub struct LoopGuard<'a> {
    inner: &'a LoopInner,
    context: &'a LoopContext,
    guard: Option<MutexGuard<'a, LoopState>>,
}

impl LoopGuard<'_> {
    /// Post a task while holding the lock. The worker picks it up as
    /// soon as the guard is dropped or parked in `wait`.
    pub fn invoke<F>(&self, f: F)
    where
        F: FnOnce(&mut LoopDispatch<'_>) + Send + 'static,
    {
        self.context.invoke(f);
    }

    /// Block until a handler on the worker calls `signal`.
    ///
    /// The lock is released while waiting and reacquired before this
    /// returns.
    pub fn wait(&mut self) {
        let mut state = self.guard.take().expect("loop guard poisoned");
        state.n_waiting += 1;
        state = self.inner.signal_cond.wait(state).unwrap();
        debug_assert!(state.n_waiting > 0);
        state.n_waiting -= 1;
        self.guard = Some(state);
    }

    /// Release a handler blocked in `signal(true)`.
    pub fn accept(&mut self) {
        let state = self.guard.as_mut().expect("loop guard poisoned");
        assert!(state.n_waiting_for_accept > 0, "accept without a pending signal");
        state.n_waiting_for_accept -= 1;
        self.inner.accept_cond.notify_one();
    }
}

/// The worker-side view of the loop handed to every dispatched task.
pub struct LoopDispatch<'a> {
    inner: &'a LoopInner,
    guard: Option<MutexGuard<'a, LoopState>>,
}

impl LoopDispatch<'_> {
    /// Wake external threads blocked in `wait`.
    ///
    /// With `wait_for_accept` set, this blocks (releasing the lock) until
    /// one of them calls `accept`, which gives a linearizable handoff:
    /// the waiter observes the handler's result before this returns.
    pub fn signal(&mut self, wait_for_accept: bool) {
        let mut state = self.guard.take().expect("loop dispatch poisoned");

        if state.n_waiting > 0 {
            self.inner.signal_cond.notify_all();
        }

        if wait_for_accept {
            state.n_waiting_for_accept += 1;
            while state.n_waiting_for_accept > 0 {
                state = self.inner.accept_cond.wait(state).unwrap();
            }
        }

        self.guard = Some(state);
    }
}

/// Body of the worker thread.
///
/// Dispatch runs with the lock held; only the blocking poll gives it up.
/// This is the counterpart of `ThreadLoop::lock`: external threads get
/// the lock exactly when the worker is waiting for work.
fn worker(inner: &LoopInner, context: &LoopContext) {
    let guard = inner.state.lock().unwrap();
    let mut dispatch = LoopDispatch { inner, guard: Some(guard) };

    log::debug!("thread-loop worker: enter");

    loop {
        // The locked poll: unlock, block on the context, relock.
        let msg = {
            drop(dispatch.guard.take());
            let msg = context.poll();
            dispatch.guard = Some(inner.state.lock().unwrap());
            msg
        };

        match msg {
            LoopMsg::Invoke(task) => task(&mut dispatch),
            LoopMsg::Quit => break,
        }
    }

    log::debug!("thread-loop worker: done");
}
