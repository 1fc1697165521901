//! The Event Loop: a single-threaded-cooperative dispatch queue shared by a
//! process's Server and Client Endpoints.
//!
//! Every callback registered on a [`crate::server::ServerEndpoint`] or
//! [`crate::client::ClientEndpoint`] runs as a job posted through an
//! [`EventLoopManager`] rather than directly on the Tokio task that read the
//! frame off the wire. Because jobs are drained one at a time by a single
//! dispatch loop, callbacks across every endpoint sharing one loop execute
//! serially — no two callbacks run concurrently, and no endpoint needs its
//! own locking to protect state mutated only from callbacks.
//!
//! The loop itself does not start on construction (mirrors `start(blocking,
//! pollMilliseconds)`/`stop()`): [`EventLoop::new`] only allocates the
//! queue, and [`EventLoop::start`] chooses whether it owns a dedicated
//! background `tokio::runtime::Runtime` or drives the loop inline on the
//! caller's thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Builder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use dqm_core::{NetError, NetResult};

/// Default polling interval [`EventLoop::start`] callers use when they don't
/// care, matching the cadence `dqm-runtime`'s binaries start their shared
/// loop with.
pub const DEFAULT_POLL_MILLIS: u64 = 50;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Inner {
    running: AtomicBool,
    started: AtomicBool,
    shutdown: CancellationToken,
    queue: mpsc::UnboundedSender<Job>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the dispatch queue. Constructing one does not start dispatching;
/// call [`EventLoop::start`] first. Dropping the last clone of its manager
/// does not stop the loop either — call [`EventLoop::stop`] explicitly, since
/// the loop's owner is always explicit rather than tied to a handle's drop.
pub struct EventLoop {
    inner: Arc<Inner>,
}

impl EventLoop {
    /// Allocates the dispatch queue without starting it. `running()` is
    /// `false` and [`EventLoopManager::dispatch`] fails until
    /// [`EventLoop::start`] is called.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let inner = Arc::new(Inner {
            running: AtomicBool::new(false),
            started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            queue: tx,
            receiver: Mutex::new(Some(rx)),
            worker: Mutex::new(None),
        });

        Self { inner }
    }

    /// A cloneable handle endpoints use to post callback jobs.
    pub fn manager(&self) -> EventLoopManager {
        EventLoopManager {
            inner: self.inner.clone(),
        }
    }

    /// Whether the loop is currently dispatching jobs.
    pub fn running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Starts dispatching queued jobs, waking every `poll_millis` to check
    /// for a stop request. Idempotent: a second call while already started
    /// is a no-op, regardless of `blocking`/`poll_millis`.
    ///
    /// If `blocking`, a single-threaded Tokio runtime drives the dispatch
    /// loop inline on the calling thread, and this call does not return
    /// until [`EventLoop::stop`] is called from elsewhere (another thread,
    /// or a job the loop itself runs). Calling this from a thread that is
    /// already inside a Tokio runtime panics (Tokio forbids nesting
    /// runtimes) — blocking mode is for a plain thread, such as a
    /// synchronous `main`.
    ///
    /// Otherwise the loop owns its own background Tokio runtime thread and
    /// this call returns immediately.
    pub fn start(&self, blocking: bool, poll_millis: u64) -> NetResult<()> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            debug!("event loop already started, ignoring start() call");
            return Ok(());
        }

        let receiver = self
            .inner
            .receiver
            .lock()
            .take()
            .expect("receiver is only taken once, guarded by `started`");
        self.inner.running.store(true, Ordering::Release);

        let inner = self.inner.clone();
        let poll = Duration::from_millis(poll_millis.max(1));

        if blocking {
            let rt = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| NetError::InternalFailure(format!("building event loop runtime: {e}")))?;
            rt.block_on(Self::drive(inner, receiver, poll));
            Ok(())
        } else {
            let handle = thread::Builder::new()
                .name("dqm-event-loop".to_string())
                .spawn(move || {
                    let rt = match Builder::new_current_thread().enable_all().build() {
                        Ok(rt) => rt,
                        Err(e) => {
                            warn!(error = %e, "event loop thread failed to build its runtime");
                            return;
                        }
                    };
                    rt.block_on(Self::drive(inner, receiver, poll));
                })
                .map_err(|e| {
                    NetError::InternalFailure(format!("spawning event loop thread: {e}"))
                })?;
            *self.inner.worker.lock() = Some(handle);
            Ok(())
        }
    }

    async fn drive(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<Job>, poll: Duration) {
        let mut ticker = tokio::time::interval(poll);
        loop {
            tokio::select! {
                () = inner.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if !inner.running.load(Ordering::Acquire) {
                        break;
                    }
                }
                job = rx.recv() => {
                    match job {
                        Some(job) => job(),
                        None => break,
                    }
                }
            }
        }
        debug!("event loop shutting down");
    }

    /// Stops accepting new jobs and cancels the shared shutdown token,
    /// which wakes a blocking [`EventLoop::start`] call (or the background
    /// thread's dispatch loop) so it can return.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.shutdown.cancel();
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable, `Send + Sync` handle used by Server/Client Endpoints to post
/// callback invocations onto the owning [`EventLoop`].
#[derive(Clone)]
pub struct EventLoopManager {
    inner: Arc<Inner>,
}

impl EventLoopManager {
    /// Posts `job` to run on the loop's dispatch thread. Returns
    /// [`NetError::NotAllowed`] if the loop has not been started, or has
    /// already been stopped.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> NetResult<()> {
        if !self.inner.running.load(Ordering::Acquire) {
            return Err(NetError::NotAllowed("event loop is not running".to_string()));
        }
        self.inner.queue.send(Box::new(job)).map_err(|_| {
            warn!("event loop dispatch failed: queue closed");
            NetError::NotAllowed("event loop is stopped".to_string())
        })
    }

    /// A token that cancels when the owning loop stops, for endpoints that
    /// need to tear down their own background async tasks alongside it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn dispatch_before_start_fails() {
        let loop_ = EventLoop::new();
        let manager = loop_.manager();
        assert!(manager.dispatch(|| {}).is_err());
    }

    #[tokio::test]
    async fn dispatched_jobs_run_in_order() {
        let loop_ = EventLoop::new();
        loop_.start(false, 5).unwrap();
        let manager = loop_.manager();
        let counter = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for _ in 0..8 {
            let counter = counter.clone();
            let seen = seen.clone();
            manager
                .dispatch(move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    seen.lock().push(n);
                })
                .unwrap();
        }

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(*seen.lock(), (0..8).collect::<Vec<_>>());
        loop_.stop();
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let loop_ = EventLoop::new();
        loop_.start(false, 5).unwrap();
        loop_.start(false, 5).unwrap();
        assert!(loop_.running());
        loop_.stop();
    }

    #[tokio::test]
    async fn dispatch_after_stop_fails() {
        let loop_ = EventLoop::new();
        loop_.start(false, 5).unwrap();
        let manager = loop_.manager();
        loop_.stop();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(manager.dispatch(|| {}).is_err());
    }

    #[test]
    fn blocking_start_drives_the_loop_on_the_caller_and_returns_after_stop() {
        let loop_ = Arc::new(EventLoop::new());
        let manager = loop_.manager();
        let ran = Arc::new(AtomicBool::new(false));

        {
            let ran = ran.clone();
            manager
                .dispatch(move || ran.store(true, Ordering::SeqCst))
                .expect_err("dispatching before start() must fail, the loop isn't running yet");
        }

        let loop_stopper = loop_.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            loop_stopper.stop();
        });

        loop_.start(true, 5).unwrap();
        stopper.join().unwrap();
        assert!(!ran.load(Ordering::SeqCst));
    }
}
