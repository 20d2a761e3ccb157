//! Library readiness gate
//!
//! Settlement primitive for externally loaded rendering engines. Any number
//! of consumers await readiness; load callbacks or the presence poll settle
//! the gate exactly once, and every later signal is a silent no-op. The
//! timer that drives [`PresenceWatch::tick`] lives in the API layer, so
//! this module stays pure and natively testable.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum GateError {
    #[error("{library} loading timed out after {seconds}s")]
    Timeout { library: String, seconds: u32 },
    #[error("{0}")]
    LoadFailed(String),
}

/// Settlement status of one gate
#[derive(Clone, Debug, PartialEq)]
pub enum ReadinessState {
    Pending,
    Resolved,
    Rejected(GateError),
}

struct GateInner {
    library: String,
    state: ReadinessState,
    waiters: Vec<Waker>,
}

/// Single-resolution readiness gate for one external library.
///
/// Clones share the same settlement state; handing a clone to a loader
/// callback is the supported way to wire `onload`/`onerror` into the gate.
#[derive(Clone)]
pub struct ReadinessGate {
    inner: Arc<Mutex<GateInner>>,
}

impl ReadinessGate {
    pub fn new(library: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GateInner {
                library: library.to_string(),
                state: ReadinessState::Pending,
                waiters: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock().unwrap()
    }

    pub fn library(&self) -> String {
        self.lock().library.clone()
    }

    pub fn state(&self) -> ReadinessState {
        self.lock().state.clone()
    }

    /// The settled outcome, or `None` while still pending.
    pub fn settled(&self) -> Option<Result<(), GateError>> {
        match self.lock().state {
            ReadinessState::Pending => None,
            ReadinessState::Resolved => Some(Ok(())),
            ReadinessState::Rejected(ref err) => Some(Err(err.clone())),
        }
    }

    /// Mark the library usable. First settlement wins; returns whether this
    /// call was the one that settled the gate.
    pub fn signal_ready(&self) -> bool {
        self.settle(ReadinessState::Resolved)
    }

    /// Mark the library unusable with a caller-supplied reason.
    pub fn signal_failed(&self, reason: impl Into<String>) -> bool {
        self.settle(ReadinessState::Rejected(GateError::LoadFailed(reason.into())))
    }

    pub(crate) fn fail_with(&self, err: GateError) -> bool {
        self.settle(ReadinessState::Rejected(err))
    }

    fn settle(&self, next: ReadinessState) -> bool {
        let (library, waiters) = {
            let mut inner = self.lock();
            if inner.state != ReadinessState::Pending {
                return false;
            }
            inner.state = next.clone();
            (inner.library.clone(), std::mem::take(&mut inner.waiters))
        };
        match next {
            ReadinessState::Resolved => log::info!("{} is ready", library),
            ReadinessState::Rejected(ref err) => log::error!("{} unavailable: {}", library, err),
            ReadinessState::Pending => unreachable!(),
        }
        // wake outside the lock; a woken task may poll synchronously
        for waker in waiters {
            waker.wake();
        }
        true
    }

    /// Future resolving with the settled outcome. Safe to call before,
    /// during, or after settlement; all pending waiters complete together.
    pub fn wait(&self) -> WaitReady {
        WaitReady { gate: self.clone() }
    }
}

impl std::fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("ReadinessGate")
            .field("library", &inner.library)
            .field("state", &inner.state)
            .field("waiters", &inner.waiters.len())
            .finish()
    }
}

pub struct WaitReady {
    gate: ReadinessGate,
}

impl Future for WaitReady {
    type Output = Result<(), GateError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.gate.lock();
        match inner.state {
            ReadinessState::Resolved => Poll::Ready(Ok(())),
            ReadinessState::Rejected(ref err) => Poll::Ready(Err(err.clone())),
            ReadinessState::Pending => {
                if !inner.waiters.iter().any(|w| w.will_wake(cx.waker())) {
                    inner.waiters.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

/// Poll/timeout schedule for one gate
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WatchConfig {
    pub poll_interval_ms: u32,
    pub soft_timeout_ms: u32,
    pub hard_timeout_ms: u32,
}

impl WatchConfig {
    /// Schedule for the primary engine: 100 ms poll, 15 s warning, 30 s
    /// rejection.
    pub fn primary() -> Self {
        Self {
            poll_interval_ms: 100,
            soft_timeout_ms: 15_000,
            hard_timeout_ms: 30_000,
        }
    }

    /// The fallback engine gets twice the hard deadline; it is the last
    /// rendering path left when this one times out.
    pub fn fallback() -> Self {
        Self {
            hard_timeout_ms: 60_000,
            ..Self::primary()
        }
    }
}

/// What the interval driver should do after a tick
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WatchStep {
    /// Keep polling
    Continue,
    /// Soft timeout crossed; a warning was logged, keep polling
    Warned,
    /// Gate settled (by presence, timeout, or an external signal); stop
    Settled,
}

/// Fixed-interval presence poll with soft/hard timeout escalation.
///
/// The driver calls [`tick`](Self::tick) once per interval with the injected
/// probe's answer; the watch advances its clock by the configured interval
/// and settles the gate on presence or hard timeout.
pub struct PresenceWatch {
    gate: ReadinessGate,
    config: WatchConfig,
    elapsed_ms: u32,
    soft_warned: bool,
}

impl PresenceWatch {
    pub fn new(gate: ReadinessGate, config: WatchConfig) -> Self {
        Self {
            gate,
            config,
            elapsed_ms: 0,
            soft_warned: false,
        }
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn elapsed_ms(&self) -> u32 {
        self.elapsed_ms
    }

    pub fn tick(&mut self, present: bool) -> WatchStep {
        if self.gate.settled().is_some() {
            return WatchStep::Settled;
        }
        if present {
            log::info!(
                "{} loaded after {}ms",
                self.gate.library(),
                self.elapsed_ms
            );
            self.gate.signal_ready();
            return WatchStep::Settled;
        }

        self.elapsed_ms += self.config.poll_interval_ms;

        if !self.soft_warned && self.elapsed_ms >= self.config.soft_timeout_ms {
            self.soft_warned = true;
            log::warn!(
                "{} taking longer than {}s to load, still polling",
                self.gate.library(),
                self.config.soft_timeout_ms / 1000
            );
            return WatchStep::Warned;
        }

        if self.elapsed_ms >= self.config.hard_timeout_ms {
            let seconds = self.config.hard_timeout_ms / 1000;
            self.gate.fail_with(GateError::Timeout {
                library: self.gate.library(),
                seconds,
            });
            return WatchStep::Settled;
        }

        WatchStep::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{RawWaker, RawWakerVTable};

    fn noop_waker() -> Waker {
        fn clone(_: *const ()) -> RawWaker {
            RawWaker::new(std::ptr::null(), &VTABLE)
        }
        fn no_op(_: *const ()) {}
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }

    fn counting_waker(counter: Arc<AtomicUsize>) -> Waker {
        fn clone(data: *const ()) -> RawWaker {
            unsafe { Arc::increment_strong_count(data as *const AtomicUsize) };
            RawWaker::new(data, &VTABLE)
        }
        fn wake(data: *const ()) {
            let counter = unsafe { Arc::from_raw(data as *const AtomicUsize) };
            counter.fetch_add(1, Ordering::SeqCst);
        }
        fn wake_by_ref(data: *const ()) {
            let counter = unsafe { &*(data as *const AtomicUsize) };
            counter.fetch_add(1, Ordering::SeqCst);
        }
        fn drop_fn(data: *const ()) {
            unsafe { drop(Arc::from_raw(data as *const AtomicUsize)) };
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, wake, wake_by_ref, drop_fn);
        unsafe { Waker::from_raw(RawWaker::new(Arc::into_raw(counter) as *const (), &VTABLE)) }
    }

    fn poll_once(wait: &mut WaitReady, waker: &Waker) -> Poll<Result<(), GateError>> {
        let mut cx = Context::from_waker(waker);
        Pin::new(wait).poll(&mut cx)
    }

    #[test]
    fn first_settlement_wins() {
        let gate = ReadinessGate::new("TestLib");
        assert!(gate.signal_ready());
        assert!(!gate.signal_ready(), "second ready is a no-op");
        assert!(!gate.signal_failed("too late"), "fail after ready is a no-op");
        assert_eq!(gate.state(), ReadinessState::Resolved);
    }

    #[test]
    fn failure_then_ready_keeps_the_failure() {
        let gate = ReadinessGate::new("TestLib");
        assert!(gate.signal_failed("script error"));
        assert!(!gate.signal_ready());
        assert_eq!(
            gate.state(),
            ReadinessState::Rejected(GateError::LoadFailed("script error".into()))
        );
    }

    #[test]
    fn double_failure_rejects_once_with_first_reason() {
        let gate = ReadinessGate::new("TestLib");
        assert!(gate.signal_failed("timeout"));
        assert!(!gate.signal_failed("timeout"), "second failure is a no-op");
        let err = match gate.settled() {
            Some(Err(err)) => err,
            other => panic!("expected a rejection, got {:?}", other),
        };
        assert_eq!(err.to_string(), "timeout");
    }

    #[test]
    fn wait_after_settlement_completes_immediately() {
        let gate = ReadinessGate::new("TestLib");
        gate.signal_ready();
        let waker = noop_waker();
        let mut wait = gate.wait();
        assert_eq!(poll_once(&mut wait, &waker), Poll::Ready(Ok(())));

        let failed = ReadinessGate::new("OtherLib");
        failed.signal_failed("no network");
        let mut wait = failed.wait();
        match poll_once(&mut wait, &waker) {
            Poll::Ready(Err(GateError::LoadFailed(reason))) => assert_eq!(reason, "no network"),
            other => panic!("expected immediate rejection, got {:?}", other),
        }
    }

    #[test]
    fn pending_wait_registers_and_settlement_wakes_all_waiters() {
        let gate = ReadinessGate::new("TestLib");
        let counter = Arc::new(AtomicUsize::new(0));
        let waker_a = counting_waker(counter.clone());
        let waker_b = counting_waker(counter.clone());

        let mut wait_a = gate.wait();
        let mut wait_b = gate.wait();
        assert!(poll_once(&mut wait_a, &waker_a).is_pending());
        assert!(poll_once(&mut wait_b, &waker_b).is_pending());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        gate.signal_ready();
        assert_eq!(counter.load(Ordering::SeqCst), 2, "both waiters woken");
        assert_eq!(poll_once(&mut wait_a, &waker_a), Poll::Ready(Ok(())));
        assert_eq!(poll_once(&mut wait_b, &waker_b), Poll::Ready(Ok(())));
    }

    #[test]
    fn repolling_does_not_duplicate_a_waiter() {
        let gate = ReadinessGate::new("TestLib");
        let counter = Arc::new(AtomicUsize::new(0));
        let waker = counting_waker(counter.clone());
        let mut wait = gate.wait();
        assert!(poll_once(&mut wait, &waker).is_pending());
        assert!(poll_once(&mut wait, &waker).is_pending());
        gate.signal_ready();
        assert_eq!(counter.load(Ordering::SeqCst), 1, "one wake per waiter");
    }

    #[test]
    fn watch_settles_on_presence() {
        let gate = ReadinessGate::new("TestLib");
        let mut watch = PresenceWatch::new(gate.clone(), WatchConfig::primary());
        assert_eq!(watch.tick(false), WatchStep::Continue);
        assert_eq!(watch.tick(true), WatchStep::Settled);
        assert_eq!(gate.state(), ReadinessState::Resolved);
    }

    #[test]
    fn watch_warns_once_at_soft_timeout_then_keeps_polling() {
        let config = WatchConfig {
            poll_interval_ms: 100,
            soft_timeout_ms: 300,
            hard_timeout_ms: 1_000,
        };
        let gate = ReadinessGate::new("TestLib");
        let mut watch = PresenceWatch::new(gate.clone(), config);
        assert_eq!(watch.tick(false), WatchStep::Continue); // 100ms
        assert_eq!(watch.tick(false), WatchStep::Continue); // 200ms
        assert_eq!(watch.tick(false), WatchStep::Warned); // 300ms
        assert_eq!(watch.tick(false), WatchStep::Continue); // 400ms, no second warning
        assert_eq!(gate.state(), ReadinessState::Pending);
    }

    #[test]
    fn watch_rejects_at_hard_timeout() {
        let config = WatchConfig {
            poll_interval_ms: 100,
            soft_timeout_ms: 100_000,
            hard_timeout_ms: 300,
        };
        let gate = ReadinessGate::new("TestLib");
        let mut watch = PresenceWatch::new(gate.clone(), config);
        watch.tick(false);
        watch.tick(false);
        assert_eq!(watch.tick(false), WatchStep::Settled);
        assert_eq!(
            gate.state(),
            ReadinessState::Rejected(GateError::Timeout {
                library: "TestLib".into(),
                seconds: 0,
            })
        );
    }

    #[test]
    fn watch_stops_when_settled_externally() {
        let gate = ReadinessGate::new("TestLib");
        let mut watch = PresenceWatch::new(gate.clone(), WatchConfig::primary());
        gate.signal_ready();
        assert_eq!(watch.tick(false), WatchStep::Settled);
        assert_eq!(watch.elapsed_ms(), 0, "no clock advance after settlement");
    }

    #[test]
    fn fallback_schedule_doubles_the_hard_deadline() {
        let primary = WatchConfig::primary();
        let fallback = WatchConfig::fallback();
        assert_eq!(primary.hard_timeout_ms, 30_000);
        assert_eq!(fallback.hard_timeout_ms, 60_000);
        assert_eq!(fallback.poll_interval_ms, primary.poll_interval_ms);
        assert_eq!(fallback.soft_timeout_ms, primary.soft_timeout_ms);
    }
}
