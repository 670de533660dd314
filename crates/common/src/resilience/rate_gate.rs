//! Hourly admission gate with lock-out support.
//!
//! Caps outbound calls at a configured ceiling per wall-clock hour window
//! (the window is aligned to hour boundaries, matching the upstream's
//! accounting) and absorbs externally imposed lock-outs. The
//! check-and-increment is indivisible: both happen under one mutex, so no
//! interleaving of workers can admit past the ceiling. Admitted slots are
//! never returned — a request counts against the window whether it
//! ultimately succeeded or not.

use std::sync::Mutex;

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};

/// Outcome of a non-blocking admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was taken; the caller may proceed.
    Admitted,
    /// A lock-out is active; retry after the instant.
    Locked(DateTime<Utc>),
    /// The window ceiling is reached; retry after the window rolls over.
    Exhausted(DateTime<Utc>),
}

#[derive(Debug)]
struct GateState {
    window_start: DateTime<Utc>,
    in_window: u32,
    blocked_until: Option<DateTime<Utc>>,
}

/// Global admission gate shared by every worker.
#[derive(Debug)]
pub struct RateGate<C: Clock = SystemClock> {
    safe_limit: u32,
    state: Mutex<GateState>,
    clock: C,
}

impl RateGate<SystemClock> {
    pub fn new(safe_limit: u32) -> Self {
        Self::with_clock(safe_limit, SystemClock)
    }
}

impl<C: Clock> RateGate<C> {
    pub fn with_clock(safe_limit: u32, clock: C) -> Self {
        let window_start = hour_start(clock.now_utc());
        Self {
            safe_limit: safe_limit.max(1),
            state: Mutex::new(GateState { window_start, in_window: 0, blocked_until: None }),
            clock,
        }
    }

    /// Try to take one slot without blocking. Check and increment happen
    /// under the same lock.
    pub fn try_admit(&self) -> Admission {
        let now = self.clock.now_utc();
        let mut state = self.lock_state();

        if now >= state.window_start + ChronoDuration::hours(1) {
            state.window_start = hour_start(now);
            state.in_window = 0;
        }

        if let Some(until) = state.blocked_until {
            if now < until {
                return Admission::Locked(until);
            }
            state.blocked_until = None;
        }

        if state.in_window < self.safe_limit {
            state.in_window += 1;
            debug!(in_window = state.in_window, limit = self.safe_limit, "request admitted");
            Admission::Admitted
        } else {
            Admission::Exhausted(state.window_start + ChronoDuration::hours(1))
        }
    }

    /// Block until a slot is available. Cancellation aborts the wait; a
    /// cancelled call never takes a slot.
    pub async fn admit(&self, cancel: &CancellationToken) -> Result<(), GateClosed> {
        loop {
            let wake = match self.try_admit() {
                Admission::Admitted => return Ok(()),
                Admission::Locked(until) => {
                    warn!(until = %until, "lock-out active; admission paused");
                    until
                }
                Admission::Exhausted(window_end) => {
                    warn!(
                        limit = self.safe_limit,
                        window_end = %window_end,
                        "hourly ceiling reached; admission paused"
                    );
                    window_end
                }
            };

            let pause = (wake - self.clock.now_utc())
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(1));
            // A short floor keeps the loop from spinning when the wake
            // instant is already behind the clock.
            let pause = pause.max(std::time::Duration::from_millis(50));

            tokio::select! {
                _ = cancel.cancelled() => return Err(GateClosed),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Record an externally imposed release instant. The latest of the
    /// existing and new instants wins, so concurrent callers can only push
    /// the release further out.
    pub fn note_lockout(&self, until: DateTime<Utc>) {
        let mut state = self.lock_state();
        let newer = match state.blocked_until {
            Some(existing) => until > existing,
            None => true,
        };
        if newer {
            warn!(until = %until, "lock-out recorded");
            state.blocked_until = Some(until);
        }
    }

    /// Start of the current accounting window.
    pub fn window_start(&self) -> DateTime<Utc> {
        self.lock_state().window_start
    }

    /// Admissions counted in the current window.
    pub fn in_window(&self) -> u32 {
        self.lock_state().in_window
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, GateState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("rate gate lock poisoned");
                poisoned.into_inner()
            }
        }
    }
}

/// Returned by [`RateGate::admit`] when the wait was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateClosed;

fn hour_start(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::TimeZone;

    use super::super::clock::MockClock;
    use super::*;

    fn clock_at(h: u32, m: u32, s: u32) -> MockClock {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).single().expect("valid instant");
        MockClock::at(start)
    }

    #[test]
    fn admits_up_to_the_limit_and_no_further() {
        let gate = RateGate::with_clock(3, clock_at(10, 15, 0));

        assert_eq!(gate.try_admit(), Admission::Admitted);
        assert_eq!(gate.try_admit(), Admission::Admitted);
        assert_eq!(gate.try_admit(), Admission::Admitted);
        match gate.try_admit() {
            Admission::Exhausted(window_end) => {
                assert_eq!(window_end.hour(), 11);
                assert_eq!(window_end.minute(), 0);
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
    }

    #[test]
    fn window_rolls_over_at_the_hour_boundary() {
        let clock = clock_at(10, 59, 59);
        let gate = RateGate::with_clock(1, clock.clone());

        assert_eq!(gate.try_admit(), Admission::Admitted);
        assert!(matches!(gate.try_admit(), Admission::Exhausted(_)));

        // One second later the boundary crosses and the counter resets.
        clock.advance_secs(1);
        assert_eq!(gate.try_admit(), Admission::Admitted);
        assert_eq!(gate.window_start().hour(), 11);
    }

    #[test]
    fn lockout_blocks_until_release_and_latest_wins() {
        let clock = clock_at(10, 0, 0);
        let gate = RateGate::with_clock(100, clock.clone());

        let release_a = clock.now_utc() + ChronoDuration::minutes(10);
        let release_b = clock.now_utc() + ChronoDuration::minutes(5);
        gate.note_lockout(release_a);
        // The earlier instant must not shorten the lock-out.
        gate.note_lockout(release_b);

        assert_eq!(gate.try_admit(), Admission::Locked(release_a));

        clock.advance(ChronoDuration::minutes(10));
        assert_eq!(gate.try_admit(), Admission::Admitted);
    }

    #[test]
    fn lockout_survives_window_rollover() {
        let clock = clock_at(10, 50, 0);
        let gate = RateGate::with_clock(100, clock.clone());
        let release = clock.now_utc() + ChronoDuration::minutes(30); // 11:20
        gate.note_lockout(release);

        clock.advance(ChronoDuration::minutes(15)); // 11:05, new window
        assert_eq!(gate.try_admit(), Admission::Locked(release));

        clock.advance(ChronoDuration::minutes(20)); // 11:25
        assert_eq!(gate.try_admit(), Admission::Admitted);
    }

    #[test]
    fn concurrent_workers_never_exceed_the_ceiling() {
        const LIMIT: u32 = 100;
        const WORKERS: usize = 64;
        const ATTEMPTS_PER_WORKER: usize = 50;

        let clock = clock_at(14, 30, 0);
        let gate = Arc::new(RateGate::with_clock(LIMIT, clock));
        let admitted = Arc::new(AtomicU32::new(0));

        let handles: Vec<_> = (0..WORKERS)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    for _ in 0..ATTEMPTS_PER_WORKER {
                        if gate.try_admit() == Admission::Admitted {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker finished");
        }

        assert_eq!(admitted.load(Ordering::SeqCst), LIMIT);
        assert_eq!(gate.in_window(), LIMIT);
    }

    #[test]
    fn ceiling_resets_per_window_under_contention() {
        const LIMIT: u32 = 10;
        let clock = clock_at(9, 0, 0);
        let gate = Arc::new(RateGate::with_clock(LIMIT, clock.clone()));

        let first_window: u32 =
            (0..50).filter(|_| gate.try_admit() == Admission::Admitted).count() as u32;
        assert_eq!(first_window, LIMIT);

        clock.advance(ChronoDuration::hours(1));
        let second_window: u32 =
            (0..50).filter(|_| gate.try_admit() == Admission::Admitted).count() as u32;
        assert_eq!(second_window, LIMIT);
    }

    #[tokio::test]
    async fn admit_waits_out_a_lockout() {
        let gate = Arc::new(RateGate::new(10));
        gate.note_lockout(Utc::now() + ChronoDuration::milliseconds(150));

        let cancel = CancellationToken::new();
        let started = std::time::Instant::now();
        gate.admit(&cancel).await.expect("admitted after release");
        assert!(started.elapsed() >= std::time::Duration::from_millis(50));
    }

    #[tokio::test]
    async fn cancelled_admit_does_not_consume_a_slot() {
        let gate = Arc::new(RateGate::new(1));
        assert_eq!(gate.try_admit(), Admission::Admitted);

        let cancel = CancellationToken::new();
        let waiter = {
            let gate = Arc::clone(&gate);
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.admit(&cancel).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        let result = waiter.await.expect("task joined");
        assert_eq!(result, Err(GateClosed));
        assert_eq!(gate.in_window(), 1);
    }
}
