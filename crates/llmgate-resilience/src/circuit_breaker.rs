use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-upstream circuit state. `CLOSED` is the steady state; `OPEN` fails
/// fast once consecutive failures cross the threshold; `HALF_OPEN` admits a
/// bounded number of trial requests after the timeout elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub timeout: Duration,
    pub half_open_max: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            timeout: Duration::from_secs(30),
            half_open_max: 1,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    half_open_inflight: u32,
}

/// A permit admitted by [`CircuitBreaker::allow`]. Must be resolved with
/// [`Trial::success`] or [`Trial::failure`] once the call completes; drop
/// without resolving is treated as neither (the trial slot is simply
/// released, matching a canceled request).
pub struct Trial<'a> {
    breaker: &'a CircuitBreaker,
    was_half_open: bool,
    resolved: bool,
}

impl Trial<'_> {
    pub fn success(mut self) {
        self.resolved = true;
        self.breaker.on_success(self.was_half_open);
    }

    pub fn failure(mut self) {
        self.resolved = true;
        self.breaker.on_failure(self.was_half_open);
    }
}

impl Drop for Trial<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.was_half_open {
            let mut inner = self.breaker.inner.lock().unwrap();
            inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
        }
    }
}

/// Per-upstream circuit breaker. One instance lives inside each upstream
/// client pool entry; state transitions are guarded by a single mutex since
/// they are rare compared to the request rate.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

#[derive(Debug, thiserror::Error)]
#[error("circuit open")]
pub struct CircuitOpenError;

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                half_open_inflight: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Admits a trial, or returns `CircuitOpenError` for a fast-fail caller.
    pub fn allow(&self) -> Result<Trial<'_>, CircuitOpenError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Ok(Trial {
                breaker: self,
                was_half_open: false,
                resolved: false,
            }),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.config.timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_inflight = 1;
                    Ok(Trial {
                        breaker: self,
                        was_half_open: true,
                        resolved: false,
                    })
                } else {
                    Err(CircuitOpenError)
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_inflight < self.config.half_open_max {
                    inner.half_open_inflight += 1;
                    Ok(Trial {
                        breaker: self,
                        was_half_open: true,
                        resolved: false,
                    })
                } else {
                    Err(CircuitOpenError)
                }
            }
        }
    }

    fn on_success(&self, was_half_open: bool) {
        let mut inner = self.inner.lock().unwrap();
        if was_half_open {
            inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    fn on_failure(&self, was_half_open: bool) {
        let mut inner = self.inner.lock().unwrap();
        if was_half_open {
            inner.half_open_inflight = inner.half_open_inflight.saturating_sub(1);
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            return;
        }
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.config.threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}
