//! Time source shared between the replay loop and the pipeline under test.
//!
//! The loop switches the clock into deterministic mode once per run and then
//! pins it to each frame's header timestamp, so the pipeline reads the
//! recorded time instead of the wall clock.

use crate::errors::HarnessError;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockMode {
    Wall,
    Mock,
}

pub trait MockClock: Send + Sync {
    /// Switches to mock time and resets it to `0.0`.
    fn enable_deterministic_mode(&self);
    fn set_time(&self, seconds: f64) -> Result<(), HarnessError>;
    fn now_seconds(&self) -> f64;
}

#[derive(Debug)]
struct ClockState {
    mode: ClockMode,
    now_sec: f64,
}

/// Production clock: wall time until deterministic mode is enabled.
#[derive(Debug)]
pub struct SimClock {
    state: Mutex<ClockState>,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                mode: ClockMode::Wall,
                now_sec: 0.0,
            }),
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock for SimClock {
    fn enable_deterministic_mode(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.mode = ClockMode::Mock;
            state.now_sec = 0.0;
        }
    }

    fn set_time(&self, seconds: f64) -> Result<(), HarnessError> {
        if !seconds.is_finite() {
            return Err(HarnessError::Process(format!(
                "clock time must be finite, got {seconds}"
            )));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|_| HarnessError::Process("clock lock poisoned".to_string()))?;
        if state.mode != ClockMode::Mock {
            return Err(HarnessError::Process(
                "clock time can only be set in deterministic mode".to_string(),
            ));
        }
        state.now_sec = seconds;
        Ok(())
    }

    fn now_seconds(&self) -> f64 {
        let Ok(state) = self.state.lock() else {
            return 0.0;
        };
        match state.mode {
            ClockMode::Mock => state.now_sec,
            ClockMode::Wall => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        }
    }
}

/// Test double that remembers every `set_time` call.
#[derive(Clone)]
pub struct FakeMockClock {
    now: Arc<Mutex<f64>>,
    sets: Arc<Mutex<Vec<f64>>>,
    enables: Arc<Mutex<u32>>,
}

impl FakeMockClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(0.0)),
            sets: Arc::new(Mutex::new(Vec::new())),
            enables: Arc::new(Mutex::new(0)),
        }
    }

    pub fn set_calls(&self) -> Vec<f64> {
        self.sets.lock().expect("sets lock").clone()
    }

    pub fn enable_calls(&self) -> u32 {
        *self.enables.lock().expect("enables lock")
    }
}

impl Default for FakeMockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClock for FakeMockClock {
    fn enable_deterministic_mode(&self) {
        *self.now.lock().expect("now lock") = 0.0;
        *self.enables.lock().expect("enables lock") += 1;
    }

    fn set_time(&self, seconds: f64) -> Result<(), HarnessError> {
        self.sets.lock().expect("sets lock").push(seconds);
        *self.now.lock().expect("now lock") = seconds;
        Ok(())
    }

    fn now_seconds(&self) -> f64 {
        *self.now.lock().expect("now lock")
    }
}

#[cfg(test)]
mod tests {
    use super::{MockClock, SimClock};

    #[test]
    fn sim_clock_rejects_set_time_outside_deterministic_mode() {
        let clock = SimClock::new();
        let err = clock.set_time(1.0).expect_err("wall mode");
        assert!(err.to_string().contains("deterministic mode"));
    }

    #[test]
    fn sim_clock_reports_exact_time_once_pinned() {
        let clock = SimClock::new();
        clock.enable_deterministic_mode();
        assert_eq!(clock.now_seconds(), 0.0);
        clock.set_time(1_496_250_000.125).expect("set");
        assert_eq!(clock.now_seconds(), 1_496_250_000.125);
        clock.set_time(12.5).expect("set backwards");
        assert_eq!(clock.now_seconds(), 12.5);
    }

    #[test]
    fn sim_clock_rejects_non_finite_time() {
        let clock = SimClock::new();
        clock.enable_deterministic_mode();
        assert!(clock.set_time(f64::NAN).is_err());
        assert!(clock.set_time(f64::INFINITY).is_err());
    }
}
