use std::time::{Duration, Instant};

use crate::model::PlaybackState;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound used while the player reports no duration (streams).
pub const UNKNOWN_DURATION_CAP_SECS: f64 = 24.0 * 60.0 * 60.0;

/// Advances the displayed position locally between real queries.
///
/// Fires at most once per poll; missed intervals are skipped, not replayed.
#[derive(Debug)]
pub struct PositionEstimator {
    interval: Duration,
    next_tick: Instant,
}

impl PositionEstimator {
    pub fn new(now: Instant) -> Self {
        Self {
            interval: TICK_INTERVAL,
            next_tick: now + TICK_INTERVAL,
        }
    }

    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    /// Returns true when a tick fired and `state` may have moved.
    pub fn poll(&mut self, now: Instant, state: &mut PlaybackState) -> bool {
        if now < self.next_tick {
            return false;
        }
        self.next_tick += self.interval;
        if self.next_tick <= now {
            self.next_tick = now + self.interval;
        }
        advance(state)
    }
}

/// One estimator step: +1s while playing, never past the known duration.
pub fn advance(state: &mut PlaybackState) -> bool {
    if !state.is_playing {
        return false;
    }
    let cap = if state.duration_secs > 0.0 {
        state.duration_secs
    } else {
        UNKNOWN_DURATION_CAP_SECS
    };
    if state.position_secs >= cap {
        return false;
    }
    state.position_secs = (state.position_secs + TICK_INTERVAL.as_secs_f64()).min(cap);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(duration: f64, position: f64) -> PlaybackState {
        PlaybackState {
            is_playing: true,
            duration_secs: duration,
            position_secs: position,
            ..Default::default()
        }
    }

    #[test]
    fn n_ticks_advance_n_seconds() {
        let mut state = playing(200.0, 10.0);
        for _ in 0..25 {
            assert!(advance(&mut state));
        }
        assert_eq!(state.position_secs, 35.0);
    }

    #[test]
    fn never_exceeds_duration() {
        let mut state = playing(5.0, 3.5);
        advance(&mut state);
        advance(&mut state);
        assert_eq!(state.position_secs, 5.0);
        assert!(!advance(&mut state));
        assert_eq!(state.position_secs, 5.0);
    }

    #[test]
    fn unknown_duration_uses_cap() {
        let mut state = playing(0.0, UNKNOWN_DURATION_CAP_SECS - 0.5);
        advance(&mut state);
        assert_eq!(state.position_secs, UNKNOWN_DURATION_CAP_SECS);
        assert!(!advance(&mut state));
    }

    #[test]
    fn paused_state_is_untouched() {
        let mut state = PlaybackState {
            duration_secs: 100.0,
            position_secs: 7.0,
            ..Default::default()
        };
        assert!(!advance(&mut state));
        assert_eq!(state.position_secs, 7.0);
    }

    #[test]
    fn poll_fires_once_per_interval() {
        let start = Instant::now();
        let mut estimator = PositionEstimator::new(start);
        let mut state = playing(300.0, 0.0);

        assert!(!estimator.poll(start + Duration::from_millis(999), &mut state));
        assert!(estimator.poll(start + Duration::from_secs(1), &mut state));
        assert!(!estimator.poll(start + Duration::from_millis(1500), &mut state));
        assert!(estimator.poll(start + Duration::from_secs(2), &mut state));
        assert_eq!(state.position_secs, 2.0);

        // A stalled UI loop does not replay the missed ticks.
        assert!(estimator.poll(start + Duration::from_secs(10), &mut state));
        assert_eq!(state.position_secs, 3.0);
        assert_eq!(estimator.next_tick(), start + Duration::from_secs(11));
    }
}
