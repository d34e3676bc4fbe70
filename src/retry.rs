use std::time::Instant;

use crate::model::TrackKey;

pub const MAX_ARTWORK_RETRIES: u8 = 2;

/// Why a state query was issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshReason {
    Startup,
    Notification,
    Poll,
    Confirm,
    /// Single follow-up after a track change, for artwork that lags behind.
    TrackRecheck(TrackKey),
    /// Follow-up for a track that came back without artwork.
    ArtworkRetry { track: TrackKey, attempt: u8 },
}

impl RefreshReason {
    /// The track a follow-up was scheduled for, if any.
    pub fn track(&self) -> Option<&TrackKey> {
        match self {
            RefreshReason::TrackRecheck(track) => Some(track),
            RefreshReason::ArtworkRetry { track, .. } => Some(track),
            _ => None,
        }
    }

    pub fn attempt(&self) -> u8 {
        match self {
            RefreshReason::ArtworkRetry { attempt, .. } => *attempt,
            _ => 0,
        }
    }
}

#[derive(Debug)]
struct Scheduled {
    due: Instant,
    reason: RefreshReason,
}

/// Delayed refreshes waiting on the UI loop.
#[derive(Debug, Default)]
pub struct RefreshSchedule {
    entries: Vec<Scheduled>,
}

impl RefreshSchedule {
    pub fn schedule(&mut self, due: Instant, reason: RefreshReason) {
        tracing::debug!(?reason, "refresh scheduled");
        self.entries.push(Scheduled { due, reason });
    }

    /// Schedule a notification refresh, pushing out one that is still waiting.
    pub fn debounce(&mut self, due: Instant) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|entry| entry.reason == RefreshReason::Notification)
        {
            existing.due = existing.due.max(due);
            return;
        }
        self.entries.push(Scheduled {
            due,
            reason: RefreshReason::Notification,
        });
    }

    /// Remove and return everything due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<RefreshReason> {
        let mut due: Vec<Scheduled> = Vec::new();
        let mut index = 0;
        while index < self.entries.len() {
            if self.entries[index].due <= now {
                due.push(self.entries.swap_remove(index));
            } else {
                index += 1;
            }
        }
        due.sort_by_key(|entry| entry.due);
        due.into_iter().map(|entry| entry.reason).collect()
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.entries.iter().map(|entry| entry.due).min()
    }

    pub fn pending(&self) -> impl Iterator<Item = &RefreshReason> {
        self.entries.iter().map(|entry| &entry.reason)
    }
}

/// Follow-up budget for the track currently playing. Replaced on track change.
#[derive(Debug, Clone)]
pub struct TrackRetry {
    key: TrackKey,
    artwork_attempts_used: u8,
    max_artwork_attempts: u8,
}

impl TrackRetry {
    pub fn new(key: TrackKey, max_artwork_attempts: u8) -> Self {
        Self {
            key,
            artwork_attempts_used: 0,
            max_artwork_attempts,
        }
    }

    pub fn key(&self) -> &TrackKey {
        &self.key
    }

    /// Claim the next artwork retry, returning its 1-based attempt number.
    pub fn take_artwork_attempt(&mut self) -> Option<u8> {
        if self.artwork_attempts_used >= self.max_artwork_attempts {
            return None;
        }
        self.artwork_attempts_used += 1;
        Some(self.artwork_attempts_used)
    }

    pub fn artwork_attempts_used(&self) -> u8 {
        self.artwork_attempts_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackIdentity;
    use std::time::Duration;

    #[test]
    fn debounce_coalesces_bursts() {
        let now = Instant::now();
        let mut schedule = RefreshSchedule::default();
        schedule.debounce(now + Duration::from_millis(300));
        schedule.debounce(now + Duration::from_millis(400));
        schedule.debounce(now + Duration::from_millis(350));
        assert_eq!(schedule.pending().count(), 1);
        assert!(schedule
            .take_due(now + Duration::from_millis(399))
            .is_empty());
        assert_eq!(
            schedule.take_due(now + Duration::from_millis(400)),
            vec![RefreshReason::Notification]
        );
    }

    #[test]
    fn take_due_is_ordered_and_leaves_future_entries() {
        let now = Instant::now();
        let mut schedule = RefreshSchedule::default();
        schedule.schedule(now + Duration::from_secs(2), RefreshReason::Poll);
        schedule.schedule(now + Duration::from_millis(500), RefreshReason::Confirm);
        schedule.schedule(now + Duration::from_secs(9), RefreshReason::Startup);

        let due = schedule.take_due(now + Duration::from_secs(3));
        assert_eq!(due, vec![RefreshReason::Confirm, RefreshReason::Poll]);
        assert_eq!(schedule.next_due(), Some(now + Duration::from_secs(9)));
    }

    #[test]
    fn artwork_attempts_are_bounded() {
        let key = TrackKey::Id(TrackIdentity::new("A1"));
        let mut retry = TrackRetry::new(key, MAX_ARTWORK_RETRIES);
        assert_eq!(retry.take_artwork_attempt(), Some(1));
        assert_eq!(retry.take_artwork_attempt(), Some(2));
        assert_eq!(retry.take_artwork_attempt(), None);
        assert_eq!(retry.artwork_attempts_used(), 2);
    }
}
