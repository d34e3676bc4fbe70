//! Optimistic updates.
//!
//! A command writes its expected result into [`PendingIntents`] tagged with
//! the sequence number of the job that carries it. The worker runs jobs in
//! order, so a snapshot from a query job sent *after* the command already
//! reflects it: that snapshot retires the intent whether the player obeyed or
//! not. Snapshots from earlier queries are stale for that field and get the
//! intent laid over them.

use crate::model::{PlaybackState, RepeatMode};

pub const UNMUTE_FALLBACK_VOLUME: u8 = 50;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Intent {
    Playing(bool),
    Volume(u8),
    Shuffle(bool),
    Repeat(RepeatMode),
    Position(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Pending<T> {
    value: T,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct PendingIntents {
    playing: Option<Pending<bool>>,
    volume: Option<Pending<u8>>,
    shuffle: Option<Pending<bool>>,
    repeat: Option<Pending<RepeatMode>>,
    position: Option<Pending<f64>>,
}

fn settle<T: Copy>(slot: &mut Option<Pending<T>>, query_seq: u64, apply: impl FnOnce(T)) {
    if let Some(pending) = *slot {
        if query_seq > pending.seq {
            *slot = None;
        } else {
            apply(pending.value);
        }
    }
}

impl PendingIntents {
    pub fn record(&mut self, intent: Intent, seq: u64) {
        match intent {
            Intent::Playing(value) => self.playing = Some(Pending { value, seq }),
            Intent::Volume(value) => self.volume = Some(Pending { value, seq }),
            Intent::Shuffle(value) => self.shuffle = Some(Pending { value, seq }),
            Intent::Repeat(value) => self.repeat = Some(Pending { value, seq }),
            Intent::Position(value) => self.position = Some(Pending { value, seq }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.playing.is_none()
            && self.volume.is_none()
            && self.shuffle.is_none()
            && self.repeat.is_none()
            && self.position.is_none()
    }

    pub fn volume_pending(&self) -> bool {
        self.volume.is_some()
    }

    /// Lay pending values over a snapshot from query job `query_seq`,
    /// dropping every intent that snapshot already answers.
    pub fn reconcile(&mut self, query_seq: u64, state: &mut PlaybackState) {
        settle(&mut self.playing, query_seq, |v| state.is_playing = v);
        settle(&mut self.volume, query_seq, |v| state.volume = v);
        settle(&mut self.shuffle, query_seq, |v| state.shuffle_enabled = v);
        settle(&mut self.repeat, query_seq, |v| state.repeat_mode = v);
        settle(&mut self.position, query_seq, |v| state.position_secs = v);
    }
}

/// Volume to restore when un-muting.
#[derive(Debug, Default)]
pub struct MuteMemory {
    pre_mute_volume: u8,
    muted: bool,
}

impl MuteMemory {
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Flip mute and return the volume the player should be set to.
    pub fn toggle(&mut self, current_volume: u8) -> u8 {
        if self.muted {
            self.muted = false;
            if self.pre_mute_volume == 0 {
                UNMUTE_FALLBACK_VOLUME
            } else {
                self.pre_mute_volume
            }
        } else {
            self.pre_mute_volume = current_volume;
            self.muted = true;
            0
        }
    }

    pub fn forget(&mut self) {
        self.muted = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_snapshot_keeps_intent() {
        let mut intents = PendingIntents::default();
        intents.record(Intent::Volume(30), 5);
        intents.record(Intent::Shuffle(true), 5);

        let mut stale = PlaybackState {
            volume: 80,
            ..Default::default()
        };
        intents.reconcile(4, &mut stale);
        assert_eq!(stale.volume, 30);
        assert!(stale.shuffle_enabled);
        assert!(!intents.is_empty());
    }

    #[test]
    fn later_snapshot_retires_intent_even_if_rejected() {
        let mut intents = PendingIntents::default();
        intents.record(Intent::Repeat(RepeatMode::One), 7);

        let mut fresh = PlaybackState {
            repeat_mode: RepeatMode::All,
            ..Default::default()
        };
        intents.reconcile(8, &mut fresh);
        assert_eq!(fresh.repeat_mode, RepeatMode::All);
        assert!(intents.is_empty());
    }

    #[test]
    fn mute_round_trip_restores_volume() {
        for volume in 1..=100u8 {
            let mut mute = MuteMemory::default();
            assert_eq!(mute.toggle(volume), 0);
            assert!(mute.is_muted());
            assert_eq!(mute.toggle(0), volume);
            assert!(!mute.is_muted());
        }
    }

    #[test]
    fn unmute_from_zero_uses_fallback() {
        let mut mute = MuteMemory::default();
        mute.toggle(0);
        assert_eq!(mute.toggle(0), UNMUTE_FALLBACK_VOLUME);
    }
}
