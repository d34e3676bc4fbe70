use std::fmt;

pub const CONNECTION_FAILED_TITLE: &str = "Connection Failed";
pub const CONNECTION_FAILED_ARTIST: &str = "Check Permissions";
pub const IDLE_TITLE: &str = "Not Playing";

/// Hard ceiling on playlist rows pulled across the process boundary.
pub const MAX_PLAYLIST_TRACKS: usize = 500;

/// Persistent identifier the player assigns to a track.
///
/// Empty when the player did not report one (streams, some radio items).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TrackIdentity(String);

impl TrackIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What decides whether two snapshots describe the same track.
///
/// The persistent identifier wins; titles are only compared when the player
/// gave no identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum TrackKey {
    #[default]
    None,
    Id(TrackIdentity),
    Title(String),
}

impl TrackKey {
    pub fn of(state: &PlaybackState) -> Self {
        if !state.track_id.is_empty() {
            TrackKey::Id(state.track_id.clone())
        } else if !state.title.is_empty() {
            TrackKey::Title(state.title.clone())
        } else {
            TrackKey::None
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RepeatMode {
    #[default]
    Off,
    One,
    All,
}

impl RepeatMode {
    /// off -> all -> one -> off, regardless of what the player cycles through.
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }

    pub fn as_script(self) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        }
    }

    pub fn from_script(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Some(RepeatMode::Off),
            "one" => Some(RepeatMode::One),
            "all" => Some(RepeatMode::All),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub is_playing: bool,
    pub duration_secs: f64,
    pub position_secs: f64,
    /// 0..=100
    pub volume: u8,
    pub is_muted: bool,
    pub shuffle_enabled: bool,
    pub repeat_mode: RepeatMode,
    pub track_id: TrackIdentity,
    /// Diagnostic from the last failed query; cleared by the next good one.
    pub error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            title: IDLE_TITLE.to_string(),
            artist: String::new(),
            album: String::new(),
            is_playing: false,
            duration_secs: 0.0,
            position_secs: 0.0,
            volume: 50,
            is_muted: false,
            shuffle_enabled: false,
            repeat_mode: RepeatMode::Off,
            track_id: TrackIdentity::default(),
            error: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlaylistEntry {
    pub display_name: String,
    pub track_id: TrackIdentity,
}

/// Tracks of the player's current playlist, fetched when the playlist view opens.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaylistSnapshot {
    pub name: String,
    pub entries: Vec<PlaylistEntry>,
    /// The playlist held more tracks than were fetched.
    pub truncated: bool,
}

impl PlaylistSnapshot {
    pub fn position_of(&self, id: &TrackIdentity) -> Option<usize> {
        if id.is_empty() {
            return None;
        }
        self.entries.iter().position(|entry| &entry.track_id == id)
    }
}

pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0).floor() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_cycle_has_period_three() {
        for start in [RepeatMode::Off, RepeatMode::One, RepeatMode::All] {
            assert_eq!(start.next().next().next(), start);
        }
        assert_eq!(RepeatMode::Off.next(), RepeatMode::All);
        assert_eq!(RepeatMode::All.next(), RepeatMode::One);
        assert_eq!(RepeatMode::One.next(), RepeatMode::Off);
    }

    #[test]
    fn track_key_prefers_identity_over_title() {
        let mut state = PlaybackState {
            title: "Intro".into(),
            ..Default::default()
        };
        assert_eq!(TrackKey::of(&state), TrackKey::Title("Intro".into()));

        state.track_id = TrackIdentity::new("ABCDEF0123");
        assert_eq!(
            TrackKey::of(&state),
            TrackKey::Id(TrackIdentity::new("ABCDEF0123"))
        );
    }

    #[test]
    fn timestamps_switch_to_hours() {
        assert_eq!(format_timestamp(0.0), "0:00");
        assert_eq!(format_timestamp(61.9), "1:01");
        assert_eq!(format_timestamp(3725.0), "1:02:05");
        assert_eq!(format_timestamp(-4.0), "0:00");
    }
}
