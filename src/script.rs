//! AppleScript sources sent to the player.
//!
//! Queries return a single list whose first item is a status marker (`"OK"`,
//! `"STOPPED"`, `"NOT_RUNNING"` or `"ERROR"`), so the reply shape can be
//! checked before any field is trusted.

use std::fmt;

use crate::model::{RepeatMode, TrackIdentity, MAX_PLAYLIST_TRACKS};

pub const DEFAULT_APPLICATION: &str = "Music";

/// Fields in an `"OK"` state reply, marker included.
pub const STATE_FIELDS: usize = 12;
/// Fields in a `"STOPPED"` state reply, marker included.
pub const STOPPED_FIELDS: usize = 4;
/// Fields in an `"OK"` playlist reply, marker included.
pub const PLAYLIST_FIELDS: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptKind {
    StateQuery,
    PlaylistQuery,
    Command,
}

#[derive(Clone, Debug)]
pub struct Script {
    pub kind: ScriptKind,
    pub source: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlayerCommand {
    PlayPause,
    NextTrack,
    PreviousTrack,
    SetVolume(u8),
    Seek(f64),
    SetShuffle(bool),
    SetRepeat(RepeatMode),
    PlayTrack(TrackIdentity),
}

impl fmt::Display for PlayerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerCommand::PlayPause => f.write_str("play/pause"),
            PlayerCommand::NextTrack => f.write_str("next"),
            PlayerCommand::PreviousTrack => f.write_str("previous"),
            PlayerCommand::SetVolume(v) => write!(f, "volume {v}"),
            PlayerCommand::Seek(secs) => write!(f, "seek {secs:.1}s"),
            PlayerCommand::SetShuffle(on) => write!(f, "shuffle {on}"),
            PlayerCommand::SetRepeat(mode) => write!(f, "repeat {}", mode.as_script()),
            PlayerCommand::PlayTrack(id) => write!(f, "play track {id}"),
        }
    }
}

pub fn applescript_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\n', '\r'], " ")
}

#[derive(Clone, Debug)]
pub struct ScriptBuilder {
    app: String,
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_APPLICATION)
    }
}

impl ScriptBuilder {
    pub fn new(application: &str) -> Self {
        Self {
            app: applescript_escape(application),
        }
    }

    pub fn state_query(&self) -> Script {
        let source = format!(
            r#"if application "{app}" is not running then return {{"NOT_RUNNING"}}
try
    tell application "{app}"
        set vol to sound volume
        set shuf to shuffle enabled
        set rep to song repeat as string
        if player state is stopped then return {{"STOPPED", vol, shuf, rep}}
        set pState to player state as string
        set t to current track
        set pos to player position
        set artData to missing value
        try
            if (count of artworks of t) > 0 then set artData to raw data of artwork 1 of t
        end try
        return {{"OK", name of t, artist of t, album of t, pState, duration of t, pos, vol, shuf, rep, persistent ID of t, artData}}
    end tell
on error errMsg number errNum
    return {{"ERROR", errMsg, errNum}}
end try"#,
            app = self.app
        );
        Script {
            kind: ScriptKind::StateQuery,
            source,
        }
    }

    pub fn playlist_query(&self, limit: usize) -> Script {
        let limit = limit.clamp(1, MAX_PLAYLIST_TRACKS);
        let source = format!(
            r#"if application "{app}" is not running then return {{"NOT_RUNNING"}}
try
    tell application "{app}"
        set cp to current playlist
        set n to count of tracks of cp
        if n is 0 then return {{"OK", name of cp, 0, {{}}, {{}}, {{}}}}
        set m to n
        if m > {limit} then set m to {limit}
        set picked to tracks 1 thru m of cp
        return {{"OK", name of cp, n, name of picked, artist of picked, persistent ID of picked}}
    end tell
on error errMsg number errNum
    return {{"ERROR", errMsg, errNum}}
end try"#,
            app = self.app
        );
        Script {
            kind: ScriptKind::PlaylistQuery,
            source,
        }
    }

    pub fn command(&self, command: &PlayerCommand) -> Script {
        let body = match command {
            PlayerCommand::PlayPause => "playpause".to_string(),
            PlayerCommand::NextTrack => "next track".to_string(),
            PlayerCommand::PreviousTrack => "previous track".to_string(),
            PlayerCommand::SetVolume(volume) => {
                format!("set sound volume to {}", (*volume).min(100))
            }
            PlayerCommand::Seek(secs) => {
                format!("set player position to {:.2}", secs.max(0.0))
            }
            PlayerCommand::SetShuffle(on) => format!("set shuffle enabled to {on}"),
            PlayerCommand::SetRepeat(mode) => format!("set song repeat to {}", mode.as_script()),
            PlayerCommand::PlayTrack(id) => {
                let id = applescript_escape(id.as_str());
                format!(
                    r#"try
        play (first track of current playlist whose persistent ID is "{id}")
    on error
        play (first track of library playlist 1 whose persistent ID is "{id}")
    end try"#
                )
            }
        };
        Script {
            kind: ScriptKind::Command,
            source: format!(
                "tell application \"{app}\"\n    {body}\nend tell",
                app = self.app
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_keeps_script_strings_closed() {
        assert_eq!(applescript_escape(r#"a "b" \c"#), r#"a \"b\" \\c"#);
        assert_eq!(applescript_escape("two\nlines"), "two lines");
    }

    #[test]
    fn playlist_limit_is_clamped() {
        let script = ScriptBuilder::default().playlist_query(10_000);
        assert!(script.source.contains("if m > 500 then set m to 500"));
        assert_eq!(script.kind, ScriptKind::PlaylistQuery);
    }

    #[test]
    fn commands_target_configured_application() {
        let builder = ScriptBuilder::new("Music");
        let script = builder.command(&PlayerCommand::SetRepeat(RepeatMode::All));
        assert_eq!(
            script.source,
            "tell application \"Music\"\n    set song repeat to all\nend tell"
        );

        let script = builder.command(&PlayerCommand::SetVolume(140));
        assert!(script.source.contains("set sound volume to 100"));
    }

    #[test]
    fn play_track_escapes_identifier() {
        let script = ScriptBuilder::default()
            .command(&PlayerCommand::PlayTrack(TrackIdentity::new("AB\"CD")));
        assert!(script.source.contains(r#"persistent ID is "AB\"CD""#));
    }
}
