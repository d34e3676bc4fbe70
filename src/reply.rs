//! Parsing of `osascript -ss` output.
//!
//! With `-ss` the interpreter prints results as recompilable source, e.g.
//! `{"OK", "Song", 215.5, true, «data PNGf89504E47», missing value}`, which
//! keeps strings quoted and binary data hex encoded.

use crate::{
    error::{Error, Result},
    model::{
        PlaybackState, PlaylistEntry, PlaylistSnapshot, RepeatMode, TrackIdentity,
        MAX_PLAYLIST_TRACKS,
    },
    script::{PLAYLIST_FIELDS, STATE_FIELDS, STOPPED_FIELDS},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
    Missing,
    Data { kind: String, bytes: Vec<u8> },
    Constant(String),
    List(Vec<Value>),
}

impl Value {
    pub fn text(&self) -> String {
        match self {
            Value::Text(s) | Value::Constant(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => String::new(),
        }
    }

    pub fn number(&self) -> f64 {
        match self {
            Value::Number(n) if n.is_finite() => *n,
            Value::Text(s) => s.trim().replace(',', ".").parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn flag(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Text(s) | Value::Constant(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    fn list(&self) -> &[Value] {
        match self {
            Value::List(items) => items,
            Value::Missing => &[],
            other => std::slice::from_ref(other),
        }
    }
}

pub fn parse(input: &str) -> Result<Value> {
    let mut parser = Parser {
        src: input.trim(),
        pos: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos < parser.src.len() {
        return Err(parser.error("trailing input"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::Reply {
            offset: self.pos,
            message: message.to_string(),
        }
    }

    fn value(&mut self) -> Result<Value> {
        self.skip_ws();
        match self.peek() {
            Some('{') => self.list(),
            Some('"') => self.string().map(Value::Text),
            Some('«') => self.chevron(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() => self.word(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn list(&mut self) -> Result<Value> {
        self.bump();
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return Ok(Value::List(items));
        }
        loop {
            items.push(self.value()?);
            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::List(items)),
                Some(':') => return Err(self.error("records are not supported")),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated escape")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn chevron(&mut self) -> Result<Value> {
        self.bump();
        let Some(end) = self.rest().find('»') else {
            return Err(self.error("unterminated «»"));
        };
        let body = &self.rest()[..end];
        let start = self.pos;
        self.pos += end + '»'.len_utf8();

        if let Some(payload) = body.strip_prefix("data ") {
            if payload.len() < 4 || !payload.is_char_boundary(4) {
                return Err(Error::Reply {
                    offset: start,
                    message: "data literal without type code".into(),
                });
            }
            let (kind, hex_digits) = payload.split_at(4);
            let bytes = hex::decode(hex_digits.trim()).map_err(|err| Error::Reply {
                offset: start,
                message: format!("bad data literal: {err}"),
            })?;
            return Ok(Value::Data {
                kind: kind.to_string(),
                bytes,
            });
        }

        Ok(Value::Constant(body.to_string()))
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        let len = self
            .rest()
            .char_indices()
            .find(|&(i, c)| {
                !(c.is_ascii_digit()
                    || c == '.'
                    || c == 'E'
                    || c == 'e'
                    || ((c == '-' || c == '+') && i == 0)
                    || ((c == '-' || c == '+')
                        && matches!(self.rest()[..i].chars().last(), Some('E' | 'e'))))
            })
            .map(|(i, _)| i)
            .unwrap_or(self.rest().len());
        let literal = &self.rest()[..len];
        self.pos += len;
        literal.parse().map(Value::Number).map_err(|_| Error::Reply {
            offset: start,
            message: format!("bad number {literal:?}"),
        })
    }

    fn word(&mut self) -> Result<Value> {
        let len = self
            .rest()
            .find(|c: char| !(c.is_alphanumeric() || c == ' ' || c == '_'))
            .unwrap_or(self.rest().len());
        let word = self.rest()[..len].trim_end();
        self.pos += word.len();
        Ok(match word {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "missing value" => Value::Missing,
            other => Value::Constant(other.to_string()),
        })
    }
}

/// One successful read of the player.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSnapshot {
    pub state: PlaybackState,
    pub artwork: Option<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StateReply {
    Playing(Box<StateSnapshot>),
    Stopped {
        volume: u8,
        shuffle_enabled: bool,
        repeat_mode: RepeatMode,
    },
    NotRunning,
    Failure(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum PlaylistReply {
    Playlist(PlaylistSnapshot),
    NotRunning,
    Failure(String),
}

fn volume_of(value: &Value) -> u8 {
    value.number().round().clamp(0.0, 100.0) as u8
}

fn failure_of(items: &[Value]) -> String {
    let message = items.get(1).map(Value::text).unwrap_or_default();
    match items.get(2) {
        Some(Value::Number(code)) => format!("{message} ({code})"),
        _ => message,
    }
}

fn marker(items: &[Value]) -> Result<String> {
    match items.first() {
        Some(Value::Text(marker)) => Ok(marker.clone()),
        _ => Err(Error::ReplyShape("missing status marker".into())),
    }
}

fn expect_len(items: &[Value], expected: usize, what: &str) -> Result<()> {
    if items.len() == expected {
        Ok(())
    } else {
        Err(Error::ReplyShape(format!(
            "{what} reply has {} fields, expected {expected}",
            items.len()
        )))
    }
}

pub fn state_reply(value: &Value) -> Result<StateReply> {
    let Value::List(items) = value else {
        return Err(Error::ReplyShape("state reply is not a list".into()));
    };
    match marker(items)?.as_str() {
        "NOT_RUNNING" => Ok(StateReply::NotRunning),
        "ERROR" => Ok(StateReply::Failure(failure_of(items))),
        "STOPPED" => {
            expect_len(items, STOPPED_FIELDS, "stopped")?;
            Ok(StateReply::Stopped {
                volume: volume_of(&items[1]),
                shuffle_enabled: items[2].flag(),
                repeat_mode: RepeatMode::from_script(&items[3].text()).unwrap_or_default(),
            })
        }
        "OK" => {
            expect_len(items, STATE_FIELDS, "state")?;
            let duration_secs = items[5].number().max(0.0);
            let mut position_secs = items[6].number().max(0.0);
            if duration_secs > 0.0 {
                position_secs = position_secs.min(duration_secs);
            }
            let state = PlaybackState {
                title: items[1].text(),
                artist: items[2].text(),
                album: items[3].text(),
                is_playing: items[4].text().eq_ignore_ascii_case("playing"),
                duration_secs,
                position_secs,
                volume: volume_of(&items[7]),
                is_muted: false,
                shuffle_enabled: items[8].flag(),
                repeat_mode: RepeatMode::from_script(&items[9].text()).unwrap_or_default(),
                track_id: TrackIdentity::new(items[10].text()),
                error: None,
            };
            let artwork = match &items[11] {
                Value::Data { bytes, .. } if !bytes.is_empty() => Some(bytes.clone()),
                _ => None,
            };
            Ok(StateReply::Playing(Box::new(StateSnapshot { state, artwork })))
        }
        other => Err(Error::ReplyShape(format!("unknown marker {other:?}"))),
    }
}

pub fn playlist_reply(value: &Value, limit: usize) -> Result<PlaylistReply> {
    let Value::List(items) = value else {
        return Err(Error::ReplyShape("playlist reply is not a list".into()));
    };
    match marker(items)?.as_str() {
        "NOT_RUNNING" => Ok(PlaylistReply::NotRunning),
        "ERROR" => Ok(PlaylistReply::Failure(failure_of(items))),
        "OK" => {
            expect_len(items, PLAYLIST_FIELDS, "playlist")?;
            let limit = limit.clamp(1, MAX_PLAYLIST_TRACKS);
            let total = items[2].number().max(0.0) as usize;
            let names = items[3].list();
            let artists = items[4].list();
            let ids = items[5].list();
            if names.len() != ids.len() {
                return Err(Error::ReplyShape(format!(
                    "{} names for {} identifiers",
                    names.len(),
                    ids.len()
                )));
            }

            let entries: Vec<PlaylistEntry> = names
                .iter()
                .zip(ids)
                .enumerate()
                .take(limit)
                .map(|(index, (name, id))| {
                    let name = name.text();
                    let artist = artists.get(index).map(Value::text).unwrap_or_default();
                    let display_name = if artist.is_empty() {
                        name
                    } else {
                        format!("{name} - {artist}")
                    };
                    PlaylistEntry {
                        display_name,
                        track_id: TrackIdentity::new(id.text()),
                    }
                })
                .collect();

            Ok(PlaylistReply::Playlist(PlaylistSnapshot {
                name: items[1].text(),
                truncated: total > entries.len(),
                entries,
            }))
        }
        other => Err(Error::ReplyShape(format!("unknown marker {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYING: &str = r#"{"OK", "Teardrop", "Massive Attack", "Mezzanine", "playing", 330.5, 12.25, 80, false, "all", "9F3C2A1B77D0E4A1", «data PNGf89504E47»}"#;

    #[test]
    fn parses_playing_reply() {
        let value = parse(PLAYING).unwrap();
        let StateReply::Playing(snapshot) = state_reply(&value).unwrap() else {
            panic!("expected playing reply");
        };
        assert_eq!(snapshot.state.title, "Teardrop");
        assert_eq!(snapshot.state.album, "Mezzanine");
        assert!(snapshot.state.is_playing);
        assert_eq!(snapshot.state.duration_secs, 330.5);
        assert_eq!(snapshot.state.position_secs, 12.25);
        assert_eq!(snapshot.state.volume, 80);
        assert_eq!(snapshot.state.repeat_mode, RepeatMode::All);
        assert_eq!(snapshot.state.track_id.as_str(), "9F3C2A1B77D0E4A1");
        assert_eq!(snapshot.artwork, Some(vec![0x89, 0x50, 0x4E, 0x47]));
    }

    #[test]
    fn strings_keep_escapes_and_unicode() {
        let value = parse(r#"{"Sigur Rós \"live\"", "a\\b", "x\ny"}"#).unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::Text("Sigur Rós \"live\"".into()),
                Value::Text("a\\b".into()),
                Value::Text("x\ny".into()),
            ])
        );
    }

    #[test]
    fn numbers_accept_exponents_and_negatives() {
        assert_eq!(parse("1.2345E+4").unwrap(), Value::Number(12345.0));
        assert_eq!(parse("-1743").unwrap(), Value::Number(-1743.0));
        assert_eq!(
            parse("{missing value, playing}").unwrap(),
            Value::List(vec![Value::Missing, Value::Constant("playing".into())])
        );
    }

    #[test]
    fn error_row_becomes_failure() {
        let value =
            parse(r#"{"ERROR", "Not authorized to send Apple events to Music.", -1743}"#).unwrap();
        assert_eq!(
            state_reply(&value).unwrap(),
            StateReply::Failure("Not authorized to send Apple events to Music. (-1743)".into())
        );
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        let value = parse(r#"{"OK", "Only", "three"}"#).unwrap();
        assert!(matches!(state_reply(&value), Err(Error::ReplyShape(_))));
    }

    #[test]
    fn records_are_rejected() {
        assert!(parse(r#"{name:"x"}"#).is_err());
        assert!(parse(r#"{"open"#).is_err());
    }

    #[test]
    fn missing_artwork_and_duration() {
        let value = parse(
            r#"{"OK", "Radio", "", "", "paused", missing value, 40.0, 55, true, "off", "", missing value}"#,
        )
        .unwrap();
        let StateReply::Playing(snapshot) = state_reply(&value).unwrap() else {
            panic!("expected playing reply");
        };
        assert_eq!(snapshot.state.duration_secs, 0.0);
        assert_eq!(snapshot.state.position_secs, 40.0);
        assert!(!snapshot.state.is_playing);
        assert!(snapshot.state.shuffle_enabled);
        assert!(snapshot.artwork.is_none());
        assert!(snapshot.state.track_id.is_empty());
    }

    #[test]
    fn playlist_is_zipped_and_capped() {
        let value = parse(
            r#"{"OK", "Favourites", 812, {"One", "Two", "Three"}, {"A", "", "C"}, {"01", "02", "03"}}"#,
        )
        .unwrap();
        let PlaylistReply::Playlist(playlist) = playlist_reply(&value, 2).unwrap() else {
            panic!("expected playlist");
        };
        assert_eq!(playlist.name, "Favourites");
        assert_eq!(playlist.entries.len(), 2);
        assert_eq!(playlist.entries[0].display_name, "One - A");
        assert_eq!(playlist.entries[1].display_name, "Two");
        assert_eq!(playlist.entries[1].track_id.as_str(), "02");
        assert!(playlist.truncated);
    }

    #[test]
    fn empty_playlist() {
        let value = parse(r#"{"OK", "Empty", 0, {}, {}, {}}"#).unwrap();
        let PlaylistReply::Playlist(playlist) = playlist_reply(&value, 500).unwrap() else {
            panic!("expected playlist");
        };
        assert!(playlist.entries.is_empty());
        assert!(!playlist.truncated);
    }
}
