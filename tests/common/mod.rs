#![allow(dead_code)]

use std::{
    collections::VecDeque,
    io::Cursor,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use image::{ImageFormat, Rgba, RgbaImage};
use music_mini_player::{
    automation::Automation,
    error::{Error, Result},
    script::{Script, ScriptKind},
    worker::Waker,
    ScriptBuilder, SyncSettings, Synchronizer,
};

#[derive(Default)]
struct Inner {
    state_replies: VecDeque<String>,
    fallback_state: Option<String>,
    playlist_replies: VecDeque<String>,
    log: Vec<Script>,
}

/// Scripted stand-in for the Music app. Replies are handed out in order;
/// once the queue runs dry the fallback state reply repeats.
#[derive(Clone, Default)]
pub struct FakePlayer {
    inner: Arc<Mutex<Inner>>,
}

impl FakePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_state(&self, reply: impl Into<String>) -> &Self {
        self.inner.lock().unwrap().state_replies.push_back(reply.into());
        self
    }

    pub fn set_fallback_state(&self, reply: impl Into<String>) -> &Self {
        self.inner.lock().unwrap().fallback_state = Some(reply.into());
        self
    }

    pub fn push_playlist(&self, reply: impl Into<String>) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .playlist_replies
            .push_back(reply.into());
        self
    }

    pub fn scripts(&self, kind: ScriptKind) -> Vec<Script> {
        self.inner
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|script| script.kind == kind)
            .cloned()
            .collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.scripts(ScriptKind::Command)
            .into_iter()
            .map(|script| script.source)
            .collect()
    }

    pub fn query_count(&self) -> usize {
        self.scripts(ScriptKind::StateQuery).len()
    }
}

impl Automation for FakePlayer {
    fn execute(&mut self, script: &Script) -> Result<String> {
        let mut inner = self.inner.lock().unwrap();
        inner.log.push(script.clone());
        match script.kind {
            ScriptKind::StateQuery => inner
                .state_replies
                .pop_front()
                .or_else(|| inner.fallback_state.clone())
                .ok_or_else(|| Error::ScriptFailed {
                    status: 1,
                    stderr: "no reply scripted".into(),
                }),
            ScriptKind::PlaylistQuery => {
                inner
                    .playlist_replies
                    .pop_front()
                    .ok_or_else(|| Error::ScriptFailed {
                        status: 1,
                        stderr: "no playlist scripted".into(),
                    })
            }
            ScriptKind::Command => Ok(String::new()),
        }
    }
}

pub fn noop_waker() -> Waker {
    Arc::new(|| {})
}

pub fn start(player: &FakePlayer, settings: SyncSettings) -> Synchronizer {
    Synchronizer::spawn(
        player.clone(),
        ScriptBuilder::default(),
        settings,
        noop_waker(),
        Instant::now(),
    )
    .unwrap()
}

/// Apply exactly `jobs` finished jobs, failing if any takes too long.
pub fn pump(sync: &mut Synchronizer, jobs: usize) {
    for n in 0..jobs {
        assert!(
            sync.pump_blocking(Duration::from_secs(5)),
            "job {} of {jobs} never finished",
            n + 1
        );
    }
}

/// Far enough ahead that every scheduled follow-up is due.
pub fn later() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

/// Builder for the `OK` row of a state query.
#[derive(Clone, Debug)]
pub struct Row {
    pub title: String,
    pub id: String,
    pub state: &'static str,
    pub duration: f64,
    pub position: f64,
    pub volume: u8,
    pub shuffle: bool,
    pub repeat: &'static str,
    pub artwork: Option<Vec<u8>>,
}

impl Row {
    pub fn playing(title: &str, id: &str) -> Self {
        Self {
            title: title.into(),
            id: id.into(),
            state: "playing",
            duration: 240.0,
            position: 10.0,
            volume: 80,
            shuffle: false,
            repeat: "off",
            artwork: None,
        }
    }

    pub fn paused(mut self) -> Self {
        self.state = "paused";
        self
    }

    pub fn volume(mut self, volume: u8) -> Self {
        self.volume = volume;
        self
    }

    pub fn artwork(mut self, bytes: Vec<u8>) -> Self {
        self.artwork = Some(bytes);
        self
    }

    pub fn render(&self) -> String {
        let artwork = match &self.artwork {
            Some(bytes) => format!("«data PNGf{}»", hex::encode_upper(bytes)),
            None => "missing value".to_string(),
        };
        format!(
            r#"{{"OK", "{title}", "Artist", "Album", {state}, {duration}, {position}, {volume}, {shuffle}, {repeat}, "{id}", {artwork}}}"#,
            title = self.title,
            state = self.state,
            duration = self.duration,
            position = self.position,
            volume = self.volume,
            shuffle = self.shuffle,
            repeat = self.repeat,
            id = self.id,
        )
    }
}

impl From<Row> for String {
    fn from(row: Row) -> Self {
        row.render()
    }
}

pub const NOT_AUTHORIZED: &str =
    r#"{"ERROR", "Not authorized to send Apple events to Music.", -1743}"#;
pub const NOT_RUNNING: &str = r#"{"NOT_RUNNING"}"#;

pub fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}
