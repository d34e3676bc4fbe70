use anyhow::{anyhow, Context};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver},
    time::Duration,
};

use crate::{
    artwork::DEFAULT_ARTWORK_SIZE,
    automation::DEFAULT_OSASCRIPT,
    model::MAX_PLAYLIST_TRACKS,
    script::DEFAULT_APPLICATION,
    synchronizer::SyncSettings,
};

const CONFIG_DIR_NAME: &str = "mini-player";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub player: PlayerConfig,
    pub sync: SyncSettings,
    pub window: WindowConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub application: String,
    pub osascript: PathBuf,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            application: DEFAULT_APPLICATION.to_string(),
            osascript: PathBuf::from(DEFAULT_OSASCRIPT),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corner {
    TopLeft,
    #[default]
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeChoice {
    #[default]
    Dark,
    Light,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowConfig {
    pub width: f32,
    pub height: f32,
    pub min_width: f32,
    pub min_height: f32,
    pub anchor: Corner,
    pub margin: f32,
    pub opacity: f32,
    pub always_on_top: bool,
    pub theme: ThemeChoice,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 360.0,
            height: 150.0,
            min_width: 280.0,
            min_height: 120.0,
            anchor: Corner::TopRight,
            margin: 24.0,
            opacity: 0.86,
            always_on_top: true,
            theme: ThemeChoice::Dark,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogConfig {
    pub level: Option<String>,
}

/// A config plus the file it came from, if any.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load from `explicit` when given, otherwise from the first candidate
    /// path that exists. No file at all means defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<LoadedConfig> {
        if let Some(path) = explicit {
            let config = Self::read(path)?;
            return Ok(LoadedConfig {
                config,
                path: Some(path.to_path_buf()),
            });
        }

        for path in Self::candidates() {
            if path.exists() {
                let config = Self::read(&path)?;
                return Ok(LoadedConfig {
                    config,
                    path: Some(path),
                });
            }
        }

        Ok(LoadedConfig {
            config: Config::default(),
            path: None,
        })
    }

    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&data)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn from_toml(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = toml::from_str(data)?;
        Ok(doc.into())
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("config.toml"));
            candidates.push(current_dir.join("config").join("mini-player.toml"));
        }

        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("config.toml"));
                candidates.push(dir.join("config").join("mini-player.toml"));
            }
        }

        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(CONFIG_DIR_NAME).join("config.toml"));
        }

        candidates
    }
}

fn millis(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

impl From<ConfigDocument> for Config {
    fn from(value: ConfigDocument) -> Self {
        let player_defaults = PlayerConfig::default();
        let player = PlayerConfig {
            application: value
                .player
                .application
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(player_defaults.application),
            osascript: value.player.osascript.unwrap_or(player_defaults.osascript),
        };

        let s = value.sync;
        let d = SyncSettings::default();
        let sync = SyncSettings {
            debounce: millis(s.debounce_ms, d.debounce),
            track_recheck_delay: millis(s.track_recheck_ms, d.track_recheck_delay),
            artwork_retry_delay: millis(s.artwork_retry_ms, d.artwork_retry_delay),
            max_artwork_retries: s.max_artwork_retries.unwrap_or(d.max_artwork_retries),
            confirm_delay: millis(s.confirm_ms, d.confirm_delay),
            repeat_confirm_delay: millis(s.repeat_confirm_ms, d.repeat_confirm_delay),
            fallback_poll: match s.fallback_poll_ms {
                Some(0) => Duration::ZERO,
                value => millis(value, d.fallback_poll).max(Duration::from_millis(250)),
            },
            playlist_limit: s
                .playlist_limit
                .unwrap_or(MAX_PLAYLIST_TRACKS)
                .clamp(1, MAX_PLAYLIST_TRACKS),
            artwork_px: s
                .artwork_size
                .unwrap_or(DEFAULT_ARTWORK_SIZE)
                .clamp(32, 2048),
        };

        let w = value.window;
        let d = WindowConfig::default();
        let min_width = w.min_width.unwrap_or(d.min_width).max(120.0);
        let min_height = w.min_height.unwrap_or(d.min_height).max(60.0);
        let window = WindowConfig {
            width: w.width.unwrap_or(d.width).max(min_width),
            height: w.height.unwrap_or(d.height).max(min_height),
            min_width,
            min_height,
            anchor: w.anchor.unwrap_or(d.anchor),
            margin: w.margin.unwrap_or(d.margin).max(0.0),
            opacity: w.opacity.unwrap_or(d.opacity).clamp(0.2, 1.0),
            always_on_top: w.always_on_top.unwrap_or(d.always_on_top),
            theme: w.theme.unwrap_or(d.theme),
        };

        Config {
            player,
            sync,
            window,
            log: LogConfig {
                level: value.log.level,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigDocument {
    #[serde(default)]
    player: PlayerSection,
    #[serde(default)]
    sync: SyncSection,
    #[serde(default)]
    window: WindowSection,
    #[serde(default)]
    log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
struct PlayerSection {
    application: Option<String>,
    osascript: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct SyncSection {
    debounce_ms: Option<u64>,
    track_recheck_ms: Option<u64>,
    artwork_retry_ms: Option<u64>,
    max_artwork_retries: Option<u8>,
    confirm_ms: Option<u64>,
    repeat_confirm_ms: Option<u64>,
    fallback_poll_ms: Option<u64>,
    playlist_limit: Option<usize>,
    artwork_size: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct WindowSection {
    width: Option<f32>,
    height: Option<f32>,
    min_width: Option<f32>,
    min_height: Option<f32>,
    anchor: Option<Corner>,
    margin: Option<f32>,
    opacity: Option<f32>,
    always_on_top: Option<bool>,
    theme: Option<ThemeChoice>,
}

#[derive(Debug, Default, Deserialize)]
struct LogSection {
    level: Option<String>,
}

/// Re-reads the config file whenever it changes on disk.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    changes_rx: Receiver<notify::Result<notify::Event>>,
}

impl ConfigWatcher {
    pub fn watch(path: &Path) -> anyhow::Result<Self> {
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("Config path has no file name: {}", path.display()))?;
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        // Editors replace files on save, so watch the directory rather than the inode.
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        Ok(Self {
            path: dir.join(file_name),
            _watcher: watcher,
            changes_rx: rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The reloaded config if the file changed since the last call.
    pub fn poll(&mut self) -> Option<anyhow::Result<Config>> {
        let mut relevant = false;
        while let Ok(event) = self.changes_rx.try_recv() {
            match event {
                Ok(evt) => {
                    if evt.kind.is_access() {
                        continue;
                    }
                    if evt
                        .paths
                        .iter()
                        .any(|p| p.file_name() == self.path.file_name())
                    {
                        relevant = true;
                    }
                }
                Err(err) => tracing::warn!("config watcher error: {err}"),
            }
        }

        relevant.then(|| Config::read(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = Config::from_toml(
            r#"
            [player]
            application = "Music"

            [sync]
            debounce_ms = 150
            playlist_limit = 9000
            max_artwork_retries = 1

            [window]
            anchor = "bottom_left"
            opacity = 3.0
            theme = "light"

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.debounce, Duration::from_millis(150));
        assert_eq!(config.sync.playlist_limit, MAX_PLAYLIST_TRACKS);
        assert_eq!(config.sync.max_artwork_retries, 1);
        assert_eq!(config.sync.confirm_delay, Duration::from_millis(500));
        assert_eq!(config.window.anchor, Corner::BottomLeft);
        assert_eq!(config.window.opacity, 1.0);
        assert_eq!(config.window.theme, ThemeChoice::Light);
        assert_eq!(config.log.level.as_deref(), Some("debug"));
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(Config::from_toml("[skins]\nname = \"x\"").is_err());
        assert!(Config::from_toml("[window]\nanchor = \"middle\"").is_err());
    }

    #[test]
    fn window_never_smaller_than_minimum() {
        let config =
            Config::from_toml("[window]\nwidth = 10.0\nheight = 10.0\nmin_width = 300.0").unwrap();
        assert_eq!(config.window.width, 300.0);
        assert_eq!(config.window.height, config.window.min_height);
    }

    #[test]
    fn zero_fallback_poll_turns_polling_off() {
        let off = Config::from_toml("[sync]\nfallback_poll_ms = 0").unwrap();
        assert_eq!(off.sync.fallback_poll, Duration::ZERO);

        let short = Config::from_toml("[sync]\nfallback_poll_ms = 10").unwrap();
        assert_eq!(short.sync.fallback_poll, Duration::from_millis(250));
    }
}
