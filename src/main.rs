mod theme;
mod ui;

use anyhow::{anyhow, Context as _};
use clap::Parser;
use eframe::egui::{
    self, ColorImage, CornerRadius, FontId, LayerId, RichText, TextureHandle, TextureOptions,
    ViewportBuilder, ViewportCommand, WindowLevel,
};
use music_mini_player::{
    config::{Config, ConfigWatcher, LoadedConfig, ThemeChoice},
    logging,
    model::{format_timestamp, PlaybackState, RepeatMode},
    notifications::{self, PLAYER_INFO_NOTIFICATION},
    worker::Waker,
    OsaScript, ScriptBuilder, Synchronizer, TrackIdentity,
};
use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};
use theme::Palette;
use ui::StripMetrics;

const HEADER_HEIGHT: f32 = 22.0;
const WINDOW_ROUNDING: u8 = 12;
const ANCHOR_ATTEMPTS: u8 = 10;
const IDLE_REPAINT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "mini-player", version, about = "Floating mini player for the Music app")]
struct Cli {
    /// Config file to use instead of the discovered one.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `music_mini_player=trace`. RUST_LOG wins.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewMode {
    Standard,
    Playlist,
}

#[derive(Debug, Clone, PartialEq)]
enum UiAction {
    PlayPause,
    Next,
    Previous,
    Seek(f64),
    SetVolume(u8),
    ToggleMute,
    ToggleShuffle,
    ToggleRepeat,
    PlayTrack(TrackIdentity),
    ToggleView,
    ToggleTheme,
    Close,
}

struct App {
    sync: Synchronizer,
    config: Config,
    config_watcher: Option<ConfigWatcher>,
    config_error: Option<String>,

    theme: ThemeChoice,
    palette: Palette,
    applied_theme: Option<ThemeChoice>,
    last_window_level: Option<WindowLevel>,
    anchored: bool,
    anchor_attempts: u8,

    view: ViewMode,
    controls_alpha: f32,
    artwork_texture: Option<TextureHandle>,
    artwork_generation: u64,
    seek_preview: Option<f64>,
    volume_preview: Option<u8>,
    scroll_to_current: bool,
    actions: Vec<UiAction>,
}

impl App {
    fn new(
        cc: &eframe::CreationContext<'_>,
        loaded: LoadedConfig,
        config_error: Option<String>,
    ) -> anyhow::Result<Self> {
        let LoadedConfig { config, path } = loaded;

        let ctx = cc.egui_ctx.clone();
        let waker: Waker = Arc::new(move || ctx.request_repaint());
        let automation = OsaScript::new(config.player.osascript.clone());
        let scripts = ScriptBuilder::new(&config.player.application);
        let mut sync = Synchronizer::spawn(
            automation,
            scripts,
            config.sync.clone(),
            waker,
            Instant::now(),
        )
        .context("Failed to start player automation")?;

        // Observers registered here are serviced by the UI thread's run loop.
        match notifications::subscribe(PLAYER_INFO_NOTIFICATION, sync.change_notifier()) {
            Ok(subscription) => sync.attach_subscription(subscription),
            Err(err) => {
                tracing::warn!("{err}");
                sync.enable_fallback_polling(Instant::now());
            }
        }

        let config_watcher = path.as_deref().and_then(|path| {
            ConfigWatcher::watch(path)
                .map_err(|err| tracing::warn!("config hot reload disabled: {err:#}"))
                .ok()
        });

        let theme = config.window.theme;
        Ok(Self {
            sync,
            config_watcher,
            config_error,
            theme,
            palette: Palette::for_choice(theme),
            applied_theme: None,
            last_window_level: None,
            anchored: false,
            anchor_attempts: 0,
            view: ViewMode::Standard,
            controls_alpha: 0.0,
            artwork_texture: None,
            artwork_generation: 0,
            seek_preview: None,
            volume_preview: None,
            scroll_to_current: false,
            actions: Vec::new(),
            config,
        })
    }
}

impl eframe::App for App {
    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        egui::Rgba::TRANSPARENT.to_array()
    }

    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.maintain_config_watcher();
        self.apply_theme(ctx);
        self.update_window_level(ctx);
        self.anchor_window(ctx);
        self.update_artwork_resolution(ctx);

        let now = Instant::now();
        self.sync.poll(now);
        self.refresh_artwork_texture(ctx);

        let root_rect = ctx.screen_rect();
        let hovering = ctx.input(|i| i.pointer.hover_pos()).is_some();
        let (alpha, animating) =
            ui::step_alpha(self.controls_alpha, if hovering { 1.0 } else { 0.0 });
        self.controls_alpha = alpha;
        if animating {
            ctx.request_repaint();
        }

        ctx.layer_painter(LayerId::background()).rect_filled(
            root_rect,
            CornerRadius::same(WINDOW_ROUNDING),
            self.palette.window_fill(self.config.window.opacity),
        );

        let state = self.sync.state().clone();
        let mut reserved = Vec::new();
        let panel_frame = egui::Frame::NONE.inner_margin(egui::Margin::same(10));
        egui::CentralPanel::default()
            .frame(panel_frame)
            .show(ctx, |ui| {
                reserved.push(self.render_header(ui, &state));
                match self.view {
                    ViewMode::Standard => self.render_now_playing(ui, &state),
                    ViewMode::Playlist => self.render_playlist(ui, &state),
                }
            });

        ui::handle_borderless_window_interactions(ctx, root_rect, &reserved);
        self.apply_actions(ctx, Instant::now());

        let repaint_in = self
            .sync
            .next_wakeup()
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_REPAINT);
        ctx.request_repaint_after(repaint_in);
    }
}

impl App {
    fn maintain_config_watcher(&mut self) {
        let Some(watcher) = self.config_watcher.as_mut() else {
            return;
        };
        match watcher.poll() {
            Some(Ok(config)) => {
                tracing::info!(path = %watcher.path().display(), "config reloaded");
                if config.player != self.config.player {
                    tracing::warn!("[player] changes take effect after a restart");
                }
                self.sync.apply_settings(config.sync.clone());
                if config.window.theme != self.config.window.theme {
                    self.theme = config.window.theme;
                }
                self.config = config;
                self.config_error = None;
                self.applied_theme = None;
                self.last_window_level = None;
            }
            Some(Err(err)) => {
                tracing::warn!("keeping previous config: {err:#}");
                self.config_error = Some(format!("{err:#}"));
            }
            None => {}
        }
    }

    fn apply_theme(&mut self, ctx: &egui::Context) {
        if self.applied_theme == Some(self.theme) {
            return;
        }
        self.palette = Palette::for_choice(self.theme);
        theme::apply_style(ctx, self.theme, &self.palette);
        self.applied_theme = Some(self.theme);
    }

    fn update_window_level(&mut self, ctx: &egui::Context) {
        let desired = if self.config.window.always_on_top {
            WindowLevel::AlwaysOnTop
        } else {
            WindowLevel::Normal
        };

        if self.last_window_level != Some(desired) {
            ctx.send_viewport_cmd(ViewportCommand::WindowLevel(desired));
            self.last_window_level = Some(desired);
        }
    }

    /// Move the window to its configured corner once the monitor size is known.
    fn anchor_window(&mut self, ctx: &egui::Context) {
        if self.anchored {
            return;
        }
        let (monitor, outer) = ctx.input(|i| (i.viewport().monitor_size, i.viewport().outer_rect));
        let window = outer
            .map(|rect| rect.size())
            .unwrap_or(egui::vec2(self.config.window.width, self.config.window.height));

        match monitor {
            Some(monitor) => {
                let position = ui::anchored_position(
                    self.config.window.anchor,
                    monitor,
                    window,
                    self.config.window.margin,
                );
                ctx.send_viewport_cmd(ViewportCommand::OuterPosition(position));
                self.anchored = true;
            }
            None => {
                self.anchor_attempts += 1;
                if self.anchor_attempts >= ANCHOR_ATTEMPTS {
                    tracing::debug!("monitor size unknown, leaving window where it opened");
                    self.anchored = true;
                } else {
                    ctx.request_repaint();
                }
            }
        }
    }

    fn update_artwork_resolution(&mut self, ctx: &egui::Context) {
        let px = (self.config.sync.artwork_px as f32 * ctx.pixels_per_point()).round() as u32;
        if px != self.sync.settings().artwork_px {
            self.sync.set_artwork_px(px);
        }
    }

    fn refresh_artwork_texture(&mut self, ctx: &egui::Context) {
        let generation = self.sync.artwork_cache().generation();
        if generation == self.artwork_generation && self.artwork_texture.is_some() {
            return;
        }
        self.artwork_generation = generation;
        self.artwork_texture = self.sync.artwork().map(|artwork| {
            let image = ColorImage::from_rgba_unmultiplied(artwork.size, &artwork.rgba);
            ctx.load_texture("mini-player.artwork", image, TextureOptions::LINEAR)
        });
    }

    fn render_header(&mut self, ui: &mut egui::Ui, state: &PlaybackState) -> egui::Rect {
        let mut buttons_rect = egui::Rect::NOTHING;
        ui.horizontal(|row| {
            row.set_height(HEADER_HEIGHT);
            let caption = match self.view {
                ViewMode::Standard if state.is_playing => "Now Playing",
                ViewMode::Standard => "Paused",
                ViewMode::Playlist => "Up Next",
            };
            row.label(RichText::new(caption).small().color(self.palette.muted));

            row.with_layout(egui::Layout::right_to_left(egui::Align::Center), |tools| {
                tools.set_opacity(self.controls_alpha.max(0.15));
                let close = tools.small_button("✕").on_hover_text("Close");
                if close.clicked() {
                    self.actions.push(UiAction::Close);
                }
                let playlist_hint = match self.view {
                    ViewMode::Standard => "Show playlist",
                    ViewMode::Playlist => "Back to player",
                };
                let playlist = tools.small_button("☰").on_hover_text(playlist_hint);
                if playlist.clicked() {
                    self.actions.push(UiAction::ToggleView);
                }
                let theme_glyph = match self.theme {
                    ThemeChoice::Dark => "☀",
                    ThemeChoice::Light => "☾",
                };
                let appearance = tools
                    .small_button(theme_glyph)
                    .on_hover_text("Switch appearance");
                if appearance.clicked() {
                    self.actions.push(UiAction::ToggleTheme);
                }
                buttons_rect = close.rect.union(playlist.rect).union(appearance.rect);
            });
        });
        buttons_rect
    }

    fn render_errors(&self, ui: &mut egui::Ui, state: &PlaybackState) {
        if let Some(err) = &state.error {
            ui.colored_label(self.palette.error, RichText::new(format!("Error: {err}")).small())
                .on_hover_text("Allow automation of Music in System Settings › Privacy & Security");
        }
        if let Some(err) = &self.config_error {
            ui.colored_label(self.palette.error, RichText::new(format!("Config: {err}")).small());
        }
    }

    fn render_now_playing(&mut self, ui: &mut egui::Ui, state: &PlaybackState) {
        let available = ui.available_size();
        let side = available.y.min(available.x * 0.38).max(48.0);

        ui.horizontal_top(|row| {
            self.paint_artwork(row, side);
            row.vertical(|column| {
                column.spacing_mut().item_spacing.y = 2.0;
                column.add(
                    egui::Label::new(RichText::new(&state.title).strong().size(15.0)).truncate(),
                );
                if !state.artist.is_empty() {
                    column.add(
                        egui::Label::new(RichText::new(&state.artist).color(self.palette.muted))
                            .truncate(),
                    );
                }
                if !state.album.is_empty() {
                    column.add(
                        egui::Label::new(
                            RichText::new(&state.album).small().color(self.palette.muted),
                        )
                        .truncate(),
                    );
                }
                self.render_errors(column, state);
                self.render_timeline(column, state);

                column.scope(|controls| {
                    controls.set_opacity(self.controls_alpha);
                    self.render_transport(controls, state);
                    self.render_volume(controls, state);
                });
            });
        });
    }

    fn paint_artwork(&self, ui: &mut egui::Ui, side: f32) {
        let (rect, _) = ui.allocate_exact_size(egui::vec2(side, side), egui::Sense::hover());
        let rounding = CornerRadius::same(8);
        match &self.artwork_texture {
            Some(texture) => {
                egui::Image::new(texture)
                    .corner_radius(rounding)
                    .paint_at(ui, rect);
            }
            None => {
                let painter = ui.painter_at(rect);
                painter.rect_filled(rect, rounding, self.palette.overlay);
                painter.text(
                    rect.center(),
                    egui::Align2::CENTER_CENTER,
                    "♪",
                    FontId::proportional(side * 0.4),
                    self.palette.muted,
                );
            }
        }
    }

    fn render_timeline(&mut self, ui: &mut egui::Ui, state: &PlaybackState) {
        let metrics = StripMetrics::for_width(ui.available_width());
        let duration = state.duration_secs;

        if duration <= f64::EPSILON {
            metrics.show(ui, |inner| {
                inner.add(
                    egui::ProgressBar::new(0.0)
                        .desired_height(4.0)
                        .desired_width(metrics.content_width()),
                );
            });
            return;
        }

        let mut value = self.seek_preview.unwrap_or(state.position_secs);
        let response = metrics.show(ui, |inner| {
            inner.spacing_mut().slider_width = metrics.content_width();
            inner.add(egui::Slider::new(&mut value, 0.0..=duration).show_value(false))
        });

        if response.changed() {
            self.seek_preview = Some(value);
        }
        if response.drag_stopped() || (response.clicked() && !response.dragged()) {
            self.seek_preview = None;
            if (value - state.position_secs).abs() > 0.001 {
                self.actions.push(UiAction::Seek(value));
            }
        }

        metrics.show(ui, |inner| {
            inner.columns(2, |columns| {
                columns[0].with_layout(egui::Layout::left_to_right(egui::Align::Center), |col| {
                    col.label(RichText::new(format_timestamp(value)).small().monospace());
                });
                columns[1].with_layout(egui::Layout::right_to_left(egui::Align::Center), |col| {
                    col.label(RichText::new(format_timestamp(duration)).small().monospace());
                });
            });
        });
    }

    fn render_transport(&mut self, ui: &mut egui::Ui, state: &PlaybackState) {
        ui.horizontal(|row| {
            row.spacing_mut().item_spacing.x = 10.0;

            let shuffle = RichText::new("🔀").color(if state.shuffle_enabled {
                self.palette.accent
            } else {
                self.palette.muted
            });
            if row.button(shuffle).on_hover_text("Shuffle").clicked() {
                self.actions.push(UiAction::ToggleShuffle);
            }

            if row.button("⏮").on_hover_text("Previous track").clicked() {
                self.actions.push(UiAction::Previous);
            }
            let (glyph, hint) = if state.is_playing {
                ("⏸", "Pause")
            } else {
                ("⏵", "Play")
            };
            if row
                .button(RichText::new(glyph).size(18.0))
                .on_hover_text(hint)
                .clicked()
            {
                self.actions.push(UiAction::PlayPause);
            }
            if row.button("⏭").on_hover_text("Next track").clicked() {
                self.actions.push(UiAction::Next);
            }

            let (repeat_glyph, repeat_hint) = match state.repeat_mode {
                RepeatMode::Off => ("🔁", "Repeat off"),
                RepeatMode::All => ("🔁", "Repeat all"),
                RepeatMode::One => ("🔂", "Repeat one"),
            };
            let repeat_color = if state.repeat_mode == RepeatMode::Off {
                self.palette.muted
            } else {
                self.palette.accent
            };
            if row
                .button(RichText::new(repeat_glyph).color(repeat_color))
                .on_hover_text(repeat_hint)
                .clicked()
            {
                self.actions.push(UiAction::ToggleRepeat);
            }
        });
    }

    fn render_volume(&mut self, ui: &mut egui::Ui, state: &PlaybackState) {
        ui.horizontal(|row| {
            let glyph = if state.is_muted || state.volume == 0 {
                "🔇"
            } else {
                "🔊"
            };
            let hint = if state.is_muted { "Unmute" } else { "Mute" };
            if row.small_button(glyph).on_hover_text(hint).clicked() {
                self.actions.push(UiAction::ToggleMute);
            }

            let mut volume = self.volume_preview.unwrap_or(state.volume);
            row.spacing_mut().slider_width = row.available_width().max(40.0);
            let response = row.add(egui::Slider::new(&mut volume, 0..=100).show_value(false));
            if response.changed() {
                self.volume_preview = Some(volume);
            }
            if response.drag_stopped() || (response.clicked() && !response.dragged()) {
                self.volume_preview = None;
                if volume != state.volume {
                    self.actions.push(UiAction::SetVolume(volume));
                }
            }
        });
    }

    fn render_playlist(&mut self, ui: &mut egui::Ui, state: &PlaybackState) {
        self.render_errors(ui, state);

        if self.sync.playlist_loading() && self.sync.playlist().is_none() {
            ui.horizontal(|row| {
                row.spinner();
                row.label(RichText::new("Loading playlist…").color(self.palette.muted));
            });
            return;
        }
        if let Some(err) = self.sync.playlist_error() {
            ui.colored_label(self.palette.error, RichText::new(err).small());
        }
        let Some(playlist) = self.sync.playlist() else {
            return;
        };

        ui.label(RichText::new(&playlist.name).strong());
        if playlist.entries.is_empty() {
            ui.label(RichText::new("This playlist is empty.").color(self.palette.muted));
            return;
        }

        let current = playlist.position_of(&state.track_id);
        let mut picked = None;
        egui::ScrollArea::vertical()
            .auto_shrink([false, false])
            .show(ui, |list| {
                for (index, entry) in playlist.entries.iter().enumerate() {
                    let is_current = current == Some(index);
                    let text = RichText::new(format!("{:>3}. {}", index + 1, entry.display_name));
                    let text = if is_current {
                        text.color(self.palette.accent).strong()
                    } else {
                        text
                    };
                    let response = list.selectable_label(is_current, text);
                    if is_current && self.scroll_to_current {
                        response.scroll_to_me(Some(egui::Align::Center));
                        self.scroll_to_current = false;
                    }
                    if response.clicked() {
                        picked = Some(entry.track_id.clone());
                    }
                }
                if playlist.truncated {
                    list.label(
                        RichText::new(format!("Showing the first {} tracks", playlist.entries.len()))
                            .small()
                            .color(self.palette.muted),
                    );
                }
            });

        if let Some(id) = picked {
            self.actions.push(UiAction::PlayTrack(id));
        }
    }

    fn apply_actions(&mut self, ctx: &egui::Context, now: Instant) {
        for action in std::mem::take(&mut self.actions) {
            tracing::debug!(?action, "ui action");
            match action {
                UiAction::PlayPause => self.sync.play_pause(now),
                UiAction::Next => self.sync.next_track(now),
                UiAction::Previous => self.sync.previous_track(now),
                UiAction::Seek(secs) => self.sync.seek(secs, now),
                UiAction::SetVolume(volume) => self.sync.set_volume(volume, now),
                UiAction::ToggleMute => self.sync.toggle_mute(now),
                UiAction::ToggleShuffle => self.sync.toggle_shuffle(now),
                UiAction::ToggleRepeat => self.sync.toggle_repeat(now),
                UiAction::PlayTrack(id) => self.sync.play_track(id, now),
                UiAction::ToggleView => self.toggle_view(),
                UiAction::ToggleTheme => self.theme = theme::toggled(self.theme),
                UiAction::Close => ctx.send_viewport_cmd(ViewportCommand::Close),
            }
        }
    }

    fn toggle_view(&mut self) {
        self.view = match self.view {
            ViewMode::Standard => {
                self.sync.fetch_playlist();
                self.scroll_to_current = true;
                ViewMode::Playlist
            }
            ViewMode::Playlist => {
                self.sync.discard_playlist();
                ViewMode::Standard
            }
        };
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (loaded, config_error) = match Config::load(cli.config.as_deref()) {
        Ok(loaded) => (loaded, None),
        Err(err) => (
            LoadedConfig {
                config: Config::default(),
                path: cli.config.clone(),
            },
            Some(format!("{err:#}")),
        ),
    };

    logging::init(
        cli.log_level
            .as_deref()
            .or(loaded.config.log.level.as_deref()),
    );
    match (&config_error, &loaded.path) {
        (Some(err), _) => tracing::warn!("using default config: {err}"),
        (None, Some(path)) => tracing::info!(path = %path.display(), "config loaded"),
        (None, None) => tracing::info!("no config file found, using defaults"),
    }

    let window = &loaded.config.window;
    let level = if window.always_on_top {
        WindowLevel::AlwaysOnTop
    } else {
        WindowLevel::Normal
    };
    let native_options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_title("Mini Player")
            .with_inner_size([window.width, window.height])
            .with_min_inner_size([window.min_width, window.min_height])
            .with_decorations(false)
            .with_transparent(true)
            .with_resizable(true)
            .with_window_level(level),
        ..Default::default()
    };

    eframe::run_native(
        "Mini Player",
        native_options,
        Box::new(
            move |cc| -> std::result::Result<
                Box<dyn eframe::App>,
                Box<dyn std::error::Error + Send + Sync>,
            > { Ok(Box::new(App::new(cc, loaded, config_error)?)) },
        ),
    )
    .map_err(|err| anyhow!("{err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_accepts_config_and_log_level() {
        let cli = Cli::try_parse_from([
            "mini-player",
            "--config",
            "/tmp/mini.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/mini.toml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn cli_defaults_to_discovery() {
        let cli = Cli::try_parse_from(["mini-player"]).unwrap();
        assert!(cli.config.is_none());
        assert!(cli.log_level.is_none());
    }
}
