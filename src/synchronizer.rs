//! The state synchronizer.
//!
//! Owns the published [`PlaybackState`]. Scripted calls run on the worker
//! thread; everything that writes state happens in [`Synchronizer::poll`] (or
//! the command methods), which the UI loop calls on its own thread.

use std::{
    sync::mpsc::{self, Receiver},
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    artwork::{Artwork, ArtworkCache, DEFAULT_ARTWORK_SIZE},
    automation::Automation,
    error::{Error, Result},
    estimator::PositionEstimator,
    intent::{Intent, MuteMemory, PendingIntents},
    model::{
        PlaybackState, PlaylistSnapshot, TrackIdentity, TrackKey, CONNECTION_FAILED_ARTIST,
        CONNECTION_FAILED_TITLE, MAX_PLAYLIST_TRACKS,
    },
    notifications::{ChangeNotifier, ChangeSubscription},
    reply::{self, PlaylistReply, StateReply, StateSnapshot},
    retry::{RefreshReason, RefreshSchedule, TrackRetry, MAX_ARTWORK_RETRIES},
    script::{PlayerCommand, Script, ScriptBuilder},
    worker::{Job, JobKind, Outcome, Waker, Worker},
};

#[derive(Clone, Debug, PartialEq)]
pub struct SyncSettings {
    /// Wait after a change notification before querying.
    pub debounce: Duration,
    /// Follow-up query after a track change.
    pub track_recheck_delay: Duration,
    pub artwork_retry_delay: Duration,
    pub max_artwork_retries: u8,
    /// Confirmation query after a command.
    pub confirm_delay: Duration,
    pub repeat_confirm_delay: Duration,
    /// Interval for periodic queries when no notification subscription exists.
    /// Zero turns polling off.
    pub fallback_poll: Duration,
    pub playlist_limit: usize,
    /// Artwork edge length in physical pixels.
    pub artwork_px: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            track_recheck_delay: Duration::from_secs(2),
            artwork_retry_delay: Duration::from_millis(1500),
            max_artwork_retries: MAX_ARTWORK_RETRIES,
            confirm_delay: Duration::from_millis(500),
            repeat_confirm_delay: Duration::from_millis(200),
            fallback_poll: Duration::from_secs(2),
            playlist_limit: MAX_PLAYLIST_TRACKS,
            artwork_px: DEFAULT_ARTWORK_SIZE,
        }
    }
}

pub struct Synchronizer {
    settings: SyncSettings,
    scripts: ScriptBuilder,
    worker: Worker,
    next_seq: u64,

    state: PlaybackState,
    artwork: ArtworkCache,
    intents: PendingIntents,
    mute: MuteMemory,
    estimator: PositionEstimator,

    schedule: RefreshSchedule,
    current_track: TrackKey,
    track_retry: Option<TrackRetry>,

    playlist: Option<PlaylistSnapshot>,
    playlist_error: Option<String>,
    /// Job whose playlist reply is awaited; other playlist replies are stale.
    playlist_seq: Option<u64>,

    notifier: ChangeNotifier,
    changes_rx: Receiver<()>,
    subscription: Option<ChangeSubscription>,
    polling: bool,
    next_poll: Option<Instant>,
}

impl Synchronizer {
    /// Start the worker and issue the first query.
    pub fn spawn<A>(
        automation: A,
        scripts: ScriptBuilder,
        settings: SyncSettings,
        waker: Waker,
        now: Instant,
    ) -> Result<Self>
    where
        A: Automation + 'static,
    {
        let worker = Worker::spawn(automation, waker.clone())?;
        let (changes_tx, changes_rx) = mpsc::channel();

        let mut sync = Self {
            artwork: ArtworkCache::new(settings.artwork_px),
            settings,
            scripts,
            worker,
            next_seq: 0,
            state: PlaybackState::default(),
            intents: PendingIntents::default(),
            mute: MuteMemory::default(),
            estimator: PositionEstimator::new(now),
            schedule: RefreshSchedule::default(),
            current_track: TrackKey::None,
            track_retry: None,
            playlist: None,
            playlist_error: None,
            playlist_seq: None,
            notifier: ChangeNotifier::new(changes_tx, waker),
            changes_rx,
            subscription: None,
            polling: false,
            next_poll: None,
        };
        sync.refresh(RefreshReason::Startup);
        Ok(sync)
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn artwork(&self) -> Option<&Arc<Artwork>> {
        self.artwork.image()
    }

    pub fn artwork_cache(&self) -> &ArtworkCache {
        &self.artwork
    }

    pub fn playlist(&self) -> Option<&PlaylistSnapshot> {
        self.playlist.as_ref()
    }

    pub fn playlist_error(&self) -> Option<&str> {
        self.playlist_error.as_deref()
    }

    pub fn playlist_loading(&self) -> bool {
        self.playlist_seq.is_some()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn pending_refreshes(&self) -> impl Iterator<Item = &RefreshReason> {
        self.schedule.pending()
    }

    pub fn track_retry(&self) -> Option<&TrackRetry> {
        self.track_retry.as_ref()
    }

    pub fn apply_settings(&mut self, settings: SyncSettings) {
        if settings.artwork_px != self.settings.artwork_px {
            self.artwork.set_target_px(settings.artwork_px);
        }
        let reschedule = self.polling && settings.fallback_poll != self.settings.fallback_poll;
        self.settings = settings;
        if reschedule {
            self.schedule_poll(Instant::now());
        }
    }

    pub fn set_artwork_px(&mut self, px: u32) {
        self.settings.artwork_px = px;
        self.artwork.set_target_px(px);
    }

    /// Handle for whoever delivers change notifications.
    pub fn change_notifier(&self) -> ChangeNotifier {
        self.notifier.clone()
    }

    /// Keep the subscription alive for as long as the synchronizer runs.
    pub fn attach_subscription(&mut self, subscription: ChangeSubscription) {
        self.subscription = Some(subscription);
        self.polling = false;
        self.next_poll = None;
    }

    /// Query on a fixed interval instead of waiting for notifications.
    pub fn enable_fallback_polling(&mut self, now: Instant) {
        self.polling = true;
        self.schedule_poll(now);
        if self.next_poll.is_some() {
            tracing::info!(
                interval_ms = self.settings.fallback_poll.as_millis() as u64,
                "polling player without notifications"
            );
        } else {
            tracing::info!("fallback polling is off; refreshing on commands only");
        }
    }

    fn schedule_poll(&mut self, now: Instant) {
        let interval = self.settings.fallback_poll;
        self.next_poll = (!interval.is_zero()).then(|| now + interval);
    }

    /// A change notification arrived; query once things settle.
    pub fn notify_changed(&mut self, now: Instant) {
        self.schedule.debounce(now + self.settings.debounce);
    }

    /// Query the player now.
    pub fn refresh(&mut self, reason: RefreshReason) {
        tracing::debug!(?reason, attempt = reason.attempt(), "refresh");
        let script = self.scripts.state_query();
        self.submit(JobKind::Query(reason), script);
    }

    pub fn fetch_playlist(&mut self) {
        if self.playlist_seq.is_some() {
            return;
        }
        let limit = self.settings.playlist_limit.clamp(1, MAX_PLAYLIST_TRACKS);
        let script = self.scripts.playlist_query(limit);
        if let Some(seq) = self.submit(JobKind::Playlist { limit }, script) {
            self.playlist_seq = Some(seq);
            self.playlist_error = None;
        }
    }

    /// Drop the playlist; it is only meaningful while the playlist view is open.
    pub fn discard_playlist(&mut self) {
        self.playlist = None;
        self.playlist_error = None;
        self.playlist_seq = None;
    }

    /// Send a mutation and schedule its confirmation query.
    pub fn issue_command(&mut self, command: PlayerCommand, now: Instant) -> Option<u64> {
        let delay = match command {
            PlayerCommand::SetRepeat(_) => self.settings.repeat_confirm_delay,
            _ => self.settings.confirm_delay,
        };
        tracing::debug!(%command, "command");
        let script = self.scripts.command(&command);
        let seq = self.submit(JobKind::Command(command), script)?;
        self.schedule.schedule(now + delay, RefreshReason::Confirm);
        Some(seq)
    }

    fn command_with_intent(&mut self, command: PlayerCommand, intent: Intent, now: Instant) {
        if let Some(seq) = self.issue_command(command, now) {
            self.intents.record(intent, seq);
        }
        match intent {
            Intent::Playing(v) => self.state.is_playing = v,
            Intent::Volume(v) => self.state.volume = v,
            Intent::Shuffle(v) => self.state.shuffle_enabled = v,
            Intent::Repeat(v) => self.state.repeat_mode = v,
            Intent::Position(v) => self.state.position_secs = v,
        }
    }

    pub fn play_pause(&mut self, now: Instant) {
        let playing = !self.state.is_playing;
        self.command_with_intent(PlayerCommand::PlayPause, Intent::Playing(playing), now);
    }

    pub fn next_track(&mut self, now: Instant) {
        self.issue_command(PlayerCommand::NextTrack, now);
    }

    pub fn previous_track(&mut self, now: Instant) {
        self.issue_command(PlayerCommand::PreviousTrack, now);
    }

    pub fn set_volume(&mut self, volume: u8, now: Instant) {
        let volume = volume.min(100);
        self.mute.forget();
        self.state.is_muted = false;
        self.command_with_intent(PlayerCommand::SetVolume(volume), Intent::Volume(volume), now);
    }

    pub fn toggle_mute(&mut self, now: Instant) {
        let volume = self.mute.toggle(self.state.volume);
        self.state.is_muted = self.mute.is_muted();
        self.command_with_intent(PlayerCommand::SetVolume(volume), Intent::Volume(volume), now);
    }

    pub fn seek(&mut self, secs: f64, now: Instant) {
        let mut secs = secs.max(0.0);
        if self.state.duration_secs > 0.0 {
            secs = secs.min(self.state.duration_secs);
        }
        self.command_with_intent(PlayerCommand::Seek(secs), Intent::Position(secs), now);
    }

    pub fn toggle_shuffle(&mut self, now: Instant) {
        let shuffle = !self.state.shuffle_enabled;
        self.command_with_intent(PlayerCommand::SetShuffle(shuffle), Intent::Shuffle(shuffle), now);
    }

    pub fn toggle_repeat(&mut self, now: Instant) {
        let mode = self.state.repeat_mode.next();
        self.command_with_intent(PlayerCommand::SetRepeat(mode), Intent::Repeat(mode), now);
    }

    pub fn play_track(&mut self, id: TrackIdentity, now: Instant) {
        if id.is_empty() {
            return;
        }
        self.issue_command(PlayerCommand::PlayTrack(id), now);
    }

    /// Apply finished jobs, fire due refreshes and advance the estimator.
    ///
    /// Returns true when anything visible may have changed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut changed = false;

        while let Some(outcome) = self.worker.try_recv() {
            changed |= self.apply_outcome(outcome, now);
        }

        let mut notified = false;
        while self.changes_rx.try_recv().is_ok() {
            notified = true;
        }
        if notified {
            self.notify_changed(now);
        }

        for reason in self.schedule.take_due(now) {
            if let Some(track) = reason.track() {
                if track != &self.current_track {
                    tracing::debug!(?reason, "dropping follow-up for a previous track");
                    continue;
                }
            }
            self.refresh(reason);
        }

        if let Some(due) = self.next_poll {
            if now >= due {
                self.refresh(RefreshReason::Poll);
                self.schedule_poll(now);
            }
        }

        changed |= self.estimator.poll(now, &mut self.state);
        changed
    }

    /// Block until one job finishes (or `timeout` passes) and apply it.
    pub fn pump_blocking(&mut self, timeout: Duration) -> bool {
        match self.worker.recv_timeout(timeout) {
            Some(outcome) => {
                self.apply_outcome(outcome, Instant::now());
                true
            }
            None => false,
        }
    }

    /// Earliest moment `poll` has work to do without an outside event.
    pub fn next_wakeup(&self) -> Option<Instant> {
        let estimator = self
            .state
            .is_playing
            .then(|| self.estimator.next_tick());
        [self.schedule.next_due(), estimator, self.next_poll]
            .into_iter()
            .flatten()
            .min()
    }

    pub fn shutdown(&mut self) {
        self.subscription = None;
        self.worker.shutdown();
    }

    fn submit(&mut self, kind: JobKind, script: Script) -> Option<u64> {
        self.next_seq += 1;
        let seq = self.next_seq;
        match self.worker.submit(Job { seq, kind, script }) {
            Ok(()) => Some(seq),
            Err(err) => {
                tracing::warn!("job {seq} not sent: {err}");
                None
            }
        }
    }

    fn apply_outcome(&mut self, outcome: Outcome, now: Instant) -> bool {
        let Outcome { seq, kind, result } = outcome;
        match kind {
            JobKind::Query(reason) => self.apply_query(seq, reason, result, now),
            JobKind::Playlist { limit } => self.apply_playlist(seq, result, limit),
            JobKind::Command(command) => {
                if let Err(err) = result {
                    tracing::warn!(%command, "command failed: {err}");
                }
                false
            }
        }
    }

    fn apply_query(
        &mut self,
        seq: u64,
        reason: RefreshReason,
        result: Result<String>,
        now: Instant,
    ) -> bool {
        let reply = result
            .and_then(|text| reply::parse(&text))
            .and_then(|value| reply::state_reply(&value));

        match reply {
            Ok(StateReply::Playing(snapshot)) => {
                self.apply_snapshot(seq, *snapshot, now);
                true
            }
            Ok(StateReply::Stopped {
                volume,
                shuffle_enabled,
                repeat_mode,
            }) => {
                let mut state = PlaybackState {
                    volume,
                    shuffle_enabled,
                    repeat_mode,
                    ..Default::default()
                };
                self.reconcile(seq, &mut state);
                self.apply_idle(state);
                true
            }
            Ok(StateReply::NotRunning) => {
                let mut state = PlaybackState {
                    volume: self.state.volume,
                    shuffle_enabled: self.state.shuffle_enabled,
                    repeat_mode: self.state.repeat_mode,
                    ..Default::default()
                };
                self.reconcile(seq, &mut state);
                self.apply_idle(state);
                true
            }
            Ok(StateReply::Failure(message)) => {
                self.apply_failure(message);
                true
            }
            Err(err @ (Error::Reply { .. } | Error::ReplyShape(_))) => {
                tracing::debug!(?reason, "ignoring unreadable reply: {err}");
                false
            }
            Err(err) => {
                self.apply_failure(err.to_string());
                true
            }
        }
    }

    fn reconcile(&mut self, seq: u64, state: &mut PlaybackState) {
        let overlaid = !self.intents.is_empty();
        self.intents.reconcile(seq, state);
        if overlaid && self.intents.is_empty() {
            tracing::debug!(seq, "pending commands settled");
        }
        if self.mute.is_muted() && state.volume > 0 && !self.intents.volume_pending() {
            tracing::debug!("volume changed outside the mini player, dropping mute");
            self.mute.forget();
        }
        state.is_muted = self.mute.is_muted();
    }

    fn apply_snapshot(&mut self, seq: u64, snapshot: StateSnapshot, now: Instant) {
        let StateSnapshot { mut state, artwork } = snapshot;
        self.reconcile(seq, &mut state);

        let key = TrackKey::of(&state);
        let track_changed = key != self.current_track;
        if track_changed {
            tracing::info!(title = %state.title, artist = %state.artist, "track changed");
            self.artwork.invalidate();
            self.track_retry = Some(TrackRetry::new(
                key.clone(),
                self.settings.max_artwork_retries,
            ));
            self.schedule.schedule(
                now + self.settings.track_recheck_delay,
                RefreshReason::TrackRecheck(key.clone()),
            );
            self.current_track = key;
        }

        self.state = state;

        match artwork {
            Some(bytes) => {
                self.artwork.update(&bytes);
            }
            None if self.artwork.is_empty() && !track_changed => {
                self.schedule_artwork_retry(now);
            }
            None => {}
        }
    }

    fn schedule_artwork_retry(&mut self, now: Instant) {
        let current = &self.current_track;
        if *current == TrackKey::None {
            return;
        }
        // One follow-up per track in the queue at a time.
        if self
            .schedule
            .pending()
            .any(|reason| reason.track() == Some(current))
        {
            return;
        }
        let Some(retry) = self.track_retry.as_mut().filter(|r| r.key() == current) else {
            return;
        };
        match retry.take_artwork_attempt() {
            Some(attempt) => {
                let reason = RefreshReason::ArtworkRetry {
                    track: current.clone(),
                    attempt,
                };
                self.schedule
                    .schedule(now + self.settings.artwork_retry_delay, reason);
            }
            None => tracing::debug!("no artwork for this track, giving up"),
        }
    }

    fn apply_idle(&mut self, state: PlaybackState) {
        if self.current_track != TrackKey::None {
            tracing::info!("playback stopped");
            self.current_track = TrackKey::None;
            self.track_retry = None;
            self.artwork.invalidate();
        }
        self.state = state;
    }

    fn apply_failure(&mut self, message: String) {
        tracing::warn!("player query failed: {message}");
        self.state.title = CONNECTION_FAILED_TITLE.to_string();
        self.state.artist = CONNECTION_FAILED_ARTIST.to_string();
        self.state.error = Some(message);
    }

    fn apply_playlist(&mut self, seq: u64, result: Result<String>, limit: usize) -> bool {
        if self.playlist_seq != Some(seq) {
            tracing::debug!(seq, "playlist reply no longer wanted");
            return false;
        }
        self.playlist_seq = None;
        let reply = result
            .and_then(|text| reply::parse(&text))
            .and_then(|value| reply::playlist_reply(&value, limit));

        match reply {
            Ok(PlaylistReply::Playlist(playlist)) => {
                tracing::debug!(
                    name = %playlist.name,
                    tracks = playlist.entries.len(),
                    "playlist fetched"
                );
                self.playlist = Some(playlist);
                self.playlist_error = None;
            }
            Ok(PlaylistReply::NotRunning) => {
                self.playlist = None;
                self.playlist_error = Some("The player is not running.".into());
            }
            Ok(PlaylistReply::Failure(message)) => {
                tracing::warn!("playlist query failed: {message}");
                self.playlist = None;
                self.playlist_error = Some(message);
            }
            Err(err) => {
                tracing::warn!("playlist unavailable: {err}");
                self.playlist_error = Some(err.to_string());
            }
        }
        true
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
