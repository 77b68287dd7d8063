//! Playback session - the background engine
//!
//! One session owns the player and at most one active item. Everything that
//! changes session state runs on a single `select!` loop: user commands,
//! player callbacks, completions of the asynchronous fetches, and the segment
//! timer. Each load bumps a generation counter and completions carrying an
//! older generation are dropped, so a slow fetch for a video the user already
//! left can never touch the current one.

use crate::core::autoplay::AutoPlayResolver;
use crate::core::events::{EventBus, SessionEvent};
use crate::core::gesture::{GestureClassifier, GestureInput};
use crate::core::player::{MediaPlayer, PlayerEvent};
use crate::core::queue::PlayingQueue;
use crate::core::segments::{SegmentSkipMonitor, SkipAction, POLL_INTERVAL};
use crate::core::source::{select_source, PlaylistSource, PositionStore, StreamSource};
use crate::error::{ErrorKind, Result, TubeError};
use crate::types::{
    AudioQuality, Config, GestureEvent, PlaybackFailure, PlaybackState, RepeatMode, SegmentSet,
    StreamDescriptor, TapZone, VideoId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Session knobs taken from the user configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub autoplay: bool,
    pub audio_only: bool,
    pub audio_quality: AudioQuality,
    pub playback_speed: f32,
    pub seek_increment: Duration,
    pub sponsor_categories: Vec<String>,
    pub skip_notifications: bool,
    pub watch_positions: bool,
    pub repeat_mode: RepeatMode,
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            autoplay: cfg.autoplay,
            audio_only: cfg.audio_only,
            audio_quality: cfg.audio_quality,
            playback_speed: cfg.playback_speed,
            seek_increment: Duration::from_secs(cfg.seek_increment_secs),
            sponsor_categories: cfg.sponsor_categories.clone(),
            skip_notifications: cfg.skip_notifications,
            watch_positions: cfg.watch_positions,
            repeat_mode: cfg.repeat_mode,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// What to play next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub video_id: VideoId,
    pub playlist_id: Option<String>,
    /// Offset to start at; `None` consults the position store
    pub resume_at: Option<u64>,
}

impl LoadRequest {
    pub fn new(video_id: impl Into<VideoId>) -> Self {
        Self {
            video_id: video_id.into(),
            playlist_id: None,
            resume_at: None,
        }
    }

    pub fn with_playlist(mut self, playlist_id: impl Into<String>) -> Self {
        self.playlist_id = Some(playlist_id.into());
        self
    }

    pub fn resume_at(mut self, position_millis: u64) -> Self {
        self.resume_at = Some(position_millis);
        self
    }
}

/// Inbound requests from UI callers
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Load(LoadRequest),
    Play,
    Pause,
    TogglePause,
    SeekTo(u64),
    SeekBy(i64),
    Gesture(GestureEvent),
    SetAutoplay(bool),
    SetRepeat(RepeatMode),
    Stop,
}

/// External services the session depends on
#[derive(Clone)]
pub struct Collaborators {
    pub streams: Arc<dyn StreamSource>,
    pub playlists: Option<Arc<dyn PlaylistSource>>,
    pub positions: Arc<dyn PositionStore>,
}

enum Completion {
    Stream {
        generation: u64,
        result: Result<StreamDescriptor>,
        resume_at: Option<u64>,
    },
    Segments {
        generation: u64,
        result: Result<SegmentSet>,
    },
    Next {
        generation: u64,
        next: Option<VideoId>,
    },
}

impl Completion {
    fn generation(&self) -> u64 {
        match self {
            Completion::Stream { generation, .. }
            | Completion::Segments { generation, .. }
            | Completion::Next { generation, .. } => *generation,
        }
    }
}

/// Data owned by the current generation only
struct ActiveItem {
    video_id: VideoId,
    descriptor: Option<StreamDescriptor>,
    monitor: Option<SegmentSkipMonitor>,
}

pub struct PlaybackSession {
    player: Box<dyn MediaPlayer>,
    streams: Arc<dyn StreamSource>,
    positions: Arc<dyn PositionStore>,
    resolver: Arc<AutoPlayResolver>,
    queue: Arc<PlayingQueue>,
    events: EventBus,
    config: SessionConfig,

    state: PlaybackState,
    generation: u64,
    active: Option<ActiveItem>,
    fetches: Vec<JoinHandle<()>>,
    skip_timer: Option<Interval>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    last_position: u64,
    finished: bool,
    released: bool,
}

impl PlaybackSession {
    pub fn new(
        player: Box<dyn MediaPlayer>,
        collaborators: Collaborators,
        queue: Arc<PlayingQueue>,
        config: SessionConfig,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        queue.set_repeat(config.repeat_mode == RepeatMode::Queue);

        Self {
            player,
            streams: collaborators.streams,
            positions: collaborators.positions,
            resolver: Arc::new(AutoPlayResolver::new(collaborators.playlists)),
            queue,
            events: EventBus::default(),
            config,
            state: PlaybackState::Idle,
            generation: 0,
            active: None,
            fetches: Vec::new(),
            skip_timer: None,
            completions_tx,
            completions_rx,
            last_position: 0,
            finished: false,
            released: false,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn current_video(&self) -> Option<&VideoId> {
        self.active.as_ref().map(|item| &item.video_id)
    }

    pub fn queue(&self) -> &Arc<PlayingQueue> {
        &self.queue
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Begin a fresh session: forget the previous queue and history, then load
    pub async fn start(&mut self, request: LoadRequest) -> Result<()> {
        self.queue.clear();
        self.resolver.reset();
        self.finished = false;
        self.request_load(request).await
    }

    /// Move to `Loading` for `request`, abandoning whatever was in flight
    pub async fn request_load(&mut self, request: LoadRequest) -> Result<()> {
        if !self.state.accepts_load() {
            debug!(state = %self.state, "replacing current item");
        }
        if self.state.is_active() {
            self.persist_position().await?;
        }

        self.cancel_fetches();
        self.stop_monitor();
        self.generation += 1;
        let generation = self.generation;

        self.resolver.set_playlist(request.playlist_id.as_deref());
        self.queue.add_upcoming(request.video_id.clone());
        self.events.emit(SessionEvent::QueueChanged);

        self.active = Some(ActiveItem {
            video_id: request.video_id.clone(),
            descriptor: None,
            monitor: None,
        });
        self.last_position = 0;
        self.set_state(PlaybackState::Loading);
        info!(video = %request.video_id, generation, "loading stream");

        let streams = Arc::clone(&self.streams);
        let positions = Arc::clone(&self.positions);
        let tx = self.completions_tx.clone();
        let watch_positions = self.config.watch_positions;
        let handle = tokio::spawn(async move {
            let video_id = request.video_id;
            let result = streams.fetch_stream(&video_id).await;
            let resume_at = match request.resume_at {
                Some(at) => Some(at),
                None if watch_positions && result.is_ok() => {
                    positions.load(&video_id).await.unwrap_or_else(|e| {
                        debug!(video = %video_id, error = %e, "no saved position");
                        None
                    })
                }
                None => None,
            };
            let _ = tx.send(Completion::Stream {
                generation,
                result,
                resume_at,
            });
        });
        self.fetches.push(handle);
        Ok(())
    }

    async fn on_completion(&mut self, completion: Completion) -> Result<()> {
        self.fetches.retain(|handle| !handle.is_finished());

        if completion.generation() != self.generation {
            debug!(
                stale = completion.generation(),
                current = self.generation,
                "dropping stale completion"
            );
            return Ok(());
        }

        match completion {
            Completion::Stream {
                result, resume_at, ..
            } => self.on_stream_fetched(result, resume_at).await,
            Completion::Segments { result, .. } => {
                self.on_segments_fetched(result);
                Ok(())
            }
            Completion::Next { next, .. } => self.on_next_resolved(next).await,
        }
    }

    async fn on_stream_fetched(
        &mut self,
        result: Result<StreamDescriptor>,
        resume_at: Option<u64>,
    ) -> Result<()> {
        if self.state != PlaybackState::Loading {
            return Ok(());
        }

        let descriptor = match result {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.fail(e);
                return Ok(());
            }
        };
        let source = match select_source(
            &descriptor,
            self.config.audio_only,
            self.config.audio_quality,
        ) {
            Ok(source) => source,
            Err(e) => {
                self.fail(e);
                return Ok(());
            }
        };

        if let Err(e) = self.player.load(&source).await {
            return self.player_failure(e);
        }

        let video_id = descriptor.video_id.clone();
        let duration = descriptor.duration_millis;
        info!(video = %video_id, title = %descriptor.title, "stream ready");
        if let Some(item) = self.active.as_mut() {
            item.descriptor = Some(descriptor);
        }
        self.transition(PlaybackState::Ready).await?;

        if let Some(at) = resume_at.filter(|at| *at > 0 && *at < duration) {
            debug!(video = %video_id, at, "resuming from saved position");
            tolerate(self.player.seek(at).await, "seek")?;
            self.last_position = at;
        }
        if (self.config.playback_speed - 1.0).abs() > f32::EPSILON {
            tolerate(self.player.set_speed(self.config.playback_speed).await, "set_speed")?;
        }

        if !self.config.sponsor_categories.is_empty() {
            self.fetch_segments(&video_id);
        }

        if let Err(e) = self.player.play().await {
            return self.player_failure(e);
        }
        self.transition(PlaybackState::Playing).await?;
        self.queue.update_current(&video_id);
        self.resolver.mark_played(&video_id);
        self.events.emit(SessionEvent::QueueChanged);
        Ok(())
    }

    fn fetch_segments(&mut self, video_id: &VideoId) {
        let streams = Arc::clone(&self.streams);
        let tx = self.completions_tx.clone();
        let generation = self.generation;
        let categories = self.config.sponsor_categories.clone();
        let video_id = video_id.clone();

        self.fetches.push(tokio::spawn(async move {
            let result = streams.fetch_segments(&video_id, &categories).await;
            let _ = tx.send(Completion::Segments { generation, result });
        }));
    }

    fn on_segments_fetched(&mut self, result: Result<SegmentSet>) {
        if !(self.state.is_active() || self.state == PlaybackState::Ready) {
            return;
        }

        let monitor = match result {
            Ok(set) => SegmentSkipMonitor::new(set, &self.config.sponsor_categories),
            Err(e) => {
                warn!(error = %e, "segment fetch failed, skipping disabled for this video");
                None
            }
        };
        let Some(item) = self.active.as_mut() else {
            return;
        };
        if let Some(ref monitor) = monitor {
            debug!(video = %item.video_id, segments = monitor.segments().len(), "skip monitor armed");
        }
        let armed = monitor.is_some();
        item.monitor = monitor;
        if armed {
            self.start_skip_timer();
        }
    }

    async fn on_next_resolved(&mut self, next: Option<VideoId>) -> Result<()> {
        if self.state != PlaybackState::Ended {
            return Ok(());
        }
        match next {
            Some(video_id) => {
                info!(video = %video_id, "autoplay continuing");
                let request = LoadRequest {
                    video_id,
                    playlist_id: self.resolver.playlist_id(),
                    resume_at: None,
                };
                self.request_load(request).await
            }
            None => {
                info!("nothing left to play");
                self.finished = true;
                Ok(())
            }
        }
    }

    async fn on_player_event(&mut self, event: PlayerEvent) -> Result<()> {
        debug!(?event, state = %self.state, "player event");
        match event {
            PlayerEvent::Ready => Ok(()),
            PlayerEvent::Playing => self.transition(PlaybackState::Playing).await.map(|_| ()),
            PlayerEvent::Paused => self.transition(PlaybackState::Paused).await.map(|_| ()),
            PlayerEvent::Buffering => self.transition(PlaybackState::Buffering).await.map(|_| ()),
            PlayerEvent::Ended => self.on_ended().await,
            PlayerEvent::Failed(message) => {
                if self.state.is_active() || self.state == PlaybackState::Ready {
                    self.fail(TubeError::Network(message));
                }
                Ok(())
            }
        }
    }

    async fn on_ended(&mut self) -> Result<()> {
        if !self.state.is_active() {
            return Ok(());
        }

        if self.config.repeat_mode == RepeatMode::One {
            debug!("repeating current item");
            tolerate(self.player.seek(0).await, "seek")?;
            tolerate(self.player.play().await, "play")?;
            self.last_position = 0;
            self.rearm_monitor(0);
            self.transition(PlaybackState::Playing).await?;
            return Ok(());
        }

        self.transition(PlaybackState::Ended).await?;
        self.stop_monitor();

        if !self.config.autoplay {
            self.finished = true;
            return Ok(());
        }
        let Some(item) = self.active.as_ref() else {
            self.finished = true;
            return Ok(());
        };

        let finished_id = item.video_id.clone();
        let related = item
            .descriptor
            .as_ref()
            .map(|d| d.related.clone())
            .unwrap_or_default();
        let resolver = Arc::clone(&self.resolver);
        let queue = Arc::clone(&self.queue);
        let tx = self.completions_tx.clone();
        let generation = self.generation;

        self.fetches.push(tokio::spawn(async move {
            let next = resolver.resolve(&finished_id, &related, &queue).await;
            let _ = tx.send(Completion::Next { generation, next });
        }));
        Ok(())
    }

    async fn on_skip_tick(&mut self) -> Result<()> {
        if !self.state.is_active() {
            self.skip_timer = None;
            return Ok(());
        }

        let position = match self.player.position().await {
            Ok(position) => position,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!(error = %e, "position unavailable");
                return Ok(());
            }
        };
        self.last_position = position;

        let Some(item) = self.active.as_mut() else {
            self.skip_timer = None;
            return Ok(());
        };
        let Some(monitor) = item.monitor.as_mut() else {
            self.skip_timer = None;
            return Ok(());
        };

        match monitor.check(position) {
            SkipAction::Continue => Ok(()),
            SkipAction::Exhausted => {
                debug!(position, "no segments ahead, pausing skip monitor");
                self.skip_timer = None;
                Ok(())
            }
            SkipAction::Seek { to, segment } => {
                let video_id = item.video_id.clone();
                info!(
                    video = %video_id,
                    from = position,
                    to,
                    category = %segment.category,
                    "skipping segment"
                );
                tolerate(self.player.seek(to).await, "seek")?;
                self.last_position = to;
                if self.config.skip_notifications {
                    self.events
                        .emit(SessionEvent::SegmentSkipped { video_id, segment });
                }
                Ok(())
            }
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) -> Result<()> {
        match command {
            SessionCommand::Load(request) => {
                self.finished = false;
                self.request_load(request).await
            }
            SessionCommand::Play => self.resume().await,
            SessionCommand::Pause => self.pause().await,
            SessionCommand::TogglePause => self.toggle_pause().await,
            SessionCommand::SeekTo(position) => self.user_seek(position).await,
            SessionCommand::SeekBy(delta) => self.seek_by(delta).await,
            SessionCommand::Gesture(gesture) => self.on_gesture(gesture).await,
            SessionCommand::SetAutoplay(enabled) => {
                self.config.autoplay = enabled;
                Ok(())
            }
            SessionCommand::SetRepeat(mode) => {
                self.config.repeat_mode = mode;
                self.queue.set_repeat(mode == RepeatMode::Queue);
                Ok(())
            }
            SessionCommand::Stop => self.shutdown().await,
        }
    }

    /// Publish the gesture and apply the transport action it stands for
    async fn on_gesture(&mut self, gesture: GestureEvent) -> Result<()> {
        self.events.emit(SessionEvent::Gesture(gesture));
        let step = self.config.seek_increment.as_millis() as i64;
        match gesture {
            GestureEvent::DoubleTap(TapZone::Left) => self.seek_by(-step).await,
            GestureEvent::DoubleTap(TapZone::Right) => self.seek_by(step).await,
            GestureEvent::DoubleTap(TapZone::Center) => self.toggle_pause().await,
            _ => Ok(()),
        }
    }

    async fn pause(&mut self) -> Result<()> {
        if !matches!(self.state, PlaybackState::Playing | PlaybackState::Buffering) {
            return Ok(());
        }
        tolerate(self.player.pause().await, "pause")?;
        self.transition(PlaybackState::Paused).await.map(|_| ())
    }

    async fn resume(&mut self) -> Result<()> {
        if self.state != PlaybackState::Paused {
            return Ok(());
        }
        tolerate(self.player.play().await, "play")?;
        self.transition(PlaybackState::Playing).await.map(|_| ())
    }

    async fn toggle_pause(&mut self) -> Result<()> {
        match self.state {
            PlaybackState::Paused => self.resume().await,
            _ => self.pause().await,
        }
    }

    async fn seek_by(&mut self, delta_millis: i64) -> Result<()> {
        let current = self.current_position().await?;
        let target = (current as i64).saturating_add(delta_millis).max(0) as u64;
        self.user_seek(target).await
    }

    async fn user_seek(&mut self, position_millis: u64) -> Result<()> {
        if !(self.state.is_active() || self.state == PlaybackState::Ready) {
            return Ok(());
        }
        let target = match self.duration() {
            Some(duration) if duration > 0 => position_millis.min(duration),
            _ => position_millis,
        };
        tolerate(self.player.seek(target).await, "seek")?;
        self.last_position = target;
        self.rearm_monitor(target);
        Ok(())
    }

    /// Forget the current traversal and restart the timer if ranges lie ahead
    fn rearm_monitor(&mut self, position_millis: u64) {
        let ahead = match self.active.as_mut().and_then(|item| item.monitor.as_mut()) {
            Some(monitor) => {
                monitor.rearm();
                monitor.has_segments_after(position_millis)
            }
            None => false,
        };
        if ahead && self.skip_timer.is_none() {
            self.start_skip_timer();
        }
    }

    /// Tear everything down: fetches, monitor, queue, player, then persist the
    /// final position even when releasing the player failed.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        info!("stopping session");

        self.cancel_fetches();
        self.generation += 1;

        self.stop_monitor();

        self.queue.clear();
        self.events.emit(SessionEvent::QueueChanged);

        let had_position = self.state.is_active();
        let position = if had_position {
            self.player.position().await.unwrap_or(self.last_position)
        } else {
            self.last_position
        };

        let released = self.player.release().await;
        self.released = true;
        if let Err(ref e) = released {
            error!(error = %e, "failed to release player");
        }

        if had_position {
            if let Some(video_id) = self.current_video().cloned() {
                self.save_position(&video_id, position).await;
            }
        }

        self.active = None;
        self.finished = true;
        self.set_state(PlaybackState::Idle);
        released
    }

    /// Drive the session until it is stopped, runs out of things to play, or
    /// the player dies.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut player_events: mpsc::Receiver<PlayerEvent>,
    ) -> Result<()> {
        loop {
            let step = tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Stop) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                event = player_events.recv() => match event {
                    Some(event) => self.on_player_event(event).await,
                    None => Err(TubeError::Player("player event stream closed".into())),
                },
                Some(completion) = self.completions_rx.recv() => self.on_completion(completion).await,
                _ = next_tick(&mut self.skip_timer) => self.on_skip_tick().await,
            };

            if let Err(e) = step {
                error!(error = %e, "session failed");
                self.events.emit(SessionEvent::Failed(e.to_string()));
                if let Err(release_err) = self.shutdown().await {
                    warn!(error = %release_err, "teardown after failure was incomplete");
                }
                return Err(e);
            }
            if self.finished {
                break;
            }
        }
        self.shutdown().await
    }

    /// Run on a background task, returning the caller's handle
    pub fn spawn(
        self,
        player_events: mpsc::Receiver<PlayerEvent>,
    ) -> (SessionHandle, JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::channel(32);
        let handle = SessionHandle {
            commands: tx,
            queue: Arc::clone(&self.queue),
            events: self.events.clone(),
        };
        let task = tokio::spawn(self.run(rx, player_events));
        (handle, task)
    }

    // ============================================
    // Internals
    // ============================================

    fn set_state(&mut self, next: PlaybackState) {
        debug!(from = %self.state, to = %next, "state change");
        self.state = next.clone();
        self.events.emit(SessionEvent::StateChanged {
            video_id: self.current_video().cloned(),
            state: next,
        });
    }

    /// Apply a transition if the machine allows it. Leaving an active state
    /// for `Paused` or `Ended` persists the position first.
    async fn transition(&mut self, next: PlaybackState) -> Result<bool> {
        if self.state == next {
            return Ok(false);
        }
        if !self.state.can_transition_to(&next) {
            debug!(from = %self.state, to = %next, "ignoring transition");
            return Ok(false);
        }
        if self.state.is_active() && matches!(next, PlaybackState::Paused | PlaybackState::Ended) {
            self.persist_position().await?;
        }
        self.set_state(next);
        Ok(true)
    }

    fn fail(&mut self, err: TubeError) {
        let kind = err.kind();
        if kind == ErrorKind::Protocol {
            warn!(error = %err, "malformed response, handling as a network failure");
        }
        error!(video = ?self.current_video().map(VideoId::as_str), error = %err, "playback failed");

        self.cancel_fetches();
        self.stop_monitor();
        let next = PlaybackState::Error(PlaybackFailure {
            kind: kind.for_session(),
            message: err.to_string(),
        });
        if self.state.can_transition_to(&next) {
            self.set_state(next);
        }
    }

    /// Fatal player errors propagate; anything else fails the current item
    fn player_failure(&mut self, err: TubeError) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        self.fail(err);
        Ok(())
    }

    async fn current_position(&mut self) -> Result<u64> {
        match self.player.position().await {
            Ok(position) => {
                self.last_position = position;
                Ok(position)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(_) => Ok(self.last_position),
        }
    }

    async fn persist_position(&mut self) -> Result<()> {
        let Some(video_id) = self.current_video().cloned() else {
            return Ok(());
        };
        let position = self.current_position().await?;
        self.save_position(&video_id, position).await;
        Ok(())
    }

    async fn save_position(&self, video_id: &VideoId, position_millis: u64) {
        if !self.config.watch_positions {
            return;
        }
        debug!(video = %video_id, position_millis, "saving watch position");
        if let Err(e) = self.positions.save(video_id, position_millis).await {
            warn!(video = %video_id, error = %e, "failed to save watch position");
        }
    }

    fn duration(&self) -> Option<u64> {
        self.active
            .as_ref()
            .and_then(|item| item.descriptor.as_ref())
            .map(|d| d.duration_millis)
    }

    fn cancel_fetches(&mut self) {
        for handle in self.fetches.drain(..) {
            handle.abort();
        }
    }

    fn start_skip_timer(&mut self) {
        let mut timer = tokio::time::interval(POLL_INTERVAL);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.skip_timer = Some(timer);
    }

    fn stop_monitor(&mut self) {
        self.skip_timer = None;
        if let Some(item) = self.active.as_mut() {
            item.monitor = None;
        }
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Log non-fatal player errors and carry on
fn tolerate(result: Result<()>, call: &'static str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(call, error = %e, "player call failed");
            Ok(())
        }
    }
}

/// Cheap clonable front door to a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    queue: Arc<PlayingQueue>,
    events: EventBus,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TubeError::Player("session has stopped".into()))
    }

    pub async fn load(&self, request: LoadRequest) -> Result<()> {
        self.send(SessionCommand::Load(request)).await
    }

    pub async fn toggle_pause(&self) -> Result<()> {
        self.send(SessionCommand::TogglePause).await
    }

    pub async fn gesture(&self, gesture: GestureEvent) -> Result<()> {
        self.send(SessionCommand::Gesture(gesture)).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(SessionCommand::Stop).await
    }

    /// Classify raw touch input on a background task and forward every
    /// gesture to the session. Pointer events are re-stamped with the task's
    /// own clock so taps and the single-tap deadline share one time base.
    pub fn attach_gestures(
        &self,
        mut classifier: GestureClassifier,
        mut input: mpsc::Receiver<GestureInput>,
    ) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            let origin = Instant::now();
            let elapsed_ms = || origin.elapsed().as_millis() as u64;

            loop {
                let deadline = classifier
                    .next_deadline()
                    .map(|ms| origin + Duration::from_millis(ms));

                let gestures: Vec<GestureEvent> = tokio::select! {
                    raw = input.recv() => match raw {
                        None => break,
                        Some(GestureInput::Pointer(event)) => {
                            classifier.on_pointer(event.stamped(elapsed_ms()))
                        }
                        Some(GestureInput::Pinch(event)) => classifier.on_pinch(event).into_iter().collect(),
                        Some(GestureInput::Viewport { width, height }) => {
                            classifier.set_viewport(width, height);
                            Vec::new()
                        }
                        Some(GestureInput::Enabled(enabled)) => {
                            classifier.set_enabled(enabled);
                            Vec::new()
                        }
                    },
                    _ = wait_for_deadline(deadline) => classifier.poll(elapsed_ms()).into_iter().collect(),
                };

                for gesture in gestures {
                    if handle.gesture(gesture).await.is_err() {
                        debug!("session gone, detaching gesture input");
                        return;
                    }
                }
            }
        })
    }

    /// Queue a video after the current one. Applied directly; the queue is
    /// safe to mutate from here while the session reads it.
    pub fn enqueue(&self, video_id: VideoId) {
        self.queue.enqueue(video_id);
        self.events.emit(SessionEvent::QueueChanged);
    }

    pub fn queue(&self) -> &PlayingQueue {
        &self.queue
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
