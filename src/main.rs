//! tube-autoplay - background YouTube playback in your terminal
//!
//! Plays a video through mpv, skips sponsor segments and keeps going with the
//! next video from the queue, the playlist or the related list.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use tube_autoplay::core::events::SessionEvent;
use tube_autoplay::core::piped::PipedClient;
use tube_autoplay::core::player::build_video_url;
use tube_autoplay::core::queue::PlayingQueue;
use tube_autoplay::core::session::{
    Collaborators, LoadRequest, PlaybackSession, SessionCommand, SessionConfig, SessionHandle,
};
use tube_autoplay::storage::{cache, config};
use tube_autoplay::storage::positions::JsonPositionStore;
use tube_autoplay::types::{Config, GestureEvent, PlaybackState, RepeatMode, TapZone, VideoId};
use tube_autoplay::utils::logging::init_logging;
use tube_autoplay::utils::paths::{
    ensure_app_dirs, get_cache_dir, get_mpv_socket_path, get_positions_path,
};
use tube_autoplay::utils::video_id::{parse_playlist_id, parse_video_id};

/// Background YouTube playback with autoplay and segment skipping.
#[derive(Parser, Debug)]
#[command(name = "tube-autoplay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Video id or watch URL
    #[arg(required_unless_present_any = ["edit", "clear_cache"])]
    target: Option<String>,

    /// Continue through this playlist after the first video
    #[arg(short, long)]
    playlist: Option<String>,

    /// Start offset in seconds (overrides the saved position)
    #[arg(short, long)]
    start: Option<u64>,

    /// Stop when the video ends
    #[arg(long)]
    no_autoplay: bool,

    /// Include video (audio-only by default)
    #[arg(long)]
    video: bool,

    /// Segment category to skip; repeat for several
    #[arg(short, long = "category")]
    categories: Vec<String>,

    /// Playback speed
    #[arg(long)]
    speed: Option<f32>,

    /// Piped API instance
    #[arg(long)]
    instance: Option<String>,

    /// Edit the configuration file
    #[arg(short, long)]
    edit: bool,

    /// Delete cached segment lists and exit
    #[arg(long)]
    clear_cache: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Command line flags win over the config file
    fn apply(&self, cfg: &mut Config) {
        if self.no_autoplay {
            cfg.autoplay = false;
        }
        if self.video {
            cfg.audio_only = false;
        }
        if !self.categories.is_empty() {
            cfg.sponsor_categories = self.categories.clone();
        }
        if let Some(speed) = self.speed {
            cfg.playback_speed = speed;
        }
        if let Some(ref instance) = self.instance {
            cfg.instance = instance.clone();
        }
    }
}

/// A line typed while playing
#[derive(Debug, PartialEq)]
enum Input {
    Send(SessionCommand),
    Enqueue(VideoId),
    Help,
}

fn parse_input(line: &str, seek_secs: u64) -> Option<Input> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    let input = match word {
        "p" | "" => Input::Send(SessionCommand::TogglePause),
        "h" => Input::Send(SessionCommand::Gesture(GestureEvent::DoubleTap(TapZone::Left))),
        "l" => Input::Send(SessionCommand::Gesture(GestureEvent::DoubleTap(TapZone::Right))),
        "x" | "quit" => Input::Send(SessionCommand::Stop),
        "q" => Input::Enqueue(parse_video_id(rest).ok()?),
        "o" => {
            let mut request = LoadRequest::new(parse_video_id(rest).ok()?);
            if let Some(playlist) = parse_playlist_id(rest) {
                request = request.with_playlist(playlist);
            }
            Input::Send(SessionCommand::Load(request))
        }
        "r" => Input::Send(SessionCommand::SetRepeat(match rest {
            "one" => RepeatMode::One,
            "queue" => RepeatMode::Queue,
            "off" => RepeatMode::Off,
            _ => return None,
        })),
        "a" => Input::Send(SessionCommand::SetAutoplay(match rest {
            "on" => true,
            "off" => false,
            _ => return None,
        })),
        "?" | "help" => Input::Help,
        w if w.starts_with('+') || w.starts_with('-') => {
            let secs: i64 = if w.len() == 1 {
                seek_secs as i64
            } else {
                w[1..].parse().ok()?
            };
            let sign = if w.starts_with('-') { -1 } else { 1 };
            Input::Send(SessionCommand::SeekBy(sign * secs * 1000))
        }
        _ => return None,
    };
    Some(input)
}

fn print_help() {
    println!(
        "{}",
        "p pause/resume · +N/-N seek · h/l double-tap left/right · o <id> open · q <id> enqueue · r off|one|queue · a on|off · x quit"
            .dimmed()
    );
}

async fn read_commands(handle: SessionHandle, seek_secs: u64) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line, seek_secs) {
            Some(Input::Send(command)) => handle.send(command).await?,
            Some(Input::Enqueue(video_id)) => {
                println!("{} {}", "Queued:".green(), video_id);
                handle.enqueue(video_id);
            }
            Some(Input::Help) => print_help(),
            None => eprintln!("{} {}", "Unknown command:".yellow(), line.trim()),
        }
    }
    Ok(())
}

fn loading_spinner(video_id: Option<&VideoId>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    let label = video_id.map(VideoId::to_string).unwrap_or_default();
    spinner.set_message(format!("Loading {}", label));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    let mut spinner: Option<ProgressBar> = None;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                debug!(missed, "event printer fell behind");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match event {
            SessionEvent::StateChanged {
                video_id,
                state: PlaybackState::Loading,
            } => {
                if let Some(old) = spinner.replace(loading_spinner(video_id.as_ref())) {
                    old.finish_and_clear();
                }
            }
            SessionEvent::StateChanged { video_id, state } => {
                if let Some(s) = spinner.take() {
                    s.finish_and_clear();
                }
                let id = video_id.map(|v| v.to_string()).unwrap_or_default();
                match state {
                    PlaybackState::Playing => {
                        println!("{} {}", "Playing:".green(), build_video_url(&id).dimmed())
                    }
                    PlaybackState::Paused => println!("{}", "Paused".yellow()),
                    PlaybackState::Ended => println!("{} {}", "Finished:".dimmed(), id),
                    PlaybackState::Error(failure) => {
                        eprintln!("{} {}", "Error:".red(), failure.message)
                    }
                    _ => {}
                }
            }
            SessionEvent::SegmentSkipped { segment, .. } => println!(
                "{} {} ({:.1}s)",
                "Skipped".cyan(),
                segment.category,
                (segment.end_millis - segment.start_millis) as f64 / 1000.0
            ),
            SessionEvent::Failed(message) => eprintln!("{} {}", "Fatal:".red().bold(), message),
            SessionEvent::QueueChanged | SessionEvent::Gesture(_) => {}
        }
    }
}

#[cfg(unix)]
async fn play(cli: Cli, cfg: Config) -> anyhow::Result<()> {
    use tube_autoplay::core::player::MpvPlayer;

    let target = cli.target.as_deref().context("a video id or URL is required")?;
    let video_id = parse_video_id(target)?;
    let playlist = cli.playlist.clone().or_else(|| parse_playlist_id(target));

    let piped = Arc::new(PipedClient::new(&cfg.instance)?.with_cache_dir(get_cache_dir()));
    let positions = Arc::new(JsonPositionStore::new(get_positions_path()));

    let (player_tx, player_rx) = mpsc::channel(64);
    let player = MpvPlayer::spawn(&get_mpv_socket_path(), cfg.audio_only, player_tx).await?;

    let collaborators = Collaborators {
        streams: piped.clone(),
        playlists: Some(piped),
        positions,
    };
    let mut session = PlaybackSession::new(
        Box::new(player),
        collaborators,
        Arc::new(PlayingQueue::new()),
        SessionConfig::from(&cfg),
    );
    let printer = tokio::spawn(print_events(session.subscribe()));

    let mut request = LoadRequest::new(video_id);
    if let Some(playlist) = playlist {
        request = request.with_playlist(playlist);
    }
    if let Some(start) = cli.start {
        request = request.resume_at(start * 1000);
    }
    session.start(request).await?;

    let (handle, task) = session.spawn(player_rx);
    let input = tokio::spawn(read_commands(handle, cfg.seek_increment_secs));

    let result = task.await?;
    input.abort();
    // let the printer flush the final events
    let _ = tokio::time::timeout(Duration::from_millis(200), printer).await;
    result?;
    Ok(())
}

#[cfg(not(unix))]
async fn play(_cli: Cli, _cfg: Config) -> anyhow::Result<()> {
    bail!("mpv IPC playback is only supported on unix platforms")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(if cli.verbose { "debug" } else { "info" }, cli.log_json);

    // Ensure app directories exist
    ensure_app_dirs().await?;

    if cli.clear_cache {
        cache::clear_cache(&get_cache_dir()).await?;
        println!("{}", "Cache cleared".green());
        return Ok(());
    }

    // Handle --edit flag
    if cli.edit {
        let cfg = config::load_config().await?;
        config::edit_config(&cfg.editor).await?;
        return Ok(());
    }

    let mut cfg = config::load_config().await?;
    cli.apply(&mut cfg);
    if cfg.playback_speed <= 0.0 {
        bail!("speed must be positive");
    }

    play(cli, cfg).await
}
