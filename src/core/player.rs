//! Player module - the media player abstraction and its mpv backend
//!
//! The session talks to a [`MediaPlayer`]; the player reports native state
//! changes back as [`PlayerEvent`]s on a channel so they reach the session in
//! the order the player produced them.

use crate::error::{Result, TubeError};
use crate::types::MediaSource;
use async_trait::async_trait;

/// State changes reported by the underlying player
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Ready,
    Playing,
    Paused,
    Buffering,
    Ended,
    /// The current stream failed; the player itself is still usable
    Failed(String),
}

/// Control surface of the underlying player.
///
/// `TubeError::Player` from any method means the player resource is gone.
#[async_trait]
pub trait MediaPlayer: Send + Sync {
    async fn load(&mut self, source: &MediaSource) -> Result<()>;
    async fn play(&mut self) -> Result<()>;
    async fn pause(&mut self) -> Result<()>;
    async fn seek(&mut self, position_millis: u64) -> Result<()>;
    async fn position(&mut self) -> Result<u64>;
    async fn set_speed(&mut self, speed: f32) -> Result<()>;
    async fn release(&mut self) -> Result<()>;
}

/// Build YouTube URL from video ID
pub fn build_video_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

#[cfg(unix)]
pub use mpv::MpvPlayer;

#[cfg(unix)]
mod mpv {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::process::Stdio;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::UnixStream;
    use tokio::process::{Child, Command};
    use tokio::sync::{mpsc, oneshot};
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout};
    use tracing::{debug, warn};

    const CONNECT_ATTEMPTS: u32 = 50;
    const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

    type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

    /// mpv child process driven over its JSON IPC socket
    pub struct MpvPlayer {
        child: Child,
        socket_path: PathBuf,
        writer: OwnedWriteHalf,
        pending: Pending,
        next_request: u64,
        reader: JoinHandle<()>,
        /// Source waiting for `play`, with the offset to start at
        staged: Option<(MediaSource, u64)>,
    }

    impl MpvPlayer {
        /// Start mpv idle and connect to its IPC socket
        pub async fn spawn(
            socket_path: &Path,
            audio_only: bool,
            events: mpsc::Sender<PlayerEvent>,
        ) -> Result<Self> {
            if !is_command_available("mpv").await {
                return Err(TubeError::MissingDependency("mpv".into()));
            }

            let _ = tokio::fs::remove_file(socket_path).await;
            let ipc_arg = format!("--input-ipc-server={}", socket_path.display());
            let mut args = vec!["--idle=yes", "--no-terminal", "--really-quiet", ipc_arg.as_str()];
            if audio_only {
                args.push("--no-video");
            }

            let child = Command::new("mpv")
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| TubeError::Spawn(format!("Failed to start mpv: {}", e)))?;

            let stream = connect(socket_path).await?;
            let (read_half, writer) = stream.into_split();
            let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
            let reader = tokio::spawn(read_loop(read_half, Arc::clone(&pending), events));

            let mut player = Self {
                child,
                socket_path: socket_path.to_path_buf(),
                writer,
                pending,
                next_request: 1,
                reader,
                staged: None,
            };
            player.command(json!(["observe_property", 1, "pause"])).await?;
            player.command(json!(["observe_property", 2, "paused-for-cache"])).await?;
            Ok(player)
        }

        async fn command(&mut self, command: Value) -> Result<Value> {
            let request_id = self.next_request;
            self.next_request += 1;
            let (tx, rx) = oneshot::channel();
            self.pending.lock().insert(request_id, tx);

            let mut line = serde_json::to_string(&json!({
                "command": command,
                "request_id": request_id,
            }))?;
            line.push('\n');
            if let Err(e) = self.writer.write_all(line.as_bytes()).await {
                self.pending.lock().remove(&request_id);
                return Err(TubeError::Player(format!("mpv socket write failed: {}", e)));
            }

            let reply = match timeout(REPLY_TIMEOUT, rx).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(_)) => return Err(TubeError::Player("mpv connection closed".into())),
                Err(_) => {
                    self.pending.lock().remove(&request_id);
                    return Err(TubeError::Player("mpv stopped responding".into()));
                }
            };

            match reply.get("error").and_then(Value::as_str) {
                Some("success") => Ok(reply.get("data").cloned().unwrap_or(Value::Null)),
                Some(err) => Err(TubeError::Protocol(format!("mpv: {}", err))),
                None => Err(TubeError::Protocol("mpv reply without status".into())),
            }
        }

        async fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
            self.command(json!(["set_property", name, value])).await.map(|_| ())
        }

        async fn start_staged(&mut self) -> Result<bool> {
            let Some((source, start_millis)) = self.staged.take() else {
                return Ok(false);
            };
            let mut options = serde_json::Map::new();
            options.insert("start".into(), json!(format!("{:.3}", start_millis as f64 / 1000.0)));
            options.insert("pause".into(), json!("no"));
            if let MediaSource::Merged { audio, .. } = &source {
                options.insert("audio-file".into(), json!(audio));
            }

            self.command(json!({
                "name": "loadfile",
                "url": source.primary_url(),
                "flags": "replace",
                "options": options,
            }))
            .await?;
            Ok(true)
        }
    }

    #[async_trait]
    impl MediaPlayer for MpvPlayer {
        async fn load(&mut self, source: &MediaSource) -> Result<()> {
            debug!(url = source.primary_url(), "staging source for mpv");
            self.staged = Some((source.clone(), 0));
            Ok(())
        }

        async fn play(&mut self) -> Result<()> {
            if self.start_staged().await? {
                return Ok(());
            }
            self.set_property("pause", json!(false)).await
        }

        async fn pause(&mut self) -> Result<()> {
            self.set_property("pause", json!(true)).await
        }

        async fn seek(&mut self, position_millis: u64) -> Result<()> {
            if let Some((_, start)) = self.staged.as_mut() {
                *start = position_millis;
                return Ok(());
            }
            let secs = position_millis as f64 / 1000.0;
            self.command(json!(["seek", secs, "absolute"])).await.map(|_| ())
        }

        async fn position(&mut self) -> Result<u64> {
            if let Some(start) = self.staged.as_ref().map(|(_, start)| *start) {
                return Ok(start);
            }
            match self.command(json!(["get_property", "time-pos"])).await {
                Ok(value) => Ok(value.as_f64().map(|s| (s * 1000.0) as u64).unwrap_or(0)),
                // no file loaded
                Err(TubeError::Protocol(_)) => Ok(0),
                Err(e) => Err(e),
            }
        }

        async fn set_speed(&mut self, speed: f32) -> Result<()> {
            self.set_property("speed", json!(speed)).await
        }

        async fn release(&mut self) -> Result<()> {
            let quit = self.command(json!(["quit"])).await;
            self.reader.abort();

            let exited = timeout(Duration::from_secs(2), self.child.wait()).await;
            if !matches!(exited, Ok(Ok(_))) {
                warn!("mpv did not quit, killing it");
                self.child
                    .kill()
                    .await
                    .map_err(|e| TubeError::Player(format!("Failed to stop mpv: {}", e)))?;
            }
            let _ = tokio::fs::remove_file(&self.socket_path).await;

            match quit {
                // the socket may close before mpv answers
                Err(TubeError::Player(_)) | Ok(_) => Ok(()),
                Err(e) => Err(e),
            }
        }
    }

    async fn connect(socket_path: &Path) -> Result<UnixStream> {
        for _ in 0..CONNECT_ATTEMPTS {
            match UnixStream::connect(socket_path).await {
                Ok(stream) => return Ok(stream),
                Err(_) => sleep(Duration::from_millis(100)).await,
            }
        }
        Err(TubeError::Player(format!(
            "mpv IPC socket never appeared at {}",
            socket_path.display()
        )))
    }

    async fn read_loop(read_half: OwnedReadHalf, pending: Pending, events: mpsc::Sender<PlayerEvent>) {
        let mut lines = BufReader::new(read_half).lines();
        let mut paused = false;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "mpv socket read failed");
                    break;
                }
            };
            let Ok(message) = serde_json::from_str::<Value>(&line) else {
                debug!(%line, "ignoring unparsable mpv message");
                continue;
            };

            if let Some(id) = message.get("request_id").and_then(Value::as_u64) {
                if let Some(tx) = pending.lock().remove(&id) {
                    let _ = tx.send(message);
                }
                continue;
            }

            if let Some(event) = translate_event(&message, &mut paused) {
                if events.send(event).await.is_err() {
                    return;
                }
            }
        }

        // dropping the senders fails every waiting command
        pending.lock().clear();
    }

    /// Map one mpv event message to a player event
    pub(super) fn translate_event(message: &Value, paused: &mut bool) -> Option<PlayerEvent> {
        match message.get("event")?.as_str()? {
            "file-loaded" => Some(PlayerEvent::Ready),
            "end-file" => match message.get("reason").and_then(Value::as_str) {
                Some("eof") => Some(PlayerEvent::Ended),
                Some("error") => Some(PlayerEvent::Failed(
                    message
                        .get("file_error")
                        .and_then(Value::as_str)
                        .unwrap_or("playback error")
                        .to_string(),
                )),
                _ => None,
            },
            "property-change" => {
                let data = message.get("data")?.as_bool()?;
                match message.get("name")?.as_str()? {
                    "pause" => {
                        *paused = data;
                        Some(if data { PlayerEvent::Paused } else { PlayerEvent::Playing })
                    }
                    "paused-for-cache" if data => Some(PlayerEvent::Buffering),
                    "paused-for-cache" if !*paused => Some(PlayerEvent::Playing),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Check if a command is available in PATH
    async fn is_command_available(cmd: &str) -> bool {
        Command::new("which")
            .arg(cmd)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::mpv::translate_event;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_video_url() {
        assert_eq!(build_video_url("abc"), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn test_translate_end_file() {
        let mut paused = false;
        let eof = json!({"event": "end-file", "reason": "eof"});
        assert_eq!(translate_event(&eof, &mut paused), Some(PlayerEvent::Ended));

        let stopped = json!({"event": "end-file", "reason": "stop"});
        assert_eq!(translate_event(&stopped, &mut paused), None);

        let failed = json!({"event": "end-file", "reason": "error", "file_error": "loading failed"});
        assert_eq!(
            translate_event(&failed, &mut paused),
            Some(PlayerEvent::Failed("loading failed".into()))
        );
    }

    #[test]
    fn test_translate_pause_and_cache() {
        let mut paused = false;
        let pause = json!({"event": "property-change", "name": "pause", "data": true});
        assert_eq!(translate_event(&pause, &mut paused), Some(PlayerEvent::Paused));
        assert!(paused);

        // cache recovery while paused does not resume
        let cached = json!({"event": "property-change", "name": "paused-for-cache", "data": false});
        assert_eq!(translate_event(&cached, &mut paused), None);

        let starving = json!({"event": "property-change", "name": "paused-for-cache", "data": true});
        assert_eq!(translate_event(&starving, &mut paused), Some(PlayerEvent::Buffering));
    }
}
