//! Speaker output through an external player process.
//!
//! [`CommandPlayer`] pipes synthesized audio into a configurable program
//! (`mpv -` by default) via `tokio::process`.  Only one clip plays at a time;
//! [`stop`](AudioOutput::stop) kills the current process so a barge-in
//! silences the assistant immediately.

use std::process::Stdio;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::device::{AudioOutput, DeviceError};
use crate::config::PlaybackConfig;

pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    /// Token of the clip currently playing; replaced on every `play`.
    current: Mutex<CancellationToken>,
}

impl CommandPlayer {
    pub fn from_config(config: &PlaybackConfig) -> Result<Self, DeviceError> {
        let (program, args) = config
            .command
            .split_first()
            .ok_or_else(|| DeviceError::NotFound("playback command is empty".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            current: Mutex::new(CancellationToken::new()),
        })
    }

    fn begin(&self) -> CancellationToken {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.cancel();
        *current = CancellationToken::new();
        current.clone()
    }
}

#[async_trait]
impl AudioOutput for CommandPlayer {
    async fn play(&self, audio: &[u8]) -> Result<(), DeviceError> {
        let token = self.begin();

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    DeviceError::NotFound(format!("player `{}` not found", self.program))
                }
                _ => DeviceError::from(e),
            })?;
        log::debug!("playback: started `{}` ({} bytes)", self.program, audio.len());

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DeviceError::Playback("player stdin unavailable".into()))?;

        let finished = {
            let run = async {
                // The player may exit before reading everything; that is its call.
                if let Err(e) = stdin.write_all(audio).await {
                    log::debug!("playback: stdin closed early: {e}");
                }
                drop(stdin);
                child.wait().await
            };
            tokio::select! {
                status = run => Some(status),
                _ = token.cancelled() => None,
            }
        };

        match finished {
            Some(Ok(status)) if status.success() => {
                log::debug!("playback: finished");
                Ok(())
            }
            Some(Ok(status)) => Err(DeviceError::Playback(format!(
                "player exited with {status}"
            ))),
            Some(Err(e)) => Err(DeviceError::from(e)),
            None => {
                if let Err(e) = child.kill().await {
                    log::warn!("playback: failed to kill player: {e}");
                }
                log::info!("playback: stopped");
                Ok(())
            }
        }
    }

    fn stop(&self) {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn player(command: &[&str]) -> CommandPlayer {
        CommandPlayer::from_config(&PlaybackConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
        })
        .expect("player")
    }

    #[test]
    fn empty_command_is_rejected() {
        let result = CommandPlayer::from_config(&PlaybackConfig { command: vec![] });
        assert!(matches!(result, Err(DeviceError::NotFound(_))));
    }

    #[tokio::test]
    async fn plays_to_completion() {
        let p = player(&["sh", "-c", "cat > /dev/null"]);
        p.play(b"RIFF....").await.expect("play");
    }

    #[tokio::test]
    async fn missing_program_is_not_found() {
        let p = player(&["voice-chat-no-such-player"]);
        let err = p.play(b"x").await.unwrap_err();
        assert!(matches!(err, DeviceError::NotFound(_)));
    }

    #[tokio::test]
    async fn failing_player_reports_error() {
        let p = player(&["sh", "-c", "cat > /dev/null; exit 3"]);
        assert!(matches!(p.play(b"x").await, Err(DeviceError::Playback(_))));
    }

    #[tokio::test]
    async fn stop_interrupts_playback() {
        let p = Arc::new(player(&["sleep", "10"]));
        let started = Instant::now();

        let task = {
            let p = Arc::clone(&p);
            tokio::spawn(async move { p.play(b"audio").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        p.stop();

        let result = task.await.expect("join");
        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
