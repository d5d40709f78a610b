use std::fs;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::app::Message;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Slot {
    token: u64,
    child: Option<Child>,
}

/// Playback surface backed by an external player program.
///
/// Each clip is written to a scratch file and handed to the player. When the
/// player exits on its own, the surface reports [`Message::ClipFinished`] for
/// the clip it was showing. A clip replaced or stopped before it finishes
/// never reports.
#[derive(Debug)]
pub struct PlayerSurface {
    program: Option<Vec<String>>,
    notify: mpsc::Sender<Message>,
    slot: Arc<Mutex<Slot>>,
    scratch_dir: PathBuf,
}

impl PlayerSurface {
    /// `program` is split on whitespace; the clip path is appended as the
    /// last argument. Without a program, clip ends are reported by hand.
    pub fn new(program: Option<&str>, notify: mpsc::Sender<Message>) -> Self {
        Self {
            program: program.map(|text| text.split_whitespace().map(str::to_owned).collect()),
            notify,
            slot: Arc::default(),
            scratch_dir: std::env::temp_dir().join(format!("veo-studio-{}", std::process::id())),
        }
    }

    pub fn is_external(&self) -> bool {
        self.program.is_some()
    }

    /// Starts playing clip `index`, replacing whatever was playing. `cue`
    /// is echoed back in the finish report.
    pub fn play(&mut self, index: usize, cue: u64, entry_id: Uuid, bytes: &[u8]) -> Result<()> {
        self.stop();
        let Some(program) = &self.program else {
            return Ok(());
        };
        let Some((command, args)) = program.split_first() else {
            bail!("player command is empty");
        };

        fs::create_dir_all(&self.scratch_dir).with_context(|| {
            format!("failed to create scratch directory {}", self.scratch_dir.display())
        })?;
        let path = self.scratch_dir.join(format!("{entry_id}.mp4"));
        fs::write(&path, bytes)
            .with_context(|| format!("failed to write clip {}", path.display()))?;

        let child = Command::new(command)
            .args(args)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start player {command:?}"))?;
        debug!(index, pid = child.id(), "player started");

        let token = {
            let mut slot = lock(&self.slot);
            slot.token += 1;
            slot.child = Some(child);
            slot.token
        };
        self.watch(index, cue, token);
        Ok(())
    }

    /// Kills the running player, if any.
    pub fn stop(&mut self) {
        let mut slot = lock(&self.slot);
        slot.token += 1;
        if let Some(mut child) = slot.child.take() {
            if let Err(error) = child.kill() {
                debug!(%error, "player already exited");
            }
            let _ = child.wait();
        }
    }

    fn watch(&self, index: usize, cue: u64, token: u64) {
        let slot = Arc::clone(&self.slot);
        let notify = self.notify.clone();
        thread::spawn(move || {
            loop {
                thread::sleep(EXIT_POLL_INTERVAL);
                let mut slot = lock(&slot);
                if slot.token != token {
                    return;
                }
                let Some(child) = slot.child.as_mut() else {
                    return;
                };
                match child.try_wait() {
                    Ok(None) => continue,
                    Ok(Some(status)) => {
                        debug!(index, %status, "player exited");
                    }
                    Err(error) => {
                        warn!(index, %error, "lost track of player process");
                    }
                }
                slot.child = None;
                drop(slot);
                let _ = notify.send(Message::ClipFinished { index, cue });
                return;
            }
        });
    }
}

impl Drop for PlayerSurface {
    fn drop(&mut self) {
        self.stop();
        let _ = fs::remove_dir_all(&self.scratch_dir);
    }
}

fn lock(slot: &Mutex<Slot>) -> std::sync::MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
