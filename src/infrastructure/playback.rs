/// Cooperative playback over a shared replay session.
///
/// A driver thread takes the session lock for exactly one step per interval.
/// Each `play`/`pause` bumps a generation counter while holding that lock; a
/// driver checks the counter under the lock and exits as soon as it sees a
/// generation other than its own, so at most one driver ever steps.

use crate::domain::replay::{Direction, ReplaySession};
use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::debug;

pub type SharedSession = Arc<Mutex<ReplaySession>>;

pub fn lock_session(session: &SharedSession) -> Result<MutexGuard<'_, ReplaySession>> {
    session
        .lock()
        .map_err(|_| anyhow!("replay session lock poisoned"))
}

#[derive(Clone)]
pub struct PlaybackDriver {
    session: SharedSession,
    interval: Duration,
    generation: Arc<AtomicU64>,
}

impl PlaybackDriver {
    pub fn new(session: SharedSession, interval: Duration) -> Self {
        Self {
            session,
            interval,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Start playing in `direction`. Returns `true` when a new driver was
    /// scheduled, `false` when the request was a no-op.
    pub fn play(&self, direction: Direction) -> Result<bool> {
        let mut guard = lock_session(&self.session)?;
        if !guard.play(direction) {
            return Ok(false);
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        drop(guard);

        let session = Arc::clone(&self.session);
        let current = Arc::clone(&self.generation);
        let interval = self.interval;

        thread::Builder::new()
            .name(format!("callreplay-playback-{}", generation))
            .spawn(move || loop {
                thread::sleep(interval);
                let Ok(mut session) = session.lock() else {
                    break;
                };
                if current.load(Ordering::SeqCst) != generation || !session.tick() {
                    break;
                }
            })
            .map_err(|e| anyhow!("failed to start playback driver: {}", e))?;

        debug!(?direction, generation, "playback driver started");
        Ok(true)
    }

    /// Stop playback; a running driver exits at its next step boundary.
    pub fn pause(&self) -> Result<()> {
        let mut session = lock_session(&self.session)?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        session.pause();
        Ok(())
    }
}
