// ── Game-state poller ──
//
// Top-level driver loop. A cheap metadata check gates every full read;
// an unchanged snapshot with no time-driven work pending is a no-op.
// Read failures keep the previous snapshot, retry once, and warn at most
// once per cooldown window.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::PollerConfig;
use crate::error::CoreError;
use crate::machine::RoundMachine;
use crate::model::GameSnapshot;

// ── SnapshotSource ───────────────────────────────────────────────────

/// Cheap change indicator for the snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMarker {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

/// The JSON document rewritten by the game.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    path: PathBuf,
}

impl SnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn marker(&self) -> io::Result<SnapshotMarker> {
        let meta = tokio::fs::metadata(&self.path).await?;
        Ok(SnapshotMarker {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }

    /// Read and parse the whole document.
    pub async fn read(&self) -> Result<GameSnapshot, CoreError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        if raw.trim().is_empty() {
            return Err(CoreError::Snapshot {
                message: "snapshot file is empty".into(),
            });
        }
        GameSnapshot::from_json(&raw).map_err(|e| CoreError::Snapshot {
            message: e.to_string(),
        })
    }
}

// ── WarnGate ─────────────────────────────────────────────────────────

/// Rate limit for repeated warnings, keyed by warning class.
#[derive(Debug)]
pub struct WarnGate {
    cooldown: std::time::Duration,
    last: HashMap<&'static str, Instant>,
}

impl WarnGate {
    pub fn new(cooldown: std::time::Duration) -> Self {
        Self {
            cooldown,
            last: HashMap::new(),
        }
    }

    /// Whether a `class` warning may be emitted now. Records the emission if so.
    pub fn allow(&mut self, class: &'static str, now: Instant) -> bool {
        let open = self
            .last
            .get(class)
            .is_none_or(|at| now.duration_since(*at) >= self.cooldown);
        if open {
            self.last.insert(class, now);
        }
        open
    }
}

// ── Poller ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing changed and nothing was due.
    Idle,
    /// No new snapshot, but time-driven state advanced.
    Ticked,
    /// A new snapshot was parsed and handed to the machine.
    Applied,
    /// The snapshot could not be read; the previous one was kept.
    Failed,
}

pub struct Poller {
    source: SnapshotSource,
    machine: RoundMachine,
    config: PollerConfig,
    last_marker: Option<SnapshotMarker>,
    warnings: WarnGate,
    first_poll: bool,
}

impl Poller {
    pub fn new(source: SnapshotSource, machine: RoundMachine, config: PollerConfig) -> Self {
        let warnings = WarnGate::new(config.warn_cooldown);
        Self {
            source,
            machine,
            config,
            last_marker: None,
            warnings,
            first_poll: true,
        }
    }

    pub fn machine(&self) -> &RoundMachine {
        &self.machine
    }

    /// Delay until the next cycle: short while anything transitional is in play.
    pub fn cadence(&self) -> std::time::Duration {
        if self.machine.wants_fast_poll() {
            self.config.fast_interval
        } else {
            self.config.idle_interval
        }
    }

    /// Run one poll cycle.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let first_poll = std::mem::replace(&mut self.first_poll, false);

        let marker = match self.source.marker().await {
            Ok(marker) => Some(marker),
            Err(e) => {
                self.report_missing(&e, first_poll);
                None
            }
        };

        if marker.is_none() || marker == self.last_marker {
            return self.tick_if_due().await;
        }

        match self.read_with_retry().await {
            Ok(snap) => {
                self.last_marker = marker;
                self.machine.on_snapshot(snap).await;
                self.machine.tick().await;
                PollOutcome::Applied
            }
            Err(e) => {
                if self.warnings.allow("read", Instant::now()) {
                    warn!(path = %self.source.path().display(), error = %e, "could not read game state");
                }
                self.tick_if_due().await;
                PollOutcome::Failed
            }
        }
    }

    async fn tick_if_due(&mut self) -> PollOutcome {
        if self.machine.is_time_driven() {
            self.machine.tick().await;
            PollOutcome::Ticked
        } else {
            PollOutcome::Idle
        }
    }

    async fn read_with_retry(&self) -> Result<GameSnapshot, CoreError> {
        match self.source.read().await {
            Ok(snap) => Ok(snap),
            Err(e) => {
                trace!(error = %e, "snapshot read failed; retrying once");
                tokio::time::sleep(self.config.retry_delay).await;
                self.source.read().await
            }
        }
    }

    fn report_missing(&mut self, error: &io::Error, first_poll: bool) {
        let path = self.source.path().display();
        if error.kind() == io::ErrorKind::NotFound {
            if first_poll {
                info!(%path, "waiting for game state");
            } else if self.warnings.allow("missing", Instant::now()) {
                debug!(%path, "game state file not present");
            }
        } else if self.warnings.allow("metadata", Instant::now()) {
            warn!(%path, %error, "cannot stat game state file");
        }
    }
}

/// Drive `poller` until cancelled.
pub async fn poll_task(mut poller: Poller, cancel: CancellationToken) {
    debug!(path = %poller.source.path().display(), "poller started");
    loop {
        let cadence = poller.cadence();
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(cadence) => {
                poller.poll_once().await;
            }
        }
    }
    debug!("poller stopped");
}
