// ── Health-check reconciler ──
//
// Periodic backstop against dropped writes and out-of-band changes: a
// light reported off that the orchestrator never asked to be off is
// forced back on.

use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ReconcilerConfig;
use crate::machine::RoundState;
use crate::model::{Intent, LightId};
use crate::queue::WriteOptions;
use crate::scene::SceneController;

#[derive(Clone)]
pub struct HealthReconciler {
    scene: SceneController,
    round: watch::Receiver<RoundState>,
    config: ReconcilerConfig,
}

impl HealthReconciler {
    pub fn new(
        scene: SceneController,
        round: watch::Receiver<RoundState>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            scene,
            round,
            config,
        }
    }

    /// No checks while an effect, the bomb timer, suppression, or a fresh scene is in play.
    pub fn should_run(&self, now: Instant) -> bool {
        self.config.enabled
            && !self.scene.effects().is_active()
            && !self.scene.is_suppressed()
            && !self.scene.is_quiet(now)
            && !self.round.borrow().bomb_timer_active()
    }

    /// Check every light once. Returns the lights that were forced back on.
    pub async fn reconcile(&self) -> Vec<LightId> {
        let checks = self.scene.lights().iter().map(|id| self.check(id));
        join_all(checks).await.into_iter().flatten().collect()
    }

    async fn check(&self, id: &LightId) -> Option<LightId> {
        let queues = self.scene.queues();
        let state = match queues.read_state(id).await {
            Ok(state) => state,
            Err(e) => {
                debug!(light = %id, error = %e, "health read failed");
                return None;
            }
        };
        if state.on {
            return None;
        }

        let now = Instant::now();
        if queues.last_intent(id).is_some_and(|i| i.requests_off()) {
            return None;
        }
        if queues.is_allowed_off(id, now) {
            return None;
        }
        if queues
            .last_write_at(id)
            .is_some_and(|at| now.duration_since(at) < self.config.write_race_guard)
        {
            return None;
        }

        info!(light = %id, "light is off unexpectedly; re-enabling");
        drop(queues.enqueue(
            id,
            Intent::on_at(self.config.restore_bri),
            WriteOptions::forced(),
        ));
        Some(id.clone())
    }
}

/// Run the reconciler every `period` until cancelled.
pub async fn reconciler_task(
    reconciler: HealthReconciler,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if reconciler.should_run(Instant::now()) {
                    let fixed = reconciler.reconcile().await;
                    if !fixed.is_empty() {
                        debug!(count = fixed.len(), "health check corrected lights");
                    }
                }
            }
        }
    }
}
