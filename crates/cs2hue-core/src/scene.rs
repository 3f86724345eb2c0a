// ── Scene controller ──
//
// Turns a color template into writes for every managed light. A scene
// begins by advancing the epoch, which voids everything queued for the
// previous scene. Consequential scenes are then confirmed in the
// background: read back after a short delay, resend to mismatched
// lights, then one final targeted sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::SceneConfig;
use crate::effects::EffectEngine;
use crate::error::CoreError;
use crate::model::{ColorTemplate, Intent, LightId};
use crate::queue::{DeviceQueues, WriteOptions, WriteTicket};

#[derive(Clone)]
pub struct SceneController {
    inner: Arc<SceneInner>,
}

struct SceneInner {
    queues: DeviceQueues,
    effects: EffectEngine,
    lights: Arc<[LightId]>,
    config: SceneConfig,
    /// Mirrors the round machine's suppression window.
    suppressed: AtomicBool,
    /// Reconciler stays quiet until this instant.
    quiet_until: Mutex<Option<Instant>>,
    /// Set once any scene has been applied since start.
    applied: AtomicBool,
}

impl SceneController {
    pub fn new(
        queues: DeviceQueues,
        effects: EffectEngine,
        lights: Arc<[LightId]>,
        config: SceneConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SceneInner {
                queues,
                effects,
                lights,
                config,
                suppressed: AtomicBool::new(false),
                quiet_until: Mutex::new(None),
                applied: AtomicBool::new(false),
            }),
        }
    }

    pub fn lights(&self) -> &Arc<[LightId]> {
        &self.inner.lights
    }

    pub fn queues(&self) -> &DeviceQueues {
        &self.inner.queues
    }

    pub fn effects(&self) -> &EffectEngine {
        &self.inner.effects
    }

    pub fn epoch(&self) -> u64 {
        self.inner.queues.epoch().current()
    }

    // ── Flags read by other components ───────────────────────────────

    pub fn set_suppressed(&self, suppressed: bool) {
        self.inner.suppressed.store(suppressed, Ordering::SeqCst);
    }

    pub fn is_suppressed(&self) -> bool {
        self.inner.suppressed.load(Ordering::SeqCst)
    }

    /// Whether the reconciler should hold off after a recent scene change.
    pub fn is_quiet(&self, now: Instant) -> bool {
        self.inner
            .quiet_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|until| now < until)
    }

    pub fn has_applied(&self) -> bool {
        self.inner.applied.load(Ordering::SeqCst)
    }

    // ── Scene lifecycle ──────────────────────────────────────────────

    /// Start a new scene: stop effects, void queued work, forget dedup and
    /// throttle state, and quiet the reconciler. Returns the new epoch.
    pub async fn begin_scene(&self, label: &str) -> u64 {
        self.inner.effects.stop_all().await;
        let epoch = self.inner.queues.epoch().advance();
        self.inner.queues.clear_caches();
        *self
            .inner
            .quiet_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner) =
            Some(Instant::now() + self.inner.config.health_quiet);
        debug!(label, epoch, "scene begins");
        epoch
    }

    /// Queue `intent` for every light, staggered. Returns one ticket per light.
    pub async fn send_to_all(&self, intent: &Intent, opts: WriteOptions) -> Vec<WriteTicket> {
        let stagger = self.inner.queues.config().stagger;
        let mut tickets = Vec::with_capacity(self.inner.lights.len());
        for (i, id) in self.inner.lights.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(stagger).await;
            }
            tickets.push(self.inner.queues.enqueue(id, intent.clone(), opts));
        }
        tickets
    }

    /// Begin a scene for `template` and apply it with escalating reliability.
    ///
    /// Writes are forced and verified immediately; a background task then
    /// asserts the result and performs a final sweep. The confirmation
    /// gives up as soon as a newer scene, a fade, a blink or a fresh
    /// suppression window takes over. Returns the scene epoch.
    pub async fn apply_color_with_fallback(
        &self,
        template: &ColorTemplate,
        label: &str,
    ) -> Result<u64, CoreError> {
        if !template.enabled {
            return Err(CoreError::ColorUnavailable {
                key: label.to_owned(),
            });
        }
        let intent = Intent::from_template(template, self.inner.queues.gateway().wants_ct_hint());

        let epoch = self.begin_scene(label).await;
        self.inner.applied.store(true, Ordering::SeqCst);
        info!(label, epoch, "applying color");

        let retries = self.inner.queues.config().verify_retries;
        let tickets = self
            .send_to_all(&intent, WriteOptions::verified(retries))
            .await;

        let scene = self.clone();
        let label = label.to_owned();
        let suppressed_at_start = self.is_suppressed();
        tokio::spawn(async move {
            scene
                .confirm(intent, &label, epoch, suppressed_at_start, tickets)
                .await;
        });
        Ok(epoch)
    }

    // ── Confirmation ─────────────────────────────────────────────────

    fn superseded(&self, epoch: u64, suppressed_at_start: bool) -> bool {
        !self.inner.queues.epoch().is_current(epoch)
            || self.inner.effects.is_fading()
            || self.inner.effects.is_blinking()
            || (!suppressed_at_start && self.is_suppressed())
    }

    async fn confirm(
        &self,
        intent: Intent,
        label: &str,
        epoch: u64,
        suppressed_at_start: bool,
        tickets: Vec<WriteTicket>,
    ) {
        let outcomes = join_all(tickets.into_iter().map(WriteTicket::outcome)).await;
        trace!(label, epoch, ?outcomes, "initial writes settled");

        let start = Instant::now();
        let steps = [
            ("assert", start + self.inner.config.assert_delay),
            ("final sweep", start + self.inner.config.final_sweep_delay),
        ];
        for (step, at) in steps {
            tokio::time::sleep_until(at).await;
            if self.superseded(epoch, suppressed_at_start) {
                debug!(label, epoch, step, "scene superseded; confirmation stopped");
                return;
            }

            let mismatched = self.mismatched(&intent).await;
            if mismatched.is_empty() {
                trace!(label, epoch, step, "all lights match");
                return;
            }
            if self.superseded(epoch, suppressed_at_start) {
                return;
            }
            warn!(label, step, lights = ?mismatched, "resending to mismatched lights");
            for id in &mismatched {
                drop(
                    self.inner
                        .queues
                        .enqueue(id, intent.clone(), WriteOptions::forced()),
                );
            }
        }
    }

    /// Lights whose read-back does not match `intent`. Unreadable lights count as mismatched.
    async fn mismatched(&self, intent: &Intent) -> Vec<LightId> {
        let tolerance = self.inner.config.tolerance;
        let reads = self.inner.lights.iter().map(|id| async move {
            match self.inner.queues.read_state(id).await {
                Ok(state) if intent.matches(&state, &tolerance) => None,
                Ok(_) => Some(id.clone()),
                Err(e) => {
                    debug!(light = %id, error = %e, "read-back failed");
                    Some(id.clone())
                }
            }
        });
        join_all(reads).await.into_iter().flatten().collect()
    }
}
