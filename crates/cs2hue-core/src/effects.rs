// ── Effect engines ──
//
// Time-driven blink and fade generators. Each running effect is a task
// owned through a `TimerHandle`; stopping cancels its token and joins it.
// Starting an effect always stops the previous effect of the same kind.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::EffectConfig;
use crate::model::{Intent, LightId, MAX_BRI, clamp_bri};
use crate::queue::{DeviceQueues, WriteOptions};

// ── TimerHandle ──────────────────────────────────────────────────────

/// Start/cancel handle for one running effect task.
#[derive(Debug)]
pub struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(f(cancel.clone()));
        Self { cancel, task }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }

    /// Cancel the task and wait for it to wind down.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

// ── Fade plan ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadePlan {
    pub duration: Duration,
    pub steps: u32,
    /// Starting brightness. `None` reads it from each light.
    pub from_bri: Option<u8>,
    /// Turn the lights back on once the fade completes.
    pub restore_on: bool,
}

/// Brightness of fade step `k` (1-based) out of `steps`, or `None` for the final off step.
pub fn fade_step_bri(initial: u8, k: u32, steps: u32) -> Option<u8> {
    if k >= steps {
        return None;
    }
    let remaining = f64::from(steps - k) / f64::from(steps);
    #[allow(clippy::cast_possible_truncation)]
    let bri = (f64::from(initial) * remaining).round() as i64;
    Some(clamp_bri(bri))
}

// ── EffectEngine ─────────────────────────────────────────────────────

#[derive(Clone)]
pub struct EffectEngine {
    inner: Arc<EffectsInner>,
}

struct EffectsInner {
    queues: DeviceQueues,
    lights: Arc<[LightId]>,
    config: EffectConfig,
    blink: Mutex<Option<TimerHandle>>,
    fade: Mutex<Option<TimerHandle>>,
}

impl EffectEngine {
    pub fn new(queues: DeviceQueues, lights: Arc<[LightId]>, config: EffectConfig) -> Self {
        Self {
            inner: Arc::new(EffectsInner {
                queues,
                lights,
                config,
                blink: Mutex::new(None),
                fade: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &EffectConfig {
        &self.inner.config
    }

    pub fn is_blinking(&self) -> bool {
        lock(&self.inner.blink)
            .as_ref()
            .is_some_and(TimerHandle::is_active)
    }

    pub fn is_fading(&self) -> bool {
        lock(&self.inner.fade)
            .as_ref()
            .is_some_and(TimerHandle::is_active)
    }

    pub fn is_active(&self) -> bool {
        self.is_blinking() || self.is_fading()
    }

    // ── Blink ────────────────────────────────────────────────────────

    /// Toggle every light every `period`, forever or for `repetitions` on-edges.
    pub async fn blink(&self, period: Duration, repetitions: Option<u32>) {
        self.stop_blink().await;

        let period = period.max(self.inner.config.blink_min_period);
        debug!(period_ms = period.as_millis(), ?repetitions, "starting blink");

        let queues = self.inner.queues.clone();
        let lights = Arc::clone(&self.inner.lights);
        let handle =
            TimerHandle::spawn(|cancel| blink_task(queues, lights, period, repetitions, cancel));
        *lock(&self.inner.blink) = Some(handle);
    }

    pub async fn stop_blink(&self) {
        let handle = lock(&self.inner.blink).take();
        if let Some(handle) = handle {
            trace!("stopping blink");
            handle.stop().await;
        }
    }

    // ── Fade ─────────────────────────────────────────────────────────

    /// Fade every light to off per `plan`.
    ///
    /// Each light is marked allowed-off until the fade ends plus the
    /// configured grace, so the reconciler leaves it alone.
    pub async fn fade(&self, plan: FadePlan) {
        self.stop_fade().await;

        let allowed_until = Instant::now() + plan.duration + self.inner.config.allowed_off_grace;
        for id in self.inner.lights.iter() {
            self.inner.queues.mark_allowed_off(id, allowed_until);
        }
        debug!(
            duration_ms = plan.duration.as_millis(),
            steps = plan.steps,
            "starting fade"
        );

        let queues = self.inner.queues.clone();
        let lights = Arc::clone(&self.inner.lights);
        let handle = TimerHandle::spawn(|cancel| fade_task(queues, lights, plan, cancel));
        *lock(&self.inner.fade) = Some(handle);
    }

    pub async fn stop_fade(&self) {
        let handle = lock(&self.inner.fade).take();
        if let Some(handle) = handle {
            trace!("stopping fade");
            handle.stop().await;
        }
    }

    pub async fn stop_all(&self) {
        self.stop_blink().await;
        self.stop_fade().await;
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Effect tasks ─────────────────────────────────────────────────────

async fn blink_task(
    queues: DeviceQueues,
    lights: Arc<[LightId]>,
    period: Duration,
    repetitions: Option<u32>,
    cancel: CancellationToken,
) {
    let stagger = queues.config().stagger;
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    // Lights are lit when a blink starts, so the first toggle turns them off.
    let mut on = true;
    let mut on_edges = 0u32;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                on = !on;
                for (i, id) in lights.iter().enumerate() {
                    if i > 0 {
                        tokio::time::sleep(stagger).await;
                    }
                    drop(queues.enqueue(id, Intent::power(on), WriteOptions::default()));
                }
                if on {
                    on_edges += 1;
                    if repetitions.is_some_and(|max| on_edges >= max) {
                        break;
                    }
                }
            }
        }
    }
}

async fn fade_task(
    queues: DeviceQueues,
    lights: Arc<[LightId]>,
    plan: FadePlan,
    cancel: CancellationToken,
) {
    let fades = lights
        .iter()
        .map(|id| fade_light(&queues, id, plan, &cancel));
    join_all(fades).await;

    if plan.restore_on && !cancel.is_cancelled() {
        for id in lights.iter() {
            drop(queues.enqueue(id, Intent::power(true), WriteOptions::forced()));
        }
    }
}

async fn fade_light(queues: &DeviceQueues, id: &LightId, plan: FadePlan, cancel: &CancellationToken) {
    let initial = match plan.from_bri {
        Some(bri) => bri,
        None => match queues.read_state(id).await {
            Ok(state) => state.bri.unwrap_or(MAX_BRI),
            Err(e) => {
                trace!(light = %id, error = %e, "fade read failed; assuming full brightness");
                MAX_BRI
            }
        },
    };

    let steps = plan.steps.max(1);
    let step_len = plan.duration / steps;
    let start = Instant::now();
    for k in 1..=steps {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep_until(start + step_len * k) => {}
        }
        let intent = match fade_step_bri(initial, k, steps) {
            Some(bri) => Intent {
                bri: Some(bri),
                ..Intent::default()
            },
            None => Intent::off(),
        };
        drop(queues.enqueue(id, intent, WriteOptions::default()));
    }
}
