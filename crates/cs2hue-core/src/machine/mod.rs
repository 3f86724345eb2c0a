// ── Round & bomb state machine ──
//
// Consumes game snapshots and time ticks, decides which scene should be
// active, and drives the scene controller and effects accordingly. Owned
// by the poll task: every mutation happens through `&mut self`, so the
// round state has exactly one writer.

pub mod bomb;
pub mod outcome;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{EffectConfig, MachineConfig};
use crate::effects::FadePlan;
use crate::model::{
    BombStage, BombState, ColorMode, ColorTemplate, GameSnapshot, Intent, Palette, Team, clamp_bri, keys,
};
use crate::presence::{ModeChange, PresenceHub};
use crate::queue::WriteOptions;
use crate::scene::SceneController;

pub use bomb::{BombProfile, Countdown};
pub use outcome::{Outcome, ResultWatchdog, fallback_winner};

const MISSING_PLAYER: &str = "missing-player";
const NO_TEAM: &str = "no-team";
const FADING: &str = "fading";

// ── RoundState ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BombPhase {
    #[default]
    Idle,
    Planted,
    Exploded,
    Defused,
}

/// The machine's own view of the round. Published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoundState {
    /// Scene most recently applied.
    pub mode: Option<ColorMode>,
    pub bomb: BombPhase,
    /// Seconds left on the bomb countdown while it runs.
    pub bomb_countdown: Option<u32>,
    pub exploded_handled: bool,
    pub defused_handled: bool,
    pub round_ended: bool,
    /// Team/default color logic is withheld until the next round.
    pub suppressed: bool,
    /// Last team the player was seen on.
    pub team: Option<Team>,
}

impl RoundState {
    /// Whether a bomb countdown is in progress.
    pub fn bomb_timer_active(&self) -> bool {
        self.bomb == BombPhase::Planted
    }
}

#[derive(Debug, Default)]
struct Timers {
    countdown: Option<Countdown>,
    bomb_reset_at: Option<Instant>,
    result_hold_until: Option<Instant>,
    watchdog: Option<ResultWatchdog>,
    suppression_deadline: Option<Instant>,
    startup_default_at: Option<Instant>,
}

// ── RoundMachine ─────────────────────────────────────────────────────

pub struct RoundMachine {
    scene: SceneController,
    palette: Arc<ArcSwap<Palette>>,
    config: MachineConfig,
    effects: EffectConfig,
    presence: PresenceHub,
    state: RoundState,
    timers: Timers,
    last: Option<GameSnapshot>,
    logged: HashSet<String>,
    status: watch::Sender<RoundState>,
}

impl RoundMachine {
    pub fn new(
        scene: SceneController,
        palette: Arc<ArcSwap<Palette>>,
        config: MachineConfig,
        effects: EffectConfig,
        presence: PresenceHub,
    ) -> Self {
        let (status, _) = watch::channel(RoundState::default());
        Self {
            scene,
            palette,
            config,
            effects,
            presence,
            state: RoundState::default(),
            timers: Timers::default(),
            last: None,
            logged: HashSet::new(),
            status,
        }
    }

    pub fn state(&self) -> &RoundState {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<RoundState> {
        self.status.subscribe()
    }

    pub fn scene(&self) -> &SceneController {
        &self.scene
    }

    /// Arm the startup default color.
    pub fn arm_startup_default(&mut self) {
        self.timers.startup_default_at = Some(Instant::now() + self.config.startup_default_delay);
    }

    /// Whether something must happen even if no new snapshot arrives.
    pub fn is_time_driven(&self) -> bool {
        let t = &self.timers;
        t.countdown.is_some()
            || t.bomb_reset_at.is_some()
            || t.result_hold_until.is_some()
            || t.watchdog.is_some()
            || t.suppression_deadline.is_some()
            || t.startup_default_at.is_some()
            || self.scene.effects().is_active()
    }

    /// Whether the poller should run at its transitional cadence.
    pub fn wants_fast_poll(&self) -> bool {
        self.is_time_driven() || self.state.bomb != BombPhase::Idle || self.state.round_ended
    }

    // ── Inputs ───────────────────────────────────────────────────────

    /// React to a freshly parsed snapshot.
    pub async fn on_snapshot(&mut self, snap: GameSnapshot) {
        self.last = Some(snap.clone());
        self.react(&snap).await;
        self.publish();
    }

    /// Advance time-driven state: bomb countdown, grace periods, watchdogs.
    pub async fn tick(&mut self) {
        let now = Instant::now();
        self.tick_bomb_reset(now).await;
        self.tick_countdown(now).await;
        self.tick_result(now).await;
        self.tick_suppression(now).await;
        self.tick_startup(now).await;
        self.publish();
    }

    fn publish(&self) {
        self.status.send_if_modified(|current| {
            if *current == self.state {
                false
            } else {
                *current = self.state.clone();
                true
            }
        });
    }

    // ── Snapshot rules ───────────────────────────────────────────────

    async fn react(&mut self, snap: &GameSnapshot) {
        if self.scene.effects().is_fading() {
            if self.log_once(FADING) {
                debug!("fading out; snapshot deferred");
            }
            return;
        }
        self.logged.remove(FADING);
        if let Some(team) = snap.player_team() {
            self.state.team = Some(team);
        }

        if snap.is_menu() {
            if self.state.mode != Some(ColorMode::Menu) {
                info!("player in menu");
                self.reset_bomb().await;
                self.presence.emit(ModeChange::Menu);
                self.apply_or_default(keys::MENU, ColorMode::Menu).await;
            }
            return;
        }

        if snap.is_warmup() {
            if self.state.mode != Some(ColorMode::Warmup) {
                info!("warmup phase");
                self.reset_bomb().await;
                self.presence.emit(ModeChange::Warmup);
                self.apply_or_default(keys::WARMUP, ColorMode::Warmup).await;
            }
            return;
        }

        self.react_to_bomb(snap).await;

        let bomb_settled = matches!(self.state.bomb, BombPhase::Exploded | BombPhase::Defused)
            && snap.bomb() == BombState::None;
        if !snap.is_round_over() && (self.state.round_ended || self.state.suppressed || bomb_settled)
        {
            self.resume(snap).await;
        }

        let result_pending = snap.is_round_over() && snap.win_team().is_some();
        if snap.bomb() == BombState::None
            && self.state.bomb == BombPhase::Idle
            && !self.state.suppressed
            && !(result_pending && !self.state.round_ended)
        {
            self.team_or_default(snap).await;
        }

        if result_pending && !self.state.round_ended {
            if self.result_held(Instant::now()) {
                debug!("holding bomb color before round result");
            } else if let Some(winner) = snap.win_team() {
                let player = snap.player_team().or(self.state.team);
                self.apply_result(winner, player).await;
            }
        }
    }

    async fn react_to_bomb(&mut self, snap: &GameSnapshot) {
        match snap.bomb() {
            BombState::None => {
                if self.state.bomb == BombPhase::Planted && self.timers.bomb_reset_at.is_none() {
                    debug!("bomb missing from feed; reset pending");
                    self.timers.bomb_reset_at = Some(Instant::now() + self.config.bomb_reset_grace);
                }
            }
            BombState::Planted => {
                self.timers.bomb_reset_at = None;
                if self.state.bomb == BombPhase::Idle {
                    self.bomb_planted().await;
                }
            }
            BombState::Exploded => {
                if !self.state.exploded_handled {
                    self.bomb_resolved(BombState::Exploded).await;
                }
            }
            BombState::Defused => {
                if !self.state.defused_handled {
                    self.bomb_resolved(BombState::Defused).await;
                }
            }
        }
    }

    // ── Bomb ─────────────────────────────────────────────────────────

    async fn bomb_planted(&mut self) {
        let now = Instant::now();
        let palette = self.palette.load_full();
        let default_blink_ms = duration_ms(self.effects.default_blink_period);
        let profile = BombProfile::from_template(palette.get(keys::BOMB), default_blink_ms);
        let initial_speed = profile.initial_speed;

        self.state.bomb = BombPhase::Planted;
        self.state.bomb_countdown = Some(profile.initial_time);
        self.timers.bomb_reset_at = None;
        self.timers.countdown = Some(Countdown::start(profile, now));
        info!("bomb planted");
        self.presence.emit(ModeChange::Planted);

        if let Some(template) = palette.enabled(keys::BOMB) {
            let mut template = template.clone();
            if template.bri.is_none() {
                warn!(
                    fallback = self.config.bomb_fallback_bri,
                    "no brightness set for bomb color; using fallback"
                );
                template.bri = Some(u16::from(self.config.bomb_fallback_bri));
            }
            self.apply_template(&template, keys::BOMB).await;
            self.state.mode = Some(ColorMode::Bomb);
        } else if self.log_once(format!("disabled:{}", keys::BOMB)) {
            info!("bomb color disabled or missing");
        }

        if initial_speed > 0 {
            self.scene
                .effects()
                .blink(Duration::from_millis(initial_speed), None)
                .await;
        }
    }

    async fn tick_countdown(&mut self, now: Instant) {
        loop {
            let Some(countdown) = self.timers.countdown.as_mut() else {
                break;
            };
            if self.state.bomb != BombPhase::Planted
                || self.state.round_ended
                || self.state.suppressed
            {
                debug!(remaining = countdown.remaining, "bomb timer stopped by state change");
                self.timers.countdown = None;
                self.state.bomb_countdown = None;
                break;
            }
            let Some(remaining) = countdown.advance(now) else {
                break;
            };
            let stage = countdown.profile.stage_at(remaining);
            self.state.bomb_countdown = Some(remaining);

            if let Some(stage) = stage {
                self.apply_stage(remaining, stage).await;
            }
            if remaining == 0 {
                debug!("bomb timer elapsed");
                self.timers.countdown = None;
                self.scene.effects().stop_blink().await;
                break;
            }
        }
    }

    async fn apply_stage(&mut self, remaining: u32, stage: BombStage) {
        if self.config.show_bomb_timer {
            info!("timer: {remaining}s");
        }
        debug!(remaining, ?stage, "bomb stage");
        let effects = self.scene.effects().clone();
        effects.stop_blink().await;

        if let Some(bri) = stage.bri {
            let bri = clamp_bri(i64::from(bri));
            let palette = self.palette.load_full();
            if let Some(template) = palette.enabled(keys::BOMB) {
                let template = ColorTemplate {
                    bri: Some(u16::from(bri)),
                    ..template.clone()
                };
                self.apply_template(&template, "bomb stage").await;
            } else {
                self.scene.begin_scene("bomb stage").await;
                drop(
                    self.scene
                        .send_to_all(&Intent::on_at(bri), WriteOptions::forced())
                        .await,
                );
            }
        }

        match stage.speed {
            Some(0) => {
                debug!(remaining, "blink speed 0; forcing lights on");
                drop(
                    self.scene
                        .send_to_all(&Intent::power(true), WriteOptions::forced())
                        .await,
                );
            }
            Some(ms) => effects.blink(Duration::from_millis(ms), None).await,
            None => warn!(remaining, "bomb stage has no blink speed"),
        }
    }

    async fn bomb_resolved(&mut self, bomb: BombState) {
        let now = Instant::now();
        let (phase, key, mode, event) = if bomb == BombState::Exploded {
            self.state.exploded_handled = true;
            info!("bomb exploded");
            (
                BombPhase::Exploded,
                keys::EXPLODED,
                ColorMode::Exploded,
                ModeChange::Exploded,
            )
        } else {
            self.state.defused_handled = true;
            info!("bomb defused");
            (
                BombPhase::Defused,
                keys::DEFUSED,
                ColorMode::Defused,
                ModeChange::Defused,
            )
        };

        self.stop_bomb_timers().await;
        self.state.bomb = phase;
        self.presence.emit(event);
        self.apply_key(key, mode).await;

        self.timers.result_hold_until = Some(now + self.config.result_hold);
        self.timers.watchdog = Some(ResultWatchdog {
            deadline: now + self.config.result_watchdog,
            fallback: if self.config.infer_winner_from_bomb {
                fallback_winner(bomb)
            } else {
                None
            },
        });
    }

    async fn tick_bomb_reset(&mut self, now: Instant) {
        let Some(at) = self.timers.bomb_reset_at else {
            return;
        };
        if now < at {
            return;
        }
        self.timers.bomb_reset_at = None;

        let still_missing = self
            .last
            .as_ref()
            .is_none_or(|s| s.bomb() == BombState::None);
        if still_missing && self.state.bomb == BombPhase::Planted {
            self.reset_bomb().await;
            if let Some(snap) = self.last.clone() {
                if !self.state.suppressed {
                    self.team_or_default(&snap).await;
                }
            }
        }
    }

    async fn reset_bomb(&mut self) {
        debug!("resetting bomb state");
        self.stop_bomb_timers().await;
        self.clear_bomb_state();
        self.state.mode = None;
    }

    async fn stop_bomb_timers(&mut self) {
        self.timers.countdown = None;
        self.timers.bomb_reset_at = None;
        self.timers.result_hold_until = None;
        self.timers.watchdog = None;
        self.state.bomb_countdown = None;
        self.scene.effects().stop_blink().await;
    }

    fn clear_bomb_state(&mut self) {
        self.state.bomb = BombPhase::Idle;
        self.state.exploded_handled = false;
        self.state.defused_handled = false;
        self.state.bomb_countdown = None;
    }

    // ── Round result ─────────────────────────────────────────────────

    fn result_held(&self, now: Instant) -> bool {
        self.timers.result_hold_until.is_some_and(|until| now < until)
    }

    async fn tick_result(&mut self, now: Instant) {
        if self.timers.result_hold_until.is_some() && !self.result_held(now) {
            self.timers.result_hold_until = None;
            let pending = self
                .last
                .as_ref()
                .filter(|s| s.is_round_over())
                .and_then(GameSnapshot::win_team);
            if let Some(winner) = pending {
                if !self.state.round_ended && !self.scene.effects().is_fading() {
                    let player = self
                        .last
                        .as_ref()
                        .and_then(GameSnapshot::player_team)
                        .or(self.state.team);
                    self.apply_result(winner, player).await;
                }
            }
        }

        let Some(watchdog) = self.timers.watchdog else {
            return;
        };
        if !watchdog.is_due(now) {
            return;
        }
        self.timers.watchdog = None;
        if self.state.round_ended {
            return;
        }

        let reported = self.last.as_ref().and_then(GameSnapshot::win_team);
        let player = self
            .last
            .as_ref()
            .and_then(GameSnapshot::player_team)
            .or(self.state.team);
        match reported.or(watchdog.fallback) {
            Some(winner) => {
                warn!(%winner, inferred = reported.is_none(), "no round result in time; forcing it");
                self.apply_result(winner, player).await;
            }
            None => {
                warn!("no round result reported; suppressing until next round");
                self.state.round_ended = true;
                self.set_suppressed(true);
                self.timers.suppression_deadline = Some(now + self.config.suppression_bound);
            }
        }
    }

    async fn apply_result(&mut self, winner: Team, player: Option<Team>) {
        let now = Instant::now();
        let outcome = Outcome::classify(player, winner);

        self.state.round_ended = true;
        self.set_suppressed(true);
        self.stop_bomb_timers().await;

        let (key, mode, event) = match outcome {
            Outcome::Won => (keys::WIN, ColorMode::Win, ModeChange::Won),
            Outcome::Lost => (keys::LOSE, ColorMode::Lose, ModeChange::Lost),
        };
        info!(%winner, ?outcome, "round over");
        self.presence.emit(event);

        let palette = self.palette.load_full();
        let Some(template) = palette.enabled(key) else {
            if self.log_once(format!("disabled:{key}")) {
                info!(key, "result color disabled or missing");
            }
            self.timers.suppression_deadline = Some(now + self.config.suppression_bound);
            return;
        };

        self.apply_template(template, key).await;
        self.state.mode = Some(mode);
        let plan = FadePlan {
            duration: self.effects.fade_duration,
            steps: self.effects.fade_steps,
            from_bri: template.bri.map(|b| clamp_bri(i64::from(b))),
            restore_on: true,
        };
        self.scene.effects().fade(plan).await;
        self.timers.suppression_deadline = Some(now + self.config.suppression_bound);
    }

    // ── Suppression / resume ─────────────────────────────────────────

    fn set_suppressed(&mut self, suppressed: bool) {
        self.state.suppressed = suppressed;
        self.scene.set_suppressed(suppressed);
    }

    async fn resume(&mut self, snap: &GameSnapshot) {
        info!("new round started; resuming color logic");
        self.state.round_ended = false;
        self.set_suppressed(false);
        self.timers.suppression_deadline = None;
        self.stop_bomb_timers().await;
        if snap.bomb() == BombState::None {
            self.clear_bomb_state();
        }
        self.state.mode = None;
        self.presence.emit(ModeChange::RoundStart);
        self.team_or_default(snap).await;
    }

    async fn tick_suppression(&mut self, now: Instant) {
        let Some(deadline) = self.timers.suppression_deadline else {
            return;
        };
        if now < deadline || self.scene.effects().is_fading() {
            return;
        }
        self.timers.suppression_deadline = None;
        if !self.state.suppressed {
            return;
        }

        info!("suppression window expired; resuming color logic");
        self.set_suppressed(false);
        self.state.mode = None;
        if let Some(snap) = self.last.clone() {
            self.team_or_default(&snap).await;
        }
    }

    async fn tick_startup(&mut self, now: Instant) {
        let Some(at) = self.timers.startup_default_at else {
            return;
        };
        if now < at {
            return;
        }
        self.timers.startup_default_at = None;
        if !self.scene.has_applied()
            && !self.scene.effects().is_active()
            && self.state.bomb == BombPhase::Idle
        {
            info!("no scene applied yet; setting default color");
            self.apply_key(keys::DEFAULT, ColorMode::Default).await;
        }
    }

    // ── Team / default ───────────────────────────────────────────────

    async fn team_or_default(&mut self, snap: &GameSnapshot) {
        let palette = self.palette.load_full();
        let team = snap.player_team();
        let team_color = team.and_then(|t| {
            t.color_key()
                .and_then(|k| palette.enabled(k))
                .map(|c| (t, c))
        });

        if let Some((team, color)) = team_color {
            self.logged.remove(MISSING_PLAYER);
            if self.state.mode != Some(ColorMode::Team(team)) {
                info!(%team, "switching to team color");
                self.apply_template(color, &team.to_string()).await;
                self.state.mode = Some(ColorMode::Team(team));
            }
            return;
        }

        match team {
            _ if snap.player.is_none() => {
                if self.log_once(MISSING_PLAYER) {
                    info!("player data missing (spectating or dead); using default color");
                }
            }
            None => {
                if self.log_once(NO_TEAM) {
                    warn!("player has no team assigned");
                }
            }
            Some(team) => {
                if self.log_once(format!("disabled:{team}")) {
                    warn!(%team, "no color enabled for team");
                }
            }
        }

        if self.state.mode != Some(ColorMode::Default) {
            info!("switching to default color");
            self.apply_key(keys::DEFAULT, ColorMode::Default).await;
            self.state.mode = Some(ColorMode::Default);
        }
    }

    // ── Scene helpers ────────────────────────────────────────────────

    /// Apply the enabled template `key`. Returns `false` if it is disabled or missing.
    async fn apply_key(&mut self, key: &str, mode: ColorMode) -> bool {
        let palette = self.palette.load_full();
        let Some(template) = palette.enabled(key) else {
            if self.log_once(format!("disabled:{key}")) {
                info!(key, "color disabled or missing");
            }
            return false;
        };
        self.apply_template(template, key).await;
        self.state.mode = Some(mode);
        true
    }

    /// Apply `key`, falling back to the default color when it is unavailable.
    async fn apply_or_default(&mut self, key: &str, mode: ColorMode) {
        if !self.apply_key(key, mode).await {
            self.apply_key(keys::DEFAULT, ColorMode::Default).await;
            self.state.mode = Some(mode);
        }
    }

    async fn apply_template(&self, template: &ColorTemplate, label: &str) {
        if let Err(e) = self.scene.apply_color_with_fallback(template, label).await {
            warn!(label, error = %e, "scene not applied");
        }
    }

    fn log_once(&mut self, class: impl Into<String>) -> bool {
        self.logged.insert(class.into())
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
