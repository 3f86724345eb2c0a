#![allow(clippy::unwrap_used)]
// Round machine scenarios: scene selection, bomb lifecycle, round results.

mod common;

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::{FakeGateway, machine, scene, settle, snapshot};
use cs2hue_core::model::keys;
use cs2hue_core::{BombPhase, ColorMode, Intent, Palette, RoundMachine, Team};

fn template_intent(key: &str) -> Intent {
    Intent::from_template(Palette::builtin().get(key).unwrap(), false)
}

fn live(team: &str) -> serde_json::Value {
    json!({
        "player": { "team": team, "activity": "playing" },
        "map": { "phase": "live", "mode": "competitive" },
        "round": { "phase": "live" }
    })
}

fn with_bomb(team: &str, bomb: &str) -> serde_json::Value {
    json!({
        "player": { "team": team, "activity": "playing" },
        "map": { "phase": "live" },
        "round": { "phase": "live", "bomb": bomb }
    })
}

/// Tick the machine at poll cadence for `total`.
async fn run_ticks(machine: &mut RoundMachine, total: Duration) {
    let step = Duration::from_millis(200);
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        tokio::time::sleep(step).await;
        machine.tick().await;
        elapsed += step;
    }
}

#[tokio::test(start_paused = true)]
async fn test_team_color_applied_for_player_team() {
    let gw = FakeGateway::with_lights(&["1", "2"]);
    let scene = scene(&gw, &["1", "2"]);
    let mut m = machine(&scene, Palette::builtin());

    m.on_snapshot(snapshot(live("CT"))).await;
    settle(Duration::from_secs(2)).await;

    assert_eq!(m.state().mode, Some(ColorMode::Team(Team::CounterTerrorists)));
    assert_eq!(gw.writes_for("1").last(), Some(&template_intent("CT")));
    assert_eq!(gw.writes_for("2").last(), Some(&template_intent("CT")));
}

#[tokio::test(start_paused = true)]
async fn test_menu_overrides_team_color() {
    let gw = FakeGateway::with_lights(&["1"]);
    let scene = scene(&gw, &["1"]);
    let mut m = machine(&scene, Palette::builtin());

    m.on_snapshot(snapshot(live("T"))).await;
    settle(Duration::from_secs(2)).await;
    m.on_snapshot(snapshot(json!({ "player": { "activity": "menu" } })))
        .await;
    settle(Duration::from_secs(2)).await;

    assert_eq!(m.state().mode, Some(ColorMode::Menu));
    assert_eq!(gw.writes_for("1").last(), Some(&template_intent(keys::MENU)));
}

#[tokio::test(start_paused = true)]
async fn test_missing_player_uses_default_color() {
    let gw = FakeGateway::with_lights(&["1"]);
    let scene = scene(&gw, &["1"]);
    let mut m = machine(&scene, Palette::builtin());

    m.on_snapshot(snapshot(json!({ "map": { "phase": "live" }, "round": { "phase": "live" } })))
        .await;
    settle(Duration::from_secs(2)).await;

    assert_eq!(m.state().mode, Some(ColorMode::Default));
    assert_eq!(
        gw.writes_for("1").last(),
        Some(&template_intent(keys::DEFAULT))
    );
}

#[tokio::test(start_paused = true)]
async fn test_disabled_team_color_falls_back_to_default() {
    let gw = FakeGateway::with_lights(&["1"]);
    let scene = scene(&gw, &["1"]);
    let mut palette = Palette::builtin();
    let mut ct = palette.get("CT").unwrap().clone();
    ct.enabled = false;
    palette.insert("CT", ct);
    let mut m = machine(&scene, palette);

    m.on_snapshot(snapshot(live("CT"))).await;
    settle(Duration::from_secs(2)).await;

    assert_eq!(m.state().mode, Some(ColorMode::Default));
}

#[tokio::test(start_paused = true)]
async fn test_planted_starts_countdown_and_blink() {
    let gw = FakeGateway::with_lights(&["1"]);
    let scene = scene(&gw, &["1"]);
    let mut m = machine(&scene, Palette::builtin());

    m.on_snapshot(snapshot(live("CT"))).await;
    m.on_snapshot(snapshot(with_bomb("CT", "planted"))).await;

    assert_eq!(m.state().bomb, BombPhase::Planted);
    assert_eq!(m.state().bomb_countdown, Some(40));
    assert!(scene.effects().is_blinking());

    run_ticks(&mut m, Duration::from_secs(11)).await;
    assert!(m.state().bomb_countdown.unwrap() <= 30);
    assert!(m.wants_fast_poll());
}

#[tokio::test(start_paused = true)]
async fn test_exploded_without_winner_reaches_result_color() {
    let gw = FakeGateway::with_lights(&["1", "2"]);
    let scene = scene(&gw, &["1", "2"]);
    let mut m = machine(&scene, Palette::builtin());

    m.on_snapshot(snapshot(live("CT"))).await;
    m.on_snapshot(snapshot(with_bomb("CT", "planted"))).await;
    run_ticks(&mut m, Duration::from_secs(3)).await;

    m.on_snapshot(snapshot(with_bomb("CT", "exploded"))).await;
    assert_eq!(m.state().bomb, BombPhase::Exploded);
    assert!(!scene.effects().is_blinking());
    gw.clear_writes();

    run_ticks(&mut m, Duration::from_secs(6)).await;

    // CT player, bomb exploded: attackers win.
    assert_eq!(m.state().mode, Some(ColorMode::Lose));
    assert!(m.state().round_ended);
    assert!(gw.writes_for("1").contains(&template_intent(keys::LOSE)));
    assert!(gw.writes_for("2").contains(&template_intent(keys::LOSE)));
}

#[tokio::test(start_paused = true)]
async fn test_defused_then_reported_winner_after_hold() {
    let gw = FakeGateway::with_lights(&["1"]);
    let scene = scene(&gw, &["1"]);
    let mut m = machine(&scene, Palette::builtin());

    m.on_snapshot(snapshot(live("CT"))).await;
    m.on_snapshot(snapshot(with_bomb("CT", "planted"))).await;
    m.on_snapshot(snapshot(with_bomb("CT", "defused"))).await;
    assert_eq!(m.state().mode, Some(ColorMode::Defused));

    m.on_snapshot(snapshot(json!({
        "player": { "team": "CT", "activity": "playing" },
        "map": { "phase": "live" },
        "round": { "phase": "over", "bomb": "defused", "win_team": "CT" }
    })))
    .await;
    // Held so the defused color stays visible.
    assert_eq!(m.state().mode, Some(ColorMode::Defused));

    run_ticks(&mut m, Duration::from_millis(2400)).await;
    assert_eq!(m.state().mode, Some(ColorMode::Win));
    assert!(m.state().suppressed);
}

#[tokio::test(start_paused = true)]
async fn test_new_round_resumes_after_result() {
    let gw = FakeGateway::with_lights(&["1"]);
    let scene = scene(&gw, &["1"]);
    let mut m = machine(&scene, Palette::builtin());

    m.on_snapshot(snapshot(live("T"))).await;
    m.on_snapshot(snapshot(json!({
        "player": { "team": "T", "activity": "playing" },
        "map": { "phase": "live" },
        "round": { "phase": "over", "win_team": "T" }
    })))
    .await;
    assert_eq!(m.state().mode, Some(ColorMode::Win));
    assert!(scene.effects().is_fading());

    // Fade plus restore.
    run_ticks(&mut m, Duration::from_secs(6)).await;
    assert!(!scene.effects().is_fading());

    m.on_snapshot(snapshot(live("T"))).await;
    assert!(!m.state().suppressed);
    assert!(!m.state().round_ended);
    assert_eq!(m.state().mode, Some(ColorMode::Team(Team::Terrorists)));
}

#[tokio::test(start_paused = true)]
async fn test_suppression_is_bounded_without_new_round() {
    let gw = FakeGateway::with_lights(&["1"]);
    let scene = scene(&gw, &["1"]);
    let mut m = machine(&scene, Palette::builtin());

    m.on_snapshot(snapshot(json!({
        "player": { "team": "CT", "activity": "playing" },
        "map": { "phase": "live" },
        "round": { "phase": "over", "win_team": "T" }
    })))
    .await;
    assert!(m.state().suppressed);

    run_ticks(&mut m, Duration::from_millis(4800)).await;
    assert!(m.state().suppressed);

    // Released once the bound passes and the fade has finished, not later.
    run_ticks(&mut m, Duration::from_millis(600)).await;
    assert!(!m.state().suppressed);
    assert!(!scene.is_suppressed());
    assert!(!scene.effects().is_fading());
}

#[tokio::test(start_paused = true)]
async fn test_startup_default_applies_when_idle() {
    let gw = FakeGateway::with_lights(&["1"]);
    let scene = scene(&gw, &["1"]);
    let mut m = machine(&scene, Palette::builtin());
    m.arm_startup_default();

    run_ticks(&mut m, Duration::from_millis(1200)).await;
    settle(Duration::from_secs(1)).await;

    assert_eq!(m.state().mode, Some(ColorMode::Default));
    assert_eq!(
        gw.writes_for("1").last(),
        Some(&template_intent(keys::DEFAULT))
    );
}

#[tokio::test(start_paused = true)]
async fn test_status_channel_tracks_round_state() {
    let gw = FakeGateway::with_lights(&["1"]);
    let scene = scene(&gw, &["1"]);
    let mut m = machine(&scene, Palette::builtin());
    let status = m.subscribe();

    m.on_snapshot(snapshot(with_bomb("T", "planted"))).await;

    assert_eq!(status.borrow().bomb, BombPhase::Planted);
    assert_eq!(status.borrow().team, Some(Team::Terrorists));
}
