//! End-to-end monitor scenarios on a headless host

use std::time::Duration;

use pretty_assertions::assert_eq;
use sentinel_core::{CounterSnapshot, KeyStroke, QuestionId, Viewport};
use sentinel_runtime::{HostEvent, ModalError, MonitorConfig, MonitorEvent, SaveOutcome};
use sentinel_test_utils::{Harness, Reply};
use tokio::sync::broadcast::Receiver;

fn drain(rx: &mut Receiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn charged_reasons(events: &[MonitorEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            MonitorEvent::ViolationCharged(v) => Some(v.reason.label()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn tab_hidden_for_twelve_seconds() {
    let h = Harness::new();
    let mut rx = h.monitor.subscribe();

    h.hide();
    h.advance_secs(12);
    h.show();

    assert_eq!(h.monitor.snapshot(), CounterSnapshot::new(1, 12));
    let events = drain(&mut rx);
    assert_eq!(charged_reasons(&events), vec!["cambio de pestaña".to_string()]);
    assert!(events.contains(&MonitorEvent::AwayReconciled {
        added_secs: 12,
        seconds_away: 12
    }));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let saved = h.store.last().unwrap();
    assert_eq!(saved.violation_count, Some(1));
    assert_eq!(saved.seconds_away, Some(12));
    assert_eq!(saved.answer_text, "");
}

#[tokio::test(start_paused = true)]
async fn help_iframe_blur_is_not_charged() {
    let h = Harness::new();
    h.monitor.set_help_panel_open(true);
    assert!(h.monitor.mark_help_surface_interaction());

    h.blur();
    h.advance_secs(5);
    h.focus();

    assert_eq!(h.monitor.snapshot(), CounterSnapshot::default());
    assert!(!h.monitor.state().help_interaction_pending());
}

#[tokio::test(start_paused = true)]
async fn second_blur_with_help_open_is_away_time() {
    let h = Harness::new();
    h.monitor.set_help_panel_open(true);
    h.monitor.mark_help_surface_interaction();

    h.blur();
    h.focus();
    h.blur();
    h.advance_secs(4);
    h.focus();

    assert_eq!(h.monitor.snapshot(), CounterSnapshot::new(0, 4));
}

#[tokio::test(start_paused = true)]
async fn ctrl_shift_i_is_prevented_and_charged_once() {
    let h = Harness::new();
    let mut rx = h.monitor.subscribe();

    let dispatch = h.key(KeyStroke::new("I").ctrl().shift());

    assert!(dispatch.prevent_default);
    assert_eq!(h.monitor.snapshot().violation_count, 1);
    let reasons = charged_reasons(&drain(&mut rx));
    assert_eq!(reasons.len(), 1);
    assert!(reasons[0].contains('I'));
}

#[tokio::test(start_paused = true)]
async fn session_table_keys_are_charged() {
    let h = Harness::new();
    assert!(h.key(KeyStroke::new("Escape").ctrl()).prevent_default);
    assert!(h.key(KeyStroke::new("Meta")).prevent_default);
    assert!(!h.key(KeyStroke::new("x")).prevent_default);
    assert_eq!(h.monitor.snapshot().violation_count, 2);
}

#[tokio::test(start_paused = true)]
async fn failed_save_is_retried_by_next_cycle() {
    let h = Harness::new();
    h.store.fail_next(1);

    h.dispatch(&HostEvent::Copy);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.store.calls(), 1);
    assert!(!h.monitor.state().server_confirmed());

    h.dispatch(&HostEvent::Paste);
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.store.calls(), 2);
    assert_eq!(h.store.last().unwrap().violation_count, Some(2));
    assert!(h.monitor.state().server_confirmed());
}

#[tokio::test(start_paused = true)]
async fn rapid_events_collapse_into_one_write() {
    let h = Harness::new();
    for _ in 0..5 {
        h.dispatch(&HostEvent::Copy);
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(h.store.calls(), 1);
    assert_eq!(h.store.last().unwrap().violation_count, Some(5));
}

#[tokio::test(start_paused = true)]
async fn every_canonical_signal_counts_once() {
    let h = Harness::new();
    h.hide();
    h.show();
    h.blur();
    h.focus();
    h.dispatch(&HostEvent::Copy);
    h.dispatch(&HostEvent::Paste);
    h.dispatch(&HostEvent::DragStart);
    h.dispatch(&HostEvent::BeforePrint);
    h.dispatch(&HostEvent::Share);
    h.resize(Viewport::new(1280, 720, 1000, 700));

    assert_eq!(h.monitor.snapshot().violation_count, 8);
}

#[tokio::test(start_paused = true)]
async fn ordinary_resize_is_ignored() {
    let h = Harness::new();
    h.resize(Viewport::new(1000, 600, 1000, 680));
    assert_eq!(h.monitor.snapshot().violation_count, 0);
}

#[tokio::test(start_paused = true)]
async fn blur_then_hidden_keeps_one_away_window() {
    let h = Harness::new();
    h.blur();
    h.advance_secs(1);
    h.hide();
    h.advance_secs(9);
    h.show();
    h.focus();

    assert_eq!(h.monitor.snapshot(), CounterSnapshot::new(2, 10));
}

#[tokio::test(start_paused = true)]
async fn hidden_tab_force_closes_help_panel() {
    let h = Harness::new();
    let mut rx = h.monitor.subscribe();
    h.monitor.set_help_panel_open(true);

    h.hide();
    assert!(!h.monitor.state().help_panel_open());
    h.advance_secs(7);
    h.show();

    assert_eq!(h.monitor.snapshot(), CounterSnapshot::new(0, 7));
    assert!(drain(&mut rx).contains(&MonitorEvent::HelpPanelForcedClosed));
}

#[tokio::test(start_paused = true)]
async fn modal_cooldown_ignores_reflection_latency() {
    let h = Harness::new();
    h.generator.set_delay(Duration::from_secs(120));

    h.dispatch(&HostEvent::Copy);
    let view = h.monitor.modal().unwrap();
    assert_eq!(view.title, "Integridad Académica");
    assert_eq!(
        view.fraud_message,
        "Intento de fraude detectado: intento de copiar contenido"
    );
    assert_eq!(
        h.monitor.dismiss_modal(),
        Err(ModalError::CooldownActive { remaining_secs: 30 })
    );

    tokio::time::advance(Duration::from_secs(29)).await;
    assert_eq!(
        h.monitor.dismiss_modal(),
        Err(ModalError::CooldownActive { remaining_secs: 1 })
    );

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(h.monitor.modal().unwrap().title, "Integridad Académica");
    assert_eq!(h.monitor.dismiss_modal(), Ok(()));
    assert!(h.monitor.modal().is_none());
}

#[tokio::test(start_paused = true)]
async fn reflection_populates_modal_or_falls_back() {
    let h = Harness::new();
    let mut rx = h.monitor.subscribe();

    h.dispatch(&HostEvent::Copy);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.monitor.modal().unwrap().title, "Reflexión");
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, MonitorEvent::ReflectionReady(_))));

    h.generator.push(Reply::Text("sin formato".into()));
    h.dispatch(&HostEvent::Paste);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.monitor.modal().unwrap().title, "Reflexión sobre Integridad");

    h.generator.push(Reply::Fail("timeout".into()));
    h.dispatch(&HostEvent::DragStart);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.monitor.modal().unwrap().title, "Error de Conexión");

    let prompts = h.generator.prompts();
    assert_eq!(prompts.len(), 3);
    assert_eq!(prompts[2].count, 3);
    assert_eq!(prompts[2].severity.label(), "MEDIO");
}

#[tokio::test(start_paused = true)]
async fn answer_save_carries_current_counters() {
    let h = Harness::new();
    h.dispatch(&HostEvent::BeforePrint);

    let outcome = h
        .monitor
        .save_answer(QuestionId(1), "SELECT 1;", Some(10.0))
        .await;

    assert_eq!(outcome, SaveOutcome::Saved);
    let saved = h.store.last().unwrap();
    assert_eq!(saved.answer_text, "SELECT 1;");
    assert_eq!(saved.score, Some(10.0));
    assert_eq!(saved.violation_count, Some(1));
}

#[tokio::test(start_paused = true)]
async fn counter_write_keeps_saved_answer() {
    let h = Harness::new();
    h.monitor
        .save_answer(QuestionId(1), "mi respuesta", Some(7.0))
        .await;

    h.dispatch(&HostEvent::Copy);
    h.monitor.flush().await;

    assert_eq!(h.store.calls(), 2);
    let saved = h.store.last().unwrap();
    assert_eq!(saved.answer_text, "mi respuesta");
    assert_eq!(saved.score, Some(7.0));
    assert_eq!(saved.violation_count, Some(1));
}

#[tokio::test(start_paused = true)]
async fn disabled_reflections_use_canned_quotes() {
    let h = Harness::with_config(MonitorConfig::new().with_reflections(false));
    h.dispatch(&HostEvent::Copy);

    let view = h.monitor.modal().unwrap();
    assert_ne!(view.title, "Integridad Académica");
    assert!(h.generator.prompts().is_empty());
}
