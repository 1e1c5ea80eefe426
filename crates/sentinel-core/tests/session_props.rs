use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use sentinel_core::prelude::*;
use sentinel_core::DevToolsHeuristic as Latch;

fn t(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
}

fn feed(state: &mut SessionIntegrityState, signal: &Signal, at: DateTime<Utc>) {
    let classification = ViolationClassifier::new().classify(signal, &state.suppression());
    state.apply(&classification.verdict, at);
}

fn charging_signal() -> impl Strategy<Value = Signal> {
    prop_oneof![
        Just(Signal::VisibilityHidden),
        Just(Signal::Blur),
        Just(Signal::KeyDown(KeyStroke::new("Tab").alt())),
        Just(Signal::KeyDown(KeyStroke::new("Meta"))),
        Just(Signal::KeyDown(KeyStroke::new("Escape").ctrl())),
        Just(Signal::KeyDown(KeyStroke::new("n").ctrl())),
        Just(Signal::Resize(Viewport::new(1200, 800, 900, 900))),
        Just(Signal::Copy),
        Just(Signal::Paste),
        Just(Signal::DragStart),
        Just(Signal::BeforePrint),
        Just(Signal::ShareAttempt),
    ]
}

fn any_signal() -> impl Strategy<Value = Signal> {
    prop_oneof![
        charging_signal(),
        Just(Signal::Focus),
        Just(Signal::VisibilityVisible),
        Just(Signal::KeyDown(KeyStroke::new("a"))),
        Just(Signal::Resize(Viewport::new(1200, 800, 1200, 900))),
    ]
}

#[test]
fn tab_hidden_for_twelve_seconds() {
    let mut state = SessionIntegrityState::new();
    feed(&mut state, &Signal::VisibilityHidden, t(0));
    feed(&mut state, &Signal::VisibilityVisible, t(12));

    assert_eq!(state.violation_count(), 1);
    assert_eq!(state.seconds_away(), 12);
    assert_eq!(
        ViolationClassifier::reason_for(&Signal::VisibilityHidden)
            .unwrap()
            .label(),
        "cambio de pestaña"
    );
}

#[test]
fn help_iframe_round_trip_changes_nothing() {
    let mut state = SessionIntegrityState::new();
    state.set_help_panel_open(true);
    state.mark_help_surface_interaction();

    feed(&mut state, &Signal::Blur, t(0));
    feed(&mut state, &Signal::Focus, t(30));

    assert_eq!(state.violation_count(), 0);
    assert_eq!(state.seconds_away(), 0);
    assert!(!state.help_interaction_pending());
}

#[test]
fn real_tab_switch_with_help_open_counts_time_only() {
    let mut state = SessionIntegrityState::new();
    state.set_help_panel_open(true);

    feed(&mut state, &Signal::VisibilityHidden, t(0));
    feed(&mut state, &Signal::VisibilityVisible, t(7));

    assert_eq!(state.violation_count(), 0);
    assert_eq!(state.seconds_away(), 7);
}

#[test]
fn blur_then_hidden_keeps_single_window() {
    let mut state = SessionIntegrityState::new();
    feed(&mut state, &Signal::Blur, t(0));
    feed(&mut state, &Signal::VisibilityHidden, t(2));
    feed(&mut state, &Signal::VisibilityVisible, t(10));
    feed(&mut state, &Signal::Focus, t(11));

    assert_eq!(state.violation_count(), 2);
    assert_eq!(state.seconds_away(), 10);
}

proptest! {
    #[test]
    fn prop_seconds_away_sums_paired_windows(
        windows in prop::collection::vec((0i64..600, -5i64..600), 0..20)
    ) {
        let mut state = SessionIntegrityState::new();
        let mut cursor = 0i64;
        let mut expected = 0u64;
        let mut last = 0u64;

        for (gap, length) in windows {
            cursor += gap;
            state.open_away(t(cursor));
            let back = cursor + length;
            state.close_away(t(back));
            expected += u64::try_from(length.max(0)).unwrap();
            cursor = back.max(cursor);

            prop_assert!(state.seconds_away() >= last);
            last = state.seconds_away();
        }

        prop_assert_eq!(state.seconds_away(), expected);
    }

    #[test]
    fn prop_help_panel_never_charges(signals in prop::collection::vec(
        prop_oneof![
            Just(Signal::Copy),
            Just(Signal::Paste),
            Just(Signal::DragStart),
            Just(Signal::BeforePrint),
            Just(Signal::ShareAttempt),
            Just(Signal::Focus),
            Just(Signal::KeyDown(KeyStroke::new("Meta"))),
            Just(Signal::Resize(Viewport::new(1200, 800, 900, 900))),
        ],
        0..40,
    )) {
        let mut state = SessionIntegrityState::new();
        state.set_help_panel_open(true);
        for (i, signal) in signals.iter().enumerate() {
            feed(&mut state, signal, t(i as i64));
        }
        prop_assert_eq!(state.violation_count(), 0);
    }

    #[test]
    fn prop_each_charging_signal_counts_once(signals in prop::collection::vec(any_signal(), 0..60)) {
        let mut state = SessionIntegrityState::new();
        let mut expected = 0u32;
        for (i, signal) in signals.iter().enumerate() {
            let before = state.violation_count();
            feed(&mut state, signal, t(i as i64));
            let charged = ViolationClassifier::reason_for(signal).is_some();
            let step = state.violation_count() - before;
            prop_assert_eq!(step, u32::from(charged));
            expected += u32::from(charged);
        }
        prop_assert_eq!(state.violation_count(), expected);
    }

    #[test]
    fn prop_counters_monotonic(
        signals in prop::collection::vec(any_signal(), 0..60),
        help in prop::collection::vec(any::<bool>(), 0..60),
        steps in prop::collection::vec(-3i64..30, 0..60),
    ) {
        let mut state = SessionIntegrityState::new();
        let mut now = 0i64;
        let mut last = state.snapshot();
        for (i, signal) in signals.iter().enumerate() {
            if let Some(open) = help.get(i) {
                state.set_help_panel_open(*open);
            }
            now += steps.get(i).copied().unwrap_or(1);
            feed(&mut state, signal, t(now));
            let snap = state.snapshot();
            prop_assert!(snap.violation_count >= last.violation_count);
            prop_assert!(snap.seconds_away >= last.seconds_away);
            last = snap;
        }
    }

    #[test]
    fn prop_devtools_opens_once_per_edge(levels in prop::collection::vec(any::<bool>(), 1..80)) {
        let docked = Viewport::new(1200, 500, 1200, 900);
        let normal = Viewport::new(1200, 850, 1200, 900);
        let mut latch = Latch::default();
        let mut previous = false;
        let mut expected_opens = 0;
        let mut opens = 0;

        for level in levels {
            if level && !previous {
                expected_opens += 1;
            }
            previous = level;
            if latch.sample(if level { &docked } else { &normal })
                == Some(sentinel_core::LatchEdge::Opened)
            {
                opens += 1;
            }
        }
        prop_assert_eq!(opens, expected_opens);
    }
}
