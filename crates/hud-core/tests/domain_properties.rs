//! Property tests for the roster and visibility windows.

use hud_core::{Driver, DriverRoster, VisibilityWindow, VisibleType, WidgetState, AUTO_DRIVER_ID};
use proptest::prelude::*;

/// Distinct, non-sentinel driver ids.
fn driver_ids() -> impl Strategy<Value = Vec<i32>> {
    proptest::collection::hash_set(0i32..10_000, 0..40).prop_map(|set| set.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_reorder_after_full_replace_follows_positions(
        (ids, positions) in driver_ids().prop_flat_map(|ids| {
            let shuffled = Just(ids.clone()).prop_shuffle();
            (Just(ids), shuffled)
        })
    ) {
        let mut roster = DriverRoster::new();
        roster.full_replace(ids.iter().map(|&id| Driver::new(id, format!("D{id}"))));

        roster.reorder(&positions);

        let order: Vec<i32> = roster.drivers().iter().map(|d| d.id).collect();
        prop_assert_eq!(order[0], AUTO_DRIVER_ID);
        prop_assert_eq!(&order[1..], positions.as_slice());
    }

    #[test]
    fn prop_manual_window_covers_duration_in_clock_direction(
        start in -1_000_000i64..1_000_000,
        duration in 1i64..1_000_000,
        decreasing in any::<bool>(),
    ) {
        let state = WidgetState::new("Gap")
            .with_type(VisibleType::Manual)
            .with_timing(start, duration);

        let window = state.window(decreasing);

        if decreasing {
            prop_assert_eq!(window, VisibilityWindow { start: start - duration, end: start });
            prop_assert!(window.contains(start - duration));
        } else {
            prop_assert_eq!(window, VisibilityWindow { start, end: start + duration });
            prop_assert!(window.contains(start));
            prop_assert!(!window.contains(start + duration));
        }
    }

    #[test]
    fn prop_next_lap_is_never_visible_before_trigger(t in any::<i64>(), d in 0i64..100_000) {
        let state = WidgetState::new("Speedo").with_type(VisibleType::NextLap).with_timing(0, d);
        prop_assert!(!state.window(false).contains(t));
        prop_assert!(!state.window(true).contains(t));
    }
}
