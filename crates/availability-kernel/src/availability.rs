//! Preemptive Availability Filter
//!
//! Straggler avoidance: a node is admitted to a bounded task only if it is
//! in contact now and stays in contact for at least the task's duration.
//! Nodes whose next window has not started yet are rejected; no forward
//! scheduling is attempted here.

use crate::geometry::GeometryProvider;
use crate::model::{AvailabilityDecision, Node, VisibilityWindow};
use crate::windows::{visibility_windows, WindowOptions};
use crate::{KernelError, Result};
use chrono::{DateTime, Duration, Utc};
use ground_stations::GroundStation;
use tracing::debug;

/// Decide from precomputed windows. The first window containing `now`
/// (half-open) wins; `remaining == required` admits.
pub fn decide(
    windows: &[VisibilityWindow],
    now: DateTime<Utc>,
    required: Duration,
) -> AvailabilityDecision {
    let Some(window) = windows.iter().find(|w| w.contains(now)) else {
        return AvailabilityDecision::rejected();
    };

    let remaining = window.end_time - now;
    AvailabilityDecision {
        available: remaining >= required,
        remaining: Some(remaining),
        window: Some(window.clone()),
    }
}

/// Query windows over `[now, now + lookahead]` and decide
#[allow(clippy::too_many_arguments)]
pub fn is_available<P: GeometryProvider + ?Sized>(
    provider: &P,
    node: &Node,
    station: &GroundStation,
    now: DateTime<Utc>,
    required: Duration,
    min_elevation_deg: f64,
    lookahead: Duration,
    options: WindowOptions,
) -> Result<AvailabilityDecision> {
    if required < Duration::zero() {
        return Err(KernelError::InvalidRange(format!(
            "required duration {} is negative",
            required
        )));
    }

    let horizon = now.checked_add_signed(lookahead).ok_or_else(|| {
        KernelError::InvalidRange(format!("lookahead {} from {} is out of range", lookahead, now))
    })?;

    let windows = visibility_windows(
        provider,
        node,
        station,
        now,
        horizon,
        min_elevation_deg,
        options,
    )?;
    let decision = decide(&windows, now, required);

    debug!(
        "{} at {}: available={} remaining={:?} required={}",
        node.id, station.id, decision.available, decision.remaining, required
    );

    Ok(decision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{minutes, station, ScriptedGeometry, ScriptedPass};
    use proptest::prelude::*;

    fn check(geometry: &ScriptedGeometry, now: DateTime<Utc>, required_s: i64) -> Result<AvailabilityDecision> {
        is_available(
            geometry,
            &Node::new("sat_0", "SAT 0"),
            &station(),
            now,
            Duration::seconds(required_s),
            10.0,
            Duration::hours(2),
            WindowOptions::default(),
        )
    }

    fn ten_minute_pass() -> ScriptedGeometry {
        ScriptedGeometry::new().with_pass("sat_0", ScriptedPass::minutes(10, 20, 45.0))
    }

    #[test]
    fn test_admits_with_enough_time_left() {
        let decision = check(&ten_minute_pass(), minutes(11), 300).unwrap();
        assert!(decision.available);
        assert_eq!(decision.remaining, Some(Duration::seconds(540)));
    }

    #[test]
    fn test_rejects_straggler() {
        let decision = check(&ten_minute_pass(), minutes(18), 300).unwrap();
        assert!(!decision.available);
        assert_eq!(decision.remaining, Some(Duration::seconds(120)));
    }

    #[test]
    fn test_exact_remaining_admits() {
        let decision = check(&ten_minute_pass(), minutes(15), 300).unwrap();
        assert!(decision.available);
        assert_eq!(decision.remaining, Some(Duration::seconds(300)));
    }

    #[test]
    fn test_future_window_rejected() {
        let decision = check(&ten_minute_pass(), minutes(5), 0).unwrap();
        assert!(!decision.available);
        assert_eq!(decision.remaining, None);
    }

    #[test]
    fn test_closing_instant_rejected() {
        let decision = check(&ten_minute_pass(), minutes(20), 0).unwrap();
        assert!(!decision.available);
    }

    #[test]
    fn test_no_windows_rejected() {
        let decision = check(&ScriptedGeometry::new(), minutes(0), 0).unwrap();
        assert_eq!(decision, AvailabilityDecision::rejected());
    }

    #[test]
    fn test_negative_requirement_rejected() {
        let err = check(&ten_minute_pass(), minutes(11), -1).unwrap_err();
        assert!(matches!(err, KernelError::InvalidRange(_)));
    }

    #[test]
    fn test_unrepresentable_horizon_rejected() {
        let err = is_available(
            &ten_minute_pass(),
            &Node::new("sat_0", "SAT 0"),
            &station(),
            minutes(11),
            Duration::seconds(300),
            10.0,
            Duration::MAX,
            WindowOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, KernelError::InvalidRange(_)));
    }

    #[test]
    fn test_first_containing_window_wins() {
        let make = |start: i64, end: i64| VisibilityWindow {
            node_id: "sat_0".to_string(),
            station_id: "gs".to_string(),
            start_time: minutes(start),
            end_time: minutes(end),
            max_elevation_deg: 20.0,
            aos_azimuth_deg: 0.0,
            los_azimuth_deg: 0.0,
        };
        let overlapping = [make(0, 5), make(2, 30)];

        let decision = decide(&overlapping, minutes(3), Duration::minutes(1));
        assert!(decision.available);
        assert_eq!(decision.remaining, Some(Duration::minutes(2)));
    }

    proptest! {
        #[test]
        fn fuzz_zero_requirement_matches_containment(now_min in 0i64..40, now_s in 0i64..60) {
            let geometry = ten_minute_pass()
                .with_pass("sat_0", ScriptedPass::minutes(25, 32, 30.0));
            let now = minutes(now_min) + Duration::seconds(now_s);

            let windows = visibility_windows(
                &geometry,
                &Node::new("sat_0", "SAT 0"),
                &station(),
                now,
                now + Duration::hours(2),
                10.0,
                WindowOptions::default(),
            )
            .unwrap();
            let decision = check(&geometry, now, 0).unwrap();

            prop_assert_eq!(decision.available, windows.iter().any(|w| w.contains(now)));
        }
    }
}
