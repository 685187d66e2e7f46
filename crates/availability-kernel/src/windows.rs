//! Visibility Window Engine
//!
//! Turns elevation geometry for one (node, station) pair into an ordered,
//! non-overlapping list of contact windows. Two strategies share one entry
//! point:
//!
//! - [`WindowStrategy::Events`] pairs the provider's RISE/SET events and is
//!   exact up to the provider's root-finding tolerance.
//! - [`WindowStrategy::Sampled`] walks elevation at a fixed step. It is
//!   cheaper but approximate: a pass shorter than the step can be missed
//!   entirely, and each boundary can be late by up to one step.
//!
//! A window already open at `start` is reported left-truncated at `start`.
//! A window still open at `end` is dropped by default ([`OpenWindowPolicy`]).

use crate::geometry::GeometryProvider;
use crate::model::{EventKind, GeometrySample, Node, VisibilityWindow};
use crate::{check_elevation, KernelError, Result};
use chrono::{DateTime, Duration, Utc};
use ground_stations::GroundStation;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum WindowStrategy {
    #[default]
    Events,
    Sampled { step: Duration },
}

/// What to do with a pass that is still above threshold at the end of the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenWindowPolicy {
    /// Callers needing forward knowledge must extend the horizon
    #[default]
    Drop,
    /// Close the window at the query end
    Truncate,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowOptions {
    pub strategy: WindowStrategy,
    pub open_windows: OpenWindowPolicy,
}

/// Window opening edge
#[derive(Debug, Clone, Copy)]
struct Opening {
    time: DateTime<Utc>,
    elevation_deg: f64,
    azimuth_deg: f64,
}

struct WindowBuilder<'a> {
    node: &'a Node,
    station: &'a GroundStation,
    min_elevation_deg: f64,
    windows: Vec<VisibilityWindow>,
}

impl<'a> WindowBuilder<'a> {
    fn close(&mut self, open: Opening, close: &GeometrySample, peak: Option<f64>) {
        if close.time <= open.time {
            warn!(
                "Skipping empty window for {} at {} ({} → {})",
                self.node.id, self.station.id, open.time, close.time
            );
            return;
        }
        if let Some(last) = self.windows.last() {
            if open.time < last.end_time {
                warn!(
                    "Skipping window for {} at {} overlapping the previous one",
                    self.node.id, self.station.id
                );
                return;
            }
        }

        let endpoint_max = open.elevation_deg.max(close.elevation_deg);
        let max_elevation_deg = peak
            .map_or(endpoint_max, |p| p.max(endpoint_max))
            .max(self.min_elevation_deg);

        self.windows.push(VisibilityWindow {
            node_id: self.node.id.clone(),
            station_id: self.station.id.clone(),
            start_time: open.time,
            end_time: close.time,
            max_elevation_deg,
            aos_azimuth_deg: open.azimuth_deg,
            los_azimuth_deg: close.azimuth_deg,
        });
    }
}

/// Contact windows for one (node, station) pair over `[start, end]`
pub fn visibility_windows<P: GeometryProvider + ?Sized>(
    provider: &P,
    node: &Node,
    station: &GroundStation,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    min_elevation_deg: f64,
    options: WindowOptions,
) -> Result<Vec<VisibilityWindow>> {
    if end <= start {
        return Err(KernelError::InvalidRange(format!(
            "end {} is not after start {}",
            end, start
        )));
    }
    check_elevation(min_elevation_deg)?;

    let mut builder = WindowBuilder {
        node,
        station,
        min_elevation_deg,
        windows: Vec::new(),
    };

    match options.strategy {
        WindowStrategy::Events => {
            from_events(provider, &mut builder, start, end, options.open_windows)?
        }
        WindowStrategy::Sampled { step } => {
            from_samples(provider, &mut builder, start, end, step, options.open_windows)?
        }
    }

    debug!(
        "{} windows for {} at {} between {} and {}",
        builder.windows.len(),
        node.id,
        station.id,
        start,
        end
    );

    Ok(builder.windows)
}

fn from_events<P: GeometryProvider + ?Sized>(
    provider: &P,
    builder: &mut WindowBuilder<'_>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    policy: OpenWindowPolicy,
) -> Result<()> {
    let (node, station) = (builder.node, builder.station);
    let events = provider.events(node, station, start, end, builder.min_elevation_deg)?;

    let mut rise: Option<Opening> = None;
    let mut peak: Option<f64> = None;
    let mut seen_crossing = false;

    for event in events.iter().filter(|e| start <= e.time && e.time <= end) {
        let sample = provider.sample(node, station, event.time)?;

        match event.kind {
            EventKind::Rise => {
                if rise.is_some() {
                    warn!("Consecutive RISE events for {} at {}", node.id, station.id);
                }
                rise = Some(Opening {
                    time: event.time,
                    elevation_deg: sample.elevation_deg,
                    azimuth_deg: sample.azimuth_deg,
                });
                peak = None;
                seen_crossing = true;
            }
            EventKind::Culminate => {
                peak = Some(peak.map_or(sample.elevation_deg, |p| p.max(sample.elevation_deg)));
            }
            EventKind::Set => {
                let opening = match rise.take() {
                    Some(open) => Some(open),
                    // Already above threshold at `start`; azimuth at the
                    // synthetic boundary comes from the SET event
                    None if !seen_crossing => {
                        let at_start = provider.sample(node, station, start)?;
                        Some(Opening {
                            time: start,
                            elevation_deg: at_start.elevation_deg,
                            azimuth_deg: sample.azimuth_deg,
                        })
                    }
                    None => {
                        warn!("SET without RISE for {} at {}", node.id, station.id);
                        None
                    }
                };
                seen_crossing = true;
                if let Some(open) = opening {
                    builder.close(open, &sample, peak);
                }
                peak = None;
            }
        }
    }

    if policy == OpenWindowPolicy::Truncate {
        let open = match rise {
            Some(open) => Some(open),
            None if !seen_crossing => {
                let at_start = provider.sample(node, station, start)?;
                (at_start.elevation_deg >= builder.min_elevation_deg).then_some(Opening {
                    time: start,
                    elevation_deg: at_start.elevation_deg,
                    azimuth_deg: at_start.azimuth_deg,
                })
            }
            None => None,
        };
        if let Some(open) = open {
            let at_end = provider.sample(node, station, end)?;
            builder.close(open, &at_end, peak);
        }
    } else if let Some(open) = rise {
        debug!(
            "Dropping open window for {} at {} (rose {}, no SET before {})",
            node.id, station.id, open.time, end
        );
    }

    Ok(())
}

fn from_samples<P: GeometryProvider + ?Sized>(
    provider: &P,
    builder: &mut WindowBuilder<'_>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
    policy: OpenWindowPolicy,
) -> Result<()> {
    if step < Duration::milliseconds(1) {
        return Err(KernelError::InvalidRange(format!(
            "sampling step {} must be positive",
            step
        )));
    }
    let (node, station) = (builder.node, builder.station);
    let step_ms = step.num_milliseconds();

    // NOT_VISIBLE is `None`; VISIBLE carries the opening edge and running peak
    let mut visible: Option<(Opening, f64)> = None;

    for k in 0i64.. {
        let t = match step_ms
            .checked_mul(k)
            .and_then(Duration::try_milliseconds)
            .and_then(|offset| start.checked_add_signed(offset))
        {
            Some(t) if t <= end => t,
            _ => break,
        };
        let sample = provider.sample(node, station, t)?;
        let above = sample.elevation_deg >= builder.min_elevation_deg;

        visible = match (visible, above) {
            (None, true) => Some((
                Opening {
                    time: t,
                    elevation_deg: sample.elevation_deg,
                    azimuth_deg: sample.azimuth_deg,
                },
                sample.elevation_deg,
            )),
            (Some((open, max_el)), true) => Some((open, max_el.max(sample.elevation_deg))),
            (Some((open, max_el)), false) => {
                builder.close(open, &sample, Some(max_el));
                None
            }
            (None, false) => None,
        };
    }

    if let Some((open, max_el)) = visible {
        match policy {
            OpenWindowPolicy::Truncate => {
                let at_end = provider.sample(node, station, end)?;
                builder.close(open, &at_end, Some(max_el));
            }
            OpenWindowPolicy::Drop => debug!(
                "Dropping open sampled window for {} at {} (rose {})",
                node.id, station.id, open.time
            ),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{minutes, station, ScriptedGeometry, ScriptedPass};
    use proptest::prelude::*;

    fn events() -> WindowOptions {
        WindowOptions::default()
    }

    fn sampled(step_s: i64) -> WindowOptions {
        WindowOptions {
            strategy: WindowStrategy::Sampled {
                step: Duration::seconds(step_s),
            },
            ..Default::default()
        }
    }

    fn single_pass() -> (Node, ScriptedGeometry) {
        let node = Node::new("sat_0", "SAT 0");
        let geometry = ScriptedGeometry::new().with_pass("sat_0", ScriptedPass::minutes(10, 20, 45.0));
        (node, geometry)
    }

    #[test]
    fn test_single_pass_window() {
        let (node, geometry) = single_pass();
        let windows =
            visibility_windows(&geometry, &node, &station(), minutes(0), minutes(60), 10.0, events())
                .unwrap();

        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert_eq!(w.start_time, minutes(10));
        assert_eq!(w.end_time, minutes(20));
        assert!((w.max_elevation_deg - 45.0).abs() < 1e-9);
        assert!((w.aos_azimuth_deg - 30.0).abs() < 1e-9);
        assert!((w.los_azimuth_deg - 150.0).abs() < 1e-9);
        assert_eq!(w.node_id, "sat_0");
        assert_eq!(w.station_id, "gs_test");
    }

    #[test]
    fn test_left_truncated_window_uses_set_azimuth() {
        let (node, geometry) = single_pass();
        let windows =
            visibility_windows(&geometry, &node, &station(), minutes(12), minutes(60), 10.0, events())
                .unwrap();

        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert_eq!(w.start_time, minutes(12));
        assert_eq!(w.end_time, minutes(20));
        assert!((w.aos_azimuth_deg - 150.0).abs() < 1e-9);
        assert!((w.los_azimuth_deg - 150.0).abs() < 1e-9);
        assert!((w.max_elevation_deg - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_left_truncated_after_culmination_uses_endpoint_elevation() {
        let (node, geometry) = single_pass();
        // Culmination at minute 15 is before the query start
        let windows =
            visibility_windows(&geometry, &node, &station(), minutes(17), minutes(60), 10.0, events())
                .unwrap();

        assert_eq!(windows.len(), 1);
        // 45 - 35 * (2/5) = 31 degrees at minute 17
        assert!((windows[0].max_elevation_deg - 31.0).abs() < 1e-6);
    }

    #[test]
    fn test_open_window_dropped_by_default() {
        let (node, geometry) = single_pass();
        let windows =
            visibility_windows(&geometry, &node, &station(), minutes(0), minutes(18), 10.0, events())
                .unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_open_window_truncated_on_request() {
        let (node, geometry) = single_pass();
        let options = WindowOptions {
            open_windows: OpenWindowPolicy::Truncate,
            ..Default::default()
        };
        let windows =
            visibility_windows(&geometry, &node, &station(), minutes(0), minutes(18), 10.0, options)
                .unwrap();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_time, minutes(10));
        assert_eq!(windows[0].end_time, minutes(18));
    }

    #[test]
    fn test_higher_threshold_shrinks_window() {
        let (node, geometry) = single_pass();
        let windows =
            visibility_windows(&geometry, &node, &station(), minutes(0), minutes(60), 27.5, events())
                .unwrap();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].start_time, minutes(10) + Duration::seconds(150));
        assert_eq!(windows[0].end_time, minutes(20) - Duration::seconds(150));
        assert!(windows[0].max_elevation_deg >= 27.5);
    }

    #[test]
    fn test_pass_below_threshold_is_invisible() {
        let (node, geometry) = single_pass();
        let windows =
            visibility_windows(&geometry, &node, &station(), minutes(0), minutes(60), 50.0, events())
                .unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_sampled_window_is_late_by_at_most_one_step() {
        let (node, geometry) = single_pass();
        let windows = visibility_windows(
            &geometry,
            &node,
            &station(),
            minutes(0),
            minutes(60),
            10.0,
            sampled(60),
        )
        .unwrap();

        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert_eq!(w.start_time, minutes(10));
        assert!(w.end_time >= minutes(20) && w.end_time <= minutes(21));
        assert!((w.max_elevation_deg - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_sampled_window_already_open_at_start() {
        let (node, geometry) = single_pass();
        let windows = visibility_windows(
            &geometry,
            &node,
            &station(),
            minutes(12),
            minutes(60),
            10.0,
            sampled(60),
        )
        .unwrap();

        assert_eq!(windows.len(), 1);
        let w = &windows[0];
        assert_eq!(w.start_time, minutes(12));
        assert!(w.end_time >= minutes(20) && w.end_time <= minutes(21));
        assert!((w.max_elevation_deg - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_sampled_open_window_policy() {
        let (node, geometry) = single_pass();
        let dropped = visibility_windows(
            &geometry,
            &node,
            &station(),
            minutes(0),
            minutes(18),
            10.0,
            sampled(60),
        )
        .unwrap();
        assert!(dropped.is_empty());

        let options = WindowOptions {
            open_windows: OpenWindowPolicy::Truncate,
            ..sampled(60)
        };
        let truncated =
            visibility_windows(&geometry, &node, &station(), minutes(0), minutes(18), 10.0, options)
                .unwrap();

        assert_eq!(truncated.len(), 1);
        assert_eq!(truncated[0].start_time, minutes(10));
        assert_eq!(truncated[0].end_time, minutes(18));
        assert!((truncated[0].max_elevation_deg - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_sampled_misses_pass_shorter_than_step() {
        let node = Node::new("sat_0", "SAT 0");
        let geometry = ScriptedGeometry::new().with_pass(
            "sat_0",
            ScriptedPass {
                rise: minutes(10) + Duration::seconds(10),
                peak: minutes(10) + Duration::seconds(20),
                set: minutes(10) + Duration::seconds(30),
                peak_elevation: 20.0,
            },
        );

        let sampled_windows = visibility_windows(
            &geometry,
            &node,
            &station(),
            minutes(0),
            minutes(60),
            10.0,
            sampled(60),
        )
        .unwrap();
        assert!(sampled_windows.is_empty());

        let exact =
            visibility_windows(&geometry, &node, &station(), minutes(0), minutes(60), 10.0, events())
                .unwrap();
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn test_invalid_ranges() {
        let (node, geometry) = single_pass();
        let gs = station();

        let backwards =
            visibility_windows(&geometry, &node, &gs, minutes(10), minutes(10), 10.0, events());
        assert!(matches!(backwards, Err(KernelError::InvalidRange(_))));

        let too_high =
            visibility_windows(&geometry, &node, &gs, minutes(0), minutes(10), 91.0, events());
        assert!(matches!(too_high, Err(KernelError::InvalidRange(_))));

        let nan = visibility_windows(&geometry, &node, &gs, minutes(0), minutes(10), f64::NAN, events());
        assert!(matches!(nan, Err(KernelError::InvalidRange(_))));

        let zero_step =
            visibility_windows(&geometry, &node, &gs, minutes(0), minutes(10), 10.0, sampled(0));
        assert!(matches!(zero_step, Err(KernelError::InvalidRange(_))));
    }

    #[test]
    fn test_degenerate_geometry_fails_fast() {
        let node = Node::new("sat_0", "SAT 0");
        let geometry = ScriptedGeometry::new().with_unavailable("sat_0");
        let err = visibility_windows(&geometry, &node, &station(), minutes(0), minutes(60), 10.0, events())
            .unwrap_err();
        assert!(err.is_data_unavailable());
    }

    /// Non-overlapping passes from (gap, length, peak) triples
    fn pass_script() -> impl Strategy<Value = Vec<ScriptedPass>> {
        prop::collection::vec((1i64..30, 1i64..20, 11.0f64..89.0), 0..8).prop_map(|specs| {
            let mut cursor = 0;
            specs
                .into_iter()
                .map(|(gap, len, peak)| {
                    let rise = cursor + gap;
                    cursor = rise + len;
                    ScriptedPass::minutes(rise, cursor, peak)
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn fuzz_windows_are_ordered_and_bounded(
            passes in pass_script(),
            start_min in 0i64..60,
            span_min in 1i64..300,
            threshold in 10.0f64..60.0,
            use_sampling in any::<bool>(),
        ) {
            let node = Node::new("sat_0", "SAT 0");
            let geometry = passes
                .into_iter()
                .fold(ScriptedGeometry::new(), |g, p| g.with_pass("sat_0", p));
            let options = if use_sampling { sampled(30) } else { events() };

            let windows = visibility_windows(
                &geometry,
                &node,
                &station(),
                minutes(start_min),
                minutes(start_min + span_min),
                threshold,
                options,
            )
            .unwrap();

            for w in &windows {
                prop_assert!(w.start_time < w.end_time);
                prop_assert!(w.max_elevation_deg >= threshold);
                prop_assert!(w.start_time >= minutes(start_min));
                prop_assert!(w.end_time <= minutes(start_min + span_min));
            }
            for pair in windows.windows(2) {
                prop_assert!(pair[0].end_time <= pair[1].start_time);
            }
        }
    }
}
