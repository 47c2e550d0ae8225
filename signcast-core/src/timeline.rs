//! Cycle timeline math shared by the server and every player.
//!
//! The server publishes one `(origin, cycle_duration)` pair per schedule
//! group; each player derives the current item and intra-item offset from
//! its own wall clock. All devices running this arithmetic over the same
//! origin agree on the current item to within their clock error.

use serde::{Deserialize, Serialize};

/// Half a frame at 60 Hz. A deadline closer than this is treated as due.
pub const DEADLINE_SLACK_SECS: f64 = 0.008;

/// `[start, end)` offsets of one item within the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemSpan {
    pub start: f64,
    pub end: f64,
}

impl ItemSpan {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Where in the cycle a given wall-clock instant lands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CyclePosition {
    pub index: usize,
    /// Seconds into the current item.
    pub in_item: f64,
    /// Seconds until the current item ends.
    pub remaining: f64,
}

/// Precomputed item offsets for one playlist revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleTimeline {
    spans: Vec<ItemSpan>,
    cycle_duration: f64,
}

impl CycleTimeline {
    /// Build from per-item effective durations, in playlist order.
    /// Non-positive durations are clamped to a one-second floor so a
    /// zero-length item can never wedge the cycle.
    #[must_use]
    pub fn new(durations: &[f64]) -> Self {
        let mut spans = Vec::with_capacity(durations.len());
        let mut offset = 0.0;
        for &d in durations {
            let d = if d > 0.0 { d } else { 1.0 };
            spans.push(ItemSpan {
                start: offset,
                end: offset + d,
            });
            offset += d;
        }
        Self {
            spans,
            cycle_duration: offset,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn cycle_duration(&self) -> f64 {
        self.cycle_duration
    }

    #[must_use]
    pub fn spans(&self) -> &[ItemSpan] {
        &self.spans
    }

    /// Position within the cycle at wall-clock `now`, given the shared
    /// origin. Floored modulo keeps a slightly negative `elapsed` (clock
    /// skew just after an origin re-mint) inside `[0, cycle_duration)`.
    #[must_use]
    pub fn position_at(&self, now: f64, origin: f64) -> Option<CyclePosition> {
        if self.spans.is_empty() {
            return None;
        }

        let elapsed = now - origin;
        let mut cycle_pos = elapsed.rem_euclid(self.cycle_duration);
        if !cycle_pos.is_finite() || cycle_pos >= self.cycle_duration {
            cycle_pos = 0.0;
        }

        let index = self
            .spans
            .iter()
            .position(|s| cycle_pos >= s.start && cycle_pos < s.end)
            .unwrap_or(self.spans.len() - 1);
        let span = &self.spans[index];

        Some(CyclePosition {
            index,
            in_item: cycle_pos - span.start,
            remaining: span.end - cycle_pos,
        })
    }

    /// Absolute wall-clock time at which the item under `now` ends. If the
    /// boundary is already due (within [`DEADLINE_SLACK_SECS`]), the
    /// deadline moves one full cycle forward.
    #[must_use]
    pub fn next_deadline(&self, now: f64, origin: f64) -> Option<f64> {
        let pos = self.position_at(now, origin)?;
        let elapsed = now - origin;
        let cycle_number = (elapsed / self.cycle_duration).floor();
        let mut deadline =
            origin + cycle_number * self.cycle_duration + self.spans[pos.index].end;
        if deadline - now <= DEADLINE_SLACK_SECS {
            deadline += self.cycle_duration;
        }
        Some(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A (image 10s), B (image 5s), C (video 20s)
    fn abc() -> CycleTimeline {
        CycleTimeline::new(&[10.0, 5.0, 20.0])
    }

    #[test]
    fn test_basic_rotation() {
        let timeline = abc();
        assert_eq!(timeline.cycle_duration(), 35.0);

        // At origin + 12 the cycle position is 12: item B ([10, 15)),
        // 2 seconds in, 3 remaining.
        let pos = timeline.position_at(1012.0, 1000.0).unwrap();
        assert_eq!(pos.index, 1);
        assert_eq!(pos.in_item, 2.0);
        assert_eq!(pos.remaining, 3.0);
    }

    #[test]
    fn test_position_wraps_across_cycles() {
        let timeline = abc();
        // 3 full cycles plus 12 seconds
        let pos = timeline.position_at(1000.0 + 3.0 * 35.0 + 12.0, 1000.0).unwrap();
        assert_eq!(pos.index, 1);
        assert_eq!(pos.in_item, 2.0);
    }

    #[test]
    fn test_negative_elapsed_is_valid() {
        // Player clock slightly behind a freshly minted origin.
        let timeline = abc();
        let pos = timeline.position_at(999.5, 1000.0).unwrap();
        // Floored modulo: -0.5 maps to 34.5, inside item C.
        assert_eq!(pos.index, 2);
        assert!((pos.in_item - 19.5).abs() < 1e-9);
    }

    #[test]
    fn test_cycle_coverage() {
        // Every cycle position maps to exactly one item.
        let timeline = abc();
        let mut step = 0.0;
        while step < timeline.cycle_duration() {
            let pos = timeline.position_at(1000.0 + step, 1000.0).unwrap();
            let span = timeline.spans()[pos.index];
            assert!(span.start <= step && step < span.end, "uncovered at {step}");
            step += 0.25;
        }
    }

    #[test]
    fn test_next_deadline() {
        let timeline = abc();
        // Inside item B of cycle 0
        assert_eq!(timeline.next_deadline(1012.0, 1000.0), Some(1015.0));
        // Inside item B of cycle 1
        assert_eq!(timeline.next_deadline(1047.0, 1000.0), Some(1050.0));
    }

    #[test]
    fn test_deadline_slack_advances_cycle() {
        let timeline = abc();
        // 2 ms before the item-B boundary: within slack, so the deadline
        // jumps a full cycle rather than firing late.
        let deadline = timeline.next_deadline(1014.998, 1000.0).unwrap();
        assert!((deadline - 1050.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_item_cycle() {
        let timeline = CycleTimeline::new(&[10.0]);
        let pos = timeline.position_at(1009.9, 1000.0).unwrap();
        assert_eq!(pos.index, 0);
        assert!(pos.remaining > 0.0);
    }

    #[test]
    fn test_zero_duration_clamped() {
        let timeline = CycleTimeline::new(&[0.0, 10.0]);
        assert_eq!(timeline.cycle_duration(), 11.0);
    }

    #[test]
    fn test_empty_timeline() {
        let timeline = CycleTimeline::new(&[]);
        assert!(timeline.position_at(0.0, 0.0).is_none());
        assert!(timeline.next_deadline(0.0, 0.0).is_none());
    }

    #[test]
    fn test_cross_device_agreement() {
        // Two players with synchronized clocks but different fetch times
        // compute the same item for the same instant.
        let timeline_a = abc();
        let timeline_b = abc();
        for offset in [0.0, 4.9, 12.3, 33.0, 141.0] {
            let now = 5000.0 + offset;
            let a = timeline_a.position_at(now, 1000.0).unwrap();
            let b = timeline_b.position_at(now, 1000.0).unwrap();
            assert_eq!(a.index, b.index);
            assert!((a.in_item - b.in_item).abs() < 1e-9);
        }
    }
}
