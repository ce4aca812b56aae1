use crate::types::{DayOfYear, FireError, FireResult, MAX_DAY_OF_YEAR, NOT_OBSERVED, UNBURNABLE};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Inclusive day-of-year window of a reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoyWindow {
    min_doy: DayOfYear,
    max_doy: DayOfYear,
}

impl DoyWindow {
    pub fn new(min_doy: DayOfYear, max_doy: DayOfYear) -> FireResult<Self> {
        if min_doy < 0 || max_doy > MAX_DAY_OF_YEAR || min_doy > max_doy {
            return Err(FireError::InvalidArgument(format!(
                "Invalid day-of-year window [{}, {}]",
                min_doy, max_doy
            )));
        }
        Ok(Self { min_doy, max_doy })
    }

    pub fn min_doy(&self) -> DayOfYear {
        self.min_doy
    }

    pub fn max_doy(&self) -> DayOfYear {
        self.max_doy
    }

    pub fn contains(&self, day: DayOfYear) -> bool {
        day >= self.min_doy && day <= self.max_doy
    }
}

/// Best detection seen so far for one pixel position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub best_day: DayOfYear,
    pub confidence: f32,
}

impl DetectionRecord {
    /// The empty state: nothing observed yet
    pub const IDENTITY: DetectionRecord = DetectionRecord {
        best_day: NOT_OBSERVED,
        confidence: 0.0,
    };

    pub fn new(best_day: DayOfYear, confidence: f32) -> Self {
        Self { best_day, confidence }
    }

    /// Whether the record holds a detection inside the window
    pub fn is_burned(&self, window: &DoyWindow) -> bool {
        self.best_day >= 0 && window.contains(self.best_day)
    }

    pub fn is_unburnable(&self) -> bool {
        self.best_day == UNBURNABLE
    }
}

impl Default for DetectionRecord {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Preference tiers, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    Nothing,
    Unburnable,
    DayZero,
    Detection,
}

/// Confidence used for tie-breaks; NaN ranks lowest
fn confidence_rank(confidence: f32) -> f32 {
    if confidence.is_nan() {
        f32::NEG_INFINITY
    } else {
        confidence
    }
}

/// Merges day-of-burn observations of one pixel position
///
/// States are normalized and then ordered by a total preference: an
/// in-window detection (earliest day first) beats a day-0 detection, which
/// beats an unburnable observation, which beats nothing. Equal days keep the
/// higher confidence (overlapping granules of one acquisition date), with NaN
/// below every number. Merging is therefore a maximum over a total order, so
/// the result does not depend on the order of the observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayOfBurnAggregator {
    window: DoyWindow,
}

impl DayOfBurnAggregator {
    pub fn new(window: DoyWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &DoyWindow {
        &self.window
    }

    fn tier(&self, day: DayOfYear) -> Tier {
        if day > 0 && self.window.contains(day) {
            Tier::Detection
        } else if day == 0 {
            Tier::DayZero
        } else if day == UNBURNABLE {
            Tier::Unburnable
        } else {
            Tier::Nothing
        }
    }

    /// Bring an observation into canonical state form
    fn normalize(&self, day: DayOfYear, confidence: f32) -> DetectionRecord {
        match self.tier(day) {
            Tier::Detection | Tier::DayZero => {
                // a valid day reported with zero confidence is still a detection
                let confidence = if confidence == 0.0 { 1.0 } else { confidence };
                DetectionRecord::new(day, confidence)
            }
            Tier::Unburnable => DetectionRecord::new(UNBURNABLE, 0.0),
            Tier::Nothing => DetectionRecord::IDENTITY,
        }
    }

    /// Preference order between two normalized records
    fn preference(&self, a: &DetectionRecord, b: &DetectionRecord) -> Ordering {
        self.tier(a.best_day)
            .cmp(&self.tier(b.best_day))
            .then_with(|| b.best_day.cmp(&a.best_day))
            .then_with(|| confidence_rank(a.confidence).total_cmp(&confidence_rank(b.confidence)))
            .then_with(|| a.confidence.total_cmp(&b.confidence))
    }

    /// Fold one observation into a state
    pub fn aggregate(
        &self,
        new_day: DayOfYear,
        new_confidence: f32,
        state: DetectionRecord,
    ) -> DetectionRecord {
        self.merge(state, self.normalize(new_day, new_confidence))
    }

    /// Combine two partial states
    pub fn merge(&self, a: DetectionRecord, b: DetectionRecord) -> DetectionRecord {
        let a = self.normalize(a.best_day, a.confidence);
        let b = self.normalize(b.best_day, b.confidence);
        match self.preference(&a, &b) {
            Ordering::Less => b,
            _ => a,
        }
    }

    /// Fold one observation into a state in place
    pub fn observe(&self, state: &mut DetectionRecord, day: DayOfYear, confidence: f32) {
        *state = self.aggregate(day, confidence, *state);
    }

    /// Fold a sequence of observations starting from the empty state
    pub fn fold<I>(&self, observations: I) -> DetectionRecord
    where
        I: IntoIterator<Item = (DayOfYear, f32)>,
    {
        observations
            .into_iter()
            .fold(DetectionRecord::IDENTITY, |state, (day, confidence)| {
                self.aggregate(day, confidence, state)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator(min_doy: DayOfYear, max_doy: DayOfYear) -> DayOfBurnAggregator {
        DayOfBurnAggregator::new(DoyWindow::new(min_doy, max_doy).unwrap())
    }

    fn check(agg: &DayOfBurnAggregator, obs: &[(DayOfYear, f32)], day: DayOfYear, conf: f32) {
        let record = agg.fold(obs.iter().copied());
        assert_eq!(record.best_day, day, "observations {:?}", obs);
        assert_eq!(record.confidence, conf, "observations {:?}", obs);
    }

    #[test]
    fn test_window_validation() {
        assert!(DoyWindow::new(1, 31).is_ok());
        assert!(DoyWindow::new(0, 366).is_ok());
        assert!(matches!(DoyWindow::new(40, 31), Err(FireError::InvalidArgument(_))));
        assert!(DoyWindow::new(-1, 31).is_err());
        assert!(DoyWindow::new(1, 367).is_err());
    }

    #[test]
    fn test_earliest_detection_wins() {
        let agg = aggregator(1, 30);
        check(&agg, &[(20, 0.5), (-1, 0.0), (0, 0.0)], 20, 0.5);
        check(&agg, &[(10, 0.5), (20, 0.5), (-1, 0.5), (11, 0.5)], 10, 0.5);
        check(
            &agg,
            &[(5, 0.5), (10, 0.5), (100, 0.5), (-1, 0.5), (-1, 0.5), (45, 0.5), (-1, 0.5)],
            5,
            0.5,
        );

        let year = aggregator(1, 366);
        check(&year, &[(998, 0.9), (300, 0.7), (997, 0.9)], 300, 0.7);
    }

    #[test]
    fn test_unburnable_beats_not_observed_only() {
        let agg = aggregator(1, 30);
        check(&agg, &[(-1, 0.0), (-1, 0.0), (-2, 0.0)], -2, 0.0);
        check(&agg, &[(-2, 0.0), (10, 0.3), (-2, 0.0)], 10, 0.3);
        check(&agg, &[(-2, 0.0), (0, 0.0), (-2, 0.0)], 0, 1.0);
        check(&agg, &[(-2, 0.7)], -2, 0.0);
    }

    #[test]
    fn test_day_zero() {
        let agg = aggregator(1, 30);
        check(&agg, &[(0, 0.5)], 0, 0.5);
        check(&agg, &[(0, 0.0)], 0, 1.0);
        check(&agg, &[(0, 0.5), (-1, 0.5), (-2, 0.5), (0, 0.3)], 0, 0.5);
        check(&agg, &[(0, 0.0), (1, 0.3)], 1, 0.3);
    }

    #[test]
    fn test_detection_outside_window_is_ignored() {
        let agg = aggregator(32, 60);
        check(&agg, &[(10, 0.2)], NOT_OBSERVED, 0.0);
        check(&agg, &[(61, 0.9), (45, 0.4)], 45, 0.4);
    }

    #[test]
    fn test_same_day_keeps_higher_confidence() {
        let agg = aggregator(1, 31);
        check(&agg, &[(12, 0.9), (12, 0.3)], 12, 0.9);
        check(&agg, &[(12, 0.3), (12, 0.9)], 12, 0.9);

        // NaN never displaces a real confidence
        let record = agg.fold(vec![(12, f32::NAN), (12, 0.3)]);
        assert_eq!(record, DetectionRecord::new(12, 0.3));
        let record = agg.fold(vec![(12, 0.3), (12, f32::NAN)]);
        assert_eq!(record, DetectionRecord::new(12, 0.3));
        let record = agg.fold(vec![(12, f32::NAN)]);
        assert!(record.confidence.is_nan());
    }

    #[test]
    fn test_zero_confidence_detection() {
        let agg = aggregator(1, 30);
        let record = agg.aggregate(12, 0.0, DetectionRecord::IDENTITY);
        assert_eq!(record, DetectionRecord::new(12, 1.0));
        assert!(record.is_burned(agg.window()));
    }

    #[test]
    fn test_observe_in_place() {
        let agg = aggregator(1, 30);
        let mut state = DetectionRecord::default();
        agg.observe(&mut state, -2, 0.0);
        assert!(state.is_unburnable());
        agg.observe(&mut state, 17, 0.25);
        assert_eq!(state, DetectionRecord::new(17, 0.25));
    }

    #[test]
    fn test_merge_partial_states() {
        let agg = aggregator(1, 30);
        let left = agg.fold(vec![(14, 0.6), (-1, 0.0)]);
        let right = agg.fold(vec![(9, 0.8), (-2, 0.0)]);
        assert_eq!(agg.merge(left, right), DetectionRecord::new(9, 0.8));
        assert_eq!(agg.merge(right, left), DetectionRecord::new(9, 0.8));
        assert_eq!(agg.merge(left, DetectionRecord::IDENTITY), left);
    }
}
