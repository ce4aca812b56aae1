use cinder::core::{DayOfBurnAggregator, DetectionRecord, DoyWindow};
use cinder::types::DayOfYear;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// One window that excludes day 0 and one that contains it
fn aggregators() -> Vec<DayOfBurnAggregator> {
    vec![
        DayOfBurnAggregator::new(DoyWindow::new(1, 30).expect("Failed to create window")),
        DayOfBurnAggregator::new(DoyWindow::new(0, 30).expect("Failed to create window")),
    ]
}

/// Observations covering every branch of the merge: sentinels, day 0,
/// in-window detections with equal and different days, out-of-window days
/// and a NaN confidence
fn observations() -> Vec<(DayOfYear, f32)> {
    let days = [-2, -1, 0, 1, 15, 30, 31, 100];
    let confidences = [0.0, 0.3, 0.8];
    let mut obs: Vec<(DayOfYear, f32)> = days
        .iter()
        .flat_map(|&d| confidences.iter().map(move |&c| (d, c)))
        .collect();
    obs.push((15, f32::NAN));
    obs.push((0, f32::NAN));
    obs
}

fn states(agg: &DayOfBurnAggregator) -> Vec<DetectionRecord> {
    let mut states: Vec<DetectionRecord> = observations()
        .into_iter()
        .map(|obs| agg.fold(vec![obs]))
        .collect();
    states.push(DetectionRecord::IDENTITY);
    states
}

/// Bitwise equality, so NaN confidences compare equal to themselves
fn same(a: &DetectionRecord, b: &DetectionRecord) -> bool {
    a.best_day == b.best_day && a.confidence.to_bits() == b.confidence.to_bits()
}

#[test]
fn test_identity() {
    init_logging();

    for agg in aggregators() {
        for state in states(&agg) {
            assert!(same(&agg.merge(state, DetectionRecord::IDENTITY), &state), "{:?}", state);
            assert!(same(&agg.merge(DetectionRecord::IDENTITY, state), &state), "{:?}", state);
        }
    }
}

#[test]
fn test_commutativity() {
    init_logging();

    for agg in aggregators() {
        let states = states(&agg);
        for a in &states {
            for b in &states {
                assert!(
                    same(&agg.merge(*a, *b), &agg.merge(*b, *a)),
                    "a = {:?}, b = {:?}",
                    a,
                    b
                );
            }
        }

        for &(day_a, conf_a) in &observations() {
            for &(day_b, conf_b) in &observations() {
                let ab = agg.fold(vec![(day_a, conf_a), (day_b, conf_b)]);
                let ba = agg.fold(vec![(day_b, conf_b), (day_a, conf_a)]);
                assert!(same(&ab, &ba), "{:?} vs {:?}", ab, ba);
            }
        }
    }
}

#[test]
fn test_associativity() {
    init_logging();

    for agg in aggregators() {
        let states = states(&agg);
        for a in &states {
            for b in &states {
                for c in &states {
                    let left = agg.merge(agg.merge(*a, *b), *c);
                    let right = agg.merge(*a, agg.merge(*b, *c));
                    assert!(same(&left, &right), "a = {:?}, b = {:?}, c = {:?}", a, b, c);
                }
            }
        }
    }
}

#[test]
fn test_day_zero_inside_window() {
    init_logging();
    let agg = DayOfBurnAggregator::new(DoyWindow::new(0, 30).unwrap());

    let record = agg.fold(vec![(0, 0.7), (-2, 0.0)]);
    assert_eq!(record, DetectionRecord::new(0, 0.7));
    assert!(record.is_burned(agg.window()));

    // a positive day still replaces day 0
    let record = agg.fold(vec![(0, 0.7), (22, 0.4)]);
    assert_eq!(record, DetectionRecord::new(22, 0.4));
}

#[test]
fn test_order_independence_of_folds() {
    init_logging();
    let agg = &aggregators()[0];
    let sequence = vec![(31, 0.9), (-2, 0.0), (17, 0.4), (0, 0.0), (17, 0.2), (-1, 0.5)];
    let expected = agg.fold(sequence.clone());
    assert_eq!(expected, DetectionRecord::new(17, 0.4));

    // every rotation and the reversed sequence
    for shift in 0..sequence.len() {
        let mut rotated = sequence.clone();
        rotated.rotate_left(shift);
        assert_eq!(agg.fold(rotated.clone()), expected);
        rotated.reverse();
        assert_eq!(agg.fold(rotated), expected);
    }

    // tree reduction over split halves
    let (left, right) = sequence.split_at(2);
    let merged = agg.merge(agg.fold(left.to_vec()), agg.fold(right.to_vec()));
    assert_eq!(merged, expected);
}
