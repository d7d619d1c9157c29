//! Property tests for variables, modifiers and timeline replay

use proptest::prelude::*;

use timescrubber::core::types::{TagSet, Time};
use timescrubber::modifiers::{Modifier, ModifierStack, TargetParam};
use timescrubber::state::{TimeState, Variable};
use timescrubber::timeline::{Timeline, VariableEvent};

const MIN: f64 = 0.0;
const MAX: f64 = 100.0;

fn counter() -> Timeline {
    let mut initial = TimeState::new(0.0);
    initial
        .add_variable(Variable::linear("Value", 500.0, 0.5, 0.0, 1000.0).unwrap())
        .unwrap();
    Timeline::new(initial)
}

fn add(timeline: &mut Timeline, t: Time, amount: f64) {
    timeline
        .add_event(VariableEvent::new("nudge").add("Value", amount), t)
        .unwrap();
}

fn events() -> impl Strategy<Value = Vec<(Time, f64)>> {
    prop::collection::vec((0.0..50.0f64, -5.0..5.0f64), 0..12)
}

proptest! {
    #[test]
    fn linear_values_follow_rate_between_bounds(
        value in MIN..MAX,
        rate in -5.0..5.0f64,
        t1 in 0.0..40.0f64,
        dt in 0.0..20.0f64,
    ) {
        let t2 = t1 + dt;
        let raw1 = value + rate * t1;
        let raw2 = value + rate * t2;
        prop_assume!((MIN..=MAX).contains(&raw1) && (MIN..=MAX).contains(&raw2));

        let var = Variable::linear("x", value, rate, MIN, MAX).unwrap();
        let expected = ((t2 - t1) * rate + var.get(t1)).clamp(MIN, MAX);
        prop_assert!((var.get(t2) - expected).abs() < 1e-9);
    }

    #[test]
    fn rehome_keeps_observed_value(
        value in MIN..MAX,
        rate in -5.0..5.0f64,
        t in 0.0..60.0f64,
    ) {
        let mut var = Variable::linear("x", value, rate, MIN, MAX).unwrap();
        let before = var.get(t);
        var.rehome(t);
        prop_assert_eq!(var.get(t), before);
    }

    #[test]
    fn multiplier_ignores_modifier_order(
        entries in prop::collection::vec((0usize..3, -0.5..2.0f64), 0..10),
        rotate in 0usize..10,
    ) {
        let kinds = ["gathering", "tool", "weather"];
        let modifiers: Vec<Modifier> = entries
            .iter()
            .enumerate()
            .map(|(i, &(kind, value))| {
                Modifier::new(format!("src{}", i), kinds[kind], value, TargetParam::Rate)
            })
            .collect();

        let mut forward = ModifierStack::new();
        modifiers.iter().cloned().for_each(|m| forward.add(m));

        let mut shuffled = modifiers.clone();
        shuffled.reverse();
        if !shuffled.is_empty() {
            let k = rotate % shuffled.len();
            shuffled.rotate_left(k);
        }
        let mut backward = ModifierStack::new();
        shuffled.into_iter().for_each(|m| backward.add(m));

        let tags = TagSet::new();
        prop_assert_eq!(
            forward.calculate_multiplier(&TargetParam::Rate, &tags).to_bits(),
            backward.calculate_multiplier(&TargetParam::Rate, &tags).to_bits()
        );
    }

    #[test]
    fn state_queries_are_idempotent(events in events(), t in 0.0..60.0f64) {
        let mut timeline = counter();
        for &(at, amount) in &events {
            add(&mut timeline, at, amount);
        }
        let first = timeline.state_at(t).unwrap().clone();
        let second = timeline.state_at(t).unwrap().clone();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn insertion_order_does_not_matter(events in events(), t in 0.0..60.0f64) {
        let mut forward = counter();
        let mut backward = counter();
        for &(at, amount) in &events {
            add(&mut forward, at, amount);
        }
        for &(at, amount) in events.iter().rev() {
            add(&mut backward, at, amount);
        }
        let a = forward.value_at("Value", t).unwrap();
        let b = backward.value_at("Value", t).unwrap();
        prop_assert!((a - b).abs() < 1e-6);
    }

    #[test]
    fn edits_after_invalidation_match_a_fresh_replay(
        events in events(),
        extra in events(),
        cut in 0.0..50.0f64,
        query in 0.0..60.0f64,
    ) {
        let mut edited = counter();
        let mut ids = Vec::new();
        for &(at, amount) in &events {
            ids.push((edited
                .add_event(VariableEvent::new("nudge").add("Value", amount), at)
                .unwrap(), at));
        }
        // Warm the cache past everything that is about to change
        edited.state_at(60.0).unwrap();

        for &(id, at) in &ids {
            if at > cut {
                edited.remove_event(id).unwrap();
            }
        }
        edited.invalidate_after(cut).unwrap();
        for &(at, amount) in &extra {
            add(&mut edited, at, amount);
        }

        let mut fresh = counter();
        for &(at, amount) in events.iter().filter(|(at, _)| *at <= cut) {
            add(&mut fresh, at, amount);
        }
        for &(at, amount) in &extra {
            add(&mut fresh, at, amount);
        }

        let a = edited.value_at("Value", query).unwrap();
        let b = fresh.value_at("Value", query).unwrap();
        prop_assert!((a - b).abs() < 1e-6, "edited {} fresh {}", a, b);
    }
}
