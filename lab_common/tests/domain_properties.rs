//! Property tests for value domains and capability resolution.
//!
//! Numeric bounds are inclusive on both sides, compound domains are a logical
//! OR, and the closest declaration in a capability chain always wins.

use lab_common::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

proptest! {
    #[test]
    fn int_domain_accepts_exactly_the_closed_interval(
        a in -1_000_000i64..1_000_000,
        b in -1_000_000i64..1_000_000,
        v in -1_000_000i64..1_000_000,
    ) {
        let (min, max) = if a <= b { (a, b) } else { (b, a) };
        let d = Domain::int_range(min, max);
        prop_assert_eq!(d.validate(&Value::Int(v)), min <= v && v <= max);
        prop_assert!(d.validate(&Value::Int(min)));
        prop_assert!(d.validate(&Value::Int(max)));
        prop_assert!(!d.validate(&Value::Int(min - 1)));
        prop_assert!(!d.validate(&Value::Int(max + 1)));
    }

    #[test]
    fn float_domain_bounds_are_inclusive(
        a in -1.0e6f64..1.0e6,
        b in -1.0e6f64..1.0e6,
        v in -2.0e6f64..2.0e6,
    ) {
        let (min, max) = if a <= b { (a, b) } else { (b, a) };
        let d = Domain::float_range(min, max);
        prop_assert_eq!(d.validate(&Value::Float(v)), min <= v && v <= max);
        prop_assert!(d.validate(&Value::Float(min)));
        prop_assert!(d.validate(&Value::Float(max)));
        prop_assert!(!d.validate(&Value::Float(min - 1.0)));
        prop_assert!(!d.validate(&Value::Float(max + 1.0)));
    }

    #[test]
    fn compound_is_or_of_members(
        a_lo in -100i64..100, a_len in 0i64..50,
        b_lo in -100i64..100, b_len in 0i64..50,
        v in -200i64..200,
    ) {
        let a = Domain::int_range(a_lo, a_lo + a_len);
        let b = Domain::int_range(b_lo, b_lo + b_len);
        let value = Value::Int(v);
        let both = Domain::compound(vec![a.clone(), b.clone()]);
        prop_assert_eq!(both.validate(&value), a.validate(&value) || b.validate(&value));
        prop_assert!(!Domain::compound(vec![]).validate(&value));
    }

    #[test]
    fn validate_never_panics_on_wrong_kinds(s in ".*", f in any::<f64>(), flag in any::<bool>()) {
        let domains = [
            Domain::int_range(0, 10),
            Domain::float(None, None),
            Domain::string("[A-Z]+").unwrap(),
            Domain::options(["ON", "OFF"]),
        ];
        for d in &domains {
            let _ = d.validate(&Value::Str(s.clone()));
            let _ = d.validate(&Value::Float(f));
            let _ = d.validate(&Value::Bool(flag));
        }
    }

    #[test]
    fn string_domain_is_prefix_match(prefix in "[A-Z]{1,8}", tail in "[a-z0-9:]{0,12}") {
        let d = Domain::string(&prefix).unwrap();
        let value = format!("{prefix}{tail}");
        let shifted = format!("_{value}");
        prop_assert!(d.validate(&Value::Str(value)));
        prop_assert!(!d.validate(&Value::Str(shifted)));
    }

    #[test]
    fn closest_record_wins(depth in 1usize..6, leaf_max in 0i64..1000) {
        // Record i declares x in [0, leaf_max + i]; record 0 is the leaf.
        let chain: Vec<CapabilityRecord> = (0..depth)
            .map(|i| {
                let mut r = CapabilityRecord::new(format!("level{i}"))
                    .with_parameter(Parameter::new("x", Domain::int_range(0, leaf_max + i as i64)));
                if i + 1 < depth {
                    r = r.with_parent(format!("level{}", i + 1));
                }
                r
            })
            .collect();
        let merged = merged_parameters(&chain).unwrap();
        prop_assert_eq!(merged["x"].domain(), &Domain::int_range(0, leaf_max));
    }

    #[test]
    fn mismatch_lists_every_extra_name(extra in proptest::collection::btree_set("[a-z]{3,6}", 1..5)) {
        let def = InstrumentDefinition::resolve(&[CapabilityRecord::new("one")
            .with_parameter(Parameter::new("a", Domain::int(None, None)))])
        .unwrap();
        let mut supplied: BTreeMap<String, Value> = extra
            .iter()
            .filter(|n| n.as_str() != "a")
            .map(|n| (n.clone(), Value::Int(0)))
            .collect();
        let expected: Vec<String> = supplied.keys().cloned().collect();
        supplied.insert("a".to_string(), Value::Int(0));
        match def.instantiate(supplied) {
            Ok(_) => prop_assert!(expected.is_empty()),
            Err(ParameterError::Mismatch { extra, missing, .. }) => {
                prop_assert_eq!(extra, expected);
                prop_assert!(missing.is_empty());
            }
            Err(other) => prop_assert!(false, "unexpected error {other}"),
        }
    }
}
