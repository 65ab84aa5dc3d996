//! Property tests for the coercion search.

use proptest::prelude::*;

use pask_core::ast::{span, ExpNode};
use pask_core::types::Type;

fn targets() -> impl Strategy<Value = Type> {
    prop_oneof![
        Just(Type::integer()),
        Just(Type::boolean()),
        (any::<i32>(), any::<i32>()).prop_map(|(a, b)| {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            Type::subrange(Type::integer(), i64::from(lo), i64::from(hi))
        }),
    ]
}

fn literals() -> impl Strategy<Value = ExpNode> {
    prop_oneof![
        any::<i32>().prop_map(|n| ExpNode::int_literal(span(0, 0), i64::from(n))),
        any::<bool>().prop_map(|b| ExpNode::bool_literal(span(0, 0), b)),
    ]
}

proptest! {
    #[test]
    fn successful_coercion_reaches_the_target_type(target in targets(), exp in literals()) {
        if let Ok(coerced) = target.coerce_to_type(&exp) {
            prop_assert_eq!(coerced.ty(), target);
        }
    }

    #[test]
    fn coercion_is_idempotent(target in targets(), exp in literals()) {
        if let Ok(once) = target.coerce_to_type(&exp) {
            let twice = target
                .coerce_to_type(&once)
                .expect("an already-coerced expression coerces to itself");
            prop_assert_eq!(once, twice);
        }
    }

    #[test]
    fn integer_literals_narrow_into_every_subrange(
        bounds in (any::<i32>(), any::<i32>()),
        n in any::<i32>(),
    ) {
        let (a, b) = bounds;
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let target = Type::subrange(Type::integer(), i64::from(lo), i64::from(hi));
        let lit = ExpNode::int_literal(span(0, 0), i64::from(n));
        // Always statically legal; the range is enforced at run time. A
        // literal whose singleton type already equals the target needs no
        // conversion at all.
        let coerced = target.coerce_to_type(&lit).expect("literal narrows");
        prop_assert_eq!(coerced.ty(), target);
        prop_assert!(matches!(
            coerced,
            ExpNode::NarrowSubrange(_) | ExpNode::Const(_)
        ));
    }

    #[test]
    fn boolean_literals_never_reach_integer_targets(b in any::<bool>()) {
        let lit = ExpNode::bool_literal(span(0, 0), b);
        prop_assert!(Type::integer().coerce_to_type(&lit).is_err());
        prop_assert!(Type::subrange(Type::integer(), 0, 9).coerce_to_type(&lit).is_err());
    }
}
