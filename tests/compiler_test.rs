//! Test that compiled comparisons agree with integer arithmetic
//!
//! Every formula is parsed back into an access tree and evaluated against the
//! attribute set produced for a concrete value.

use std::collections::HashSet;

use abe_envelope::policy::max_value;
use abe_envelope::{compile, compile_assignment, AccessTree, Comparison, Error};
use proptest::prelude::*;

const ALL: [Comparison; 5] = [
    Comparison::Lt,
    Comparison::Gt,
    Comparison::Le,
    Comparison::Ge,
    Comparison::Eq,
];

fn holds(comparison: Comparison, value: u64, constant: u64) -> bool {
    match comparison {
        Comparison::Lt => value < constant,
        Comparison::Gt => value > constant,
        Comparison::Le => value <= constant,
        Comparison::Ge => value >= constant,
        Comparison::Eq => value == constant,
    }
}

/// True when the comparison has the same outcome for every value in range.
fn is_constant(comparison: Comparison, constant: u64, bit_width: u32) -> bool {
    let max = max_value(bit_width);
    match comparison {
        Comparison::Lt | Comparison::Ge => constant == 0,
        Comparison::Gt | Comparison::Le => constant == max,
        Comparison::Eq => false,
    }
}

fn satisfied(tree: &AccessTree, value: u64, bit_width: u32) -> bool {
    let attributes: HashSet<String> = compile_assignment("a", value, bit_width)
        .unwrap()
        .into_iter()
        .collect();
    tree.is_satisfied_by(|attribute: &str| attributes.contains(attribute))
}

fn check_exhaustively(bit_width: u32) {
    let max = max_value(bit_width);
    let mut checked = 0u64;

    for comparison in ALL {
        for constant in 0..=max {
            let compiled = compile("a", comparison, constant, bit_width);
            if is_constant(comparison, constant, bit_width) {
                assert!(
                    matches!(compiled, Err(Error::DegenerateComparison { .. })),
                    "a {comparison} {constant} on {bit_width} bits should be degenerate"
                );
                continue;
            }

            let formula = compiled.unwrap();
            let tree = AccessTree::parse(&formula).unwrap();
            for value in 0..=max {
                assert_eq!(
                    satisfied(&tree, value, bit_width),
                    holds(comparison, value, constant),
                    "{value} {comparison} {constant} via {formula}"
                );
                checked += 1;
            }
        }
    }

    println!("{bit_width}-bit: checked {checked} (comparison, constant, value) triples");
}

#[test]
fn test_exhaustive_4_bits() {
    check_exhaustively(4);
}

#[test]
fn test_exhaustive_8_bits() {
    check_exhaustively(8);
}

#[test]
fn test_single_bit_word() {
    assert_eq!(compile("a", Comparison::Lt, 1, 1).unwrap(), "a:0");
    assert_eq!(compile("a", Comparison::Gt, 0, 1).unwrap(), "a:1");
    assert!(matches!(
        compile("a", Comparison::Gt, 1, 1),
        Err(Error::DegenerateComparison { .. })
    ));
}

#[test]
fn test_full_width_word() {
    let formula = compile("a", Comparison::Gt, u64::MAX - 1, 64).unwrap();
    let tree = AccessTree::parse(&formula).unwrap();
    assert!(satisfied(&tree, u64::MAX, 64));
    assert!(!satisfied(&tree, u64::MAX - 1, 64));
    assert!(!satisfied(&tree, 0, 64));
}

#[test]
fn test_out_of_range_constant() {
    assert!(matches!(
        compile("a", Comparison::Lt, 16, 4),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        compile_assignment("a", 300, 8),
        Err(Error::InvalidArgument(_))
    ));
}

fn comparison_strategy() -> impl Strategy<Value = Comparison> {
    prop::sample::select(ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_16_bit_comparisons(
        comparison in comparison_strategy(),
        constant in 0u64..=0xFFFF,
        value in 0u64..=0xFFFF,
    ) {
        prop_assume!(!is_constant(comparison, constant, 16));
        let formula = compile("a", comparison, constant, 16).unwrap();
        let tree = AccessTree::parse(&formula).unwrap();
        prop_assert_eq!(satisfied(&tree, value, 16), holds(comparison, value, constant));
    }

    #[test]
    fn prop_32_bit_comparisons(
        comparison in comparison_strategy(),
        constant in 0u64..=0xFFFF_FFFF,
        value in 0u64..=0xFFFF_FFFF,
    ) {
        prop_assume!(!is_constant(comparison, constant, 32));
        let formula = compile("a", comparison, constant, 32).unwrap();
        let tree = AccessTree::parse(&formula).unwrap();
        prop_assert_eq!(satisfied(&tree, value, 32), holds(comparison, value, constant));
    }

    #[test]
    fn prop_32_bit_near_constant(
        comparison in comparison_strategy(),
        constant in 0u64..=0xFFFF_FFFF,
        delta in -2i64..=2,
    ) {
        prop_assume!(!is_constant(comparison, constant, 32));
        let value = constant as i64 + delta;
        prop_assume!((0..=0xFFFF_FFFF).contains(&value));
        let value = value as u64;
        let formula = compile("a", comparison, constant, 32).unwrap();
        let tree = AccessTree::parse(&formula).unwrap();
        prop_assert_eq!(satisfied(&tree, value, 32), holds(comparison, value, constant));
    }
}
