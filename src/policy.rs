//! Numeric predicate compiler.
//!
//! Attribute-based schemes only understand conjunctions and disjunctions of
//! atomic attribute literals. This module encodes integer attributes as a
//! "bag of bits": an `n`-bit value `v` of attribute `name` becomes `n` bit
//! markers, one per bit, e.g. for `a = 5` on four bits:
//!
//! ```text
//! a:xxx1  a:xx0x  a:x1xx  a:0xxx
//! ```
//!
//! A comparison such as `a < 11` is then compiled into a boolean formula over
//! those markers which is satisfied exactly by the values below 11:
//!
//! ```text
//! (((a:xxx0 or a:xx0x) and a:x0xx) or a:0xxx)
//! ```
//!
//! Compilation is pure: no I/O and no randomness.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Wildcard used for the bit positions a marker does not constrain.
pub const WILDCARD: char = 'x';

/// Word size used when callers do not pick one.
pub const DEFAULT_BIT_WIDTH: u32 = 32;

/// Strict comparison directions handled natively by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    GreaterThan,
    LessThan,
}

/// All comparison operators accepted by [`compile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
}

impl From<Direction> for Comparison {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::GreaterThan => Comparison::Gt,
            Direction::LessThan => Comparison::Lt,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Comparison::Lt => "<",
            Comparison::Gt => ">",
            Comparison::Le => "<=",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
        };
        f.write_str(op)
    }
}

impl FromStr for Comparison {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "<" => Ok(Comparison::Lt),
            ">" => Ok(Comparison::Gt),
            "<=" => Ok(Comparison::Le),
            ">=" => Ok(Comparison::Ge),
            "==" | "=" => Ok(Comparison::Eq),
            other => Err(Error::InvalidArgument(format!(
                "unknown comparison operator `{other}`"
            ))),
        }
    }
}

/// Binary gate of a policy tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// 2-of-2
    And,
    /// 1-of-2
    Or,
}

impl Gate {
    pub fn threshold(self) -> usize {
        match self {
            Gate::And => 2,
            Gate::Or => 1,
        }
    }
}

/// Boolean formula built by the compiler.
///
/// Every gate has exactly two children. Trees are built bottom-up and
/// rendered to text straight away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyTree {
    Leaf(String),
    Gate {
        gate: Gate,
        left: Box<PolicyTree>,
        right: Box<PolicyTree>,
    },
}

impl PolicyTree {
    pub fn leaf(literal: impl Into<String>) -> Self {
        PolicyTree::Leaf(literal.into())
    }

    pub fn gate(gate: Gate, left: PolicyTree, right: PolicyTree) -> Self {
        PolicyTree::Gate {
            gate,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl fmt::Display for PolicyTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyTree::Leaf(literal) => f.write_str(literal),
            PolicyTree::Gate { gate, left, right } => {
                let op = if gate.threshold() == 2 { "and" } else { "or" };
                write!(f, "({left} {op} {right})")
            }
        }
    }
}

/// Build the marker for bit `position` (0 = least significant) of the
/// `bit_width`-bit representation of `name` having value `bit`.
///
/// The marker text is most-significant-bit first, so position 0 is the
/// right-most character:
///
/// ```
/// use abe_envelope::policy::bit_marker;
/// assert_eq!(bit_marker("a", 4, 1, false), "a:xx0x");
/// ```
pub fn bit_marker(name: &str, bit_width: u32, position: u32, bit: bool) -> String {
    let mut marker = String::with_capacity(name.len() + 1 + bit_width as usize);
    marker.push_str(name);
    marker.push(':');
    for p in (0..bit_width).rev() {
        if p == position {
            marker.push(if bit { '1' } else { '0' });
        } else {
            marker.push(WILDCARD);
        }
    }
    marker
}

/// Compile `name <direction> constant` into a policy string over bit markers.
///
/// # Arguments
/// * `name` - Attribute name, non-empty, no whitespace or parentheses
/// * `direction` - `GreaterThan` or `LessThan`
/// * `constant` - Right-hand side, must satisfy `constant < 2^bit_width`
/// * `bit_width` - Word size in `1..=64`
///
/// # Returns
/// * The parenthesized formula, or `DegenerateComparison` when the comparison
///   is constant over all `bit_width`-bit values (`> 2^n - 1`, `< 0`).
///
/// `<=` and `>=` are rewritten by [`compile`] before reaching this function.
pub fn compile_comparison(
    name: &str,
    direction: Direction,
    constant: u64,
    bit_width: u32,
) -> Result<String> {
    Ok(comparison_tree(name, direction, constant, bit_width)?.to_string())
}

/// Tree form of [`compile_comparison`].
pub fn comparison_tree(
    name: &str,
    direction: Direction,
    constant: u64,
    bit_width: u32,
) -> Result<PolicyTree> {
    validate(name, constant, bit_width)?;

    let greater = direction == Direction::GreaterThan;

    // Right-most position whose bit leaves room for the comparison to hold.
    let start = (0..bit_width)
        .find(|&p| bit_at(constant, p) != greater)
        .ok_or_else(|| Error::DegenerateComparison {
            name: name.to_string(),
            comparison: direction.into(),
            constant,
            bit_width,
        })?;

    // Leaves always carry the direction's bit; the constant only picks the gate.
    let mut tree = PolicyTree::leaf(bit_marker(name, bit_width, start, greater));
    for position in start + 1..bit_width {
        let gate = if bit_at(constant, position) == greater {
            Gate::And
        } else {
            Gate::Or
        };
        let leaf = PolicyTree::leaf(bit_marker(name, bit_width, position, greater));
        tree = PolicyTree::gate(gate, tree, leaf);
    }
    Ok(tree)
}

/// Bit markers describing `name = value`, ordered from bit 0 upwards.
///
/// This is the attribute-set counterpart of [`compile_comparison`].
pub fn compile_assignment(name: &str, value: u64, bit_width: u32) -> Result<Vec<String>> {
    validate(name, value, bit_width)?;
    Ok((0..bit_width)
        .map(|p| bit_marker(name, bit_width, p, bit_at(value, p)))
        .collect())
}

/// Compile any [`Comparison`], rewriting the non-strict and equality forms.
///
/// * `a <= c` becomes `a < c + 1`
/// * `a >= c` becomes `a > c - 1`
/// * `a == c` becomes the conjunction of the bit markers of `c`
pub fn compile(name: &str, comparison: Comparison, constant: u64, bit_width: u32) -> Result<String> {
    validate(name, constant, bit_width)?;

    let degenerate = || Error::DegenerateComparison {
        name: name.to_string(),
        comparison,
        constant,
        bit_width,
    };

    match comparison {
        Comparison::Lt => compile_comparison(name, Direction::LessThan, constant, bit_width),
        Comparison::Gt => compile_comparison(name, Direction::GreaterThan, constant, bit_width),
        Comparison::Le => {
            let bumped = constant
                .checked_add(1)
                .filter(|&c| c <= max_value(bit_width))
                .ok_or_else(degenerate)?;
            compile_comparison(name, Direction::LessThan, bumped, bit_width)
        }
        Comparison::Ge => {
            let lowered = constant.checked_sub(1).ok_or_else(degenerate)?;
            compile_comparison(name, Direction::GreaterThan, lowered, bit_width)
        }
        Comparison::Eq => Ok(equality_tree(name, constant, bit_width)?.to_string()),
    }
}

fn equality_tree(name: &str, value: u64, bit_width: u32) -> Result<PolicyTree> {
    let mut literals = compile_assignment(name, value, bit_width)?.into_iter();
    let first = literals
        .next()
        .ok_or_else(|| Error::InvalidArgument("bit width must be positive".to_string()))?;
    Ok(literals.fold(PolicyTree::leaf(first), |tree, literal| {
        PolicyTree::gate(Gate::And, tree, PolicyTree::leaf(literal))
    }))
}

/// Largest value representable on `bit_width` bits.
pub fn max_value(bit_width: u32) -> u64 {
    if bit_width >= 64 {
        u64::MAX
    } else {
        (1u64 << bit_width) - 1
    }
}

fn bit_at(value: u64, position: u32) -> bool {
    (value >> position) & 1 == 1
}

fn validate(name: &str, value: u64, bit_width: u32) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("attribute name is empty".to_string()));
    }
    if name
        .chars()
        .any(|c| c.is_whitespace() || c == '(' || c == ')')
    {
        return Err(Error::InvalidArgument(format!(
            "attribute name `{name}` contains whitespace or parentheses"
        )));
    }
    if bit_width == 0 || bit_width > 64 {
        return Err(Error::InvalidArgument(format!(
            "bit width must be in 1..=64, got {bit_width}"
        )));
    }
    if value > max_value(bit_width) {
        return Err(Error::InvalidArgument(format!(
            "{value} does not fit in {bit_width} bits"
        )));
    }
    Ok(())
}
