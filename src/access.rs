//! Access structures used by the attribute-based schemes.
//!
//! Policies are boolean formulas over attribute tokens:
//!
//! ```text
//! (doctor and cardiology) or (admin and age:1xxxxxxx)
//! ```
//!
//! `and` binds tighter than `or`, keywords are case-insensitive and anything
//! else that is not a parenthesis or whitespace is an attribute. A chain such
//! as `a and b and c` becomes a single 3-of-3 threshold node.
//!
//! Besides parsing and evaluation, the tree carries the secret-sharing
//! machinery the schemes need: Shamir shares down to the leaves and the
//! Lagrange coefficients to recombine them.

use std::fmt;

use ark_ff::{Field, One, UniformRand, Zero};
use rand::Rng;

use crate::error::{Error, Result};
use crate::types::Scalar;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessTree {
    Attribute(String),
    /// `k`-of-`children.len()` gate.
    Threshold { k: usize, children: Vec<AccessTree> },
}

impl AccessTree {
    /// Parse a policy string.
    pub fn parse(policy: &str) -> Result<Self> {
        let tokens = tokenize(policy);
        if tokens.is_empty() {
            return Err(Error::MalformedPolicy("policy is empty".to_string()));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let tree = parser.expr()?;
        if let Some(token) = parser.peek() {
            return Err(Error::MalformedPolicy(format!(
                "unexpected `{}` at token {}",
                token.text(),
                parser.pos
            )));
        }
        Ok(tree)
    }

    /// Evaluate the formula, `has` telling whether an attribute is held.
    pub fn is_satisfied_by<F: Fn(&str) -> bool>(&self, has: F) -> bool {
        self.satisfied(&has)
    }

    fn satisfied<F: Fn(&str) -> bool>(&self, has: &F) -> bool {
        match self {
            AccessTree::Attribute(name) => has(name),
            AccessTree::Threshold { k, children } => {
                children.iter().filter(|c| c.satisfied(has)).take(*k).count() == *k
            }
        }
    }

    /// Leaf attributes in depth-first, left-to-right order.
    ///
    /// Per-leaf ciphertext and key components are stored in this order.
    pub fn leaves(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            AccessTree::Attribute(name) => out.push(name),
            AccessTree::Threshold { children, .. } => {
                for child in children {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Split `secret` over the tree, one share per leaf (in [`leaves`] order).
    ///
    /// Each gate samples a polynomial `q` of degree `k - 1` with `q(0)` equal
    /// to the value it received and hands `q(i)` to its `i`-th child.
    ///
    /// [`leaves`]: AccessTree::leaves
    pub fn share<R: Rng + ?Sized>(&self, secret: Scalar, rng: &mut R) -> Vec<Scalar> {
        let mut shares = Vec::new();
        self.share_into(secret, rng, &mut shares);
        shares
    }

    fn share_into<R: Rng + ?Sized>(&self, secret: Scalar, rng: &mut R, out: &mut Vec<Scalar>) {
        match self {
            AccessTree::Attribute(_) => out.push(secret),
            AccessTree::Threshold { k, children } => {
                let mut coefficients = Vec::with_capacity(*k);
                coefficients.push(secret);
                for _ in 1..*k {
                    coefficients.push(Scalar::rand(rng));
                }
                for (i, child) in children.iter().enumerate() {
                    let share = evaluate(&coefficients, Scalar::from((i + 1) as u64));
                    child.share_into(share, rng, out);
                }
            }
        }
    }

    /// Find a satisfying set of leaves and the coefficient each share must be
    /// multiplied by so that the weighted sum equals the shared secret.
    ///
    /// # Returns
    /// * `Some(plan)` - pairs of (leaf index, coefficient)
    /// * `None` - the attributes do not satisfy the tree
    pub fn reconstruction<F: Fn(&str) -> bool>(&self, has: F) -> Option<Vec<(usize, Scalar)>> {
        let mut next_leaf = 0;
        self.plan(&has, &mut next_leaf)
    }

    fn plan<F: Fn(&str) -> bool>(
        &self,
        has: &F,
        next_leaf: &mut usize,
    ) -> Option<Vec<(usize, Scalar)>> {
        match self {
            AccessTree::Attribute(name) => {
                let index = *next_leaf;
                *next_leaf += 1;
                has(name).then(|| vec![(index, Scalar::one())])
            }
            AccessTree::Threshold { k, children } => {
                // Every child is visited so leaf numbering stays aligned.
                let child_plans: Vec<_> = children
                    .iter()
                    .map(|child| child.plan(has, next_leaf))
                    .collect();

                let chosen: Vec<(u64, Vec<(usize, Scalar)>)> = child_plans
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, plan)| plan.map(|p| ((i + 1) as u64, p)))
                    .take(*k)
                    .collect();
                if chosen.len() < *k {
                    return None;
                }

                let indices: Vec<u64> = chosen.iter().map(|(i, _)| *i).collect();
                let mut combined = Vec::new();
                for (i, plan) in chosen {
                    let delta = lagrange_at_zero(i, &indices);
                    combined.extend(plan.into_iter().map(|(leaf, c)| (leaf, c * delta)));
                }
                Some(combined)
            }
        }
    }
}

impl fmt::Display for AccessTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessTree::Attribute(name) => f.write_str(name),
            AccessTree::Threshold { k, children } => {
                let op = if *k == children.len() { " and " } else { " or " };
                f.write_str("(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(op)?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Reject tokens the policy parser would split or misread.
pub fn validate_attribute(attribute: &str) -> Result<()> {
    let keyword = attribute.eq_ignore_ascii_case("and") || attribute.eq_ignore_ascii_case("or");
    if attribute.is_empty()
        || keyword
        || attribute
            .chars()
            .any(|c| c.is_whitespace() || c == '(' || c == ')')
    {
        return Err(Error::InvalidArgument(format!(
            "`{attribute}` is not a valid attribute"
        )));
    }
    Ok(())
}

/// Horner evaluation of `coefficients[0] + coefficients[1] x + ...`.
fn evaluate(coefficients: &[Scalar], x: Scalar) -> Scalar {
    coefficients
        .iter()
        .rev()
        .fold(Scalar::zero(), |acc, c| acc * x + c)
}

/// `Δ_i(0) = Π_{j ≠ i} j / (j - i)` over the chosen indices.
fn lagrange_at_zero(i: u64, indices: &[u64]) -> Scalar {
    let xi = Scalar::from(i);
    let mut numerator = Scalar::one();
    let mut denominator = Scalar::one();
    for &j in indices.iter().filter(|&&j| j != i) {
        let xj = Scalar::from(j);
        numerator *= xj;
        denominator *= xj - xi;
    }
    // Indices are distinct and non-zero, so the denominator is invertible.
    numerator * denominator.inverse().unwrap_or_else(Scalar::zero)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    And,
    Or,
    Attribute(String),
}

impl Token {
    fn text(&self) -> &str {
        match self {
            Token::Open => "(",
            Token::Close => ")",
            Token::And => "and",
            Token::Or => "or",
            Token::Attribute(name) => name,
        }
    }
}

fn tokenize(policy: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut word = String::new();

    fn flush(word: &mut String, tokens: &mut Vec<Token>) {
        if word.is_empty() {
            return;
        }
        let token = if word.eq_ignore_ascii_case("and") {
            Token::And
        } else if word.eq_ignore_ascii_case("or") {
            Token::Or
        } else {
            Token::Attribute(word.clone())
        };
        tokens.push(token);
        word.clear();
    }

    for c in policy.chars() {
        match c {
            '(' | ')' => {
                flush(&mut word, &mut tokens);
                tokens.push(if c == '(' { Token::Open } else { Token::Close });
            }
            c if c.is_whitespace() => flush(&mut word, &mut tokens),
            c => word.push(c),
        }
    }
    flush(&mut word, &mut tokens);
    tokens
}

/// Deepest parenthesis nesting accepted. A compiled 64-bit comparison
/// nests 63 levels.
pub const MAX_NESTING: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<AccessTree> {
        let mut operands = vec![self.term()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            operands.push(self.term()?);
        }
        Ok(gate(1, operands))
    }

    fn term(&mut self) -> Result<AccessTree> {
        let mut operands = vec![self.factor()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            operands.push(self.factor()?);
        }
        let k = operands.len();
        Ok(gate(k, operands))
    }

    fn factor(&mut self) -> Result<AccessTree> {
        match self.next() {
            Some(Token::Attribute(name)) => Ok(AccessTree::Attribute(name)),
            Some(Token::Open) => {
                if self.depth == MAX_NESTING {
                    return Err(Error::MalformedPolicy(format!(
                        "parentheses nested deeper than {MAX_NESTING}"
                    )));
                }
                self.depth += 1;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    Some(other) => Err(Error::MalformedPolicy(format!(
                        "expected `)`, found `{}`",
                        other.text()
                    ))),
                    None => Err(Error::MalformedPolicy("unbalanced `(`".to_string())),
                }
            }
            Some(other) => Err(Error::MalformedPolicy(format!(
                "expected an attribute or `(`, found `{}`",
                other.text()
            ))),
            None => Err(Error::MalformedPolicy(
                "policy ends where an attribute was expected".to_string(),
            )),
        }
    }
}

fn gate(k: usize, mut operands: Vec<AccessTree>) -> AccessTree {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        AccessTree::Threshold {
            k,
            children: operands,
        }
    }
}
