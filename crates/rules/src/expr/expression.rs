//! Tree nodes: [`Side`] and the binary [`Expression`].
//!
//! Every node caches the value of its last `evaluate` call. Result
//! construction reads those caches back, so a tree must not be evaluated
//! by two passes at once (`evaluate` takes `&mut self`, which enforces it).

use chrono::NaiveDateTime;

use tsalarm_core::PositiveResult;

use super::function::Function;
use super::message::substitute;
use super::operator::{is_truthy, Operator};

/// Per-test data needed while building results.
#[derive(Debug, Clone, Copy)]
pub struct PositiveContext<'a> {
    pub test_id: &'a str,
    /// Top-level message configured on the owning test.
    pub message: Option<&'a str>,
}

/// A tree node: an operator node or a leaf.
#[derive(Debug, Clone)]
pub enum Side {
    Expression(Box<Expression>),
    Function(Function),
}

impl From<Expression> for Side {
    fn from(e: Expression) -> Self {
        Side::Expression(Box::new(e))
    }
}

impl From<Function> for Side {
    fn from(f: Function) -> Self {
        Side::Function(f)
    }
}

impl Side {
    pub fn evaluate(&mut self, t: NaiveDateTime) -> f64 {
        match self {
            Side::Expression(e) => e.evaluate(t),
            Side::Function(f) => f.evaluate(t),
        }
    }

    pub fn last_result(&self) -> f64 {
        match self {
            Side::Expression(e) => e.last_result(),
            Side::Function(f) => f.last_result(),
        }
    }

    pub fn build_positive_result_message(&self, t: NaiveDateTime) -> String {
        match self {
            Side::Expression(e) => e.build_positive_result_message(t),
            Side::Function(f) => f.build_positive_result_message(t),
        }
    }

    /// No-op on leaves.
    pub fn evaluate_positive_result(
        &self,
        ctx: PositiveContext<'_>,
        out: &mut Vec<PositiveResult>,
        t: NaiveDateTime,
        level: u32,
    ) {
        if let Side::Expression(e) = self {
            e.evaluate_positive_result(ctx, out, t, level);
        }
    }

    fn collect_functions<'a>(&'a self, out: &mut Vec<&'a Function>) {
        match self {
            Side::Expression(e) => {
                e.left.collect_functions(out);
                e.right.collect_functions(out);
            }
            Side::Function(f) => out.push(f),
        }
    }

    fn collect_functions_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Function>) {
        match self {
            Side::Expression(e) => {
                let Expression { left, right, .. } = &mut **e;
                left.collect_functions_mut(out);
                right.collect_functions_mut(out);
            }
            Side::Function(f) => out.push(f),
        }
    }

    /// Text used when this side appears as an operand of its parent.
    fn operand_message(&self, t: NaiveDateTime) -> String {
        match self {
            Side::Expression(e) if e.message.is_none() => {
                format!("({})", e.build_positive_result_message(t))
            }
            _ => self.build_positive_result_message(t),
        }
    }
}

/// Binary operator node owning both operands.
#[derive(Debug, Clone)]
pub struct Expression {
    op: Operator,
    left: Side,
    right: Side,
    message: Option<String>,
    last_result: f64,
}

impl Expression {
    pub fn new(op: Operator, left: impl Into<Side>, right: impl Into<Side>) -> Self {
        Self {
            op,
            left: left.into(),
            right: right.into(),
            message: None,
            last_result: f64::NAN,
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn left(&self) -> &Side {
        &self.left
    }

    pub fn right(&self) -> &Side {
        &self.right
    }

    pub fn last_result(&self) -> f64 {
        self.last_result
    }

    /// Both operands are always evaluated so their caches are current.
    pub fn evaluate(&mut self, t: NaiveDateTime) -> f64 {
        let left = self.left.evaluate(t);
        let right = self.right.evaluate(t);
        self.last_result = self.op.apply(left, right);
        self.last_result
    }

    pub fn build_positive_result_message(&self, t: NaiveDateTime) -> String {
        match &self.message {
            Some(template) => substitute(template, t, self.last_result, &self.identifiers()),
            None => format!(
                "{} {} {}",
                self.left.operand_message(t),
                self.op.symbol(),
                self.right.operand_message(t)
            ),
        }
    }

    /// Append this subtree's results to `out`, children first.
    ///
    /// Only operator children whose cached value is truthy are visited.
    /// At level 0 with a test message, children go two levels down and a
    /// level-1 copy carrying the subtree text precedes the root result,
    /// which carries the test message instead.
    pub fn evaluate_positive_result(
        &self,
        ctx: PositiveContext<'_>,
        out: &mut Vec<PositiveResult>,
        t: NaiveDateTime,
        level: u32,
    ) {
        let root_message = ctx.message.filter(|_| level == 0);
        let increment = if root_message.is_some() { 2 } else { 1 };

        for child in [&self.left, &self.right] {
            if let Side::Expression(e) = child {
                if is_truthy(e.last_result) {
                    e.evaluate_positive_result(ctx, out, t, level + increment);
                }
            }
        }

        let subtree = self.build_positive_result_message(t);
        let result = |level: u32, message: String| PositiveResult {
            level,
            left_value: self.left.last_result(),
            right_value: self.right.last_result(),
            message,
            timestamp: t,
            test_id: ctx.test_id.to_string(),
        };

        match root_message {
            Some(template) => {
                out.push(result(level + 1, subtree));
                let message = substitute(template, t, self.last_result, &self.identifiers());
                out.push(result(level, message));
            }
            None => out.push(result(level, subtree)),
        }
    }

    /// Leaves of this subtree, left to right.
    pub fn functions(&self) -> Vec<&Function> {
        let mut out = Vec::new();
        self.left.collect_functions(&mut out);
        self.right.collect_functions(&mut out);
        out
    }

    /// Input identifiers of all leaves, in tree order.
    fn identifiers(&self) -> Vec<&str> {
        self.functions()
            .into_iter()
            .flat_map(|f| f.inputs().iter().map(String::as_str))
            .collect()
    }

    pub fn functions_mut(&mut self) -> Vec<&mut Function> {
        let mut out = Vec::new();
        self.left.collect_functions_mut(&mut out);
        self.right.collect_functions_mut(&mut out);
        out
    }

    /// Identifiers in this subtree carrying the wildcard marker.
    pub fn wildcard_identifiers(&self) -> Vec<String> {
        self.functions()
            .into_iter()
            .flat_map(|f| {
                f.wildcard_positions()
                    .into_iter()
                    .map(|pos| f.inputs()[pos].clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Bind every wildcard identifier in the subtree to `capture`.
    pub fn set_wildcards(&mut self, capture: &str) {
        for f in self.functions_mut() {
            f.set_wildcards(capture);
        }
    }
}
