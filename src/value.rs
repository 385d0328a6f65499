//! Compile-time values for SIML
//!
//! Evaluating an expression yields either an object in the heap (a leaf,
//! namespace, function, ...) or a residual expression that can only be
//! computed while the simulation runs.

use crate::ast::{InfixOp, PrefixOp};
use crate::heap::Handle;
use crate::residual::RExpr;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// The built-in scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScalarKind {
    Float,
    String,
    Bool,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Float => "Float",
            ScalarKind::String => "String",
            ScalarKind::Bool => "Bool",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Payload of a known leaf
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Float(f64),
    String(String),
    Bool(bool),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Scalar::Float(_) => ScalarKind::Float,
            Scalar::String(_) => ScalarKind::String,
            Scalar::Bool(_) => ScalarKind::Bool,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Float(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Scalar::String(s) => write!(f, "{:?}", s),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone)]
pub enum Value {
    /// Result of calls that return nothing
    None,
    Object(Handle),
    Residual(Rc<RExpr>),
}

impl Value {
    pub fn as_object(&self) -> Option<Handle> {
        match self {
            Value::Object(handle) => Some(*handle),
            _ => None,
        }
    }
}

/// Operators that user classes may define, looked up by their method name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialMethod {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Neg,
    Pos,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Assign,
}

impl SpecialMethod {
    pub fn method_name(self) -> &'static str {
        match self {
            SpecialMethod::Add => "__add__",
            SpecialMethod::Sub => "__sub__",
            SpecialMethod::Mul => "__mul__",
            SpecialMethod::Div => "__div__",
            SpecialMethod::Mod => "__mod__",
            SpecialMethod::Pow => "__pow__",
            SpecialMethod::Neg => "__neg__",
            SpecialMethod::Pos => "__pos__",
            SpecialMethod::Not => "__not__",
            SpecialMethod::Eq => "__eq__",
            SpecialMethod::Ne => "__ne__",
            SpecialMethod::Lt => "__lt__",
            SpecialMethod::Le => "__le__",
            SpecialMethod::Gt => "__gt__",
            SpecialMethod::Ge => "__ge__",
            SpecialMethod::And => "__and__",
            SpecialMethod::Or => "__or__",
            SpecialMethod::Assign => "__assign__",
        }
    }
}

/// Result kind of `left op right`, or `None` if the operands don't support it.
pub fn infix_kind(op: InfixOp, left: ScalarKind, right: ScalarKind) -> Option<ScalarKind> {
    use ScalarKind::*;
    match (op, left, right) {
        (InfixOp::Add, Float, Float) | (InfixOp::Add, String, String) => Some(left),
        (InfixOp::Sub | InfixOp::Mul | InfixOp::Div | InfixOp::Mod | InfixOp::Pow, Float, Float) => {
            Some(Float)
        }
        (InfixOp::Eq | InfixOp::Ne, l, r) if l == r => Some(Bool),
        (InfixOp::Lt | InfixOp::Le | InfixOp::Gt | InfixOp::Ge, Float, Float) => Some(Bool),
        (InfixOp::And | InfixOp::Or, Bool, Bool) => Some(Bool),
        _ => None,
    }
}

pub fn prefix_kind(op: PrefixOp, operand: ScalarKind) -> Option<ScalarKind> {
    match (op, operand) {
        (PrefixOp::Neg | PrefixOp::Pos, ScalarKind::Float) => Some(ScalarKind::Float),
        (PrefixOp::Not, ScalarKind::Bool) => Some(ScalarKind::Bool),
        _ => None,
    }
}

/// Apply an infix operator to two known values.
pub fn fold_infix(op: InfixOp, left: &Scalar, right: &Scalar) -> Option<Scalar> {
    use Scalar::*;
    let result = match (op, left, right) {
        (InfixOp::Add, Float(a), Float(b)) => Float(a + b),
        (InfixOp::Add, String(a), String(b)) => String(format!("{}{}", a, b)),
        (InfixOp::Sub, Float(a), Float(b)) => Float(a - b),
        (InfixOp::Mul, Float(a), Float(b)) => Float(a * b),
        (InfixOp::Div, Float(a), Float(b)) => Float(a / b),
        (InfixOp::Mod, Float(a), Float(b)) => Float(a % b),
        (InfixOp::Pow, Float(a), Float(b)) => Float(a.powf(*b)),
        (InfixOp::Eq, a, b) if a.kind() == b.kind() => Bool(a == b),
        (InfixOp::Ne, a, b) if a.kind() == b.kind() => Bool(a != b),
        (InfixOp::Lt, Float(a), Float(b)) => Bool(a < b),
        (InfixOp::Le, Float(a), Float(b)) => Bool(a <= b),
        (InfixOp::Gt, Float(a), Float(b)) => Bool(a > b),
        (InfixOp::Ge, Float(a), Float(b)) => Bool(a >= b),
        (InfixOp::And, Bool(a), Bool(b)) => Bool(*a && *b),
        (InfixOp::Or, Bool(a), Bool(b)) => Bool(*a || *b),
        _ => return None,
    };
    Some(result)
}

pub fn fold_prefix(op: PrefixOp, operand: &Scalar) -> Option<Scalar> {
    match (op, operand) {
        (PrefixOp::Neg, Scalar::Float(a)) => Some(Scalar::Float(-a)),
        (PrefixOp::Pos, Scalar::Float(a)) => Some(Scalar::Float(*a)),
        (PrefixOp::Not, Scalar::Bool(b)) => Some(Scalar::Bool(!b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_arithmetic() {
        let two = Scalar::Float(2.0);
        assert_eq!(fold_infix(InfixOp::Mul, &two, &two), Some(Scalar::Float(4.0)));
        assert_eq!(fold_infix(InfixOp::Pow, &two, &Scalar::Float(3.0)), Some(Scalar::Float(8.0)));
        assert_eq!(fold_infix(InfixOp::Mod, &Scalar::Float(7.0), &two), Some(Scalar::Float(1.0)));
        assert_eq!(fold_infix(InfixOp::Lt, &two, &Scalar::Float(3.0)), Some(Scalar::Bool(true)));
    }

    #[test]
    fn test_fold_rejects_mixed_kinds() {
        let two = Scalar::Float(2.0);
        let text = Scalar::String("a".into());
        assert_eq!(fold_infix(InfixOp::Add, &two, &text), None);
        assert_eq!(fold_infix(InfixOp::Eq, &two, &text), None);
        assert_eq!(infix_kind(InfixOp::Sub, ScalarKind::String, ScalarKind::String), None);
    }

    #[test]
    fn test_string_concat_and_logic() {
        let a = Scalar::String("a".into());
        let b = Scalar::String("b".into());
        assert_eq!(fold_infix(InfixOp::Add, &a, &b), Some(Scalar::String("ab".into())));
        assert_eq!(
            fold_infix(InfixOp::And, &Scalar::Bool(true), &Scalar::Bool(false)),
            Some(Scalar::Bool(false))
        );
        assert_eq!(fold_prefix(PrefixOp::Not, &Scalar::Bool(false)), Some(Scalar::Bool(true)));
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(Scalar::Float(4.0).to_string(), "4.0");
        assert_eq!(Scalar::Float(0.25).to_string(), "0.25");
        assert_eq!(Scalar::String("x".into()).to_string(), "\"x\"");
    }
}
