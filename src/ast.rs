//! Abstract Syntax Tree definitions for SIML
//!
//! The tree is produced by the external parser and handed over as JSON.
//! Every node carries the location where its source text starts.

use crate::location::Location;
use crate::value::SpecialMethod;
use serde::{Deserialize, Serialize};
use std::fmt;

fn is_default_location(loc: &Location) -> bool {
    *loc == Location::default()
}

/// Literal constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Float(f64),
    String(String),
    None,
}

/// Expression nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    /// Identifier: foo
    Ident {
        name: String,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Attribute access: obj.attr
    Attr {
        object: Box<Expr>,
        name: String,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Literal: 2.5, "text", true, none
    Literal {
        value: Literal,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Prefix operation: -x, not b, $x
    Prefix {
        op: PrefixOp,
        operand: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Infix operation: a + b
    Infix {
        op: InfixOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Call: f(a, b=2)
    Call {
        callee: Box<Expr>,
        #[serde(default)]
        args: Vec<Arg>,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Grouping: (expr)
    Paren {
        expr: Box<Expr>,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },
}

/// Call argument, optionally given by keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: Expr,
}

impl Expr {
    pub fn location(&self) -> &Location {
        match self {
            Expr::Ident { loc, .. }
            | Expr::Attr { loc, .. }
            | Expr::Literal { loc, .. }
            | Expr::Prefix { loc, .. }
            | Expr::Infix { loc, .. }
            | Expr::Call { loc, .. }
            | Expr::Paren { loc, .. } => loc,
        }
    }

    pub fn ident(name: &str) -> Expr {
        Expr::Ident {
            name: name.to_string(),
            loc: Location::default(),
        }
    }

    /// Dotted path such as `this.sub.x`
    pub fn path(dotted: &str) -> Expr {
        let mut parts = dotted.split('.');
        let first = parts.next().unwrap_or_default();
        parts.fold(Expr::ident(first), |object, name| Expr::Attr {
            object: Box::new(object),
            name: name.to_string(),
            loc: Location::default(),
        })
    }

    pub fn float(value: f64) -> Expr {
        Expr::literal(Literal::Float(value))
    }

    pub fn string(value: &str) -> Expr {
        Expr::literal(Literal::String(value.to_string()))
    }

    pub fn bool(value: bool) -> Expr {
        Expr::literal(Literal::Bool(value))
    }

    pub fn literal(value: Literal) -> Expr {
        Expr::Literal {
            value,
            loc: Location::default(),
        }
    }

    pub fn prefix(op: PrefixOp, operand: Expr) -> Expr {
        Expr::Prefix {
            op,
            operand: Box::new(operand),
            loc: Location::default(),
        }
    }

    pub fn derivative(operand: Expr) -> Expr {
        Expr::prefix(PrefixOp::Derivative, operand)
    }

    pub fn infix(left: Expr, op: InfixOp, right: Expr) -> Expr {
        Expr::Infix {
            op,
            left: Box::new(left),
            right: Box::new(right),
            loc: Location::default(),
        }
    }

    pub fn call(callee: Expr, args: Vec<Arg>) -> Expr {
        Expr::Call {
            callee: Box::new(callee),
            args,
            loc: Location::default(),
        }
    }

    pub fn paren(expr: Expr) -> Expr {
        Expr::Paren {
            expr: Box::new(expr),
            loc: Location::default(),
        }
    }

    pub fn at(mut self, location: Location) -> Expr {
        match &mut self {
            Expr::Ident { loc, .. }
            | Expr::Attr { loc, .. }
            | Expr::Literal { loc, .. }
            | Expr::Prefix { loc, .. }
            | Expr::Infix { loc, .. }
            | Expr::Call { loc, .. }
            | Expr::Paren { loc, .. } => *loc = location,
        }
        self
    }
}

impl Arg {
    pub fn positional(value: Expr) -> Arg {
        Arg { name: None, value }
    }

    pub fn keyword(name: &str, value: Expr) -> Arg {
        Arg {
            name: Some(name.to_string()),
            value,
        }
    }
}

/// Infix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl InfixOp {
    pub fn special_method(self) -> SpecialMethod {
        match self {
            InfixOp::Add => SpecialMethod::Add,
            InfixOp::Sub => SpecialMethod::Sub,
            InfixOp::Mul => SpecialMethod::Mul,
            InfixOp::Div => SpecialMethod::Div,
            InfixOp::Mod => SpecialMethod::Mod,
            InfixOp::Pow => SpecialMethod::Pow,
            InfixOp::Eq => SpecialMethod::Eq,
            InfixOp::Ne => SpecialMethod::Ne,
            InfixOp::Lt => SpecialMethod::Lt,
            InfixOp::Le => SpecialMethod::Le,
            InfixOp::Gt => SpecialMethod::Gt,
            InfixOp::Ge => SpecialMethod::Ge,
            InfixOp::And => SpecialMethod::And,
            InfixOp::Or => SpecialMethod::Or,
        }
    }
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfixOp::Add => write!(f, "+"),
            InfixOp::Sub => write!(f, "-"),
            InfixOp::Mul => write!(f, "*"),
            InfixOp::Div => write!(f, "/"),
            InfixOp::Mod => write!(f, "%"),
            InfixOp::Pow => write!(f, "**"),
            InfixOp::Eq => write!(f, "=="),
            InfixOp::Ne => write!(f, "!="),
            InfixOp::Lt => write!(f, "<"),
            InfixOp::Le => write!(f, "<="),
            InfixOp::Gt => write!(f, ">"),
            InfixOp::Ge => write!(f, ">="),
            InfixOp::And => write!(f, "and"),
            InfixOp::Or => write!(f, "or"),
        }
    }
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixOp {
    Neg,
    Pos,
    Not,
    /// `$x`, the time derivative
    Derivative,
}

impl PrefixOp {
    pub fn special_method(self) -> Option<SpecialMethod> {
        match self {
            PrefixOp::Neg => Some(SpecialMethod::Neg),
            PrefixOp::Pos => Some(SpecialMethod::Pos),
            PrefixOp::Not => Some(SpecialMethod::Not),
            PrefixOp::Derivative => None,
        }
    }
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Neg => write!(f, "-"),
            PrefixOp::Pos => write!(f, "+"),
            PrefixOp::Not => write!(f, "not "),
            PrefixOp::Derivative => write!(f, "$"),
        }
    }
}

/// Role keyword of a data statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKeyword {
    Const,
    Param,
    Variable,
    RoleUnknown,
}

/// Formal parameter of a function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_annotation: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Expr>,
}

impl Param {
    pub fn new(name: &str) -> Param {
        Param {
            name: name.to_string(),
            type_annotation: None,
            default: None,
        }
    }

    pub fn typed(mut self, annotation: Expr) -> Param {
        self.type_annotation = Some(annotation);
        self
    }

    pub fn with_default(mut self, default: Expr) -> Param {
        self.default = Some(default);
        self
    }
}

/// One `if` / `elif` / `else` clause; `else` has no condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Expr>,
    pub body: Vec<Stmt>,
}

impl Clause {
    pub fn when(condition: Expr, body: Vec<Stmt>) -> Clause {
        Clause {
            condition: Some(condition),
            body,
        }
    }

    pub fn otherwise(body: Vec<Stmt>) -> Clause {
        Clause {
            condition: None,
            body,
        }
    }
}

/// Statement nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    /// Class definition: class Name: body
    Class {
        name: String,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Function definition: func name(params) -> Type: body
    Func {
        name: String,
        #[serde(default)]
        params: Vec<Param>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        return_type: Option<Expr>,
        body: Vec<Stmt>,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Data definition: data name: Class role = default
    Data {
        name: String,
        class: Expr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<RoleKeyword>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<Expr>,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Compile statement: compile name: Class
    Compile {
        class: Expr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Assignment: target = value
    Assign {
        target: Expr,
        value: Expr,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Conditional: if / elif / else
    If {
        clauses: Vec<Clause>,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    Pass {
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    Return {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Expr>,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },

    /// Expression statement, usually a call
    Expr {
        expr: Expr,
        #[serde(default, skip_serializing_if = "is_default_location")]
        loc: Location,
    },
}

impl Stmt {
    pub fn location(&self) -> &Location {
        match self {
            Stmt::Class { loc, .. }
            | Stmt::Func { loc, .. }
            | Stmt::Data { loc, .. }
            | Stmt::Compile { loc, .. }
            | Stmt::Assign { loc, .. }
            | Stmt::If { loc, .. }
            | Stmt::Pass { loc }
            | Stmt::Return { loc, .. }
            | Stmt::Expr { loc, .. } => loc,
        }
    }

    pub fn class(name: &str, body: Vec<Stmt>) -> Stmt {
        Stmt::Class {
            name: name.to_string(),
            body,
            loc: Location::default(),
        }
    }

    pub fn func(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Stmt {
        Stmt::Func {
            name: name.to_string(),
            params,
            return_type: None,
            body,
            loc: Location::default(),
        }
    }

    /// Method taking `this` plus the given parameters.
    pub fn method(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Stmt {
        let mut all = vec![Param::new("this")];
        all.extend(params);
        Stmt::func(name, all, body)
    }

    pub fn data(name: &str, class: &str, role: Option<RoleKeyword>) -> Stmt {
        Stmt::Data {
            name: name.to_string(),
            class: Expr::path(class),
            role,
            default: None,
            loc: Location::default(),
        }
    }

    pub fn compile(class: &str, name: &str) -> Stmt {
        Stmt::Compile {
            class: Expr::path(class),
            name: Some(name.to_string()),
            loc: Location::default(),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Stmt {
        Stmt::Assign {
            target,
            value,
            loc: Location::default(),
        }
    }

    pub fn if_(clauses: Vec<Clause>) -> Stmt {
        Stmt::If {
            clauses,
            loc: Location::default(),
        }
    }

    pub fn pass() -> Stmt {
        Stmt::Pass {
            loc: Location::default(),
        }
    }

    pub fn ret(value: Option<Expr>) -> Stmt {
        Stmt::Return {
            value,
            loc: Location::default(),
        }
    }

    pub fn expr(expr: Expr) -> Stmt {
        Stmt::Expr {
            expr,
            loc: Location::default(),
        }
    }

    pub fn at(mut self, location: Location) -> Stmt {
        match &mut self {
            Stmt::Class { loc, .. }
            | Stmt::Func { loc, .. }
            | Stmt::Data { loc, .. }
            | Stmt::Compile { loc, .. }
            | Stmt::Assign { loc, .. }
            | Stmt::If { loc, .. }
            | Stmt::Pass { loc }
            | Stmt::Return { loc, .. }
            | Stmt::Expr { loc, .. } => *loc = location,
        }
        self
    }
}

/// A complete source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub statements: Vec<Stmt>,
}

impl Module {
    pub fn new(name: &str, statements: Vec<Stmt>) -> Self {
        Self {
            name: name.to_string(),
            statements,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_from_json() {
        let json = r#"{
            "name": "model",
            "statements": [
                {"kind": "data", "name": "a", "class": {"kind": "ident", "name": "Float"}, "role": "const",
                 "loc": {"file": "model.siml", "offset": 0}},
                {"kind": "assign",
                 "target": {"kind": "ident", "name": "a"},
                 "value": {"kind": "infix", "op": "mul",
                           "left": {"kind": "literal", "value": 2.0},
                           "right": {"kind": "literal", "value": 2.0}}},
                {"kind": "func", "name": "f",
                 "params": [{"name": "a"}, {"name": "b", "default": {"kind": "literal", "value": 2.0}}],
                 "body": [{"kind": "return", "value": {"kind": "ident", "name": "a"}}]}
            ]
        }"#;
        let module: Module = serde_json::from_str(json).unwrap();
        assert_eq!(module.statements.len(), 3);
        assert_eq!(module.statements[0].location().offset, 0);
        assert_eq!(&*module.statements[0].location().file, "model.siml");
        match &module.statements[2] {
            Stmt::Func { name, params, .. } => {
                assert_eq!(name, "f");
                assert_eq!(params[1].default, Some(Expr::float(2.0)));
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_literal_forms() {
        let lit: Literal = serde_json::from_str("true").unwrap();
        assert_eq!(lit, Literal::Bool(true));
        let lit: Literal = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(lit, Literal::String("x".into()));
        let lit: Literal = serde_json::from_str("null").unwrap();
        assert_eq!(lit, Literal::None);
    }

    #[test]
    fn test_path_builder() {
        let expr = Expr::path("this.sub.x");
        match expr {
            Expr::Attr { object, name, .. } => {
                assert_eq!(name, "x");
                assert!(matches!(*object, Expr::Attr { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
