//! Residual code
//!
//! Statements and expressions that could not be evaluated at compile time.
//! They refer to leaves by handle; the flattener later lowers them to the
//! attribute ids of the compiled object.

use crate::ast::{InfixOp, PrefixOp};
use crate::heap::Handle;
use crate::location::Location;
use crate::role::Role;
use crate::value::{Scalar, ScalarKind};
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum RNode {
    /// Reference to a leaf that is not known at compile time
    Leaf(Handle),
    /// Value of a constant at the point the expression was built
    Literal(Scalar),
    Prefix {
        op: PrefixOp,
        operand: Rc<RExpr>,
    },
    Infix {
        op: InfixOp,
        left: Rc<RExpr>,
        right: Rc<RExpr>,
    },
    /// Call of a built-in function
    Call {
        function: &'static str,
        args: Vec<Rc<RExpr>>,
    },
    Paren(Rc<RExpr>),
}

/// Residual expression with the role and type of its result
#[derive(Debug, Clone)]
pub struct RExpr {
    pub node: RNode,
    pub role: Role,
    /// `None` for calls that return nothing
    pub kind: Option<ScalarKind>,
}

impl RExpr {
    pub fn leaf(handle: Handle, role: Role, kind: ScalarKind) -> Rc<RExpr> {
        Rc::new(RExpr {
            node: RNode::Leaf(handle),
            role,
            kind: Some(kind),
        })
    }

    pub fn literal(value: Scalar) -> Rc<RExpr> {
        Rc::new(RExpr {
            kind: Some(value.kind()),
            node: RNode::Literal(value),
            role: Role::Constant,
        })
    }

    pub fn is_call(&self) -> bool {
        matches!(self.node, RNode::Call { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RClause {
    /// `None` for the final `else`
    pub condition: Option<Rc<RExpr>>,
    pub body: Vec<RStmt>,
}

#[derive(Debug, Clone)]
pub enum RStmt {
    Assign {
        target: Handle,
        expr: Rc<RExpr>,
        location: Location,
    },
    If {
        clauses: Vec<RClause>,
        location: Location,
    },
    /// Call kept for its side effect
    Expr { expr: Rc<RExpr>, location: Location },
}

impl RStmt {
    pub fn location(&self) -> &Location {
        match self {
            RStmt::Assign { location, .. } | RStmt::If { location, .. } | RStmt::Expr { location, .. } => {
                location
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_statement_location() {
        let x = RExpr::leaf(Handle(1), Role::VARIABLE, ScalarKind::Float);
        let call = Rc::new(RExpr {
            node: RNode::Call {
                function: "graph",
                args: vec![x.clone()],
            },
            role: Role::VARIABLE,
            kind: None,
        });
        assert!(call.is_call());
        assert!(!x.is_call());

        let stmt = RStmt::Expr {
            expr: call,
            location: Location::new("model.siml", 42),
        };
        assert_eq!(stmt.location().offset, 42);
    }
}
