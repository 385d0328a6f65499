//! Variability lattice
//!
//! Every data attribute carries a role that states when its value becomes
//! known: at compile time (constants), once per simulation (parameters) or
//! at every time step (variables).

use crate::error::{ErrorKind, Result};
use serde::Serialize;
use std::fmt;

/// Dataflow direction of a variable attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// State variable: the integrator supplies its value
    Input,
    /// Algebraic variable
    Intermediate,
    /// Time derivative of a state variable
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Placeholder of local data whose role is fixed by its first assignment
    Undetermined,
    Constant,
    Parameter,
    Variable(Flow),
}

impl Role {
    /// A plain algebraic variable, the role of undecorated `data` statements.
    pub const VARIABLE: Role = Role::Variable(Flow::Intermediate);

    fn rank(self) -> u8 {
        match self {
            Role::Constant => 0,
            Role::Parameter => 1,
            Role::Variable(_) => 2,
            Role::Undetermined => 3,
        }
    }

    pub fn is_variable(self) -> bool {
        matches!(self, Role::Variable(_))
    }

    /// Role given to the target of a first assignment.
    pub fn adopted(self) -> Role {
        match self {
            Role::Variable(_) => Role::VARIABLE,
            other => other,
        }
    }

    /// Role of a submodel attribute after its parent was declared with `outer`.
    ///
    /// `data m: Model param` turns every variable of `m` into a parameter,
    /// but constants stay constants.
    pub fn propagate_into(child: Role, outer: Role) -> Role {
        if is_more_variable(child, outer) {
            outer
        } else {
            child
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Undetermined => write!(f, "undetermined"),
            Role::Constant => write!(f, "constant"),
            Role::Parameter => write!(f, "parameter"),
            Role::Variable(Flow::Input) => write!(f, "state variable"),
            Role::Variable(Flow::Intermediate) => write!(f, "algebraic variable"),
            Role::Variable(Flow::Output) => write!(f, "time derivative"),
        }
    }
}

/// Strict order on variability.
pub fn is_more_variable(a: Role, b: Role) -> bool {
    a.rank() > b.rank()
}

/// Role of an expression computed from operands with the given roles.
///
/// Operands of different variable flows produce an algebraic variable.
pub fn combine<I: IntoIterator<Item = Role>>(roles: I) -> Result<Role> {
    let mut result = Role::Constant;
    for role in roles {
        if role == Role::Undetermined {
            return Err(ErrorKind::UndeterminedRole("operand".to_string()).into());
        }
        if is_more_variable(role, result) {
            result = role;
        } else if role.is_variable() && result.is_variable() && role != result {
            result = Role::VARIABLE;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_picks_most_variable() {
        let role = combine([Role::Constant, Role::Parameter, Role::Constant]).unwrap();
        assert_eq!(role, Role::Parameter);

        let role = combine([Role::Parameter, Role::Variable(Flow::Input)]).unwrap();
        assert_eq!(role, Role::Variable(Flow::Input));

        assert_eq!(combine([]).unwrap(), Role::Constant);
    }

    #[test]
    fn test_combine_mixed_flows() {
        let role = combine([Role::Variable(Flow::Input), Role::Variable(Flow::Output)]).unwrap();
        assert_eq!(role, Role::VARIABLE);
    }

    #[test]
    fn test_combine_rejects_undetermined() {
        let err = combine([Role::Constant, Role::Undetermined]).unwrap_err();
        assert_eq!(err.code(), 3190120);
    }

    #[test]
    fn test_order() {
        assert!(is_more_variable(Role::Parameter, Role::Constant));
        assert!(is_more_variable(Role::VARIABLE, Role::Parameter));
        assert!(!is_more_variable(Role::Variable(Flow::Input), Role::Variable(Flow::Output)));
        assert!(!is_more_variable(Role::Constant, Role::Constant));
    }

    #[test]
    fn test_propagate_into() {
        assert_eq!(Role::propagate_into(Role::VARIABLE, Role::Parameter), Role::Parameter);
        assert_eq!(Role::propagate_into(Role::Constant, Role::Parameter), Role::Constant);
        assert_eq!(Role::propagate_into(Role::Undetermined, Role::VARIABLE), Role::VARIABLE);
        assert_eq!(Role::propagate_into(Role::VARIABLE, Role::Undetermined), Role::VARIABLE);
    }
}
