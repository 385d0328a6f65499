//! Name resolution scopes for SIML
//!
//! Code always runs with three scopes: the local namespace of the current
//! call (or the class template being built), the object `this` refers to,
//! and the module namespace. Built-ins are searched last.

use crate::heap::Handle;
use crate::role::Role;

/// What kind of code is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Module,
    ClassBody,
    Function,
}

/// Scopes of the code currently executing
#[derive(Debug, Clone, Copy)]
pub struct Environment {
    pub local: Option<Handle>,
    pub this: Option<Handle>,
    pub global: Handle,
    pub frame: Frame,
}

impl Environment {
    /// Module level code
    pub fn module(global: Handle) -> Self {
        Self {
            local: None,
            this: None,
            global,
            frame: Frame::Module,
        }
    }

    /// Body of a class statement, defining into `template`
    pub fn class_body(global: Handle, template: Handle) -> Self {
        Self {
            local: Some(template),
            this: None,
            global,
            frame: Frame::ClassBody,
        }
    }

    /// Body of an inlined function call
    pub fn call(global: Handle, local: Handle, this: Option<Handle>) -> Self {
        Self {
            local: Some(local),
            this,
            global,
            frame: Frame::Function,
        }
    }

    /// Namespace that `data`, `func` and `class` statements define into.
    pub fn definition_scope(&self) -> Handle {
        self.local.unwrap_or(self.global)
    }

    /// Scopes searched for a bare identifier, before the built-ins.
    pub fn search_order(&self) -> impl Iterator<Item = Handle> {
        [self.local, self.this, Some(self.global)].into_iter().flatten()
    }

    /// Role of `data` statements without a role keyword.
    pub fn default_role(&self) -> Role {
        match self.frame {
            Frame::Function => Role::Undetermined,
            Frame::Module | Frame::ClassBody => Role::VARIABLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_order() {
        let env = Environment::call(Handle(1), Handle(2), Some(Handle(3)));
        let order: Vec<_> = env.search_order().collect();
        assert_eq!(order, vec![Handle(2), Handle(3), Handle(1)]);
        assert_eq!(env.definition_scope(), Handle(2));
        assert_eq!(env.default_role(), Role::Undetermined);
    }

    #[test]
    fn test_module_scope() {
        let env = Environment::module(Handle(7));
        assert_eq!(env.search_order().collect::<Vec<_>>(), vec![Handle(7)]);
        assert_eq!(env.definition_scope(), Handle(7));
        assert_eq!(env.default_role(), Role::VARIABLE);
    }
}
