//! Object storage for the interpreter
//!
//! All objects live in one arena and refer to each other through `Handle`s.
//! Ownership is a tree: every leaf and namespace records its parent, and a
//! namespace attribute whose object has a different parent is only a
//! reference (function arguments, `this`, shared methods).

use crate::ast::Param;
use crate::error::{ErrorKind, Result};
use crate::location::Location;
use crate::role::Role;
use crate::value::{Scalar, ScalarKind, Value};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;

/// A handle to a heap-allocated object.
/// This acts as an index into the Heap's object storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub usize);

/// Float, String or Bool data attribute
#[derive(Debug, Clone)]
pub struct Leaf {
    pub name: String,
    pub kind: ScalarKind,
    pub role: Role,
    /// Present once the value is known at compile time
    pub value: Option<Scalar>,
    pub parent: Option<Handle>,
    pub derivative: Option<Handle>,
    pub derivative_of: Option<Handle>,
}

impl Leaf {
    pub fn is_known(&self) -> bool {
        self.role == Role::Constant && self.value.is_some()
    }
}

/// Ordered attribute table: modules, class templates, instances and the
/// local variables of inlined calls.
#[derive(Debug, Clone)]
pub struct Namespace {
    pub name: String,
    pub attributes: IndexMap<String, Handle>,
    pub class: Option<Handle>,
    pub parent: Option<Handle>,
    pub role: Role,
}

/// Formal parameter after its annotation and default were evaluated
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub annotation: Option<Handle>,
    pub default: Option<Value>,
}

/// User defined function
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub return_type: Option<Handle>,
    pub body: Rc<Vec<crate::ast::Stmt>>,
    /// Module namespace the function was defined in
    pub global: Handle,
    pub location: Location,
}

impl Function {
    /// Parameters the caller passes explicitly when the function is a method.
    pub fn external_params(&self) -> &[ParamSpec] {
        match self.params.first() {
            Some(first) if first.name == "this" => &self.params[1..],
            _ => &self.params,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Variadic,
}

/// What calling a built-in does
#[derive(Clone, Copy)]
pub enum Effect {
    /// Folded when all arguments are known
    Pure(fn(&[f64]) -> f64),
    /// Prints at compile time, or at run time inside compiled code
    Print,
    /// Only meaningful for the simulation runtime
    Runtime,
    /// Prints at compile time and never generates code
    Diagnostic,
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Pure(_) => write!(f, "Pure"),
            Effect::Print => write!(f, "Print"),
            Effect::Runtime => write!(f, "Runtime"),
            Effect::Diagnostic => write!(f, "Diagnostic"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: Arity,
    pub effect: Effect,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: String,
    pub template: Handle,
    pub location: Location,
}

/// Function paired with the namespace it was looked up on
#[derive(Debug, Clone, Copy)]
pub struct BoundMethod {
    pub function: Handle,
    pub receiver: Handle,
}

#[derive(Debug, Clone)]
pub enum Object {
    Leaf(Leaf),
    Namespace(Namespace),
    Function(Function),
    Builtin(Builtin),
    Class(Class),
    Type(ScalarKind),
    BoundMethod(BoundMethod),
}

#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, obj: Object) -> Handle {
        let idx = self.objects.len();
        self.objects.push(obj);
        Handle(idx)
    }

    pub fn alloc_leaf(&mut self, name: &str, kind: ScalarKind, role: Role, value: Option<Scalar>) -> Handle {
        self.alloc(Object::Leaf(Leaf {
            name: name.to_string(),
            kind,
            role,
            value,
            parent: None,
            derivative: None,
            derivative_of: None,
        }))
    }

    /// Fresh known constant, the result of literals and folding.
    pub fn alloc_constant(&mut self, value: Scalar) -> Handle {
        let kind = value.kind();
        self.alloc_leaf("", kind, Role::Constant, Some(value))
    }

    pub fn alloc_namespace(&mut self, name: &str, role: Role) -> Handle {
        self.alloc(Object::Namespace(Namespace {
            name: name.to_string(),
            attributes: IndexMap::new(),
            class: None,
            parent: None,
            role,
        }))
    }

    pub fn get(&self, handle: Handle) -> &Object {
        &self.objects[handle.0]
    }

    pub fn leaf(&self, handle: Handle) -> Option<&Leaf> {
        match self.objects.get(handle.0)? {
            Object::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn leaf_mut(&mut self, handle: Handle) -> Option<&mut Leaf> {
        match self.objects.get_mut(handle.0)? {
            Object::Leaf(leaf) => Some(leaf),
            _ => None,
        }
    }

    pub fn namespace(&self, handle: Handle) -> Option<&Namespace> {
        match self.objects.get(handle.0)? {
            Object::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    pub fn namespace_mut(&mut self, handle: Handle) -> Option<&mut Namespace> {
        match self.objects.get_mut(handle.0)? {
            Object::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    pub fn function(&self, handle: Handle) -> Option<&Function> {
        match self.objects.get(handle.0)? {
            Object::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn class(&self, handle: Handle) -> Option<&Class> {
        match self.objects.get(handle.0)? {
            Object::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Parent of a leaf or namespace; other objects are never owned.
    pub fn owner(&self, handle: Handle) -> Option<Handle> {
        match self.get(handle) {
            Object::Leaf(leaf) => leaf.parent,
            Object::Namespace(ns) => ns.parent,
            _ => None,
        }
    }

    fn set_owner(&mut self, handle: Handle, parent: Handle, name: &str) {
        match &mut self.objects[handle.0] {
            Object::Leaf(leaf) => {
                leaf.parent = Some(parent);
                leaf.name = name.to_string();
            }
            Object::Namespace(ns) => {
                ns.parent = Some(parent);
                ns.name = name.to_string();
            }
            _ => {}
        }
    }

    pub fn lookup(&self, namespace: Handle, name: &str) -> Option<Handle> {
        self.namespace(namespace)?.attributes.get(name).copied()
    }

    /// Insert a new attribute owned by `namespace`.
    ///
    /// A duplicate name is rejected and the table is left untouched.
    pub fn define(&mut self, namespace: Handle, name: &str, handle: Handle) -> Result<()> {
        self.bind(namespace, name, handle)?;
        self.set_owner(handle, namespace, name);
        Ok(())
    }

    /// Insert a reference to an object owned elsewhere.
    pub fn bind(&mut self, namespace: Handle, name: &str, handle: Handle) -> Result<()> {
        let ns = self
            .namespace_mut(namespace)
            .ok_or_else(|| ErrorKind::UndefinedAttribute(name.to_string()))?;
        if ns.attributes.contains_key(name) {
            return Err(ErrorKind::DuplicateAttribute(name.to_string()).into());
        }
        ns.attributes.insert(name.to_string(), handle);
        Ok(())
    }

    /// Define under `name`, or `name_1`, `name_2`, ... if it is taken.
    pub fn define_unique(&mut self, namespace: Handle, name: &str, handle: Handle) -> Result<String> {
        let mut key = name.to_string();
        let mut n = 0;
        while self.lookup(namespace, &key).is_some() {
            n += 1;
            key = format!("{}_{}", name, n);
        }
        self.define(namespace, &key, handle)?;
        Ok(key)
    }

    /// Owned attributes of a namespace in declaration order.
    pub fn owned_attributes(&self, namespace: Handle) -> Vec<(String, Handle)> {
        match self.namespace(namespace) {
            Some(ns) => ns
                .attributes
                .iter()
                .filter(|&(_, &h)| self.owner(h) == Some(namespace))
                .map(|(k, &h)| (k.clone(), h))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Deep copy of a class template into a fresh instance.
    ///
    /// Leaves and namespaces owned by the template are copied, everything
    /// else (methods, classes, references) is shared with the template.
    pub fn instantiate(&mut self, template: Handle, max_depth: usize) -> Result<Handle> {
        let mut copies = HashMap::new();
        let root = self.copy_namespace(template, 1, max_depth, &mut copies)?;

        for &copy in copies.values() {
            if let Some(leaf) = self.leaf(copy) {
                let derivative = leaf.derivative.and_then(|d| copies.get(&d).copied());
                let derivative_of = leaf.derivative_of.and_then(|d| copies.get(&d).copied());
                if let Some(leaf) = self.leaf_mut(copy) {
                    leaf.derivative = derivative;
                    leaf.derivative_of = derivative_of;
                }
            }
        }
        Ok(root)
    }

    fn copy_namespace(
        &mut self,
        source: Handle,
        depth: usize,
        max_depth: usize,
        copies: &mut HashMap<Handle, Handle>,
    ) -> Result<Handle> {
        if depth > max_depth {
            return Err(ErrorKind::NestingDepthExceeded(max_depth).into());
        }
        let ns = match self.namespace(source) {
            Some(ns) => ns.clone(),
            None => return Err(ErrorKind::NotAType(self.describe(source)).into()),
        };

        let copy = self.alloc(Object::Namespace(Namespace {
            name: ns.name.clone(),
            attributes: IndexMap::with_capacity(ns.attributes.len()),
            class: ns.class,
            parent: None,
            role: ns.role,
        }));
        copies.insert(source, copy);

        for (name, child) in &ns.attributes {
            let mapped = if self.owner(*child) != Some(source) {
                *child
            } else if let Some(leaf) = self.leaf(*child).cloned() {
                let new_leaf = self.alloc(Object::Leaf(Leaf {
                    parent: Some(copy),
                    ..leaf.clone()
                }));
                copies.insert(*child, new_leaf);
                if let Some(derivative) = leaf.derivative.and_then(|d| self.leaf(d).cloned()) {
                    let new_derivative = self.alloc(Object::Leaf(Leaf {
                        parent: Some(copy),
                        ..derivative
                    }));
                    if let Some(old) = leaf.derivative {
                        copies.insert(old, new_derivative);
                    }
                }
                new_leaf
            } else {
                let nested = self.copy_namespace(*child, depth + 1, max_depth, copies)?;
                if let Some(nested_ns) = self.namespace_mut(nested) {
                    nested_ns.parent = Some(copy);
                }
                nested
            };
            if let Some(copy_ns) = self.namespace_mut(copy) {
                copy_ns.attributes.insert(name.clone(), mapped);
            }
        }
        Ok(copy)
    }

    /// Apply the role of a data statement to a fresh leaf or instance.
    pub fn apply_role(&mut self, handle: Handle, role: Role) {
        match &mut self.objects[handle.0] {
            Object::Leaf(leaf) => leaf.role = role,
            Object::Namespace(ns) => {
                ns.role = role;
                self.propagate_role(handle, role);
            }
            _ => {}
        }
    }

    fn propagate_role(&mut self, namespace: Handle, outer: Role) {
        for (_, child) in self.owned_attributes(namespace) {
            match &mut self.objects[child.0] {
                Object::Leaf(leaf) => leaf.role = Role::propagate_into(leaf.role, outer),
                Object::Namespace(ns) => {
                    let role = Role::propagate_into(ns.role, outer);
                    ns.role = role;
                    self.propagate_role(child, role);
                }
                _ => {}
            }
        }
    }

    /// Dotted name relative to the outermost owning namespace.
    pub fn long_name(&self, handle: Handle) -> String {
        let mut parts = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            let parent = self.owner(h);
            let name = match self.get(h) {
                Object::Leaf(leaf) => leaf.name.clone(),
                Object::Namespace(ns) => ns.name.clone(),
                Object::Function(f) => f.name.clone(),
                Object::Class(c) => c.name.clone(),
                Object::Builtin(b) => b.name.to_string(),
                Object::Type(kind) => kind.name().to_string(),
                Object::BoundMethod(m) => return self.long_name(m.function),
            };
            if parent.is_some() || parts.is_empty() {
                parts.push(name);
            }
            current = parent;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Short description of an object for error messages.
    pub fn describe(&self, handle: Handle) -> String {
        match self.get(handle) {
            Object::Leaf(leaf) => leaf.kind.name().to_string(),
            Object::Namespace(ns) => match ns.class.and_then(|c| self.class(c)) {
                Some(class) => format!("instance of {}", class.name),
                None => format!("namespace {}", ns.name),
            },
            Object::Function(f) => format!("function {}", f.name),
            Object::Builtin(b) => format!("built-in {}", b.name),
            Object::Class(c) => format!("class {}", c.name),
            Object::Type(kind) => format!("type {}", kind),
            Object::BoundMethod(m) => format!("method {}", self.long_name(m.function)),
        }
    }
}

/// Signature checks done when a function definition executes.
pub fn validate_params(function: &str, params: &[Param]) -> Result<()> {
    let mut seen_default = false;
    for (i, param) in params.iter().enumerate() {
        if params[..i].iter().any(|p| p.name == param.name) {
            return Err(ErrorKind::DuplicateParameter(function.to_string(), param.name.clone()).into());
        }
        if param.default.is_some() {
            seen_default = true;
        } else if seen_default {
            return Err(
                ErrorKind::DefaultBeforePositional(function.to_string(), param.name.clone()).into(),
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Flow;

    fn model(heap: &mut Heap) -> Handle {
        let template = heap.alloc_namespace("Model", Role::VARIABLE);
        let x = heap.alloc_leaf("x", ScalarKind::Float, Role::VARIABLE, None);
        heap.define(template, "x", x).unwrap();
        let k = heap.alloc_leaf("k", ScalarKind::Float, Role::Constant, Some(Scalar::Float(2.0)));
        heap.define(template, "k", k).unwrap();
        template
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut heap = Heap::new();
        let ns = heap.alloc_namespace("m", Role::VARIABLE);
        let a = heap.alloc_leaf("a", ScalarKind::Float, Role::Constant, None);
        let b = heap.alloc_leaf("a", ScalarKind::Float, Role::Constant, None);
        heap.define(ns, "a", a).unwrap();
        let err = heap.define(ns, "a", b).unwrap_err();
        assert_eq!(err.code(), 3800910);
        assert_eq!(heap.lookup(ns, "a"), Some(a));
        assert_eq!(heap.owner(b), None);
    }

    #[test]
    fn test_instantiate_copies_leaves() {
        let mut heap = Heap::new();
        let template = model(&mut heap);
        let instance = heap.instantiate(template, 100).unwrap();

        let x = heap.lookup(instance, "x").unwrap();
        assert_ne!(Some(x), heap.lookup(template, "x"));
        assert_eq!(heap.owner(x), Some(instance));
        let k = heap.leaf(heap.lookup(instance, "k").unwrap()).unwrap();
        assert!(k.is_known());
    }

    #[test]
    fn test_instantiate_shares_references() {
        let mut heap = Heap::new();
        let template = model(&mut heap);
        let outside = heap.alloc_leaf("o", ScalarKind::Float, Role::Parameter, None);
        heap.bind(template, "o", outside).unwrap();
        let instance = heap.instantiate(template, 100).unwrap();
        assert_eq!(heap.lookup(instance, "o"), Some(outside));
    }

    #[test]
    fn test_instantiate_remaps_derivative() {
        let mut heap = Heap::new();
        let template = model(&mut heap);
        let x = heap.lookup(template, "x").unwrap();
        let dx = heap.alloc_leaf("x$time", ScalarKind::Float, Role::Variable(Flow::Output), None);
        heap.leaf_mut(dx).unwrap().derivative_of = Some(x);
        heap.leaf_mut(dx).unwrap().parent = Some(template);
        heap.leaf_mut(x).unwrap().derivative = Some(dx);

        let instance = heap.instantiate(template, 100).unwrap();
        let new_x = heap.lookup(instance, "x").unwrap();
        let new_dx = heap.leaf(new_x).unwrap().derivative.unwrap();
        assert_ne!(new_dx, dx);
        assert_eq!(heap.leaf(new_dx).unwrap().derivative_of, Some(new_x));
    }

    #[test]
    fn test_nesting_depth_guard() {
        let mut heap = Heap::new();
        let mut inner = model(&mut heap);
        for depth in 0..5 {
            let outer = heap.alloc_namespace(&format!("Level{}", depth), Role::VARIABLE);
            let copy = heap.instantiate(inner, 100).unwrap();
            heap.define(outer, "sub", copy).unwrap();
            inner = outer;
        }
        assert!(heap.instantiate(inner, 6).is_ok());
        let err = heap.instantiate(inner, 5).unwrap_err();
        assert_eq!(err.code(), 3700920);
    }

    #[test]
    fn test_role_propagation() {
        let mut heap = Heap::new();
        let template = model(&mut heap);
        let instance = heap.instantiate(template, 100).unwrap();
        heap.apply_role(instance, Role::Parameter);
        let x = heap.leaf(heap.lookup(instance, "x").unwrap()).unwrap();
        let k = heap.leaf(heap.lookup(instance, "k").unwrap()).unwrap();
        assert_eq!(x.role, Role::Parameter);
        assert_eq!(k.role, Role::Constant);
    }

    #[test]
    fn test_long_name() {
        let mut heap = Heap::new();
        let root = heap.alloc_namespace("m", Role::VARIABLE);
        let sub = heap.alloc_namespace("sub", Role::VARIABLE);
        heap.define(root, "sub", sub).unwrap();
        let x = heap.alloc_leaf("x", ScalarKind::Float, Role::VARIABLE, None);
        heap.define(sub, "x", x).unwrap();
        assert_eq!(heap.long_name(x), "sub.x");
    }

    #[test]
    fn test_validate_params() {
        let params = vec![Param::new("a").with_default(crate::ast::Expr::float(1.0)), Param::new("b")];
        assert_eq!(validate_params("f", &params).unwrap_err().code(), 3200110);
        let params = vec![Param::new("a"), Param::new("a")];
        assert_eq!(validate_params("f", &params).unwrap_err().code(), 3200120);
    }
}
