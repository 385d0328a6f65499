//! Built-in names visible in every module
//!
//! The scalar types, the math functions, the output functions of the
//! simulation runtime and the simulation time.

use crate::heap::{Arity, Builtin, Effect, Handle, Heap, Object};
use crate::role::Role;
use crate::value::ScalarKind;

impl Builtin {
    pub fn new(name: &'static str, arity: Arity, effect: Effect) -> Self {
        Self { name, arity, effect }
    }
}

fn math_functions() -> Vec<Builtin> {
    vec![
        Builtin::new("sqrt", Arity::Exact(1), Effect::Pure(|a| a[0].sqrt())),
        Builtin::new("sin", Arity::Exact(1), Effect::Pure(|a| a[0].sin())),
        Builtin::new("cos", Arity::Exact(1), Effect::Pure(|a| a[0].cos())),
        Builtin::new("tan", Arity::Exact(1), Effect::Pure(|a| a[0].tan())),
        Builtin::new("exp", Arity::Exact(1), Effect::Pure(|a| a[0].exp())),
        Builtin::new("log", Arity::Exact(1), Effect::Pure(|a| a[0].ln())),
        Builtin::new("abs", Arity::Exact(1), Effect::Pure(|a| a[0].abs())),
        Builtin::new("min", Arity::Exact(2), Effect::Pure(|a| a[0].min(a[1]))),
        Builtin::new("max", Arity::Exact(2), Effect::Pure(|a| a[0].max(a[1]))),
    ]
}

fn runtime_functions() -> Vec<Builtin> {
    vec![
        Builtin::new("print", Arity::Variadic, Effect::Print),
        Builtin::new("printc", Arity::Variadic, Effect::Diagnostic),
        Builtin::new("graph", Arity::Variadic, Effect::Runtime),
        Builtin::new("save", Arity::Variadic, Effect::Runtime),
        // solution_parameters(duration, reporting_interval)
        Builtin::new("solution_parameters", Arity::Exact(2), Effect::Runtime),
    ]
}

/// Create the namespace searched after a module's own attributes.
pub fn define_builtins(heap: &mut Heap) -> Handle {
    let builtins = heap.alloc_namespace("<builtins>", Role::Constant);

    for kind in [ScalarKind::Float, ScalarKind::String, ScalarKind::Bool] {
        let handle = heap.alloc(Object::Type(kind));
        bind(heap, builtins, kind.name(), handle);
    }

    for builtin in math_functions().into_iter().chain(runtime_functions()) {
        let name = builtin.name;
        let handle = heap.alloc(Object::Builtin(builtin));
        bind(heap, builtins, name, handle);
    }

    let time = heap.alloc_leaf("time", ScalarKind::Float, Role::VARIABLE, None);
    if heap.define(builtins, "time", time).is_err() {
        tracing::warn!("built-in 'time' defined twice");
    }
    builtins
}

fn bind(heap: &mut Heap, namespace: Handle, name: &str, handle: Handle) {
    if heap.bind(namespace, name, handle).is_err() {
        tracing::warn!("built-in '{}' defined twice", name);
    }
}
