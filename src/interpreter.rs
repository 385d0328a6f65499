//! Statement executor and function inliner
//!
//! Executes the module, class bodies and function bodies at compile time.
//! Everything that can be computed is computed; what depends on parameters
//! or variables is appended to the active residual statement sink. Calls of
//! user functions are always inlined.

use crate::ast::{Clause, Expr, Module, Param, PrefixOp, RoleKeyword, Stmt};
use crate::builtins::define_builtins;
use crate::config::BuildConfig;
use crate::environment::{Environment, Frame};
use crate::error::{ErrorKind, Result};
use crate::flatten::FlatObject;
use crate::heap::{validate_params, Class, Function, Handle, Heap, Object, ParamSpec};
use crate::location::Location;
use crate::residual::{RClause, RExpr, RStmt};
use crate::role::{combine, is_more_variable, Role};
use crate::value::{Scalar, SpecialMethod, Value};
use std::rc::Rc;
use tracing::{debug, info, trace};

/// Outcome of executing a statement list
#[derive(Debug, Clone)]
pub enum Flow {
    Continue,
    Return(Value),
}

/// Mutable state of one build
#[derive(Debug, Default)]
pub struct BuildContext {
    /// Residual statement lists, innermost last
    sinks: Vec<Vec<RStmt>>,
    /// Namespaces that receive the local namespaces of inlined calls
    locals_roots: Vec<Handle>,
    /// Number of enclosing generated `if` clauses at the entry of each active call
    call_frames: Vec<usize>,
    /// Roles of the conditions of the enclosing generated `if` clauses
    branches: Vec<Role>,
    /// Location of the statement being executed
    location: Location,
    output: Vec<String>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while residual statements are being collected.
    pub fn collecting(&self) -> bool {
        !self.sinks.is_empty()
    }

    pub fn push_sink(&mut self) {
        self.sinks.push(Vec::new());
    }

    pub fn pop_sink(&mut self) -> Vec<RStmt> {
        self.sinks.pop().unwrap_or_default()
    }

    /// Append to the innermost sink; `what` names the generated code in errors.
    pub fn emit(&mut self, stmt: RStmt, what: &str) -> Result<()> {
        match self.sinks.last_mut() {
            Some(sink) => {
                trace!(target_name = what, "emitting residual statement");
                sink.push(stmt);
                Ok(())
            }
            None => Err(ErrorKind::CodeOutsideCompile(what.to_string()).into()),
        }
    }

    pub fn push_locals_root(&mut self, root: Handle) {
        self.locals_roots.push(root);
    }

    pub fn pop_locals_root(&mut self) -> Option<Handle> {
        self.locals_roots.pop()
    }

    pub fn locals_root(&self) -> Option<Handle> {
        self.locals_roots.last().copied()
    }

    pub fn call_depth(&self) -> usize {
        self.call_frames.len()
    }

    fn call_entry(&self) -> usize {
        self.call_frames.last().copied().unwrap_or(0)
    }

    /// Joined condition role of the generated clauses entered by the current call.
    ///
    /// `None` when the current statement runs unconditionally.
    fn branch_role(&self) -> Result<Option<Role>> {
        let entered = self.branches.get(self.call_entry()..).unwrap_or_default();
        if entered.is_empty() {
            return Ok(None);
        }
        combine(entered.iter().copied()).map(Some)
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub(crate) fn print(&mut self, line: String) {
        info!(target: "siml::print", "{}", line);
        self.output.push(line);
    }
}

/// The SIML compile-time interpreter
pub struct Interpreter {
    pub heap: Heap,
    pub config: BuildConfig,
    pub(crate) ctx: BuildContext,
    pub(crate) builtins: Handle,
    global: Option<Handle>,
    compiled: Vec<FlatObject>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_config(BuildConfig::default())
    }

    pub fn with_config(config: BuildConfig) -> Self {
        let mut heap = Heap::new();
        let builtins = define_builtins(&mut heap);
        Self {
            heap,
            config,
            ctx: BuildContext::new(),
            builtins,
            global: None,
            compiled: Vec::new(),
        }
    }

    /// Lines printed at compile time by `print` and `printc`.
    pub fn output(&self) -> &[String] {
        self.ctx.output()
    }

    /// Namespace of the last interpreted module, kept after a failed build.
    pub fn module_namespace(&self) -> Option<Handle> {
        self.global
    }

    /// Execute a module and return one flat object per `compile` statement.
    pub fn interpret(&mut self, module: &Module) -> Result<Vec<FlatObject>> {
        info!(module = %module.name, statements = module.statements.len(), "interpreting module");
        let global = self.heap.alloc_namespace(&module.name, Role::VARIABLE);
        self.global = Some(global);
        let env = Environment::module(global);
        self.execute_block(&module.statements, &env)?;
        Ok(std::mem::take(&mut self.compiled))
    }

    pub fn execute_block(&mut self, statements: &[Stmt], env: &Environment) -> Result<Flow> {
        for stmt in statements {
            let previous = std::mem::replace(&mut self.ctx.location, stmt.location().clone());
            let flow = self
                .execute_stmt(stmt, env)
                .map_err(|e| e.or_location(stmt.location()));
            self.ctx.location = previous;
            if let Flow::Return(value) = flow? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Continue)
    }

    fn execute_stmt(&mut self, stmt: &Stmt, env: &Environment) -> Result<Flow> {
        match stmt {
            Stmt::Class { name, body, loc } => self.define_class(name, body, loc, env)?,

            Stmt::Func {
                name,
                params,
                return_type,
                body,
                loc,
            } => self.define_function(name, params, return_type.as_ref(), body, loc, env)?,

            Stmt::Data {
                name,
                class,
                role,
                default,
                ..
            } => self.define_data(name, class, *role, default.as_ref(), env)?,

            Stmt::Compile { class, name, loc } => {
                let class_handle = self.evaluate_type(class, env)?;
                let object_name = match name {
                    Some(name) => name.clone(),
                    None => self.heap.long_name(class_handle),
                };
                let object = self.compile_class(class_handle, &object_name, loc)?;
                self.compiled.push(object);
            }

            Stmt::Assign { target, value, .. } => {
                let source = self.evaluate(value, env)?;
                let target = self.evaluate_target(target, env)?;
                self.assign(target, source)?;
            }

            Stmt::If { clauses, .. } => return self.execute_if(clauses, env),

            Stmt::Pass { .. } => {}

            Stmt::Return { value, .. } => {
                if env.frame != Frame::Function {
                    return Err(ErrorKind::ReturnOutsideFunction.into());
                }
                if self.ctx.branches.len() > self.ctx.call_entry() {
                    return Err(ErrorKind::ReturnInResidualIf.into());
                }
                let value = match value {
                    Some(expr) => self.evaluate(expr, env)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }

            Stmt::Expr { expr, .. } => {
                if let Value::Residual(residual) = self.evaluate(expr, env)? {
                    if residual.is_call() {
                        let location = self.ctx.location.clone();
                        self.ctx.emit(
                            RStmt::Expr {
                                expr: residual,
                                location,
                            },
                            "expression statement",
                        )?;
                    } else {
                        trace!(location = %self.ctx.location, "discarding unused expression");
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn define_class(&mut self, name: &str, body: &[Stmt], loc: &Location, env: &Environment) -> Result<()> {
        let scope = env.definition_scope();
        if self.heap.lookup(scope, name).is_some() {
            return Err(ErrorKind::DuplicateAttribute(name.to_string()).into());
        }

        let template = self.heap.alloc_namespace(name, Role::VARIABLE);
        let class = self.heap.alloc(Object::Class(Class {
            name: name.to_string(),
            template,
            location: loc.clone(),
        }));
        if let Some(ns) = self.heap.namespace_mut(template) {
            ns.class = Some(class);
        }

        debug!(class = name, "executing class body");
        let class_env = Environment::class_body(env.global, template);
        self.execute_block(body, &class_env)?;
        self.heap.bind(scope, name, class)
    }

    fn define_function(
        &mut self,
        name: &str,
        params: &[Param],
        return_type: Option<&Expr>,
        body: &[Stmt],
        loc: &Location,
        env: &Environment,
    ) -> Result<()> {
        validate_params(name, params)?;

        let mut specs = Vec::with_capacity(params.len());
        for param in params {
            let annotation = match &param.type_annotation {
                Some(expr) => Some(self.evaluate_type(expr, env)?),
                None => None,
            };
            let default = match &param.default {
                Some(expr) => Some(self.evaluate(expr, env)?),
                None => None,
            };
            specs.push(ParamSpec {
                name: param.name.clone(),
                annotation,
                default,
            });
        }
        let return_type = match return_type {
            Some(expr) => Some(self.evaluate_type(expr, env)?),
            None => None,
        };

        let function = self.heap.alloc(Object::Function(Function {
            name: name.to_string(),
            params: specs,
            return_type,
            body: Rc::new(body.to_vec()),
            global: env.global,
            location: loc.clone(),
        }));
        debug!(function = name, "defined function");
        self.heap.bind(env.definition_scope(), name, function)
    }

    fn define_data(
        &mut self,
        name: &str,
        class: &Expr,
        role: Option<RoleKeyword>,
        default: Option<&Expr>,
        env: &Environment,
    ) -> Result<()> {
        let scope = env.definition_scope();
        if self.heap.lookup(scope, name).is_some() {
            return Err(ErrorKind::DuplicateAttribute(name.to_string()).into());
        }

        let role = match role {
            Some(RoleKeyword::Const) => Role::Constant,
            Some(RoleKeyword::Param) => Role::Parameter,
            Some(RoleKeyword::Variable) => Role::VARIABLE,
            Some(RoleKeyword::RoleUnknown) => Role::Undetermined,
            None => env.default_role(),
        };

        let type_handle = self.evaluate_type(class, env)?;
        let object = match self.heap.get(type_handle) {
            Object::Type(kind) => self.heap.alloc_leaf(name, *kind, role, None),
            Object::Class(class) => {
                let template = class.template;
                let instance = self.heap.instantiate(template, self.config.max_nesting_depth)?;
                self.heap.apply_role(instance, role);
                instance
            }
            _ => return Err(ErrorKind::NotAType(self.heap.describe(type_handle)).into()),
        };
        self.heap.define(scope, name, object)?;
        debug!(name, %role, "defined data");

        if let Some(expr) = default {
            let value = self.evaluate(expr, env)?;
            self.assign(object, value)?;
        }
        Ok(())
    }

    /// Resolve the left side of an assignment.
    fn evaluate_target(&mut self, target: &Expr, env: &Environment) -> Result<Handle> {
        let assignable = matches!(
            target,
            Expr::Ident { .. }
                | Expr::Attr { .. }
                | Expr::Prefix {
                    op: PrefixOp::Derivative,
                    ..
                }
        );
        let value = self.evaluate(target, env)?;
        match value {
            Value::Object(handle) if assignable => Ok(handle),
            other => Err(ErrorKind::NotAssignable(self.describe_value(&other)).into()),
        }
    }

    /// Assign `source` to the leaf or namespace `target`.
    pub(crate) fn assign(&mut self, target: Handle, source: Value) -> Result<()> {
        if self.heap.namespace(target).is_some() {
            return match self.special_method(target, SpecialMethod::Assign) {
                Some(method) => {
                    let location = self.ctx.location.clone();
                    self.call_function(method, Some(target), vec![(None, source)], &location)
                        .map(|_| ())
                }
                None => Err(ErrorKind::NotAssignable(self.heap.long_name(target)).into()),
            };
        }

        let leaf = match self.heap.leaf(target) {
            Some(leaf) => leaf.clone(),
            None => return Err(ErrorKind::NotAssignable(self.heap.describe(target)).into()),
        };
        let target_name = self.heap.long_name(target);
        let operand = self.operand(&source, "=")?;

        if operand.kind() != leaf.kind {
            return Err(ErrorKind::OperandType(
                "=".to_string(),
                format!("{} and {}", leaf.kind, operand.kind()),
            )
            .into());
        }

        let branch = self.ctx.branch_role()?;
        let target_role = if leaf.role == Role::Undetermined {
            let adopted = match (branch, &operand.value) {
                (Some(condition), _) => combine([operand.role(), condition])?.adopted(),
                (None, Some(_)) => Role::Constant,
                (None, None) => operand.role().adopted(),
            };
            if let Some(leaf) = self.heap.leaf_mut(target) {
                leaf.role = adopted;
            }
            adopted
        } else {
            leaf.role
        };

        if target_role == Role::Constant {
            // A constant can only take a value from code that runs unconditionally.
            if let Some(condition) = branch {
                return Err(ErrorKind::IllegalRole(target_name, format!("{} dependent", condition)).into());
            }
            let value = operand
                .value
                .ok_or_else(|| ErrorKind::UnknownConstant(target_name.clone()))?;
            debug!(attribute = %target_name, %value, "constant assigned");
            if let Some(leaf) = self.heap.leaf_mut(target) {
                leaf.value = Some(value);
            }
            return Ok(());
        }

        if is_more_variable(operand.role(), target_role) {
            return Err(ErrorKind::IllegalRole(target_name, operand.role().to_string()).into());
        }

        let location = self.ctx.location.clone();
        self.ctx.emit(
            RStmt::Assign {
                target,
                expr: operand.rexpr,
                location,
            },
            &target_name,
        )
    }

    fn execute_if(&mut self, clauses: &[Clause], env: &Environment) -> Result<Flow> {
        let mut residual: Vec<RClause> = Vec::new();
        let mut has_else = false;
        // An `else` runs when every earlier generated condition failed.
        let mut reached = Role::Constant;

        for clause in clauses {
            let condition = match &clause.condition {
                Some(expr) => {
                    let value = self.evaluate(expr, env)?;
                    self.condition(&value)?
                }
                None => Condition::Known(true),
            };

            match condition {
                Condition::Known(false) => continue,
                Condition::Known(true) if residual.is_empty() => {
                    return self.execute_block(&clause.body, env);
                }
                Condition::Known(true) => {
                    let body = self.collect_clause(&clause.body, reached, env)?;
                    residual.push(RClause {
                        condition: None,
                        body,
                    });
                    has_else = true;
                    break;
                }
                Condition::Residual(expr) => {
                    reached = combine([reached, expr.role])?;
                    let body = self.collect_clause(&clause.body, reached, env)?;
                    residual.push(RClause {
                        condition: Some(expr),
                        body,
                    });
                }
            }
        }

        if residual.is_empty() {
            return Ok(Flow::Continue);
        }
        if !has_else {
            return Err(ErrorKind::MissingElse.into());
        }
        let location = self.ctx.location.clone();
        self.ctx.emit(
            RStmt::If {
                clauses: residual,
                location,
            },
            "if statement",
        )?;
        Ok(Flow::Continue)
    }

    /// Execute a clause of a generated `if` into its own sink.
    fn collect_clause(&mut self, body: &[Stmt], condition: Role, env: &Environment) -> Result<Vec<RStmt>> {
        self.ctx.push_sink();
        self.ctx.branches.push(condition);
        let result = self.execute_block(body, env);
        self.ctx.branches.pop();
        let statements = self.ctx.pop_sink();
        result?;
        Ok(statements)
    }

    fn condition(&mut self, value: &Value) -> Result<Condition> {
        let operand = self.operand(value, "if")?;
        if operand.kind() != crate::value::ScalarKind::Bool {
            return Err(ErrorKind::ConditionType(operand.kind().to_string()).into());
        }
        Ok(match operand.value {
            Some(Scalar::Bool(b)) => Condition::Known(b),
            _ => Condition::Residual(operand.rexpr),
        })
    }

    /// Call a function or method, inlining its body.
    pub(crate) fn call_function(
        &mut self,
        function: Handle,
        receiver: Option<Handle>,
        args: Vec<(Option<String>, Value)>,
        loc: &Location,
    ) -> Result<Value> {
        let function = match self.heap.function(function) {
            Some(f) => f.clone(),
            None => return Err(ErrorKind::NotCallable(self.heap.describe(function)).into()),
        };
        let bound = self.bind_arguments(&function, receiver, args)?;

        let local = self.heap.alloc_namespace(&function.name, Role::Undetermined);
        if let Some(root) = self.ctx.locals_root() {
            self.heap.define_unique(root, &function.name, local)?;
        }
        self.inline(&function, receiver, bound, local, loc)
    }

    /// Match call arguments to the parameters of `function`.
    pub(crate) fn bind_arguments(
        &mut self,
        function: &Function,
        receiver: Option<Handle>,
        args: Vec<(Option<String>, Value)>,
    ) -> Result<Vec<(String, Value)>> {
        let mut positional: Vec<Value> = receiver.map(Value::Object).into_iter().collect();
        let mut keywords = Vec::new();
        for (name, value) in args {
            match name {
                None => positional.push(value),
                Some(name) => keywords.push((name, value)),
            }
        }

        let params = &function.params;
        if positional.len() > params.len() {
            return Err(ErrorKind::TooManyArguments(
                function.name.clone(),
                params.len(),
                positional.len(),
            )
            .into());
        }

        let mut slots: Vec<Option<Value>> = vec![None; params.len()];
        for (slot, value) in slots.iter_mut().zip(positional) {
            *slot = Some(value);
        }
        for (name, value) in keywords {
            let index = params
                .iter()
                .position(|p| p.name == name)
                .ok_or_else(|| ErrorKind::UnknownKeyword(function.name.clone(), name.clone()))?;
            if slots[index].is_some() {
                return Err(ErrorKind::DuplicateArgument(function.name.clone(), name).into());
            }
            slots[index] = Some(value);
        }

        let mut bound = Vec::with_capacity(params.len());
        for (param, slot) in params.iter().zip(slots) {
            let value = match (slot, &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.copy_default(default),
                (None, None) => {
                    return Err(
                        ErrorKind::MissingArgument(function.name.clone(), param.name.clone()).into(),
                    )
                }
            };
            if let Some(annotation) = param.annotation {
                if !self.has_type(&value, annotation) {
                    return Err(ErrorKind::ArgumentType(
                        function.name.clone(),
                        param.name.clone(),
                        self.heap.describe(annotation),
                        self.describe_value(&value),
                    )
                    .into());
                }
            }
            bound.push((param.name.clone(), value));
        }
        Ok(bound)
    }

    /// Execute the body of `function` in the fresh namespace `local`.
    pub(crate) fn inline(
        &mut self,
        function: &Function,
        receiver: Option<Handle>,
        bound: Vec<(String, Value)>,
        local: Handle,
        loc: &Location,
    ) -> Result<Value> {
        if self.ctx.call_depth() >= self.config.max_call_depth {
            return Err(ErrorKind::CallDepthExceeded(self.config.max_call_depth).into());
        }

        for (name, value) in bound {
            match value {
                Value::Object(handle) => self.heap.bind(local, &name, handle)?,
                Value::Residual(expr) => self.materialize(local, &name, expr)?,
                Value::None => {
                    return Err(ErrorKind::ArgumentType(
                        function.name.clone(),
                        name,
                        "a value".to_string(),
                        "None".to_string(),
                    )
                    .into())
                }
            }
        }

        debug!(function = %function.name, depth = self.ctx.call_depth(), "inlining call");
        let env = Environment::call(function.global, local, receiver);
        self.ctx.call_frames.push(self.ctx.branches.len());
        let result = self.execute_block(&function.body, &env);
        self.ctx.call_frames.pop();

        let value = match result.map_err(|e| e.called_from(loc))? {
            Flow::Return(value) => value,
            Flow::Continue => Value::None,
        };
        if let Some(expected) = function.return_type {
            if !self.has_type(&value, expected) {
                return Err(ErrorKind::ReturnType(
                    function.name.clone(),
                    self.heap.describe(expected),
                    self.describe_value(&value),
                )
                .into());
            }
        }
        Ok(value)
    }

    /// Store a residual argument in a local leaf of the call.
    fn materialize(&mut self, local: Handle, name: &str, expr: Rc<RExpr>) -> Result<()> {
        let kind = expr
            .kind
            .ok_or_else(|| ErrorKind::OperandType("=".to_string(), "None".to_string()))?;
        let leaf = self.heap.alloc_leaf(name, kind, expr.role.adopted(), None);
        self.heap.define(local, name, leaf)?;
        let location = self.ctx.location.clone();
        let target_name = self.heap.long_name(leaf);
        self.ctx.emit(
            RStmt::Assign {
                target: leaf,
                expr,
                location,
            },
            &target_name,
        )
    }

    fn copy_default(&mut self, default: &Value) -> Value {
        match default {
            Value::Object(handle) => match self.heap.leaf(*handle).cloned() {
                Some(leaf) if leaf.is_known() => {
                    Value::Object(self.heap.alloc_leaf("", leaf.kind, leaf.role, leaf.value))
                }
                _ => Value::Object(*handle),
            },
            other => other.clone(),
        }
    }

    /// Evaluate an expression that must name a type or class.
    pub(crate) fn evaluate_type(&mut self, expr: &Expr, env: &Environment) -> Result<Handle> {
        let value = self.evaluate(expr, env)?;
        match value {
            Value::Object(handle) if matches!(self.heap.get(handle), Object::Type(_) | Object::Class(_)) => {
                Ok(handle)
            }
            other => Err(ErrorKind::NotAType(self.describe_value(&other)).into()),
        }
    }

    fn has_type(&self, value: &Value, annotation: Handle) -> bool {
        match (self.heap.get(annotation), value) {
            (Object::Type(kind), Value::Object(handle)) => {
                self.heap.leaf(*handle).map(|l| l.kind) == Some(*kind)
            }
            (Object::Type(kind), Value::Residual(expr)) => expr.kind == Some(*kind),
            (Object::Class(_), Value::Object(handle)) => {
                self.heap.namespace(*handle).and_then(|ns| ns.class) == Some(annotation)
            }
            _ => false,
        }
    }

    /// The function implementing `method` for the instance `receiver`.
    pub(crate) fn special_method(&self, receiver: Handle, method: SpecialMethod) -> Option<Handle> {
        self.heap
            .lookup(receiver, method.method_name())
            .filter(|h| self.heap.function(*h).is_some())
    }

    pub(crate) fn describe_value(&self, value: &Value) -> String {
        match value {
            Value::None => "None".to_string(),
            Value::Object(handle) => self.heap.describe(*handle),
            Value::Residual(expr) => match expr.kind {
                Some(kind) => format!("{} expression", kind),
                None => "None".to_string(),
            },
        }
    }
}

enum Condition {
    Known(bool),
    Residual(Rc<RExpr>),
}
