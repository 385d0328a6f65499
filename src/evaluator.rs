//! Expression evaluator
//!
//! Reduces an expression to a heap object (known constants are fresh leaves)
//! or to a residual expression. Operands are always evaluated left to right
//! and `and` / `or` evaluate both sides.

use crate::ast::{Arg, Expr, InfixOp, Literal, PrefixOp};
use crate::environment::Environment;
use crate::error::{ErrorKind, Result};
use crate::heap::{Arity, BoundMethod, Builtin, Effect, Handle, Object};
use crate::interpreter::Interpreter;
use crate::location::Location;
use crate::residual::{RExpr, RNode};
use crate::role::{combine, Flow, Role};
use crate::value::{fold_infix, fold_prefix, infix_kind, prefix_kind, Scalar, ScalarKind, SpecialMethod, Value};
use std::rc::Rc;
use tracing::trace;

/// A Float, String or Bool operand of an operator or built-in
pub(crate) struct Operand {
    pub rexpr: Rc<RExpr>,
    /// Present when the operand is known at compile time
    pub value: Option<Scalar>,
}

impl Operand {
    pub fn kind(&self) -> ScalarKind {
        self.rexpr.kind.unwrap_or(ScalarKind::Float)
    }

    pub fn role(&self) -> Role {
        self.rexpr.role
    }
}

impl Interpreter {
    pub fn evaluate(&mut self, expr: &Expr, env: &Environment) -> Result<Value> {
        match expr {
            Expr::Literal { value, .. } => Ok(match value {
                Literal::Float(n) => Value::Object(self.heap.alloc_constant(Scalar::Float(*n))),
                Literal::String(s) => Value::Object(self.heap.alloc_constant(Scalar::String(s.clone()))),
                Literal::Bool(b) => Value::Object(self.heap.alloc_constant(Scalar::Bool(*b))),
                Literal::None => Value::None,
            }),

            Expr::Ident { name, .. } => self.lookup_name(name, env),

            Expr::Attr { object, name, .. } => {
                let object = self.evaluate(object, env)?;
                self.get_attribute(&object, name)
            }

            Expr::Prefix {
                op: PrefixOp::Derivative,
                operand,
                ..
            } => {
                let value = self.evaluate(operand, env)?;
                self.time_derivative(&value)
            }

            Expr::Prefix { op, operand, loc } => {
                let value = self.evaluate(operand, env)?;
                self.prefix(*op, value, loc)
            }

            Expr::Infix { op, left, right, loc } => {
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                self.infix(*op, left, right, loc)
            }

            Expr::Paren { expr, .. } => match self.evaluate(expr, env)? {
                Value::Residual(inner) => Ok(Value::Residual(Rc::new(RExpr {
                    role: inner.role,
                    kind: inner.kind,
                    node: RNode::Paren(inner),
                }))),
                other => Ok(other),
            },

            Expr::Call { callee, args, loc } => {
                let callee = self.evaluate(callee, env)?;
                let args = self.evaluate_args(&callee, args, env)?;
                self.call_value(&callee, args, loc)
            }
        }
    }

    /// Search local, `this`, module and built-in scopes.
    fn lookup_name(&mut self, name: &str, env: &Environment) -> Result<Value> {
        for scope in env.search_order() {
            if let Some(handle) = self.heap.lookup(scope, name) {
                if Some(scope) == env.this && self.heap.function(handle).is_some() {
                    return Ok(self.bind_method(handle, scope));
                }
                return Ok(Value::Object(handle));
            }
        }
        match self.heap.lookup(self.builtins, name) {
            Some(handle) => Ok(Value::Object(handle)),
            None => Err(ErrorKind::UndefinedAttribute(name.to_string()).into()),
        }
    }

    fn get_attribute(&mut self, object: &Value, name: &str) -> Result<Value> {
        let namespace = match object {
            Value::Object(h) if self.heap.namespace(*h).is_some() => *h,
            other => {
                return Err(ErrorKind::UndefinedAttribute(format!(
                    "{} of {}",
                    name,
                    self.describe_value(other)
                ))
                .into())
            }
        };
        match self.heap.lookup(namespace, name) {
            Some(handle) if self.heap.function(handle).is_some() => Ok(self.bind_method(handle, namespace)),
            Some(handle) => Ok(Value::Object(handle)),
            None => Err(ErrorKind::UndefinedAttribute(name.to_string()).into()),
        }
    }

    fn bind_method(&mut self, function: Handle, receiver: Handle) -> Value {
        Value::Object(
            self.heap
                .alloc(Object::BoundMethod(BoundMethod { function, receiver })),
        )
    }

    /// View a value as an operand; unknown constants can't be read.
    pub(crate) fn operand(&self, value: &Value, context: &str) -> Result<Operand> {
        match value {
            Value::Object(handle) => match self.heap.leaf(*handle) {
                Some(leaf) => {
                    if leaf.role == Role::Undetermined {
                        return Err(ErrorKind::UndeterminedRole(self.heap.long_name(*handle)).into());
                    }
                    if leaf.role == Role::Constant && leaf.value.is_none() {
                        return Err(ErrorKind::UnknownConstant(self.heap.long_name(*handle)).into());
                    }
                    Ok(match &leaf.value {
                        Some(value) if leaf.is_known() => Operand {
                            rexpr: RExpr::literal(value.clone()),
                            value: Some(value.clone()),
                        },
                        _ => Operand {
                            rexpr: RExpr::leaf(*handle, leaf.role, leaf.kind),
                            value: None,
                        },
                    })
                }
                None => Err(ErrorKind::OperandType(context.to_string(), self.heap.describe(*handle)).into()),
            },
            Value::Residual(expr) if expr.kind.is_some() => Ok(Operand {
                rexpr: expr.clone(),
                value: None,
            }),
            other => Err(ErrorKind::OperandType(context.to_string(), self.describe_value(other)).into()),
        }
    }

    fn prefix(&mut self, op: PrefixOp, value: Value, loc: &Location) -> Result<Value> {
        if let Some(receiver) = self.instance(&value) {
            return self.call_operator(receiver, op.special_method(), Vec::new(), &op.to_string(), loc);
        }

        let context = op.to_string().trim().to_string();
        let operand = self.operand(&value, &context)?;
        let kind = prefix_kind(op, operand.kind())
            .ok_or_else(|| ErrorKind::OperandType(context.clone(), operand.kind().to_string()))?;

        if let Some(known) = &operand.value {
            if let Some(result) = fold_prefix(op, known) {
                return Ok(Value::Object(self.heap.alloc_constant(result)));
            }
        }
        Ok(Value::Residual(Rc::new(RExpr {
            role: operand.role(),
            kind: Some(kind),
            node: RNode::Prefix {
                op,
                operand: operand.rexpr,
            },
        })))
    }

    fn infix(&mut self, op: InfixOp, left: Value, right: Value, loc: &Location) -> Result<Value> {
        if let Some(receiver) = self.instance(&left) {
            return self.call_operator(receiver, Some(op.special_method()), vec![right], &op.to_string(), loc);
        }

        let context = op.to_string();
        let l = self.operand(&left, &context)?;
        let r = self.operand(&right, &context)?;
        let kind = infix_kind(op, l.kind(), r.kind()).ok_or_else(|| {
            ErrorKind::OperandType(context.clone(), format!("{} and {}", l.kind(), r.kind()))
        })?;

        if let (Some(a), Some(b)) = (&l.value, &r.value) {
            if let Some(result) = fold_infix(op, a, b) {
                trace!(%op, %result, "folded");
                return Ok(Value::Object(self.heap.alloc_constant(result)));
            }
        }

        let role = combine([l.role(), r.role()])?;
        Ok(Value::Residual(Rc::new(RExpr {
            role,
            kind: Some(kind),
            node: RNode::Infix {
                op,
                left: l.rexpr,
                right: r.rexpr,
            },
        })))
    }

    fn instance(&self, value: &Value) -> Option<Handle> {
        value.as_object().filter(|h| self.heap.namespace(*h).is_some())
    }

    /// Dispatch an operator on a user class instance to its special method.
    fn call_operator(
        &mut self,
        receiver: Handle,
        method: Option<SpecialMethod>,
        args: Vec<Value>,
        op: &str,
        loc: &Location,
    ) -> Result<Value> {
        let function = method.and_then(|m| self.special_method(receiver, m));
        match function {
            Some(function) => {
                let args = args.into_iter().map(|v| (None, v)).collect();
                self.call_function(function, Some(receiver), args, loc)
            }
            None => Err(ErrorKind::OperandType(op.to_string(), self.heap.describe(receiver)).into()),
        }
    }

    /// `$x`: the time derivative of a variable, created on first use.
    fn time_derivative(&mut self, value: &Value) -> Result<Value> {
        let handle = match value {
            Value::Object(h) if self.heap.leaf(*h).is_some() => *h,
            other => return Err(ErrorKind::InvalidDerivative(self.describe_value(other)).into()),
        };
        let leaf = match self.heap.leaf(handle) {
            Some(leaf) => leaf.clone(),
            None => return Err(ErrorKind::InvalidDerivative(self.heap.describe(handle)).into()),
        };
        if let Some(derivative) = leaf.derivative {
            return Ok(Value::Object(derivative));
        }
        if leaf.kind != ScalarKind::Float || !leaf.role.is_variable() || leaf.parent == Some(self.builtins) {
            return Err(ErrorKind::InvalidDerivative(self.heap.long_name(handle)).into());
        }

        let derivative = self.heap.alloc_leaf(
            &format!("{}$time", leaf.name),
            ScalarKind::Float,
            Role::Variable(Flow::Output),
            None,
        );
        if let Some(d) = self.heap.leaf_mut(derivative) {
            d.parent = leaf.parent;
            d.derivative_of = Some(handle);
        }
        if let Some(x) = self.heap.leaf_mut(handle) {
            x.derivative = Some(derivative);
            x.role = Role::Variable(Flow::Input);
        }
        trace!(variable = %self.heap.long_name(handle), "created time derivative");
        Ok(Value::Object(derivative))
    }

    fn evaluate_args(
        &mut self,
        callee: &Value,
        args: &[Arg],
        env: &Environment,
    ) -> Result<Vec<(Option<String>, Value)>> {
        let mut seen_keyword = false;
        for arg in args {
            if arg.name.is_some() {
                seen_keyword = true;
            } else if seen_keyword {
                return Err(ErrorKind::PositionalAfterKeyword(self.describe_value(callee)).into());
            }
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.evaluate(&arg.value, env)?;
            values.push((arg.name.clone(), value));
        }
        Ok(values)
    }

    fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<(Option<String>, Value)>,
        loc: &Location,
    ) -> Result<Value> {
        let handle = match callee {
            Value::Object(h) => *h,
            other => return Err(ErrorKind::NotCallable(self.describe_value(other)).into()),
        };
        match self.heap.get(handle) {
            Object::Function(_) => self.call_function(handle, None, args, loc),
            Object::BoundMethod(method) => {
                let method = *method;
                self.call_function(method.function, Some(method.receiver), args, loc)
            }
            Object::Builtin(builtin) => {
                let builtin = builtin.clone();
                self.call_builtin(&builtin, args)
            }
            _ => Err(ErrorKind::NotCallable(self.heap.describe(handle)).into()),
        }
    }

    fn call_builtin(&mut self, builtin: &Builtin, args: Vec<(Option<String>, Value)>) -> Result<Value> {
        if let Some((Some(name), _)) = args.iter().find(|(name, _)| name.is_some()) {
            return Err(ErrorKind::UnknownKeyword(builtin.name.to_string(), name.clone()).into());
        }
        let values: Vec<Value> = args.into_iter().map(|(_, v)| v).collect();
        if let Arity::Exact(n) = builtin.arity {
            if values.len() > n {
                return Err(ErrorKind::TooManyArguments(builtin.name.to_string(), n, values.len()).into());
            }
            if values.len() < n {
                return Err(ErrorKind::MissingArgument(
                    builtin.name.to_string(),
                    format!("argument {}", values.len() + 1),
                )
                .into());
            }
        }

        match builtin.effect {
            Effect::Pure(function) => {
                let mut operands = Vec::with_capacity(values.len());
                for (i, value) in values.iter().enumerate() {
                    let operand = self.operand(value, builtin.name)?;
                    if operand.kind() != ScalarKind::Float {
                        return Err(ErrorKind::ArgumentType(
                            builtin.name.to_string(),
                            format!("argument {}", i + 1),
                            ScalarKind::Float.to_string(),
                            operand.kind().to_string(),
                        )
                        .into());
                    }
                    operands.push(operand);
                }
                let known: Option<Vec<f64>> = operands
                    .iter()
                    .map(|o| match o.value {
                        Some(Scalar::Float(n)) => Some(n),
                        _ => None,
                    })
                    .collect();
                match known {
                    Some(numbers) => Ok(Value::Object(
                        self.heap.alloc_constant(Scalar::Float(function(&numbers))),
                    )),
                    None => self.residual_call(builtin, operands, Some(ScalarKind::Float)),
                }
            }
            Effect::Print | Effect::Runtime if self.ctx.collecting() => {
                let mut operands = Vec::with_capacity(values.len());
                for value in &values {
                    operands.push(self.operand(value, builtin.name)?);
                }
                self.residual_call(builtin, operands, None)
            }
            Effect::Print => {
                let line = self.format_args(&values, false)?;
                self.ctx.print(line);
                Ok(Value::None)
            }
            Effect::Runtime => Err(ErrorKind::CodeOutsideCompile(builtin.name.to_string()).into()),
            Effect::Diagnostic => {
                let line = self.format_args(&values, true)?;
                self.ctx.print(line);
                Ok(Value::None)
            }
        }
    }

    fn residual_call(
        &mut self,
        builtin: &Builtin,
        operands: Vec<Operand>,
        kind: Option<ScalarKind>,
    ) -> Result<Value> {
        let role = combine(operands.iter().map(|o| o.role()))?;
        Ok(Value::Residual(Rc::new(RExpr {
            role,
            kind,
            node: RNode::Call {
                function: builtin.name,
                args: operands.into_iter().map(|o| o.rexpr).collect(),
            },
        })))
    }

    /// Text printed by `print` at compile time and by `printc`.
    ///
    /// `printc` may show values that are not known yet; they are shown by name.
    fn format_args(&self, values: &[Value], lenient: bool) -> Result<String> {
        let mut parts = Vec::with_capacity(values.len());
        for value in values {
            let text = match value {
                Value::Object(h) => match self.heap.leaf(*h) {
                    Some(leaf) if leaf.is_known() => match &leaf.value {
                        Some(Scalar::String(s)) => s.clone(),
                        Some(other) => other.to_string(),
                        None => String::new(),
                    },
                    Some(_) if lenient => self.heap.long_name(*h),
                    Some(_) => {
                        self.operand(value, "print")?;
                        return Err(ErrorKind::CodeOutsideCompile("print".to_string()).into());
                    }
                    None => self.heap.describe(*h),
                },
                Value::Residual(_) if lenient => "<expression>".to_string(),
                Value::Residual(_) => {
                    return Err(ErrorKind::CodeOutsideCompile("print".to_string()).into())
                }
                Value::None => "None".to_string(),
            };
            parts.push(text);
        }
        Ok(parts.join(" "))
    }
}
