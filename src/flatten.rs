//! Object flattener
//!
//! `compile Model` instantiates a class, runs its main functions as inlined
//! method calls and merges everything into a flat list of attributes plus
//! the generated code of each phase. Expressions of the generated code
//! refer to attributes by index.

use crate::ast::{InfixOp, PrefixOp};
use crate::dataflow;
use crate::error::{ErrorKind, Result};
use crate::heap::{Handle, Heap, Object};
use crate::interpreter::Interpreter;
use crate::location::Location;
use crate::residual::{RExpr, RNode, RStmt};
use crate::role::{Flow, Role};
use crate::value::{Scalar, ScalarKind, Value};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

/// Index of an attribute in [`FlatObject::attributes`]
pub type AttrId = usize;

/// Main functions that always exist, in execution order.
pub const MAIN_FUNCTIONS: [&str; 3] = ["initialize", "dynamic", "final"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatAttribute {
    /// Dotted name relative to the compiled object
    pub name: String,
    pub kind: ScalarKind,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Scalar>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlatExpr {
    Attr { id: AttrId },
    Literal { value: Scalar },
    Prefix { op: PrefixOp, operand: Box<FlatExpr> },
    Infix { op: InfixOp, left: Box<FlatExpr>, right: Box<FlatExpr> },
    Call { function: String, args: Vec<FlatExpr> },
    Paren { expr: Box<FlatExpr> },
}

impl FlatExpr {
    /// Attributes read by this expression.
    pub fn attributes(&self, out: &mut BTreeSet<AttrId>) {
        match self {
            FlatExpr::Attr { id } => {
                out.insert(*id);
            }
            FlatExpr::Literal { .. } => {}
            FlatExpr::Prefix { operand, .. } => operand.attributes(out),
            FlatExpr::Infix { left, right, .. } => {
                left.attributes(out);
                right.attributes(out);
            }
            FlatExpr::Call { args, .. } => {
                for arg in args {
                    arg.attributes(out);
                }
            }
            FlatExpr::Paren { expr } => expr.attributes(out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatClause {
    pub condition: Option<FlatExpr>,
    pub body: Vec<FlatStmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlatStmtKind {
    Assign { target: AttrId, expr: FlatExpr },
    If { clauses: Vec<FlatClause> },
    Expr { expr: FlatExpr },
}

/// A statement of generated code with the attributes it reads and writes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatStmt {
    pub kind: FlatStmtKind,
    pub inputs: BTreeSet<AttrId>,
    pub outputs: BTreeSet<AttrId>,
    pub location: Location,
}

/// Generated code of one main function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseCode {
    pub name: String,
    /// Parameters of the main function after `this`, supplied by the runtime
    pub external_inputs: Vec<AttrId>,
    /// Data created by the function and the calls inlined into it
    pub locals: Vec<AttrId>,
    pub statements: Vec<FlatStmt>,
}

/// Result of flattening one `compile` statement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatObject {
    pub name: String,
    pub class_name: String,
    pub attributes: Vec<FlatAttribute>,
    pub constants: Vec<AttrId>,
    pub parameters: Vec<AttrId>,
    pub states: Vec<AttrId>,
    pub intermediates: Vec<AttrId>,
    /// Time derivatives of the states
    pub outputs: Vec<AttrId>,
    pub time: AttrId,
    pub phases: Vec<PhaseCode>,
}

impl FlatObject {
    pub fn id_of(&self, name: &str) -> Option<AttrId> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn attribute(&self, id: AttrId) -> Option<&FlatAttribute> {
        self.attributes.get(id)
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseCode> {
        self.phases.iter().find(|p| p.name == name)
    }

    fn name_of(&self, id: AttrId) -> &str {
        self.attributes.get(id).map(|a| a.name.as_str()).unwrap_or("?")
    }

    fn write_expr(&self, out: &mut String, expr: &FlatExpr) {
        match expr {
            FlatExpr::Attr { id } => out.push_str(self.name_of(*id)),
            FlatExpr::Literal { value } => out.push_str(&value.to_string()),
            FlatExpr::Prefix { op, operand } => {
                out.push_str(&op.to_string());
                self.write_expr(out, operand);
            }
            FlatExpr::Infix { op, left, right } => {
                self.write_expr(out, left);
                out.push_str(&format!(" {} ", op));
                self.write_expr(out, right);
            }
            FlatExpr::Call { function, args } => {
                out.push_str(function);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_expr(out, arg);
                }
                out.push(')');
            }
            FlatExpr::Paren { expr } => {
                out.push('(');
                self.write_expr(out, expr);
                out.push(')');
            }
        }
    }

    fn write_block(&self, out: &mut String, statements: &[FlatStmt], indent: usize) {
        let pad = "    ".repeat(indent);
        if statements.is_empty() {
            out.push_str(&format!("{}pass\n", pad));
        }
        for stmt in statements {
            match &stmt.kind {
                FlatStmtKind::Assign { target, expr } => {
                    out.push_str(&format!("{}{} = ", pad, self.name_of(*target)));
                    self.write_expr(out, expr);
                    out.push('\n');
                }
                FlatStmtKind::Expr { expr } => {
                    out.push_str(&pad);
                    self.write_expr(out, expr);
                    out.push('\n');
                }
                FlatStmtKind::If { clauses } => {
                    for (i, clause) in clauses.iter().enumerate() {
                        match &clause.condition {
                            Some(condition) => {
                                out.push_str(&pad);
                                out.push_str(if i == 0 { "if " } else { "elif " });
                                self.write_expr(out, condition);
                                out.push_str(":\n");
                            }
                            None => out.push_str(&format!("{}else:\n", pad)),
                        }
                        self.write_block(out, &clause.body, indent + 1);
                    }
                }
            }
        }
    }

    /// Readable rendering of the object and its generated code.
    pub fn pseudo_code(&self) -> String {
        let mut out = format!("== {} ({}) ==\n", self.name, self.class_name);
        let sections = [
            ("const", &self.constants),
            ("param", &self.parameters),
            ("state", &self.states),
            ("algebraic", &self.intermediates),
            ("derivative", &self.outputs),
        ];
        for (label, ids) in sections {
            for &id in ids {
                if let Some(attribute) = self.attribute(id) {
                    out.push_str(&format!("{} {}: {}", label, attribute.name, attribute.kind));
                    if let Some(value) = &attribute.value {
                        out.push_str(&format!(" = {}", value));
                    }
                    out.push('\n');
                }
            }
        }

        for phase in &self.phases {
            let params: Vec<&str> = phase.external_inputs.iter().map(|&id| self.name_of(id)).collect();
            out.push_str(&format!("\nfunc {}({}):\n", phase.name, params.join(", ")));
            self.write_block(&mut out, &phase.statements, 1);
        }
        out
    }
}

impl fmt::Display for FlatObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pseudo_code())
    }
}

/// Residual code of one main function before lowering
struct PhaseRun {
    name: String,
    root: Handle,
    externals: Vec<(String, Handle)>,
    statements: Vec<RStmt>,
}

/// Collects the attributes of the flat object and their ids
struct Merger<'a> {
    heap: &'a Heap,
    attributes: Vec<FlatAttribute>,
    ids: HashMap<Handle, AttrId>,
    names: HashSet<String>,
}

impl<'a> Merger<'a> {
    fn new(heap: &'a Heap) -> Self {
        Self {
            heap,
            attributes: Vec::new(),
            ids: HashMap::new(),
            names: HashSet::new(),
        }
    }

    fn add(&mut self, name: &str, handle: Handle) -> AttrId {
        if let Some(&id) = self.ids.get(&handle) {
            return id;
        }
        let mut unique = name.to_string();
        let mut n = 0;
        while self.names.contains(&unique) {
            n += 1;
            unique = format!("{}_{}", name, n);
        }
        self.names.insert(unique.clone());

        let (kind, role, value) = match self.heap.leaf(handle) {
            Some(leaf) => (
                leaf.kind,
                leaf.role,
                if leaf.is_known() { leaf.value.clone() } else { None },
            ),
            None => (ScalarKind::Float, Role::VARIABLE, None),
        };
        let id = self.attributes.len();
        self.attributes.push(FlatAttribute {
            name: unique,
            kind,
            role,
            value,
        });
        self.ids.insert(handle, id);
        id
    }

    /// Add the leaves owned by `namespace`, depth first.
    ///
    /// Undetermined leaves are an error in the object itself and are skipped
    /// in the local data of functions.
    fn walk(&mut self, namespace: Handle, prefix: &str, strict: bool, added: &mut Vec<AttrId>) -> Result<()> {
        let heap = self.heap;
        for (name, child) in heap.owned_attributes(namespace) {
            let full_name = format!("{}{}", prefix, name);
            match heap.get(child) {
                Object::Leaf(leaf) => {
                    if leaf.role == Role::Undetermined {
                        if strict {
                            return Err(ErrorKind::UndeterminedRole(full_name).into());
                        }
                        continue;
                    }
                    let derivative = leaf.derivative;
                    added.push(self.add(&full_name, child));
                    if let Some(derivative) = derivative {
                        added.push(self.add(&format!("{}$time", full_name), derivative));
                    }
                }
                Object::Namespace(_) => {
                    self.walk(child, &format!("{}.", full_name), strict, added)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Lowers residual code from handles to attribute ids
struct Lowering<'a> {
    heap: &'a Heap,
    ids: &'a HashMap<Handle, AttrId>,
}

impl Lowering<'_> {
    fn attr(&self, handle: Handle) -> Result<AttrId> {
        self.ids
            .get(&handle)
            .copied()
            .ok_or_else(|| ErrorKind::ForeignAttribute(self.heap.long_name(handle)).into())
    }

    fn expr(&self, expr: &RExpr) -> Result<FlatExpr> {
        Ok(match &expr.node {
            RNode::Leaf(handle) => FlatExpr::Attr { id: self.attr(*handle)? },
            RNode::Literal(value) => FlatExpr::Literal { value: value.clone() },
            RNode::Prefix { op, operand } => FlatExpr::Prefix {
                op: *op,
                operand: Box::new(self.expr(operand)?),
            },
            RNode::Infix { op, left, right } => FlatExpr::Infix {
                op: *op,
                left: Box::new(self.expr(left)?),
                right: Box::new(self.expr(right)?),
            },
            RNode::Call { function, args } => FlatExpr::Call {
                function: function.to_string(),
                args: args.iter().map(|a| self.expr(a)).collect::<Result<_>>()?,
            },
            RNode::Paren(inner) => FlatExpr::Paren {
                expr: Box::new(self.expr(inner)?),
            },
        })
    }

    fn block(&self, statements: &[RStmt]) -> Result<Vec<FlatStmt>> {
        statements
            .iter()
            .map(|s| self.stmt(s).map_err(|e| e.or_location(s.location())))
            .collect()
    }

    fn stmt(&self, stmt: &RStmt) -> Result<FlatStmt> {
        let mut inputs = BTreeSet::new();
        let mut outputs = BTreeSet::new();
        let kind = match stmt {
            RStmt::Assign { target, expr, .. } => {
                let expr = self.expr(expr)?;
                expr.attributes(&mut inputs);
                let target = self.attr(*target)?;
                outputs.insert(target);
                FlatStmtKind::Assign { target, expr }
            }
            RStmt::Expr { expr, .. } => {
                let expr = self.expr(expr)?;
                expr.attributes(&mut inputs);
                FlatStmtKind::Expr { expr }
            }
            RStmt::If { clauses, .. } => {
                let mut flat = Vec::with_capacity(clauses.len());
                for clause in clauses {
                    let condition = match &clause.condition {
                        Some(c) => Some(self.expr(c)?),
                        None => None,
                    };
                    if let Some(c) = &condition {
                        c.attributes(&mut inputs);
                    }
                    let body = self.block(&clause.body)?;
                    for s in &body {
                        inputs.extend(s.inputs.iter().copied());
                        outputs.extend(s.outputs.iter().copied());
                    }
                    flat.push(FlatClause { condition, body });
                }
                FlatStmtKind::If { clauses: flat }
            }
        };
        Ok(FlatStmt {
            kind,
            inputs,
            outputs,
            location: stmt.location().clone(),
        })
    }
}

impl Interpreter {
    /// Flatten an instance of `class` into a [`FlatObject`] called `name`.
    pub fn compile_class(&mut self, class: Handle, name: &str, loc: &Location) -> Result<FlatObject> {
        let (class_name, template) = match self.heap.class(class) {
            Some(c) => (c.name.clone(), c.template),
            None => return Err(ErrorKind::NotAType(self.heap.describe(class)).into()),
        };
        info!(object = name, class = %class_name, "compiling object");

        let instance = self.heap.instantiate(template, self.config.max_nesting_depth)?;
        if let Some(ns) = self.heap.namespace_mut(instance) {
            ns.name = name.to_string();
        }
        self.heap.apply_role(instance, Role::VARIABLE);

        let mut phase_names: Vec<String> = MAIN_FUNCTIONS.iter().map(|s| s.to_string()).collect();
        if let Some(ns) = self.heap.namespace(instance) {
            phase_names.extend(
                ns.attributes
                    .iter()
                    .filter(|&(n, &h)| n.starts_with("init_") && self.heap.function(h).is_some())
                    .map(|(n, _)| n.clone()),
            );
        }

        let mut runs = Vec::with_capacity(phase_names.len());
        for phase in &phase_names {
            runs.push(self.run_phase(instance, phase, loc)?);
        }

        let object = self.merge(instance, name, class_name, &runs)?;
        if self.config.check_dataflow {
            dataflow::check(&object, &self.config)?;
        }
        info!(
            object = name,
            attributes = object.attributes.len(),
            states = object.states.len(),
            "object compiled"
        );
        Ok(object)
    }

    /// Run one main function as a method of `instance`, collecting its code.
    fn run_phase(&mut self, instance: Handle, phase: &str, loc: &Location) -> Result<PhaseRun> {
        let root = self.heap.alloc_namespace(phase, Role::Undetermined);
        let function = self
            .heap
            .lookup(instance, phase)
            .and_then(|h| self.heap.function(h).cloned());
        let function = match function {
            Some(f) => f,
            None => {
                return Ok(PhaseRun {
                    name: phase.to_string(),
                    root,
                    externals: Vec::new(),
                    statements: Vec::new(),
                })
            }
        };
        debug!(phase, "running main function");

        let mut externals = Vec::new();
        for param in function.external_params() {
            let kind = match param.annotation.map(|h| (h, self.heap.get(h))) {
                None => ScalarKind::Float,
                Some((_, Object::Type(kind))) => *kind,
                Some((h, _)) => return Err(ErrorKind::NotAType(self.heap.describe(h)).into()),
            };
            let leaf = self.heap.alloc_leaf(&param.name, kind, Role::Parameter, None);
            externals.push((param.name.clone(), leaf));
        }
        let args = externals
            .iter()
            .map(|&(_, h)| (None, Value::Object(h)))
            .collect();

        self.ctx.push_sink();
        self.ctx.push_locals_root(root);
        let result = self
            .bind_arguments(&function, Some(instance), args)
            .and_then(|bound| self.inline(&function, Some(instance), bound, root, loc));
        self.ctx.pop_locals_root();
        let statements = self.ctx.pop_sink();
        result?;

        Ok(PhaseRun {
            name: phase.to_string(),
            root,
            externals,
            statements,
        })
    }

    fn merge(&self, instance: Handle, name: &str, class_name: String, runs: &[PhaseRun]) -> Result<FlatObject> {
        let mut merger = Merger::new(&self.heap);
        let mut object_ids = Vec::new();
        merger.walk(instance, "", true, &mut object_ids)?;

        let mut locals = Vec::with_capacity(runs.len());
        for run in runs {
            let mut added = Vec::new();
            merger.walk(run.root, &format!("{}.", run.name), false, &mut added)?;
            locals.push(added);
        }
        let mut externals = Vec::with_capacity(runs.len());
        for run in runs {
            let ids: Vec<AttrId> = run
                .externals
                .iter()
                .map(|(param, h)| merger.add(&format!("{}.{}", run.name, param), *h))
                .collect();
            externals.push(ids);
        }
        let time_leaf = self
            .heap
            .lookup(self.builtins, "time")
            .ok_or_else(|| ErrorKind::UndefinedAttribute("time".to_string()))?;
        let time = merger.add("time", time_leaf);

        let lowering = Lowering {
            heap: &self.heap,
            ids: &merger.ids,
        };
        let mut phases = Vec::with_capacity(runs.len());
        for ((run, locals), external_inputs) in runs.iter().zip(locals).zip(externals) {
            phases.push(PhaseCode {
                name: run.name.clone(),
                external_inputs,
                locals,
                statements: lowering.block(&run.statements)?,
            });
        }

        let excluded: HashSet<AttrId> = phases
            .iter()
            .flat_map(|p| p.external_inputs.iter().copied())
            .chain(std::iter::once(time))
            .collect();
        let mut object = FlatObject {
            name: name.to_string(),
            class_name,
            attributes: merger.attributes,
            constants: Vec::new(),
            parameters: Vec::new(),
            states: Vec::new(),
            intermediates: Vec::new(),
            outputs: Vec::new(),
            time,
            phases,
        };
        for (id, attribute) in object.attributes.iter().enumerate() {
            if excluded.contains(&id) {
                continue;
            }
            match attribute.role {
                Role::Constant => object.constants.push(id),
                Role::Parameter => object.parameters.push(id),
                Role::Variable(Flow::Input) => object.states.push(id),
                Role::Variable(Flow::Intermediate) => object.intermediates.push(id),
                Role::Variable(Flow::Output) => object.outputs.push(id),
                Role::Undetermined => {}
            }
        }
        Ok(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, InfixOp, Module, Param, RoleKeyword, Stmt};
    use crate::config::BuildConfig;

    fn compile(class_body: Vec<Stmt>) -> FlatObject {
        let module = Module::new(
            "test",
            vec![Stmt::class("Model", class_body), Stmt::compile("Model", "m")],
        );
        let mut config = BuildConfig::default();
        config.check_dataflow = false;
        let mut interp = Interpreter::with_config(config);
        interp.interpret(&module).unwrap().remove(0)
    }

    #[test]
    fn test_missing_phases_are_empty() {
        let object = compile(vec![Stmt::data("x", "Float", None)]);
        let names: Vec<_> = object.phases.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["initialize", "dynamic", "final"]);
        assert!(object.phases.iter().all(|p| p.statements.is_empty()));
        assert_eq!(object.attributes[object.time].name, "time");
    }

    #[test]
    fn test_derivative_follows_variable() {
        let object = compile(vec![
            Stmt::data("x", "Float", None),
            Stmt::data("y", "Float", None),
            Stmt::method(
                "dynamic",
                vec![],
                vec![Stmt::assign(
                    Expr::derivative(Expr::path("this.x")),
                    Expr::infix(Expr::float(0.0), InfixOp::Sub, Expr::path("this.x")),
                )],
            ),
        ]);
        let names: Vec<_> = object.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["x", "x$time", "y", "time"]);
        assert_eq!(object.states, vec![0]);
        assert_eq!(object.outputs, vec![1]);
        assert_eq!(object.intermediates, vec![2]);
    }

    #[test]
    fn test_external_inputs() {
        let object = compile(vec![
            Stmt::data("p", "Float", Some(RoleKeyword::Param)),
            Stmt::method(
                "init_mass",
                vec![Param::new("mass").typed(Expr::path("Float"))],
                vec![Stmt::assign(Expr::path("this.p"), Expr::ident("mass"))],
            ),
        ]);
        let phase = object.phase("init_mass").unwrap();
        assert_eq!(phase.external_inputs.len(), 1);
        let mass = phase.external_inputs[0];
        assert_eq!(object.attributes[mass].name, "init_mass.mass");
        assert!(!object.parameters.contains(&mass));
        assert_eq!(phase.statements[0].inputs.iter().copied().collect::<Vec<_>>(), vec![mass]);
    }

    #[test]
    fn test_pseudo_code() {
        let object = compile(vec![
            Stmt::data("k", "Float", Some(RoleKeyword::Const)),
            Stmt::data("x", "Float", None),
            Stmt::method("initialize", vec![], vec![Stmt::assign(Expr::path("this.k"), Expr::float(2.0))]),
            Stmt::method(
                "dynamic",
                vec![],
                vec![Stmt::assign(
                    Expr::path("this.x"),
                    Expr::infix(Expr::path("this.k"), InfixOp::Mul, Expr::path("time")),
                )],
            ),
        ]);
        let text = object.to_string();
        assert!(text.starts_with("== m (Model) =="));
        assert!(text.contains("const k: Float = 2.0"));
        assert!(text.contains("x = 2.0 * time"));
    }
}
