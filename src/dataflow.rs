//! Dataflow checker
//!
//! Verifies that the generated code of every main function only reads
//! attributes that are known at that point of the simulation, only writes
//! attributes it is responsible for and computes everything it must.

use crate::config::BuildConfig;
use crate::error::{ErrorKind, Result, SimlError};
use crate::flatten::{AttrId, FlatObject, FlatStmt, FlatStmtKind, PhaseCode};
use std::collections::BTreeSet;
use tracing::debug;

/// What a main function is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// `initialize` and `init_*`: compute parameters and initial states
    Init,
    /// `dynamic`: compute the time derivatives
    Dynamic,
    /// `final`: compute results after the simulation
    Final,
}

impl PhaseKind {
    pub fn of(name: &str) -> Option<PhaseKind> {
        match name {
            "initialize" => Some(PhaseKind::Init),
            "dynamic" => Some(PhaseKind::Dynamic),
            "final" => Some(PhaseKind::Final),
            _ if name.starts_with("init_") => Some(PhaseKind::Init),
            _ => None,
        }
    }
}

struct Rules {
    known: BTreeSet<AttrId>,
    assignable: BTreeSet<AttrId>,
    required: BTreeSet<AttrId>,
}

fn rules(object: &FlatObject, phase: &PhaseCode, kind: PhaseKind, config: &BuildConfig) -> Rules {
    let set = |lists: &[&Vec<AttrId>]| -> BTreeSet<AttrId> {
        lists.iter().flat_map(|l| l.iter().copied()).collect()
    };
    let locals = set(&[&phase.locals]);

    let (mut known, mut assignable, required) = match kind {
        PhaseKind::Init => (
            set(&[&object.constants, &phase.external_inputs]),
            set(&[
                &object.parameters,
                &object.states,
                &object.intermediates,
                &phase.external_inputs,
            ]),
            if config.require_initial_values {
                set(&[&object.parameters, &object.states])
            } else {
                BTreeSet::new()
            },
        ),
        PhaseKind::Dynamic => (
            set(&[&object.constants, &object.parameters, &object.states]),
            set(&[&object.intermediates, &object.outputs]),
            set(&[&object.outputs]),
        ),
        PhaseKind::Final => (
            set(&[
                &object.constants,
                &object.parameters,
                &object.states,
                &object.intermediates,
            ]),
            set(&[&object.intermediates]),
            BTreeSet::new(),
        ),
    };
    known.insert(object.time);
    known.retain(|id| !locals.contains(id));
    assignable.extend(locals);
    Rules {
        known,
        assignable,
        required,
    }
}

/// Check every main function of `object`.
pub fn check(object: &FlatObject, config: &BuildConfig) -> Result<()> {
    for phase in &object.phases {
        let kind = match PhaseKind::of(&phase.name) {
            Some(kind) => kind,
            None => continue,
        };
        debug!(object = %object.name, phase = %phase.name, ?kind, "checking dataflow");

        let Rules {
            mut known,
            assignable,
            required,
        } = rules(object, phase, kind, config);
        let checker = Checker {
            object,
            phase: &phase.name,
            assignable: &assignable,
        };
        checker.block(&phase.statements, &mut known)?;

        let missing: BTreeSet<AttrId> = required.difference(&known).copied().collect();
        if !missing.is_empty() {
            return Err(ErrorKind::MissingAssignment(phase.name.clone(), checker.names(&missing)).into());
        }
    }
    Ok(())
}

struct Checker<'a> {
    object: &'a FlatObject,
    phase: &'a str,
    assignable: &'a BTreeSet<AttrId>,
}

impl Checker<'_> {
    fn names(&self, ids: &BTreeSet<AttrId>) -> String {
        ids.iter()
            .filter_map(|&id| self.object.attribute(id))
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn error(&self, kind: ErrorKind, stmt: &FlatStmt) -> SimlError {
        SimlError::new(kind, Some(stmt.location.clone()))
    }

    fn reads(&self, read: &BTreeSet<AttrId>, known: &BTreeSet<AttrId>, stmt: &FlatStmt) -> Result<()> {
        let unknown: BTreeSet<AttrId> = read.difference(known).copied().collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(self.error(
                ErrorKind::IllegalRead(self.phase.to_string(), self.names(&unknown)),
                stmt,
            ))
        }
    }

    fn block(&self, statements: &[FlatStmt], known: &mut BTreeSet<AttrId>) -> Result<()> {
        for stmt in statements {
            self.stmt(stmt, known)?;
        }
        Ok(())
    }

    fn stmt(&self, stmt: &FlatStmt, known: &mut BTreeSet<AttrId>) -> Result<()> {
        match &stmt.kind {
            FlatStmtKind::Assign { target, .. } => {
                self.reads(&stmt.inputs, known, stmt)?;
                if !self.assignable.contains(target) {
                    let target = BTreeSet::from([*target]);
                    return Err(self.error(
                        ErrorKind::IllegalTarget(self.phase.to_string(), self.names(&target)),
                        stmt,
                    ));
                }
                known.insert(*target);
            }
            FlatStmtKind::Expr { .. } => self.reads(&stmt.inputs, known, stmt)?,
            FlatStmtKind::If { clauses } => {
                for clause in clauses {
                    if let Some(condition) = &clause.condition {
                        let mut read = BTreeSet::new();
                        condition.attributes(&mut read);
                        self.reads(&read, known, stmt)?;
                    }
                    let mut branch = known.clone();
                    self.block(&clause.body, &mut branch)?;
                }
                known.extend(stmt.outputs.iter().copied());
            }
        }
        Ok(())
    }
}
