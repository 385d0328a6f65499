//! Integration tests for error reporting

use siml::ast::{Arg, Clause, Expr, InfixOp, PrefixOp, RoleKeyword, Stmt};
use siml::error::Category;
use siml::{compile_module, Location, Module, SimlError};

fn compile_err(statements: Vec<Stmt>) -> SimlError {
    match compile_module(&Module::new("test", statements)) {
        Ok(_) => panic!("expected an error"),
        Err(e) => e,
    }
}

/// Compile a class `Model` with the given body as object `m`.
fn model_err(body: Vec<Stmt>) -> SimlError {
    compile_err(vec![Stmt::class("Model", body), Stmt::compile("Model", "m")])
}

#[test]
fn test_undefined_name() {
    let err = compile_err(vec![Stmt::expr(Expr::call(Expr::ident("nowhere"), vec![]))]);
    assert_eq!(err.code(), 3250100);
    assert_eq!(err.kind.category(), Category::UndefinedReference);
}

#[test]
fn test_not_callable() {
    let err = compile_err(vec![
        Stmt::data("a", "Float", Some(RoleKeyword::Const)),
        Stmt::expr(Expr::call(Expr::ident("a"), vec![])),
    ]);
    assert_eq!(err.code(), 3250300);
}

#[test]
fn test_not_a_type() {
    let err = compile_err(vec![
        Stmt::func("f", vec![], vec![Stmt::pass()]),
        Stmt::data("a", "f", None),
    ]);
    assert_eq!(err.code(), 3300300);
}

#[test]
fn test_unknown_constant() {
    let err = compile_err(vec![
        Stmt::data("a", "Float", Some(RoleKeyword::Const)),
        Stmt::data("b", "Float", Some(RoleKeyword::Const)),
        Stmt::assign(Expr::ident("b"), Expr::ident("a")),
    ]);
    assert_eq!(err.code(), 3190110);
    assert_eq!(err.kind.category(), Category::UnresolvedConstant);
}

#[test]
fn test_undetermined_local() {
    let err = compile_err(vec![
        Stmt::func(
            "f",
            vec![],
            vec![
                Stmt::data("t", "Float", None),
                Stmt::ret(Some(Expr::infix(Expr::ident("t"), InfixOp::Add, Expr::float(1.0)))),
            ],
        ),
        Stmt::expr(Expr::call(Expr::ident("f"), vec![])),
    ]);
    assert_eq!(err.code(), 3190120);
}

#[test]
fn test_variable_to_constant() {
    let err = model_err(vec![
        Stmt::data("k", "Float", Some(RoleKeyword::Const)),
        Stmt::data("x", "Float", None),
        Stmt::method("dynamic", vec![], vec![Stmt::assign(Expr::path("this.k"), Expr::path("this.x"))]),
    ]);
    assert_eq!(err.code(), 3190110);
    assert_eq!(err.kind.category(), Category::UnresolvedConstant);
}

#[test]
fn test_variable_to_parameter() {
    let err = model_err(vec![
        Stmt::data("p", "Float", Some(RoleKeyword::Param)),
        Stmt::data("x", "Float", None),
        Stmt::method("dynamic", vec![], vec![Stmt::assign(Expr::path("this.p"), Expr::path("this.x"))]),
    ]);
    assert_eq!(err.code(), 3600100);
    assert_eq!(err.kind.category(), Category::IllegalAssignment);
}

#[test]
fn test_constant_in_generated_if() {
    let err = model_err(vec![
        Stmt::data("k", "Float", Some(RoleKeyword::Const)),
        Stmt::data("x", "Float", None),
        Stmt::method(
            "dynamic",
            vec![],
            vec![Stmt::if_(vec![
                Clause::when(
                    Expr::infix(Expr::path("this.x"), InfixOp::Gt, Expr::float(0.0)),
                    vec![Stmt::assign(Expr::path("this.k"), Expr::float(1.0))],
                ),
                Clause::otherwise(vec![Stmt::pass()]),
            ])],
        ),
    ]);
    assert_eq!(err.code(), 3600100);
    assert!(err.to_string().contains("k"));
}

#[test]
fn test_derivative_of_parameter() {
    let err = model_err(vec![
        Stmt::data("p", "Float", Some(RoleKeyword::Param)),
        Stmt::method(
            "dynamic",
            vec![],
            vec![Stmt::assign(Expr::derivative(Expr::path("this.p")), Expr::float(1.0))],
        ),
    ]);
    assert_eq!(err.code(), 3600300);
}

#[test]
fn test_derivative_of_time() {
    let err = model_err(vec![Stmt::method(
        "dynamic",
        vec![],
        vec![Stmt::assign(Expr::derivative(Expr::ident("time")), Expr::float(1.0))],
    )]);
    assert_eq!(err.code(), 3600300);
}

#[test]
fn test_literal_not_assignable() {
    let err = compile_err(vec![Stmt::assign(Expr::float(1.0), Expr::float(2.0))]);
    assert_eq!(err.code(), 3600200);
}

#[test]
fn test_operand_types() {
    let err = compile_err(vec![Stmt::expr(Expr::infix(
        Expr::string("a"),
        InfixOp::Sub,
        Expr::float(1.0),
    ))]);
    assert_eq!(err.code(), 3300100);

    let err = compile_err(vec![Stmt::expr(Expr::prefix(PrefixOp::Not, Expr::float(1.0)))]);
    assert_eq!(err.code(), 3300100);
}

#[test]
fn test_condition_must_be_bool() {
    let err = compile_err(vec![Stmt::if_(vec![Clause::when(Expr::float(1.0), vec![Stmt::pass()])])]);
    assert_eq!(err.code(), 3300200);
}

#[test]
fn test_return_outside_function() {
    let err = compile_err(vec![Stmt::ret(None)]);
    assert_eq!(err.code(), 3700700);
}

#[test]
fn test_return_in_generated_if() {
    let err = model_err(vec![
        Stmt::data("x", "Float", None),
        Stmt::method(
            "dynamic",
            vec![],
            vec![Stmt::if_(vec![
                Clause::when(
                    Expr::infix(Expr::path("this.x"), InfixOp::Gt, Expr::float(0.0)),
                    vec![Stmt::ret(None)],
                ),
                Clause::otherwise(vec![Stmt::pass()]),
            ])],
        ),
    ]);
    assert_eq!(err.code(), 3700640);
}

#[test]
fn test_code_outside_compile() {
    let err = compile_err(vec![
        Stmt::data("x", "Float", None),
        Stmt::assign(Expr::ident("x"), Expr::float(1.0)),
    ]);
    assert_eq!(err.code(), 3700800);

    let err = compile_err(vec![Stmt::expr(Expr::call(
        Expr::ident("graph"),
        vec![Arg::positional(Expr::float(1.0))],
    ))]);
    assert_eq!(err.code(), 3700800);
}

#[test]
fn test_foreign_attribute() {
    let err = compile_err(vec![
        Stmt::data("outside", "Float", None),
        Stmt::class(
            "Model",
            vec![
                Stmt::data("y", "Float", None),
                Stmt::method(
                    "dynamic",
                    vec![],
                    vec![Stmt::assign(Expr::path("this.y"), Expr::ident("outside"))],
                ),
            ],
        ),
        Stmt::compile("Model", "m"),
    ]);
    assert_eq!(err.code(), 3250200);
    assert!(err.to_string().contains("outside"));
}

#[test]
fn test_read_before_assignment() {
    let err = model_err(vec![
        Stmt::data("a", "Float", None),
        Stmt::data("b", "Float", None),
        Stmt::method(
            "dynamic",
            vec![],
            vec![
                Stmt::assign(Expr::path("this.a"), Expr::path("this.b")),
                Stmt::assign(Expr::path("this.b"), Expr::float(1.0)),
            ],
        ),
    ]);
    assert_eq!(err.code(), 4500100);
    assert_eq!(err.kind.category(), Category::Dataflow);
}

#[test]
fn test_error_location() {
    let source = "data a: Float const\nfoo()\n";
    let err = compile_err(vec![
        Stmt::data("a", "Float", Some(RoleKeyword::Const)).at(Location::new("model.siml", 0)),
        Stmt::expr(Expr::call(Expr::ident("foo"), vec![])).at(Location::new("model.siml", 20)),
    ])
    .with_source(source);
    assert_eq!(err.location, Some(Location::new("model.siml", 20)));
    let text = err.to_string();
    assert!(text.contains("[model.siml line 2:1] Error (#3250100)"));
    assert!(text.contains("foo()"));
}
