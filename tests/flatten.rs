//! Integration tests for flattening: conditionals, roles and the JSON interface

use siml::ast::{Clause, Expr, InfixOp, RoleKeyword, Stmt};
use siml::flatten::{FlatExpr, FlatStmtKind};
use siml::role::{Flow, Role};
use siml::value::Scalar;
use siml::{compile_module, compile_module_with, BuildConfig, FlatObject, Module};

fn compile_ok(statements: Vec<Stmt>) -> FlatObject {
    compile_module(&Module::new("test", statements))
        .expect("compilation failed")
        .remove(0)
}

fn model(body: Vec<Stmt>) -> FlatObject {
    compile_ok(vec![Stmt::class("Model", body), Stmt::compile("Model", "m")])
}

fn gt(path: &str, bound: f64) -> Expr {
    Expr::infix(Expr::path(path), InfixOp::Gt, Expr::float(bound))
}

#[test]
fn test_known_condition_is_folded() {
    let object = model(vec![
        Stmt::data("y", "Float", None),
        Stmt::method(
            "dynamic",
            vec![],
            vec![Stmt::if_(vec![
                Clause::when(Expr::bool(false), vec![Stmt::assign(Expr::path("this.y"), Expr::float(1.0))]),
                Clause::when(
                    Expr::infix(Expr::float(1.0), InfixOp::Lt, Expr::float(2.0)),
                    vec![Stmt::assign(Expr::path("this.y"), Expr::float(2.0))],
                ),
                Clause::otherwise(vec![Stmt::assign(Expr::path("this.y"), Expr::float(3.0))]),
            ])],
        ),
    ]);
    let dynamic = object.phase("dynamic").unwrap();
    assert_eq!(dynamic.statements.len(), 1);
    assert!(matches!(dynamic.statements[0].kind, FlatStmtKind::Assign { .. }));
    assert!(object.pseudo_code().contains("y = 2.0"));
}

#[test]
fn test_generated_if() {
    let object = model(vec![
        Stmt::data("x", "Float", None),
        Stmt::data("y", "Float", None),
        Stmt::method("initialize", vec![], vec![Stmt::assign(Expr::path("this.x"), Expr::float(1.0))]),
        Stmt::method(
            "dynamic",
            vec![],
            vec![
                Stmt::if_(vec![
                    Clause::when(gt("this.x", 1.0), vec![Stmt::assign(Expr::path("this.y"), Expr::float(1.0))]),
                    Clause::when(gt("this.x", 0.0), vec![Stmt::assign(Expr::path("this.y"), Expr::float(0.5))]),
                    Clause::when(Expr::bool(true), vec![Stmt::assign(Expr::path("this.y"), Expr::float(0.0))]),
                    Clause::otherwise(vec![Stmt::assign(Expr::path("this.y"), Expr::float(9.0))]),
                ]),
                Stmt::assign(Expr::derivative(Expr::path("this.x")), Expr::path("this.y")),
            ],
        ),
    ]);

    let dynamic = object.phase("dynamic").unwrap();
    let y = object.id_of("y").unwrap();
    let x = object.id_of("x").unwrap();
    match &dynamic.statements[0].kind {
        FlatStmtKind::If { clauses } => {
            assert_eq!(clauses.len(), 3);
            assert!(clauses[2].condition.is_none());
        }
        other => panic!("expected if, got {:?}", other),
    }
    assert!(dynamic.statements[0].outputs.contains(&y));
    assert!(dynamic.statements[0].inputs.contains(&x));

    let text = object.pseudo_code();
    assert!(text.contains("if x > 1.0:"));
    assert!(text.contains("elif x > 0.0:"));
    assert!(text.contains("else:"));
    assert!(!text.contains("9.0"));
}

#[test]
fn test_param_role_propagates() {
    let object = compile_ok(vec![
        Stmt::class(
            "Spring",
            vec![
                Stmt::data("stiffness", "Float", None),
                Stmt::data("length", "Float", Some(RoleKeyword::Const)),
            ],
        ),
        Stmt::class(
            "Model",
            vec![
                Stmt::data("spring", "Spring", Some(RoleKeyword::Param)),
                Stmt::method(
                    "initialize",
                    vec![],
                    vec![
                        Stmt::assign(Expr::path("this.spring.stiffness"), Expr::float(100.0)),
                        Stmt::assign(Expr::path("this.spring.length"), Expr::float(0.5)),
                    ],
                ),
            ],
        ),
        Stmt::compile("Model", "m"),
    ]);

    let stiffness = object.id_of("spring.stiffness").unwrap();
    let length = object.id_of("spring.length").unwrap();
    assert_eq!(object.attributes[stiffness].role, Role::Parameter);
    assert_eq!(object.attributes[length].role, Role::Constant);
    assert_eq!(object.parameters, vec![stiffness]);
    assert_eq!(object.constants, vec![length]);
    assert_eq!(object.phase("initialize").unwrap().statements.len(), 1);
}

#[test]
fn test_two_objects_of_one_class() {
    let class = Stmt::class(
        "Model",
        vec![
            Stmt::data("x", "Float", None),
            Stmt::method("initialize", vec![], vec![Stmt::assign(Expr::path("this.x"), Expr::float(1.0))]),
            Stmt::method(
                "dynamic",
                vec![],
                vec![Stmt::assign(Expr::derivative(Expr::path("this.x")), Expr::float(-1.0))],
            ),
        ],
    );
    let objects = compile_module(&Module::new(
        "test",
        vec![class, Stmt::compile("Model", "first"), Stmt::compile("Model", "second")],
    ))
    .unwrap();

    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].name, "first");
    assert_eq!(objects[1].name, "second");
    for object in &objects {
        assert_eq!(object.attributes[object.states[0]].role, Role::Variable(Flow::Input));
        assert_eq!(object.attributes.len(), 3);
    }
}

#[test]
fn test_dataflow_can_be_disabled() {
    let module = Module::new(
        "test",
        vec![
            Stmt::class(
                "Model",
                vec![
                    Stmt::data("p", "Float", Some(RoleKeyword::Param)),
                    Stmt::method("dynamic", vec![], vec![Stmt::assign(Expr::path("this.p"), Expr::float(1.0))]),
                ],
            ),
            Stmt::compile("Model", "m"),
        ],
    );
    assert_eq!(compile_module(&module).unwrap_err().code(), 4500300);

    let config = BuildConfig {
        check_dataflow: false,
        ..BuildConfig::default()
    };
    let objects = compile_module_with(&module, config).unwrap();
    assert_eq!(objects[0].parameters.len(), 1);
}

#[test]
fn test_module_from_json() {
    let json = r#"{
        "name": "decay",
        "statements": [
            {"kind": "class", "name": "Decay", "body": [
                {"kind": "data", "name": "x", "class": {"kind": "ident", "name": "Float"}},
                {"kind": "func", "name": "initialize", "params": [{"name": "this"}], "body": [
                    {"kind": "assign",
                     "target": {"kind": "attr", "object": {"kind": "ident", "name": "this"}, "name": "x"},
                     "value": {"kind": "literal", "value": 1.0}}
                ]},
                {"kind": "func", "name": "dynamic", "params": [{"name": "this"}], "body": [
                    {"kind": "assign",
                     "target": {"kind": "prefix", "op": "derivative",
                                "operand": {"kind": "attr", "object": {"kind": "ident", "name": "this"}, "name": "x"}},
                     "value": {"kind": "prefix", "op": "neg",
                               "operand": {"kind": "attr", "object": {"kind": "ident", "name": "this"}, "name": "x"}}}
                ]}
            ]},
            {"kind": "compile", "class": {"kind": "ident", "name": "Decay"}}
        ]
    }"#;
    let module: Module = serde_json::from_str(json).unwrap();
    let objects = compile_module(&module).unwrap();
    assert_eq!(objects[0].name, "Decay");

    let output = serde_json::to_value(&objects[0]).unwrap();
    assert_eq!(output["attributes"][1]["name"], "x$time");
    assert_eq!(output["states"], serde_json::json!([0]));
    assert_eq!(output["phases"][1]["statements"][0]["kind"]["kind"], "assign");
}

#[test]
fn test_parentheses() {
    let object = model(vec![
        Stmt::data("x", "Float", None),
        Stmt::data("y", "Float", None),
        Stmt::method("initialize", vec![], vec![Stmt::assign(Expr::path("this.x"), Expr::float(1.0))]),
        Stmt::method(
            "dynamic",
            vec![],
            vec![
                Stmt::assign(
                    Expr::path("this.y"),
                    Expr::infix(
                        Expr::paren(Expr::infix(Expr::float(2.0), InfixOp::Mul, Expr::float(2.0))),
                        InfixOp::Mul,
                        Expr::path("this.x"),
                    ),
                ),
                Stmt::assign(
                    Expr::derivative(Expr::path("this.x")),
                    Expr::infix(
                        Expr::paren(Expr::infix(Expr::path("this.y"), InfixOp::Add, Expr::float(1.0))),
                        InfixOp::Mul,
                        Expr::float(2.0),
                    ),
                ),
            ],
        ),
    ]);

    let dynamic = object.phase("dynamic").unwrap();
    match &dynamic.statements[0].kind {
        FlatStmtKind::Assign {
            expr: FlatExpr::Infix { left, .. },
            ..
        } => assert_eq!(
            **left,
            FlatExpr::Literal {
                value: Scalar::Float(4.0)
            }
        ),
        other => panic!("unexpected statement {:?}", other),
    }
    match &dynamic.statements[1].kind {
        FlatStmtKind::Assign {
            expr: FlatExpr::Infix { left, .. },
            ..
        } => assert!(matches!(**left, FlatExpr::Paren { .. })),
        other => panic!("unexpected statement {:?}", other),
    }

    let text = object.pseudo_code();
    assert!(text.contains("y = 4.0 * x"));
    assert!(text.contains("x$time = (y + 1.0) * 2.0"));
}
