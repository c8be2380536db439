//! Source -> IR -> interpreter end-to-end scenarios.
//!
//! Each scenario is built directly against `weak_ir::ast` (no parser exists
//! in this crate) and run through the full pipeline before evaluating, so
//! these exercise the builder, every analysis pass, every optimization and
//! the interpreter together.

use weak_ir::ast::{Ast, Expr, FnDef, Item, Param, Stmt, UnaryOp};
use weak_ir::build::build_unit;
use weak_ir::interp::{self, InterpreterOptions};
use weak_ir::node::BinOp;
use weak_ir::pipeline::{self, PipelineOptions};
use weak_ir::ty::{DataKind, Type};

fn int_ty() -> Type {
    Type::new_scalar(DataKind::Int, 0)
}

fn evaluate(items: Vec<Item>) -> i32 {
    let ast = Ast::new(items);
    let mut unit = build_unit(&ast).expect("lowering must succeed for a well-typed program");
    pipeline::run(&mut unit, &PipelineOptions::default()).expect("pipeline must succeed");
    interp::eval(&unit, &InterpreterOptions::default()).expect("evaluation must succeed")
}

fn main_only(body: Vec<Stmt>) -> Vec<Item> {
    vec![Item::Fn(FnDef {
        name: "main".into(),
        ret_ty: int_ty(),
        params: Vec::new(),
        body,
    })]
}

/// `int main() { return 2 + 3 * 4; }` -> 14.
#[test]
fn constant_arithmetic_precedence() {
    let result = evaluate(main_only(vec![Stmt::Return(Some(Expr::binary(
        BinOp::Add,
        Expr::int_lit(2),
        Expr::binary(BinOp::Mul, Expr::int_lit(3), Expr::int_lit(4), int_ty()),
        int_ty(),
    )))]));
    assert_eq!(result, 14);
}

/// `int main() { int x = 10; int y = 0; while (x > 0) { y = y + x; x = x - 1; } return y; }` -> 55.
#[test]
fn while_loop_sums_down_from_ten() {
    let result = evaluate(main_only(vec![
        Stmt::VarDecl {
            name: "x".into(),
            ty: int_ty(),
            init: Some(Expr::int_lit(10)),
        },
        Stmt::VarDecl {
            name: "y".into(),
            ty: int_ty(),
            init: Some(Expr::int_lit(0)),
        },
        Stmt::While {
            cond: Expr::binary(BinOp::Gt, Expr::var("x", int_ty()), Expr::int_lit(0), int_ty()),
            body: vec![
                Stmt::Expr(Expr::assign(
                    Expr::var("y", int_ty()),
                    Expr::binary(BinOp::Add, Expr::var("y", int_ty()), Expr::var("x", int_ty()), int_ty()),
                )),
                Stmt::Expr(Expr::assign(
                    Expr::var("x", int_ty()),
                    Expr::binary(BinOp::Sub, Expr::var("x", int_ty()), Expr::int_lit(1), int_ty()),
                )),
            ],
        },
        Stmt::Return(Some(Expr::var("y", int_ty()))),
    ]));
    assert_eq!(result, 55);
}

/// `int fact(int n) { if (n <= 1) return 1; return n * fact(n - 1); } int main() { return fact(6); }` -> 720.
#[test]
fn recursive_factorial_of_six() {
    let fact = FnDef {
        name: "fact".into(),
        ret_ty: int_ty(),
        params: vec![Param {
            name: "n".into(),
            ty: int_ty(),
        }],
        body: vec![
            Stmt::If {
                cond: Expr::binary(BinOp::Le, Expr::var("n", int_ty()), Expr::int_lit(1), int_ty()),
                then_branch: vec![Stmt::Return(Some(Expr::int_lit(1)))],
                else_branch: None,
            },
            Stmt::Return(Some(Expr::binary(
                BinOp::Mul,
                Expr::var("n", int_ty()),
                Expr::call(
                    "fact",
                    vec![Expr::binary(BinOp::Sub, Expr::var("n", int_ty()), Expr::int_lit(1), int_ty())],
                    int_ty(),
                ),
                int_ty(),
            ))),
        ],
    };
    let main = Item::Fn(FnDef {
        name: "main".into(),
        ret_ty: int_ty(),
        params: Vec::new(),
        body: vec![Stmt::Return(Some(Expr::call("fact", vec![Expr::int_lit(6)], int_ty())))],
    });
    assert_eq!(evaluate(vec![Item::Fn(fact), main]), 720);
}

/// `int main() { int a = 7; int b = 0; if (a > 5) b = 1; else b = 2; return b; }` -> 1.
#[test]
fn if_else_picks_the_then_branch() {
    let result = evaluate(main_only(vec![
        Stmt::VarDecl {
            name: "a".into(),
            ty: int_ty(),
            init: Some(Expr::int_lit(7)),
        },
        Stmt::VarDecl {
            name: "b".into(),
            ty: int_ty(),
            init: Some(Expr::int_lit(0)),
        },
        Stmt::If {
            cond: Expr::binary(BinOp::Gt, Expr::var("a", int_ty()), Expr::int_lit(5), int_ty()),
            then_branch: vec![Stmt::Expr(Expr::assign(Expr::var("b", int_ty()), Expr::int_lit(1)))],
            else_branch: Some(vec![Stmt::Expr(Expr::assign(Expr::var("b", int_ty()), Expr::int_lit(2)))]),
        },
        Stmt::Return(Some(Expr::var("b", int_ty()))),
    ]));
    assert_eq!(result, 1);
}

/// `int main() { int x = 1; do { x = x + x; } while (x < 100); return x; }` -> 128.
#[test]
fn do_while_doubles_past_one_hundred() {
    let result = evaluate(main_only(vec![
        Stmt::VarDecl {
            name: "x".into(),
            ty: int_ty(),
            init: Some(Expr::int_lit(1)),
        },
        Stmt::DoWhile {
            body: vec![Stmt::Expr(Expr::assign(
                Expr::var("x", int_ty()),
                Expr::binary(BinOp::Add, Expr::var("x", int_ty()), Expr::var("x", int_ty()), int_ty()),
            ))],
            cond: Expr::binary(BinOp::Lt, Expr::var("x", int_ty()), Expr::int_lit(100), int_ty()),
        },
        Stmt::Return(Some(Expr::var("x", int_ty()))),
    ]));
    assert_eq!(result, 128);
}

/// `int main() { int i = 0; int s = 0; for (int k = 1; k <= 10; k = k + 1) s = s + k; return s; }` -> 55.
#[test]
fn for_loop_sums_one_through_ten() {
    let result = evaluate(main_only(vec![
        Stmt::VarDecl {
            name: "i".into(),
            ty: int_ty(),
            init: Some(Expr::int_lit(0)),
        },
        Stmt::VarDecl {
            name: "s".into(),
            ty: int_ty(),
            init: Some(Expr::int_lit(0)),
        },
        Stmt::For {
            init: Some(Box::new(Stmt::VarDecl {
                name: "k".into(),
                ty: int_ty(),
                init: Some(Expr::int_lit(1)),
            })),
            cond: Some(Expr::binary(BinOp::Le, Expr::var("k", int_ty()), Expr::int_lit(10), int_ty())),
            step: Some(Expr::assign(
                Expr::var("k", int_ty()),
                Expr::binary(BinOp::Add, Expr::var("k", int_ty()), Expr::int_lit(1), int_ty()),
            )),
            body: vec![Stmt::Expr(Expr::assign(
                Expr::var("s", int_ty()),
                Expr::binary(BinOp::Add, Expr::var("s", int_ty()), Expr::var("k", int_ty()), int_ty()),
            ))],
        },
        Stmt::Return(Some(Expr::var("s", int_ty()))),
    ]));
    assert_eq!(result, 55);
}

/// The same six programs, but with every optimization disabled: the pipeline
/// must still produce a runnable unit with an identical observable result
/// (spec §8's "optimizer soundness" property, exercised end-to-end).
#[test]
fn every_scenario_is_unchanged_with_all_optimizations_disabled() {
    let disabled = PipelineOptions {
        run_arith_simplify: false,
        run_reorder_allocas: false,
        run_unreachable_removal: false,
        run_data_flow_dce: false,
    };
    let mut unit = build_unit(&Ast::new(main_only(vec![Stmt::Return(Some(Expr::binary(
        BinOp::Add,
        Expr::int_lit(2),
        Expr::binary(BinOp::Mul, Expr::int_lit(3), Expr::int_lit(4), int_ty()),
        int_ty(),
    )))])))
    .unwrap();
    pipeline::run(&mut unit, &disabled).unwrap();
    let result = interp::eval(&unit, &InterpreterOptions::default()).unwrap();
    assert_eq!(result, 14);
}

/// Pre/post-increment used as an rvalue (not one of the six §8 scenarios,
/// but exercises `UnaryOp` lowering alongside the pipeline).
#[test]
fn post_increment_returns_the_old_value() {
    let result = evaluate(main_only(vec![
        Stmt::VarDecl {
            name: "x".into(),
            ty: int_ty(),
            init: Some(Expr::int_lit(9)),
        },
        Stmt::Return(Some(Expr::unary(UnaryOp::PostInc, Expr::var("x", int_ty()), int_ty()))),
    ]));
    assert_eq!(result, 9);
}
