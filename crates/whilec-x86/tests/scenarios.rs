//! End-to-end scenarios: build a typed program, compile it for Linux x86-64
//! and run the result in the harness simulator.

use whilec_x86::lang::{
    BinOp, ConstDecl, Decl, Expr, FunDecl, Parameter, Stmt, Type, UnOp, VarDecl, WhileFile,
};
use whilec_x86::test_harness::*;
use whilec_x86::{CompileOptions, OptimizationFlags, Target, compile_with_options};

fn int_var(name: &str) -> Expr {
    Expr::variable(name, Type::Int)
}

fn add_function() -> FunDecl {
    FunDecl::new(
        "add",
        vec![Parameter::new("a", Type::Int), Parameter::new("b", Type::Int)],
        Type::Int,
        vec![Stmt::Return(Some(Expr::binary(
            BinOp::Add,
            int_var("a"),
            int_var("b"),
        )))],
    )
}

fn factorial() -> FunDecl {
    FunDecl::new(
        "fact",
        vec![Parameter::new("n", Type::Int)],
        Type::Int,
        vec![Stmt::IfElse {
            condition: Expr::binary(BinOp::LtEq, int_var("n"), Expr::int(1)),
            true_branch: vec![Stmt::Return(Some(Expr::int(1)))],
            false_branch: vec![Stmt::Return(Some(Expr::binary(
                BinOp::Mul,
                int_var("n"),
                Expr::invoke(
                    "fact",
                    vec![Expr::binary(BinOp::Sub, int_var("n"), Expr::int(1))],
                    Type::Int,
                ),
            )))],
        }],
    )
}

#[test]
fn add_three_and_four() {
    let file = program([
        add_function(),
        main_with(vec![Stmt::Print(Expr::invoke(
            "add",
            vec![Expr::int(3), Expr::int(4)],
            Type::Int,
        ))]),
    ]);
    assert_eq!(run_output(&file), ["7"]);
}

fn if_else_program(condition: bool) -> Vec<String> {
    let file = program([main_with(vec![
        Stmt::declare("x", Type::Int, None),
        Stmt::IfElse {
            condition: Expr::bool(condition),
            true_branch: vec![Stmt::assign(int_var("x"), Expr::int(1))],
            false_branch: vec![Stmt::assign(int_var("x"), Expr::int(2))],
        },
        Stmt::Print(int_var("x")),
    ])]);
    run_output(&file)
}

#[test]
fn if_else_takes_the_right_branch() {
    assert_eq!(if_else_program(true), ["1"]);
    assert_eq!(if_else_program(false), ["2"]);
}

#[test]
fn while_loop_counts_down() {
    let file = program([main_with(vec![
        Stmt::declare("i", Type::Int, Some(Expr::int(3))),
        Stmt::While {
            condition: Expr::binary(BinOp::Gt, int_var("i"), Expr::int(0)),
            body: vec![
                Stmt::Print(int_var("i")),
                Stmt::assign(
                    int_var("i"),
                    Expr::binary(BinOp::Sub, int_var("i"), Expr::int(1)),
                ),
            ],
        },
    ])]);

    let out = compile_with_options(&file, &CompileOptions::default()).unwrap();
    let main = out.function("wl_main").unwrap();
    assert_eq!(count_calls(main, "print"), 1);

    let execution = run(&out, Target::LINUX_X86_64).unwrap();
    assert_eq!(execution.output, ["3", "2", "1"]);
    assert_eq!(execution.exit_code, 0);
}

#[test]
fn for_loop_runs_increment_after_body() {
    let file = program([main_with(vec![
        Stmt::declare("sum", Type::Int, Some(Expr::int(0))),
        Stmt::For {
            declaration: VarDecl::new("i", Type::Int, Some(Expr::int(0))),
            condition: Expr::binary(BinOp::Lt, int_var("i"), Expr::int(5)),
            increment: Box::new(Stmt::assign(
                int_var("i"),
                Expr::binary(BinOp::Add, int_var("i"), Expr::int(1)),
            )),
            body: vec![Stmt::assign(
                int_var("sum"),
                Expr::binary(BinOp::Add, int_var("sum"), int_var("i")),
            )],
        },
        Stmt::Print(int_var("sum")),
    ])]);
    assert_eq!(run_output(&file), ["10"]);
}

#[test]
fn recursion_keeps_live_values_across_calls() {
    let file = program([
        factorial(),
        main_with(vec![Stmt::Print(Expr::invoke(
            "fact",
            vec![Expr::int(10)],
            Type::Int,
        ))]),
    ]);
    assert_eq!(run_output(&file), ["3628800"]);
}

#[test]
fn nested_calls_in_arguments() {
    // add(add(1, 2), 10 * add(3, 4))
    let inner = |a, b| Expr::invoke("add", vec![Expr::int(a), Expr::int(b)], Type::Int);
    let file = program([
        add_function(),
        main_with(vec![Stmt::Print(Expr::invoke(
            "add",
            vec![
                inner(1, 2),
                Expr::binary(BinOp::Mul, Expr::int(10), inner(3, 4)),
            ],
            Type::Int,
        ))]),
    ]);
    assert_eq!(run_output(&file), ["73"]);
}

#[test]
fn call_result_combines_with_live_operand() {
    // 100 - add(1, 2) keeps 100 live across the call
    let file = program([
        add_function(),
        main_with(vec![Stmt::Print(Expr::binary(
            BinOp::Sub,
            Expr::int(100),
            Expr::invoke("add", vec![Expr::int(1), Expr::int(2)], Type::Int),
        ))]),
    ]);
    assert_eq!(run_output(&file), ["97"]);
}

#[test]
fn void_function_invoked_as_statement() {
    let greet = FunDecl::new(
        "greet",
        vec![Parameter::new("who", Type::Str)],
        Type::Void,
        vec![
            Stmt::Print(Expr::binary(
                BinOp::Append,
                Expr::string("hello "),
                Expr::variable("who", Type::Str),
            )),
            Stmt::Return(None),
            Stmt::Print(Expr::string("unreachable")),
        ],
    );
    let file = program([
        greet,
        main_with(vec![
            Stmt::Invoke(Expr::invoke("greet", vec![Expr::string("world")], Type::Void)),
            Stmt::Invoke(Expr::invoke("greet", vec![Expr::string("again")], Type::Void)),
        ]),
    ]);
    assert_eq!(run_output(&file), ["hello world", "hello again"]);
}

#[test]
fn string_concatenation_with_other_values() {
    let file = program([main_with(vec![
        Stmt::Print(Expr::binary(
            BinOp::Append,
            Expr::string("ab"),
            Expr::string("cd"),
        )),
        Stmt::Print(Expr::binary(
            BinOp::Append,
            Expr::string("n = "),
            Expr::int(-12),
        )),
        Stmt::Print(Expr::binary(
            BinOp::Append,
            Expr::bool(true),
            Expr::string("!"),
        )),
        Stmt::Print(Expr::binary(
            BinOp::Append,
            Expr::binary(BinOp::Append, Expr::string("x"), Expr::char('y')),
            Expr::string("z"),
        )),
    ])]);
    assert_eq!(run_output(&file), ["abcd", "n = -12", "true!", "xyz"]);
}

#[test]
fn primitive_printing() {
    let file = program([main_with(vec![
        Stmt::Print(Expr::bool(false)),
        Stmt::Print(Expr::char('q')),
        Stmt::Print(Expr::int(i64::MIN)),
        Stmt::Print(Expr::real(2.5)),
        Stmt::Print(Expr::string("line")),
    ])]);
    assert_eq!(
        run_output(&file),
        ["false", "q", "-9223372036854775808", "2.5", "line"]
    );
}

#[test]
fn boolean_operators_short_circuit() {
    // `noisy` prints when evaluated; it must not run when the left side decides.
    let noisy = FunDecl::new(
        "noisy",
        vec![],
        Type::Bool,
        vec![
            Stmt::Print(Expr::string("evaluated")),
            Stmt::Return(Some(Expr::bool(true))),
        ],
    );
    let call = || Expr::invoke("noisy", vec![], Type::Bool);
    let file = program([
        noisy,
        main_with(vec![
            Stmt::Print(Expr::binary(BinOp::And, Expr::bool(false), call())),
            Stmt::Print(Expr::binary(BinOp::Or, Expr::bool(true), call())),
            Stmt::Print(Expr::binary(BinOp::And, Expr::bool(true), call())),
            Stmt::Print(Expr::unary(UnOp::Not, Expr::bool(true))),
        ]),
    ]);
    assert_eq!(
        run_output(&file),
        ["false", "true", "evaluated", "true", "false"]
    );
}

#[test]
fn division_and_remainder_truncate() {
    let file = program([main_with(vec![
        Stmt::Print(Expr::binary(BinOp::Div, Expr::int(-7), Expr::int(2))),
        Stmt::Print(Expr::binary(BinOp::Rem, Expr::int(-7), Expr::int(2))),
        Stmt::Print(Expr::unary(UnOp::Neg, Expr::int(5))),
    ])]);
    assert_eq!(run_output(&file), ["-3", "-1", "-5"]);
}

#[test]
fn real_arithmetic_and_comparison() {
    let r = Expr::real;
    let file = program([main_with(vec![
        Stmt::Print(Expr::binary(BinOp::Add, r(1.5), r(2.25))),
        Stmt::Print(Expr::binary(BinOp::Div, r(1.0), r(4.0))),
        Stmt::Print(Expr::binary(BinOp::Lt, r(1.5), r(2.0))),
        Stmt::Print(Expr::binary(BinOp::GtEq, r(1.5), r(2.0))),
        Stmt::Print(Expr::unary(UnOp::Neg, r(2.5))),
        Stmt::Print(Expr::cast(Type::Real, Expr::int(3))),
    ])]);
    assert_eq!(
        run_output(&file),
        ["3.75", "0.25", "true", "false", "-2.5", "3.0"]
    );
}

#[test]
fn real_comparisons_with_nan_are_false() {
    let r = Expr::real;
    let nan = || Expr::binary(BinOp::Div, r(0.0), r(0.0));
    let cmp = |op, lhs, rhs| Stmt::Print(Expr::binary(op, lhs, rhs));
    let file = program([main_with(vec![
        Stmt::Print(nan()),
        cmp(BinOp::Lt, nan(), r(1.0)),
        cmp(BinOp::LtEq, nan(), r(1.0)),
        cmp(BinOp::Gt, nan(), r(1.0)),
        cmp(BinOp::GtEq, r(1.0), nan()),
        cmp(BinOp::Eq, nan(), nan()),
        cmp(BinOp::Neq, nan(), nan()),
        cmp(BinOp::LtEq, r(2.0), r(2.0)),
        cmp(BinOp::Eq, r(1.0), r(1.0)),
        cmp(BinOp::Neq, r(1.0), r(1.0)),
    ])]);
    assert_eq!(
        run_output(&file),
        ["NaN", "false", "false", "false", "false", "false", "true", "true", "true", "false"]
    );
}

#[test]
fn char_comparison() {
    let file = program([main_with(vec![Stmt::Print(Expr::binary(
        BinOp::Lt,
        Expr::char('a'),
        Expr::char('b'),
    ))])]);
    assert_eq!(run_output(&file), ["true"]);
}

#[test]
fn module_constants_are_inlined() {
    let file = WhileFile::new(vec![
        Decl::Constant(ConstDecl {
            name: "TEN".into(),
            value: Expr::int(10),
        }),
        Decl::Constant(ConstDecl {
            name: "TWENTY".into(),
            value: Expr::binary(BinOp::Mul, int_var("TEN"), Expr::int(2)),
        }),
        Decl::Function(main_with(vec![Stmt::Print(Expr::binary(
            BinOp::Add,
            int_var("TWENTY"),
            int_var("TEN"),
        ))])),
    ]);
    assert_eq!(run_output(&file), ["30"]);
}

#[test]
fn entry_function_can_return_a_value() {
    let file = program([FunDecl::new(
        "main",
        vec![],
        Type::Int,
        vec![
            Stmt::Print(Expr::int(1)),
            Stmt::Return(Some(Expr::int(42))),
        ],
    )]);
    let execution = compile_and_run(&file).unwrap();
    assert_eq!(execution.output, ["1"]);
    assert_eq!(execution.exit_code, 0);
}

#[test]
fn custom_entry_point() {
    let file = program([FunDecl::new(
        "start",
        vec![],
        Type::Void,
        vec![Stmt::Print(Expr::int(5))],
    )]);
    let options = CompileOptions {
        entry_point: "start".into(),
        ..CompileOptions::default()
    };
    let execution = run_with_options(&file, &options).unwrap();
    assert_eq!(execution.output, ["5"]);
}

#[test]
fn results_do_not_depend_on_peephole() {
    let file = program([
        factorial(),
        add_function(),
        main_with(vec![Stmt::Print(Expr::invoke(
            "add",
            vec![
                Expr::invoke("fact", vec![Expr::int(5)], Type::Int),
                Expr::int(1),
            ],
            Type::Int,
        ))]),
    ]);
    let plain = CompileOptions {
        optimizations: OptimizationFlags { peephole: false },
        ..CompileOptions::default()
    };
    let optimized = run_with_options(&file, &CompileOptions::default()).unwrap();
    let unoptimized = run_with_options(&file, &plain).unwrap();
    assert_eq!(optimized.output, ["121"]);
    assert_eq!(optimized.output, unoptimized.output);
    assert!(optimized.steps <= unoptimized.steps);
}
