//! Shape of the emitted code: prologues, epilogues, the process entry point,
//! per-target spelling, descriptors and stack reclamation.

use whilec_x86::lang::{BinOp, Decl, Expr, FunDecl, Parameter, Stmt, Type, TypeDecl, WhileFile};
use whilec_x86::test_harness::*;
use whilec_x86::x86::{AluOp, Condition, Family, Instruction};
use whilec_x86::{
    CompileOptions, OptimizationFlags, Target, X86File, compile, compile_with_options,
};

fn reg(family: Family) -> Pat<Family> {
    Pat::Exact(family)
}

fn compile_unoptimized(file: &WhileFile) -> X86File {
    let options = CompileOptions {
        optimizations: OptimizationFlags { peephole: false },
        ..CompileOptions::default()
    };
    compile_with_options(file, &options).unwrap()
}

fn frame_reset() -> InstructionPattern {
    InstructionPattern::Lea {
        base: reg(Family::Bp),
        offset: Pat::Any,
        dst: reg(Family::Sp),
    }
}

#[test]
fn complete_listing_for_a_single_print() {
    let file = program([main_with(vec![Stmt::Print(Expr::int(1))])]);
    let text = compile(&file).unwrap().to_string();
    let expected = "\
\t.text
wl_main:
\tpushq %rbp
\tmovq %rsp, %rbp
\tmovq $1, %rdi
\tleaq label1(%rip), %rsi
\tcall print
label0:
\tmovq %rbp, %rsp
\tpopq %rbp
\tret
\t.globl main
main:
\tpushq %rbp
\tmovq %rsp, %rbp
\tsubq $32, %rsp
\tmovq %rbx, -8(%rbp)
\tmovq %rcx, -16(%rbp)
\tmovq %rsi, -24(%rbp)
\tmovq %rdi, -32(%rbp)
\tcall wl_main
\tmovq -8(%rbp), %rbx
\tmovq -16(%rbp), %rcx
\tmovq -24(%rbp), %rsi
\tmovq -32(%rbp), %rdi
\tmovq %rbp, %rsp
\tpopq %rbp
\tmovq $0, %rax
\tret

\t.data
label1:
\t.quad 3
";
    assert_eq!(text, expected);
}

#[test]
fn empty_function_has_bare_prologue_and_epilogue() {
    let file = program([
        FunDecl::new("f", vec![], Type::Void, vec![]),
        main_with(vec![]),
    ]);
    let out = compile(&file).unwrap();
    assert_matches(
        out.function("wl_f").unwrap(),
        &[
            InstructionPattern::Label,
            InstructionPattern::Push {
                reg: reg(Family::Bp),
            },
            InstructionPattern::Mov {
                src: reg(Family::Sp),
                dst: reg(Family::Bp),
            },
            InstructionPattern::Label,
            InstructionPattern::Mov {
                src: reg(Family::Bp),
                dst: reg(Family::Sp),
            },
            InstructionPattern::Pop {
                reg: reg(Family::Bp),
            },
            InstructionPattern::Ret,
        ],
    );
}

#[test]
fn locals_reserve_an_aligned_frame() {
    let file = program([main_with(vec![
        Stmt::declare("a", Type::Int, Some(Expr::int(1))),
        Stmt::declare("b", Type::Int, Some(Expr::int(2))),
        Stmt::declare("c", Type::Int, Some(Expr::int(3))),
    ])]);
    let out = compile(&file).unwrap();
    let main = out.function("wl_main").unwrap();
    assert_has_pattern(
        main,
        &[
            InstructionPattern::Mov {
                src: reg(Family::Sp),
                dst: reg(Family::Bp),
            },
            InstructionPattern::AluImm {
                op: Pat::Exact(AluOp::Sub),
                value: Pat::Exact(32),
                dst: reg(Family::Sp),
            },
        ],
    );
    assert_has_pattern(
        main,
        &[
            InstructionPattern::MovImm {
                value: Pat::Exact(3),
                dst: reg(Family::Di),
            },
            InstructionPattern::Store {
                src: reg(Family::Di),
                base: reg(Family::Bp),
                offset: Pat::Exact(-24),
            },
        ],
    );
}

#[test]
fn return_jumps_to_the_exit_label() {
    let one = FunDecl::new("one", vec![], Type::Int, vec![Stmt::Return(Some(Expr::int(1)))]);
    let file = program([one, main_with(vec![])]);

    let plain = compile_unoptimized(&file);
    let body = plain.function("wl_one").unwrap();
    assert_has_pattern(
        body,
        &[
            InstructionPattern::Store {
                src: reg(Family::Di),
                base: reg(Family::Bp),
                offset: Pat::Exact(24),
            },
            InstructionPattern::Jmp,
            InstructionPattern::Label,
            InstructionPattern::Mov {
                src: reg(Family::Bp),
                dst: reg(Family::Sp),
            },
        ],
    );

    // The jump lands on the very next instruction, so the peephole drops it.
    let optimized = compile(&file).unwrap();
    let body = optimized.function("wl_one").unwrap();
    assert_eq!(count_matching(body, &InstructionPattern::Jmp), 0);
    assert_eq!(body.len() + 1, plain.function("wl_one").unwrap().len());
}

#[test]
fn entry_point_reserves_the_entry_functions_block() {
    let file = program([FunDecl::new(
        "main",
        vec![],
        Type::Int,
        vec![Stmt::Return(Some(Expr::int(0)))],
    )]);
    let out = compile(&file).unwrap();
    let entry = out.function("main").unwrap();
    assert!(matches!(&entry[0], Instruction::Label { name, global: true } if name == "main"));
    assert_has_pattern(
        entry,
        &[
            InstructionPattern::AluImm {
                op: Pat::Exact(AluOp::Sub),
                value: Pat::Exact(48),
                dst: reg(Family::Sp),
            },
        ],
    );
    assert_eq!(count_calls(entry, "wl_main"), 1);
    assert!(matches!(entry.last(), Some(Instruction::Ret)));
}

#[test]
fn macos_symbols_carry_an_underscore() {
    let file = program([main_with(vec![Stmt::Print(Expr::binary(
        BinOp::Append,
        Expr::string("a"),
        Expr::string("b"),
    ))])]);
    let out = compile_with_options(&file, &CompileOptions::for_target(Target::MACOS_X86_64))
        .unwrap();
    let text = out.to_string();
    assert!(text.contains("\t.globl _main\n_main:\n"));
    assert!(text.contains("\tcall _str_append\n"));
    assert!(text.contains("\tcall _print\n"));
    assert!(text.contains("\tcall wl_main\n"));

    let execution = run(&out, Target::MACOS_X86_64).unwrap();
    assert_eq!(execution.output, ["ab"]);
}

#[test]
fn thirty_two_bit_listing_uses_long_registers() {
    let file = program([main_with(vec![
        Stmt::declare("n", Type::Int, Some(Expr::int(7))),
        Stmt::Print(Expr::binary(
            BinOp::Div,
            Expr::variable("n", Type::Int),
            Expr::int(2),
        )),
    ])]);
    let out = compile_with_options(&file, &CompileOptions::for_target(Target::LINUX_X86_32))
        .unwrap();
    let text = out.to_string();
    for line in [
        "\tpushl %ebp\n",
        "\tmovl %esp, %ebp\n",
        "\tmovl $7, %edi\n",
        "\tmovl %edi, -4(%ebp)\n",
        "\tcltd\n",
        "\tidivl %ebx\n",
        "\tcall print\n",
        "\t.long 3\n",
    ] {
        assert!(text.contains(line), "missing {line:?} in\n{text}");
    }
    assert!(!text.contains("%r"), "64-bit register in\n{text}");
}

#[test]
fn descriptors_are_emitted_once_per_type() {
    let point = Type::record([("x", Type::Int), ("y", Type::Int)]);
    let file = WhileFile::new(vec![
        Decl::Type(TypeDecl {
            name: "Point".into(),
            ty: point.clone(),
        }),
        Decl::Type(TypeDecl {
            name: "Count".into(),
            ty: Type::Int,
        }),
        Decl::Function(main_with(vec![
            Stmt::declare(
                "p",
                Type::named("Point"),
                Some(Expr::record([("x", Expr::int(1)), ("y", Expr::int(2))])),
            ),
            Stmt::Print(Expr::int(1)),
            Stmt::Print(Expr::int(2)),
            Stmt::Print(Expr::cast(Type::named("Count"), Expr::int(3))),
            Stmt::Print(Expr::bool(true)),
            Stmt::Print(Expr::variable("p", Type::named("Point"))),
            Stmt::Print(Expr::variable("p", point)),
        ])),
    ]);
    let out = compile(&file).unwrap();
    let labelled = out.data.iter().filter(|item| item.label.is_some()).count();
    // int, bool and the point record
    assert_eq!(labelled, 3);

    let execution = run(&out, Target::LINUX_X86_64).unwrap();
    assert_eq!(
        execution.output,
        ["1", "2", "3", "true", "{x:1,y:2}", "{x:1,y:2}"]
    );
}

#[test]
fn statements_without_reservations_do_not_reset_the_stack() {
    let file = program([main_with(vec![
        Stmt::declare("a", Type::Int, Some(Expr::int(1))),
        Stmt::Print(Expr::variable("a", Type::Int)),
    ])]);
    let out = compile(&file).unwrap();
    let main = out.function("wl_main").unwrap();
    assert_eq!(count_matching(main, &frame_reset()), 0);
}

#[test]
fn reservations_are_reclaimed_per_statement() {
    let id = FunDecl::new(
        "id",
        vec![Parameter::new("v", Type::Int)],
        Type::Int,
        vec![Stmt::Return(Some(Expr::variable("v", Type::Int)))],
    );
    let call = || Expr::invoke("id", vec![Expr::int(1)], Type::Int);
    let file = program([
        id,
        main_with(vec![
            Stmt::Print(call()),
            Stmt::While {
                condition: Expr::binary(BinOp::Lt, call(), Expr::int(0)),
                body: vec![],
            },
            Stmt::Print(Expr::record([("a", Expr::int(1))])),
        ]),
    ]);
    let out = compile(&file).unwrap();
    let main = out.function("wl_main").unwrap();
    assert_eq!(count_matching(main, &frame_reset()), 3);

    // The loop condition hands its space back before branching.
    assert_has_pattern(
        main,
        &[
            frame_reset(),
            InstructionPattern::AluImm {
                op: Pat::Exact(AluOp::Cmp),
                value: Pat::Exact(0),
                dst: reg(Family::Di),
            },
            InstructionPattern::Jcc {
                cond: Pat::Exact(Condition::E),
            },
        ],
    );
}

#[test]
fn live_registers_are_saved_around_calls() {
    let id = FunDecl::new(
        "id",
        vec![Parameter::new("v", Type::Int)],
        Type::Int,
        vec![Stmt::Return(Some(Expr::variable("v", Type::Int)))],
    );
    let file = program([
        id,
        main_with(vec![Stmt::Print(Expr::binary(
            BinOp::Add,
            Expr::int(1),
            Expr::invoke("id", vec![Expr::int(2)], Type::Int),
        ))]),
    ]);
    let out = compile(&file).unwrap();
    let main = out.function("wl_main").unwrap();
    assert_has_pattern(
        main,
        &[
            InstructionPattern::Store {
                src: reg(Family::Di),
                base: reg(Family::Bp),
                offset: Pat::Any,
            },
            InstructionPattern::Call {
                symbol: Pat::Exact("wl_id".to_string()),
            },
        ],
    );
    assert_eq!(run(&out, Target::LINUX_X86_64).unwrap().output, ["3"]);
}
