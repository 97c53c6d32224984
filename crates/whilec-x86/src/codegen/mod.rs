// Module emission: one code and one data section for a whole source file.
//
// Functions are emitted in declaration order, each wrapped in a standard
// frame-pointer prologue and epilogue, followed by the process entry point
// that calls the user's entry function.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

mod emitter;
mod expr;
pub mod frame;
pub mod layout;
pub(crate) mod peephole;
mod stmt;

use crate::abi::{ENTRY_FUNCTION, ENTRY_SYMBOL, FUNCTION_PREFIX, REGISTER_POOL};
use crate::lang::{FunDecl, WhileFile};
use crate::target::Target;
use crate::x86::{AluOp, Family, Instruction, X86File};
use crate::{Error, Result};

use emitter::{Emitter, LoweringContext};
use frame::{CallerBlock, StackFrame, emits_calls};

/// Toggles for optional passes. All enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationFlags {
    /// Drop self-moves, zero adjustments and jumps to the next instruction.
    pub peephole: bool,
}

impl Default for OptimizationFlags {
    fn default() -> Self {
        Self { peephole: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub target: Target,
    /// Name of the function the process entry point calls.
    pub entry_point: String,
    pub optimizations: OptimizationFlags,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target: Target::default(),
            entry_point: ENTRY_FUNCTION.to_string(),
            optimizations: OptimizationFlags::default(),
        }
    }
}

impl CompileOptions {
    #[must_use]
    pub fn for_target(target: Target) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }
}

/// Translate a checked source file for Linux x86-64.
pub fn compile(file: &WhileFile) -> Result<X86File> {
    compile_with_options(file, &CompileOptions::default())
}

pub fn compile_with_options(file: &WhileFile, options: &CompileOptions) -> Result<X86File> {
    let ctx = LoweringContext::new(file, options.target);
    let entry = ctx
        .functions
        .get(options.entry_point.as_str())
        .copied()
        .ok_or_else(|| Error::NoEntryPoint(options.entry_point.clone()))?;
    if !entry.params.is_empty() {
        return Err(Error::InvalidEntryPoint(options.entry_point.clone()));
    }

    let mut e = Emitter::new(options.target);
    for decl in file.functions() {
        lower_function(&mut e, &ctx, decl)?;
    }
    emit_entry_point(&mut e, &ctx, entry)?;

    let mut out = e.finish();
    if options.optimizations.peephole {
        peephole::optimize(&mut out.code);
    }
    Ok(out)
}

fn lower_function(e: &mut Emitter, ctx: &LoweringContext, decl: &FunDecl) -> Result<()> {
    let exit = e.alloc_label();
    let frame = StackFrame::allocate(
        decl,
        &ctx.types,
        exit,
        emits_calls(&decl.body, &ctx.constants),
    )?;
    tracing::debug!(
        "function {}: frame {} bytes, caller block {} bytes",
        decl.name,
        frame.frame_size(),
        frame.caller_block_width()
    );

    let (bp, sp) = (e.reg(Family::Bp), e.reg(Family::Sp));
    e.define_label(&format!("{FUNCTION_PREFIX}{}", decl.name));
    e.emit(Instruction::Push { reg: bp });
    e.mov(Family::Sp, Family::Bp);
    if frame.frame_size() > 0 {
        e.alu_imm(AluOp::Sub, frame.frame_size() as i32, Family::Sp);
    }

    stmt::lower_block(e, ctx, &frame, &decl.body)?;

    e.define_label(frame.exit_label());
    e.emit(Instruction::Mov { src: bp, dst: sp });
    e.emit(Instruction::Pop { reg: bp });
    e.emit(Instruction::Ret);
    Ok(())
}

/// Process entry: preserve the host's pool registers, reserve the entry
/// function's block, call it, exit with 0.
fn emit_entry_point(e: &mut Emitter, ctx: &LoweringContext, entry: &FunDecl) -> Result<()> {
    let block = CallerBlock::of(entry, &ctx.types)?;
    let word = ctx.target.word_width();
    let saved = ctx.target.aligned_stack_width(REGISTER_POOL.len() * word);
    let (bp, sp) = (e.reg(Family::Bp), e.reg(Family::Sp));
    e.emit(Instruction::Label {
        name: ctx.target.symbol(ENTRY_SYMBOL),
        global: true,
    });
    e.emit(Instruction::Push { reg: bp });
    e.mov(Family::Sp, Family::Bp);
    e.alu_imm(AluOp::Sub, (saved + block.width) as i32, Family::Sp);
    for (k, family) in REGISTER_POOL.iter().enumerate() {
        e.store(family, Family::Bp, -(((k as u32 + 1) * word) as i32));
    }
    e.emit(Instruction::call(format!("{FUNCTION_PREFIX}{}", entry.name)));
    for (k, family) in REGISTER_POOL.iter().enumerate() {
        e.load(Family::Bp, -(((k as u32 + 1) * word) as i32), family);
    }
    e.emit(Instruction::Mov { src: bp, dst: sp });
    e.emit(Instruction::Pop { reg: bp });
    e.mov_imm(0, Family::Ax);
    e.emit(Instruction::Ret);
    Ok(())
}
