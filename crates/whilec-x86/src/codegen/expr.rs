// Expression lowering.
//
// `lower_expr` leaves the value of an expression in `dst`: scalars by value,
// records as a pointer to inline storage. `free` names the pool registers that
// hold nothing live; `dst` is never handed out from it, and anything outside
// `free` (other than `dst`) is preserved across calls.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use crate::abi::{
    ACCUMULATOR, FUNCTION_PREFIX, RT_STR_APPEND, RT_STR_LEFT_APPEND, RT_STR_RIGHT_APPEND,
    RUNTIME_ARGS, SCRATCH,
};
use crate::lang::{BinOp, Expr, ExprKind, Type, UnOp, Value};
use crate::x86::{AluOp, Condition, Family, Instruction, RegisterSet, SseOp, Xmm};
use crate::{Error, Result};

use super::emitter::{Emitter, LoweringContext};
use super::frame::{CallerBlock, StackFrame};
use super::layout::Representation;

pub fn lower_expr(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    expr: &Expr,
    dst: Family,
    free: RegisterSet,
) -> Result<()> {
    if !ctx.target.is_64_bit() && ctx.types.resolve(&expr.ty)? == Type::Real {
        return Err(Error::Unsupported(
            "real values on 32-bit targets".to_string(),
        ));
    }

    match &expr.kind {
        ExprKind::Constant(value) => lower_constant(e, value, dst),
        ExprKind::Variable(name) => lower_variable(e, ctx, frame, name, &expr.ty, dst, free),
        ExprKind::Binary { op, lhs, rhs } => lower_binary(e, ctx, frame, *op, lhs, rhs, dst, free),
        ExprKind::Unary { op, expr: operand } => lower_unary(e, ctx, frame, *op, operand, dst, free),
        ExprKind::Cast { source } => lower_cast(e, ctx, frame, source, &expr.ty, dst, free),
        ExprKind::Invoke { name, args } => lower_invoke(e, ctx, frame, name, args, dst, free),
        ExprKind::RecordAccess { source, field } => {
            lower_expr(e, ctx, frame, source, dst, free)?;
            let offset = ctx.types.field_offset(&source.ty, field)? as i32;
            match ctx.types.representation(&expr.ty)? {
                Representation::Word => e.load(dst, offset, dst),
                Representation::Compound { .. } => e.lea(dst, offset, dst),
                Representation::Void => {
                    return Err(Error::Internal(format!("field `{field}` has no value")));
                }
            }
            Ok(())
        }
        ExprKind::RecordConstructor(fields) => {
            lower_record(e, ctx, frame, fields, &expr.ty, dst, free)
        }
        ExprKind::IndexOf { .. } => Err(Error::Unsupported("list indexing".to_string())),
        ExprKind::ListConstructor(_) => {
            Err(Error::Unsupported("list construction".to_string()))
        }
    }
}

/// Pick a second register for an operand, failing loudly when the pool is empty.
fn second_register(dst: Family, free: RegisterSet, what: &str) -> Result<Family> {
    free.head_excluding(dst)
        .ok_or_else(|| Error::RegisterPoolExhausted(what.to_string()))
}

fn lower_constant(e: &mut Emitter, value: &Value, dst: Family) -> Result<()> {
    match value {
        Value::Bool(b) => e.mov_imm(i64::from(*b), dst),
        Value::Char(c) => e.mov_imm(i64::from(u32::from(*c)), dst),
        Value::Int(i) => {
            if !e.target().is_64_bit() && i32::try_from(*i).is_err() {
                return Err(Error::Unsupported(format!(
                    "integer constant {i} on a 32-bit target"
                )));
            }
            e.mov_imm(*i, dst);
        }
        Value::Real(r) => e.mov_imm(r.to_bits() as i64, dst),
        Value::Str(s) => {
            let label = e.string_constant(s);
            e.lea_label(&label, dst);
        }
    }
    Ok(())
}

fn lower_variable(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    name: &str,
    ty: &Type,
    dst: Family,
    free: RegisterSet,
) -> Result<()> {
    if let Some(slot) = frame.slot(name) {
        match ctx.types.representation(ty)? {
            Representation::Word => e.load(Family::Bp, slot.offset, dst),
            Representation::Compound { .. } => e.lea(Family::Bp, slot.offset, dst),
            Representation::Void => {
                return Err(Error::Internal(format!("variable `{name}` has no value")));
            }
        }
        return Ok(());
    }

    let value = ctx
        .constants
        .get(name)
        .copied()
        .ok_or_else(|| Error::UnknownVariable(name.to_string()))?;
    if e.inlining.iter().any(|n| n == name) {
        return Err(Error::Internal(format!(
            "constant `{name}` is defined in terms of itself"
        )));
    }
    e.inlining.push(name.to_string());
    let result = lower_expr(e, ctx, frame, value, dst, free);
    e.inlining.pop();
    result
}

#[allow(clippy::too_many_arguments)]
fn lower_binary(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    dst: Family,
    free: RegisterSet,
) -> Result<()> {
    match op {
        BinOp::And | BinOp::Or => {
            // Short-circuit: the left value is the result unless it fails to decide.
            let end = e.alloc_label();
            lower_expr(e, ctx, frame, lhs, dst, free)?;
            e.alu_imm(AluOp::Cmp, 0, dst);
            let cond = if op == BinOp::And {
                Condition::E
            } else {
                Condition::Ne
            };
            e.emit(Instruction::jcc(cond, end.clone()));
            lower_expr(e, ctx, frame, rhs, dst, free)?;
            e.define_label(&end);
            return Ok(());
        }
        BinOp::Append => return lower_append(e, ctx, frame, lhs, rhs, dst, free),
        _ => {}
    }

    let operand = ctx.types.resolve(&lhs.ty)?;
    if op.is_comparison()
        && !matches!(operand, Type::Bool | Type::Char | Type::Int | Type::Real)
    {
        return Err(Error::Unsupported(format!("comparison of `{operand}` values")));
    }
    if !matches!(operand, Type::Int | Type::Real) && !op.is_comparison() {
        return Err(Error::Unsupported(format!("arithmetic on `{operand}` values")));
    }

    let rhs_reg = second_register(dst, free, "binary operand")?;
    lower_expr(e, ctx, frame, lhs, dst, free)?;
    lower_expr(e, ctx, frame, rhs, rhs_reg, free.without(dst))?;

    if operand == Type::Real {
        lower_real_op(e, op, rhs_reg, dst)
    } else {
        lower_int_op(e, op, rhs_reg, dst)
    }
}

fn lower_int_op(e: &mut Emitter, op: BinOp, rhs: Family, dst: Family) -> Result<()> {
    match op {
        BinOp::Add => e.alu(AluOp::Add, rhs, dst),
        BinOp::Sub => e.alu(AluOp::Sub, rhs, dst),
        BinOp::Mul => e.alu(AluOp::Imul, rhs, dst),
        BinOp::Div | BinOp::Rem => {
            e.mov(dst, ACCUMULATOR);
            e.emit(Instruction::SignExtend {
                width: e.target().word(),
            });
            let divisor = e.reg(rhs);
            e.emit(Instruction::Idiv { divisor });
            let result = if op == BinOp::Div {
                ACCUMULATOR
            } else {
                SCRATCH
            };
            e.mov(result, dst);
        }
        BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            e.alu(AluOp::Cmp, rhs, dst);
            let cond = match op {
                BinOp::Eq => Condition::E,
                BinOp::Neq => Condition::Ne,
                BinOp::Lt => Condition::L,
                BinOp::LtEq => Condition::Le,
                BinOp::Gt => Condition::G,
                _ => Condition::Ge,
            };
            set_condition(e, cond, dst);
        }
        BinOp::And | BinOp::Or | BinOp::Append => {
            return Err(Error::Internal(format!("{op:?} reached integer lowering")));
        }
    }
    Ok(())
}

fn lower_real_op(e: &mut Emitter, op: BinOp, rhs: Family, dst: Family) -> Result<()> {
    let (src, rhs) = (e.reg(dst), e.reg(rhs));
    e.emit(Instruction::MovToXmm {
        src,
        dst: Xmm::Xmm0,
    });
    e.emit(Instruction::MovToXmm {
        src: rhs,
        dst: Xmm::Xmm1,
    });
    let sse = match op {
        BinOp::Add => SseOp::Add,
        BinOp::Sub => SseOp::Sub,
        BinOp::Mul => SseOp::Mul,
        BinOp::Div => SseOp::Div,
        BinOp::Rem => return Err(Error::Unsupported("remainder of real values".to_string())),
        BinOp::Eq | BinOp::Neq | BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            // `<` and `<=` compare the operands swapped, so an unordered
            // result (CF = ZF = 1) fails `a`/`ae` like it fails `>`/`>=`.
            let (lhs, rhs, cond) = match op {
                BinOp::Lt => (Xmm::Xmm1, Xmm::Xmm0, Condition::A),
                BinOp::LtEq => (Xmm::Xmm1, Xmm::Xmm0, Condition::Ae),
                BinOp::Gt => (Xmm::Xmm0, Xmm::Xmm1, Condition::A),
                BinOp::GtEq => (Xmm::Xmm0, Xmm::Xmm1, Condition::Ae),
                BinOp::Eq => (Xmm::Xmm0, Xmm::Xmm1, Condition::E),
                _ => (Xmm::Xmm0, Xmm::Xmm1, Condition::Ne),
            };
            e.emit(Instruction::Ucomisd { src: rhs, dst: lhs });
            if matches!(op, BinOp::Eq | BinOp::Neq) {
                // NaN is unequal to everything, itself included.
                let done = e.alloc_label();
                e.mov_imm(i64::from(op == BinOp::Neq), dst);
                e.emit(Instruction::jcc(Condition::P, done.clone()));
                set_condition(e, cond, dst);
                e.define_label(&done);
            } else {
                set_condition(e, cond, dst);
            }
            return Ok(());
        }
        BinOp::And | BinOp::Or | BinOp::Append => {
            return Err(Error::Internal(format!("{op:?} reached real lowering")));
        }
    };
    e.emit(Instruction::Sse {
        op: sse,
        src: Xmm::Xmm1,
        dst: Xmm::Xmm0,
    });
    e.emit(Instruction::MovFromXmm {
        src: Xmm::Xmm0,
        dst: src,
    });
    Ok(())
}

/// Materialize the flags as 0 or 1 in `dst`.
fn set_condition(e: &mut Emitter, cond: Condition, dst: Family) {
    let done = e.alloc_label();
    e.mov_imm(1, dst);
    e.emit(Instruction::jcc(cond, done.clone()));
    e.mov_imm(0, dst);
    e.define_label(&done);
}

fn lower_append(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    lhs: &Expr,
    rhs: &Expr,
    dst: Family,
    free: RegisterSet,
) -> Result<()> {
    let lhs_string = ctx.types.resolve(&lhs.ty)?.is_string();
    let rhs_string = ctx.types.resolve(&rhs.ty)?.is_string();
    let (symbol, described) = match (lhs_string, rhs_string) {
        (true, true) => (RT_STR_APPEND, None),
        (true, false) => (RT_STR_LEFT_APPEND, Some(&rhs.ty)),
        (false, true) => (RT_STR_RIGHT_APPEND, Some(&lhs.ty)),
        (false, false) => return Err(Error::Unsupported("list append".to_string())),
    };

    let rhs_reg = second_register(dst, free, "append operand")?;
    lower_expr(e, ctx, frame, lhs, dst, free)?;
    lower_expr(e, ctx, frame, rhs, rhs_reg, free.without(dst))?;

    let live = Emitter::live_registers(dst, free);
    e.save_registers(frame, live)?;
    let [arg0, arg1, arg2] = RUNTIME_ARGS;
    // `dst` may itself be an argument register, so park it in the accumulator.
    e.mov(dst, ACCUMULATOR);
    e.mov(rhs_reg, arg1);
    e.mov(ACCUMULATOR, arg0);
    if let Some(ty) = described {
        let desc = e.descriptor(&ctx.types, ty)?;
        e.lea_label(&desc, arg2);
    }
    e.emit(Instruction::call(ctx.target.symbol(symbol)));
    e.mov(ACCUMULATOR, dst);
    e.restore_registers(frame, live)
}

fn lower_unary(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    op: UnOp,
    operand: &Expr,
    dst: Family,
    free: RegisterSet,
) -> Result<()> {
    match op {
        UnOp::Not => {
            lower_expr(e, ctx, frame, operand, dst, free)?;
            let reg = e.reg(dst);
            e.emit(Instruction::Not { reg });
            e.alu_imm(AluOp::And, 1, dst);
        }
        UnOp::Neg => {
            lower_expr(e, ctx, frame, operand, dst, free)?;
            let reg = e.reg(dst);
            if ctx.types.resolve(&operand.ty)? == Type::Real {
                e.emit(Instruction::MovToXmm {
                    src: reg,
                    dst: Xmm::Xmm1,
                });
                e.emit(Instruction::Xorpd {
                    src: Xmm::Xmm0,
                    dst: Xmm::Xmm0,
                });
                e.emit(Instruction::Sse {
                    op: SseOp::Sub,
                    src: Xmm::Xmm1,
                    dst: Xmm::Xmm0,
                });
                e.emit(Instruction::MovFromXmm {
                    src: Xmm::Xmm0,
                    dst: reg,
                });
            } else {
                e.emit(Instruction::Neg { reg });
            }
        }
        UnOp::LengthOf => return Err(Error::Unsupported("length-of".to_string())),
    }
    Ok(())
}

fn lower_cast(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    source: &Expr,
    to: &Type,
    dst: Family,
    free: RegisterSet,
) -> Result<()> {
    let from = ctx.types.normalize(&source.ty)?;
    let to = ctx.types.normalize(to)?;
    if from == to {
        return lower_expr(e, ctx, frame, source, dst, free);
    }
    if from == Type::Int && to == Type::Real {
        lower_expr(e, ctx, frame, source, dst, free)?;
        let reg = e.reg(dst);
        e.emit(Instruction::Cvtsi2sd {
            src: reg,
            dst: Xmm::Xmm0,
        });
        e.emit(Instruction::MovFromXmm {
            src: Xmm::Xmm0,
            dst: reg,
        });
        return Ok(());
    }
    Err(Error::Unsupported(format!("cast from `{from}` to `{to}`")))
}

/// Call a translated function.
///
/// The callee's parameter block is reserved below the stack pointer and its
/// base kept in `dst` while the arguments are evaluated, so nested calls and
/// record constructions in arguments cannot disturb it.
fn lower_invoke(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    name: &str,
    args: &[Expr],
    dst: Family,
    free: RegisterSet,
) -> Result<()> {
    let decl = ctx.function(name)?;
    if args.len() != decl.params.len() {
        return Err(Error::Internal(format!(
            "`{name}` takes {} arguments, {} given",
            decl.params.len(),
            args.len()
        )));
    }
    let block = CallerBlock::of(decl, &ctx.types)?;

    if block.width > 0 {
        e.reserve_stack(block.width);
        e.mov(Family::Sp, dst);
    }
    if !args.is_empty() {
        let arg_reg = second_register(dst, free, "call argument")?;
        for ((arg, param), offset) in args.iter().zip(&decl.params).zip(&block.params) {
            lower_expr(e, ctx, frame, arg, arg_reg, free.without(dst))?;
            e.store_value(&ctx.types, arg_reg, (dst, *offset as i32), &param.ty)?;
        }
    }
    if block.width > 0 {
        // Drop whatever the arguments reserved below the block.
        e.mov(dst, Family::Sp);
    }

    let live = Emitter::live_registers(dst, free);
    e.save_registers(frame, live)?;
    e.emit(Instruction::call(format!("{FUNCTION_PREFIX}{name}")));
    if let Some(offset) = block.ret {
        match ctx.types.representation(&decl.ret)? {
            Representation::Word => e.load(Family::Sp, offset as i32, dst),
            Representation::Compound { .. } => e.lea(Family::Sp, offset as i32, dst),
            Representation::Void => {}
        }
    }
    e.restore_registers(frame, live)
}

/// Build a record in freshly reserved stack space and leave its address in `dst`.
fn lower_record(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    fields: &[(String, Expr)],
    ty: &Type,
    dst: Family,
    free: RegisterSet,
) -> Result<()> {
    let width = ctx.types.width(ty)?;
    let padded = ctx.target.aligned_stack_width(width);
    e.reserve_stack(padded);
    e.lea(Family::Sp, (padded - width) as i32, dst);

    if fields.is_empty() {
        return Ok(());
    }
    let value_reg = second_register(dst, free, "record field")?;
    let mut ordered: Vec<&(String, Expr)> = fields.iter().collect();
    ordered.sort_by(|a, b| b.0.cmp(&a.0));
    for (name, value) in ordered {
        lower_expr(e, ctx, frame, value, value_reg, free.without(dst))?;
        let offset = ctx.types.field_offset(ty, name)? as i32;
        let field_ty = ctx.types.field_type(ty, name)?;
        e.store_value(&ctx.types, value_reg, (dst, offset), &field_ty)?;
    }
    Ok(())
}
