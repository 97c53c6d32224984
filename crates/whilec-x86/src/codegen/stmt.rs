// Statement lowering.
//
// Every statement starts with the whole register pool free and evaluates its
// top-level expression into `di`. Stack space reserved for temporaries while
// lowering a statement is handed back once the statement is done.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use crate::abi::{REGISTER_POOL, RT_PRINT, RUNTIME_ARGS, STATEMENT_TARGET};
use crate::lang::{Expr, ExprKind, Stmt, VarDecl};
use crate::x86::{AluOp, Condition, Family, Instruction};
use crate::{Error, Result};

use super::emitter::{Emitter, LoweringContext};
use super::expr::lower_expr;
use super::frame::StackFrame;

pub fn lower_block(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    stmts: &[Stmt],
) -> Result<()> {
    for stmt in stmts {
        lower_stmt(e, ctx, frame, stmt)?;
    }
    Ok(())
}

pub fn lower_stmt(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    stmt: &Stmt,
) -> Result<()> {
    match stmt {
        Stmt::Assign { lhs, rhs } => {
            tracing::trace!("assign");
            e.begin_statement();
            lower_assign(e, ctx, frame, lhs, rhs)?;
            e.reclaim_stack(frame);
        }
        Stmt::Print(expr) => {
            tracing::trace!("print `{}`", expr.ty);
            e.begin_statement();
            lower_top(e, ctx, frame, expr)?;
            let desc = e.descriptor(&ctx.types, &expr.ty)?;
            e.lea_label(&desc, RUNTIME_ARGS[1]);
            e.emit(Instruction::call(ctx.target.symbol(RT_PRINT)));
            e.reclaim_stack(frame);
        }
        Stmt::Return(value) => {
            tracing::trace!("return");
            if let Some(value) = value {
                e.begin_statement();
                lower_top(e, ctx, frame, value)?;
                let slot = frame.return_slot().ok_or_else(|| {
                    Error::Internal("return with a value from a void function".to_string())
                })?;
                e.store_value(
                    &ctx.types,
                    STATEMENT_TARGET,
                    (Family::Bp, slot.offset),
                    &slot.ty,
                )?;
            }
            // The epilogue restores the stack pointer from the frame pointer.
            e.emit(Instruction::jmp(frame.exit_label()));
        }
        Stmt::VariableDeclaration(decl) => lower_declaration(e, ctx, frame, decl)?,
        Stmt::IfElse {
            condition,
            true_branch,
            false_branch,
        } => {
            tracing::trace!("if/else");
            let otherwise = e.alloc_label();
            let exit = e.alloc_label();
            lower_condition(e, ctx, frame, condition, &otherwise)?;
            lower_block(e, ctx, frame, true_branch)?;
            e.emit(Instruction::jmp(exit.clone()));
            e.define_label(&otherwise);
            lower_block(e, ctx, frame, false_branch)?;
            e.define_label(&exit);
        }
        Stmt::While { condition, body } => {
            tracing::trace!("while");
            lower_loop(e, ctx, frame, condition, body, None)?;
        }
        Stmt::For {
            declaration,
            condition,
            increment,
            body,
        } => {
            tracing::trace!("for `{}`", declaration.name);
            lower_declaration(e, ctx, frame, declaration)?;
            lower_loop(e, ctx, frame, condition, body, Some(increment.as_ref()))?;
        }
        Stmt::Invoke(expr) => {
            tracing::trace!("invoke");
            e.begin_statement();
            lower_top(e, ctx, frame, expr)?;
            e.reclaim_stack(frame);
        }
    }
    Ok(())
}

/// Evaluate a statement's expression into `di` with every pool register free.
fn lower_top(e: &mut Emitter, ctx: &LoweringContext, frame: &StackFrame, expr: &Expr) -> Result<()> {
    lower_expr(e, ctx, frame, expr, STATEMENT_TARGET, REGISTER_POOL)
}

fn lower_declaration(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    decl: &VarDecl,
) -> Result<()> {
    let Some(init) = &decl.init else {
        return Ok(());
    };
    tracing::trace!("declare `{}`", decl.name);
    e.begin_statement();
    lower_top(e, ctx, frame, init)?;
    let slot = frame
        .slot(&decl.name)
        .ok_or_else(|| Error::UnknownVariable(decl.name.clone()))?;
    e.store_value(&ctx.types, STATEMENT_TARGET, (Family::Bp, slot.offset), &decl.ty)?;
    e.reclaim_stack(frame);
    Ok(())
}

fn lower_assign(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    lhs: &Expr,
    rhs: &Expr,
) -> Result<()> {
    match &lhs.kind {
        ExprKind::Variable(name) => {
            lower_top(e, ctx, frame, rhs)?;
            let slot = frame
                .slot(name)
                .ok_or_else(|| Error::UnknownVariable(name.clone()))?;
            e.store_value(&ctx.types, STATEMENT_TARGET, (Family::Bp, slot.offset), &lhs.ty)
        }
        ExprKind::RecordAccess { source, field } => {
            lower_top(e, ctx, frame, rhs)?;
            let free = REGISTER_POOL.without(STATEMENT_TARGET);
            let record = free.head_excluding(STATEMENT_TARGET).ok_or_else(|| {
                Error::RegisterPoolExhausted("assignment target".to_string())
            })?;
            lower_expr(e, ctx, frame, source, record, free)?;
            let offset = ctx.types.field_offset(&source.ty, field)? as i32;
            e.store_value(&ctx.types, STATEMENT_TARGET, (record, offset), &lhs.ty)
        }
        ExprKind::IndexOf { .. } => Err(Error::Unsupported(
            "assignment to a list element".to_string(),
        )),
        _ => Err(Error::Internal(format!(
            "cannot assign to an expression of type `{}`",
            lhs.ty
        ))),
    }
}

/// Branch to `otherwise` when `condition` is false.
fn lower_condition(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    condition: &Expr,
    otherwise: &str,
) -> Result<()> {
    e.begin_statement();
    lower_top(e, ctx, frame, condition)?;
    e.reclaim_stack(frame);
    e.alu_imm(AluOp::Cmp, 0, STATEMENT_TARGET);
    e.emit(Instruction::jcc(Condition::E, otherwise));
    Ok(())
}

fn lower_loop(
    e: &mut Emitter,
    ctx: &LoweringContext,
    frame: &StackFrame,
    condition: &Expr,
    body: &[Stmt],
    increment: Option<&Stmt>,
) -> Result<()> {
    let head = e.alloc_label();
    let exit = e.alloc_label();
    e.define_label(&head);
    lower_condition(e, ctx, frame, condition, &exit)?;
    lower_block(e, ctx, frame, body)?;
    if let Some(increment) = increment {
        lower_stmt(e, ctx, frame, increment)?;
    }
    e.emit(Instruction::jmp(head));
    e.define_label(&exit);
    Ok(())
}
