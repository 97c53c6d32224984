// Stack frame allocation.
//
// Frame layout, relative to the frame pointer (addresses grow upwards):
//
//   bp + 2w + block   ┐
//   ...               │ caller-reserved block: parameters in declaration
//   bp + 2w           ┘ order from the top, then the return slot, then padding
//   bp + w              return address
//   bp                  saved frame pointer
//   bp - 1 ...          locals, packed in first-discovery order
//   ...                 register save area (one word per pool register)
//   bp - frame_size     stack pointer after the prologue

use std::collections::{HashMap, HashSet};

use crate::abi::{FRAME_LINK_WORDS, REGISTER_POOL};
use crate::lang::{BinOp, Expr, ExprKind, FunDecl, Stmt, Type};
use crate::x86::Family;
use crate::{Error, Result};

use super::layout::TypeTable;

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    /// Offset from the frame pointer.
    pub offset: i32,
    pub ty: Type,
}

/// Offsets inside the block a caller reserves for a callee's parameters and
/// return value, measured from the block base (the stack pointer at the call).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerBlock {
    /// Aligned block size.
    pub width: u32,
    pub params: Vec<u32>,
    pub ret: Option<u32>,
}

impl CallerBlock {
    pub fn layout<'t>(
        params: impl IntoIterator<Item = &'t Type>,
        ret: &Type,
        types: &TypeTable,
    ) -> Result<Self> {
        let params: Vec<&Type> = params.into_iter().collect();
        let mut used = types.width(ret)?;
        for ty in &params {
            used += types.width(ty)?;
        }
        let width = types.target().aligned_stack_width(used);

        let mut offset = width;
        let mut param_offsets = Vec::with_capacity(params.len());
        for ty in params {
            offset -= types.width(ty)?;
            param_offsets.push(offset);
        }
        let ret = if ret.is_void() {
            None
        } else {
            offset -= types.width(ret)?;
            Some(offset)
        };
        Ok(Self {
            width,
            params: param_offsets,
            ret,
        })
    }

    pub fn of(decl: &FunDecl, types: &TypeTable) -> Result<Self> {
        Self::layout(decl.params.iter().map(|p| &p.ty), &decl.ret, types)
    }
}

#[derive(Debug)]
pub struct StackFrame {
    slots: HashMap<String, Slot>,
    return_slot: Option<Slot>,
    exit_label: String,
    caller_block_width: u32,
    save_area: Option<i32>,
    frame_size: u32,
}

impl StackFrame {
    pub fn allocate(
        decl: &FunDecl,
        types: &TypeTable,
        exit_label: String,
        with_save_area: bool,
    ) -> Result<Self> {
        let target = types.target();
        let word = target.word_width();
        let block = CallerBlock::of(decl, types)?;
        let link = (FRAME_LINK_WORDS * word) as i32;

        let mut slots = HashMap::new();
        for (param, offset) in decl.params.iter().zip(&block.params) {
            slots.insert(
                param.name.clone(),
                Slot {
                    offset: link + *offset as i32,
                    ty: param.ty.clone(),
                },
            );
        }
        let return_slot = block.ret.map(|offset| Slot {
            offset: link + offset as i32,
            ty: decl.ret.clone(),
        });

        let mut locals: Vec<(String, Type, u32)> = Vec::new();
        discover_locals(&decl.body, types, &mut locals)?;

        let mut offset: i32 = 0;
        for (name, ty, width) in locals {
            if slots.contains_key(&name) {
                continue;
            }
            offset -= width as i32;
            slots.insert(name, Slot { offset, ty });
        }
        let locals_width = offset.unsigned_abs();

        let (save_area, save_width) = if with_save_area {
            let width = REGISTER_POOL.len() * word;
            (Some(-((locals_width + width) as i32)), width)
        } else {
            (None, 0)
        };

        Ok(Self {
            slots,
            return_slot,
            exit_label,
            caller_block_width: block.width,
            save_area,
            frame_size: target.aligned_stack_width(locals_width + save_width),
        })
    }

    pub fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    pub fn return_slot(&self) -> Option<&Slot> {
        self.return_slot.as_ref()
    }

    pub fn exit_label(&self) -> &str {
        &self.exit_label
    }

    /// Bytes the caller reserves for parameters and return value.
    pub const fn caller_block_width(&self) -> u32 {
        self.caller_block_width
    }

    /// Bytes reserved below the frame pointer by the prologue.
    pub const fn frame_size(&self) -> u32 {
        self.frame_size
    }

    /// Frame-pointer offset of the save slot for a pool register.
    pub fn save_slot(&self, family: Family, word: u32) -> Result<i32> {
        let base = self
            .save_area
            .ok_or_else(|| Error::Internal("frame has no register save area".to_string()))?;
        let index = REGISTER_POOL
            .iter()
            .position(|f| f == family)
            .ok_or_else(|| Error::Internal(format!("{family:?} is not a pool register")))?;
        Ok(base + (index as u32 * word) as i32)
    }
}

/// Record every declared local with its widest type, in first-discovery order.
fn discover_locals(
    stmts: &[Stmt],
    types: &TypeTable,
    locals: &mut Vec<(String, Type, u32)>,
) -> Result<()> {
    for stmt in stmts {
        match stmt {
            Stmt::VariableDeclaration(decl) => declare(&decl.name, &decl.ty, types, locals)?,
            Stmt::IfElse {
                true_branch,
                false_branch,
                ..
            } => {
                discover_locals(true_branch, types, locals)?;
                discover_locals(false_branch, types, locals)?;
            }
            Stmt::While { body, .. } => discover_locals(body, types, locals)?,
            Stmt::For {
                declaration,
                increment,
                body,
                ..
            } => {
                declare(&declaration.name, &declaration.ty, types, locals)?;
                discover_locals(body, types, locals)?;
                discover_locals(std::slice::from_ref(increment.as_ref()), types, locals)?;
            }
            Stmt::Assign { .. } | Stmt::Print(_) | Stmt::Return(_) | Stmt::Invoke(_) => {}
        }
    }
    Ok(())
}

fn declare(
    name: &str,
    ty: &Type,
    types: &TypeTable,
    locals: &mut Vec<(String, Type, u32)>,
) -> Result<()> {
    let width = types.width(ty)?;
    match locals.iter_mut().find(|(n, _, _)| n == name) {
        Some(entry) if width > entry.2 => {
            entry.1 = ty.clone();
            entry.2 = width;
        }
        Some(_) => {}
        None => locals.push((name.to_string(), ty.clone(), width)),
    }
    Ok(())
}

/// Whether lowering `stmts` can emit a call while a pool register is live,
/// i.e. whether the frame needs a register save area.
pub fn emits_calls(stmts: &[Stmt], constants: &HashMap<&str, &Expr>) -> bool {
    let mut seen = HashSet::new();
    stmts.iter().any(|s| stmt_calls(s, constants, &mut seen))
}

fn stmt_calls<'a>(
    stmt: &'a Stmt,
    constants: &HashMap<&str, &'a Expr>,
    seen: &mut HashSet<&'a str>,
) -> bool {
    let any = |stmts: &'a [Stmt], seen: &mut HashSet<&'a str>| {
        stmts.iter().any(|s| stmt_calls(s, constants, seen))
    };
    match stmt {
        Stmt::Assign { lhs, rhs } => {
            expr_calls(lhs, constants, seen) || expr_calls(rhs, constants, seen)
        }
        Stmt::Print(e) | Stmt::Invoke(e) | Stmt::Return(Some(e)) => expr_calls(e, constants, seen),
        Stmt::Return(None) => false,
        Stmt::VariableDeclaration(decl) => decl
            .init
            .as_ref()
            .is_some_and(|e| expr_calls(e, constants, seen)),
        Stmt::IfElse {
            condition,
            true_branch,
            false_branch,
        } => {
            expr_calls(condition, constants, seen)
                || any(true_branch, seen)
                || any(false_branch, seen)
        }
        Stmt::While { condition, body } => expr_calls(condition, constants, seen) || any(body, seen),
        Stmt::For {
            declaration,
            condition,
            increment,
            body,
        } => {
            declaration
                .init
                .as_ref()
                .is_some_and(|e| expr_calls(e, constants, seen))
                || expr_calls(condition, constants, seen)
                || stmt_calls(increment, constants, seen)
                || any(body, seen)
        }
    }
}

fn expr_calls<'a>(
    expr: &'a Expr,
    constants: &HashMap<&str, &'a Expr>,
    seen: &mut HashSet<&'a str>,
) -> bool {
    match &expr.kind {
        ExprKind::Invoke { .. }
        | ExprKind::Binary {
            op: BinOp::Append, ..
        } => true,
        ExprKind::Constant(_) => false,
        ExprKind::Variable(name) => match constants.get(name.as_str()) {
            Some(&value) if seen.insert(name.as_str()) => expr_calls(value, constants, seen),
            _ => false,
        },
        ExprKind::Binary { lhs, rhs, .. } => {
            expr_calls(lhs, constants, seen) || expr_calls(rhs, constants, seen)
        }
        ExprKind::IndexOf { source, index } => {
            expr_calls(source, constants, seen) || expr_calls(index, constants, seen)
        }
        ExprKind::Unary { expr, .. } => expr_calls(expr, constants, seen),
        ExprKind::Cast { source } | ExprKind::RecordAccess { source, .. } => {
            expr_calls(source, constants, seen)
        }
        ExprKind::ListConstructor(items) => items.iter().any(|e| expr_calls(e, constants, seen)),
        ExprKind::RecordConstructor(fields) => {
            fields.iter().any(|(_, e)| expr_calls(e, constants, seen))
        }
    }
}
