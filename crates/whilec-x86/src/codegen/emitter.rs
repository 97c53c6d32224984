// Module-wide emission state and the instruction helpers lowering builds on.
//
// One `Emitter` owns the code buffer, the data buffer and the label counter
// for a whole translation unit. Lowering functions take it by `&mut` together
// with an immutable `LoweringContext`.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::collections::HashMap;

use crate::abi::{REGISTER_POOL, SCRATCH};
use crate::lang::{Expr, FunDecl, Type, WhileFile};
use crate::target::Target;
use crate::x86::{AluOp, Constant, DataItem, Family, Instruction, Register, RegisterSet, X86File};
use crate::{Error, Result};

use super::frame::StackFrame;
use super::layout::{Representation, TypeTable};

/// Read-only facts about the module being translated.
pub struct LoweringContext<'a> {
    pub target: Target,
    pub types: TypeTable,
    pub functions: HashMap<&'a str, &'a FunDecl>,
    pub constants: HashMap<&'a str, &'a Expr>,
}

impl<'a> LoweringContext<'a> {
    pub fn new(file: &'a WhileFile, target: Target) -> Self {
        Self {
            target,
            types: TypeTable::new(file, target),
            functions: file.functions().map(|f| (f.name.as_str(), f)).collect(),
            constants: file
                .constants()
                .map(|c| (c.name.as_str(), &c.value))
                .collect(),
        }
    }

    pub fn function(&self, name: &str) -> Result<&'a FunDecl> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownFunction(name.to_string()))
    }
}

pub struct Emitter {
    target: Target,
    code: Vec<Instruction>,
    data: Vec<DataItem>,
    next_label: usize,
    /// Normalized type → label of its descriptor in the data section.
    descriptors: HashMap<Type, String>,
    /// Set when the current statement moved the stack pointer below the frame.
    stack_reserved: bool,
    /// Module constants currently being expanded inline.
    pub(crate) inlining: Vec<String>,
}

impl Emitter {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            code: Vec::new(),
            data: Vec::new(),
            next_label: 0,
            descriptors: HashMap::new(),
            stack_reserved: false,
            inlining: Vec::new(),
        }
    }

    pub const fn target(&self) -> Target {
        self.target
    }

    pub fn finish(self) -> X86File {
        X86File::new(self.code, self.data)
    }

    // ── Registers & labels ──

    pub const fn reg(&self, family: Family) -> Register {
        self.target.head(family)
    }

    pub fn word(&self) -> u32 {
        self.target.word_width()
    }

    pub fn alloc_label(&mut self) -> String {
        let label = format!("label{}", self.next_label);
        self.next_label += 1;
        label
    }

    pub fn define_label(&mut self, name: &str) {
        self.emit(Instruction::label(name));
    }

    pub fn emit(&mut self, instr: Instruction) {
        self.code.push(instr);
    }

    // ── Moves ──

    pub fn mov(&mut self, src: Family, dst: Family) {
        let (src, dst) = (self.reg(src), self.reg(dst));
        self.emit(Instruction::Mov { src, dst });
    }

    pub fn mov_imm(&mut self, value: i64, dst: Family) {
        let dst = self.reg(dst);
        self.emit(Instruction::MovImm { value, dst });
    }

    pub fn alu(&mut self, op: AluOp, src: Family, dst: Family) {
        let (src, dst) = (self.reg(src), self.reg(dst));
        self.emit(Instruction::Alu { op, src, dst });
    }

    pub fn alu_imm(&mut self, op: AluOp, value: i32, dst: Family) {
        let dst = self.reg(dst);
        self.emit(Instruction::AluImm { op, value, dst });
    }

    pub fn load(&mut self, base: Family, offset: i32, dst: Family) {
        let (base, dst) = (self.reg(base), self.reg(dst));
        self.emit(Instruction::Load { base, offset, dst });
    }

    pub fn store(&mut self, src: Family, base: Family, offset: i32) {
        let (src, base) = (self.reg(src), self.reg(base));
        self.emit(Instruction::Store { src, base, offset });
    }

    pub fn lea(&mut self, base: Family, offset: i32, dst: Family) {
        let (base, dst) = (self.reg(base), self.reg(dst));
        self.emit(Instruction::Lea { base, offset, dst });
    }

    pub fn lea_label(&mut self, label: &str, dst: Family) {
        let dst = self.reg(dst);
        self.emit(Instruction::LeaLabel {
            label: label.to_string(),
            dst,
        });
    }

    /// Copy `width` bytes from `src_base + src_offset` to `dst_base + dst_offset`,
    /// one word at a time through the scratch register.
    pub fn copy_words(
        &mut self,
        (src_base, src_offset): (Family, i32),
        (dst_base, dst_offset): (Family, i32),
        width: u32,
    ) {
        let word = self.word();
        for k in 0..width / word {
            let delta = (k * word) as i32;
            self.load(src_base, src_offset + delta, SCRATCH);
            self.store(SCRATCH, dst_base, dst_offset + delta);
        }
    }

    /// Store the value held in `src` to `base + offset`. Compound values are
    /// copied word by word from the storage `src` points to.
    pub fn store_value(
        &mut self,
        types: &TypeTable,
        src: Family,
        (base, offset): (Family, i32),
        ty: &Type,
    ) -> Result<()> {
        match types.representation(ty)? {
            Representation::Void => {}
            Representation::Word => self.store(src, base, offset),
            Representation::Compound { width } => {
                self.copy_words((src, 0), (base, offset), width);
            }
        }
        Ok(())
    }

    // ── Stack discipline ──

    /// Move the stack pointer down by `bytes` for temporary storage.
    pub fn reserve_stack(&mut self, bytes: u32) {
        if bytes == 0 {
            return;
        }
        self.alu_imm(AluOp::Sub, bytes as i32, Family::Sp);
        self.stack_reserved = true;
    }

    pub fn begin_statement(&mut self) {
        self.stack_reserved = false;
    }

    /// Give back temporary stack space reserved since `begin_statement`.
    pub fn reclaim_stack(&mut self, frame: &StackFrame) {
        if self.stack_reserved {
            self.lea(Family::Bp, -(frame.frame_size() as i32), Family::Sp);
            self.stack_reserved = false;
        }
    }

    // ── Calls ──

    /// Pool registers holding values that must survive a call emitted while
    /// lowering into `target` with `free` available.
    pub fn live_registers(target: Family, free: RegisterSet) -> RegisterSet {
        REGISTER_POOL.difference(free).without(target)
    }

    pub fn save_registers(&mut self, frame: &StackFrame, live: RegisterSet) -> Result<()> {
        for family in live.iter() {
            let offset = frame.save_slot(family, self.word())?;
            self.store(family, Family::Bp, offset);
        }
        Ok(())
    }

    pub fn restore_registers(&mut self, frame: &StackFrame, live: RegisterSet) -> Result<()> {
        for family in live.iter() {
            let offset = frame.save_slot(family, self.word())?;
            self.load(Family::Bp, offset, family);
        }
        Ok(())
    }

    // ── Data ──

    pub fn string_constant(&mut self, value: &str) -> String {
        let label = self.alloc_label();
        self.data.push(DataItem {
            label: Some(label.clone()),
            constant: Constant::Asciz(value.to_string()),
        });
        label
    }

    /// Label of the runtime descriptor for `ty`, emitting it on first use.
    pub fn descriptor(&mut self, types: &TypeTable, ty: &Type) -> Result<String> {
        let key = types.normalize(ty)?;
        if let Some(label) = self.descriptors.get(&key) {
            return Ok(label.clone());
        }
        let words = types.descriptor(&key)?;
        let label = self.alloc_label();
        tracing::debug!("descriptor {label} for `{key}` ({} words)", words.len());
        for (i, constant) in words.into_iter().enumerate() {
            self.data.push(DataItem {
                label: (i == 0).then(|| label.clone()),
                constant,
            });
        }
        self.descriptors.insert(key, label.clone());
        Ok(label)
    }
}
