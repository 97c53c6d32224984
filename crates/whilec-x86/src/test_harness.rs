//! Test harness for whilec-x86 unit and integration tests
//!
//! Two kinds of helpers live here:
//!
//! - instruction patterns ([`Pat`], [`InstructionPattern`]) for asserting on
//!   the shape of generated code without pinning every register choice;
//! - a small x86-64 simulator ([`run`]) that executes an [`X86File`] with the
//!   runtime library (`print`, `str_append`, ...) implemented natively, so a
//!   test can check what a compiled program prints.
//!
//! The simulator clobbers every caller-saved register on runtime calls, which
//! makes it catch code that forgets to preserve live values across a call.
//!
//! # Example
//!
//! ```rust
//! use whilec_x86::lang::{Expr, Stmt};
//! use whilec_x86::test_harness::*;
//!
//! let file = program([main_with(vec![Stmt::Print(Expr::int(42))])]);
//! let execution = compile_and_run(&file).expect("program runs");
//! assert_eq!(execution.output, ["42"]);
//! ```

#![allow(
    clippy::match_same_arms,
    clippy::must_use_candidate,
    clippy::manual_assert,
    clippy::missing_panics_doc,
    clippy::uninlined_format_args,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::collections::HashMap;

use crate::abi::{
    ENTRY_SYMBOL, RT_PRINT, RT_STR_APPEND, RT_STR_LEFT_APPEND, RT_STR_RIGHT_APPEND, TypeTag,
};
use crate::lang::{Decl, FunDecl, Stmt, Type, WhileFile};
use crate::x86::{
    AluOp, Condition, Constant, Family, Instruction, Register, SseOp, Width, X86File, Xmm,
};
use crate::{CompileOptions, Error, Result, Target, compile_with_options};

// ── Compilation helpers ──

/// Compile for Linux x86-64 and run the result.
pub fn compile_and_run(file: &WhileFile) -> Result<Execution> {
    run_with_options(file, &CompileOptions::default())
}

pub fn run_with_options(file: &WhileFile, options: &CompileOptions) -> Result<Execution> {
    let out = compile_with_options(file, options)?;
    run(&out, options.target)
}

/// Compile for Linux x86-64, run, and return what the program printed.
pub fn run_output(file: &WhileFile) -> Vec<String> {
    compile_and_run(file)
        .unwrap_or_else(|e| panic!("program failed: {e}"))
        .output
}

// ── Program builders ──

/// A `void main()` with the given body.
pub fn main_with(body: Vec<Stmt>) -> FunDecl {
    FunDecl::new("main", vec![], Type::Void, body)
}

/// A source file holding only `functions`.
pub fn program(functions: impl IntoIterator<Item = FunDecl>) -> WhileFile {
    WhileFile::new(functions.into_iter().map(Decl::Function).collect())
}

// ── Instruction patterns ──

/// Pattern matching for instruction fields
#[derive(Debug, Clone)]
pub enum Pat<T> {
    /// Match any value
    Any,
    /// Match exact value
    Exact(T),
    /// Match if value satisfies predicate
    Predicate(fn(&T) -> bool),
}

impl<T: PartialEq> Pat<T> {
    /// Check if a value matches this pattern
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Pat::Any => true,
            Pat::Exact(expected) => value == expected,
            Pat::Predicate(pred) => pred(value),
        }
    }
}

/// Pattern for matching instructions in tests
///
/// Registers are matched by family, so the same pattern works for 32-bit and
/// 64-bit output.
#[derive(Debug, Clone)]
pub enum InstructionPattern {
    /// Match any instruction
    Any,
    Mov {
        src: Pat<Family>,
        dst: Pat<Family>,
    },
    Alu {
        op: Pat<AluOp>,
        src: Pat<Family>,
        dst: Pat<Family>,
    },
    MovImm {
        value: Pat<i64>,
        dst: Pat<Family>,
    },
    AluImm {
        op: Pat<AluOp>,
        value: Pat<i32>,
        dst: Pat<Family>,
    },
    Load {
        base: Pat<Family>,
        offset: Pat<i32>,
        dst: Pat<Family>,
    },
    Store {
        src: Pat<Family>,
        base: Pat<Family>,
        offset: Pat<i32>,
    },
    Lea {
        base: Pat<Family>,
        offset: Pat<i32>,
        dst: Pat<Family>,
    },
    LeaLabel {
        dst: Pat<Family>,
    },
    Label,
    Jmp,
    Jcc {
        cond: Pat<Condition>,
    },
    Call {
        symbol: Pat<String>,
    },
    Ret,
    Push {
        reg: Pat<Family>,
    },
    Pop {
        reg: Pat<Family>,
    },
    SignExtend,
    Idiv {
        divisor: Pat<Family>,
    },
}

fn fam(reg: &Register) -> Family {
    reg.family()
}

impl InstructionPattern {
    /// Check if an instruction matches this pattern
    pub fn matches(&self, instr: &Instruction) -> bool {
        use InstructionPattern as P;

        match (self, instr) {
            (P::Any, _) => true,
            (P::Mov { src: s, dst: d }, Instruction::Mov { src, dst }) => {
                s.matches(&fam(src)) && d.matches(&fam(dst))
            }
            (
                P::Alu {
                    op: o,
                    src: s,
                    dst: d,
                },
                Instruction::Alu { op, src, dst },
            ) => o.matches(op) && s.matches(&fam(src)) && d.matches(&fam(dst)),
            (P::MovImm { value: v, dst: d }, Instruction::MovImm { value, dst }) => {
                v.matches(value) && d.matches(&fam(dst))
            }
            (
                P::AluImm {
                    op: o,
                    value: v,
                    dst: d,
                },
                Instruction::AluImm { op, value, dst },
            ) => o.matches(op) && v.matches(value) && d.matches(&fam(dst)),
            (
                P::Load {
                    base: b,
                    offset: o,
                    dst: d,
                },
                Instruction::Load { base, offset, dst },
            ) => b.matches(&fam(base)) && o.matches(offset) && d.matches(&fam(dst)),
            (
                P::Store {
                    src: s,
                    base: b,
                    offset: o,
                },
                Instruction::Store { src, base, offset },
            ) => s.matches(&fam(src)) && b.matches(&fam(base)) && o.matches(offset),
            (
                P::Lea {
                    base: b,
                    offset: o,
                    dst: d,
                },
                Instruction::Lea { base, offset, dst },
            ) => b.matches(&fam(base)) && o.matches(offset) && d.matches(&fam(dst)),
            (P::LeaLabel { dst: d }, Instruction::LeaLabel { dst, .. }) => d.matches(&fam(dst)),
            (P::Label, Instruction::Label { .. }) => true,
            (P::Jmp, Instruction::Jmp { .. }) => true,
            (P::Jcc { cond: c }, Instruction::Jcc { cond, .. }) => c.matches(cond),
            (P::Call { symbol: s }, Instruction::Call { symbol }) => s.matches(symbol),
            (P::Ret, Instruction::Ret) => true,
            (P::Push { reg: r }, Instruction::Push { reg }) => r.matches(&fam(reg)),
            (P::Pop { reg: r }, Instruction::Pop { reg }) => r.matches(&fam(reg)),
            (P::SignExtend, Instruction::SignExtend { .. }) => true,
            (P::Idiv { divisor: d }, Instruction::Idiv { divisor }) => d.matches(&fam(divisor)),
            _ => false,
        }
    }
}

/// Find the first occurrence of a pattern in an instruction sequence
///
/// Returns the starting index if found, None otherwise
pub fn find_pattern(instructions: &[Instruction], pattern: &[InstructionPattern]) -> Option<usize> {
    if pattern.is_empty() {
        return Some(0);
    }

    'outer: for start in 0..=instructions.len().saturating_sub(pattern.len()) {
        if start + pattern.len() > instructions.len() {
            break;
        }
        for (i, pat) in pattern.iter().enumerate() {
            if !pat.matches(&instructions[start + i]) {
                continue 'outer;
            }
        }
        return Some(start);
    }
    None
}

/// Assert that an instruction sequence contains a pattern
///
/// Panics with a descriptive message if the pattern is not found
pub fn assert_has_pattern(instructions: &[Instruction], pattern: &[InstructionPattern]) {
    if find_pattern(instructions, pattern).is_none() {
        panic!(
            "Pattern not found in instruction sequence.\n\nExpected pattern:\n{}\n\nActual instructions:\n{}",
            format_patterns(pattern),
            format_instructions(instructions)
        );
    }
}

/// Assert that instructions match a pattern exactly
///
/// Panics with a descriptive message if they don't match
pub fn assert_matches(instructions: &[Instruction], pattern: &[InstructionPattern]) {
    if instructions.len() != pattern.len() {
        panic!(
            "Instruction count mismatch: expected {}, got {}.\n\nExpected pattern:\n{}\n\nActual instructions:\n{}",
            pattern.len(),
            instructions.len(),
            format_patterns(pattern),
            format_instructions(instructions)
        );
    }

    for (i, (instr, pat)) in instructions.iter().zip(pattern.iter()).enumerate() {
        if !pat.matches(instr) {
            panic!(
                "Instruction mismatch at index {}:\nExpected: {:?}\nActual:   {}\n\nFull instructions:\n{}",
                i,
                pat,
                instr,
                format_instructions(instructions)
            );
        }
    }
}

/// Count instructions matching a single pattern
pub fn count_matching(instructions: &[Instruction], pattern: &InstructionPattern) -> usize {
    instructions.iter().filter(|i| pattern.matches(i)).count()
}

/// Count calls to `symbol`
pub fn count_calls(instructions: &[Instruction], symbol: &str) -> usize {
    instructions
        .iter()
        .filter(|i| matches!(i, Instruction::Call { symbol: s } if s == symbol))
        .count()
}

/// Format patterns for display
fn format_patterns(patterns: &[InstructionPattern]) -> String {
    patterns
        .iter()
        .map(|p| format!("  {:?}", p))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format instructions for display
fn format_instructions(instructions: &[Instruction]) -> String {
    instructions
        .iter()
        .map(|i| format!("  {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Simulator ──

const MEMORY_SIZE: u64 = 8 << 20;
const DATA_BASE: u64 = 0x1000;
/// Heap allocations and stack growth must not cross this address.
const HEAP_LIMIT: u64 = MEMORY_SIZE / 2;
const STACK_TOP: u64 = MEMORY_SIZE - 0x100;
/// Return addresses are code indices offset by this base.
const CODE_BASE: u64 = 0x4000_0000_0000;
/// Return address that ends the simulation.
const EXIT_ADDRESS: u64 = 0x7fff_ffff_0000;
/// Value left in caller-saved registers by runtime calls.
const GARBAGE: u64 = 0xdead_beef_dead_beef;

pub const DEFAULT_STEP_LIMIT: u64 = 5_000_000;

/// Observable result of running a program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// One entry per `print` call.
    pub output: Vec<String>,
    pub exit_code: i64,
    /// Largest distance the stack pointer moved below its initial value.
    pub max_stack_depth: u64,
    pub steps: u64,
}

/// Execute `file` from its process entry point.
pub fn run(file: &X86File, target: Target) -> Result<Execution> {
    run_with_limit(file, target, DEFAULT_STEP_LIMIT)
}

pub fn run_with_limit(file: &X86File, target: Target, step_limit: u64) -> Result<Execution> {
    if !target.is_64_bit() {
        return Err(Error::Unsupported(
            "simulating 32-bit code".to_string(),
        ));
    }
    let mut machine = Machine::load(file, target)?;
    machine.execute(step_limit)
}

/// Runtime type descriptor as read back from the data section.
#[derive(Debug, Clone, PartialEq)]
enum Descriptor {
    Void,
    Bool,
    Char,
    Int,
    Real,
    Str,
    Record(Vec<(String, Descriptor)>),
    List(Box<Descriptor>),
}

impl Descriptor {
    fn width(&self) -> u64 {
        match self {
            Descriptor::Void => 0,
            Descriptor::Record(fields) => fields.iter().map(|(_, d)| d.width()).sum(),
            _ => 8,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    zf: bool,
    sf: bool,
    of: bool,
    cf: bool,
    pf: bool,
}

impl Flags {
    fn holds(self, cond: Condition) -> bool {
        match cond {
            Condition::E => self.zf,
            Condition::Ne => !self.zf,
            Condition::L => self.sf != self.of,
            Condition::Le => self.zf || self.sf != self.of,
            Condition::G => !self.zf && self.sf == self.of,
            Condition::Ge => self.sf == self.of,
            Condition::B => self.cf,
            Condition::Be => self.cf || self.zf,
            Condition::A => !self.cf && !self.zf,
            Condition::Ae => !self.cf,
            Condition::P => self.pf,
            Condition::Np => !self.pf,
        }
    }
}

struct Machine<'a> {
    target: Target,
    code: &'a [Instruction],
    code_labels: HashMap<&'a str, usize>,
    data_labels: HashMap<&'a str, u64>,
    memory: Vec<u8>,
    regs: [u64; 9],
    xmm: [u64; 2],
    flags: Flags,
    heap: u64,
    lowest_sp: u64,
    output: Vec<String>,
}

fn sim_error(msg: impl Into<String>) -> Error {
    Error::Internal(format!("simulator: {}", msg.into()))
}

impl<'a> Machine<'a> {
    fn load(file: &'a X86File, target: Target) -> Result<Self> {
        let mut machine = Self {
            target,
            code: &file.code,
            code_labels: HashMap::new(),
            data_labels: HashMap::new(),
            memory: vec![0; MEMORY_SIZE as usize],
            regs: [0; 9],
            xmm: [0; 2],
            flags: Flags::default(),
            heap: 0,
            lowest_sp: STACK_TOP,
            output: Vec::new(),
        };

        for (index, instr) in file.code.iter().enumerate() {
            if let Instruction::Label { name, .. } = instr {
                machine.code_labels.insert(name, index);
            }
        }

        let mut addr = DATA_BASE;
        for item in &file.data {
            if let Some(label) = &item.label {
                machine.data_labels.insert(label, addr);
            }
            match &item.constant {
                Constant::Asciz(s) => {
                    machine.write_bytes(addr, s.as_bytes())?;
                    machine.write_bytes(addr + s.len() as u64, &[0])?;
                }
                Constant::Long(v) => machine.write_bytes(addr, &(*v as i32).to_le_bytes())?,
                Constant::Quad(v) => machine.write_bytes(addr, &v.to_le_bytes())?,
            }
            addr += item.constant.size() as u64;
        }
        machine.heap = addr.next_multiple_of(16);
        Ok(machine)
    }

    fn execute(&mut self, step_limit: u64) -> Result<Execution> {
        let entry_name = self.target.symbol(ENTRY_SYMBOL);
        let mut pc = self.label_index(&entry_name)?;
        self.set(Family::Sp, STACK_TOP);
        self.push(EXIT_ADDRESS)?;

        let code = self.code;
        let mut steps = 0;
        loop {
            steps += 1;
            if steps > step_limit {
                return Err(sim_error(format!("step limit of {step_limit} exceeded")));
            }
            let instr = code
                .get(pc)
                .ok_or_else(|| sim_error(format!("fell off the end of the code at {pc}")))?;
            pc += 1;

            match self.step(instr, pc)? {
                Flow::Next => {}
                Flow::Jump(target) => pc = target,
                Flow::Exit => break,
            }

            let sp = self.get(Family::Sp);
            if sp < HEAP_LIMIT {
                return Err(sim_error("stack overflow"));
            }
            self.lowest_sp = self.lowest_sp.min(sp);
        }

        Ok(Execution {
            output: std::mem::take(&mut self.output),
            exit_code: self.get(Family::Ax) as i64,
            max_stack_depth: STACK_TOP - self.lowest_sp,
            steps,
        })
    }

    fn step(&mut self, instr: &Instruction, next: usize) -> Result<Flow> {
        match instr {
            Instruction::Mov { src, dst } => self.set(dst.family(), self.get(src.family())),
            Instruction::Alu { op, src, dst } => {
                self.alu(*op, self.get(src.family()), dst.family());
            }
            Instruction::MovImm { value, dst } => self.set(dst.family(), *value as u64),
            Instruction::AluImm { op, value, dst } => {
                self.alu(*op, i64::from(*value) as u64, dst.family());
            }
            Instruction::Load { base, offset, dst } => {
                let addr = self.address(*base, *offset);
                let value = self.read_u64(addr)?;
                self.set(dst.family(), value);
            }
            Instruction::Store { src, base, offset } => {
                let addr = self.address(*base, *offset);
                self.write_u64(addr, self.get(src.family()))?;
            }
            Instruction::Lea { base, offset, dst } => {
                let addr = self.address(*base, *offset);
                self.set(dst.family(), addr);
            }
            Instruction::LeaLabel { label, dst } => {
                let addr = *self
                    .data_labels
                    .get(label.as_str())
                    .ok_or_else(|| sim_error(format!("unknown data label `{label}`")))?;
                self.set(dst.family(), addr);
            }
            Instruction::Label { .. } => {}
            Instruction::Jmp { label } => return Ok(Flow::Jump(self.label_index(label)?)),
            Instruction::Jcc { cond, label } => {
                if self.flags.holds(*cond) {
                    return Ok(Flow::Jump(self.label_index(label)?));
                }
            }
            Instruction::Call { symbol } => {
                if self.get(Family::Sp) % 16 != 0 {
                    return Err(sim_error(format!(
                        "call to `{symbol}` with misaligned stack pointer {:#x}",
                        self.get(Family::Sp)
                    )));
                }
                if let Some(&target) = self.code_labels.get(symbol.as_str()) {
                    self.push(CODE_BASE + next as u64)?;
                    return Ok(Flow::Jump(target));
                }
                self.runtime_call(symbol)?;
            }
            Instruction::Ret => {
                let addr = self.pop()?;
                if addr == EXIT_ADDRESS {
                    return Ok(Flow::Exit);
                }
                let index = addr
                    .checked_sub(CODE_BASE)
                    .filter(|i| (*i as usize) < self.code.len())
                    .ok_or_else(|| sim_error(format!("return to bad address {addr:#x}")))?;
                return Ok(Flow::Jump(index as usize));
            }
            Instruction::Push { reg } => self.push(self.get(reg.family()))?,
            Instruction::Pop { reg } => {
                let value = self.pop()?;
                self.set(reg.family(), value);
            }
            Instruction::SignExtend { width } => {
                if *width != Width::Quad {
                    return Err(sim_error("32-bit sign extension"));
                }
                let high = if (self.get(Family::Ax) as i64) < 0 {
                    u64::MAX
                } else {
                    0
                };
                self.set(Family::Dx, high);
            }
            Instruction::Idiv { divisor } => self.idiv(self.get(divisor.family()) as i64)?,
            Instruction::Not { reg } => self.set(reg.family(), !self.get(reg.family())),
            Instruction::Neg { reg } => {
                self.set(reg.family(), self.get(reg.family()).wrapping_neg());
            }
            Instruction::MovToXmm { src, dst } => self.xmm[xmm_index(*dst)] = self.get(src.family()),
            Instruction::MovFromXmm { src, dst } => {
                self.set(dst.family(), self.xmm[xmm_index(*src)]);
            }
            Instruction::Sse { op, src, dst } => {
                let a = f64::from_bits(self.xmm[xmm_index(*dst)]);
                let b = f64::from_bits(self.xmm[xmm_index(*src)]);
                let result = match op {
                    SseOp::Add => a + b,
                    SseOp::Sub => a - b,
                    SseOp::Mul => a * b,
                    SseOp::Div => a / b,
                };
                self.xmm[xmm_index(*dst)] = result.to_bits();
            }
            Instruction::Ucomisd { src, dst } => {
                let a = f64::from_bits(self.xmm[xmm_index(*dst)]);
                let b = f64::from_bits(self.xmm[xmm_index(*src)]);
                let unordered = a.is_nan() || b.is_nan();
                self.flags = Flags {
                    zf: unordered || a == b,
                    cf: unordered || a < b,
                    pf: unordered,
                    sf: false,
                    of: false,
                };
            }
            Instruction::Xorpd { src, dst } => {
                self.xmm[xmm_index(*dst)] ^= self.xmm[xmm_index(*src)];
            }
            Instruction::Cvtsi2sd { src, dst } => {
                self.xmm[xmm_index(*dst)] = (self.get(src.family()) as i64 as f64).to_bits();
            }
        }
        Ok(Flow::Next)
    }

    fn alu(&mut self, op: AluOp, src: u64, dst: Family) {
        let lhs = self.get(dst);
        let result = match op {
            AluOp::Add => lhs.wrapping_add(src),
            AluOp::Sub => lhs.wrapping_sub(src),
            AluOp::Imul => (lhs as i64).wrapping_mul(src as i64) as u64,
            AluOp::And => lhs & src,
            AluOp::Or => lhs | src,
            AluOp::Xor => lhs ^ src,
            AluOp::Cmp => {
                let (diff, overflow) = (lhs as i64).overflowing_sub(src as i64);
                self.flags = Flags {
                    zf: diff == 0,
                    sf: diff < 0,
                    of: overflow,
                    cf: lhs < src,
                    pf: false,
                };
                return;
            }
        };
        self.set(dst, result);
    }

    fn idiv(&mut self, divisor: i64) -> Result<()> {
        if divisor == 0 {
            return Err(sim_error("division by zero"));
        }
        let dividend =
            (i128::from(self.get(Family::Dx) as i64) << 64) | i128::from(self.get(Family::Ax));
        let quotient = dividend / i128::from(divisor);
        let remainder = dividend % i128::from(divisor);
        let quotient =
            i64::try_from(quotient).map_err(|_| sim_error("division overflow"))?;
        self.set(Family::Ax, quotient as u64);
        self.set(Family::Dx, remainder as i64 as u64);
        Ok(())
    }

    // ── Runtime library ──

    fn runtime_call(&mut self, symbol: &str) -> Result<()> {
        let t = self.target;
        let (rdi, rsi, rdx) = (
            self.get(Family::Di),
            self.get(Family::Si),
            self.get(Family::Dx),
        );
        let result = if symbol == t.symbol(RT_PRINT) {
            let desc = self.descriptor(rsi)?;
            let text = self.format_value(rdi, &desc)?;
            self.output.push(text);
            GARBAGE
        } else if symbol == t.symbol(RT_STR_APPEND) {
            let text = self.read_cstr(rdi)? + &self.read_cstr(rsi)?;
            self.alloc_str(&text)?
        } else if symbol == t.symbol(RT_STR_LEFT_APPEND) {
            let desc = self.descriptor(rdx)?;
            let text = self.read_cstr(rdi)? + &self.format_value(rsi, &desc)?;
            self.alloc_str(&text)?
        } else if symbol == t.symbol(RT_STR_RIGHT_APPEND) {
            let desc = self.descriptor(rdx)?;
            let text = self.format_value(rdi, &desc)? + &self.read_cstr(rsi)?;
            self.alloc_str(&text)?
        } else {
            return Err(sim_error(format!("call to unknown symbol `{symbol}`")));
        };

        for family in [Family::Cx, Family::Dx, Family::Si, Family::Di] {
            self.set(family, GARBAGE);
        }
        self.xmm = [GARBAGE; 2];
        self.set(Family::Ax, result);
        Ok(())
    }

    fn descriptor(&self, addr: u64) -> Result<Descriptor> {
        self.parse_descriptor(addr).map(|(desc, _)| desc)
    }

    fn parse_descriptor(&self, addr: u64) -> Result<(Descriptor, u64)> {
        let code = self.read_u64(addr)? as i64;
        let tag = TypeTag::from_code(code)
            .ok_or_else(|| sim_error(format!("bad descriptor tag {code} at {addr:#x}")))?;
        let next = addr + 8;
        Ok(match tag {
            TypeTag::Void => (Descriptor::Void, next),
            TypeTag::Bool => (Descriptor::Bool, next),
            TypeTag::Char => (Descriptor::Char, next),
            TypeTag::Int => (Descriptor::Int, next),
            TypeTag::Real => (Descriptor::Real, next),
            TypeTag::Str => (Descriptor::Str, next),
            TypeTag::Record => {
                let count = self.read_u64(next)?;
                let mut cursor = next + 8;
                let mut fields = Vec::new();
                for _ in 0..count {
                    let len = self.read_u64(cursor)?;
                    let name = self.read_cstr(cursor + 8)?;
                    if name.len() as u64 != len {
                        return Err(sim_error(format!("field name length mismatch at {cursor:#x}")));
                    }
                    let (field, after) = self.parse_descriptor(cursor + 8 + len + 1)?;
                    fields.push((name, field));
                    cursor = after;
                }
                (Descriptor::Record(fields), cursor)
            }
            TypeTag::List => {
                let (element, after) = self.parse_descriptor(next)?;
                (Descriptor::List(Box::new(element)), after)
            }
        })
    }

    fn format_value(&self, value: u64, desc: &Descriptor) -> Result<String> {
        Ok(match desc {
            Descriptor::Void => String::new(),
            Descriptor::Bool => (value != 0).to_string(),
            Descriptor::Char => char::from_u32(value as u32).unwrap_or('?').to_string(),
            Descriptor::Int => (value as i64).to_string(),
            Descriptor::Real => format!("{:?}", f64::from_bits(value)),
            Descriptor::Str => self.read_cstr(value)?,
            Descriptor::Record(fields) => {
                let mut parts = Vec::with_capacity(fields.len());
                let mut offset = 0;
                for (name, field) in fields {
                    let addr = value + offset;
                    let field_value = match field {
                        Descriptor::Record(_) => addr,
                        _ => self.read_u64(addr)?,
                    };
                    parts.push(format!("{name}:{}", self.format_value(field_value, field)?));
                    offset += field.width();
                }
                format!("{{{}}}", parts.join(","))
            }
            Descriptor::List(_) => return Err(sim_error("printing list values")),
        })
    }

    fn alloc_str(&mut self, text: &str) -> Result<u64> {
        let addr = self.heap;
        let end = addr + text.len() as u64 + 1;
        if end > HEAP_LIMIT {
            return Err(sim_error("heap exhausted"));
        }
        self.write_bytes(addr, text.as_bytes())?;
        self.write_bytes(addr + text.len() as u64, &[0])?;
        self.heap = end.next_multiple_of(8);
        Ok(addr)
    }

    // ── Registers & memory ──

    fn get(&self, family: Family) -> u64 {
        self.regs[family as usize]
    }

    fn set(&mut self, family: Family, value: u64) {
        self.regs[family as usize] = value;
    }

    fn address(&self, base: Register, offset: i32) -> u64 {
        self.get(base.family()).wrapping_add(i64::from(offset) as u64)
    }

    fn label_index(&self, label: &str) -> Result<usize> {
        self.code_labels
            .get(label)
            .copied()
            .ok_or_else(|| sim_error(format!("unknown code label `{label}`")))
    }

    fn push(&mut self, value: u64) -> Result<()> {
        let sp = self.get(Family::Sp) - 8;
        self.set(Family::Sp, sp);
        self.write_u64(sp, value)
    }

    fn pop(&mut self) -> Result<u64> {
        let sp = self.get(Family::Sp);
        let value = self.read_u64(sp)?;
        self.set(Family::Sp, sp + 8);
        Ok(value)
    }

    fn range(&self, addr: u64, len: u64) -> Result<std::ops::Range<usize>> {
        match addr.checked_add(len) {
            Some(end) if addr >= DATA_BASE && end <= MEMORY_SIZE => {
                Ok(addr as usize..end as usize)
            }
            _ => Err(sim_error(format!("memory access out of bounds at {addr:#x}"))),
        }
    }

    fn read_u64(&self, addr: u64) -> Result<u64> {
        let range = self.range(addr, 8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&self.memory[range]);
        Ok(u64::from_le_bytes(bytes))
    }

    fn write_u64(&mut self, addr: u64, value: u64) -> Result<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    fn write_bytes(&mut self, addr: u64, bytes: &[u8]) -> Result<()> {
        let range = self.range(addr, bytes.len() as u64)?;
        self.memory[range].copy_from_slice(bytes);
        Ok(())
    }

    fn read_cstr(&self, addr: u64) -> Result<String> {
        let start = self.range(addr, 1)?.start;
        let len = self.memory[start..]
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| sim_error(format!("unterminated string at {addr:#x}")))?;
        Ok(String::from_utf8_lossy(&self.memory[start..start + len]).into_owned())
    }
}

enum Flow {
    Next,
    Jump(usize),
    Exit,
}

const fn xmm_index(x: Xmm) -> usize {
    match x {
        Xmm::Xmm0 => 0,
        Xmm::Xmm1 => 1,
    }
}
