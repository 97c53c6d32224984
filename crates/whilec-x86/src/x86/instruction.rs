use std::fmt;

use super::{Register, Width, Xmm};

/// Two-operand integer ALU operations, `dst = dst op src`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Sub,
    Imul,
    And,
    Or,
    Xor,
    /// Sets flags from `dst - src` without writing `dst`.
    Cmp,
}

impl AluOp {
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::Imul => "imul",
            AluOp::And => "and",
            AluOp::Or => "or",
            AluOp::Xor => "xor",
            AluOp::Cmp => "cmp",
        }
    }
}

/// Condition codes for `jcc`. The unsigned forms are used after `ucomisd`,
/// where the parity flag marks an unordered (NaN) comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    E,
    Ne,
    L,
    Le,
    G,
    Ge,
    B,
    Be,
    A,
    Ae,
    P,
    Np,
}

impl Condition {
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Condition::E => "e",
            Condition::Ne => "ne",
            Condition::L => "l",
            Condition::Le => "le",
            Condition::G => "g",
            Condition::Ge => "ge",
            Condition::B => "b",
            Condition::Be => "be",
            Condition::A => "a",
            Condition::Ae => "ae",
            Condition::P => "p",
            Condition::Np => "np",
        }
    }

    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Condition::E => Condition::Ne,
            Condition::Ne => Condition::E,
            Condition::L => Condition::Ge,
            Condition::Le => Condition::G,
            Condition::G => Condition::Le,
            Condition::Ge => Condition::L,
            Condition::B => Condition::Ae,
            Condition::Be => Condition::A,
            Condition::A => Condition::Be,
            Condition::Ae => Condition::B,
            Condition::P => Condition::Np,
            Condition::Np => Condition::P,
        }
    }
}

/// Scalar-double arithmetic, `dst = dst op src`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SseOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl SseOp {
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            SseOp::Add => "addsd",
            SseOp::Sub => "subsd",
            SseOp::Mul => "mulsd",
            SseOp::Div => "divsd",
        }
    }
}

/// One line of AT&T assembly. Operands follow AT&T order (source first).
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Mov {
        src: Register,
        dst: Register,
    },
    Alu {
        op: AluOp,
        src: Register,
        dst: Register,
    },
    MovImm {
        value: i64,
        dst: Register,
    },
    AluImm {
        op: AluOp,
        value: i32,
        dst: Register,
    },
    /// `offset(base) -> dst`
    Load {
        base: Register,
        offset: i32,
        dst: Register,
    },
    /// `src -> offset(base)`
    Store {
        src: Register,
        base: Register,
        offset: i32,
    },
    /// `dst = base + offset`
    Lea {
        base: Register,
        offset: i32,
        dst: Register,
    },
    /// Address of a data label; `%rip`-relative on 64-bit, absolute on 32-bit.
    LeaLabel {
        label: String,
        dst: Register,
    },
    Label {
        name: String,
        global: bool,
    },
    Jmp {
        label: String,
    },
    Jcc {
        cond: Condition,
        label: String,
    },
    Call {
        symbol: String,
    },
    Ret,
    Push {
        reg: Register,
    },
    Pop {
        reg: Register,
    },
    /// Sign-extend the accumulator into `dx` (`cltd` / `cqto`).
    SignExtend {
        width: Width,
    },
    Idiv {
        divisor: Register,
    },
    Not {
        reg: Register,
    },
    Neg {
        reg: Register,
    },
    /// Bit-for-bit move between a general-purpose and an SSE register.
    MovToXmm {
        src: Register,
        dst: Xmm,
    },
    MovFromXmm {
        src: Xmm,
        dst: Register,
    },
    Sse {
        op: SseOp,
        src: Xmm,
        dst: Xmm,
    },
    /// Compare `dst` against `src`, setting ZF/CF like an unsigned compare.
    Ucomisd {
        src: Xmm,
        dst: Xmm,
    },
    Xorpd {
        src: Xmm,
        dst: Xmm,
    },
    Cvtsi2sd {
        src: Register,
        dst: Xmm,
    },
}

impl Instruction {
    #[must_use]
    pub fn label(name: impl Into<String>) -> Self {
        Self::Label {
            name: name.into(),
            global: false,
        }
    }

    #[must_use]
    pub fn jmp(label: impl Into<String>) -> Self {
        Self::Jmp {
            label: label.into(),
        }
    }

    #[must_use]
    pub fn jcc(cond: Condition, label: impl Into<String>) -> Self {
        Self::Jcc {
            cond,
            label: label.into(),
        }
    }

    #[must_use]
    pub fn call(symbol: impl Into<String>) -> Self {
        Self::Call {
            symbol: symbol.into(),
        }
    }

    #[must_use]
    pub const fn is_label(&self) -> bool {
        matches!(self, Self::Label { .. })
    }

    /// Label defined by this instruction, if any.
    #[must_use]
    pub fn defined_label(&self) -> Option<&str> {
        match self {
            Self::Label { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mov { src, dst } => write!(f, "\tmov{} {src}, {dst}", dst.width().suffix()),
            Self::Alu { op, src, dst } => {
                write!(f, "\t{}{} {src}, {dst}", op.mnemonic(), dst.width().suffix())
            }
            Self::MovImm { value, dst } => match dst.width() {
                Width::Quad if i32::try_from(*value).is_err() => {
                    write!(f, "\tmovabsq ${value}, {dst}")
                }
                Width::Quad => write!(f, "\tmovq ${value}, {dst}"),
                Width::Long => write!(f, "\tmovl ${}, {dst}", *value as i32),
            },
            Self::AluImm { op, value, dst } => {
                write!(f, "\t{}{} ${value}, {dst}", op.mnemonic(), dst.width().suffix())
            }
            Self::Load { base, offset, dst } => {
                write!(f, "\tmov{} {offset}({base}), {dst}", dst.width().suffix())
            }
            Self::Store { src, base, offset } => {
                write!(f, "\tmov{} {src}, {offset}({base})", src.width().suffix())
            }
            Self::Lea { base, offset, dst } => {
                write!(f, "\tlea{} {offset}({base}), {dst}", dst.width().suffix())
            }
            Self::LeaLabel { label, dst } => match dst.width() {
                Width::Quad => write!(f, "\tleaq {label}(%rip), {dst}"),
                Width::Long => write!(f, "\tleal {label}, {dst}"),
            },
            Self::Label { name, .. } => write!(f, "{name}:"),
            Self::Jmp { label } => write!(f, "\tjmp {label}"),
            Self::Jcc { cond, label } => write!(f, "\tj{} {label}", cond.suffix()),
            Self::Call { symbol } => write!(f, "\tcall {symbol}"),
            Self::Ret => write!(f, "\tret"),
            Self::Push { reg } => write!(f, "\tpush{} {reg}", reg.width().suffix()),
            Self::Pop { reg } => write!(f, "\tpop{} {reg}", reg.width().suffix()),
            Self::SignExtend { width } => match width {
                Width::Long => write!(f, "\tcltd"),
                Width::Quad => write!(f, "\tcqto"),
            },
            Self::Idiv { divisor } => write!(f, "\tidiv{} {divisor}", divisor.width().suffix()),
            Self::Not { reg } => write!(f, "\tnot{} {reg}", reg.width().suffix()),
            Self::Neg { reg } => write!(f, "\tneg{} {reg}", reg.width().suffix()),
            Self::MovToXmm { src, dst } => write!(f, "\tmovq {src}, {dst}"),
            Self::MovFromXmm { src, dst } => write!(f, "\tmovq {src}, {dst}"),
            Self::Sse { op, src, dst } => write!(f, "\t{} {src}, {dst}", op.mnemonic()),
            Self::Ucomisd { src, dst } => write!(f, "\tucomisd {src}, {dst}"),
            Self::Xorpd { src, dst } => write!(f, "\txorpd {src}, {dst}"),
            Self::Cvtsi2sd { src, dst } => {
                write!(f, "\tcvtsi2sd{} {src}, {dst}", src.width().suffix())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x86::Family;

    fn q(family: Family) -> Register {
        Register::new(family, Width::Quad)
    }

    fn l(family: Family) -> Register {
        Register::new(family, Width::Long)
    }

    #[test]
    fn renders_att_syntax_with_suffixes() {
        let cases = [
            (
                Instruction::Mov {
                    src: q(Family::Sp),
                    dst: q(Family::Bp),
                },
                "\tmovq %rsp, %rbp",
            ),
            (
                Instruction::Alu {
                    op: AluOp::Cmp,
                    src: l(Family::Bx),
                    dst: l(Family::Di),
                },
                "\tcmpl %ebx, %edi",
            ),
            (
                Instruction::AluImm {
                    op: AluOp::Sub,
                    value: 32,
                    dst: q(Family::Sp),
                },
                "\tsubq $32, %rsp",
            ),
            (
                Instruction::Load {
                    base: q(Family::Bp),
                    offset: -8,
                    dst: q(Family::Di),
                },
                "\tmovq -8(%rbp), %rdi",
            ),
            (
                Instruction::Store {
                    src: q(Family::Di),
                    base: q(Family::Bx),
                    offset: 16,
                },
                "\tmovq %rdi, 16(%rbx)",
            ),
            (
                Instruction::Lea {
                    base: q(Family::Sp),
                    offset: 8,
                    dst: q(Family::Cx),
                },
                "\tleaq 8(%rsp), %rcx",
            ),
            (Instruction::SignExtend { width: Width::Quad }, "\tcqto"),
            (Instruction::SignExtend { width: Width::Long }, "\tcltd"),
            (Instruction::jcc(Condition::Le, "label3"), "\tjle label3"),
            (Instruction::label("wl_main"), "wl_main:"),
            (
                Instruction::Cvtsi2sd {
                    src: q(Family::Di),
                    dst: Xmm::Xmm0,
                },
                "\tcvtsi2sdq %rdi, %xmm0",
            ),
        ];
        for (instr, text) in cases {
            assert_eq!(instr.to_string(), text);
        }
    }

    #[test]
    fn large_immediates_use_movabs() {
        let small = Instruction::MovImm {
            value: 42,
            dst: q(Family::Di),
        };
        let large = Instruction::MovImm {
            value: 1 << 40,
            dst: q(Family::Di),
        };
        assert_eq!(small.to_string(), "\tmovq $42, %rdi");
        assert_eq!(large.to_string(), "\tmovabsq $1099511627776, %rdi");
    }

    #[test]
    fn label_addresses_depend_on_width() {
        let rip = Instruction::LeaLabel {
            label: "label0".into(),
            dst: q(Family::Si),
        };
        let abs = Instruction::LeaLabel {
            label: "label0".into(),
            dst: l(Family::Si),
        };
        assert_eq!(rip.to_string(), "\tleaq label0(%rip), %rsi");
        assert_eq!(abs.to_string(), "\tleal label0, %esi");
    }

    #[test]
    fn negated_conditions_round_trip() {
        for cond in [
            Condition::E,
            Condition::L,
            Condition::Ge,
            Condition::B,
            Condition::A,
            Condition::P,
        ] {
            assert_eq!(cond.negate().negate(), cond);
        }
    }
}
