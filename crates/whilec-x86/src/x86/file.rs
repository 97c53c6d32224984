use std::fmt::{self, Write};

use super::Instruction;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// NUL-terminated string bytes.
    Asciz(String),
    /// 4-byte word.
    Long(i64),
    /// 8-byte word.
    Quad(i64),
}

impl Constant {
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Constant::Asciz(s) => s.len() + 1,
            Constant::Long(_) => 4,
            Constant::Quad(_) => 8,
        }
    }
}

/// A data-section entry. Only the first constant of a multi-word item
/// (such as a type descriptor) carries a label.
#[derive(Debug, Clone, PartialEq)]
pub struct DataItem {
    pub label: Option<String>,
    pub constant: Constant,
}

/// A complete translation unit: one code section, one data section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct X86File {
    pub code: Vec<Instruction>,
    pub data: Vec<DataItem>,
}

impl X86File {
    #[must_use]
    pub const fn new(code: Vec<Instruction>, data: Vec<DataItem>) -> Self {
        Self { code, data }
    }

    #[must_use]
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    /// Instructions between the definition of `label` and the next global
    /// label or the end of the code. Handy for inspecting one function.
    #[must_use]
    pub fn function(&self, label: &str) -> Option<&[Instruction]> {
        let start = self
            .code
            .iter()
            .position(|i| i.defined_label() == Some(label))?;
        let end = self.code[start + 1..]
            .iter()
            .position(|i| {
                i.defined_label()
                    .is_some_and(|name| name.starts_with(crate::abi::FUNCTION_PREFIX))
                    || matches!(i, Instruction::Label { global: true, .. })
            })
            .map_or(self.code.len(), |n| start + 1 + n);
        Some(&self.code[start..end])
    }
}

fn escape_asciz(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\{b:03o}");
            }
        }
    }
    out
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Asciz(s) => write!(f, "\t.asciz \"{}\"", escape_asciz(s)),
            Constant::Long(v) => write!(f, "\t.long {v}"),
            Constant::Quad(v) => write!(f, "\t.quad {v}"),
        }
    }
}

impl fmt::Display for X86File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\t.text")?;
        for instr in &self.code {
            if let Instruction::Label { name, global: true } = instr {
                writeln!(f, "\t.globl {name}")?;
            }
            writeln!(f, "{instr}")?;
        }
        if !self.data.is_empty() {
            writeln!(f)?;
            writeln!(f, "\t.data")?;
            for item in &self.data {
                if let Some(label) = &item.label {
                    writeln!(f, "{label}:")?;
                }
                writeln!(f, "{}", item.constant)?;
            }
        }
        Ok(())
    }
}
