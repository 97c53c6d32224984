// x86 machine model: registers, AT&T instructions and the assembly file.
// Immediates and displacements are narrowed with explicit 'as' casts where
// the encoding has a fixed width.
#![allow(clippy::cast_possible_truncation)]

mod file;
mod instruction;
mod register;

pub use file::{Constant, DataItem, X86File};
pub use instruction::{AluOp, Condition, Instruction, SseOp};
pub use register::{Family, Register, RegisterSet, Width, Xmm};
