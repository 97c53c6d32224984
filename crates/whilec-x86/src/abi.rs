//! Native ABI constants (register roles, runtime symbols, frame layout).
//!
//! Everything here is shared between the code generator and the test
//! harness so both agree on how generated code talks to the runtime.

use crate::x86::{Family, RegisterSet};

// ── Register Roles ──

/// Registers handed out to subexpressions, in allocation order.
/// `ax` and `dx` are never in the pool: division, runtime return values and
/// memory copies use them as scratch.
pub const REGISTER_POOL: RegisterSet =
    RegisterSet::of(&[Family::Bx, Family::Cx, Family::Si, Family::Di]);

/// Register every statement evaluates its top-level expression into.
pub const STATEMENT_TARGET: Family = Family::Di;

/// Dividend / quotient register for `idiv`; also carries runtime results.
pub const ACCUMULATOR: Family = Family::Ax;

/// Remainder register for `idiv`; scratch for word copies.
pub const SCRATCH: Family = Family::Dx;

/// Registers carrying the first three arguments of a runtime call.
pub const RUNTIME_ARGS: [Family; 3] = [Family::Di, Family::Si, Family::Dx];

// ── Symbols ──

/// Prefix given to every translated function so user names never collide
/// with runtime or libc symbols.
pub const FUNCTION_PREFIX: &str = "wl_";

/// Default name of the user-level entry function.
pub const ENTRY_FUNCTION: &str = "main";

/// Process entry point emitted by the module (mangled per target).
pub const ENTRY_SYMBOL: &str = "main";

/// `void print(item, descriptor)`
pub const RT_PRINT: &str = "print";
/// `char* str_append(lhs, rhs)`
pub const RT_STR_APPEND: &str = "str_append";
/// `char* str_left_append(lhs, rhs, rhs_descriptor)`
pub const RT_STR_LEFT_APPEND: &str = "str_left_append";
/// `char* str_right_append(lhs, rhs, lhs_descriptor)`
pub const RT_STR_RIGHT_APPEND: &str = "str_right_append";

// ── Frame Layout ──

/// Words between the frame pointer and the caller's argument block:
/// saved frame pointer plus return address.
pub const FRAME_LINK_WORDS: u32 = 2;

// ── Type Descriptors ──

/// Leading word of every type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeTag {
    Void = 0,
    Bool = 1,
    Char = 2,
    Int = 3,
    Real = 4,
    Str = 5,
    Record = 6,
    List = 7,
}

impl TypeTag {
    #[must_use]
    pub const fn code(self) -> i64 {
        self as i64
    }

    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => Self::Void,
            1 => Self::Bool,
            2 => Self::Char,
            3 => Self::Int,
            4 => Self::Real,
            5 => Self::Str,
            6 => Self::Record,
            7 => Self::List,
            _ => return None,
        })
    }
}
