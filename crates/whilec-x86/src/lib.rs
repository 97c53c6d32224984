#![allow(
    clippy::cast_possible_truncation, // intentional: frame offsets are i32 displacements, widths are u32
    clippy::cast_possible_wrap, // intentional: widths become signed displacements
    clippy::cast_sign_loss, // intentional: real bit patterns travel as i64 immediates
    clippy::missing_errors_doc // every fallible entry point returns crate::Error
)]

pub mod abi;
pub mod codegen;
pub mod error;
pub mod lang;
pub mod target;
pub mod x86;

/// Test harness module for writing unit and integration tests.
///
/// This module is only available when running tests or when the
/// `test-harness` feature is enabled.
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use codegen::{CompileOptions, OptimizationFlags, compile, compile_with_options};
pub use error::{Error, Result};
pub use target::{Arch, Os, Target};
pub use x86::{Instruction, X86File};
