//! Target description: architecture, operating system and the properties of
//! the calling convention that depend on them.

use crate::x86::{Family, Register, Width};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_32,
    X86_64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub arch: Arch,
    pub os: Os,
}

impl Default for Target {
    fn default() -> Self {
        Self::LINUX_X86_64
    }
}

impl Target {
    pub const LINUX_X86_64: Self = Self::new(Arch::X86_64, Os::Linux);
    pub const MACOS_X86_64: Self = Self::new(Arch::X86_64, Os::MacOs);
    pub const WINDOWS_X86_64: Self = Self::new(Arch::X86_64, Os::Windows);
    pub const LINUX_X86_32: Self = Self::new(Arch::X86_32, Os::Linux);

    #[must_use]
    pub const fn new(arch: Arch, os: Os) -> Self {
        Self { arch, os }
    }

    #[must_use]
    pub const fn is_64_bit(self) -> bool {
        matches!(self.arch, Arch::X86_64)
    }

    /// Register width used for every scalar value.
    #[must_use]
    pub const fn word(self) -> Width {
        match self.arch {
            Arch::X86_32 => Width::Long,
            Arch::X86_64 => Width::Quad,
        }
    }

    /// Size of a machine word in bytes.
    #[must_use]
    pub const fn word_width(self) -> u32 {
        self.word().bytes()
    }

    /// Required alignment of the stack pointer at call sites.
    #[must_use]
    pub const fn stack_alignment(self) -> u32 {
        match (self.arch, self.os) {
            (Arch::X86_64, _) | (_, Os::MacOs) => 16,
            (Arch::X86_32, Os::Linux | Os::Windows) => 4,
        }
    }

    /// Round `width` up to the next multiple of the stack alignment.
    #[must_use]
    pub const fn aligned_stack_width(self, width: u32) -> u32 {
        let align = self.stack_alignment();
        width.div_ceil(align) * align
    }

    /// Full-width register of the given family.
    #[must_use]
    pub const fn head(self, family: Family) -> Register {
        Register::new(family, self.word())
    }

    /// Mangle an external C symbol for this platform.
    #[must_use]
    pub fn symbol(self, name: &str) -> String {
        match self.os {
            Os::MacOs => format!("_{name}"),
            Os::Linux | Os::Windows => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_and_alignment() {
        assert_eq!(Target::LINUX_X86_64.word_width(), 8);
        assert_eq!(Target::LINUX_X86_32.word_width(), 4);
        assert_eq!(Target::LINUX_X86_64.stack_alignment(), 16);
        assert_eq!(Target::WINDOWS_X86_64.stack_alignment(), 16);
        assert_eq!(Target::LINUX_X86_32.stack_alignment(), 4);
        assert_eq!(Target::new(Arch::X86_32, Os::MacOs).stack_alignment(), 16);
    }

    #[test]
    fn aligned_width_rounds_up() {
        let t = Target::LINUX_X86_64;
        assert_eq!(t.aligned_stack_width(0), 0);
        assert_eq!(t.aligned_stack_width(8), 16);
        assert_eq!(t.aligned_stack_width(16), 16);
        assert_eq!(t.aligned_stack_width(24), 32);
        assert_eq!(Target::LINUX_X86_32.aligned_stack_width(12), 12);
    }

    #[test]
    fn heads_and_symbols() {
        assert_eq!(Target::LINUX_X86_64.head(Family::Bx).to_string(), "%rbx");
        assert_eq!(Target::LINUX_X86_32.head(Family::Bx).to_string(), "%ebx");
        assert_eq!(Target::MACOS_X86_64.symbol("main"), "_main");
        assert_eq!(Target::LINUX_X86_64.symbol("print"), "print");
    }
}
