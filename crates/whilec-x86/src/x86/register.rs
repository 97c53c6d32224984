use std::fmt;

/// A physical register family. Code never names a partial-width view
/// directly; it asks the target for the head of the family instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Family {
    Ax = 0,
    Bx = 1,
    Cx = 2,
    Dx = 3,
    Si = 4,
    Di = 5,
    Bp = 6,
    Sp = 7,
    Ip = 8,
}

impl Family {
    pub const ALL: [Family; 9] = [
        Family::Ax,
        Family::Bx,
        Family::Cx,
        Family::Dx,
        Family::Si,
        Family::Di,
        Family::Bp,
        Family::Sp,
        Family::Ip,
    ];

    const fn bit(self) -> u16 {
        1 << self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    /// 32-bit view (`eax`).
    Long,
    /// 64-bit view (`rax`).
    Quad,
}

impl Width {
    #[must_use]
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Long => 4,
            Width::Quad => 8,
        }
    }

    /// AT&T operand-size suffix.
    #[must_use]
    pub const fn suffix(self) -> char {
        match self {
            Width::Long => 'l',
            Width::Quad => 'q',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    family: Family,
    width: Width,
}

impl Register {
    #[must_use]
    pub const fn new(family: Family, width: Width) -> Self {
        Self { family, width }
    }

    #[must_use]
    pub const fn family(self) -> Family {
        self.family
    }

    #[must_use]
    pub const fn width(self) -> Width {
        self.width
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match (self.family, self.width) {
            (Family::Ax, Width::Quad) => "rax",
            (Family::Bx, Width::Quad) => "rbx",
            (Family::Cx, Width::Quad) => "rcx",
            (Family::Dx, Width::Quad) => "rdx",
            (Family::Si, Width::Quad) => "rsi",
            (Family::Di, Width::Quad) => "rdi",
            (Family::Bp, Width::Quad) => "rbp",
            (Family::Sp, Width::Quad) => "rsp",
            (Family::Ip, Width::Quad) => "rip",
            (Family::Ax, Width::Long) => "eax",
            (Family::Bx, Width::Long) => "ebx",
            (Family::Cx, Width::Long) => "ecx",
            (Family::Dx, Width::Long) => "edx",
            (Family::Si, Width::Long) => "esi",
            (Family::Di, Width::Long) => "edi",
            (Family::Bp, Width::Long) => "ebp",
            (Family::Sp, Width::Long) => "esp",
            (Family::Ip, Width::Long) => "eip",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.name())
    }
}

/// SSE registers used as scratch for `real` arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Xmm {
    Xmm0,
    Xmm1,
}

impl fmt::Display for Xmm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Xmm::Xmm0 => write!(f, "%xmm0"),
            Xmm::Xmm1 => write!(f, "%xmm1"),
        }
    }
}

/// A set of register families, passed by value through recursive lowering.
///
/// Iteration follows family order, which puts the allocation pool in the
/// order `bx, cx, si, di`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterSet(u16);

impl RegisterSet {
    pub const EMPTY: Self = Self(0);

    #[must_use]
    pub const fn of(families: &[Family]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < families.len() {
            bits |= families[i].bit();
            i += 1;
        }
        Self(bits)
    }

    #[must_use]
    pub const fn contains(self, family: Family) -> bool {
        self.0 & family.bit() != 0
    }

    #[must_use]
    pub const fn with(self, family: Family) -> Self {
        Self(self.0 | family.bit())
    }

    #[must_use]
    pub const fn without(self, family: Family) -> Self {
        Self(self.0 & !family.bit())
    }

    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    pub fn iter(self) -> impl Iterator<Item = Family> {
        Family::ALL.into_iter().filter(move |f| self.contains(*f))
    }

    /// First family in the set other than `exclude`.
    #[must_use]
    pub fn head_excluding(self, exclude: Family) -> Option<Family> {
        self.without(exclude).iter().next()
    }
}
