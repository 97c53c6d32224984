// Peephole cleanup over the finished code section.
//
// Labels and calls are never removed, so jump targets stay valid.

use crate::x86::{AluOp, Instruction};

/// Remove instructions with no effect. Returns how many were dropped.
pub fn optimize(code: &mut Vec<Instruction>) -> usize {
    let len = code.len();
    let keep: Vec<bool> = code
        .iter()
        .enumerate()
        .map(|(i, instr)| match instr {
            // Pattern 1: move to self.
            Instruction::Mov { src, dst } => src != dst,
            // Pattern 2: adding or subtracting zero.
            Instruction::AluImm {
                op: AluOp::Add | AluOp::Sub,
                value: 0,
                ..
            } => false,
            // Pattern 3: jump to the label that immediately follows.
            Instruction::Jmp { label } => {
                code.get(i + 1).and_then(Instruction::defined_label) != Some(label.as_str())
            }
            _ => true,
        })
        .collect();

    let mut flags = keep.iter();
    code.retain(|_| flags.next().copied().unwrap_or(true));
    let removed = len - code.len();
    tracing::debug!("Peephole: removed {removed}/{len} instructions");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x86::{Family, Register, Width};

    fn q(family: Family) -> Register {
        Register::new(family, Width::Quad)
    }

    #[test]
    fn removes_redundant_instructions() {
        let mut code = vec![
            Instruction::Mov {
                src: q(Family::Si),
                dst: q(Family::Si),
            },
            Instruction::AluImm {
                op: AluOp::Sub,
                value: 0,
                dst: q(Family::Sp),
            },
            Instruction::jmp("label0"),
            Instruction::label("label0"),
            Instruction::Ret,
        ];
        assert_eq!(optimize(&mut code), 3);
        assert_eq!(code, vec![Instruction::label("label0"), Instruction::Ret]);
    }

    #[test]
    fn keeps_meaningful_instructions() {
        let mut code = vec![
            Instruction::Mov {
                src: q(Family::Si),
                dst: q(Family::Di),
            },
            Instruction::AluImm {
                op: AluOp::Cmp,
                value: 0,
                dst: q(Family::Di),
            },
            Instruction::jmp("label1"),
            Instruction::label("label0"),
            Instruction::label("label1"),
            Instruction::call("print"),
        ];
        let before = code.clone();
        assert_eq!(optimize(&mut code), 0);
        assert_eq!(code, before);
    }
}
