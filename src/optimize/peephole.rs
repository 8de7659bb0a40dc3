//! Peephole rewriting over instruction windows.

use crate::ops::Instruction;

/// A local rewrite rule over a short window of instructions.
pub trait PeepholeRule {
    /// Length of the match at the start of `window`, or `None` if the
    /// rule does not apply there.
    fn match_len(&self, window: &[Instruction]) -> Option<usize>;

    /// The replacement for a matched window slice. Must not be longer
    /// than the match.
    fn rewrite(&self, matched: &[Instruction]) -> Vec<Instruction>;
}

/// `set_local i; get_local i` becomes `tee_local i`.
pub struct TeeLocalRule;

impl PeepholeRule for TeeLocalRule {
    fn match_len(&self, window: &[Instruction]) -> Option<usize> {
        match window {
            [Instruction::SetLocal(set), Instruction::GetLocal(get), ..] if set == get => Some(2),
            _ => None,
        }
    }

    fn rewrite(&self, matched: &[Instruction]) -> Vec<Instruction> {
        match matched {
            [Instruction::SetLocal(index), ..] => vec![Instruction::TeeLocal(*index)],
            _ => matched.to_vec(),
        }
    }
}

/// Straight-line code after `br`, `return` or `unreachable` can never
/// run; only the terminating instruction is kept.
pub struct UnreachableCodeRule;

impl PeepholeRule for UnreachableCodeRule {
    fn match_len(&self, window: &[Instruction]) -> Option<usize> {
        match window {
            [first, rest @ ..] if first.is_terminal() && !rest.is_empty() => {
                Some(1 + rest.len())
            }
            _ => None,
        }
    }

    fn rewrite(&self, matched: &[Instruction]) -> Vec<Instruction> {
        matched.first().cloned().into_iter().collect()
    }
}

/// Applies a set of peephole rules to whole function bodies.
///
/// At every position the longest match across all rules wins. Block
/// instructions are descended into only after no rule applies at their
/// position.
pub struct PeepholeOptimizer {
    rules: Vec<Box<dyn PeepholeRule>>,
}

impl Default for PeepholeOptimizer {
    fn default() -> PeepholeOptimizer {
        PeepholeOptimizer {
            rules: vec![Box::new(TeeLocalRule), Box::new(UnreachableCodeRule)],
        }
    }
}

impl PeepholeOptimizer {
    /// An optimizer with the given rule set.
    pub fn new(rules: Vec<Box<dyn PeepholeRule>>) -> PeepholeOptimizer {
        PeepholeOptimizer { rules }
    }

    /// Rewrites a body in place until no rule applies anywhere.
    pub fn rewrite(&self, code: &mut Vec<Instruction>) {
        let mut position = 0;
        while position < code.len() {
            let matched = self
                .rules
                .iter()
                .filter_map(|rule| {
                    rule.match_len(&code[position..])
                        .map(|len| (rule, len))
                })
                .max_by_key(|(_, len)| *len);

            if let Some((rule, len)) = matched {
                let replacement = rule.rewrite(&code[position..position + len]);
                debug_assert!(replacement.len() <= len, "rules must not grow the body");
                code.splice(position..position + len, replacement);
                // The rewrite may have created a new match at the same
                // position; try again before moving on.
                continue;
            }

            match &mut code[position] {
                Instruction::Block(_, body) | Instruction::Loop(_, body) => {
                    self.rewrite(body);
                }
                Instruction::If(_, consequent, alternate) => {
                    self.rewrite(consequent);
                    self.rewrite(alternate);
                }
                _ => {}
            }
            position += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Instruction;
    use crate::types::BlockType;

    fn optimize(mut code: Vec<Instruction>) -> Vec<Instruction> {
        PeepholeOptimizer::default().rewrite(&mut code);
        code
    }

    #[test]
    fn tee_local() {
        assert_eq!(
            optimize(vec![
                Instruction::SetLocal(3),
                Instruction::GetLocal(3),
                Instruction::I32Const(5),
            ]),
            vec![Instruction::TeeLocal(3), Instruction::I32Const(5)]
        );
    }

    #[test]
    fn tee_local_requires_matching_indices() {
        let code = vec![Instruction::SetLocal(3), Instruction::GetLocal(4)];
        assert_eq!(optimize(code.clone()), code);
    }

    #[test]
    fn unreachable_code_is_dropped() {
        assert_eq!(
            optimize(vec![
                Instruction::Return,
                Instruction::I32Const(1),
                Instruction::Drop,
            ]),
            vec![Instruction::Return]
        );
    }

    #[test]
    fn rules_apply_inside_blocks() {
        let code = vec![Instruction::Block(
            BlockType(None),
            vec![
                Instruction::Br(0),
                Instruction::Nop,
                Instruction::Nop,
            ],
        )];
        assert_eq!(
            optimize(code),
            vec![Instruction::Block(BlockType(None), vec![Instruction::Br(0)])]
        );
    }

    #[test]
    fn cascading_matches() {
        // After dead code removal the set/get pair becomes adjacent... the
        // other way around: the tee rewrite must not block the scan.
        assert_eq!(
            optimize(vec![
                Instruction::SetLocal(1),
                Instruction::GetLocal(1),
                Instruction::SetLocal(2),
                Instruction::GetLocal(2),
            ]),
            vec![Instruction::TeeLocal(1), Instruction::TeeLocal(2)]
        );
    }
}
