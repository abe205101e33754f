//! Lazy modifier wrapper around a stored variable

use tracing::warn;

use crate::modifier::Modifier;
use crate::snmp::value::Variable;

/// A stored variable whose value advances through its modifier chain each
/// time it is read. The engine's clone-for-response is the read: every
/// response observes a fresh value, and the latest value is retained as the
/// starting point for the next read.
#[derive(Debug, Clone)]
pub struct ModifiedVariable {
    base_syntax: u8,
    current: Variable,
    modifiers: Vec<Modifier>,
}

impl ModifiedVariable {
    pub fn new(base: Variable, modifiers: Vec<Modifier>) -> Self {
        Self {
            base_syntax: base.syntax(),
            current: base,
            modifiers,
        }
    }

    /// Syntax tag, always the base's.
    pub fn syntax(&self) -> u8 {
        self.base_syntax
    }

    /// The value as of the last read, without advancing.
    pub fn peek(&self) -> &Variable {
        &self.current
    }

    /// Apply the modifier chain once and return the new value. A modifier
    /// producing an unexpected syntax is skipped.
    pub fn advance(&mut self) -> Variable {
        for modifier in &self.modifiers {
            let candidate = modifier.modify(&self.current);
            if candidate.syntax() != self.base_syntax {
                warn!(
                    expected = self.base_syntax,
                    produced = candidate.syntax(),
                    "Modifier changed value syntax, skipping"
                );
                continue;
            }
            self.current = candidate;
        }
        self.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::props_from_yaml;
    use crate::modifier::{NumericKind, NumericModifier};

    fn stepper(yaml: &str) -> Modifier {
        Modifier::Numeric(NumericModifier::new(
            NumericKind::Counter32,
            &props_from_yaml(yaml),
        ))
    }

    #[test]
    fn test_each_read_advances() {
        let mut variable = ModifiedVariable::new(
            Variable::Counter32(99),
            vec![stepper("{minimum: 0, maximum: 100, minimumStep: 1, maximumStep: 1}")],
        );
        assert_eq!(variable.advance(), Variable::Counter32(100));
        assert_eq!(variable.advance(), Variable::Counter32(0));
        assert_eq!(variable.advance(), Variable::Counter32(1));
    }

    #[test]
    fn test_modifiers_chain_in_order() {
        let mut variable = ModifiedVariable::new(
            Variable::Counter32(0),
            vec![
                stepper("{minimumStep: 1, maximumStep: 1}"),
                stepper("{minimumStep: 10, maximumStep: 10}"),
            ],
        );
        assert_eq!(variable.advance(), Variable::Counter32(11));
        assert_eq!(variable.advance(), Variable::Counter32(22));
    }

    #[test]
    fn test_syntax_always_matches_base() {
        let mut variable = ModifiedVariable::new(
            Variable::Counter32(5),
            vec![stepper("{minimumStep: 1, maximumStep: 3}")],
        );
        for _ in 0..20 {
            let read = variable.advance();
            assert_eq!(read.syntax(), variable.syntax());
        }
    }

    #[test]
    fn test_without_modifiers_value_is_stable() {
        let mut variable = ModifiedVariable::new(Variable::octet_string("idle"), vec![]);
        assert_eq!(variable.advance(), Variable::octet_string("idle"));
        assert_eq!(variable.advance(), Variable::octet_string("idle"));
    }
}
