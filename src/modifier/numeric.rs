//! Random-step modifiers for the integer-valued SNMP syntaxes

use rand::Rng;
use tracing::warn;

use super::ModifierProperties;
use crate::snmp::value::Variable;

/// Which numeric syntax a modifier produces, with that type's natural
/// extremes as default bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    Integer32,
    Gauge32,
    Counter32,
    Counter64,
    TimeTicks,
    SysUpTime,
}

impl NumericKind {
    fn default_minimum(self) -> i128 {
        match self {
            NumericKind::Integer32 => i32::MIN as i128,
            _ => 0,
        }
    }

    fn default_maximum(self) -> i128 {
        match self {
            NumericKind::Integer32 => i32::MAX as i128,
            NumericKind::Counter64 => u64::MAX as i128,
            _ => u32::MAX as i128,
        }
    }

    fn default_minimum_step(self) -> i128 {
        match self {
            NumericKind::Integer32 => -1,
            NumericKind::SysUpTime => 100,
            _ => 0,
        }
    }

    fn default_maximum_step(self) -> i128 {
        match self {
            NumericKind::SysUpTime => 100,
            _ => 1,
        }
    }

    fn is_signed(self) -> bool {
        matches!(self, NumericKind::Integer32)
    }
}

/// Steps the current value by a uniform random amount in
/// `[minimum_step, maximum_step]`, wrapping past `maximum` back into range
/// and clamping underflow at `minimum`. A current value outside
/// `[minimum, maximum]` resets to `minimum` before stepping.
#[derive(Debug, Clone)]
pub struct NumericModifier {
    kind: NumericKind,
    minimum: i128,
    maximum: i128,
    minimum_step: i128,
    maximum_step: i128,
}

impl NumericModifier {
    pub fn new(kind: NumericKind, properties: &ModifierProperties) -> Self {
        let read = |key: &str, default: i128| -> i128 {
            if kind.is_signed() {
                properties.get_long(key).map(i128::from).unwrap_or(default)
            } else {
                // Steps may still be configured negative for signed use, but
                // bounds of the unsigned kinds read as unsigned.
                properties
                    .get_unsigned_long(key)
                    .map(i128::from)
                    .or_else(|| properties.get_long(key).map(i128::from))
                    .unwrap_or(default)
            }
        };

        let mut minimum = read("minimum", kind.default_minimum());
        let mut maximum = read("maximum", kind.default_maximum());
        if minimum > maximum {
            warn!(
                ?kind,
                minimum, maximum, "minimum exceeds maximum, using type extremes"
            );
            minimum = kind.default_minimum();
            maximum = kind.default_maximum();
        }

        let mut minimum_step = read("minimumStep", kind.default_minimum_step());
        let mut maximum_step = read("maximumStep", kind.default_maximum_step());
        if !kind.is_signed() && kind != NumericKind::TimeTicks {
            // Counters and gauges never step backwards.
            minimum_step = minimum_step.max(0);
        }
        if minimum_step > maximum_step {
            maximum_step = minimum_step;
        }

        Self {
            kind,
            minimum,
            maximum,
            minimum_step,
            maximum_step,
        }
    }

    pub fn kind(&self) -> NumericKind {
        self.kind
    }

    fn step(&self, current: i128) -> i128 {
        let current = if current < self.minimum || current > self.maximum {
            self.minimum
        } else {
            current
        };
        let step = rand::thread_rng().gen_range(self.minimum_step..=self.maximum_step);
        let next = current + step;
        let next = if next > self.maximum {
            self.minimum + (step - (self.maximum - current) - 1)
        } else if next < self.minimum {
            self.minimum
        } else {
            next
        };
        next.clamp(self.minimum, self.maximum)
    }

    /// Produce the next value. A variable of a different syntax than this
    /// modifier's kind passes through unchanged.
    pub fn modify(&self, variable: &Variable) -> Variable {
        match (self.kind, variable) {
            (NumericKind::Integer32, Variable::Integer32(v)) => {
                Variable::Integer32(self.step(*v as i128) as i32)
            }
            (NumericKind::Gauge32, Variable::UInt32(v)) => {
                Variable::UInt32(self.step(*v as i128) as u32)
            }
            (NumericKind::Counter32, Variable::Counter32(v)) => {
                Variable::Counter32(self.step(*v as i128) as u32)
            }
            (NumericKind::Counter64, Variable::Counter64(v)) => {
                Variable::Counter64(self.step(*v as i128) as u64)
            }
            (NumericKind::TimeTicks | NumericKind::SysUpTime, Variable::TimeTicks(v)) => {
                Variable::TimeTicks(self.step(*v as i128) as u32)
            }
            _ => {
                warn!(
                    kind = ?self.kind,
                    syntax = variable.syntax(),
                    "Numeric modifier applied to mismatched syntax, passing through"
                );
                variable.clone()
            }
        }
    }
}
