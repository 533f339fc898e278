//! Numeric comparators for `size` and `depth` constraints
//!
//! Accepts strings such as `"> 10K"`, `"<= 1Mi"`, `"== 3"` or a bare number.
//! Size units are decimal (`k`, `m`, `g`) or binary (`ki`, `mi`, `gi`), case
//! insensitive.

use regex_lite::Regex;
use serde::Deserialize;
use std::fmt;
use std::sync::OnceLock;

use super::ConfigError;

const COMPARATOR_PATTERN: &str = r"^\s*(==|!=|[<>]=?)?\s*([0-9]+(?:\.[0-9]+)?)\s*((?i:[kmg]i?))?\s*$";

static COMPARATOR: OnceLock<Regex> = OnceLock::new();

fn comparator_regex() -> &'static Regex {
    COMPARATOR.get_or_init(|| Regex::new(COMPARATOR_PATTERN).expect("comparator pattern is valid"))
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Operator {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "" | "==" => Some(Operator::Eq),
            "!=" => Some(Operator::Ne),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
        }
    }
}

/// A single `op target` test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberComparator {
    pub operator: Operator,
    pub target: u64,
}

impl NumberComparator {
    /// Parse a comparator, accepting size units
    pub fn parse(expr: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidComparator(expr.to_string());
        let caps = comparator_regex().captures(expr).ok_or_else(invalid)?;

        let operator =
            Operator::parse(caps.get(1).map_or("", |m| m.as_str())).ok_or_else(invalid)?;
        let multiplier: u64 = match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
            None => 1,
            Some(unit) => match unit.as_str() {
                "k" => 1_000,
                "ki" => 1_024,
                "m" => 1_000_000,
                "mi" => 1_024 * 1_024,
                "g" => 1_000_000_000,
                "gi" => 1_024 * 1_024 * 1_024,
                _ => return Err(invalid()),
            },
        };

        let digits = &caps[2];
        let target = if digits.contains('.') {
            let number: f64 = digits.parse().map_err(|_| invalid())?;
            let scaled = number * multiplier as f64;
            if scaled >= u64::MAX as f64 {
                return Err(invalid());
            }
            scaled as u64
        } else {
            digits
                .parse::<u64>()
                .ok()
                .and_then(|n| n.checked_mul(multiplier))
                .ok_or_else(invalid)?
        };

        Ok(Self { operator, target })
    }

    /// `== value`
    pub fn equal(target: u64) -> Self {
        Self {
            operator: Operator::Eq,
            target,
        }
    }

    pub fn test(&self, value: u64) -> bool {
        match self.operator {
            Operator::Eq => value == self.target,
            Operator::Ne => value != self.target,
            Operator::Lt => value < self.target,
            Operator::Le => value <= self.target,
            Operator::Gt => value > self.target,
            Operator::Ge => value >= self.target,
        }
    }
}

impl fmt::Display for NumberComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operator.as_str(), self.target)
    }
}

/// Config value that may be written as a number or a comparator string
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NumberExpr {
    Number(u64),
    Text(String),
}

impl NumberExpr {
    pub fn to_comparator(&self) -> Result<NumberComparator, ConfigError> {
        match self {
            NumberExpr::Number(n) => Ok(NumberComparator::equal(*n)),
            NumberExpr::Text(s) => NumberComparator::parse(s),
        }
    }
}

/// Inclusive depth bounds below a root; depth 0 is a file directly in the root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthRange {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl DepthRange {
    /// Narrow the range with one comparator
    pub fn constrain(&mut self, cmp: NumberComparator) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidComparator(format!("depth {}", cmp));
        let target = usize::try_from(cmp.target).map_err(|_| invalid())?;
        match cmp.operator {
            Operator::Gt => self.raise_min(target.checked_add(1).ok_or_else(invalid)?),
            Operator::Ge => self.raise_min(target),
            Operator::Lt => match target.checked_sub(1) {
                Some(max) => self.lower_max(max),
                None => return Err(invalid()),
            },
            Operator::Le => self.lower_max(target),
            Operator::Eq => {
                self.raise_min(target);
                self.lower_max(target);
            }
            Operator::Ne => return Err(invalid()),
        }
        Ok(())
    }

    pub fn contains(&self, depth: usize) -> bool {
        self.min.map_or(true, |min| depth >= min) && self.max.map_or(true, |max| depth <= max)
    }

    fn raise_min(&mut self, min: usize) {
        self.min = Some(self.min.map_or(min, |m| m.max(min)));
    }

    fn lower_max(&mut self, max: usize) {
        self.max = Some(self.max.map_or(max, |m| m.min(max)));
    }
}
