//! Time-dependent reward functions.

use std::fmt;

use thiserror::Error;

/// Errors raised when parsing a serialized reward function.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FunctionParseError {
    #[error("missing function tag in '{0}'")]
    MissingTag(String),

    #[error("unknown function tag '{0}'")]
    UnknownTag(String),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("malformed linear function '{0}', expected 'ax+b'")]
    MalformedLinear(String),
}

/// A pure function of `(time, horizon)` to a scalar reward.
///
/// The textual form uses an explicit variant tag so that deserialization is a
/// sealed dispatch: `const;5`, `linear;2x+3`, `tabular;1,2,3`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RewardFn {
    /// Constant reward, independent of time.
    Constant(f64),
    /// Linear reward `a * time + b`.
    Linear { a: f64, b: f64 },
    /// One value per time step; evaluates to `0` beyond the table.
    Tabular(Vec<f64>),
}

impl RewardFn {
    /// Evaluates the function at `time` within the given horizon.
    pub fn eval(&self, time: u32, _horizon: u32) -> f64 {
        match self {
            RewardFn::Constant(c) => *c,
            RewardFn::Linear { a, b } => a * time as f64 + b,
            RewardFn::Tabular(values) => values.get(time as usize).copied().unwrap_or(0.0),
        }
    }

    /// Returns a copy with a scalar weight applied.
    pub fn with_weight(&self, weight: f64) -> RewardFn {
        match self {
            RewardFn::Constant(c) => RewardFn::Constant(c * weight),
            RewardFn::Linear { a, b } => RewardFn::Linear {
                a: a * weight,
                b: b * weight,
            },
            RewardFn::Tabular(values) => {
                RewardFn::Tabular(values.iter().map(|v| v * weight).collect())
            }
        }
    }

    /// Serializes the function to its tagged textual form.
    pub fn serialize(&self) -> String {
        match self {
            RewardFn::Constant(c) => format!("const;{c}"),
            RewardFn::Linear { a, b } => format!("linear;{a}x+{b}"),
            RewardFn::Tabular(values) => {
                let body: Vec<String> = values.iter().map(f64::to_string).collect();
                format!("tabular;{}", body.join(","))
            }
        }
    }

    /// Parses a function from its tagged textual form.
    pub fn deserialize(input: &str) -> Result<RewardFn, FunctionParseError> {
        let (tag, body) = input
            .split_once(';')
            .ok_or_else(|| FunctionParseError::MissingTag(input.to_string()))?;

        match tag {
            "const" => Ok(RewardFn::Constant(parse_number(body)?)),
            "linear" => {
                let (a, b) = body
                    .split_once("x+")
                    .ok_or_else(|| FunctionParseError::MalformedLinear(body.to_string()))?;
                Ok(RewardFn::Linear {
                    a: parse_number(a)?,
                    b: parse_number(b)?,
                })
            }
            "tabular" => {
                let values = body
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(parse_number)
                    .collect::<Result<Vec<f64>, _>>()?;
                Ok(RewardFn::Tabular(values))
            }
            other => Err(FunctionParseError::UnknownTag(other.to_string())),
        }
    }
}

fn parse_number(s: &str) -> Result<f64, FunctionParseError> {
    s.trim()
        .parse()
        .map_err(|_| FunctionParseError::InvalidNumber(s.to_string()))
}

impl fmt::Display for RewardFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardFn::Constant(c) => write!(f, "{c:.2}"),
            RewardFn::Linear { a, b } => write!(f, "{a}x + {b}"),
            RewardFn::Tabular(values) => write!(f, "{values:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_ignores_time() {
        let f = RewardFn::Constant(-10.0);
        assert_eq!(f.eval(0, 5), -10.0);
        assert_eq!(f.eval(4, 5), -10.0);
    }

    #[test]
    fn linear_evaluates_at_time() {
        let f = RewardFn::Linear { a: 2.0, b: 1.0 };
        assert_eq!(f.eval(0, 10), 1.0);
        assert_eq!(f.eval(3, 10), 7.0);
    }

    #[test]
    fn tabular_indexes_by_time() {
        let f = RewardFn::Tabular(vec![1.0, 2.0, 4.0]);
        assert_eq!(f.eval(1, 3), 2.0);
        assert_eq!(f.eval(7, 3), 0.0);
    }

    #[test]
    fn with_weight_scales_every_variant() {
        assert_eq!(
            RewardFn::Constant(4.0).with_weight(0.5),
            RewardFn::Constant(2.0)
        );
        assert_eq!(
            RewardFn::Linear { a: 2.0, b: -2.0 }.with_weight(2.0),
            RewardFn::Linear { a: 4.0, b: -4.0 }
        );
        assert_eq!(
            RewardFn::Tabular(vec![1.0, 3.0]).with_weight(3.0),
            RewardFn::Tabular(vec![3.0, 9.0])
        );
    }

    #[test]
    fn round_trip_preserves_evaluation() {
        let functions = [
            RewardFn::Constant(5.25),
            RewardFn::Constant(-3.0),
            RewardFn::Linear { a: 0.5, b: 3.0 },
            RewardFn::Linear { a: -2.0, b: -1.5 },
            RewardFn::Tabular(vec![1.0, -2.0, 3.5]),
            RewardFn::Tabular(vec![]),
        ];
        for f in &functions {
            let parsed = RewardFn::deserialize(&f.serialize()).unwrap();
            for t in 0..6 {
                for h in 1..6 {
                    assert!((parsed.eval(t, h) - f.eval(t, h)).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn deserialize_rejects_garbage() {
        assert!(matches!(
            RewardFn::deserialize("5"),
            Err(FunctionParseError::MissingTag(_))
        ));
        assert!(matches!(
            RewardFn::deserialize("quadratic;1,2"),
            Err(FunctionParseError::UnknownTag(_))
        ));
        assert!(matches!(
            RewardFn::deserialize("linear;3"),
            Err(FunctionParseError::MalformedLinear(_))
        ));
        assert!(matches!(
            RewardFn::deserialize("const;abc"),
            Err(FunctionParseError::InvalidNumber(_))
        ));
    }
}
