//! Lower/upper envelopes on expected return.

use std::fmt;

use super::value::StateValue;

/// Immutable pair of lower and upper bounds on the remaining return.
///
/// Bound selection is scalarized: [`update`] keeps whichever vector has the
/// smaller (resp. larger) total, so the stored bounds are always values that
/// an actual continuation can achieve.
///
/// The empty bound acts as the identity for both [`update`] and [`add`].
///
/// [`update`]: ValueBound::update
/// [`add`]: ValueBound::add
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBound {
    bounds: Option<(StateValue, StateValue)>,
}

impl ValueBound {
    /// Creates an empty bound, used when accumulating bounds.
    pub fn empty() -> Self {
        Self { bounds: None }
    }

    /// Creates a point bound with `lower = upper = value`.
    pub fn point(value: StateValue) -> Self {
        Self {
            bounds: Some((value.clone(), value)),
        }
    }

    /// Creates a bound from explicit lower and upper values.
    pub fn new(lower: StateValue, upper: StateValue) -> Self {
        Self {
            bounds: Some((lower, upper)),
        }
    }

    /// Returns true if no bound has been accumulated yet.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }

    /// The lower bound, if set.
    pub fn lower(&self) -> Option<&StateValue> {
        self.bounds.as_ref().map(|(l, _)| l)
    }

    /// The upper bound, if set.
    pub fn upper(&self) -> Option<&StateValue> {
        self.bounds.as_ref().map(|(_, u)| u)
    }

    /// Widens the envelope over alternative choices: the result has the
    /// smaller of both lower bounds and the larger of both upper bounds
    /// (compared by scalarized total).
    pub fn update(&self, other: &ValueBound) -> ValueBound {
        let Some((ol, ou)) = other.bounds.as_ref() else {
            return self.clone();
        };
        let Some((sl, su)) = self.bounds.as_ref() else {
            return other.clone();
        };

        let lower = if sl.total() > ol.total() { ol } else { sl };
        let upper = if su.total() < ou.total() { ou } else { su };
        ValueBound::new(lower.clone(), upper.clone())
    }

    /// Sums two bounds componentwise, for sequential or parallel segments.
    pub fn add(&self, other: &ValueBound) -> ValueBound {
        let Some((ol, ou)) = other.bounds.as_ref() else {
            return self.clone();
        };
        let Some((sl, su)) = self.bounds.as_ref() else {
            return other.clone();
        };

        let mut lower = sl.clone();
        lower.add(ol);
        let mut upper = su.clone();
        upper.add(ou);
        ValueBound::new(lower, upper)
    }

    /// Shifts both bounds by a fixed value.
    pub fn add_value(&self, value: &StateValue) -> ValueBound {
        match self.bounds.as_ref() {
            None => ValueBound::point(value.clone()),
            Some((l, u)) => {
                let mut lower = l.clone();
                lower.add(value);
                let mut upper = u.clone();
                upper.add(value);
                ValueBound::new(lower, upper)
            }
        }
    }

    /// Scales both bounds by `factor`.
    pub fn scale(&self, factor: f64) -> ValueBound {
        match self.bounds.as_ref() {
            None => ValueBound::empty(),
            Some((l, u)) => {
                let mut lower = l.clone();
                lower.scale(factor);
                let mut upper = u.clone();
                upper.scale(factor);
                ValueBound::new(lower, upper)
            }
        }
    }
}

impl fmt::Display for ValueBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bounds.as_ref() {
            None => write!(f, "[]"),
            Some((l, u)) => write!(f, "[{:.2}, {:.2}]", l.total(), u.total()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(lower: f64, upper: f64) -> ValueBound {
        ValueBound::new(
            StateValue::from_values(vec![lower]),
            StateValue::from_values(vec![upper]),
        )
    }

    fn totals(bound: &ValueBound) -> (f64, f64) {
        (
            bound.lower().unwrap().total(),
            bound.upper().unwrap().total(),
        )
    }

    #[test]
    fn update_takes_min_lower_max_upper() {
        let cases = [
            (b(0.0, 1.0), b(-1.0, 0.5)),
            (b(-3.0, -2.0), b(5.0, 7.0)),
            (b(1.0, 1.0), b(1.0, 1.0)),
        ];
        for (x, y) in &cases {
            let u = x.update(y);
            let (xl, xu) = totals(x);
            let (yl, yu) = totals(y);
            let (ul, uu) = totals(&u);
            assert!((ul - xl.min(yl)).abs() < 1e-10);
            assert!((uu - xu.max(yu)).abs() < 1e-10);
        }
    }

    #[test]
    fn add_is_componentwise_sum() {
        let (l, u) = totals(&b(1.0, 2.0).add(&b(-0.5, 3.0)));
        assert!((l - 0.5).abs() < 1e-10);
        assert!((u - 5.0).abs() < 1e-10);
    }

    #[test]
    fn add_is_commutative_and_associative() {
        let (x, y, z) = (b(1.0, 2.0), b(-1.0, 0.0), b(0.25, 4.0));
        assert_eq!(x.add(&y), y.add(&x));
        assert_eq!(x.add(&y).add(&z), x.add(&y.add(&z)));
    }

    #[test]
    fn empty_is_identity() {
        let x = b(1.5, 2.5);
        assert_eq!(ValueBound::empty().add(&x), x);
        assert_eq!(x.add(&ValueBound::empty()), x);
        assert_eq!(ValueBound::empty().update(&x), x);
    }

    #[test]
    fn point_has_equal_bounds() {
        let p = ValueBound::point(StateValue::from_values(vec![2.0, 1.0]));
        assert_eq!(p.lower(), p.upper());
    }

    #[test]
    fn scale_applies_to_both_bounds() {
        let (l, u) = totals(&b(2.0, 4.0).scale(0.5));
        assert!((l - 1.0).abs() < 1e-10);
        assert!((u - 2.0).abs() < 1e-10);
    }

    #[test]
    fn add_value_shifts_both_bounds() {
        let shifted = b(1.0, 3.0).add_value(&StateValue::from_values(vec![2.0]));
        let (l, u) = totals(&shifted);
        assert!((l - 3.0).abs() < 1e-10);
        assert!((u - 5.0).abs() < 1e-10);
    }
}
