//! The probability algebra: scalar, interval, and p-box arithmetic under a
//! single tagged sum type, shared by every engine code path.

use std::hash::{Hash, Hasher};
use std::collections::hash_map::DefaultHasher;

use crate::error::{ReachabilityError, Result};

/// Which [`Probability`] variant a query's inputs must use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UncertaintyMode {
    Scalar,
    Interval,
    PBox,
}

/// A single algebraic probability value: a scalar, a closed interval, or a
/// p-box (a pair of bounding step functions). All three variants are valid
/// probabilities over `[0, 1]`; arithmetic preserves that invariant.
#[derive(Clone, Debug, PartialEq)]
pub enum Probability {
    Scalar(f64),
    Interval(f64, f64),
    PBox(PBox),
}

/// A discretized p-box: `m` equal-probability-mass focal intervals, each a
/// `(lower, upper)` bound pair. Both bound sequences are non-decreasing;
/// within each pair, `lower <= upper`.
#[derive(Clone, Debug, PartialEq)]
pub struct PBox {
    pub focals: Vec<(f64, f64)>,
}

impl Probability {
    pub fn scalar(v: f64) -> Result<Self> {
        let p = Probability::Scalar(v);
        p.validate("scalar")?;
        Ok(p)
    }

    pub fn interval(lo: f64, hi: f64) -> Result<Self> {
        let p = Probability::Interval(lo, hi);
        p.validate("interval")?;
        Ok(p)
    }

    pub fn p_box(focals: Vec<(f64, f64)>) -> Result<Self> {
        let p = Probability::PBox(PBox { focals });
        p.validate("p_box")?;
        Ok(p)
    }

    /// The additive identity / certain-false value, in the given mode.
    pub fn zero(mode: UncertaintyMode) -> Self {
        match mode {
            UncertaintyMode::Scalar => Probability::Scalar(0.0),
            UncertaintyMode::Interval => Probability::Interval(0.0, 0.0),
            UncertaintyMode::PBox => Probability::PBox(PBox {
                focals: vec![(0.0, 0.0)],
            }),
        }
    }

    /// The multiplicative identity / certain-true value, in the given mode.
    pub fn one(mode: UncertaintyMode) -> Self {
        match mode {
            UncertaintyMode::Scalar => Probability::Scalar(1.0),
            UncertaintyMode::Interval => Probability::Interval(1.0, 1.0),
            UncertaintyMode::PBox => Probability::PBox(PBox {
                focals: vec![(1.0, 1.0)],
            }),
        }
    }

    /// Any interior value, used where a non-degenerate placeholder is
    /// needed (e.g. test fixtures).
    pub fn non_fixed(mode: UncertaintyMode) -> Self {
        match mode {
            UncertaintyMode::Scalar => Probability::Scalar(0.5),
            UncertaintyMode::Interval => Probability::Interval(0.25, 0.75),
            UncertaintyMode::PBox => Probability::PBox(PBox {
                focals: vec![(0.25, 0.75)],
            }),
        }
    }

    pub fn mode(&self) -> UncertaintyMode {
        match self {
            Probability::Scalar(_) => UncertaintyMode::Scalar,
            Probability::Interval(_, _) => UncertaintyMode::Interval,
            Probability::PBox(_) => UncertaintyMode::PBox,
        }
    }

    pub fn is_valid_probability(&self) -> bool {
        match self {
            Probability::Scalar(v) => (0.0..=1.0).contains(v),
            Probability::Interval(lo, hi) => {
                (0.0..=1.0).contains(lo) && (0.0..=1.0).contains(hi) && lo <= hi
            }
            Probability::PBox(b) => {
                !b.focals.is_empty()
                    && b.focals
                        .iter()
                        .all(|&(lo, hi)| (0.0..=1.0).contains(&lo) && (0.0..=1.0).contains(&hi) && lo <= hi)
                    && b.focals.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1)
            }
        }
    }

    fn validate(&self, where_: &str) -> Result<()> {
        if self.is_valid_probability() {
            Ok(())
        } else {
            Err(ReachabilityError::InvalidProbability {
                where_: where_.to_string(),
                value: format!("{self:?}"),
            })
        }
    }

    pub fn complement(&self) -> Result<Self> {
        match self {
            Probability::Scalar(v) => Probability::scalar(1.0 - v),
            Probability::Interval(lo, hi) => Probability::interval(1.0 - hi, 1.0 - lo),
            Probability::PBox(b) => {
                let focals = b
                    .focals
                    .iter()
                    .rev()
                    .map(|&(lo, hi)| (1.0 - hi, 1.0 - lo))
                    .collect();
                Probability::p_box(focals)
            }
        }
    }

    pub fn add(&self, other: &Self) -> Result<Self> {
        match (self, other) {
            (Probability::Scalar(a), Probability::Scalar(b)) => Probability::scalar(a + b),
            (Probability::Interval(a_lo, a_hi), Probability::Interval(b_lo, b_hi)) => {
                Probability::interval(a_lo + b_lo, a_hi + b_hi)
            }
            (Probability::PBox(a), Probability::PBox(b)) => {
                pbox_convolve(a, b, |x, y| x + y)
            }
            _ => Err(mode_mismatch("add")),
        }
    }

    pub fn sub(&self, other: &Self) -> Result<Self> {
        match (self, other) {
            (Probability::Scalar(a), Probability::Scalar(b)) => Probability::scalar(a - b),
            (Probability::Interval(a_lo, a_hi), Probability::Interval(b_lo, b_hi)) => {
                Probability::interval(a_lo - b_hi, a_hi - b_lo)
            }
            (Probability::PBox(a), Probability::PBox(b)) => {
                pbox_convolve(a, b, |x, y| x - y)
            }
            _ => Err(mode_mismatch("sub")),
        }
    }

    pub fn mul(&self, other: &Self) -> Result<Self> {
        match (self, other) {
            (Probability::Scalar(a), Probability::Scalar(b)) => Probability::scalar(a * b),
            (Probability::Interval(a_lo, a_hi), Probability::Interval(b_lo, b_hi)) => {
                let corners = [a_lo * b_lo, a_lo * b_hi, a_hi * b_lo, a_hi * b_hi];
                let lo = corners.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = corners.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Probability::interval(lo, hi)
            }
            (Probability::PBox(a), Probability::PBox(b)) => {
                pbox_convolve(a, b, |x, y| x * y)
            }
            _ => Err(mode_mismatch("mul")),
        }
    }

    pub fn divide(&self, other: &Self) -> Result<Self> {
        match (self, other) {
            (Probability::Scalar(a), Probability::Scalar(b)) => {
                if *b == 0.0 {
                    return Err(ReachabilityError::DomainError("divide".to_string()));
                }
                Probability::scalar(a / b)
            }
            (Probability::Interval(a_lo, a_hi), Probability::Interval(b_lo, b_hi)) => {
                if *b_lo <= 0.0 && *b_hi >= 0.0 {
                    return Err(ReachabilityError::DomainError("divide".to_string()));
                }
                let corners = [a_lo / b_lo, a_lo / b_hi, a_hi / b_lo, a_hi / b_hi];
                let lo = corners.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = corners.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Probability::interval(lo, hi)
            }
            (Probability::PBox(_), Probability::PBox(b)) => {
                if b.focals.iter().any(|&(lo, hi)| lo <= 0.0 && hi >= 0.0) {
                    return Err(ReachabilityError::DomainError("divide".to_string()));
                }
                if let (Probability::PBox(a), Probability::PBox(b)) = (self, other) {
                    pbox_convolve(a, b, |x, y| x / y)
                } else {
                    unreachable!()
                }
            }
            _ => Err(mode_mismatch("divide")),
        }
    }

    pub fn sum(values: &[Probability]) -> Result<Self> {
        let mode = values
            .first()
            .map(Probability::mode)
            .ok_or_else(|| ReachabilityError::DomainError("sum_of_empty_list".to_string()))?;
        let mut acc = Probability::zero(mode);
        for v in values {
            acc = acc.add(v)?;
        }
        Ok(acc)
    }

    pub fn product(values: &[Probability]) -> Result<Self> {
        let mode = values
            .first()
            .map(Probability::mode)
            .ok_or_else(|| ReachabilityError::DomainError("product_of_empty_list".to_string()))?;
        let mut acc = Probability::one(mode);
        for v in values {
            acc = acc.mul(v)?;
        }
        Ok(acc)
    }

    /// A structural hash of this value's *content*, used to build
    /// `prior_vector_hash` keys for the conditioning cache. Not a
    /// cryptographic hash; only required to agree on equal values.
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match self {
            Probability::Scalar(v) => {
                0u8.hash(&mut hasher);
                v.to_bits().hash(&mut hasher);
            }
            Probability::Interval(lo, hi) => {
                1u8.hash(&mut hasher);
                lo.to_bits().hash(&mut hasher);
                hi.to_bits().hash(&mut hasher);
            }
            Probability::PBox(b) => {
                2u8.hash(&mut hasher);
                for &(lo, hi) in &b.focals {
                    lo.to_bits().hash(&mut hasher);
                    hi.to_bits().hash(&mut hasher);
                }
            }
        }
        hasher.finish()
    }
}

fn mode_mismatch(op: &str) -> ReachabilityError {
    ReachabilityError::DomainError(format!("{op}:variant_mismatch"))
}

/// Williamson-Downs-style independent convolution: take the cartesian
/// product of both p-boxes' focal intervals, apply `op` to each pair of
/// bounds, then re-bin into `max(a, b)` equal-mass output focals by sorting
/// the resulting lower and upper bound sequences independently.
fn pbox_convolve(a: &PBox, b: &PBox, op: impl Fn(f64, f64) -> f64) -> Result<Probability> {
    let out_len = a.focals.len().max(b.focals.len());
    let mut los = Vec::with_capacity(a.focals.len() * b.focals.len());
    let mut his = Vec::with_capacity(a.focals.len() * b.focals.len());
    for &(a_lo, a_hi) in &a.focals {
        for &(b_lo, b_hi) in &b.focals {
            let corners = [op(a_lo, b_lo), op(a_lo, b_hi), op(a_hi, b_lo), op(a_hi, b_hi)];
            los.push(corners.iter().copied().fold(f64::INFINITY, f64::min));
            his.push(corners.iter().copied().fold(f64::NEG_INFINITY, f64::max));
        }
    }
    los.sort_by(|x, y| x.partial_cmp(y).expect("probability bound must not be NaN"));
    his.sort_by(|x, y| x.partial_cmp(y).expect("probability bound must not be NaN"));

    let focals: Vec<(f64, f64)> = rebin(&los, out_len)
        .into_iter()
        .zip(rebin(&his, out_len))
        .map(|(lo, hi)| (lo.clamp(0.0, 1.0), hi.clamp(0.0, 1.0)))
        .collect();
    Probability::p_box(focals)
}

/// Downsample a sorted sequence to `out_len` representative values by
/// picking evenly-spaced quantiles.
fn rebin(sorted: &[f64], out_len: usize) -> Vec<f64> {
    if sorted.len() <= out_len {
        return sorted.to_vec();
    }
    (0..out_len)
        .map(|i| {
            let idx = (i * (sorted.len() - 1)) / out_len.max(1);
            sorted[idx]
        })
        .collect()
}
