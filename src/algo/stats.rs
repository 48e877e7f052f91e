//! Robust statistics over the finite, non-missing part of a numeric column.

use serde::{Deserialize, Serialize};

/// Finite values only, sorted ascending.
pub fn finite_sorted(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.into_iter().filter(|x| x.is_finite()).collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Percentile `p` in [0, 100] with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let sorted = finite_sorted(values.iter().copied());
    percentile_sorted(&sorted, p)
}

fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    Some(finite.iter().sum::<f64>() / finite.len() as f64)
}

/// Sample standard deviation (n − 1 denominator). Needs at least two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.len() < 2 {
        return None;
    }
    let m = finite.iter().sum::<f64>() / finite.len() as f64;
    let var = finite.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (finite.len() - 1) as f64;
    Some(var.sqrt())
}

/// Outlier fences `[q1 − k·spread, q3 + k·spread]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    /// The IQR, or its substitute when the IQR is zero.
    pub spread: f64,
    pub low: f64,
    pub high: f64,
}

impl IqrBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Tukey fences with multiplier `k` around linearly interpolated quartiles.
/// A zero-width IQR is replaced by the sample standard deviation, or 1.0
/// when that is also zero or undefined.
pub fn iqr_bounds(values: &[f64], k: f64) -> Option<IqrBounds> {
    let sorted = finite_sorted(values.iter().copied());
    let q1 = percentile_sorted(&sorted, 25.0)?;
    let q3 = percentile_sorted(&sorted, 75.0)?;
    let mut spread = q3 - q1;
    if spread <= 0.0 {
        spread = match sample_std(&sorted) {
            Some(sd) if sd > 0.0 => sd,
            _ => 1.0,
        };
    }
    Some(IqrBounds {
        q1,
        q3,
        spread,
        low: q1 - k * spread,
        high: q3 + k * spread,
    })
}

/// Percentile rank in (0, 1] of each present value among the present values.
/// Ties share their average rank; missing or non-finite entries stay `None`.
pub fn percentile_ranks(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut present: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|x| x.is_finite()).map(|x| (i, x)))
        .collect();
    present.sort_by(|a, b| a.1.total_cmp(&b.1));

    let n = present.len();
    let mut ranks = vec![None; values.len()];
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && present[j + 1].1 == present[i].1 {
            j += 1;
        }
        // 1-based ranks i+1..=j+1 averaged
        let avg = (i + j + 2) as f64 / 2.0;
        for &(idx, _) in &present[i..=j] {
            ranks[idx] = Some(avg / n as f64);
        }
        i = j + 1;
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_linear_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 100.0), Some(4.0));
        assert!((percentile(&v, 75.0).unwrap() - 3.25).abs() < 1e-12);
    }

    #[test]
    fn percentile_ignores_non_finite() {
        let v = [f64::NAN, 10.0, f64::INFINITY, 20.0];
        assert_eq!(percentile(&v, 50.0), Some(15.0));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn quartiles_interpolate_between_ranks() {
        let b = iqr_bounds(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 12.0], 1.5).unwrap();
        assert!((b.q1 - 2.75).abs() < 1e-9);
        assert!((b.q3 - 6.25).abs() < 1e-9);
        assert!((b.high - 11.5).abs() < 1e-9);
        assert!(!b.contains(12.0));
        assert!(b.contains(7.0));
    }

    #[test]
    fn iqr_bounds_flags_far_value() {
        let v = [10.0, 12.0, 11.0, 13.0, 9.0, 500.0];
        let b = iqr_bounds(&v, 1.5).unwrap();
        assert!((b.low - 6.5).abs() < 1e-9);
        assert!((b.high - 16.5).abs() < 1e-9);
        assert!(!b.contains(500.0));
        for x in &v[..5] {
            assert!(b.contains(*x));
        }
    }

    #[test]
    fn iqr_zero_width_uses_std_then_one() {
        let b = iqr_bounds(&[5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 100.0], 1.5).unwrap();
        assert!(b.spread > 1.0);
        let flat = iqr_bounds(&[3.0, 3.0, 3.0], 1.0).unwrap();
        assert_eq!(flat.spread, 1.0);
        assert_eq!((flat.low, flat.high), (2.0, 4.0));
    }

    #[test]
    fn iqr_bounds_empty() {
        assert!(iqr_bounds(&[f64::NAN], 1.5).is_none());
    }

    #[test]
    fn ranks_average_ties() {
        let r = percentile_ranks(&[Some(1.0), None, Some(2.0), Some(2.0), Some(3.0)]);
        assert_eq!(r[0], Some(0.25));
        assert_eq!(r[1], None);
        assert_eq!(r[2], Some(0.625));
        assert_eq!(r[3], Some(0.625));
        assert_eq!(r[4], Some(1.0));
    }

    #[test]
    fn std_and_mean() {
        assert_eq!(sample_std(&[1.0]), None);
        assert!((sample_std(&[1.0, 3.0]).unwrap() - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(mean(&[1.0, 3.0, f64::NAN]), Some(2.0));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
    }
}
