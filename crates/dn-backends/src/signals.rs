//! Observation helpers for building ΔD from distributions.
//!
//! Both helpers smooth their inputs by [`SMOOTHING`] before normalizing so
//! that zero weights never produce `ln 0`.
//!
//! ```text
//! entropy_normalized(w) = H(w / Σw) / ln K
//! normalized_kl(q, p)   = KL(q / Σq ‖ p / Σp) / ln n
//! ```
//!
//! Both results are clamped into [0, 1].

use dn_engine::clamp01;
use thiserror::Error;

pub const SMOOTHING: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("distribution length mismatch: q has {q} entries, p has {p}")]
    LengthMismatch { q: usize, p: usize },
}

fn smoothed(weights: &[f64]) -> Vec<f64> {
    let shifted: Vec<f64> = weights.iter().map(|w| w + SMOOTHING).collect();
    let total: f64 = shifted.iter().sum();
    shifted.into_iter().map(|w| w / total).collect()
}

/// Shannon entropy of `weights` normalized by `ln K`. Returns 0 for K ≤ 1.
#[must_use]
pub fn entropy_normalized(weights: &[f64]) -> f64 {
    let k = weights.len();
    if k <= 1 {
        return 0.0;
    }
    let probs = smoothed(weights);
    let h: f64 = probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum();
    clamp01(h / (k as f64).ln())
}

/// KL(q ‖ p) normalized by `ln n`. Returns 0 for n ≤ 1.
pub fn normalized_kl(q: &[f64], p: &[f64]) -> Result<f64, SignalError> {
    if q.len() != p.len() {
        return Err(SignalError::LengthMismatch {
            q: q.len(),
            p: p.len(),
        });
    }
    let n = q.len();
    if n <= 1 {
        return Ok(0.0);
    }
    let qn = smoothed(q);
    let pn = smoothed(p);
    let kl: f64 = qn
        .iter()
        .zip(&pn)
        .filter(|(qi, _)| **qi > 0.0)
        .map(|(qi, pi)| qi * (qi / pi).ln())
        .sum();
    Ok(clamp01(kl / (n as f64).ln()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_weights_have_full_entropy() {
        let h = entropy_normalized(&[1.0; 8]);
        assert!((h - 1.0).abs() < 1e-9, "h={h}");
    }

    #[test]
    fn point_mass_has_near_zero_entropy() {
        let h = entropy_normalized(&[1.0, 0.0, 0.0, 0.0]);
        assert!(h < 1e-6, "h={h}");
    }

    #[test]
    fn degenerate_entropy_inputs() {
        assert_eq!(entropy_normalized(&[]), 0.0);
        assert_eq!(entropy_normalized(&[5.0]), 0.0);
        // All-zero weights smooth to uniform.
        let h = entropy_normalized(&[0.0, 0.0, 0.0]);
        assert!((h - 1.0).abs() < 1e-9);
    }

    #[test]
    fn identical_distributions_have_zero_kl() {
        let d = [0.1, 0.2, 0.3, 0.4];
        let kl = normalized_kl(&d, &d).unwrap();
        assert!(kl.abs() < 1e-12, "kl={kl}");
    }

    #[test]
    fn kl_is_scale_invariant() {
        let q = [1.0, 2.0, 3.0];
        let p = [3.0, 2.0, 1.0];
        let a = normalized_kl(&q, &p).unwrap();
        let b = normalized_kl(&[10.0, 20.0, 30.0], &[0.3, 0.2, 0.1]).unwrap();
        assert!(a > 0.0);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn disjoint_support_clamps_to_one() {
        let kl = normalized_kl(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert_eq!(kl, 1.0);
    }

    #[test]
    fn kl_length_mismatch_is_error() {
        let err = normalized_kl(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert_eq!(err, SignalError::LengthMismatch { q: 2, p: 1 });
        assert!(err.to_string().contains("q has 2"));
    }

    #[test]
    fn short_kl_inputs_are_zero() {
        assert_eq!(normalized_kl(&[], &[]).unwrap(), 0.0);
        assert_eq!(normalized_kl(&[3.0], &[1.0]).unwrap(), 0.0);
    }
}
