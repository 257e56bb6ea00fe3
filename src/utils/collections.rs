//! Elementwise vector arithmetic on port values.
//!
//! Port values are plain `Vec<f64>`; these helpers centralize the
//! truncation rules so aggregation behaves the same everywhere: operations
//! are clipped to the accumulator's length, extra source elements are
//! dropped, missing ones contribute nothing.

use crate::types::Value;

/// Add `value` into `acc` elementwise, clipped to `acc`'s length.
pub fn accumulate(acc: &mut [f64], value: &[f64]) {
    for (slot, x) in acc.iter_mut().zip(value) {
        *slot += x;
    }
}

/// Elementwise difference `a - b`, sized to the shorter operand.
#[must_use]
pub fn diff(a: &[f64], b: &[f64]) -> Value {
    a.iter().zip(b).map(|(x, y)| x - y).collect()
}

/// Elementwise product, sized to the shorter operand.
#[must_use]
pub fn hadamard(a: &[f64], b: &[f64]) -> Value {
    a.iter().zip(b).map(|(x, y)| x * y).collect()
}

/// Multiply every element by `factor`.
#[must_use]
pub fn scale(value: &[f64], factor: f64) -> Value {
    value.iter().map(|x| x * factor).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_clips_to_accumulator() {
        let mut acc = vec![1.0, 2.0];
        accumulate(&mut acc, &[10.0, 10.0, 10.0]);
        assert_eq!(acc, vec![11.0, 12.0]);
    }

    #[test]
    fn diff_and_hadamard_use_shorter_length() {
        assert_eq!(diff(&[3.0, 3.0], &[1.0]), vec![2.0]);
        assert_eq!(hadamard(&[2.0], &[4.0, 5.0]), vec![8.0]);
    }

    #[test]
    fn scale_applies_factor() {
        assert_eq!(scale(&[1.0, -2.0], 0.5), vec![0.5, -1.0]);
    }
}
