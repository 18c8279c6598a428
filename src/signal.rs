//! Numeric helpers for accelerometer traces
//!
//! Smoothing with rectangular windows, removal of the slowly varying part of a
//! trace, cumulative integration and per-sample magnitude.

use crate::error::CleanError;

/// How often the accelerometer takes a measurement
pub const SAMPLE_RATE_HZ: u32 = 100;

/// Seconds between consecutive accelerometer samples
pub fn sample_interval() -> f64 {
    1.0 / SAMPLE_RATE_HZ as f64
}

/// Smoothing used to estimate the low-frequency part of a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smoothing {
    /// Rectangular convolution, zero-padded at the edges
    Convolve { width: usize },
    /// Centred moving average over the samples available at the edges
    MovingAvg { width: usize },
}

fn check_width(len: usize, width: usize) -> Result<(), CleanError> {
    if width == 0 || width > len {
        return Err(CleanError::InvalidWindow(format!(
            "width {} for {} samples",
            width, len
        )));
    }
    Ok(())
}

/// Rectangular moving average over full windows only
///
/// The result has `len - width + 1` samples; `width == 1` is no smoothing.
pub fn moving_avg(values: &[f64], width: usize) -> Result<Vec<f64>, CleanError> {
    check_width(values.len(), width)?;

    let mut sum: f64 = values[..width].iter().sum();
    let mut out = Vec::with_capacity(values.len() - width + 1);
    out.push(sum / width as f64);
    for i in width..values.len() {
        sum += values[i] - values[i - width];
        out.push(sum / width as f64);
    }
    Ok(out)
}

/// Convolve with a rectangular kernel of `width`, keeping the input length
pub fn convolve_rectangle(values: &[f64], width: usize) -> Result<Vec<f64>, CleanError> {
    check_width(values.len(), width)?;

    // Kernel centre for even widths sits right of the middle
    let offset = (width - 1) / 2;
    let last = values.len() - 1;
    Ok((0..values.len())
        .map(|i| {
            let hi = (i + offset).min(last);
            let lo = (i + offset).saturating_sub(width - 1);
            values[lo..=hi].iter().sum::<f64>() / width as f64
        })
        .collect())
}

fn centred_mean(values: &[f64], width: usize) -> Result<Vec<f64>, CleanError> {
    check_width(values.len(), width)?;

    let last = values.len() - 1;
    Ok((0..values.len())
        .map(|i| {
            let lo = i.saturating_sub((width - 1) / 2);
            let hi = (i + width / 2).min(last);
            let window = &values[lo..=hi];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect())
}

/// Remove the slowly varying part of a trace
///
/// Returns `values - smoothed`, with the same length as `values`.
pub fn remove_low_freqs(values: &[f64], method: Smoothing) -> Result<Vec<f64>, CleanError> {
    let smoothed = match method {
        Smoothing::Convolve { width } => convolve_rectangle(values, width)?,
        Smoothing::MovingAvg { width } => centred_mean(values, width)?,
    };
    Ok(values.iter().zip(smoothed).map(|(v, s)| v - s).collect())
}

/// Cumulative trapezoidal integral, starting from zero
pub fn integrate(values: &[f64], dx: f64) -> Vec<f64> {
    let mut total = 0.0;
    let mut out = Vec::with_capacity(values.len());
    if let Some(&first) = values.first() {
        out.push(total);
        let mut previous = first;
        for &value in &values[1..] {
            total += (previous + value) * dx / 2.0;
            out.push(total);
            previous = value;
        }
    }
    out
}

/// Euclidean norm of each (x, y, z) sample
pub fn magnitude(x: &[f64], y: &[f64], z: &[f64]) -> Result<Vec<f64>, CleanError> {
    if x.len() != y.len() || x.len() != z.len() {
        return Err(CleanError::LengthMismatch(format!(
            "axes have {}, {} and {} samples",
            x.len(),
            y.len(),
            z.len()
        )));
    }

    Ok(x.iter()
        .zip(y)
        .zip(z)
        .map(|((a, b), c)| (a * a + b * b + c * c).sqrt())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn close(a: &[f64], b: &[f64], tol: f64) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tol)
    }

    #[test]
    fn test_moving_avg_valid_mode() {
        let out = moving_avg(&[1.0, 2.0, 3.0, 4.0, 5.0], 2).unwrap();
        assert!(close(&out, &[1.5, 2.5, 3.5, 4.5], 1e-12));

        let unchanged = moving_avg(&[3.0, 1.0], 1).unwrap();
        assert!(close(&unchanged, &[3.0, 1.0], 1e-12));
    }

    #[test]
    fn test_invalid_widths() {
        assert!(matches!(moving_avg(&[1.0], 0), Err(CleanError::InvalidWindow(_))));
        assert!(matches!(
            convolve_rectangle(&[1.0, 2.0], 3),
            Err(CleanError::InvalidWindow(_))
        ));
    }

    #[test]
    fn test_convolve_rectangle_same_mode() {
        // Matches numpy.convolve(pts, ones(3), "same") / 3
        let out = convolve_rectangle(&[3.0, 3.0, 3.0, 3.0], 3).unwrap();
        assert!(close(&out, &[2.0, 3.0, 3.0, 2.0], 1e-12));

        // Even width: numpy.convolve([1, 2, 3, 4], ones(2), "same") = [1, 3, 5, 7]
        let out = convolve_rectangle(&[1.0, 2.0, 3.0, 4.0], 2).unwrap();
        assert!(close(&out, &[0.5, 1.5, 2.5, 3.5], 1e-12));
    }

    #[test]
    fn test_remove_low_freqs_removes_offset() {
        let values: Vec<f64> = (0..50)
            .map(|i| 10.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();

        let fast = remove_low_freqs(&values, Smoothing::MovingAvg { width: 2 }).unwrap();
        assert_eq!(fast.len(), values.len());
        // Away from the edges only the alternating part remains
        assert!(fast[1..49].iter().all(|v| (v.abs() - 1.0).abs() < 1e-9));

        let convolved = remove_low_freqs(&values, Smoothing::Convolve { width: 2 }).unwrap();
        assert_eq!(convolved.len(), values.len());
        assert!(convolved[1..].iter().all(|v| (v.abs() - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_integrate_sine() {
        let n = 200;
        let dx = 2.0 * PI / (n - 1) as f64;
        let x: Vec<f64> = (0..n).map(|i| i as f64 * dx).collect();
        let y: Vec<f64> = x.iter().map(|v| v.sin()).collect();

        let integral = integrate(&y, dx);
        let expected: Vec<f64> = x.iter().map(|v| 1.0 - v.cos()).collect();
        assert!(close(&integral, &expected, 1e-2));
    }

    #[test]
    fn test_integrate_empty_and_constant() {
        assert!(integrate(&[], 1.0).is_empty());
        let out = integrate(&[2.0, 2.0, 2.0], sample_interval());
        assert!(close(&out, &[0.0, 0.02, 0.04], 1e-12));
    }

    #[test]
    fn test_magnitude() {
        let out = magnitude(&[3.0, 0.0], &[4.0, 0.0], &[0.0, 2.0]).unwrap();
        assert!(close(&out, &[5.0, 2.0], 1e-12));
        assert!(matches!(
            magnitude(&[1.0], &[], &[1.0]),
            Err(CleanError::LengthMismatch(_))
        ));
    }
}
