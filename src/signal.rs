//! Byte congruence signal: how similar neighbouring bytes are, and how that similarity
//! changes along the message. Sharp changes of the delta mark likely field boundaries.

/// Fraction of the 8 bit positions in which `a` and `b` agree.
pub fn bit_congruence(a: u8, b: u8) -> f64 {
    (8 - (a ^ b).count_ones()) as f64 / 8.0
}

/// First difference of the bit congruence of consecutive bytes.
///
/// The result has `len - 2` samples; messages shorter than 3 bytes yield an empty signal.
pub fn compute_delta_bc(bytes: &[u8]) -> Vec<f64> {
    if bytes.len() < 3 {
        return Vec::new();
    }
    let bc: Vec<f64> = bytes.windows(2).map(|w| bit_congruence(w[0], w[1])).collect();
    bc.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Gaussian smoothing with radius `ceil(3 * sigma)`. Samples outside the signal count as
/// zero (no padding or reflection).
pub fn apply_gaussian_filter(signal: &[f64], sigma: f64) -> Vec<f64> {
    let radius = (3.0 * sigma).ceil() as isize;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-0.5 * (i * i) as f64 / (sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    for w in kernel.iter_mut() {
        *w /= sum;
    }

    let n = signal.len() as isize;
    (0..n)
        .map(|i| {
            (-radius..=radius)
                .filter_map(|j| {
                    let idx = i + j;
                    (0..n)
                        .contains(&idx)
                        .then(|| signal[idx as usize] * kernel[(j + radius) as usize])
                })
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_congruence_identical_bytes() {
        for b in 0..=255u8 {
            assert_eq!(bit_congruence(b, b), 1.0);
        }
    }

    #[test]
    fn bit_congruence_partial() {
        assert_eq!(bit_congruence(0x00, 0xFF), 0.0);
        assert_eq!(bit_congruence(0xAF, 0x5F), 0.5);
        assert_eq!(bit_congruence(0xBF, 0x7F), 0.75);
    }

    #[test]
    fn delta_bc_of_short_messages_is_empty() {
        assert!(compute_delta_bc(&[]).is_empty());
        assert!(compute_delta_bc(&[0xAA]).is_empty());
        assert!(compute_delta_bc(&[0xAA, 0x5F]).is_empty());
    }

    #[test]
    fn delta_bc_values() {
        assert_eq!(compute_delta_bc(&[0xFE, 0x47, 0x81, 0x82]), vec![0.125, 0.25]);
    }

    #[test]
    fn gaussian_kernel_preserves_constant_interior() {
        let signal = vec![1.0; 9];
        let smoothed = apply_gaussian_filter(&signal, 0.6);
        assert_eq!(smoothed.len(), 9);
        // radius is 2, so indices 2..7 see the full kernel
        for v in &smoothed[2..7] {
            assert!((v - 1.0).abs() < 1e-12);
        }
        // edges lose the weight of the missing samples
        assert!(smoothed[0] < 1.0);
        assert!(smoothed[8] < 1.0);
    }

    #[test]
    fn gaussian_filter_of_empty_signal() {
        assert!(apply_gaussian_filter(&[], 0.6).is_empty());
    }
}
