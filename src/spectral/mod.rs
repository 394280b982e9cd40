//! Radix-2 magnitude spectrum over a metric window.
//!
//! The transform operates on the largest power-of-two suffix of the window
//! (the newest samples). Each output bin is the scaled magnitude
//! `2 * |X[k]| / n`, truncated to an integer, matching the persisted
//! spectrum file format.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    fn add(self, other: Self) -> Self {
        Self::new(self.re + other.re, self.im + other.im)
    }

    fn sub(self, other: Self) -> Self {
        Self::new(self.re - other.re, self.im - other.im)
    }

    fn mul(self, other: Self) -> Self {
        Self::new(
            self.re * other.re - self.im * other.im,
            self.re * other.im + self.im * other.re,
        )
    }

    fn magnitude(self) -> f64 {
        (self.re * self.re + self.im * self.im).sqrt()
    }
}

/// In-place iterative radix-2 FFT: bit-reversal permutation followed by
/// butterfly passes of doubling length. `data.len()` must be a power of two.
fn fft_in_place(data: &mut [Complex]) {
    let n = data.len();
    debug_assert!(n.is_power_of_two());
    if n <= 1 {
        return;
    }

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            data.swap(i, j);
        }
    }

    // Butterfly passes.
    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        let wlen = Complex::new(angle.cos(), angle.sin());

        for start in (0..n).step_by(len) {
            let mut w = Complex::new(1.0, 0.0);
            for k in 0..len / 2 {
                let even = data[start + k];
                let odd = data[start + k + len / 2].mul(w);
                data[start + k] = even.add(odd);
                data[start + k + len / 2] = even.sub(odd);
                w = w.mul(wlen);
            }
        }

        len <<= 1;
    }
}

/// Largest power of two not exceeding `len`, or 0 for an empty window.
fn largest_power_of_two(len: usize) -> usize {
    if len == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - len.leading_zeros())
    }
}

/// Compute the magnitude spectrum of a window.
///
/// Only the newest `n` samples contribute, where `n` is the largest power
/// of two not exceeding the window length; `n` bins come back. An empty
/// window yields an empty spectrum.
pub fn magnitude_spectrum(window: &[i64]) -> Vec<i64> {
    let n = largest_power_of_two(window.len());
    if n == 0 {
        return Vec::new();
    }

    let tail = &window[window.len() - n..];
    let mut data: Vec<Complex> = tail
        .iter()
        .map(|&v| Complex::new(v as f64, 0.0))
        .collect();

    fft_in_place(&mut data);

    let scale = n as f64;
    data.iter()
        .map(|c| (2.0 * c.magnitude() / scale) as i64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_yields_empty_spectrum() {
        assert!(magnitude_spectrum(&[]).is_empty());
    }

    #[test]
    fn test_single_sample() {
        // One sample: bin 0 is 2 * |x| / 1.
        assert_eq!(magnitude_spectrum(&[5]), vec![10]);
    }

    #[test]
    fn test_power_of_two_window_yields_one_bin_per_sample() {
        let spectrum = magnitude_spectrum(&[1, 2, 3, 4]);
        assert_eq!(spectrum.len(), 4);
    }

    #[test]
    fn test_non_power_of_two_uses_newest_suffix() {
        // Length 5: only the last 4 samples contribute. Prepending a
        // sample must not change the result.
        let base = magnitude_spectrum(&[10, 20, 30, 40]);
        let shifted = magnitude_spectrum(&[999, 10, 20, 30, 40]);
        assert_eq!(shifted, base);
        assert_eq!(shifted.len(), 4);
    }

    #[test]
    fn test_dc_bin_of_constant_signal() {
        // Constant c over n samples: X[0] = n*c, bin 0 = 2*c, the rest 0.
        let spectrum = magnitude_spectrum(&[7, 7, 7, 7, 7, 7, 7, 7]);
        assert_eq!(spectrum[0], 14);
        assert!(spectrum[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pure_tone_concentrates_in_matching_bins() {
        // One full cycle of a +/-100 square-ish alternation over 8 samples
        // puts all energy away from DC.
        let signal = [100, -100, 100, -100, 100, -100, 100, -100];
        let spectrum = magnitude_spectrum(&signal);
        assert_eq!(spectrum[0], 0);
        // Nyquist bin carries the alternation: |X[4]| = 800, scaled to 200.
        assert_eq!(spectrum[4], 200);
    }

    #[test]
    fn test_fft_linearity_in_dc() {
        let a = magnitude_spectrum(&[1, 1, 1, 1]);
        let b = magnitude_spectrum(&[3, 3, 3, 3]);
        assert_eq!(a[0] * 3, b[0]);
    }

    #[test]
    fn test_largest_power_of_two() {
        assert_eq!(largest_power_of_two(0), 0);
        assert_eq!(largest_power_of_two(1), 1);
        assert_eq!(largest_power_of_two(2), 2);
        assert_eq!(largest_power_of_two(3), 2);
        assert_eq!(largest_power_of_two(1023), 512);
        assert_eq!(largest_power_of_two(1024), 1024);
        assert_eq!(largest_power_of_two(1_000_000), 524_288);
    }
}
