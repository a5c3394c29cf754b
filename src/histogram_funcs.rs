// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

/// Largest magnitude a 3x3 Laplacian response of u8 data can take.
pub const LAPLACIAN_RANGE: i32 = 4 * 255;

/// Moments of the values summarized by a histogram whose bin `h` counts
/// occurrences of the value `h`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct HistogramMoments {
    pub count: u64,
    pub mean: f64,
    /// Population variance.
    pub variance: f64,
}

pub fn histogram_moments(histogram: &[u32]) -> HistogramMoments {
    let count: u64 = histogram.iter().map(|&c| c as u64).sum();
    if count == 0 {
        return HistogramMoments::default();
    }
    let first_moment: f64 = histogram.iter().enumerate()
        .map(|(h, &c)| h as f64 * c as f64).sum();
    let mean = first_moment / count as f64;
    let second_moment: f64 = histogram.iter().enumerate()
        .map(|(h, &c)| {
            let d = h as f64 - mean;
            c as f64 * d * d
        }).sum();
    HistogramMoments{count, mean, variance: second_moment / count as f64}
}

/// Histograms Laplacian filter responses. Bin `h` counts the responses equal
/// to `h - LAPLACIAN_RANGE`; out of range values are clamped to the end bins.
pub fn laplacian_histogram<I>(responses: I) -> Vec<u32>
where I: IntoIterator<Item = i16>
{
    let mut histogram = vec![0_u32; (2 * LAPLACIAN_RANGE + 1) as usize];
    for response in responses {
        let bin = (response as i32).clamp(-LAPLACIAN_RANGE, LAPLACIAN_RANGE)
            + LAPLACIAN_RANGE;
        histogram[bin as usize] += 1;
    }
    histogram
}

/// Population variance of the values summarized by `histogram`. Shifting all
/// bins by a constant offset does not change the variance, so this works
/// directly on [laplacian_histogram()] output.
pub fn variance_of_histogram(histogram: &[u32]) -> f64 {
    histogram_moments(histogram).variance
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use crate::histogram_funcs::{histogram_moments, laplacian_histogram,
                                 variance_of_histogram, HistogramMoments,
                                 LAPLACIAN_RANGE};

    #[test]
    fn test_histogram_moments() {
        let mut histogram = [0_u32; 64];
        histogram[10] = 2;
        histogram[20] = 2;
        let moments = histogram_moments(&histogram);
        assert_eq!(moments.count, 4);
        assert_abs_diff_eq!(moments.mean, 15.0);
        assert_abs_diff_eq!(moments.variance, 25.0);

        assert_eq!(histogram_moments(&[0_u32; 16]), HistogramMoments::default());
    }

    #[test]
    fn test_laplacian_histogram() {
        let histogram = laplacian_histogram(vec![-4_i16, 0, 0, 4, 2000]);
        let zero_bin = LAPLACIAN_RANGE as usize;
        assert_eq!(histogram[zero_bin], 2);
        assert_eq!(histogram[zero_bin - 4], 1);
        assert_eq!(histogram[zero_bin + 4], 1);
        // Clamped into the top bin.
        assert_eq!(histogram[2 * zero_bin], 1);
    }

    #[test]
    fn test_variance_of_histogram() {
        // Values -2, 2, -2, 2: mean 0, variance 4.
        let histogram = laplacian_histogram(vec![-2_i16, 2, -2, 2]);
        assert_abs_diff_eq!(variance_of_histogram(&histogram), 4.0,
                            epsilon = 1e-9);
        // A constant response has no variance.
        let flat = laplacian_histogram(vec![7_i16; 10]);
        assert_abs_diff_eq!(variance_of_histogram(&flat), 0.0, epsilon = 1e-9);
    }
}  // mod tests.
