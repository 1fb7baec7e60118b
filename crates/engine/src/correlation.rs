use crate::parallel;
use crate::progress::Progress;

/// All-pairs Pearson correlation across a set of rows, population formulas
/// throughout (mean and standard deviation divide by the sample count, not
/// n - 1). Returns a row-major n x n matrix. The diagonal is written as
/// exactly 1.0 by construction, never computed, and any row with zero
/// population standard deviation correlates 0 with everything.
pub fn correlation_matrix(
    rows: &[&[f32]],
    parallel: bool,
    progress: Option<&Progress>,
) -> Vec<f32> {
    let n = rows.len();
    if n == 0 {
        return Vec::new();
    }
    let samples = rows[0].len();

    // Center each row once; the pair loop is then a dot product.
    let mut centered: Vec<Vec<f32>> = Vec::with_capacity(n);
    let mut stddevs: Vec<f32> = Vec::with_capacity(n);
    for row in rows {
        let mean = if samples > 0 {
            row.iter().sum::<f32>() / samples as f32
        } else {
            0.0
        };
        let deltas: Vec<f32> = row.iter().map(|v| v - mean).collect();
        let variance = if samples > 0 {
            deltas.iter().map(|d| d * d).sum::<f32>() / samples as f32
        } else {
            0.0
        };
        centered.push(deltas);
        stddevs.push(variance.sqrt());
    }

    // Upper-triangle rows shrink as the row index grows, so the parallel
    // dispatch relies on work stealing rather than static chunks.
    let upper: Vec<Vec<f32>> = parallel::map_indices(n, parallel, |j| {
        let row_j = &centered[j];
        let std_j = stddevs[j];
        let mut out = Vec::with_capacity(n - j - 1);
        for k in j + 1..n {
            let std_k = stddevs[k];
            if std_j <= 0.0 || std_k <= 0.0 || samples == 0 {
                out.push(0.0);
                continue;
            }
            let mut dot = 0.0f64;
            for (a, b) in row_j.iter().zip(&centered[k]) {
                dot += (*a as f64) * (*b as f64);
            }
            let covariance = dot / samples as f64;
            out.push((covariance / (std_j as f64 * std_k as f64)) as f32);
        }
        if let Some(progress) = progress {
            progress.advance(1);
        }
        out
    });

    let mut matrix = vec![0.0f32; n * n];
    for j in 0..n {
        matrix[j * n + j] = 1.0;
        for (offset, value) in upper[j].iter().enumerate() {
            let k = j + 1 + offset;
            matrix[j * n + k] = *value;
            matrix[k * n + j] = *value;
        }
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random(seed: u64, len: usize) -> Vec<f32> {
        // Small xorshift; deterministic and uncorrelated across seeds.
        let mut state = seed.max(1);
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state % 10_000) as f32 / 10_000.0
            })
            .collect()
    }

    #[test]
    fn diagonal_is_exactly_one() {
        let a = pseudo_random(7, 50);
        let b = pseudo_random(99, 50);
        let matrix = correlation_matrix(&[&a, &b], false, None);
        assert_eq!(matrix[0], 1.0);
        assert_eq!(matrix[3], 1.0);
    }

    #[test]
    fn matrix_is_symmetric() {
        let a = pseudo_random(1, 80);
        let b = pseudo_random(2, 80);
        let c = pseudo_random(3, 80);
        let matrix = correlation_matrix(&[&a, &b, &c], false, None);
        for j in 0..3 {
            for k in 0..3 {
                assert_eq!(matrix[j * 3 + k], matrix[k * 3 + j]);
            }
        }
    }

    #[test]
    fn identical_rows_correlate_at_one() {
        let a = pseudo_random(11, 60);
        let matrix = correlation_matrix(&[&a, &a], false, None);
        assert!((matrix[1] - 1.0).abs() < 1.0e-4);
    }

    #[test]
    fn negated_row_correlates_at_minus_one() {
        let a = pseudo_random(11, 60);
        let b: Vec<f32> = a.iter().map(|v| -v).collect();
        let matrix = correlation_matrix(&[&a, &b], false, None);
        assert!((matrix[1] + 1.0).abs() < 1.0e-4);
    }

    #[test]
    fn uncorrelated_rows_stay_near_zero() {
        let a = pseudo_random(101, 200);
        let b = pseudo_random(50_223, 200);
        let matrix = correlation_matrix(&[&a, &b], false, None);
        assert!(matrix[1].abs() < 0.3, "r = {}", matrix[1]);
    }

    #[test]
    fn constant_row_correlates_at_zero() {
        let a = pseudo_random(5, 40);
        let b = vec![2.0f32; 40];
        let matrix = correlation_matrix(&[&a, &b], false, None);
        assert_eq!(matrix[1], 0.0);
        // The degenerate row still gets the constructed unit diagonal.
        assert_eq!(matrix[3], 1.0);
    }

    #[test]
    fn parallel_matches_sequential() {
        let rows: Vec<Vec<f32>> = (0..12).map(|i| pseudo_random(i + 1, 64)).collect();
        let refs: Vec<&[f32]> = rows.iter().map(Vec::as_slice).collect();
        let sequential = correlation_matrix(&refs, false, None);
        let parallel = correlation_matrix(&refs, true, None);
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn progress_counts_every_row() {
        let rows: Vec<Vec<f32>> = (0..8).map(|i| pseudo_random(i + 1, 32)).collect();
        let refs: Vec<&[f32]> = rows.iter().map(Vec::as_slice).collect();
        let progress = Progress::new("correlation", refs.len(), None);
        correlation_matrix(&refs, true, Some(&progress));
        assert_eq!(progress.completed(), 8);
    }
}
