//! Pairwise clock-skew matrix

use serde::Serialize;

/// Largest entry of a [`SkewMatrix`] and where it sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaxSkew {
    pub value: i64,
    pub row: usize,
    pub col: usize,
}

/// N×N matrix of signed sample differences
///
/// Entry `(i, j)` is `samples[i] - samples[j]` in nanoseconds, so the diagonal
/// is zero and `(i, j) == -(j, i)`. Differences use wrapping arithmetic, which
/// keeps antisymmetry even for samples at the ends of the `i64` range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkewMatrix {
    samples: Vec<i64>,
    cells: Vec<i64>,
    max: Option<MaxSkew>,
}

impl SkewMatrix {
    /// Build the full matrix from rank-ordered samples
    ///
    /// The maximum is tracked during the row-major fill; ties keep the first
    /// entry encountered.
    pub fn from_samples(samples: &[i64]) -> Self {
        let n = samples.len();
        let mut cells = Vec::with_capacity(n * n);
        let mut max: Option<MaxSkew> = None;

        for (row, &a) in samples.iter().enumerate() {
            for (col, &b) in samples.iter().enumerate() {
                let value = a.wrapping_sub(b);
                cells.push(value);
                if max.map_or(true, |m| value > m.value) {
                    max = Some(MaxSkew { value, row, col });
                }
            }
        }

        Self {
            samples: samples.to_vec(),
            cells,
            max,
        }
    }

    /// Number of participants
    pub fn size(&self) -> usize {
        self.samples.len()
    }

    /// Samples the matrix was built from, by rank
    pub fn samples(&self) -> &[i64] {
        &self.samples
    }

    /// Entry `(row, col)`; panics if out of range
    pub fn get(&self, row: usize, col: usize) -> i64 {
        assert!(row < self.size() && col < self.size(), "skew matrix index out of range");
        self.cells[row * self.size() + col]
    }

    pub fn row(&self, row: usize) -> &[i64] {
        let n = self.size();
        &self.cells[row * n..(row + 1) * n]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[i64]> {
        // chunks(0) panics; an empty matrix has no rows
        self.cells.chunks(self.size().max(1))
    }

    /// Largest entry; `None` for an empty matrix
    pub fn max(&self) -> Option<MaxSkew> {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_participant_scenario() {
        let matrix = SkewMatrix::from_samples(&[1000, 1500, 700]);
        assert_eq!(matrix.size(), 3);
        assert_eq!(matrix.row(0), &[0, -500, 300]);
        assert_eq!(matrix.row(1), &[500, 0, 800]);
        assert_eq!(matrix.row(2), &[-300, -800, 0]);
        assert_eq!(matrix.max(), Some(MaxSkew { value: 800, row: 1, col: 2 }));
    }

    #[test]
    fn test_antisymmetric_with_zero_diagonal() {
        let samples = [
            1_700_000_000_123_456_789,
            1_700_000_000_123_400_000,
            1_699_999_999_999_999_999,
            1_700_000_001_000_000_000,
            -5,
        ];
        let matrix = SkewMatrix::from_samples(&samples);
        for i in 0..samples.len() {
            assert_eq!(matrix.get(i, i), 0);
            for j in 0..samples.len() {
                assert_eq!(matrix.get(i, j), matrix.get(j, i).wrapping_neg());
            }
        }
    }

    #[test]
    fn test_max_matches_brute_force() {
        let samples = [42, -17, 99, 3, 99, -100];
        let matrix = SkewMatrix::from_samples(&samples);
        let expected = samples
            .iter()
            .flat_map(|a| samples.iter().map(move |b| a - b))
            .max()
            .unwrap();
        assert_eq!(matrix.max().unwrap().value, expected);
    }

    #[test]
    fn test_ties_keep_first_entry() {
        // (2, 1) and (2, 3) both equal 10; row-major order reaches (2, 1) first
        let matrix = SkewMatrix::from_samples(&[5, 0, 10, 0]);
        assert_eq!(matrix.max(), Some(MaxSkew { value: 10, row: 2, col: 1 }));

        let equal = SkewMatrix::from_samples(&[7, 7, 7]);
        assert_eq!(equal.max(), Some(MaxSkew { value: 0, row: 0, col: 0 }));
    }

    #[test]
    fn test_extreme_samples_wrap() {
        let matrix = SkewMatrix::from_samples(&[i64::MAX, i64::MIN]);
        assert_eq!(matrix.get(0, 1), i64::MAX.wrapping_sub(i64::MIN));
        assert_eq!(matrix.get(1, 0), matrix.get(0, 1).wrapping_neg());
    }

    #[test]
    fn test_rows_iterator() {
        let matrix = SkewMatrix::from_samples(&[1, 2]);
        let rows: Vec<&[i64]> = matrix.rows().collect();
        assert_eq!(rows, vec![&[0, -1][..], &[1, 0][..]]);
        assert_eq!(SkewMatrix::from_samples(&[]).rows().count(), 0);
        assert!(SkewMatrix::from_samples(&[]).max().is_none());
    }
}
