//! Column statistics for outlier-filtered averaging.
//!
//! This module contains the numeric pieces of the reconciliation policy that
//! averages audio features:
//! - Mean and standard deviation over the present values of a column
//! - Z-score standardization within one duplicate group
//! - Per-row outlier counts and the keep/discard threshold

use log::trace;
use serde::{Deserialize, Serialize};

use crate::models::{AudioFeatures, FeatureColumn};

// ============================================================================
// Deviation
// ============================================================================

/// Denominator used for the standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deviation {
    /// n - 1 (Bessel-corrected); undefined below two values.
    #[default]
    Sample,
    /// n
    Population,
}

/// Mean and standard deviation of one column within a group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub mean: f64,
    /// `None` when fewer values exist than the deviation needs.
    pub std_dev: Option<f64>,
}

impl ColumnStats {
    /// Standardized value. Zero when the column has no spread, so a
    /// constant column never marks anything as an outlier.
    pub fn z_score(&self, value: f64) -> f64 {
        match self.std_dev {
            Some(sd) if sd > 0.0 && sd.is_finite() => (value - self.mean) / sd,
            _ => 0.0,
        }
    }
}

/// Statistics over the present values, or `None` if the column is empty.
pub fn column_stats(values: &[f64], deviation: Deviation) -> Option<ColumnStats> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let denominator = match deviation {
        Deviation::Sample => n - 1.0,
        Deviation::Population => n,
    };

    // Summing equal values can drift off the value itself; pin both to exact.
    let first = values[0];
    if values.iter().all(|&v| v == first) {
        return Some(ColumnStats {
            mean: first,
            std_dev: (denominator > 0.0).then_some(0.0),
        });
    }

    let mean = values.iter().sum::<f64>() / n;
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    let std_dev = (denominator > 0.0).then(|| (squares / denominator).sqrt());

    Some(ColumnStats { mean, std_dev })
}

// ============================================================================
// Outlier Detection
// ============================================================================

/// Outcome of scoring one duplicate group.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierScores {
    /// Columns holding at least one value in the group.
    pub populated_columns: usize,
    /// Rows may have at most this many outlying values to be kept.
    pub threshold: usize,
    /// Outlying value count per row, in input order.
    pub outlier_counts: Vec<usize>,
}

impl OutlierScores {
    pub fn keeps(&self, row: usize) -> bool {
        self.outlier_counts[row] <= self.threshold
    }

    pub fn kept_count(&self) -> usize {
        (0..self.outlier_counts.len())
            .filter(|&row| self.keeps(row))
            .count()
    }
}

/// Standardize every populated column within `rows` and count, per row, the
/// values whose |z| exceeds `z_cutoff`. Missing values never count.
///
/// The threshold is half the populated column count, rounded down.
pub fn score_outliers(rows: &[&AudioFeatures], z_cutoff: f64, deviation: Deviation) -> OutlierScores {
    let mut outlier_counts = vec![0usize; rows.len()];
    let mut populated_columns = 0;

    for column in FeatureColumn::ALL {
        let values: Vec<f64> = rows.iter().filter_map(|r| r.get(column)).collect();
        let Some(stats) = column_stats(&values, deviation) else {
            continue;
        };
        populated_columns += 1;
        trace!(
            "{}: mean {:.4}, std {:?} over {} values",
            column.as_str(),
            stats.mean,
            stats.std_dev,
            values.len()
        );

        for (count, row) in outlier_counts.iter_mut().zip(rows) {
            if let Some(value) = row.get(column) {
                if stats.z_score(value).abs() > z_cutoff {
                    *count += 1;
                }
            }
        }
    }

    OutlierScores {
        populated_columns,
        threshold: populated_columns / 2,
        outlier_counts,
    }
}

/// Column-wise arithmetic mean over `rows`, skipping missing values.
pub fn mean_features(rows: &[&AudioFeatures]) -> AudioFeatures {
    let mut out = AudioFeatures::default();
    for column in FeatureColumn::ALL {
        let values: Vec<f64> = rows.iter().filter_map(|r| r.get(column)).collect();
        let mean = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
        out.set(column, mean);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn energy(values: &[Option<f64>]) -> Vec<AudioFeatures> {
        values
            .iter()
            .map(|&v| AudioFeatures {
                energy: v,
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_column_stats_sample_and_population() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let pop = column_stats(&values, Deviation::Population).unwrap();
        assert_eq!(pop.mean, 5.0);
        assert_eq!(pop.std_dev, Some(2.0));

        let sample = column_stats(&values, Deviation::Sample).unwrap();
        let expected = (32.0f64 / 7.0).sqrt();
        assert!((sample.std_dev.unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_column_stats_empty_and_single() {
        assert!(column_stats(&[], Deviation::Sample).is_none());

        let single = column_stats(&[3.0], Deviation::Sample).unwrap();
        assert_eq!(single.mean, 3.0);
        assert!(single.std_dev.is_none());
        assert_eq!(single.z_score(10.0), 0.0);

        let single_pop = column_stats(&[3.0], Deviation::Population).unwrap();
        assert_eq!(single_pop.std_dev, Some(0.0));
    }

    #[test]
    fn test_constant_column_has_zero_z() {
        let stats = column_stats(&[0.4, 0.4, 0.4], Deviation::Sample).unwrap();
        assert_eq!(stats.mean, 0.4);
        assert_eq!(stats.std_dev, Some(0.0));
        assert_eq!(stats.z_score(0.4), 0.0);

        for deviation in [Deviation::Sample, Deviation::Population] {
            for n in 2..6 {
                let values = vec![0.1; n];
                let stats = column_stats(&values, deviation).unwrap();
                assert_eq!(stats.z_score(0.1), 0.0, "n = {}", n);
            }
        }
    }

    #[test]
    fn test_constant_group_has_no_outliers() {
        let rows = energy(&[Some(0.7), Some(0.7), Some(0.7), Some(0.7)]);
        let refs: Vec<&AudioFeatures> = rows.iter().collect();
        let scores = score_outliers(&refs, 0.0, Deviation::Population);
        assert_eq!(scores.outlier_counts, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_single_column_outlier_is_flagged() {
        let rows = energy(&[Some(0.0), Some(0.0), Some(10.0)]);
        let refs: Vec<&AudioFeatures> = rows.iter().collect();
        let scores = score_outliers(&refs, 1.0, Deviation::Sample);

        assert_eq!(scores.populated_columns, 1);
        assert_eq!(scores.threshold, 0);
        assert_eq!(scores.outlier_counts, vec![0, 0, 1]);
        assert!(scores.keeps(0));
        assert!(!scores.keeps(2));
        assert_eq!(scores.kept_count(), 2);
    }

    #[test]
    fn test_missing_values_never_count() {
        let rows = energy(&[Some(0.0), None, Some(0.0), Some(10.0)]);
        let refs: Vec<&AudioFeatures> = rows.iter().collect();
        let scores = score_outliers(&refs, 1.0, Deviation::Sample);
        assert_eq!(scores.outlier_counts, vec![0, 0, 0, 1]);
    }

    #[test]
    fn test_two_rows_sample_deviation_never_exceeds_one() {
        // With two samples every |z| is 1/sqrt(2).
        let rows = energy(&[Some(0.1), Some(0.9)]);
        let refs: Vec<&AudioFeatures> = rows.iter().collect();
        let scores = score_outliers(&refs, 1.0, Deviation::Sample);
        assert_eq!(scores.outlier_counts, vec![0, 0]);
    }

    #[test]
    fn test_threshold_is_half_of_populated_columns() {
        let rows: Vec<AudioFeatures> = (0..3)
            .map(|i| AudioFeatures {
                energy: Some(i as f64),
                valence: Some(i as f64),
                tempo: Some(100.0 + i as f64),
                ..Default::default()
            })
            .collect();
        let refs: Vec<&AudioFeatures> = rows.iter().collect();
        let scores = score_outliers(&refs, 1.0, Deviation::Sample);
        assert_eq!(scores.populated_columns, 3);
        assert_eq!(scores.threshold, 1);
    }

    #[test]
    fn test_mean_features_skips_missing() {
        let rows = vec![
            AudioFeatures {
                energy: Some(0.2),
                tempo: Some(120.0),
                ..Default::default()
            },
            AudioFeatures {
                energy: Some(0.4),
                ..Default::default()
            },
        ];
        let refs: Vec<&AudioFeatures> = rows.iter().collect();
        let mean = mean_features(&refs);
        assert!((mean.energy.unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(mean.tempo, Some(120.0));
        assert!(mean.valence.is_none());
    }
}
