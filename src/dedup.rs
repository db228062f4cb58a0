//! Deduplication engine: collapse rows sharing a track name into one row.
//!
//! The same song shows up once per album, compilation and re-release it
//! appears on. Reconciliation runs in two steps:
//!
//! 1. **Partition** rows by name into an ordered map of name -> rows. Names
//!    seen once, and rows without a name, pass through untouched.
//! 2. **Reduce** every duplicate group to exactly one row with a
//!    [`ReconcilePolicy`]:
//!    - [`HighestPopularity`] keeps the most popular release (general-info stream)
//!    - [`OutlierFilteredMean`] drops within-group outliers and averages the
//!      rest (audio-feature stream)
//!
//! Output holds one row per name in order of each name's first occurrence.

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::models::{AudioFeatures, FeatureRow, TrackRow};
use crate::scoring::{mean_features, score_outliers, Deviation};

// ============================================================================
// Row Capabilities
// ============================================================================

/// Row carrying the reconciliation key.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// Row that can be ranked by popularity. `None` ranks below every value.
pub trait Ranked: Keyed {
    fn popularity(&self) -> Option<u32>;
}

/// Row holding numeric audio features that can be averaged.
pub trait FeatureVector: Keyed {
    fn features(&self) -> &AudioFeatures;

    /// Build the single representative row of a group from averaged features.
    fn from_mean(key: &str, features: AudioFeatures) -> Self;
}

impl Keyed for TrackRow {
    fn key(&self) -> &str {
        &self.name
    }
}

impl Ranked for TrackRow {
    fn popularity(&self) -> Option<u32> {
        self.popularity
    }
}

impl Keyed for FeatureRow {
    fn key(&self) -> &str {
        &self.name
    }
}

impl FeatureVector for FeatureRow {
    fn features(&self) -> &AudioFeatures {
        &self.features
    }

    fn from_mean(key: &str, features: AudioFeatures) -> Self {
        FeatureRow::averaged(key, features)
    }
}

// ============================================================================
// Partition
// ============================================================================

/// Two or more rows sharing one name, in input order.
#[derive(Debug, Clone)]
pub struct DuplicateGroup<R> {
    position: usize,
    key: String,
    first: R,
    rest: Vec<R>,
}

impl<R> DuplicateGroup<R> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Rank of the name's first occurrence among all partitioned names.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        1 + self.rest.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        std::iter::once(&self.first).chain(self.rest.iter())
    }

    /// Split into the first-seen row and the remaining rows.
    pub fn into_rows(self) -> (R, Vec<R>) {
        (self.first, self.rest)
    }
}

/// Rows split into pass-through rows and duplicate groups.
///
/// Pass-through rows are paired with their first-occurrence rank so both
/// halves can be merged back in input order.
#[derive(Debug)]
pub struct Partition<R> {
    pub unique: Vec<(usize, R)>,
    pub duplicates: Vec<DuplicateGroup<R>>,
}

/// Group rows by name, preserving first-occurrence order.
///
/// Rows with an empty name share no identity and are never grouped.
pub fn partition<R: Keyed>(rows: Vec<R>) -> Partition<R> {
    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    let mut buckets: Vec<Vec<R>> = Vec::new();

    for row in rows {
        if !row.key().is_empty() {
            if let Some(&i) = index.get(row.key()) {
                buckets[i].push(row);
                continue;
            }
            index.insert(row.key().to_string(), buckets.len());
        }
        buckets.push(vec![row]);
    }

    let mut unique = Vec::new();
    let mut duplicates = Vec::new();
    for (position, bucket) in buckets.into_iter().enumerate() {
        let mut rows = bucket.into_iter();
        let Some(first) = rows.next() else {
            continue;
        };
        let rest: Vec<R> = rows.collect();
        if rest.is_empty() {
            unique.push((position, first));
        } else {
            duplicates.push(DuplicateGroup {
                position,
                key: first.key().to_string(),
                first,
                rest,
            });
        }
    }

    Partition { unique, duplicates }
}

// ============================================================================
// Policies
// ============================================================================

/// Result of reducing one duplicate group.
#[derive(Debug, Clone)]
pub struct Reduction<R> {
    pub row: R,
    /// Rows that did not contribute to the output row.
    pub discarded: usize,
    /// The policy could not select any row and used the whole group instead.
    pub fallback: bool,
}

/// Strategy collapsing a duplicate group into one row.
pub trait ReconcilePolicy<R>: Sync {
    fn label(&self) -> &'static str;

    fn reduce(&self, group: DuplicateGroup<R>) -> Reduction<R>;
}

/// Keep the row with the highest popularity.
///
/// Equivalent to a stable sort by descending popularity followed by taking
/// the first row: among tied maxima the earliest row wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct HighestPopularity;

impl<R: Ranked> ReconcilePolicy<R> for HighestPopularity {
    fn label(&self) -> &'static str {
        "highest_popularity"
    }

    fn reduce(&self, group: DuplicateGroup<R>) -> Reduction<R> {
        let discarded = group.len() - 1;
        let (first, rest) = group.into_rows();

        let mut best = first;
        for row in rest {
            if row.popularity() > best.popularity() {
                best = row;
            }
        }

        Reduction {
            row: best,
            discarded,
            fallback: false,
        }
    }
}

/// Drop rows that are outliers within their group, then average the rest.
///
/// Each populated feature column is standardized within the group. A row is
/// kept when at most half the populated columns (rounded down) have
/// |z| > `z_cutoff`. If no row survives, the whole group is averaged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierFilteredMean {
    pub z_cutoff: f64,
    pub deviation: Deviation,
}

impl Default for OutlierFilteredMean {
    fn default() -> Self {
        Self {
            z_cutoff: 1.0,
            deviation: Deviation::Sample,
        }
    }
}

impl<R: FeatureVector> ReconcilePolicy<R> for OutlierFilteredMean {
    fn label(&self) -> &'static str {
        "outlier_filtered_mean"
    }

    fn reduce(&self, group: DuplicateGroup<R>) -> Reduction<R> {
        let rows: Vec<&AudioFeatures> = group.iter().map(|r| r.features()).collect();
        let scores = score_outliers(&rows, self.z_cutoff, self.deviation);

        let kept: Vec<&AudioFeatures> = rows
            .iter()
            .enumerate()
            .filter(|(i, _)| scores.keeps(*i))
            .map(|(_, r)| *r)
            .collect();

        let (features, discarded, fallback) = if kept.is_empty() {
            warn!(
                "All {} rows of '{}' are outliers; averaging the full group",
                rows.len(),
                group.key()
            );
            (mean_features(&rows), 0, true)
        } else {
            (mean_features(&kept), rows.len() - kept.len(), false)
        };

        debug!(
            "'{}': {}/{} rows within threshold {} of {} columns",
            group.key(),
            scores.kept_count(),
            rows.len(),
            scores.threshold,
            scores.populated_columns
        );

        Reduction {
            row: R::from_mean(group.key(), features),
            discarded,
            fallback,
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Per-stream reconciliation counters.
#[derive(Default, Debug, Clone, Serialize)]
pub struct ReconcileStats {
    pub policy: &'static str,
    pub input_rows: usize,
    pub output_rows: usize,
    pub unique_names: usize,
    /// Rows with an empty name; passed through without grouping.
    pub unnamed_rows: usize,
    pub duplicate_groups: usize,
    pub duplicate_rows: usize,
    pub rows_discarded: usize,
    pub fallback_groups: usize,
    /// Names whose group fell back to the full-group mean.
    pub fallback_names: Vec<String>,
}

/// Reconciled rows: exactly one per distinct input name.
#[derive(Debug)]
pub struct Reconciled<R> {
    pub rows: Vec<R>,
    pub stats: ReconcileStats,
}

/// Reduce `rows` to one row per name using `policy`.
///
/// Duplicate groups are independent and reduced in parallel; every output
/// row takes the slot of its name's first occurrence in `rows`.
pub fn reconcile<R, P>(rows: Vec<R>, policy: &P) -> Reconciled<R>
where
    R: Keyed + Send,
    P: ReconcilePolicy<R>,
{
    let input_rows = rows.len();
    let unnamed_rows = rows.iter().filter(|r| r.key().is_empty()).count();
    let Partition { unique, duplicates } = partition(rows);

    if unnamed_rows > 0 {
        warn!("{} rows have no name and were left ungrouped", unnamed_rows);
    }

    let mut stats = ReconcileStats {
        policy: policy.label(),
        input_rows,
        unique_names: unique.len() - unnamed_rows,
        unnamed_rows,
        duplicate_groups: duplicates.len(),
        duplicate_rows: duplicates.iter().map(DuplicateGroup::len).sum(),
        ..Default::default()
    };

    let reductions: Vec<(usize, Reduction<R>)> = duplicates
        .into_par_iter()
        .map(|group| (group.position(), policy.reduce(group)))
        .collect();

    let mut slots = unique;
    slots.reserve(reductions.len());
    for (position, reduction) in reductions {
        stats.rows_discarded += reduction.discarded;
        if reduction.fallback {
            stats.fallback_groups += 1;
            stats.fallback_names.push(reduction.row.key().to_string());
        }
        slots.push((position, reduction.row));
    }
    slots.sort_unstable_by_key(|(position, _)| *position);

    let out: Vec<R> = slots.into_iter().map(|(_, row)| row).collect();
    stats.output_rows = out.len();

    info!(
        "Reconciled {} rows into {} names with {} ({} duplicate groups, {} rows discarded)",
        stats.input_rows,
        stats.output_rows,
        stats.policy,
        stats.duplicate_groups,
        stats.rows_discarded
    );

    Reconciled { rows: out, stats }
}
