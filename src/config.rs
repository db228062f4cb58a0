//! Fetch and reconciliation settings.

use serde::{Deserialize, Serialize};

use crate::dedup::OutlierFilteredMean;
use crate::error::{CatalogError, Result};
use crate::scoring::Deviation;

/// Page sizes and limits for talking to the metadata source.
///
/// Defaults match the limits of the public metadata API: 50 tracks and 100
/// audio-feature entries per batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Artist search results to inspect for an exact name match.
    pub search_limit: usize,
    /// Top tracks kept for the artist.
    pub top_tracks_limit: usize,
    pub album_page_size: usize,
    pub album_track_page_size: usize,
    /// IDs per general track-info request.
    pub track_page_size: usize,
    /// IDs per audio-feature request.
    pub feature_page_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            search_limit: 5,
            top_tracks_limit: 10,
            album_page_size: 20,
            album_track_page_size: 50,
            track_page_size: 50,
            feature_page_size: 100,
        }
    }
}

impl FetchConfig {
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("search_limit", self.search_limit),
            ("album_page_size", self.album_page_size),
            ("album_track_page_size", self.album_track_page_size),
            ("track_page_size", self.track_page_size),
            ("feature_page_size", self.feature_page_size),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(CatalogError::Config(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}

/// Settings for the audio-feature reconciliation policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// A standardized value counts as an outlier when |z| exceeds this.
    pub z_cutoff: f64,
    pub deviation: Deviation,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        let policy = OutlierFilteredMean::default();
        Self {
            z_cutoff: policy.z_cutoff,
            deviation: policy.deviation,
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.z_cutoff.is_finite() || self.z_cutoff < 0.0 {
            return Err(CatalogError::Config(format!(
                "z_cutoff must be a non-negative number, got {}",
                self.z_cutoff
            )));
        }
        Ok(())
    }

    pub fn policy(&self) -> OutlierFilteredMean {
        OutlierFilteredMean {
            z_cutoff: self.z_cutoff,
            deviation: self.deviation,
        }
    }
}

/// Everything a catalog build needs besides the source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub fetch: FetchConfig,
    pub reconcile: ReconcileConfig,
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        self.fetch.validate()?;
        self.reconcile.validate()
    }
}
