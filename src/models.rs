//! Core data models for catalog building.
//!
//! Raw records mirror the payloads returned by the metadata API. Every field is
//! defaulted so a sparse or partially-null payload still decodes; the
//! normalizer decides what an absent field means. Normalized rows are the
//! flat tables handed to the deduplication engine and downstream consumers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Raw API Records
// ============================================================================

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawFollowers {
    pub total: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RawImage {
    pub url: String,
    pub height: Option<u32>,
    pub width: Option<u32>,
}

/// Artist as returned by artist search.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawArtist {
    pub id: Option<String>,
    pub name: Option<String>,
    pub followers: RawFollowers,
    pub popularity: Option<u32>,
    pub genres: Vec<String>,
    pub external_urls: RawExternalUrls,
    pub href: Option<String>,
    pub uri: Option<String>,
}

/// Simplified artist embedded in album and track payloads.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawArtistRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub external_urls: RawExternalUrls,
}

/// Album as returned by the artist album listing.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawAlbum {
    pub id: Option<String>,
    pub name: Option<String>,
    pub release_date: Option<String>,
    pub release_date_precision: Option<String>,
    pub total_tracks: Option<u32>,
    pub album_group: Option<String>,
    pub album_type: Option<String>,
    pub artists: Vec<RawArtistRef>,
    pub available_markets: Vec<String>,
    pub external_urls: RawExternalUrls,
    pub href: Option<String>,
    pub images: Vec<RawImage>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub uri: Option<String>,
}

/// Album reference embedded in a full track payload (top tracks need its cover art).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawAlbumRef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub images: Vec<RawImage>,
}

/// Track payload. Album track listings return a simplified form without
/// `popularity`, `external_ids` or `album`; batch lookups return the full form.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawTrack {
    pub id: Option<String>,
    pub name: Option<String>,
    pub popularity: Option<u32>,
    pub artists: Vec<RawArtistRef>,
    pub available_markets: Vec<String>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
    pub explicit: Option<bool>,
    pub external_ids: BTreeMap<String, String>,
    pub external_urls: RawExternalUrls,
    pub href: Option<String>,
    pub is_local: Option<bool>,
    pub preview_url: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub uri: Option<String>,
    pub album: Option<RawAlbumRef>,
}

/// Audio-feature payload. The source returns `null` in place of this object
/// for tracks it has no analysis for; callers see that as `None`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawAudioFeatures {
    pub id: Option<String>,
    pub uri: Option<String>,
    pub track_href: Option<String>,
    pub analysis_url: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<f64>,
    pub loudness: Option<f64>,
    pub mode: Option<f64>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub duration_ms: Option<f64>,
    pub time_signature: Option<f64>,
}

/// One page of an offset-paginated listing.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items across all pages, as reported by the source.
    pub total: usize,
}

// ============================================================================
// Audio Feature Schema
// ============================================================================

/// Numeric audio-feature columns compared and averaged during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureColumn {
    Danceability,
    Energy,
    Key,
    Loudness,
    Mode,
    Speechiness,
    Acousticness,
    Instrumentalness,
    Liveness,
    Valence,
    Tempo,
    DurationMs,
    TimeSignature,
}

impl FeatureColumn {
    pub const ALL: [FeatureColumn; 13] = [
        FeatureColumn::Danceability,
        FeatureColumn::Energy,
        FeatureColumn::Key,
        FeatureColumn::Loudness,
        FeatureColumn::Mode,
        FeatureColumn::Speechiness,
        FeatureColumn::Acousticness,
        FeatureColumn::Instrumentalness,
        FeatureColumn::Liveness,
        FeatureColumn::Valence,
        FeatureColumn::Tempo,
        FeatureColumn::DurationMs,
        FeatureColumn::TimeSignature,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureColumn::Danceability => "danceability",
            FeatureColumn::Energy => "energy",
            FeatureColumn::Key => "key",
            FeatureColumn::Loudness => "loudness",
            FeatureColumn::Mode => "mode",
            FeatureColumn::Speechiness => "speechiness",
            FeatureColumn::Acousticness => "acousticness",
            FeatureColumn::Instrumentalness => "instrumentalness",
            FeatureColumn::Liveness => "liveness",
            FeatureColumn::Valence => "valence",
            FeatureColumn::Tempo => "tempo",
            FeatureColumn::DurationMs => "duration_ms",
            FeatureColumn::TimeSignature => "time_signature",
        }
    }
}

/// Numeric audio features for one track. `None` means the source had no value.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AudioFeatures {
    pub danceability: Option<f64>,
    pub energy: Option<f64>,
    pub key: Option<f64>,
    pub loudness: Option<f64>,
    pub mode: Option<f64>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub valence: Option<f64>,
    pub tempo: Option<f64>,
    pub duration_ms: Option<f64>,
    pub time_signature: Option<f64>,
}

impl AudioFeatures {
    pub fn get(&self, column: FeatureColumn) -> Option<f64> {
        match column {
            FeatureColumn::Danceability => self.danceability,
            FeatureColumn::Energy => self.energy,
            FeatureColumn::Key => self.key,
            FeatureColumn::Loudness => self.loudness,
            FeatureColumn::Mode => self.mode,
            FeatureColumn::Speechiness => self.speechiness,
            FeatureColumn::Acousticness => self.acousticness,
            FeatureColumn::Instrumentalness => self.instrumentalness,
            FeatureColumn::Liveness => self.liveness,
            FeatureColumn::Valence => self.valence,
            FeatureColumn::Tempo => self.tempo,
            FeatureColumn::DurationMs => self.duration_ms,
            FeatureColumn::TimeSignature => self.time_signature,
        }
    }

    pub fn set(&mut self, column: FeatureColumn, value: Option<f64>) {
        let slot = match column {
            FeatureColumn::Danceability => &mut self.danceability,
            FeatureColumn::Energy => &mut self.energy,
            FeatureColumn::Key => &mut self.key,
            FeatureColumn::Loudness => &mut self.loudness,
            FeatureColumn::Mode => &mut self.mode,
            FeatureColumn::Speechiness => &mut self.speechiness,
            FeatureColumn::Acousticness => &mut self.acousticness,
            FeatureColumn::Instrumentalness => &mut self.instrumentalness,
            FeatureColumn::Liveness => &mut self.liveness,
            FeatureColumn::Valence => &mut self.valence,
            FeatureColumn::Tempo => &mut self.tempo,
            FeatureColumn::DurationMs => &mut self.duration_ms,
            FeatureColumn::TimeSignature => &mut self.time_signature,
        };
        *slot = value;
    }

    /// True when the source returned no numeric value at all (a `null` entry).
    pub fn is_empty(&self) -> bool {
        FeatureColumn::ALL.iter().all(|&c| self.get(c).is_none())
    }
}

// ============================================================================
// Normalized Rows
// ============================================================================

/// Artist search result row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArtistInfo {
    pub artist: String,
    pub followers: u64,
    pub popularity: Option<u32>,
    pub genres: Vec<String>,
    pub external_url: Option<String>,
    pub href: Option<String>,
    pub id: Option<String>,
    pub uri: Option<String>,
}

/// One of the artist's top tracks.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopSong {
    pub track: String,
    pub popularity: Option<u32>,
    /// Preview clip URL.
    pub audio: Option<String>,
    /// First (largest) album image URL.
    pub cover_art: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlbumRow {
    pub name: String,
    pub release_date: Option<String>,
    pub release_date_precision: Option<String>,
    pub total_tracks: Option<u32>,
    pub album_group: Option<String>,
    pub album_type: Option<String>,
    /// External profile URL of the album's first credited artist.
    pub artist_url: Option<String>,
    pub available_markets: Vec<String>,
    pub external_url: Option<String>,
    pub href: Option<String>,
    pub id: Option<String>,
    pub images: Vec<RawImage>,
    pub kind: Option<String>,
    pub uri: Option<String>,
}

/// Entry of an album's track listing; its `id` feeds the batch lookups.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackStub {
    pub name: String,
    pub track_number: Option<u32>,
    pub id: Option<String>,
    pub artists: Vec<String>,
    pub available_markets: Vec<String>,
    pub disc_number: Option<u32>,
    pub duration_ms: Option<u64>,
    pub explicit: Option<bool>,
    pub external_url: Option<String>,
    pub href: Option<String>,
    pub is_local: Option<bool>,
    pub preview_url: Option<String>,
    pub kind: Option<String>,
    pub uri: Option<String>,
}

/// General-info row: one per (album, track) pairing before reconciliation.
///
/// `id` differs between releases of the same song; `name` is the
/// reconciliation key and always comes from the album listing. A `null`
/// record from the source yields a row with only `name` populated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrackRow {
    pub name: String,
    /// The record's own name when it differs from the listing name.
    pub title: Option<String>,
    pub id: Option<String>,
    pub popularity: Option<u32>,
    pub artists: Vec<String>,
    pub available_markets: Vec<String>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
    pub explicit: Option<bool>,
    pub external_ids: BTreeMap<String, String>,
    pub external_url: Option<String>,
    pub preview_url: Option<String>,
    pub kind: Option<String>,
    pub uri: Option<String>,
}

/// Audio-feature row. Descriptive fields are dropped (set to `None`) when a
/// duplicate group is averaged into one row.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FeatureRow {
    pub name: String,
    pub kind: Option<String>,
    pub id: Option<String>,
    pub uri: Option<String>,
    pub track_href: Option<String>,
    pub analysis_url: Option<String>,
    pub features: AudioFeatures,
}

impl FeatureRow {
    /// Row built from averaged features; carries only the shared name.
    pub fn averaged(name: &str, features: AudioFeatures) -> Self {
        Self {
            name: name.to_string(),
            kind: None,
            id: None,
            uri: None,
            track_href: None,
            analysis_url: None,
            features,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_track_decodes_sparse_payload() {
        let raw: RawTrack = serde_json::from_str(r#"{"name": "Hysteria", "type": "track"}"#).unwrap();
        assert_eq!(raw.name.as_deref(), Some("Hysteria"));
        assert_eq!(raw.kind.as_deref(), Some("track"));
        assert!(raw.popularity.is_none());
        assert!(raw.artists.is_empty());
    }

    #[test]
    fn test_null_feature_entry_decodes_as_none() {
        let page: Vec<Option<RawAudioFeatures>> =
            serde_json::from_str(r#"[{"id": "a", "energy": 0.5, "key": 7}, null]"#).unwrap();
        assert_eq!(page.len(), 2);
        let first = page[0].as_ref().unwrap();
        assert_eq!(first.energy, Some(0.5));
        assert_eq!(first.key, Some(7.0));
        assert!(page[1].is_none());
    }

    #[test]
    fn test_audio_features_get_set_roundtrip_every_column() {
        let mut features = AudioFeatures::default();
        assert!(features.is_empty());
        for (i, column) in FeatureColumn::ALL.iter().enumerate() {
            features.set(*column, Some(i as f64));
        }
        for (i, column) in FeatureColumn::ALL.iter().enumerate() {
            assert_eq!(features.get(*column), Some(i as f64), "{}", column.as_str());
        }
        assert!(!features.is_empty());
    }
}
