//! Catalog assembly for one artist.
//!
//! Runs the whole pipeline against a [`MetadataSource`]:
//!
//! 1. Artist search, keeping exact-name matches (most followers first)
//! 2. Top tracks of the selected artist
//! 3. Every album, then every album's track listing
//! 4. General info and audio features for every listed track ID
//! 5. Reconciliation: highest popularity for general info, outlier-filtered
//!    mean for audio features
//!
//! Any failed fetch aborts the build.

use log::{info, warn};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

use crate::config::CatalogConfig;
use crate::dedup::{reconcile, HighestPopularity, ReconcileStats};
use crate::error::{CatalogError, Result};
use crate::fetch::{batch_audio_features, batch_track_info, list_album_tracks, list_albums, MetadataSource};
use crate::models::{AlbumRow, ArtistInfo, FeatureRow, RawArtist, TopSong, TrackRow, TrackStub};
use crate::normalize::{album_row, artist_info, feature_row, top_song, track_row, track_stub};
use crate::progress::PhaseProgress;

// ============================================================================
// Report
// ============================================================================

/// Counters for one catalog build, written with `--stats`.
#[derive(Default, Debug, Clone, Serialize)]
pub struct CatalogReport {
    pub query: String,
    pub artist_id: Option<String>,
    /// Search results whose name equals the query exactly.
    pub artist_matches: usize,
    pub top_songs: usize,
    pub albums: usize,
    pub albums_without_id: usize,
    pub album_tracks: usize,
    /// Listed tracks with no ID; they cannot be looked up and are left out.
    pub tracks_without_id: usize,
    pub track_info: ReconcileStats,
    pub audio_features: ReconcileStats,
    pub elapsed_seconds: f64,
}

impl CatalogReport {
    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Reconciled tables for one artist.
#[derive(Debug)]
pub struct Catalog {
    /// Exact-name matches, most followers first. The first one was used.
    pub artists: Vec<ArtistInfo>,
    pub top_songs: Vec<TopSong>,
    pub albums: Vec<AlbumRow>,
    /// One general-info row per track name.
    pub tracks: Vec<TrackRow>,
    /// One audio-feature row per track name.
    pub features: Vec<FeatureRow>,
    pub report: CatalogReport,
}

impl Catalog {
    pub fn artist(&self) -> Option<&ArtistInfo> {
        self.artists.first()
    }

    /// Audio-feature rows of the `n` most popular tracks, most popular first.
    ///
    /// Popularity comes from the general-info table, which lists tracks in
    /// first-listed order; equal popularity keeps that order and a missing
    /// popularity ranks last.
    pub fn filter_by_popularity(&self, n: usize) -> Vec<&FeatureRow> {
        let mut ranked: Vec<&TrackRow> = self.tracks.iter().collect();
        ranked.sort_by(|a, b| b.popularity.cmp(&a.popularity));

        let by_name: FxHashMap<&str, &FeatureRow> = self
            .features
            .iter()
            .map(|row| (row.name.as_str(), row))
            .collect();

        ranked
            .into_iter()
            .take(n)
            .filter_map(|track| by_name.get(track.name.as_str()).copied())
            .collect()
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// Exact-name matches from `found`, most followers first.
fn select_artists<'a>(query: &str, found: &'a [RawArtist]) -> Result<Vec<&'a RawArtist>> {
    let mut matches: Vec<&RawArtist> = found
        .iter()
        .filter(|a| a.name.as_deref() == Some(query))
        .collect();

    if matches.is_empty() {
        return Err(CatalogError::Lookup {
            query: query.to_string(),
            candidates: found.iter().filter_map(|a| a.name.clone()).collect(),
        });
    }

    matches.sort_by(|a, b| b.followers.total.cmp(&a.followers.total));
    Ok(matches)
}

/// Build the reconciled catalog of the artist named exactly `query`.
pub fn build_catalog<S: MetadataSource + ?Sized>(
    source: &S,
    query: &str,
    config: &CatalogConfig,
) -> Result<Catalog> {
    config.validate()?;
    let fetch = &config.fetch;
    let start = Instant::now();
    let mut report = CatalogReport {
        query: query.to_string(),
        ..Default::default()
    };

    // Artist lookup
    let found = source.search_artists(query, fetch.search_limit)?;
    let matches = select_artists(query, &found)?;
    report.artist_matches = matches.len();
    let artist_id = matches[0].id.clone().ok_or_else(|| {
        CatalogError::Upstream(format!("search result for '{}' has no id", query))
    })?;
    let artists: Vec<ArtistInfo> = matches.into_iter().map(artist_info).collect();
    info!("Selected artist '{}' ({})", query, artist_id);
    report.artist_id = Some(artist_id.clone());

    let top_songs: Vec<TopSong> = source
        .top_tracks(&artist_id)?
        .iter()
        .take(fetch.top_tracks_limit)
        .map(top_song)
        .collect();
    report.top_songs = top_songs.len();

    // Albums and their track listings
    let raw_albums = list_albums(source, &artist_id, fetch.album_page_size)?;
    let albums: Vec<AlbumRow> = raw_albums.iter().map(album_row).collect();
    report.albums = albums.len();
    info!("Found {} albums", albums.len());

    let mut progress = PhaseProgress::new("album tracks", raw_albums.len() as u64);
    let mut stubs: Vec<TrackStub> = Vec::new();
    for album in &raw_albums {
        progress.step();
        let Some(album_id) = album.id.as_deref() else {
            report.albums_without_id += 1;
            continue;
        };
        let listing = list_album_tracks(source, album_id, fetch.album_track_page_size)?;
        stubs.extend(listing.iter().map(track_stub));
    }
    progress.finish(format!("Listed {} album tracks", stubs.len()));
    report.album_tracks = stubs.len();

    if report.albums_without_id > 0 {
        warn!("Skipped {} albums without an id", report.albums_without_id);
    }

    let (requested, ids): (Vec<&TrackStub>, Vec<String>) = stubs
        .iter()
        .filter_map(|stub| stub.id.clone().map(|id| (stub, id)))
        .unzip();
    report.tracks_without_id = stubs.len() - requested.len();
    if report.tracks_without_id > 0 {
        warn!("Skipped {} listed tracks without an id", report.tracks_without_id);
    }

    // Both streams, aligned with `requested`
    let infos = batch_track_info(source, &ids, fetch.track_page_size)?;
    let features = batch_audio_features(source, &ids, fetch.feature_page_size)?;

    let track_rows: Vec<TrackRow> = requested
        .iter()
        .zip(&infos)
        .map(|(stub, raw)| track_row(stub, raw.as_ref()))
        .collect();
    let feature_rows: Vec<FeatureRow> = requested
        .iter()
        .zip(&features)
        .map(|(stub, raw)| feature_row(&stub.name, raw.as_ref()))
        .collect();

    let tracks = reconcile(track_rows, &HighestPopularity);
    let features = reconcile(feature_rows, &config.reconcile.policy());
    report.track_info = tracks.stats;
    report.audio_features = features.stats;
    report.elapsed_seconds = start.elapsed().as_secs_f64();

    Ok(Catalog {
        artists,
        top_songs,
        albums,
        tracks: tracks.rows,
        features: features.rows,
        report,
    })
}
