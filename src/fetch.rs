//! Metadata source interface and paged fetching.
//!
//! A [`MetadataSource`] answers one request per call: one search, one page of
//! a listing, or one batch of IDs. The functions here drive the paging:
//! offset-paginated listings are read until exhausted, and ID lists are cut
//! into fixed-size windows. Any failed or malformed page aborts the whole
//! fetch; there is no partial result.

use log::debug;

use crate::error::{CatalogError, Result};
use crate::models::{Page, RawAlbum, RawArtist, RawAudioFeatures, RawTrack};
use crate::progress::PhaseProgress;

/// One round-trip per call against the remote catalog (or a recording of it).
pub trait MetadataSource {
    /// Artists whose name matches `query`, best matches first.
    fn search_artists(&self, query: &str, limit: usize) -> Result<Vec<RawArtist>>;

    /// The artist's most popular tracks, full track payloads.
    fn top_tracks(&self, artist_id: &str) -> Result<Vec<RawTrack>>;

    fn artist_albums(&self, artist_id: &str, limit: usize, offset: usize) -> Result<Page<RawAlbum>>;

    /// Simplified track payloads of one album.
    fn album_tracks(&self, album_id: &str, limit: usize, offset: usize) -> Result<Page<RawTrack>>;

    /// Full track payloads for `ids`, one entry per ID in request order.
    /// Unknown IDs yield `None`.
    fn tracks(&self, ids: &[String]) -> Result<Vec<Option<RawTrack>>>;

    /// Audio features for `ids`, one entry per ID in request order.
    /// Tracks without analysis yield `None`.
    fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<RawAudioFeatures>>>;
}

fn check_page_size(what: &str, page_size: usize) -> Result<()> {
    if page_size == 0 {
        return Err(CatalogError::Config(format!(
            "page size for {} must be at least 1",
            what
        )));
    }
    Ok(())
}

/// Read an offset-paginated listing until an empty page or `offset >= total`.
fn collect_pages<T>(
    what: &str,
    page_size: usize,
    mut fetch: impl FnMut(usize, usize) -> Result<Page<T>>,
) -> Result<Vec<T>> {
    check_page_size(what, page_size)?;

    let mut items = Vec::new();
    let mut offset = 0;
    loop {
        let page = fetch(page_size, offset)?;
        let got = page.items.len();
        if got > page_size {
            return Err(CatalogError::Upstream(format!(
                "{} page at offset {} returned {} items for limit {}",
                what, offset, got, page_size
            )));
        }
        items.extend(page.items);
        offset += got;
        if got == 0 || offset >= page.total {
            break;
        }
    }

    debug!("Listed {} {} in pages of {}", items.len(), what, page_size);
    Ok(items)
}

/// Fetch `ids` in windows of `page_size`, checking each page lines up with its request.
fn fetch_batches<T>(
    what: &'static str,
    ids: &[String],
    page_size: usize,
    mut fetch: impl FnMut(&[String]) -> Result<Vec<Option<T>>>,
) -> Result<Vec<Option<T>>> {
    check_page_size(what, page_size)?;

    let mut progress = PhaseProgress::new(what, ids.len().div_ceil(page_size) as u64);

    let mut out = Vec::with_capacity(ids.len());
    for (n, chunk) in ids.chunks(page_size).enumerate() {
        let page = fetch(chunk)?;
        if page.len() != chunk.len() {
            progress.abandon();
            return Err(CatalogError::Upstream(format!(
                "{} page {} returned {} records for {} ids",
                what,
                n + 1,
                page.len(),
                chunk.len()
            )));
        }
        out.extend(page);
        progress.step();
    }

    progress.finish(format!("Fetched {} {}", out.len(), what));
    Ok(out)
}

/// Every album of the artist, across all pages.
pub fn list_albums<S: MetadataSource + ?Sized>(
    source: &S,
    artist_id: &str,
    page_size: usize,
) -> Result<Vec<RawAlbum>> {
    collect_pages("albums", page_size, |limit, offset| {
        source.artist_albums(artist_id, limit, offset)
    })
}

/// Every track listed on the album, across all pages.
pub fn list_album_tracks<S: MetadataSource + ?Sized>(
    source: &S,
    album_id: &str,
    page_size: usize,
) -> Result<Vec<RawTrack>> {
    collect_pages("album tracks", page_size, |limit, offset| {
        source.album_tracks(album_id, limit, offset)
    })
}

/// General track info for every ID, aligned with `ids`.
pub fn batch_track_info<S: MetadataSource + ?Sized>(
    source: &S,
    ids: &[String],
    page_size: usize,
) -> Result<Vec<Option<RawTrack>>> {
    fetch_batches("track info", ids, page_size, |chunk| source.tracks(chunk))
}

/// Audio features for every ID, aligned with `ids`.
pub fn batch_audio_features<S: MetadataSource + ?Sized>(
    source: &S,
    ids: &[String],
    page_size: usize,
) -> Result<Vec<Option<RawAudioFeatures>>> {
    fetch_batches("audio features", ids, page_size, |chunk| {
        source.audio_features(chunk)
    })
}


#[cfg(test)]
mod tests {
    use super::fake::FakeSource;
    use super::*;
    use serde_json::json;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("t{}", i)).collect()
    }

    #[test]
    fn test_batches_are_cut_into_fixed_windows() {
        let mut source = FakeSource::default();
        for i in 0..5 {
            source = source.track("alb", json!({"id": format!("t{}", i), "name": "Song"}));
        }
        let result = batch_track_info(&source, &ids(5), 2).unwrap();
        assert_eq!(result.len(), 5);
        assert!(result.iter().all(Option::is_some));
        assert_eq!(
            *source.calls.borrow(),
            vec!["tracks:2", "tracks:2", "tracks:1"]
        );
    }

    #[test]
    fn test_batches_keep_null_entries_in_position() {
        let source = FakeSource::default()
            .feature(json!({"id": "t0", "energy": 0.1}))
            .feature(json!({"id": "t2", "energy": 0.3}));
        let result = batch_audio_features(&source, &ids(3), 100).unwrap();
        assert_eq!(result[0].as_ref().and_then(|f| f.energy), Some(0.1));
        assert!(result[1].is_none());
        assert_eq!(result[2].as_ref().and_then(|f| f.energy), Some(0.3));
    }

    #[test]
    fn test_empty_id_list_makes_no_requests() {
        let source = FakeSource::default();
        assert!(batch_track_info(&source, &[], 50).unwrap().is_empty());
        assert_eq!(source.call_count("tracks"), 0);
    }

    #[test]
    fn test_short_page_is_upstream_error() {
        let result: Result<Vec<Option<u32>>> =
            fetch_batches("widgets", &ids(3), 2, |chunk| Ok(vec![Some(1); chunk.len() - 1]));
        match result {
            Err(CatalogError::Upstream(msg)) => assert!(msg.contains("widgets page 1")),
            other => panic!("expected upstream error, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_page_aborts_fetch() {
        let mut calls = 0;
        let result: Result<Vec<Option<u32>>> = fetch_batches("widgets", &ids(6), 2, |chunk| {
            calls += 1;
            if calls == 2 {
                Err(CatalogError::Upstream("timeout".to_string()))
            } else {
                Ok(vec![None; chunk.len()])
            }
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_zero_page_size_is_config_error() {
        let source = FakeSource::default();
        assert!(matches!(
            batch_audio_features(&source, &ids(1), 0),
            Err(CatalogError::Config(_))
        ));
        assert!(matches!(
            list_albums(&source, "artist", 0),
            Err(CatalogError::Config(_))
        ));
    }

    #[test]
    fn test_listing_reads_every_page() {
        let mut source = FakeSource::default();
        for i in 0..5 {
            source = source.album("artist", json!({"id": format!("a{}", i), "name": format!("Album {}", i)}));
        }
        let albums = list_albums(&source, "artist", 2).unwrap();
        assert_eq!(albums.len(), 5);
        assert_eq!(albums[4].name.as_deref(), Some("Album 4"));
        assert_eq!(source.call_count("albums:"), 3);
    }

    #[test]
    fn test_listing_of_unknown_album_is_empty() {
        let source = FakeSource::default();
        assert!(list_album_tracks(&source, "missing", 50).unwrap().is_empty());
        assert_eq!(source.call_count("album_tracks:"), 1);
    }

    #[test]
    fn test_oversized_listing_page_is_upstream_error() {
        let result: Result<Vec<u32>> = collect_pages("albums", 2, |_, _| {
            Ok(Page {
                items: vec![1, 2, 3],
                total: 3,
            })
        });
        assert!(matches!(result, Err(CatalogError::Upstream(_))));
    }
}
