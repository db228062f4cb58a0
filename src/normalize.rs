//! Record normalization: raw API payloads into flat catalog rows.
//!
//! Every function here is a pure mapping. Absent nested fields become `None`
//! or empty collections instead of errors, and a `null` record still produces
//! a row carrying the requested track's name, so output rows stay aligned
//! index-for-index with the request order.

use crate::models::{
    AlbumRow, ArtistInfo, AudioFeatures, FeatureRow, RawAlbum, RawArtist, RawArtistRef,
    RawAudioFeatures, RawTrack, TopSong, TrackRow, TrackStub,
};

fn artist_names(artists: &[RawArtistRef]) -> Vec<String> {
    artists.iter().filter_map(|a| a.name.clone()).collect()
}

pub fn artist_info(raw: &RawArtist) -> ArtistInfo {
    ArtistInfo {
        artist: raw.name.clone().unwrap_or_default(),
        followers: raw.followers.total,
        popularity: raw.popularity,
        genres: raw.genres.clone(),
        external_url: raw.external_urls.spotify.clone(),
        href: raw.href.clone(),
        id: raw.id.clone(),
        uri: raw.uri.clone(),
    }
}

pub fn top_song(raw: &RawTrack) -> TopSong {
    let cover_art = raw
        .album
        .as_ref()
        .and_then(|album| album.images.first())
        .map(|image| image.url.clone());

    TopSong {
        track: raw.name.clone().unwrap_or_default(),
        popularity: raw.popularity,
        audio: raw.preview_url.clone(),
        cover_art,
    }
}

pub fn album_row(raw: &RawAlbum) -> AlbumRow {
    AlbumRow {
        name: raw.name.clone().unwrap_or_default(),
        release_date: raw.release_date.clone(),
        release_date_precision: raw.release_date_precision.clone(),
        total_tracks: raw.total_tracks,
        album_group: raw.album_group.clone(),
        album_type: raw.album_type.clone(),
        artist_url: raw
            .artists
            .first()
            .and_then(|artist| artist.external_urls.spotify.clone()),
        available_markets: raw.available_markets.clone(),
        external_url: raw.external_urls.spotify.clone(),
        href: raw.href.clone(),
        id: raw.id.clone(),
        images: raw.images.clone(),
        kind: raw.kind.clone(),
        uri: raw.uri.clone(),
    }
}

pub fn track_stub(raw: &RawTrack) -> TrackStub {
    TrackStub {
        name: raw.name.clone().unwrap_or_default(),
        track_number: raw.track_number,
        id: raw.id.clone(),
        artists: artist_names(&raw.artists),
        available_markets: raw.available_markets.clone(),
        disc_number: raw.disc_number,
        duration_ms: raw.duration_ms,
        explicit: raw.explicit,
        external_url: raw.external_urls.spotify.clone(),
        href: raw.href.clone(),
        is_local: raw.is_local,
        preview_url: raw.preview_url.clone(),
        kind: raw.kind.clone(),
        uri: raw.uri.clone(),
    }
}

/// General-info row for `requested`, keyed by the listing name so it lines up
/// with the feature row of the same request. The record's own name, when it
/// differs, is kept as `title`.
pub fn track_row(requested: &TrackStub, raw: Option<&RawTrack>) -> TrackRow {
    let Some(raw) = raw else {
        return TrackRow {
            name: requested.name.clone(),
            title: None,
            id: None,
            popularity: None,
            artists: Vec::new(),
            available_markets: Vec::new(),
            disc_number: None,
            track_number: None,
            duration_ms: None,
            explicit: None,
            external_ids: Default::default(),
            external_url: None,
            preview_url: None,
            kind: None,
            uri: None,
        };
    };

    TrackRow {
        name: requested.name.clone(),
        title: raw.name.clone().filter(|title| *title != requested.name),
        id: raw.id.clone(),
        popularity: raw.popularity,
        artists: artist_names(&raw.artists),
        available_markets: raw.available_markets.clone(),
        disc_number: raw.disc_number,
        track_number: raw.track_number,
        duration_ms: raw.duration_ms,
        explicit: raw.explicit,
        external_ids: raw.external_ids.clone(),
        external_url: raw.external_urls.spotify.clone(),
        preview_url: raw.preview_url.clone(),
        kind: raw.kind.clone(),
        uri: raw.uri.clone(),
    }
}

/// Feature row tagged with the listing name of the requested track.
pub fn feature_row(name: &str, raw: Option<&RawAudioFeatures>) -> FeatureRow {
    let Some(raw) = raw else {
        return FeatureRow::averaged(name, AudioFeatures::default());
    };

    FeatureRow {
        name: name.to_string(),
        kind: raw.kind.clone(),
        id: raw.id.clone(),
        uri: raw.uri.clone(),
        track_href: raw.track_href.clone(),
        analysis_url: raw.analysis_url.clone(),
        features: AudioFeatures {
            danceability: raw.danceability,
            energy: raw.energy,
            key: raw.key,
            loudness: raw.loudness,
            mode: raw.mode,
            speechiness: raw.speechiness,
            acousticness: raw.acousticness,
            instrumentalness: raw.instrumentalness,
            liveness: raw.liveness,
            valence: raw.valence,
            tempo: raw.tempo,
            duration_ms: raw.duration_ms,
            time_signature: raw.time_signature,
        },
    }
}
