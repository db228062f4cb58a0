//! Offline metadata source backed by a SQLite cache of recorded API payloads.
//!
//! Payloads are stored verbatim as JSON, keyed by object kind and ID. Listings
//! (top tracks, an artist's albums, an album's tracks) are stored as ordered
//! links so paging replays the source's order.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE api_objects (
//!     kind     TEXT NOT NULL,   -- artist | album | track | audio_features
//!     id       TEXT NOT NULL,
//!     payload  TEXT NOT NULL,
//!     PRIMARY KEY (kind, id)
//! );
//! CREATE TABLE api_links (
//!     kind       TEXT NOT NULL,  -- top_track | artist_album | album_track
//!     parent_id  TEXT NOT NULL,
//!     position   INTEGER NOT NULL,
//!     child_id   TEXT NOT NULL,
//!     PRIMARY KEY (kind, parent_id, position)
//! );
//! ```

use log::{info, warn};
use rusqlite::{params, Connection, Transaction};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{CatalogError, Result};
use crate::fetch::MetadataSource;
use crate::models::{Page, RawAlbum, RawArtist, RawAudioFeatures, RawTrack};

// ============================================================================
// Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Artist,
    Album,
    Track,
    AudioFeatures,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Artist => "artist",
            ObjectKind::Album => "album",
            ObjectKind::Track => "track",
            ObjectKind::AudioFeatures => "audio_features",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    TopTrack,
    ArtistAlbum,
    AlbumTrack,
}

impl LinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkKind::TopTrack => "top_track",
            LinkKind::ArtistAlbum => "artist_album",
            LinkKind::AlbumTrack => "album_track",
        }
    }

    fn child_kind(self) -> ObjectKind {
        match self {
            LinkKind::TopTrack | LinkKind::AlbumTrack => ObjectKind::Track,
            LinkKind::ArtistAlbum => ObjectKind::Album,
        }
    }
}

// ============================================================================
// Dump Import
// ============================================================================

/// Recorded API responses, as written by a capture run.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CatalogDump {
    pub artists: Vec<Value>,
    pub albums: Vec<Value>,
    pub tracks: Vec<Value>,
    pub audio_features: Vec<Value>,
    /// artist id -> track ids, most popular first
    pub top_tracks: BTreeMap<String, Vec<String>>,
    /// artist id -> album ids, in listing order
    pub artist_albums: BTreeMap<String, Vec<String>>,
    /// album id -> track ids, in listing order
    pub album_tracks: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportStats {
    pub objects: usize,
    pub links: usize,
    /// Payloads without a string `id` (including `null` entries).
    pub skipped: usize,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS api_objects (
        kind     TEXT NOT NULL,
        id       TEXT NOT NULL,
        payload  TEXT NOT NULL,
        PRIMARY KEY (kind, id)
    );
    CREATE TABLE IF NOT EXISTS api_links (
        kind       TEXT NOT NULL,
        parent_id  TEXT NOT NULL,
        position   INTEGER NOT NULL,
        child_id   TEXT NOT NULL,
        PRIMARY KEY (kind, parent_id, position)
    );";

fn insert_objects(
    tx: &Transaction,
    kind: ObjectKind,
    payloads: &[Value],
    stats: &mut ImportStats,
) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR REPLACE INTO api_objects (kind, id, payload) VALUES (?1, ?2, ?3)",
    )?;
    for payload in payloads {
        let Some(id) = payload.get("id").and_then(Value::as_str) else {
            stats.skipped += 1;
            continue;
        };
        stmt.execute(params![kind.as_str(), id, payload.to_string()])?;
        stats.objects += 1;
    }
    Ok(())
}

fn insert_links(
    tx: &Transaction,
    kind: LinkKind,
    links: &BTreeMap<String, Vec<String>>,
    stats: &mut ImportStats,
) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR REPLACE INTO api_links (kind, parent_id, position, child_id) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (parent_id, children) in links {
        for (position, child_id) in children.iter().enumerate() {
            stmt.execute(params![kind.as_str(), parent_id, position as i64, child_id])?;
            stats.links += 1;
        }
    }
    Ok(())
}

// ============================================================================
// SqliteSource
// ============================================================================

pub struct SqliteSource {
    conn: Connection,
}

fn decode<T: DeserializeOwned>(kind: &str, payload: &str) -> Result<T> {
    serde_json::from_str(payload)
        .map_err(|e| CatalogError::Upstream(format!("undecodable {} payload: {}", kind, e)))
}

/// LIKE pattern matching `query` anywhere, with wildcards in `query` escaped.
fn contains_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl SqliteSource {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Load every payload and link of `dump` in one transaction.
    pub fn import(&mut self, dump: &CatalogDump) -> Result<ImportStats> {
        let mut stats = ImportStats::default();
        let tx = self.conn.transaction()?;

        insert_objects(&tx, ObjectKind::Artist, &dump.artists, &mut stats)?;
        insert_objects(&tx, ObjectKind::Album, &dump.albums, &mut stats)?;
        insert_objects(&tx, ObjectKind::Track, &dump.tracks, &mut stats)?;
        insert_objects(&tx, ObjectKind::AudioFeatures, &dump.audio_features, &mut stats)?;
        insert_links(&tx, LinkKind::TopTrack, &dump.top_tracks, &mut stats)?;
        insert_links(&tx, LinkKind::ArtistAlbum, &dump.artist_albums, &mut stats)?;
        insert_links(&tx, LinkKind::AlbumTrack, &dump.album_tracks, &mut stats)?;

        tx.commit()?;

        if stats.skipped > 0 {
            warn!("Skipped {} payloads without an id", stats.skipped);
        }
        info!("Imported {} payloads and {} links", stats.objects, stats.links);
        Ok(stats)
    }

    pub fn import_file(&mut self, path: &Path) -> Result<ImportStats> {
        let reader = BufReader::new(File::open(path)?);
        let dump: CatalogDump = serde_json::from_reader(reader)?;
        self.import(&dump)
    }

    fn linked_payloads(
        &self,
        kind: LinkKind,
        parent_id: &str,
        limit: Option<usize>,
        offset: usize,
    ) -> Result<Page<String>> {
        let child_kind = kind.child_kind().as_str();

        let total: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM api_links l
             JOIN api_objects o ON o.kind = ?1 AND o.id = l.child_id
             WHERE l.kind = ?2 AND l.parent_id = ?3",
            params![child_kind, kind.as_str(), parent_id],
            |row| row.get(0),
        )?;

        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit.map_or(-1, |l| l as i64);
        let mut stmt = self.conn.prepare_cached(
            "SELECT o.payload FROM api_links l
             JOIN api_objects o ON o.kind = ?1 AND o.id = l.child_id
             WHERE l.kind = ?2 AND l.parent_id = ?3
             ORDER BY l.position
             LIMIT ?4 OFFSET ?5",
        )?;
        let items = stmt
            .query_map(
                params![child_kind, kind.as_str(), parent_id, limit, offset as i64],
                |row| row.get::<_, String>(0),
            )?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(Page {
            items,
            total: total as usize,
        })
    }

    /// Payloads for `ids` in request order; `None` where nothing is cached.
    fn payloads_by_id(&self, kind: ObjectKind, ids: &[String]) -> Result<Vec<Option<String>>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::with_capacity(80 + ids.len() * 2);
        sql.push_str("SELECT id, payload FROM api_objects WHERE kind = ? AND id IN (");
        for i in 0..ids.len() {
            if i > 0 {
                sql.push(',');
            }
            sql.push('?');
        }
        sql.push(')');

        let kind_str = kind.as_str();
        let mut params: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(ids.len() + 1);
        params.push(&kind_str);
        params.extend(ids.iter().map(|id| id as &dyn rusqlite::ToSql));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut found: FxHashMap<String, String> = FxHashMap::default();
        let mut rows = stmt.query(params.as_slice())?;
        while let Some(row) = rows.next()? {
            found.insert(row.get(0)?, row.get(1)?);
        }

        Ok(ids.iter().map(|id| found.get(id).cloned()).collect())
    }
}

impl MetadataSource for SqliteSource {
    fn search_artists(&self, query: &str, limit: usize) -> Result<Vec<RawArtist>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT payload FROM api_objects
             WHERE kind = 'artist' AND json_extract(payload, '$.name') LIKE ?1 ESCAPE '\\'
             ORDER BY rowid
             LIMIT ?2",
        )?;
        let payloads = stmt
            .query_map(params![contains_pattern(query), limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        payloads.iter().map(|p| decode("artist", p)).collect()
    }

    fn top_tracks(&self, artist_id: &str) -> Result<Vec<RawTrack>> {
        let page = self.linked_payloads(LinkKind::TopTrack, artist_id, None, 0)?;
        page.items.iter().map(|p| decode("track", p)).collect()
    }

    fn artist_albums(&self, artist_id: &str, limit: usize, offset: usize) -> Result<Page<RawAlbum>> {
        let page = self.linked_payloads(LinkKind::ArtistAlbum, artist_id, Some(limit), offset)?;
        Ok(Page {
            items: page
                .items
                .iter()
                .map(|p| decode("album", p))
                .collect::<Result<_>>()?,
            total: page.total,
        })
    }

    fn album_tracks(&self, album_id: &str, limit: usize, offset: usize) -> Result<Page<RawTrack>> {
        let page = self.linked_payloads(LinkKind::AlbumTrack, album_id, Some(limit), offset)?;
        Ok(Page {
            items: page
                .items
                .iter()
                .map(|p| decode("track", p))
                .collect::<Result<_>>()?,
            total: page.total,
        })
    }

    fn tracks(&self, ids: &[String]) -> Result<Vec<Option<RawTrack>>> {
        self.payloads_by_id(ObjectKind::Track, ids)?
            .into_iter()
            .map(|p| p.map(|p| decode("track", &p)).transpose())
            .collect()
    }

    fn audio_features(&self, ids: &[String]) -> Result<Vec<Option<RawAudioFeatures>>> {
        self.payloads_by_id(ObjectKind::AudioFeatures, ids)?
            .into_iter()
            .map(|p| p.map(|p| decode("audio_features", &p)).transpose())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn sample_dump() -> CatalogDump {
        serde_json::from_value(json!({
            "artists": [
                {"id": "ar1", "name": "Muse", "followers": {"total": 100}},
                {"id": "ar2", "name": "Muse 100%", "followers": {"total": 5}},
                {"id": "ar3", "name": "Radiohead", "followers": {"total": 50}},
                {"name": "no id"}
            ],
            "albums": [
                {"id": "al1", "name": "Absolution"},
                {"id": "al2", "name": "Origin of Symmetry"},
                {"id": "al3", "name": "Hullabaloo"}
            ],
            "tracks": [
                {"id": "t1", "name": "Hysteria", "popularity": 70},
                {"id": "t2", "name": "Time Is Running Out", "popularity": 65},
                {"id": "t3", "name": "Plug In Baby", "popularity": 60}
            ],
            "audio_features": [
                {"id": "t1", "energy": 0.9},
                null
            ],
            "top_tracks": {"ar1": ["t2", "t1"]},
            "artist_albums": {"ar1": ["al1", "al2", "al3"]},
            "album_tracks": {"al1": ["t1", "t2", "missing"], "al2": ["t3"]}
        }))
        .unwrap()
    }

    fn source() -> SqliteSource {
        let mut source = SqliteSource::open_in_memory().unwrap();
        source.import(&sample_dump()).unwrap();
        source
    }

    #[test]
    fn test_import_counts() {
        let mut source = SqliteSource::open_in_memory().unwrap();
        let stats = source.import(&sample_dump()).unwrap();
        assert_eq!(stats.objects, 10);
        assert_eq!(stats.links, 9);
        assert_eq!(stats.skipped, 2);
    }

    #[test]
    fn test_search_matches_substring_in_insert_order() {
        let source = source();
        let found = source.search_artists("muse", 5).unwrap();
        let names: Vec<_> = found.iter().filter_map(|a| a.name.clone()).collect();
        assert_eq!(names, vec!["Muse", "Muse 100%"]);
        assert_eq!(source.search_artists("muse", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_search_escapes_wildcards() {
        let source = source();
        let found = source.search_artists("100%", 5).unwrap();
        assert_eq!(found.len(), 1);
        assert!(source.search_artists("_use", 5).unwrap().is_empty());
    }

    #[test]
    fn test_top_tracks_follow_link_order() {
        let source = source();
        let top = source.top_tracks("ar1").unwrap();
        let ids: Vec<_> = top.iter().filter_map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
        assert!(source.top_tracks("ar3").unwrap().is_empty());
    }

    #[test]
    fn test_album_listing_pages() {
        let source = source();
        let first = source.artist_albums("ar1", 2, 0).unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.items.len(), 2);
        let second = source.artist_albums("ar1", 2, 2).unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].name.as_deref(), Some("Hullabaloo"));
    }

    #[test]
    fn test_dangling_track_links_are_not_counted() {
        let source = source();
        let page = source.album_tracks("al1", 50, 0).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items.len(), 2);
    }

    #[test]
    fn test_batch_lookup_keeps_request_order() {
        let source = source();
        let ids: Vec<String> = ["t3", "nope", "t1"].iter().map(|s| s.to_string()).collect();
        let tracks = source.tracks(&ids).unwrap();
        assert_eq!(tracks.len(), 3);
        assert_eq!(tracks[0].as_ref().and_then(|t| t.name.as_deref()), Some("Plug In Baby"));
        assert!(tracks[1].is_none());
        assert_eq!(tracks[2].as_ref().and_then(|t| t.popularity), Some(70));

        let features = source.audio_features(&ids).unwrap();
        assert!(features[0].is_none());
        assert_eq!(features[2].as_ref().and_then(|f| f.energy), Some(0.9));
    }

    #[test]
    fn test_corrupt_payload_is_upstream_error() {
        let source = source();
        source
            .conn
            .execute(
                "INSERT INTO api_objects (kind, id, payload) VALUES ('track', 'bad', '{not json')",
                [],
            )
            .unwrap();
        let result = source.tracks(&["bad".to_string()]);
        assert!(matches!(result, Err(CatalogError::Upstream(_))));
    }

    #[test]
    fn test_import_file_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let dump_path = dir.path().join("dump.json");
        let db_path = dir.path().join("catalog-cache.sqlite3");

        let mut file = File::create(&dump_path).unwrap();
        write!(
            file,
            "{}",
            json!({
                "artists": [{"id": "ar1", "name": "Muse"}],
                "top_tracks": {"ar1": []}
            })
        )
        .unwrap();

        {
            let mut source = SqliteSource::open(&db_path).unwrap();
            let stats = source.import_file(&dump_path).unwrap();
            assert_eq!(stats.objects, 1);
        }

        let reopened = SqliteSource::open(&db_path).unwrap();
        assert_eq!(reopened.search_artists("Muse", 5).unwrap().len(), 1);
    }
}
