//! Guards for the import command, which deletes its output before writing.
//!
//! A cache database is only ever rebuilt from a dump, so the target must be
//! named like a cache and must not be the dump under any spelling of its path.

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Fragment every cache database name carries.
pub const CACHE_MARKER: &str = "cache";

/// File name fragments that mark a recorded dump rather than a cache.
const DUMP_MARKERS: [&str; 2] = [".json", "dump"];

/// Absolute form of `path`; the parent is resolved when the file itself does
/// not exist yet.
fn resolved(path: &Path) -> PathBuf {
    if let Ok(path) = path.canonicalize() {
        return path;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
            parent
                .canonicalize()
                .map(|p| p.join(name))
                .unwrap_or_else(|_| path.to_path_buf())
        }
        _ => path.to_path_buf(),
    }
}

/// Refuse to replace `output` unless it is a cache file distinct from `dump`.
pub fn check_cache_output(output: &Path, dump: &Path) -> Result<()> {
    let name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !name.contains(CACHE_MARKER) {
        bail!(
            "Refusing to write '{}': cache file names must contain '{}'",
            output.display(),
            CACHE_MARKER
        );
    }

    if let Some(marker) = DUMP_MARKERS.iter().find(|m| name.contains(**m)) {
        bail!(
            "Refusing to write '{}': name looks like a dump ('{}')",
            output.display(),
            marker
        );
    }

    if resolved(output) == resolved(dump) {
        bail!(
            "Refusing to write '{}': it is the dump being imported",
            output.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cache_next_to_dump_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("muse-capture.json");
        fs::write(&dump, "{}").unwrap();
        assert!(check_cache_output(&dir.path().join("muse-cache.sqlite3"), &dump).is_ok());
    }

    #[test]
    fn test_name_without_marker_is_refused() {
        let err = check_cache_output(Path::new("/tmp/output.sqlite3"), Path::new("/data/capture.json"))
            .unwrap_err();
        assert!(err.to_string().contains("must contain 'cache'"));
    }

    #[test]
    fn test_dump_like_names_are_refused() {
        let dump = Path::new("/data/other.json");
        for name in ["/tmp/cache.json", "/tmp/cache-dump.sqlite3"] {
            assert!(check_cache_output(Path::new(name), dump).is_err(), "{} accepted", name);
        }
    }

    #[test]
    fn test_same_file_through_other_spelling_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("cache.sqlite3");
        fs::write(&dump, "").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let detour = dir.path().join("sub").join("..").join("cache.sqlite3");
        let err = check_cache_output(&detour, &dump).unwrap_err();
        assert!(err.to_string().contains("is the dump being imported"));
    }
}
