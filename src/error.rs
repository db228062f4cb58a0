//! Error types for catalog building.

use thiserror::Error;

/// All errors that can abort a catalog build.
///
/// Reconciliation never fails: a duplicate group whose outlier filter rejects
/// every row falls back to the full-group mean and is counted in the stats.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Artist search returned no result whose name equals the query exactly.
    #[error("No artist named '{query}' (search returned: {})", format_candidates(.candidates))]
    Lookup {
        query: String,
        candidates: Vec<String>,
    },

    /// A page from the metadata source was missing, short, or undecodable.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_candidates(candidates: &[String]) -> String {
    if candidates.is_empty() {
        "nothing".to_string()
    } else {
        candidates.join(", ")
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_message_lists_candidates() {
        let err = CatalogError::Lookup {
            query: "Muse".to_string(),
            candidates: vec!["Muse Tribute Band".to_string(), "MUSE".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No artist named 'Muse' (search returned: Muse Tribute Band, MUSE)"
        );
    }

    #[test]
    fn test_lookup_message_without_candidates() {
        let err = CatalogError::Lookup {
            query: "Nobody".to_string(),
            candidates: vec![],
        };
        assert!(err.to_string().ends_with("(search returned: nothing)"));
    }
}
