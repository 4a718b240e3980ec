//! JSON catalog files.
//!
//! A catalog file is one JSON object mapping operation names to descriptors:
//!
//! ```json
//! {
//!   "getFeed": { "url": "https://api.example.com/feed", "params": { "pn": 1 } },
//!   "modifyRelation": {
//!     "url": "https://api.example.com/relation/modify",
//!     "method": "post",
//!     "headers": { "Content-Type": "application/x-www-form-urlencoded" },
//!     "body": { "fid": 0, "act": 1 },
//!     "pipeline": ["parse_json", "deliver"]
//!   }
//! }
//! ```
//!
//! Entries keep their file order. Parsing checks shape only; registration
//! checks the descriptor invariants.

use std::path::{Path, PathBuf};

use courier_core::Descriptor;
use serde_json::{Map, Value};
use thiserror::Error;

/// A catalog could not be read or parsed.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog is not a JSON object of operations: {0}")]
    Document(#[source] serde_json::Error),

    #[error("invalid descriptor for operation '{name}': {source}")]
    Entry {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parses a catalog document into `(name, descriptor)` pairs in file order.
///
/// # Errors
///
/// [`CatalogError::Document`] if the text is not a JSON object,
/// [`CatalogError::Entry`] for the first entry that is not a descriptor.
pub fn parse_catalog(text: &str) -> Result<Vec<(String, Descriptor)>, CatalogError> {
    let document: Map<String, Value> =
        serde_json::from_str(text).map_err(CatalogError::Document)?;
    document
        .into_iter()
        .map(|(name, value)| match serde_json::from_value(value) {
            Ok(descriptor) => Ok((name, descriptor)),
            Err(source) => Err(CatalogError::Entry { name, source }),
        })
        .collect()
}

/// Reads and parses a catalog file.
///
/// # Errors
///
/// [`CatalogError::Read`] if the file cannot be read, otherwise as
/// [`parse_catalog`].
pub async fn load_catalog(path: impl AsRef<Path>) -> Result<Vec<(String, Descriptor)>, CatalogError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let entries = parse_catalog(&text)?;
    tracing::info!(path = %path.display(), count = entries.len(), "loaded catalog");
    Ok(entries)
}
