//! Setup errors
//!
//! Anything in here is fatal: it is returned before the scheduler starts and
//! the run never begins. Per-attempt failures are not errors, they are
//! recorded as outcomes (see `validator`).

use std::path::PathBuf;

/// Errors that prevent a load test from starting
#[derive(Debug)]
pub enum SetupError {
    /// Catalog file could not be read
    CatalogMissing {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Catalog document is not valid product JSON
    CatalogMalformed {
        origin: String,
        source: serde_json::Error,
    },
    /// Catalog parsed but contains no products
    CatalogEmpty { origin: String },
    /// Remote catalog could not be downloaded
    CatalogFetch { url: String, reason: String },
    /// Configuration value out of range
    InvalidConfig(String),
}

impl SetupError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

impl std::fmt::Display for SetupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CatalogMissing { path, source } => {
                write!(f, "product catalog not found at {}: {}", path.display(), source)
            }
            Self::CatalogMalformed { origin, source } => {
                write!(f, "product catalog {} is malformed: {}", origin, source)
            }
            Self::CatalogEmpty { origin } => {
                write!(f, "product catalog {} contains no products", origin)
            }
            Self::CatalogFetch { url, reason } => {
                write!(f, "failed to fetch product catalog from {}: {}", url, reason)
            }
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CatalogMissing { source, .. } => Some(source),
            Self::CatalogMalformed { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_catalog() {
        let err = SetupError::CatalogEmpty {
            origin: "data/products.json".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "product catalog data/products.json contains no products"
        );
    }

    #[test]
    fn test_missing_catalog_keeps_io_source() {
        let err = SetupError::CatalogMissing {
            path: PathBuf::from("nope.json"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("nope.json"));
    }
}
