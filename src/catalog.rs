//! Product catalog
//!
//! Loaded once before scheduling and shared read-only by every worker
//! (wrap in `Arc`, no locking needed). A `Catalog` is never empty: every
//! constructor rejects zero products, so the synthesizer can always draw.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::SetupError;

/// A catalog entry; only `sku` is interpreted, the rest is carried opaquely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub sku: String,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Product {
    pub fn new(sku: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            attributes: serde_json::Map::new(),
        }
    }
}

/// Either `{"products": [...]}` or a bare array
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Wrapped { products: Vec<Product> },
    Bare(Vec<Product>),
}

/// Non-empty, immutable product set
#[derive(Debug, Clone)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>, origin: &str) -> Result<Self, SetupError> {
        if products.is_empty() {
            return Err(SetupError::CatalogEmpty {
                origin: origin.to_string(),
            });
        }
        Ok(Self { products })
    }

    pub fn from_json_str(json: &str, origin: &str) -> Result<Self, SetupError> {
        let doc: CatalogDocument =
            serde_json::from_str(json).map_err(|source| SetupError::CatalogMalformed {
                origin: origin.to_string(),
                source,
            })?;
        let products = match doc {
            CatalogDocument::Wrapped { products } => products,
            CatalogDocument::Bare(products) => products,
        };
        Self::new(products, origin)
    }

    /// Read a catalog file written by the product export
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SetupError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| SetupError::CatalogMissing {
                path: path.to_path_buf(),
                source,
            })?;
        let catalog = Self::from_json_str(&contents, &path.display().to_string())?;
        info!(
            path = %path.display(),
            products = catalog.len(),
            "Product catalog loaded"
        );
        Ok(catalog)
    }

    /// Download the catalog from the product service
    pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Self, SetupError> {
        let fetch_err = |reason: String| SetupError::CatalogFetch {
            url: url.to_string(),
            reason,
        };

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fetch_err(format!("HTTP {}", status.as_u16())));
        }
        let body = response.text().await.map_err(|e| fetch_err(e.to_string()))?;

        let catalog = Self::from_json_str(&body, url)?;
        info!(url, products = catalog.len(), "Product catalog fetched");
        Ok(catalog)
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_wrapped_document() {
        let catalog = Catalog::from_json_str(
            r#"{"products": [{"sku": "SKU-1", "name": "Mug", "price": 9.5}, {"sku": "SKU-2"}]}"#,
            "inline",
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.products()[0].sku, "SKU-1");
        assert_eq!(catalog.products()[0].attributes["name"], "Mug");
    }

    #[test]
    fn test_bare_array_document() {
        let catalog = Catalog::from_json_str(r#"[{"sku": "A"}]"#, "inline").unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_empty_catalog_is_setup_error() {
        let err = Catalog::from_json_str(r#"{"products": []}"#, "inline").unwrap_err();
        assert!(matches!(err, SetupError::CatalogEmpty { .. }));
    }

    #[test]
    fn test_product_without_sku_is_malformed() {
        let err = Catalog::from_json_str(r#"[{"name": "no sku"}]"#, "inline").unwrap_err();
        assert!(matches!(err, SetupError::CatalogMalformed { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = Catalog::from_path("/definitely/not/here/products.json").unwrap_err();
        assert!(matches!(err, SetupError::CatalogMissing { .. }));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"products": [{{"sku": "X-1"}}, {{"sku": "X-2"}}]}}"#).unwrap();
        let catalog = Catalog::from_path(file.path()).unwrap();
        assert_eq!(catalog.len(), 2);
    }
}
