//! # Cache Manifest
//!
//! Which assets belong to a deployed version and how requests for them are
//! served.
//!
//! ```toml
//! generation = "till-v3-cache"
//! precache = ["/", "/index.html", "/static/js/main.js"]
//! offline_page = "/offline.html"
//! offline_image = "/images/offline-image.png"
//! revalidate_prefixes = ["/static/"]
//! ```
//!
//! Every section is optional; missing keys keep their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

pub const DEFAULT_GENERATION: &str = "till-v3-cache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheManifest {
    /// Cache generation. Bumping it on deploy retires every older cache.
    pub generation: String,

    /// Asset paths fetched and stored by `install`.
    pub precache: Vec<String>,

    /// Served to navigations that miss the cache while offline.
    pub offline_page: String,

    /// Served to image requests that miss the cache while offline.
    pub offline_image: String,

    /// Cache hits under these path prefixes are refreshed in the background.
    pub revalidate_prefixes: Vec<String>,
}

impl Default for CacheManifest {
    fn default() -> Self {
        CacheManifest {
            generation: DEFAULT_GENERATION.to_string(),
            precache: [
                "/",
                "/index.html",
                "/manifest.json",
                "/favicon.ico",
                "/logo192.png",
                "/logo512.png",
                "/static/js/main.js",
                "/static/css/main.css",
                "/offline.html",
                "/images/offline-image.png",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            offline_page: "/offline.html".to_string(),
            offline_image: "/images/offline-image.png".to_string(),
            revalidate_prefixes: vec!["/static/".to_string()],
        }
    }
}

impl CacheManifest {
    pub fn from_toml_str(contents: &str) -> CacheResult<Self> {
        let manifest: CacheManifest = toml::from_str(contents)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> CacheResult<Self> {
        debug!(path = %path.display(), "Loading cache manifest");
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.generation.trim().is_empty() {
            return Err(CacheError::Manifest("generation must not be empty".into()));
        }
        if let Some(path) = self.precache.iter().find(|p| !p.starts_with('/')) {
            return Err(CacheError::Manifest(format!(
                "precache path must start with '/': {}",
                path
            )));
        }
        Ok(())
    }

    /// Whether a hit on `path` is refreshed in the background.
    pub fn revalidates(&self, path: &str) -> bool {
        self.revalidate_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_manifest() {
        let manifest = CacheManifest::default();
        assert_eq!(manifest.generation, "till-v3-cache");
        assert!(manifest.precache.contains(&manifest.offline_page));
        assert!(manifest.precache.contains(&manifest.offline_image));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let manifest = CacheManifest::from_toml_str(r#"generation = "till-v4-cache""#).unwrap();
        assert_eq!(manifest.generation, "till-v4-cache");
        assert_eq!(manifest.offline_page, "/offline.html");
    }

    #[test]
    fn test_invalid_manifests() {
        assert!(CacheManifest::from_toml_str(r#"generation = " ""#).is_err());
        assert!(CacheManifest::from_toml_str(r#"precache = ["index.html"]"#).is_err());
        assert!(CacheManifest::from_toml_str("generation = 3").is_err());
    }

    #[test]
    fn test_revalidates() {
        let manifest = CacheManifest::default();
        assert!(manifest.revalidates("/static/js/main.js"));
        assert!(!manifest.revalidates("/index.html"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"precache = ["/", "/app.js"]"#).unwrap();

        let manifest = CacheManifest::load(file.path()).unwrap();
        assert_eq!(manifest.precache, vec!["/", "/app.js"]);
    }
}
