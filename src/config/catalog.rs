//! Catalog override configuration

use serde::Deserialize;

use crate::domain::catalog::{Catalog, CatalogOverrides};

use super::error::ConfigError;

/// Catalog configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// YAML file with pricing and feature-mapping overrides
    #[serde(default)]
    pub overrides_path: Option<String>,
}

impl CatalogConfig {
    /// Builds the catalog, applying the overrides file if one is configured.
    ///
    /// `currency` applies unless the file sets its own.
    pub fn load(&self, currency: &str) -> Result<Catalog, ConfigError> {
        let mut overrides = match self.overrides_path.as_deref().filter(|p| !p.is_empty()) {
            Some(path) => {
                let source =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::CatalogFile {
                        path: path.to_string(),
                        source,
                    })?;
                CatalogOverrides::from_yaml(&source)?
            }
            None => CatalogOverrides::default(),
        };
        if overrides.currency.is_none() {
            overrides.currency = Some(currency.to_string());
        }

        Ok(Catalog::load(&overrides)?)
    }
}
