use crate::config::toml_config::substitute_env_vars;
use crate::domain::model::{
    ModelDefinition, ModelPackage, PackageVariant, Repository, RepositoryStates, Variant,
    VariantKind,
};
use crate::utils::error::{Result, SelectorError};
use crate::utils::validation::{validate_non_empty_string, Validate};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// On-disk description of the repositories and packages an
/// [`InMemoryCatalog`](super::memory::InMemoryCatalog) serves.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFile {
    /// Simulated delay per delivered package, in milliseconds.
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
    #[serde(default)]
    pub packages: Vec<PackageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryEntry {
    pub uri: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageEntry {
    pub name: String,
    pub repository: String,
    #[serde(default)]
    pub variants: Vec<VariantEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantEntry {
    pub name: String,
    pub kind: VariantKind,
    #[serde(default)]
    pub definitions: Vec<ModelDefinition>,
}

/// A package variant together with the definitions it resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub variant: PackageVariant,
    pub definitions: Vec<ModelDefinition>,
}

impl CatalogFile {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SelectorError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content);
        toml::from_str(&processed).map_err(|e| SelectorError::ConfigValidationError {
            field: "catalog".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    /// Repository states, including repositories only referenced by packages
    /// (those start enabled).
    pub fn repository_states(&self) -> Result<RepositoryStates> {
        let mut states = RepositoryStates::new();
        for entry in &self.repositories {
            states.insert(Repository::parse(&entry.uri)?, entry.enabled);
        }
        for package in &self.packages {
            states.entry(Repository::parse(&package.repository)?).or_insert(true);
        }
        Ok(states)
    }

    pub fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let mut entries = Vec::new();
        for package in &self.packages {
            let model_package = ModelPackage::new(&package.name, Repository::parse(&package.repository)?);
            for variant in &package.variants {
                entries.push(CatalogEntry {
                    variant: PackageVariant::new(
                        model_package.clone(),
                        Variant::new(&variant.name, variant.kind),
                    ),
                    definitions: variant.definitions.clone(),
                });
            }
        }
        Ok(entries)
    }
}

impl Validate for CatalogFile {
    fn validate(&self) -> Result<()> {
        for package in &self.packages {
            validate_non_empty_string("packages.name", &package.name)?;
            for variant in &package.variants {
                validate_non_empty_string("packages.variants.name", &variant.name)?;
                for definition in &variant.definitions {
                    validate_non_empty_string("packages.variants.definitions.name", &definition.name)?;
                }
            }
        }
        self.repository_states().map(|_| ())
    }
}
