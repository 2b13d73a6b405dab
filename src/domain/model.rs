use crate::utils::error::Result;
use crate::utils::validation::validate_repository_url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// A remote package repository, identified by its address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Repository {
    url: Url,
}

impl Repository {
    pub fn parse(uri: &str) -> Result<Self> {
        let url = validate_repository_url("repository", uri)?;
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl Serialize for Repository {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.url.as_str())
    }
}

/// Enabled flag per known repository, as emitted by the repository manager.
pub type RepositoryStates = BTreeMap<Repository, bool>;

/// Declaration order is the display order: releases, then tags, then branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Release,
    Tag,
    Branch,
}

impl VariantKind {
    /// Every release is also a tag.
    pub fn is_tag(self) -> bool {
        matches!(self, VariantKind::Release | VariantKind::Tag)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariantKind::Release => "release",
            VariantKind::Tag => "tag",
            VariantKind::Branch => "branch",
        }
    }
}

// Field order drives the derived ordering: kind first, then name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Variant {
    pub kind: VariantKind,
    pub name: String,
}

impl Variant {
    pub fn new(name: impl Into<String>, kind: VariantKind) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn release(name: impl Into<String>) -> Self {
        Self::new(name, VariantKind::Release)
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self::new(name, VariantKind::Tag)
    }

    pub fn branch(name: impl Into<String>) -> Self {
        Self::new(name, VariantKind::Branch)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ModelPackage {
    pub name: String,
    pub repository: Repository,
}

impl ModelPackage {
    pub fn new(name: impl Into<String>, repository: Repository) -> Self {
        Self {
            name: name.into(),
            repository,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PackageVariant {
    pub package: ModelPackage,
    pub variant: Variant,
}

impl PackageVariant {
    pub fn new(package: ModelPackage, variant: Variant) -> Self {
        Self { package, variant }
    }

    pub fn kind(&self) -> VariantKind {
        self.variant.kind
    }
}

impl fmt::Display for PackageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.package.name, self.variant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpticsDefinition {
    pub name: String,
}

impl OpticsDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeDefinition {
    pub name: String,
}

impl RangeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Picks the element whose name matches `wanted`, falling back to the first.
fn default_by_name<'a, T>(
    items: &'a [T],
    wanted: Option<&str>,
    name_of: impl Fn(&T) -> &str,
) -> Option<&'a T> {
    wanted
        .and_then(|wanted| items.iter().find(|item| name_of(item) == wanted))
        .or_else(|| items.first())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceDefinition {
    pub name: String,
    #[serde(default)]
    pub ranges: Vec<RangeDefinition>,
    #[serde(default)]
    pub default_range: Option<String>,
}

impl SequenceDefinition {
    pub fn new(name: impl Into<String>, ranges: Vec<RangeDefinition>) -> Self {
        Self {
            name: name.into(),
            ranges,
            default_range: None,
        }
    }

    pub fn with_default_range(mut self, name: impl Into<String>) -> Self {
        self.default_range = Some(name.into());
        self
    }

    pub fn default_range(&self) -> Option<&RangeDefinition> {
        default_by_name(&self.ranges, self.default_range.as_deref(), |r| &r.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    #[serde(default)]
    pub optics: Vec<OpticsDefinition>,
    #[serde(default)]
    pub default_optics: Option<String>,
    #[serde(default)]
    pub sequences: Vec<SequenceDefinition>,
    #[serde(default)]
    pub default_sequence: Option<String>,
}

impl ModelDefinition {
    pub fn new(
        name: impl Into<String>,
        optics: Vec<OpticsDefinition>,
        sequences: Vec<SequenceDefinition>,
    ) -> Self {
        Self {
            name: name.into(),
            optics,
            default_optics: None,
            sequences,
            default_sequence: None,
        }
    }

    pub fn with_default_optics(mut self, name: impl Into<String>) -> Self {
        self.default_optics = Some(name.into());
        self
    }

    pub fn with_default_sequence(mut self, name: impl Into<String>) -> Self {
        self.default_sequence = Some(name.into());
        self
    }

    pub fn default_optics(&self) -> Option<&OpticsDefinition> {
        default_by_name(&self.optics, self.default_optics.as_deref(), |o| &o.name)
    }

    pub fn default_sequence(&self) -> Option<&SequenceDefinition> {
        default_by_name(&self.sequences, self.default_sequence.as_deref(), |s| &s.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Online,
    Offline,
}

impl Mode {
    pub fn from_online(online: bool) -> Self {
        if online {
            Mode::Online
        } else {
            Mode::Offline
        }
    }

    pub fn is_online(self) -> bool {
        self == Mode::Online
    }
}

/// How much a finished selection has to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionType {
    /// Model definition plus a startup configuration (optics and range).
    #[default]
    All,
    ModelDefinitionOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartupConfiguration {
    pub optics: OpticsDefinition,
    pub range: RangeDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSelection {
    pub definition: ModelDefinition,
    pub startup: Option<StartupConfiguration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repository {
        Repository::parse("https://gitlab.example.org/modelpacks").unwrap()
    }

    #[test]
    fn test_release_is_a_tag() {
        assert!(VariantKind::Release.is_tag());
        assert!(VariantKind::Tag.is_tag());
        assert!(!VariantKind::Branch.is_tag());
    }

    #[test]
    fn test_variant_order_is_kind_then_name() {
        let mut variants = vec![
            Variant::branch("main"),
            Variant::tag("v1"),
            Variant::release("2.0"),
            Variant::release("1.0"),
        ];
        variants.sort();
        let labels: Vec<String> = variants.iter().map(ToString::to_string).collect();
        assert_eq!(
            labels,
            vec!["release: 1.0", "release: 2.0", "tag: v1", "branch: main"]
        );
    }

    #[test]
    fn test_default_falls_back_to_first() {
        let seq = SequenceDefinition::new(
            "lhcb1",
            vec![RangeDefinition::new("ALL"), RangeDefinition::new("IP1")],
        );
        assert_eq!(seq.default_range().unwrap().name, "ALL");

        let seq = seq.with_default_range("IP1");
        assert_eq!(seq.default_range().unwrap().name, "IP1");

        let seq = SequenceDefinition::new("lhcb2", vec![RangeDefinition::new("ALL")])
            .with_default_range("missing");
        assert_eq!(seq.default_range().unwrap().name, "ALL");

        let empty = ModelDefinition::new("empty", vec![], vec![]);
        assert!(empty.default_optics().is_none());
        assert!(empty.default_sequence().is_none());
    }

    #[test]
    fn test_package_variant_display() {
        let pv = PackageVariant::new(ModelPackage::new("lhc", repo()), Variant::tag("v1"));
        assert_eq!(pv.to_string(), "lhc (tag: v1)");
        assert_eq!(repo().to_string(), "https://gitlab.example.org/modelpacks");
    }

    #[test]
    fn test_selection_type_deserializes_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            kind: SelectionType,
        }
        let w: Wrapper = toml::from_str("kind = \"model-definition-only\"").unwrap();
        assert_eq!(w.kind, SelectionType::ModelDefinitionOnly);
    }
}
