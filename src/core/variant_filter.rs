use crate::core::property::Property;
use crate::domain::model::{ModelPackage, PackageVariant, VariantKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::ops::Range;

/// Which variant kinds are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantFilter {
    pub show_releases: bool,
    pub show_tags: bool,
    pub show_branches: bool,
}

impl Default for VariantFilter {
    fn default() -> Self {
        Self {
            show_releases: true,
            show_tags: false,
            show_branches: false,
        }
    }
}

impl VariantFilter {
    pub fn all() -> Self {
        Self {
            show_releases: true,
            show_tags: true,
            show_branches: true,
        }
    }

    pub fn accepts(&self, variant: &PackageVariant) -> bool {
        // Releases are tags too, so they must be decided before the tag rule.
        let kind = variant.kind();
        if kind == VariantKind::Release {
            return self.show_releases;
        }
        if kind.is_tag() {
            return self.show_tags;
        }
        self.show_branches
    }

    pub fn with_shown(mut self, kind: VariantKind, shown: bool) -> Self {
        match kind {
            VariantKind::Release => self.show_releases = shown,
            VariantKind::Tag => self.show_tags = shown,
            VariantKind::Branch => self.show_branches = shown,
        }
        self
    }
}

/// One row of the package tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub label: String,
    pub package: ModelPackage,
    /// `None` for a package folder.
    pub variant: Option<PackageVariant>,
    /// Indices of this node's children in [`VariantTree::nodes`].
    pub children: Range<usize>,
}

/// Two-level package tree stored as a flat arena: package folders first, then
/// the variant leaves of each folder in one contiguous block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariantTree {
    nodes: Vec<TreeNode>,
    roots: usize,
}

impl VariantTree {
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.nodes[..self.roots]
    }

    pub fn children(&self, node: &TreeNode) -> &[TreeNode] {
        &self.nodes[node.children.clone()]
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Visible variants in display order.
    pub fn leaves(&self) -> impl Iterator<Item = &PackageVariant> {
        self.nodes[self.roots..]
            .iter()
            .filter_map(|node| node.variant.as_ref())
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            let _ = writeln!(out, "{}  [{}]", root.label, root.package.repository);
            for child in self.children(root) {
                let _ = writeln!(out, "  {}", child.label);
            }
        }
        out
    }
}

/// All variants discovered by the current refresh, grouped by package.
#[derive(Debug, Default)]
pub struct VariantFilterIndex {
    index: BTreeMap<ModelPackage, BTreeSet<PackageVariant>>,
    filter: Property<VariantFilter>,
}

impl VariantFilterIndex {
    pub fn new(filter: VariantFilter) -> Self {
        Self {
            index: BTreeMap::new(),
            filter: Property::new(filter),
        }
    }

    /// Returns false if the variant was already known.
    pub fn add_variant(&mut self, variant: PackageVariant) -> bool {
        self.index
            .entry(variant.package.clone())
            .or_default()
            .insert(variant)
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }

    pub fn package_count(&self) -> usize {
        self.index.len()
    }

    pub fn variant_count(&self) -> usize {
        self.index.values().map(BTreeSet::len).sum()
    }

    pub fn filter(&self) -> &Property<VariantFilter> {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: VariantFilter) -> bool {
        let changed = self.filter.set(filter);
        if changed {
            tracing::debug!("Variant filter changed: {:?}", filter);
        }
        changed
    }

    pub fn set_shown(&mut self, kind: VariantKind, shown: bool) -> bool {
        let filter = self.filter.get().with_shown(kind, shown);
        self.set_filter(filter)
    }

    /// Predicate for the current toggles.
    pub fn predicate(&self) -> impl Fn(&PackageVariant) -> bool {
        let filter = self.filter.get();
        move |variant| filter.accepts(variant)
    }

    pub fn find(&self, package: &str, variant: &str) -> Option<&PackageVariant> {
        self.index
            .iter()
            .filter(|(p, _)| p.name == package)
            .flat_map(|(_, variants)| variants.iter())
            .find(|v| v.variant.name == variant)
    }

    pub fn render<P>(&self, predicate: P) -> VariantTree
    where
        P: Fn(&PackageVariant) -> bool,
    {
        let groups: Vec<(&ModelPackage, Vec<&PackageVariant>)> = self
            .index
            .iter()
            .map(|(package, variants)| {
                (package, variants.iter().filter(|&v| predicate(v)).collect::<Vec<_>>())
            })
            .filter(|(_, variants)| !variants.is_empty())
            .collect();

        let roots = groups.len();
        let mut nodes = Vec::with_capacity(roots + groups.iter().map(|(_, v)| v.len()).sum::<usize>());
        let mut next_child = roots;
        for (package, variants) in &groups {
            let children = next_child..next_child + variants.len();
            next_child = children.end;
            nodes.push(TreeNode {
                label: package.name.clone(),
                package: (*package).clone(),
                variant: None,
                children,
            });
        }
        for (package, variants) in &groups {
            for variant in variants {
                nodes.push(TreeNode {
                    label: variant.variant.to_string(),
                    package: (*package).clone(),
                    variant: Some((*variant).clone()),
                    children: 0..0,
                });
            }
        }

        VariantTree { nodes, roots }
    }

    pub fn render_filtered(&self) -> VariantTree {
        self.render(self.predicate())
    }
}
