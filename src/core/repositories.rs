use crate::core::property::Property;
use crate::domain::model::{Repository, RepositoryStates};
use crate::domain::ports::RepositoryManager;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryLine {
    pub repository: Repository,
    pub label: String,
    pub enabled: bool,
}

/// Sorted view of the repository manager's enable map.
///
/// The view never changes on its own: toggles go to the manager and show up
/// here once the manager publishes its next snapshot.
pub struct RepositoryEnablementRegistry {
    manager: Arc<dyn RepositoryManager>,
    lines: Property<Vec<RepositoryLine>>,
}

impl RepositoryEnablementRegistry {
    pub fn new(manager: Arc<dyn RepositoryManager>) -> Self {
        Self {
            manager,
            lines: Property::default(),
        }
    }

    pub fn lines(&self) -> &Property<Vec<RepositoryLine>> {
        &self.lines
    }

    pub fn apply_snapshot(&mut self, snapshot: &RepositoryStates) {
        let mut lines: Vec<RepositoryLine> = snapshot
            .iter()
            .map(|(repository, enabled)| RepositoryLine {
                repository: repository.clone(),
                label: repository.to_string(),
                enabled: *enabled,
            })
            .collect();
        lines.sort_by(|a, b| a.label.cmp(&b.label));

        tracing::debug!("Repository snapshot with {} entries", lines.len());
        self.lines.set(lines);
    }

    pub fn toggle(&self, repository: &Repository, enabled: bool) {
        tracing::info!(
            "{} repository {}",
            if enabled { "Enabling" } else { "Disabling" },
            repository
        );
        if enabled {
            self.manager.enable(repository);
        } else {
            self.manager.disable(repository);
        }
    }
}
