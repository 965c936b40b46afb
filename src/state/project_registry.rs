//! Set of known projects with change notifications

use std::collections::BTreeSet;

use tokio::sync::watch;
use tracing::info;

/// Known project IDs. Every membership change is published on a watch
/// channel so the project guard can react to deletions.
#[derive(Debug)]
pub struct ProjectRegistry {
    projects_tx: watch::Sender<BTreeSet<String>>,
}

impl ProjectRegistry {
    pub fn new<I, S>(projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let projects = projects.into_iter().map(Into::into).collect();
        let (projects_tx, _) = watch::channel(projects);
        Self { projects_tx }
    }

    /// Add a project. Returns false if it was already known.
    pub fn add(&self, project_id: &str) -> bool {
        let added = self
            .projects_tx
            .send_if_modified(|projects| projects.insert(project_id.to_string()));
        if added {
            info!("Project {} added", project_id);
        }
        added
    }

    /// Remove a project. Returns false if it was not known.
    pub fn remove(&self, project_id: &str) -> bool {
        let removed = self
            .projects_tx
            .send_if_modified(|projects| projects.remove(project_id));
        if removed {
            info!("Project {} removed", project_id);
        }
        removed
    }

    pub fn contains(&self, project_id: &str) -> bool {
        self.projects_tx.borrow().contains(project_id)
    }

    pub fn projects(&self) -> Vec<String> {
        self.projects_tx.borrow().iter().cloned().collect()
    }

    /// Receiver that is marked changed on every membership change
    pub fn subscribe(&self) -> watch::Receiver<BTreeSet<String>> {
        self.projects_tx.subscribe()
    }
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}
