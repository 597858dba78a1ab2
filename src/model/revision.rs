//! Dataset revision identity
//!
//! A revision names one immutable dataset snapshot inside the versioned
//! object store. The `branch@task` pair doubles as the name of the index
//! collection built for it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifies one immutable dataset snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRevision {
    /// Root directory of the object-store sandbox
    pub sandbox_root: PathBuf,
    /// Owner of the repository
    pub user_id: String,
    /// Repository holding the dataset
    pub repo_id: String,
    /// Branch (dataset) id
    pub branch_id: String,
    /// Task that produced this revision
    pub task_id: String,
}

impl DatasetRevision {
    pub fn new(
        sandbox_root: impl Into<PathBuf>,
        user_id: impl Into<String>,
        repo_id: impl Into<String>,
        branch_id: impl Into<String>,
        task_id: impl Into<String>,
    ) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
            user_id: user_id.into(),
            repo_id: repo_id.into(),
            branch_id: branch_id.into(),
            task_id: task_id.into(),
        }
    }

    /// Stable `branch@task` key, used as the index collection name
    pub fn revision_key(&self) -> String {
        format!("{}@{}", self.branch_id, self.task_id)
    }

    /// Directory holding the repository's revisions
    pub fn repo_dir(&self) -> PathBuf {
        self.sandbox_root.join(&self.user_id).join(&self.repo_id)
    }

    /// Directory holding this revision's snapshot files
    pub fn revision_dir(&self) -> PathBuf {
        self.repo_dir().join(self.revision_key())
    }

    /// Path of a named snapshot file within this revision
    pub fn file_path(&self, name: &str) -> PathBuf {
        self.revision_dir().join(format!("{}.mir", name))
    }

    /// Check that every id is a single plain path segment
    ///
    /// Ids become directory names under the sandbox root and `branch@task`
    /// becomes a collection name, so separators, dot segments and NUL are
    /// rejected everywhere and `@` in the branch or task.
    pub fn validate(&self) -> Result<(), String> {
        let ids = [
            ("user_id", &self.user_id),
            ("repo_id", &self.repo_id),
            ("branch_id", &self.branch_id),
            ("task_id", &self.task_id),
        ];
        for (field, value) in ids {
            if value.is_empty() {
                return Err(format!("{} must not be empty", field));
            }
            if value == "." || value.contains("..") || value.contains(['/', '\\', '\0']) {
                return Err(format!("{} {:?} is not a plain path segment", field, value));
            }
        }
        for (field, value) in [("branch_id", &self.branch_id), ("task_id", &self.task_id)] {
            if value.contains('@') {
                return Err(format!("{} {:?} must not contain '@'", field, value));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for DatasetRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.user_id,
            self.repo_id,
            self.revision_key()
        )
    }
}
