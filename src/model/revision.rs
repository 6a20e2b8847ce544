//! Revision identifiers of the form `branch@task-id`.

use std::fmt;
use std::str::FromStr;

use crate::error::MirError;

/// A branch plus task id addressing one commit in a repository.
///
/// The task id is optional: a bare branch name addresses the branch head.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision {
    pub branch: String,
    pub task_id: Option<String>,
}

impl Revision {
    pub fn new(branch: impl Into<String>, task_id: Option<&str>) -> Self {
        Self {
            branch: branch.into(),
            task_id: task_id.filter(|t| !t.is_empty()).map(str::to_string),
        }
    }

    /// Join a branch and task id into a revision string; an empty task id
    /// yields the bare branch.
    pub fn join(branch: &str, task_id: &str) -> String {
        if task_id.is_empty() {
            branch.to_string()
        } else {
            format!("{}@{}", branch, task_id)
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.task_id {
            Some(task_id) => write!(f, "{}@{}", self.branch, task_id),
            None => f.write_str(&self.branch),
        }
    }
}

impl FromStr for Revision {
    type Err = MirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (branch, task_id) = match s.split_once('@') {
            Some((branch, task_id)) => {
                if task_id.is_empty() || task_id.contains('@') {
                    return Err(MirError::InvalidRevision(s.to_string()));
                }
                (branch, Some(task_id))
            }
            None => (s, None),
        };
        if branch.is_empty() {
            return Err(MirError::InvalidRevision(s.to_string()));
        }
        Ok(Self::new(branch, task_id))
    }
}
