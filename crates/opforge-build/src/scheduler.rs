//! One active build per output destination.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use opforge_core::BuildConfiguration;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::pipeline::{BuildHandle, BuildPipeline};

type ActiveSet = Arc<Mutex<HashSet<PathBuf>>>;

fn lock(active: &ActiveSet) -> MutexGuard<'_, HashSet<PathBuf>> {
    // The set stays consistent even if a holder panicked.
    active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Starts builds, rejecting a second run for a destination that is busy.
#[derive(Clone, Default)]
pub struct BuildScheduler {
    pipeline: BuildPipeline,
    active: ActiveSet,
}

/// Releases a destination when the worker task ends.
struct DestinationSlot {
    active: ActiveSet,
    destination: PathBuf,
}

impl Drop for DestinationSlot {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.destination);
        debug!(destination = %self.destination.display(), "destination released");
    }
}

impl BuildScheduler {
    pub fn new(pipeline: BuildPipeline) -> Self {
        Self {
            pipeline,
            active: Arc::default(),
        }
    }

    pub fn pipeline(&self) -> &BuildPipeline {
        &self.pipeline
    }

    /// Start a build, or fail with [`PipelineError::DestinationBusy`].
    pub fn start(&self, config: Arc<BuildConfiguration>) -> Result<BuildHandle> {
        let destination = normalize(config.output_dir());
        {
            let mut active = lock(&self.active);
            if !active.insert(destination.clone()) {
                warn!(destination = %destination.display(), "rejected concurrent build");
                return Err(PipelineError::DestinationBusy(destination));
            }
        }

        let slot = DestinationSlot {
            active: Arc::clone(&self.active),
            destination,
        };
        Ok(self.pipeline.spawn_guarded(config, slot))
    }

    pub fn is_busy(&self, destination: &Path) -> bool {
        lock(&self.active).contains(&normalize(destination))
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }
}

/// Key for a destination that is the same before and after it is created.
///
/// The path is made absolute and lexically cleaned, then the longest existing
/// ancestor is canonicalized and the missing tail re-appended.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }

    let mut missing = Vec::new();
    let mut existing = cleaned.as_path();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, name| acc.join(name));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return cleaned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable_across_creation() {
        let base = tempfile::tempdir().unwrap();
        let dest = base.path().join("out").join("efi");

        let before = normalize(&dest);
        std::fs::create_dir_all(&dest).unwrap();
        let after = normalize(&dest);

        assert_eq!(before, after);
        assert_eq!(after, std::fs::canonicalize(&dest).unwrap());
    }

    #[test]
    fn test_dot_components_collapse() {
        let base = tempfile::tempdir().unwrap();
        let plain = normalize(&base.path().join("out"));
        let dotted = normalize(&base.path().join("x").join("..").join(".").join("out"));
        assert_eq!(plain, dotted);
    }

    #[test]
    fn test_relative_path_resolves_against_cwd() {
        let rel = Path::new("opforge-not-created-yet");
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(normalize(rel), normalize(&cwd.join(rel)));
        assert!(normalize(rel).is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_parent_shares_key() {
        let base = tempfile::tempdir().unwrap();
        let real = base.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = base.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        assert_eq!(normalize(&link.join("out")), normalize(&real.join("out")));
    }
}
