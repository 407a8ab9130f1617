use std::{
    fs, io,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use uuid::Uuid;

/// A uniquely named directory under the system temp dir, removed with
/// everything in it when dropped.
pub struct ScratchDirectory {
    path: PathBuf,
}

impl ScratchDirectory {
    pub fn new(prefix: &str) -> io::Result<Self> {
        Self::new_in(std::env::temp_dir(), prefix)
    }

    pub fn new_in(parent: impl AsRef<Path>, prefix: &str) -> io::Result<Self> {
        // jobs run with their own working directory, so the path must not be relative
        let path = std::path::absolute(parent)?
            .join(format!("{}-{}", prefix, Uuid::new_v4().simple()));
        fs::create_dir_all(&path)?;
        debug!("Created scratch directory {path:?}");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subdirectory(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.path.join(name);
        fs::create_dir(&path)?;
        Ok(path)
    }
}

impl Drop for ScratchDirectory {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!("Could not remove scratch directory {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::ScratchDirectory;

    #[test]
    fn test_removed_on_drop() {
        let path = {
            let scratch = ScratchDirectory::new("scratch-test").unwrap();
            let job = scratch.subdirectory("job-0").unwrap();
            fs::write(job.join("a.vert.spv"), b"spirv").unwrap();
            assert!(job.is_dir());
            scratch.path().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[test]
    fn test_unique_names() {
        let a = ScratchDirectory::new("scratch-test").unwrap();
        let b = ScratchDirectory::new("scratch-test").unwrap();
        assert_ne!(a.path(), b.path());
    }
}
