use std::io;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, warn};

/// A private directory under the scratch root for one URL's pipeline.
///
/// Fetchers write into it and the whole directory goes away on every exit
/// path, including fetch failure, publish failure and panics. Two tasks for
/// the same item id never share a file.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub async fn create(root: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(root).await?;
        let dir = tempfile::Builder::new().prefix("item-").tempdir_in(root)?;
        debug!("Created scratch directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the directory now and log instead of failing.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Removed scratch directory {}", path.display()),
            Err(e) => warn!("Failed to remove scratch directory {}: {}", path.display(), e),
        }
    }
}
