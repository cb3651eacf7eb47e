use crate::catalog::FileRecord;
use crate::config::ViewConfig;
use crate::platform;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes virtual tree entries to disk under `base`.
///
/// With links enabled a leaf is a symlink to `{placeholder_root}/{file_id}`,
/// a small file holding `root:path`. The placeholder outlives tree rebuilds,
/// so links stay valid across swaps. Without links a leaf is an empty file.
pub struct Materializer {
    base: PathBuf,
    placeholder_root: Option<PathBuf>,
}

impl Materializer {
    pub fn new(base: PathBuf, config: &ViewConfig) -> io::Result<Self> {
        let placeholder_root = if config.create_links {
            fs::create_dir_all(&config.placeholder_root)?;
            Some(fs::canonicalize(&config.placeholder_root)?)
        } else {
            None
        };
        Ok(Self {
            base,
            placeholder_root,
        })
    }

    pub fn physical_path(&self, virtual_path: &str) -> PathBuf {
        let mut path = self.base.clone();
        for component in virtual_path.split('/').filter(|c| !c.is_empty()) {
            path.push(component);
        }
        path
    }

    pub fn create_dir(&self, virtual_path: &str) -> io::Result<()> {
        fs::create_dir_all(self.physical_path(virtual_path))
    }

    pub fn create_leaf(&self, virtual_path: &str, file: &FileRecord) -> io::Result<()> {
        let path = self.physical_path(virtual_path);
        platform::remove_entry(&path)?;
        match &self.placeholder_root {
            Some(root) => {
                let placeholder = write_placeholder(root, file)?;
                platform::create_link(&placeholder, &path)
            }
            None => fs::File::create(&path).map(|_| ()),
        }
    }

    /// Rewrite the placeholder of `file` if its locator changed.
    pub fn refresh_placeholder(&self, file: &FileRecord) -> io::Result<()> {
        match &self.placeholder_root {
            Some(root) => write_placeholder(root, file).map(|_| ()),
            None => Ok(()),
        }
    }

    pub fn remove(&self, virtual_path: &str) -> io::Result<()> {
        platform::remove_entry(&self.physical_path(virtual_path))
    }

    pub fn remove_placeholder(&self, file_id: i64) -> io::Result<()> {
        match &self.placeholder_root {
            Some(root) => platform::remove_entry(&root.join(file_id.to_string())),
            None => Ok(()),
        }
    }
}

/// Create or refresh the placeholder for `file`, leaving it untouched when
/// its contents are already current.
fn write_placeholder(root: &Path, file: &FileRecord) -> io::Result<PathBuf> {
    let path = root.join(file.id.to_string());
    let locator = format!("{}:{}", file.storage_root_name, file.path);
    if let Ok(existing) = fs::read_to_string(&path) {
        if existing == locator {
            return Ok(path);
        }
    }
    fs::write(&path, locator)?;
    Ok(path)
}
