#[cfg(target_os = "windows")]
pub mod windows;

use std::fs;
use std::io;
use std::path::Path;

/// Create a symbolic link at `link` pointing to `target`.
#[cfg(target_os = "windows")]
pub fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    windows::create_file_link(target, link)
}

#[cfg(not(target_os = "windows"))]
pub fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Remove a file or link without following it. Missing paths are not an error.
pub fn remove_entry(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_remove_entry_missing_is_ok() {
        let tmp = tempdir().unwrap();
        assert!(remove_entry(&tmp.path().join("nope")).is_ok());
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_remove_entry_removes_link_not_target() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("target");
        let link = tmp.path().join("link");
        fs::write(&target, "x").unwrap();
        create_link(&target, &link).unwrap();

        remove_entry(&link).unwrap();
        assert!(fs::symlink_metadata(&link).is_err());
        assert!(target.exists());
    }
}
