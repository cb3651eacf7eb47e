use std::io;
use std::path::Path;

/// File symlinks need either admin rights or developer mode on Windows.
pub fn create_file_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
