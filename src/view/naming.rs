//! Path and name helpers for the virtual tree. Virtual paths are `/`-rooted
//! and `/`-separated regardless of platform.

use crate::catalog::DuplicateGroup;

pub const ROOT: &str = "/";

const HASH_PREFIX_LEN: usize = 8;

/// Make a catalog name safe to use as a single path component.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

pub fn parent_of(path: &str) -> Option<String> {
    if path == ROOT {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(ROOT.to_string()),
        Some(i) => Some(path[..i].to_string()),
        None => None,
    }
}

pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Number of components below the root; `/` is 0.
pub fn depth(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

/// Collision-free variant of `name`: `{stem}_{id}{.ext}`.
pub fn with_id_suffix(name: &str, id: i64) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{}{}", &name[..dot], id, &name[dot..]),
        _ => format!("{name}_{id}"),
    }
}

pub fn human_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let bytes = bytes.max(0);
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

/// Leading alphanumeric characters of the content hash, or `group{id}` when
/// the hash has none. Never contains `_`.
pub fn hash_prefix(group: &DuplicateGroup) -> String {
    let prefix: String = group
        .content_hash
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(HASH_PREFIX_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    if prefix.is_empty() {
        format!("group{}", group.id)
    } else {
        prefix
    }
}

pub fn duplicate_dir_name(group: &DuplicateGroup) -> String {
    format!(
        "{}_{}files_{}",
        hash_prefix(group),
        group.file_count,
        human_size(group.total_size)
    )
}

/// The hash prefix a duplicates directory was named with.
pub fn prefix_of_duplicate_dir(dir_name: &str) -> &str {
    dir_name.split('_').next().unwrap_or(dir_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_separators() {
        assert_eq!(sanitize_component("a/b\\c\0d"), "a_b_c_d");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component(""), "_");
        assert_eq!(sanitize_component("report.pdf"), "report.pdf");
    }

    #[test]
    fn test_parent_and_depth() {
        assert_eq!(parent_of("/"), None);
        assert_eq!(parent_of("/sizes").as_deref(), Some("/"));
        assert_eq!(parent_of("/sizes/tiny/a").as_deref(), Some("/sizes/tiny"));
        assert_eq!(depth("/"), 0);
        assert_eq!(depth("/sizes/tiny"), 2);
        assert_eq!(join("/", "dates"), "/dates");
        assert_eq!(join("/dates", "2024"), "/dates/2024");
    }

    #[test]
    fn test_id_suffix_keeps_extension() {
        assert_eq!(with_id_suffix("report.pdf", 7), "report_7.pdf");
        assert_eq!(with_id_suffix("Makefile", 7), "Makefile_7");
        assert_eq!(with_id_suffix(".bashrc", 7), ".bashrc_7");
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0B");
        assert_eq!(human_size(512), "512B");
        assert_eq!(human_size(1536), "1.5KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0MB");
    }

    #[test]
    fn test_duplicate_dir_name() {
        let group = DuplicateGroup {
            id: 4,
            content_hash: "ABCDEF0123456789".to_string(),
            file_count: 3,
            total_size: 3072,
        };
        assert_eq!(duplicate_dir_name(&group), "abcdef01_3files_3.0KB");
        assert_eq!(prefix_of_duplicate_dir("abcdef01_3files_3.0KB"), "abcdef01");

        let unhashed = DuplicateGroup {
            content_hash: String::new(),
            ..group
        };
        assert_eq!(hash_prefix(&unhashed), "group4");
    }
}
