#![allow(dead_code)]

use catalog_projector::config::{IndexConfig, ViewConfig};
use catalog_projector::Catalog;
use rusqlite::params;
use std::path::Path;

pub const NOV_14_2023: i64 = 1_700_000_000;

pub fn add_root(catalog: &Catalog, name: &str, enabled: bool) -> i64 {
    catalog
        .connection()
        .execute(
            "INSERT INTO storage_roots (name, protocol, host, path, enabled) \
             VALUES (?1, 'smb', 'nas.local', '/share', ?2)",
            params![name, enabled],
        )
        .unwrap();
    catalog.connection().last_insert_rowid()
}

pub fn add_file(
    catalog: &Catalog,
    root_id: i64,
    path: &str,
    size: i64,
    modified_at: i64,
    file_type: Option<&str>,
) -> i64 {
    let name = path.rsplit('/').next().unwrap_or(path);
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_string());
    catalog
        .connection()
        .execute(
            "INSERT INTO files (storage_root_id, path, name, extension, file_type, size, modified_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![root_id, path, name, extension, file_type, size, modified_at],
        )
        .unwrap();
    catalog.connection().last_insert_rowid()
}

pub fn add_directory(catalog: &Catalog, root_id: i64, path: &str) -> i64 {
    let name = path.rsplit('/').next().unwrap_or(path);
    catalog
        .connection()
        .execute(
            "INSERT INTO files (storage_root_id, path, name, size, modified_at, is_directory) \
             VALUES (?1, ?2, ?3, 0, ?4, 1)",
            params![root_id, path, name, NOV_14_2023],
        )
        .unwrap();
    catalog.connection().last_insert_rowid()
}

pub fn add_group(catalog: &Catalog, content_hash: &str, members: &[i64], size: i64) -> i64 {
    catalog
        .connection()
        .execute(
            "INSERT INTO duplicate_groups (content_hash, file_count, total_size) VALUES (?1, ?2, ?3)",
            params![content_hash, members.len() as i64, size * members.len() as i64],
        )
        .unwrap();
    let group_id = catalog.connection().last_insert_rowid();
    for id in members {
        catalog
            .connection()
            .execute(
                "UPDATE files SET is_duplicate = 1, duplicate_group_id = ?1 WHERE id = ?2",
                params![group_id, id],
            )
            .unwrap();
    }
    group_id
}

pub fn add_metadata(catalog: &Catalog, file_id: i64, key: &str, value: &str) {
    catalog
        .connection()
        .execute(
            "INSERT INTO file_metadata (file_id, key, value) VALUES (?1, ?2, ?3)",
            params![file_id, key, value],
        )
        .unwrap();
}

pub fn set_mime(catalog: &Catalog, file_id: i64, mime: &str) {
    catalog
        .connection()
        .execute("UPDATE files SET mime_type = ?1 WHERE id = ?2", params![mime, file_id])
        .unwrap();
}

pub fn set_content(catalog: &Catalog, file_id: i64, content: &str) {
    catalog
        .connection()
        .execute("UPDATE files SET content = ?1 WHERE id = ?2", params![content, file_id])
        .unwrap();
}

pub fn set_size(catalog: &Catalog, file_id: i64, size: i64) {
    catalog
        .connection()
        .execute("UPDATE files SET size = ?1 WHERE id = ?2", params![size, file_id])
        .unwrap();
}

pub fn mark_deleted(catalog: &Catalog, file_id: i64) {
    catalog
        .connection()
        .execute("UPDATE files SET deleted = 1 WHERE id = ?1", params![file_id])
        .unwrap();
}

pub fn set_root_enabled(catalog: &Catalog, root_id: i64, enabled: bool) {
    catalog
        .connection()
        .execute(
            "UPDATE storage_roots SET enabled = ?1 WHERE id = ?2",
            params![enabled, root_id],
        )
        .unwrap();
}

pub fn view_config(dir: &Path) -> ViewConfig {
    ViewConfig {
        ledger_db_path: dir.join("view.db").to_string_lossy().into_owned(),
        mount_root: dir.join("mnt").join("catalog"),
        placeholder_root: dir.join("placeholders"),
        ..ViewConfig::default()
    }
}

pub fn index_config(dir: &Path) -> IndexConfig {
    IndexConfig {
        path: dir.join("index"),
        writer_heap_bytes: 20_000_000,
        ..IndexConfig::default()
    }
}

/// One enabled root `nas` with a photo, two reports and a duplicated copy.
///
/// Returns the catalog and the ids `[beach, report, report_copy, backup]`.
pub fn sample_catalog() -> (Catalog, [i64; 4]) {
    let catalog = Catalog::open_in_memory().unwrap();
    let ids = populate_sample(&catalog);
    (catalog, ids)
}

/// Fill `catalog` with the records of [`sample_catalog`].
pub fn populate_sample(catalog: &Catalog) -> [i64; 4] {
    let nas = add_root(catalog, "nas", true);
    let beach = add_file(catalog, nas, "Photos/beach.jpg", 2_000_000, NOV_14_2023, Some("image"));
    let report = add_file(catalog, nas, "Docs/report.pdf", 50_000, NOV_14_2023 - 86_400, Some("document"));
    let copy = add_file(
        catalog,
        nas,
        "Docs/report copy.pdf",
        50_000,
        NOV_14_2023 - 3_600,
        Some("document"),
    );
    let backup = add_file(catalog, nas, "Backup/report.pdf", 50_000, NOV_14_2023 - 7_200, Some("document"));
    add_group(catalog, "abcdef1234567890", &[copy, backup], 50_000);
    [beach, report, copy, backup]
}
