mod common;

use catalog_projector::view::axes::DUPLICATES_DIR;
use catalog_projector::{
    CancelToken, Catalog, Error, ProgressReporter, SilentReporter, ViewBuilder,
};
use common::*;
use std::collections::BTreeSet;
use std::fs;
use std::sync::{Arc, Mutex};

const DUP_DIR: &str = "/duplicates/abcdef12_2files_97.7KB";

fn leaf_set(view: &ViewBuilder) -> BTreeSet<(String, i64)> {
    view.entries()
        .unwrap()
        .into_iter()
        .filter_map(|e| e.target_file_id.map(|id| (e.virtual_path, id)))
        .collect()
}

fn target_of(view: &ViewBuilder, path: &str) -> Option<i64> {
    view.entry(path).unwrap().and_then(|e| e.target_file_id)
}

fn path_set(view: &ViewBuilder) -> BTreeSet<String> {
    view.entries()
        .unwrap()
        .into_iter()
        .map(|e| e.virtual_path)
        .collect()
}

#[test]
fn test_rebuild_projects_every_axis() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [beach, report, copy, backup]) = sample_catalog();
    let view = ViewBuilder::new(view_config(dir.path())).unwrap();

    let outcome = view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();
    assert!(outcome.is_clean(), "unexpected skips: {:?}", outcome.skipped);

    assert_eq!(target_of(&view, "/categories/image/nas_beach.jpg"), Some(beach));
    assert_eq!(target_of(&view, "/sizes/medium/nas_beach.jpg"), Some(beach));
    assert_eq!(target_of(&view, "/dates/2023/11/14_beach.jpg"), Some(beach));
    assert_eq!(target_of(&view, "/dates/2023/11/13_report.pdf"), Some(report));
    assert_eq!(target_of(&view, "/nas/Photos/beach.jpg"), Some(beach));
    assert_eq!(target_of(&view, "/nas/Docs/report copy.pdf"), Some(copy));
    assert_eq!(target_of(&view, &format!("{DUP_DIR}/1_report.pdf")), Some(backup));
    assert_eq!(target_of(&view, &format!("{DUP_DIR}/2_report copy.pdf")), Some(copy));

    for bucket in ["empty", "tiny", "small", "medium", "large", "huge", "massive"] {
        let entry = view.entry(&format!("/sizes/{bucket}")).unwrap().unwrap();
        assert!(entry.is_directory);
    }
    assert!(view.verify().unwrap().is_consistent());
}

#[test]
fn test_name_collision_gets_id_suffix() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [_, report, copy, backup]) = sample_catalog();
    let view = ViewBuilder::new(view_config(dir.path())).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    let names: Vec<(String, Option<i64>)> = view
        .children("/categories/document")
        .unwrap()
        .into_iter()
        .map(|e| (e.virtual_path, e.target_file_id))
        .collect();
    assert_eq!(
        names,
        vec![
            ("/categories/document/nas_report copy.pdf".to_string(), Some(copy)),
            ("/categories/document/nas_report.pdf".to_string(), Some(report)),
            (format!("/categories/document/nas_report_{backup}.pdf"), Some(backup)),
        ]
    );
}

#[test]
fn test_every_entry_has_directory_parent() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _) = sample_catalog();
    let view = ViewBuilder::new(view_config(dir.path())).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    let entries = view.entries().unwrap();
    let dirs: BTreeSet<&str> = entries
        .iter()
        .filter(|e| e.is_directory)
        .map(|e| e.virtual_path.as_str())
        .collect();
    for entry in &entries {
        match entry.parent_virtual_path.as_deref() {
            None => assert_eq!(entry.virtual_path, "/"),
            Some(parent) => assert!(dirs.contains(parent), "{} has no parent", entry.virtual_path),
        }
    }
}

#[test]
fn test_rebuild_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _) = sample_catalog();
    let view = ViewBuilder::new(view_config(dir.path())).unwrap();

    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();
    let first = view.entries().unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();
    let second = view.entries().unwrap();

    assert_eq!(first, second);
    assert!(view.verify().unwrap().is_consistent());
    let previous = dir.path().join("mnt").join("catalog.previous");
    let staging = dir.path().join("mnt").join("catalog.staging");
    assert!(!previous.exists());
    assert!(!staging.exists());
}

#[cfg(unix)]
#[test]
fn test_leaves_link_to_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [beach, ..]) = sample_catalog();
    let config = view_config(dir.path());
    let view = ViewBuilder::new(config.clone()).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    let leaf = config.mount_root.join("categories").join("image").join("nas_beach.jpg");
    let meta = fs::symlink_metadata(&leaf).unwrap();
    assert!(meta.file_type().is_symlink());
    assert_eq!(fs::read_to_string(&leaf).unwrap(), "nas:Photos/beach.jpg");
    assert!(config.placeholder_root.join(beach.to_string()).is_file());
}

#[test]
fn test_markers_without_links() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _) = sample_catalog();
    let mut config = view_config(dir.path());
    config.create_links = false;
    let view = ViewBuilder::new(config.clone()).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    let leaf = config.mount_root.join("sizes").join("medium").join("nas_beach.jpg");
    let meta = fs::symlink_metadata(&leaf).unwrap();
    assert!(meta.file_type().is_file());
    assert_eq!(meta.len(), 0);
    assert!(!config.placeholder_root.exists());
}

#[test]
fn test_unknown_axis_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _) = sample_catalog();
    let mut config = view_config(dir.path());
    config.axes = vec!["type".to_string(), "colour".to_string()];
    let view = ViewBuilder::new(config).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    let top: Vec<String> = view
        .children("/")
        .unwrap()
        .into_iter()
        .map(|e| e.virtual_path)
        .collect();
    assert_eq!(top, vec!["/categories".to_string()]);
}

#[test]
fn test_directory_cap_truncates_members() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _) = sample_catalog();
    let mut config = view_config(dir.path());
    config.max_links_per_directory = 2;
    let view = ViewBuilder::new(config).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    assert_eq!(view.children("/categories/document").unwrap().len(), 2);
    assert_eq!(view.children("/sizes/small").unwrap().len(), 2);
}

#[test]
fn test_deep_records_and_directories_on_storage_axis() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _) = sample_catalog();
    let nas = catalog.list_storage_roots(true).unwrap()[0].id;
    add_directory(&catalog, nas, "Music");
    let deep = add_file(&catalog, nas, "Music/Jazz/song.mp3", 4_000, NOV_14_2023, Some("audio"));

    let view = ViewBuilder::new(view_config(dir.path())).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    let music = view.entry("/nas/Music").unwrap().unwrap();
    assert!(music.is_directory);
    assert!(view.entry("/nas/Music/Jazz/song.mp3").unwrap().is_none());
    assert_eq!(target_of(&view, "/categories/audio/nas_song.mp3"), Some(deep));
    assert!(view.entry("/categories/other/nas_Music").unwrap().is_none());
}

#[test]
fn test_dead_records_are_not_projected() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [beach, report, ..]) = sample_catalog();
    let attic = add_root(&catalog, "attic", false);
    let hidden = add_file(&catalog, attic, "old.txt", 10, NOV_14_2023, Some("document"));
    mark_deleted(&catalog, beach);

    let view = ViewBuilder::new(view_config(dir.path())).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    assert!(view.leaves_for_file(beach).unwrap().is_empty());
    assert!(view.leaves_for_file(hidden).unwrap().is_empty());
    assert!(view.entry("/attic").unwrap().is_none());
    assert!(!view.leaves_for_file(report).unwrap().is_empty());
}

#[test]
fn test_incremental_changes_leave_no_orphans() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [beach, report, ..]) = sample_catalog();
    let view = ViewBuilder::new(view_config(dir.path())).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    set_size(&catalog, beach, 20_000_000);
    view.file_changed(&catalog, beach).unwrap();
    assert!(view.entry("/sizes/medium/nas_beach.jpg").unwrap().is_none());
    assert_eq!(target_of(&view, "/sizes/large/nas_beach.jpg"), Some(beach));
    assert_eq!(target_of(&view, "/categories/image/nas_beach.jpg"), Some(beach));

    mark_deleted(&catalog, beach);
    view.file_changed(&catalog, beach).unwrap();
    assert!(view.leaves_for_file(beach).unwrap().is_empty());
    assert!(view.entry("/categories/image").unwrap().is_none());
    assert!(view.entry("/nas/Photos").unwrap().is_none());
    assert!(view.entry("/sizes/large").unwrap().is_some());

    view.file_removed(report).unwrap();
    assert!(view.leaves_for_file(report).unwrap().is_empty());
    assert!(view.entry("/nas/Docs").unwrap().is_some());

    let report = view.verify().unwrap();
    assert!(report.is_consistent(), "{report:?}");
}

#[test]
fn test_incremental_update_matches_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [beach, ..]) = sample_catalog();
    let nas = catalog.list_storage_roots(true).unwrap()[0].id;
    let view = ViewBuilder::new(view_config(dir.path())).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    set_size(&catalog, beach, 200);
    view.file_changed(&catalog, beach).unwrap();
    let added = add_file(&catalog, nas, "Photos/sunset.png", 3_000_000, NOV_14_2023 - 60, Some("image"));
    view.file_changed(&catalog, added).unwrap();
    let incremental = leaf_set(&view);

    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();
    assert_eq!(incremental, leaf_set(&view));
}

#[test]
fn test_demoted_group_directory_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [_, _, copy, _]) = sample_catalog();
    let view = ViewBuilder::new(view_config(dir.path())).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();
    assert!(view.entry(DUP_DIR).unwrap().is_some());

    let group_id = catalog.get_file(copy).unwrap().unwrap().duplicate_group_id.unwrap();
    catalog
        .connection()
        .execute(
            "UPDATE duplicate_groups SET file_count = 1, total_size = 50000 WHERE id = ?1",
            [group_id],
        )
        .unwrap();
    catalog
        .connection()
        .execute(
            "UPDATE files SET is_duplicate = 0, duplicate_group_id = NULL WHERE id = ?1",
            [copy],
        )
        .unwrap();

    view.duplicate_group_changed(&catalog, group_id).unwrap();
    assert!(view.children(DUPLICATES_DIR).unwrap().is_empty());
    assert!(view.entry(DUPLICATES_DIR).unwrap().is_some());
    assert!(view.verify().unwrap().is_consistent());
}

#[test]
fn test_failed_leaf_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [beach, report, ..]) = sample_catalog();
    let config = view_config(dir.path());
    fs::create_dir_all(config.placeholder_root.join(beach.to_string())).unwrap();

    let view = ViewBuilder::new(config).unwrap();
    let outcome = view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    assert!(outcome.skipped_count() >= 4);
    assert!(outcome.skipped.iter().all(|s| s.item.contains("beach")));
    assert!(view.leaves_for_file(beach).unwrap().is_empty());
    assert!(!view.leaves_for_file(report).unwrap().is_empty());
    assert!(view.verify().unwrap().is_consistent());
}

#[test]
fn test_cancelled_rebuild_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _) = sample_catalog();
    let config = view_config(dir.path());
    let view = ViewBuilder::new(config.clone()).unwrap();

    let token = CancelToken::new();
    token.cancel();
    let result = view.rebuild(&catalog, &SilentReporter, &token);

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!config.mount_root.exists());
    assert!(!dir.path().join("mnt").join("catalog.staging").exists());
    assert!(view.entries().unwrap().is_empty());
}

#[test]
fn test_cancelled_rebuild_keeps_live_tree() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _) = sample_catalog();
    let view = ViewBuilder::new(view_config(dir.path())).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();
    let before = view.entries().unwrap();

    let token = CancelToken::new();
    token.cancel();
    assert!(view.rebuild(&catalog, &SilentReporter, &token).is_err());
    assert_eq!(view.entries().unwrap(), before);
    assert!(view.verify().unwrap().is_consistent());
}

#[test]
fn test_spawned_rebuild_joins() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [beach, ..]) = sample_catalog();
    let view = Arc::new(ViewBuilder::new(view_config(dir.path())).unwrap());

    let handle = view.spawn_rebuild(catalog, Arc::new(SilentReporter));
    let outcome = handle.join().unwrap();

    assert!(outcome.succeeded > 0);
    assert_eq!(view.leaves_for_file(beach).unwrap().len(), 4);
}

#[cfg(unix)]
#[test]
fn test_rebuild_sweeps_placeholders_of_vanished_files() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [beach, report, ..]) = sample_catalog();
    let config = view_config(dir.path());
    let view = ViewBuilder::new(config.clone()).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    let placeholder = config.placeholder_root.join(beach.to_string());
    assert!(placeholder.is_file());

    catalog
        .connection()
        .execute("DELETE FROM files WHERE id = ?1", [beach])
        .unwrap();
    fs::write(config.placeholder_root.join("notes.txt"), "keep").unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    assert!(!placeholder.exists());
    assert!(config.placeholder_root.join(report.to_string()).is_file());
    assert!(config.placeholder_root.join("notes.txt").exists());
    assert!(view.verify().unwrap().is_consistent());
}

#[test]
fn test_pruning_keeps_directories_of_live_directory_records() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, _) = sample_catalog();
    let nas = catalog.list_storage_roots(true).unwrap()[0].id;
    let music = add_directory(&catalog, nas, "Music");
    let song = add_file(&catalog, nas, "Music/song.mp3", 4_000, NOV_14_2023, Some("audio"));

    let view = ViewBuilder::new(view_config(dir.path())).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();
    assert_eq!(target_of(&view, "/nas/Music/song.mp3"), Some(song));

    mark_deleted(&catalog, song);
    view.file_changed(&catalog, song).unwrap();
    assert!(view.entry("/nas/Music/song.mp3").unwrap().is_none());
    assert!(view.entry("/nas/Music").unwrap().unwrap().is_directory);

    let incremental = path_set(&view);
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();
    assert_eq!(incremental, path_set(&view));

    mark_deleted(&catalog, music);
    view.file_changed(&catalog, music).unwrap();
    assert!(view.entry("/nas/Music").unwrap().is_none());
    assert!(view.entry("/nas").unwrap().is_some());
    assert!(view.verify().unwrap().is_consistent());
}

#[test]
fn test_directory_record_added_incrementally_survives_pruning() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, [beach, ..]) = sample_catalog();
    let nas = catalog.list_storage_roots(true).unwrap()[0].id;
    let view = ViewBuilder::new(view_config(dir.path())).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();

    let photos = add_directory(&catalog, nas, "Photos");
    view.file_changed(&catalog, photos).unwrap();
    view.file_removed(beach).unwrap();

    assert!(view.entry("/nas/Photos").unwrap().is_some());
    assert!(view.verify().unwrap().is_consistent());
}

/// Deletes one file from the catalog as soon as the rebuild has planned.
struct DeleteAfterPlanning<'a> {
    view: &'a ViewBuilder,
    catalog: Mutex<Catalog>,
    file_id: i64,
}

impl ProgressReporter for DeleteAfterPlanning<'_> {
    fn on_plan_complete(&self, _entries: usize, _duration_secs: f64) {
        let catalog = self.catalog.lock().unwrap();
        mark_deleted(&catalog, self.file_id);
        self.view.file_changed(&catalog, self.file_id).unwrap();
    }
}

#[test]
fn test_change_during_rebuild_is_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("catalog.db");
    let db_path = db_path.to_str().unwrap();
    let catalog = Catalog::create(db_path).unwrap();
    let [beach, report, ..] = populate_sample(&catalog);

    let config = view_config(dir.path());
    let view = ViewBuilder::new(config.clone()).unwrap();
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();
    assert_eq!(view.leaves_for_file(beach).unwrap().len(), 4);

    let reporter = DeleteAfterPlanning {
        view: &view,
        catalog: Mutex::new(Catalog::create(db_path).unwrap()),
        file_id: beach,
    };
    view.rebuild(&catalog, &reporter, &CancelToken::new()).unwrap();

    assert!(view.leaves_for_file(beach).unwrap().is_empty());
    assert!(!view.leaves_for_file(report).unwrap().is_empty());
    assert!(!config.placeholder_root.join(beach.to_string()).exists());
    assert!(view.verify().unwrap().is_consistent());

    let replayed = path_set(&view);
    view.rebuild(&catalog, &SilentReporter, &CancelToken::new()).unwrap();
    assert_eq!(replayed, path_set(&view));
}
