//! Categorization rules. Each axis maps live catalog records to directories
//! and leaf names; [`plan_tree`] runs every enabled axis over a snapshot and
//! yields the whole tree in parent-before-child order.

use super::naming::{self, sanitize_component, ROOT};
use crate::catalog::{CatalogSnapshot, DuplicateGroup, FileRecord, SizeCategory};
use crate::config::ViewConfig;
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Datelike, Utc};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

pub const CATEGORIES_DIR: &str = "/categories";
pub const SIZES_DIR: &str = "/sizes";
pub const DATES_DIR: &str = "/dates";
pub const DUPLICATES_DIR: &str = "/duplicates";

/// Top-level names owned by the fixed axes. Storage roots may not use them.
pub const RESERVED_NAMES: [&str; 4] = ["categories", "sizes", "dates", "duplicates"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    Type,
    Size,
    Date,
    Duplicates,
    StorageRoots,
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "type" | "types" | "categories" => Ok(Axis::Type),
            "size" | "sizes" => Ok(Axis::Size),
            "date" | "dates" => Ok(Axis::Date),
            "duplicate" | "duplicates" => Ok(Axis::Duplicates),
            "storage_root" | "storage_roots" | "roots" => Ok(Axis::StorageRoots),
            other => Err(format!("unknown view axis '{other}'")),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::Type => "type",
            Axis::Size => "size",
            Axis::Date => "date",
            Axis::Duplicates => "duplicates",
            Axis::StorageRoots => "storage_roots",
        };
        f.write_str(name)
    }
}

impl Axis {
    /// Parse configured axis names. Unknown names are logged and dropped.
    pub fn parse_list(names: &[String]) -> Vec<Axis> {
        let mut axes = Vec::new();
        for name in names {
            match name.parse::<Axis>() {
                Ok(axis) if axes.contains(&axis) => {
                    debug!("Axis '{}' listed twice, ignoring repeat", name)
                }
                Ok(axis) => axes.push(axis),
                Err(e) => warn!("Skipping view rule: {}", e),
            }
        }
        axes
    }
}

// ── Plan ─────────────────────────────────────────────────────────

/// One row of the planned tree. Directories have no target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub path: String,
    pub parent: Option<String>,
    pub target: Option<i64>,
    pub timestamp: i64,
}

impl PlannedEntry {
    pub fn is_directory(&self) -> bool {
        self.target.is_none()
    }
}

/// In-memory tree under construction. Entries keep insertion order, which is
/// always parent before child.
#[derive(Debug)]
pub struct TreePlan {
    entries: Vec<PlannedEntry>,
    kinds: AHashMap<String, bool>,
    leaf_counts: AHashMap<String, usize>,
    mirrored: Vec<(String, i64)>,
    directory_timestamp: i64,
}

impl TreePlan {
    pub fn new(directory_timestamp: i64) -> Self {
        let mut plan = Self {
            entries: Vec::new(),
            kinds: AHashMap::new(),
            leaf_counts: AHashMap::new(),
            mirrored: Vec::new(),
            directory_timestamp,
        };
        plan.ensure_dir(ROOT);
        plan
    }

    /// Add `path` and any missing ancestors. Returns false when a leaf
    /// already occupies `path` or one of its ancestors.
    pub fn ensure_dir(&mut self, path: &str) -> bool {
        match self.kinds.get(path) {
            Some(true) => return true,
            Some(false) => return false,
            None => {}
        }
        let parent = naming::parent_of(path);
        if let Some(parent) = &parent {
            if !self.ensure_dir(parent) {
                return false;
            }
        }
        self.kinds.insert(path.to_string(), true);
        self.entries.push(PlannedEntry {
            path: path.to_string(),
            parent,
            target: None,
            timestamp: self.directory_timestamp,
        });
        true
    }

    /// Add directory `path` on behalf of the directory record `file_id`.
    pub fn mirror_dir(&mut self, path: &str, file_id: i64) -> bool {
        if !self.ensure_dir(path) {
            return false;
        }
        self.mirrored.push((path.to_string(), file_id));
        true
    }

    /// Add a leaf for `file` under `dir`, suffixing the file id on a name
    /// collision. Returns the leaf path, or `None` if it could not be placed.
    pub fn add_leaf(&mut self, dir: &str, name: &str, file: &FileRecord) -> Option<String> {
        if !self.ensure_dir(dir) {
            return None;
        }
        let mut path = naming::join(dir, name);
        if self.kinds.contains_key(&path) {
            path = naming::join(dir, &naming::with_id_suffix(name, file.id));
            if self.kinds.contains_key(&path) {
                return None;
            }
        }
        self.kinds.insert(path.clone(), false);
        *self.leaf_counts.entry(dir.to_string()).or_insert(0) += 1;
        self.entries.push(PlannedEntry {
            path: path.clone(),
            parent: Some(dir.to_string()),
            target: Some(file.id),
            timestamp: file.modified_at,
        });
        Some(path)
    }

    pub fn leaf_count(&self, dir: &str) -> usize {
        self.leaf_counts.get(dir).copied().unwrap_or(0)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.kinds.contains_key(path)
    }

    pub fn entries(&self) -> &[PlannedEntry] {
        &self.entries
    }

    /// Directories that stand for catalog directory records, with the
    /// record id.
    pub fn mirrored(&self) -> &[(String, i64)] {
        &self.mirrored
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Per-file placement ───────────────────────────────────────────

/// Directory and base name of one leaf on a single axis.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeafSpec {
    pub dir: String,
    pub name: String,
}

/// Placement on the storage-roots axis. Directory records mirror as
/// directories, everything else as leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootPlacement {
    Dir(String),
    Leaf(LeafSpec),
}

fn prefixed_name(file: &FileRecord) -> String {
    sanitize_component(&format!("{}_{}", file.storage_root_name, file.name))
}

pub fn type_leaf(file: &FileRecord) -> LeafSpec {
    LeafSpec {
        dir: naming::join(CATEGORIES_DIR, &sanitize_component(file.category())),
        name: prefixed_name(file),
    }
}

pub fn size_bucket_dir(category: SizeCategory) -> String {
    naming::join(SIZES_DIR, category.as_str())
}

pub fn size_leaf(file: &FileRecord) -> LeafSpec {
    LeafSpec {
        dir: size_bucket_dir(file.size_category()),
        name: prefixed_name(file),
    }
}

/// `None` when `modified_at` is outside chrono's representable range.
pub fn date_leaf(file: &FileRecord) -> Option<LeafSpec> {
    let ts = DateTime::<Utc>::from_timestamp(file.modified_at, 0)?;
    Some(LeafSpec {
        dir: format!("{}/{:04}/{:02}", DATES_DIR, ts.year(), ts.month()),
        name: sanitize_component(&format!("{:02}_{}", ts.day(), file.name)),
    })
}

/// Top-level directory of a storage root, or `None` for reserved names.
pub fn root_dir(root_name: &str) -> Option<String> {
    let name = sanitize_component(root_name);
    if RESERVED_NAMES.contains(&name.as_str()) {
        None
    } else {
        Some(naming::join(ROOT, &name))
    }
}

/// `None` when the root name is reserved or the record sits deeper than
/// `max_depth` path components.
pub fn root_placement(file: &FileRecord, max_depth: usize) -> Option<RootPlacement> {
    let mut dir = root_dir(&file.storage_root_name)?;
    let components: Vec<String> = file
        .path
        .split('/')
        .filter(|c| !c.is_empty())
        .map(sanitize_component)
        .collect();
    if components.len() > max_depth {
        return None;
    }
    let (last, parents) = components.split_last()?;
    for component in parents {
        dir = naming::join(&dir, component);
    }
    if file.is_directory {
        Some(RootPlacement::Dir(naming::join(&dir, last)))
    } else {
        Some(RootPlacement::Leaf(LeafSpec {
            dir,
            name: last.clone(),
        }))
    }
}

/// Leaves a live file should have on the type, size, date and storage-root
/// axes, plus directories it requires on its own (directory records).
pub fn single_file_placement(
    file: &FileRecord,
    axes: &[Axis],
    config: &ViewConfig,
) -> (Vec<LeafSpec>, Vec<String>) {
    let mut leaves = Vec::new();
    let mut dirs = Vec::new();
    for axis in axes {
        match axis {
            Axis::Type if !file.is_directory => leaves.push(type_leaf(file)),
            Axis::Size if !file.is_directory => leaves.push(size_leaf(file)),
            Axis::Date if !file.is_directory => leaves.extend(date_leaf(file)),
            Axis::StorageRoots => match root_placement(file, config.storage_root_depth) {
                Some(RootPlacement::Leaf(spec)) => leaves.push(spec),
                Some(RootPlacement::Dir(dir)) => dirs.push(dir),
                None => {}
            },
            _ => {}
        }
    }
    (leaves, dirs)
}

// ── Whole-tree planning ──────────────────────────────────────────

/// Plan every enabled axis over `snapshot`. Directory timestamps use the
/// snapshot watermark, so an unchanged catalog plans an identical tree.
pub fn plan_tree(snapshot: &CatalogSnapshot, axes: &[Axis], config: &ViewConfig) -> TreePlan {
    let mut plan = TreePlan::new(snapshot.watermark);
    let cap = config.max_links_per_directory;
    let files: Vec<&FileRecord> = snapshot
        .files
        .iter()
        .filter(|f| f.is_live() && !f.is_directory)
        .collect();

    for axis in axes {
        let before = plan.len();
        match axis {
            Axis::Type => plan_types(&mut plan, &files, cap),
            Axis::Size => plan_sizes(&mut plan, &files, cap),
            Axis::Date => plan_dates(&mut plan, &files, cap),
            Axis::Duplicates => plan_duplicates(&mut plan, &snapshot.groups, &files, cap),
            Axis::StorageRoots => plan_storage_roots(&mut plan, snapshot, config),
        }
        debug!("Axis {} planned {} entries", axis, plan.len() - before);
    }
    plan
}

fn plan_types(plan: &mut TreePlan, files: &[&FileRecord], cap: usize) {
    plan.ensure_dir(CATEGORIES_DIR);
    let mut by_dir: BTreeMap<String, Vec<(&FileRecord, LeafSpec)>> = BTreeMap::new();
    for file in files {
        let spec = type_leaf(file);
        by_dir.entry(spec.dir.clone()).or_default().push((file, spec));
    }
    for (dir, mut members) in by_dir {
        members.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        plan.ensure_dir(&dir);
        for (file, spec) in members.into_iter().take(cap) {
            plan.add_leaf(&spec.dir, &spec.name, file);
        }
    }
}

fn plan_sizes(plan: &mut TreePlan, files: &[&FileRecord], cap: usize) {
    plan.ensure_dir(SIZES_DIR);
    for category in SizeCategory::ALL {
        plan.ensure_dir(&size_bucket_dir(category));
    }
    let mut by_bucket: BTreeMap<SizeCategory, Vec<&FileRecord>> = BTreeMap::new();
    for file in files {
        by_bucket.entry(file.size_category()).or_default().push(file);
    }
    for (_, mut members) in by_bucket {
        members.sort_by_key(|f| (Reverse(f.size), f.id));
        for file in members.into_iter().take(cap) {
            let spec = size_leaf(file);
            plan.add_leaf(&spec.dir, &spec.name, file);
        }
    }
}

fn plan_dates(plan: &mut TreePlan, files: &[&FileRecord], cap: usize) {
    plan.ensure_dir(DATES_DIR);
    let mut by_month: BTreeMap<String, Vec<(&FileRecord, LeafSpec)>> = BTreeMap::new();
    for file in files {
        match date_leaf(file) {
            Some(spec) => by_month.entry(spec.dir.clone()).or_default().push((file, spec)),
            None => warn!(
                "File {} has unrepresentable modified time {}",
                file.id, file.modified_at
            ),
        }
    }
    for (_, mut members) in by_month {
        members.sort_by_key(|(f, _)| (Reverse(f.modified_at), f.id));
        for (file, spec) in members.into_iter().take(cap) {
            plan.add_leaf(&spec.dir, &spec.name, file);
        }
    }
}

fn plan_duplicates(
    plan: &mut TreePlan,
    groups: &[DuplicateGroup],
    files: &[&FileRecord],
    cap: usize,
) {
    plan.ensure_dir(DUPLICATES_DIR);
    let mut members: AHashMap<i64, Vec<&FileRecord>> = AHashMap::new();
    for file in files {
        if let Some(group_id) = file.duplicate_group_id {
            members.entry(group_id).or_default().push(file);
        }
    }
    let mut ordered: Vec<&DuplicateGroup> = groups.iter().collect();
    ordered.sort_by_key(|g| g.id);
    for group in ordered {
        if let Some(group_members) = members.get_mut(&group.id) {
            plan_duplicate_group(plan, group, group_members, cap);
        }
    }
}

/// Plan one group's directory. Groups with at most one file, or without live
/// members, get no directory. Returns the directory path when planned.
pub fn plan_duplicate_group(
    plan: &mut TreePlan,
    group: &DuplicateGroup,
    members: &mut [&FileRecord],
    cap: usize,
) -> Option<String> {
    if group.file_count <= 1 || members.is_empty() {
        return None;
    }
    members.sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id)));

    let mut dir = naming::join(DUPLICATES_DIR, &naming::duplicate_dir_name(group));
    if plan.contains(&dir) {
        dir = format!("{}_{}", dir, group.id);
    }
    if !plan.ensure_dir(&dir) {
        return None;
    }
    for (index, file) in members.iter().take(cap).enumerate() {
        let name = sanitize_component(&format!("{}_{}", index + 1, file.name));
        plan.add_leaf(&dir, &name, file);
    }
    Some(dir)
}

fn plan_storage_roots(plan: &mut TreePlan, snapshot: &CatalogSnapshot, config: &ViewConfig) {
    let cap = config.max_links_per_directory;
    let mut seen_dirs: AHashSet<String> = AHashSet::new();

    for root in snapshot.enabled_roots() {
        let Some(top) = root_dir(&root.name) else {
            warn!(
                "Storage root '{}' uses a reserved name, skipping it in the view",
                root.name
            );
            continue;
        };
        if !seen_dirs.insert(top.clone()) {
            warn!(
                "Storage root '{}' maps onto an existing directory {}",
                root.name, top
            );
        }
        plan.ensure_dir(&top);

        let mut files: Vec<&FileRecord> = snapshot
            .files
            .iter()
            .filter(|f| f.storage_root_id == root.id && f.is_live())
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id)));

        for file in files {
            match root_placement(file, config.storage_root_depth) {
                Some(RootPlacement::Dir(dir)) => {
                    plan.mirror_dir(&dir, file.id);
                }
                Some(RootPlacement::Leaf(spec)) => {
                    if plan.leaf_count(&spec.dir) < cap {
                        plan.add_leaf(&spec.dir, &spec.name, file);
                    }
                }
                None => {}
            }
        }
    }
}
