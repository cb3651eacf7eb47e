//! The categorized virtual tree: planning, materialization, the ledger, and
//! the copy-on-write rebuild that ties them together.

pub mod axes;
pub mod ledger;
pub mod materialize;
pub mod naming;

pub use axes::Axis;
pub use ledger::{Ledger, VirtualEntry};

use crate::cancel::CancelToken;
use crate::catalog::{Catalog, CatalogSnapshot, DuplicateGroup, FileRecord};
use crate::config::ViewConfig;
use crate::error::Error;
use crate::outcome::BatchOutcome;
use crate::platform;
use crate::progress::ProgressReporter;
use ahash::{AHashMap, AHashSet};
use axes::{LeafSpec, TreePlan, DUPLICATES_DIR, SIZES_DIR};
use materialize::Materializer;
use naming::ROOT;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const PROGRESS_INTERVAL: usize = 500;

/// A change that arrived while a rebuild was materializing its staging tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PendingChange {
    File(i64),
    Group(i64),
}

/// Differences between the ledger and the physical tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeReport {
    pub missing_on_disk: Vec<String>,
    pub unexpected_on_disk: Vec<String>,
    /// Ledger rows whose parent is not a directory row.
    pub orphaned: Vec<String>,
}

impl TreeReport {
    pub fn is_consistent(&self) -> bool {
        self.missing_on_disk.is_empty() && self.unexpected_on_disk.is_empty() && self.orphaned.is_empty()
    }
}

/// A rebuild running on its own thread.
pub struct RebuildHandle {
    handle: JoinHandle<Result<BatchOutcome, Error>>,
    cancel: CancelToken,
}

impl RebuildHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn join(self) -> Result<BatchOutcome, Error> {
        self.handle
            .join()
            .map_err(|_| Error::Other("rebuild thread panicked".to_string()))?
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn read_lock(lock: &RwLock<()>) -> RwLockReadGuard<'_, ()> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock(lock: &RwLock<()>) -> RwLockWriteGuard<'_, ()> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// `{path}.{suffix}` next to `path`.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// The root, the axis roots and the size buckets are never pruned.
fn is_pinned(path: &str) -> bool {
    naming::depth(path) <= 1 || naming::parent_of(path).as_deref() == Some(SIZES_DIR)
}

fn is_duplicates_path(path: &str) -> bool {
    path.starts_with(DUPLICATES_DIR) && path[DUPLICATES_DIR.len()..].starts_with('/')
}

/// Owns the virtual tree under `mount_root` and its ledger.
///
/// Readers take the tree lock shared. Incremental updates and the final swap
/// of a rebuild take it exclusively; materializing a rebuild happens in a
/// staging directory without holding it.
pub struct ViewBuilder {
    config: ViewConfig,
    axes: Vec<Axis>,
    ledger: Mutex<Ledger>,
    tree_lock: RwLock<()>,
    rebuild_gate: Mutex<()>,
    pending: Mutex<Option<BTreeSet<PendingChange>>>,
}

impl ViewBuilder {
    pub fn new(config: ViewConfig) -> Result<Self, Error> {
        let ledger = Ledger::open(&config.ledger_db_path)?;
        Ok(Self::with_ledger(config, ledger))
    }

    pub fn with_ledger(config: ViewConfig, ledger: Ledger) -> Self {
        let axes = Axis::parse_list(&config.axes);
        Self {
            config,
            axes,
            ledger: Mutex::new(ledger),
            tree_lock: RwLock::new(()),
            rebuild_gate: Mutex::new(()),
            pending: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    fn live_materializer(&self) -> Result<Materializer, Error> {
        Ok(Materializer::new(self.config.mount_root.clone(), &self.config)?)
    }

    fn record_pending(&self, change: PendingChange) {
        if let Some(pending) = lock(&self.pending).as_mut() {
            pending.insert(change);
        }
    }

    // ── Rebuild ──────────────────────────────────────────────────

    /// Regenerate the whole tree from a fresh catalog snapshot.
    ///
    /// The new tree is built beside the live one and swapped in at the end.
    /// Changes reported while it runs are replayed after the swap.
    pub fn rebuild(
        &self,
        catalog: &Catalog,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome, Error> {
        let _gate = lock(&self.rebuild_gate);
        *lock(&self.pending) = Some(BTreeSet::new());

        let result = self.rebuild_tree(catalog, reporter, cancel);
        let pending = lock(&self.pending).take().unwrap_or_default();
        let mut outcome = result?;

        if !pending.is_empty() {
            info!("Replaying {} changes received during rebuild", pending.len());
            for change in pending {
                let replayed = match change {
                    PendingChange::File(id) => self.file_changed(catalog, id)?,
                    PendingChange::Group(id) => self.duplicate_group_changed(catalog, id)?,
                };
                outcome.merge(replayed);
            }
        }
        Ok(outcome)
    }

    /// Run [`rebuild`](Self::rebuild) on a background thread.
    pub fn spawn_rebuild(
        self: &Arc<Self>,
        catalog: Catalog,
        reporter: Arc<dyn ProgressReporter>,
    ) -> RebuildHandle {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let builder = Arc::clone(self);
        let handle = thread::spawn(move || builder.rebuild(&catalog, reporter.as_ref(), &token));
        RebuildHandle { handle, cancel }
    }

    fn rebuild_tree(
        &self,
        catalog: &Catalog,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome, Error> {
        reporter.on_rebuild_start();
        let started = Instant::now();
        info!("Rebuilding view at {}", self.config.mount_root.display());

        let snapshot = catalog.snapshot()?;
        cancel.check()?;
        let plan = axes::plan_tree(&snapshot, &self.axes, &self.config);
        reporter.on_plan_complete(plan.len(), started.elapsed().as_secs_f64());
        info!(
            "Planned {} entries from {} live files",
            plan.len(),
            snapshot.files.len()
        );

        let staging = sibling_path(&self.config.mount_root, "staging");
        platform::remove_entry(&staging)?;

        let (rows, mut outcome) =
            match self.materialize_plan(&plan, &snapshot, &staging, reporter, cancel) {
                Ok(done) => done,
                Err(e) => {
                    self.discard_staging(&staging);
                    return Err(e);
                }
            };
        let created: AHashSet<&str> = rows.iter().map(|r| r.virtual_path.as_str()).collect();
        let mirrored: Vec<(String, i64)> = plan
            .mirrored()
            .iter()
            .filter(|(path, _)| created.contains(path.as_str()))
            .cloned()
            .collect();
        let staged = lock(&self.ledger).replace_staging(&rows, &mirrored);
        if let Err(e) = staged {
            self.discard_staging(&staging);
            return Err(e.into());
        }
        if let Err(e) = cancel.check() {
            self.discard_staging(&staging);
            return Err(e);
        }

        self.swap_in(&staging)?;
        self.sweep_placeholders(&mut outcome);
        reporter.on_swap_complete(rows.len(), started.elapsed().as_secs_f64());
        info!(
            "View rebuilt: {} entries, {} skipped in {:.2}s",
            rows.len(),
            outcome.skipped_count(),
            started.elapsed().as_secs_f64()
        );
        Ok(outcome)
    }

    fn materialize_plan(
        &self,
        plan: &TreePlan,
        snapshot: &CatalogSnapshot,
        staging: &Path,
        reporter: &dyn ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<(Vec<VirtualEntry>, BatchOutcome), Error> {
        if let Some(parent) = staging.parent() {
            fs::create_dir_all(parent)?;
        }
        let materializer = Materializer::new(staging.to_path_buf(), &self.config)?;
        let files: AHashMap<i64, &FileRecord> = snapshot.files.iter().map(|f| (f.id, f)).collect();

        let total = plan.len();
        let mut rows = Vec::with_capacity(total);
        let mut failed_dirs: AHashSet<&str> = AHashSet::new();
        let mut outcome = BatchOutcome::new();

        for (i, entry) in plan.entries().iter().enumerate() {
            cancel.check_sparse(i)?;

            let parent_failed = entry
                .parent
                .as_deref()
                .is_some_and(|parent| failed_dirs.contains(parent));
            if parent_failed {
                if entry.is_directory() {
                    failed_dirs.insert(&entry.path);
                }
                outcome.skip(entry.path.clone(), "parent directory was not created");
                continue;
            }

            let result = match entry.target {
                None => materializer.create_dir(&entry.path),
                Some(id) => match files.get(&id) {
                    Some(file) => materializer.create_leaf(&entry.path, file),
                    None => Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("file {id} missing from snapshot"),
                    )),
                },
            };
            match result {
                Ok(()) => {
                    rows.push(VirtualEntry::from(entry));
                    outcome.success();
                }
                Err(e) => {
                    if entry.is_directory() {
                        failed_dirs.insert(&entry.path);
                    }
                    outcome.skip(entry.path.clone(), e);
                }
            }

            if (i + 1) % PROGRESS_INTERVAL == 0 || i + 1 == total {
                reporter.on_materialize_progress(i + 1, total);
            }
        }
        Ok((rows, outcome))
    }

    fn discard_staging(&self, staging: &Path) {
        if let Err(e) = platform::remove_entry(staging) {
            warn!("Could not remove staging tree {}: {}", staging.display(), e);
        }
        if let Err(e) = lock(&self.ledger).clear_staging() {
            warn!("Could not clear staged ledger rows: {}", e);
        }
    }

    /// Replace the live tree and ledger with the staged ones. Readers are
    /// blocked only for the two renames and the ledger transaction.
    fn swap_in(&self, staging: &Path) -> Result<(), Error> {
        let live = self.config.mount_root.as_path();
        let previous = sibling_path(live, "previous");
        {
            let _tree = write_lock(&self.tree_lock);
            let ledger = lock(&self.ledger);

            platform::remove_entry(&previous)?;
            let had_live = fs::symlink_metadata(live).is_ok();
            if had_live {
                fs::rename(live, &previous)?;
            }
            if let Err(e) = fs::rename(staging, live) {
                if had_live {
                    restore(&previous, live);
                }
                return Err(e.into());
            }
            if let Err(e) = ledger.promote_staging() {
                warn!("Ledger swap failed, restoring previous tree: {}", e);
                restore(live, staging);
                if had_live {
                    restore(&previous, live);
                }
                return Err(e.into());
            }
        }
        if let Err(e) = platform::remove_entry(&previous) {
            warn!("Could not remove previous tree {}: {}", previous.display(), e);
        }
        Ok(())
    }

    /// Delete placeholders of files that no longer have a leaf in the live
    /// ledger. Files can leave the catalog without a `file_removed` call.
    fn sweep_placeholders(&self, outcome: &mut BatchOutcome) {
        let root = self.config.placeholder_root.as_path();
        if !root.is_dir() {
            return;
        }
        let _tree = write_lock(&self.tree_lock);
        let keep: AHashSet<i64> = match lock(&self.ledger).leaf_targets() {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!("Could not read leaf targets, keeping placeholders: {}", e);
                return;
            }
        };
        let listing = match fs::read_dir(root) {
            Ok(listing) => listing,
            Err(e) => {
                outcome.skip(root.display().to_string(), e);
                return;
            }
        };

        let mut removed = 0usize;
        for entry in listing.flatten() {
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(|n| n.parse::<i64>().ok()) else {
                continue;
            };
            if keep.contains(&id) {
                continue;
            }
            match platform::remove_entry(&entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => outcome.skip(format!("placeholder {id}"), e),
            }
        }
        if removed > 0 {
            debug!("Removed {} stale placeholders", removed);
        }
    }

    // ── Incremental maintenance ──────────────────────────────────

    /// Bring one file's leaves in line with its current catalog record.
    pub fn file_changed(&self, catalog: &Catalog, file_id: i64) -> Result<BatchOutcome, Error> {
        self.record_pending(PendingChange::File(file_id));
        let file = match catalog.get_file(file_id)? {
            Some(file) if file.is_live() => file,
            _ => return self.file_removed(file_id),
        };

        let _tree = write_lock(&self.tree_lock);
        let ledger = lock(&self.ledger);
        let materializer = self.live_materializer()?;
        let mut outcome = BatchOutcome::new();

        let (desired, dirs) = axes::single_file_placement(&file, &self.axes, &self.config);
        let mut satisfied: AHashSet<LeafSpec> = AHashSet::new();
        let mut old_prefixes: BTreeSet<String> = BTreeSet::new();
        let mut stale_parents = Vec::new();

        for leaf in ledger.leaves_for_file(file_id)? {
            let parent = leaf
                .parent_virtual_path
                .clone()
                .unwrap_or_else(|| ROOT.to_string());
            if is_duplicates_path(&leaf.virtual_path) {
                let dir_name = naming::file_name(&parent);
                old_prefixes.insert(naming::prefix_of_duplicate_dir(dir_name).to_string());
                continue;
            }
            let name = naming::file_name(&leaf.virtual_path);
            let matched = desired.iter().find(|spec| {
                spec.dir == parent
                    && !satisfied.contains(*spec)
                    && (spec.name == name || naming::with_id_suffix(&spec.name, file.id) == name)
            });
            match matched {
                Some(spec) => {
                    satisfied.insert(spec.clone());
                }
                None => {
                    ledger.delete(&leaf.virtual_path)?;
                    if let Err(e) = materializer.remove(&leaf.virtual_path) {
                        outcome.skip(leaf.virtual_path.clone(), e);
                    }
                    stale_parents.push(parent);
                }
            }
        }

        if !satisfied.is_empty() {
            if let Err(e) = materializer.refresh_placeholder(&file) {
                outcome.skip(format!("placeholder {}", file.id), e);
            }
        }

        for spec in desired.iter().filter(|spec| !satisfied.contains(*spec)) {
            match self.place_leaf(&ledger, &materializer, spec, &file) {
                Ok(Some(_)) => outcome.success(),
                Ok(None) => debug!(
                    "No room for file {} in {}, leaving it unlisted",
                    file.id, spec.dir
                ),
                Err(e) => outcome.skip(naming::join(&spec.dir, &spec.name), e),
            }
        }
        for dir in &dirs {
            match self.ensure_dir(&ledger, &materializer, dir, file.modified_at) {
                Ok(true) => ledger.mirror(dir, file.id)?,
                Ok(false) => debug!("A leaf occupies {}, not mirroring file {}", dir, file.id),
                Err(e) => outcome.skip(dir.clone(), e),
            }
        }
        for old in ledger.mirrored_for_file(file_id)? {
            if !dirs.contains(&old) {
                ledger.unmirror(&old)?;
                stale_parents.push(old);
            }
        }

        self.prune_empty(&ledger, &materializer, stale_parents, &mut outcome)?;

        if self.axes.contains(&Axis::Duplicates) {
            if let Some(group_id) = file.duplicate_group_id {
                if let Some(group) = catalog.get_duplicate_group(group_id)? {
                    old_prefixes.insert(naming::hash_prefix(&group));
                }
            }
            for prefix in old_prefixes {
                let regenerated = self.regenerate_duplicates(catalog, &ledger, &materializer, &prefix)?;
                outcome.merge(regenerated);
            }
        }

        debug!(
            "Synced file {}: {} placed, {} skipped",
            file_id,
            outcome.succeeded,
            outcome.skipped_count()
        );
        Ok(outcome)
    }

    /// Drop every leaf of a file and prune directories left empty.
    pub fn file_removed(&self, file_id: i64) -> Result<BatchOutcome, Error> {
        self.record_pending(PendingChange::File(file_id));

        let _tree = write_lock(&self.tree_lock);
        let ledger = lock(&self.ledger);
        let materializer = self.live_materializer()?;
        let mut outcome = BatchOutcome::new();

        let mut parents = Vec::new();
        for leaf in ledger.leaves_for_file(file_id)? {
            ledger.delete(&leaf.virtual_path)?;
            match materializer.remove(&leaf.virtual_path) {
                Ok(()) => outcome.success(),
                Err(e) => outcome.skip(leaf.virtual_path.clone(), e),
            }
            parents.extend(leaf.parent_virtual_path);
        }
        if let Err(e) = materializer.remove_placeholder(file_id) {
            outcome.skip(format!("placeholder {file_id}"), e);
        }
        for dir in ledger.mirrored_for_file(file_id)? {
            ledger.unmirror(&dir)?;
            parents.push(dir);
        }

        self.prune_empty(&ledger, &materializer, parents, &mut outcome)?;
        debug!("Removed {} leaves of file {}", outcome.succeeded, file_id);
        Ok(outcome)
    }

    /// Regenerate one duplicate group's directory. Directories of groups that
    /// no longer hold more than one file are removed.
    pub fn duplicate_group_changed(
        &self,
        catalog: &Catalog,
        group_id: i64,
    ) -> Result<BatchOutcome, Error> {
        self.record_pending(PendingChange::Group(group_id));
        let mut outcome = BatchOutcome::new();
        if !self.axes.contains(&Axis::Duplicates) {
            return Ok(outcome);
        }

        let _tree = write_lock(&self.tree_lock);
        let ledger = lock(&self.ledger);
        let materializer = self.live_materializer()?;

        let valid: AHashSet<String> = catalog
            .list_duplicate_groups(2)?
            .iter()
            .map(naming::hash_prefix)
            .collect();
        for dir in ledger.children(DUPLICATES_DIR)? {
            let prefix = naming::prefix_of_duplicate_dir(naming::file_name(&dir.virtual_path));
            if dir.is_directory && !valid.contains(prefix) {
                self.remove_subtree(&ledger, &materializer, &dir.virtual_path, &mut outcome)?;
            }
        }

        if let Some(group) = catalog.get_duplicate_group(group_id)? {
            let prefix = naming::hash_prefix(&group);
            outcome.merge(self.regenerate_duplicates(catalog, &ledger, &materializer, &prefix)?);
        }
        Ok(outcome)
    }

    /// Remove every duplicates directory named with `prefix` and replan the
    /// groups sharing it, in the same order a full rebuild would.
    fn regenerate_duplicates(
        &self,
        catalog: &Catalog,
        ledger: &Ledger,
        materializer: &Materializer,
        prefix: &str,
    ) -> Result<BatchOutcome, Error> {
        let mut outcome = BatchOutcome::new();
        let marker = format!("{prefix}_");
        for dir in ledger.children(DUPLICATES_DIR)? {
            if naming::file_name(&dir.virtual_path).starts_with(&marker) {
                self.remove_subtree(ledger, materializer, &dir.virtual_path, &mut outcome)?;
            }
        }

        let groups: Vec<DuplicateGroup> = catalog
            .list_duplicate_groups(2)?
            .into_iter()
            .filter(|g| naming::hash_prefix(g) == prefix)
            .collect();
        let mut members = Vec::with_capacity(groups.len());
        for group in &groups {
            let files: Vec<FileRecord> = catalog
                .files_in_duplicate_group(group.id)?
                .into_iter()
                .filter(|f| !f.is_directory)
                .collect();
            members.push(files);
        }
        let watermark = members
            .iter()
            .flatten()
            .map(|f| f.modified_at)
            .max()
            .unwrap_or(0);

        let mut plan = TreePlan::new(watermark);
        plan.ensure_dir(DUPLICATES_DIR);
        for (group, files) in groups.iter().zip(&members) {
            let mut refs: Vec<&FileRecord> = files.iter().collect();
            axes::plan_duplicate_group(&mut plan, group, &mut refs, self.config.max_links_per_directory);
        }
        let by_id: AHashMap<i64, &FileRecord> =
            members.iter().flatten().map(|f| (f.id, f)).collect();

        let mut failed_dirs: AHashSet<&str> = AHashSet::new();
        for entry in plan.entries() {
            if entry
                .parent
                .as_deref()
                .is_some_and(|parent| failed_dirs.contains(parent))
            {
                if entry.is_directory() {
                    failed_dirs.insert(&entry.path);
                }
                continue;
            }
            let result = match entry.target {
                None => self
                    .ensure_dir(ledger, materializer, &entry.path, entry.timestamp)
                    .map(|_| ()),
                Some(id) => match by_id.get(&id) {
                    Some(file) => self.insert_leaf(ledger, materializer, &entry.path, file),
                    None => continue,
                },
            };
            match result {
                Ok(()) => {
                    if !entry.is_directory() {
                        outcome.success();
                    }
                }
                Err(e) => {
                    if entry.is_directory() {
                        failed_dirs.insert(&entry.path);
                    }
                    outcome.skip(entry.path.clone(), e);
                }
            }
        }
        Ok(outcome)
    }

    /// Record and create `path` plus any missing ancestors. Returns false when
    /// a leaf occupies the path or one of its ancestors.
    fn ensure_dir(
        &self,
        ledger: &Ledger,
        materializer: &Materializer,
        path: &str,
        timestamp: i64,
    ) -> Result<bool, Error> {
        if let Some(existing) = ledger.get(path)? {
            return Ok(existing.is_directory);
        }
        let parent = naming::parent_of(path);
        if let Some(parent) = &parent {
            if !self.ensure_dir(ledger, materializer, parent, timestamp)? {
                return Ok(false);
            }
        }
        ledger.insert(&VirtualEntry::directory(path, parent, timestamp))?;
        if let Err(e) = materializer.create_dir(path) {
            ledger.delete(path)?;
            return Err(e.into());
        }
        Ok(true)
    }

    fn insert_leaf(
        &self,
        ledger: &Ledger,
        materializer: &Materializer,
        path: &str,
        file: &FileRecord,
    ) -> Result<(), Error> {
        let parent = naming::parent_of(path).unwrap_or_else(|| ROOT.to_string());
        ledger.insert(&VirtualEntry::leaf(path, &parent, file.id, file.modified_at))?;
        if let Err(e) = materializer.create_leaf(path, file) {
            ledger.delete(path)?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Place one leaf, honoring the directory cap and resolving name
    /// collisions the way a rebuild does. `None` means the leaf was not placed.
    fn place_leaf(
        &self,
        ledger: &Ledger,
        materializer: &Materializer,
        spec: &LeafSpec,
        file: &FileRecord,
    ) -> Result<Option<String>, Error> {
        if !self.ensure_dir(ledger, materializer, &spec.dir, file.modified_at)? {
            return Ok(None);
        }

        let mut path = naming::join(&spec.dir, &spec.name);
        if let Some(existing) = ledger.get(&path)? {
            if existing.target_file_id == Some(file.id) {
                return Ok(Some(path));
            }
            path = naming::join(&spec.dir, &naming::with_id_suffix(&spec.name, file.id));
            if let Some(existing) = ledger.get(&path)? {
                return Ok((existing.target_file_id == Some(file.id)).then_some(path));
            }
        }

        let cap = self.config.max_links_per_directory as i64;
        if ledger.count_leaves(&spec.dir)? >= cap {
            return Ok(None);
        }
        self.insert_leaf(ledger, materializer, &path, file)?;
        Ok(Some(path))
    }

    fn remove_subtree(
        &self,
        ledger: &Ledger,
        materializer: &Materializer,
        path: &str,
        outcome: &mut BatchOutcome,
    ) -> Result<(), Error> {
        let removed = ledger.delete_subtree(path)?;
        if let Err(e) = materializer.remove(path) {
            outcome.skip(path.to_string(), e);
        }
        debug!("Removed {} ({} ledger rows)", path, removed);
        Ok(())
    }

    /// Walk up from each directory, deleting ones with no children left.
    /// Directories mirroring a live directory record stay.
    fn prune_empty(
        &self,
        ledger: &Ledger,
        materializer: &Materializer,
        dirs: Vec<String>,
        outcome: &mut BatchOutcome,
    ) -> Result<(), Error> {
        let mut dirs = dirs;
        dirs.sort_by(|a, b| {
            Reverse(naming::depth(a))
                .cmp(&Reverse(naming::depth(b)))
                .then_with(|| a.cmp(b))
        });
        dirs.dedup();

        for dir in dirs {
            let mut current = Some(dir);
            while let Some(path) = current {
                if is_pinned(&path)
                    || ledger.count_children(&path)? > 0
                    || ledger.is_mirrored(&path)?
                {
                    break;
                }
                match ledger.get(&path)? {
                    Some(entry) if entry.is_directory => {}
                    _ => break,
                }
                ledger.delete(&path)?;
                if let Err(e) = materializer.remove(&path) {
                    outcome.skip(path.clone(), e);
                }
                current = naming::parent_of(&path);
            }
        }
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn entry(&self, path: &str) -> Result<Option<VirtualEntry>, Error> {
        let _tree = read_lock(&self.tree_lock);
        Ok(lock(&self.ledger).get(path)?)
    }

    pub fn children(&self, path: &str) -> Result<Vec<VirtualEntry>, Error> {
        let _tree = read_lock(&self.tree_lock);
        Ok(lock(&self.ledger).children(path)?)
    }

    /// Every ledger row, ordered by path.
    pub fn entries(&self) -> Result<Vec<VirtualEntry>, Error> {
        let _tree = read_lock(&self.tree_lock);
        Ok(lock(&self.ledger).all()?)
    }

    pub fn leaves_for_file(&self, file_id: i64) -> Result<Vec<VirtualEntry>, Error> {
        let _tree = read_lock(&self.tree_lock);
        Ok(lock(&self.ledger).leaves_for_file(file_id)?)
    }

    /// Compare the ledger with what is actually under `mount_root`.
    pub fn verify(&self) -> Result<TreeReport, Error> {
        let _tree = read_lock(&self.tree_lock);
        let (expected, orphaned) = {
            let ledger = lock(&self.ledger);
            let expected: BTreeSet<String> =
                ledger.all()?.into_iter().map(|e| e.virtual_path).collect();
            (expected, ledger.orphans()?)
        };

        let root = self.config.mount_root.as_path();
        let mut on_disk: BTreeSet<String> = BTreeSet::new();
        if root.is_dir() {
            on_disk.insert(ROOT.to_string());
            for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
                let entry = entry.map_err(io::Error::from)?;
                let relative = entry
                    .path()
                    .strip_prefix(root)
                    .map_err(|e| Error::Other(e.to_string()))?;
                let components: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                on_disk.insert(format!("/{}", components.join("/")));
            }
        }

        let report = TreeReport {
            missing_on_disk: expected.difference(&on_disk).cloned().collect(),
            unexpected_on_disk: on_disk.difference(&expected).cloned().collect(),
            orphaned,
        };
        if !report.is_consistent() {
            warn!(
                "View drift: {} missing, {} unexpected, {} orphaned",
                report.missing_on_disk.len(),
                report.unexpected_on_disk.len(),
                report.orphaned.len()
            );
        }
        Ok(report)
    }
}

fn restore(from: &Path, to: &Path) {
    if let Err(e) = fs::rename(from, to) {
        warn!("Could not move {} back to {}: {}", from.display(), to.display(), e);
    }
}
