use super::models::*;
use super::sqlite::Catalog;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Result, Row};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const FILE_SELECT: &str = "SELECT f.id, f.path, f.name, f.storage_root_id, sr.name, sr.enabled, \
     f.size, f.modified_at, f.extension, f.mime_type, f.file_type, f.is_directory, \
     f.is_duplicate, f.duplicate_group_id, f.content, f.deleted \
     FROM files f JOIN storage_roots sr ON sr.id = f.storage_root_id";

/// Ordering applied by [`Catalog::list_files`]. Every variant ends with the
/// record id so results are deterministic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileOrder {
    #[default]
    Id,
    Name,
    Path,
    SizeDesc,
    ModifiedDesc,
}

impl FileOrder {
    fn sql(&self) -> &'static str {
        match self {
            FileOrder::Id => "f.id",
            FileOrder::Name => "f.name, f.id",
            FileOrder::Path => "f.path, f.id",
            FileOrder::SizeDesc => "f.size DESC, f.id",
            FileOrder::ModifiedDesc => "f.modified_at DESC, f.id",
        }
    }
}

/// Filtered read over file records. The default selects every live record.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// OR'd file-type categories.
    pub file_types: Vec<String>,
    /// Inclusive lower size bound.
    pub min_size: Option<i64>,
    /// Exclusive upper size bound.
    pub max_size: Option<i64>,
    pub modified_after: Option<i64>,
    pub modified_before: Option<i64>,
    pub duplicate_group_id: Option<i64>,
    /// OR'd storage root ids.
    pub storage_root_ids: Vec<i64>,
    pub is_directory: Option<bool>,
    pub only_duplicates: bool,
    /// Also return deleted records and records under disabled roots.
    pub include_dead: bool,
    pub order: FileOrder,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl FileFilter {
    fn where_clause(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Value> = Vec::new();

        if !self.include_dead {
            clauses.push("f.deleted = 0 AND sr.enabled = 1".to_string());
        }
        if !self.file_types.is_empty() {
            clauses.push(format!("f.file_type IN ({})", placeholders(self.file_types.len())));
            args.extend(self.file_types.iter().cloned().map(Value::Text));
        }
        if let Some(min) = self.min_size {
            clauses.push("f.size >= ?".to_string());
            args.push(Value::Integer(min));
        }
        if let Some(max) = self.max_size {
            clauses.push("f.size < ?".to_string());
            args.push(Value::Integer(max));
        }
        if let Some(after) = self.modified_after {
            clauses.push("f.modified_at >= ?".to_string());
            args.push(Value::Integer(after));
        }
        if let Some(before) = self.modified_before {
            clauses.push("f.modified_at < ?".to_string());
            args.push(Value::Integer(before));
        }
        if let Some(group_id) = self.duplicate_group_id {
            clauses.push("f.duplicate_group_id = ?".to_string());
            args.push(Value::Integer(group_id));
        }
        if !self.storage_root_ids.is_empty() {
            clauses.push(format!(
                "f.storage_root_id IN ({})",
                placeholders(self.storage_root_ids.len())
            ));
            args.extend(self.storage_root_ids.iter().copied().map(Value::Integer));
        }
        if let Some(is_directory) = self.is_directory {
            clauses.push("f.is_directory = ?".to_string());
            args.push(Value::Integer(is_directory as i64));
        }
        if self.only_duplicates {
            clauses.push("f.is_duplicate = 1".to_string());
        }

        if clauses.is_empty() {
            (String::new(), args)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), args)
        }
    }
}

/// Everything a full view rebuild needs, read inside one transaction.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    pub roots: Vec<StorageRoot>,
    /// Live records ordered by id.
    pub files: Vec<FileRecord>,
    pub groups: Vec<DuplicateGroup>,
    /// Newest `modified_at` among live records, 0 when empty.
    pub watermark: i64,
}

impl CatalogSnapshot {
    pub fn enabled_roots(&self) -> impl Iterator<Item = &StorageRoot> {
        self.roots.iter().filter(|r| r.enabled)
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn file_from_row(row: &Row<'_>) -> Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        storage_root_id: row.get(3)?,
        storage_root_name: row.get(4)?,
        storage_root_enabled: row.get(5)?,
        size: row.get(6)?,
        modified_at: row.get(7)?,
        extension: row.get(8)?,
        mime_type: row.get(9)?,
        file_type: row.get(10)?,
        is_directory: row.get(11)?,
        is_duplicate: row.get(12)?,
        duplicate_group_id: row.get(13)?,
        content: row.get(14)?,
        metadata: BTreeMap::new(),
        deleted: row.get(15)?,
    })
}

fn root_from_row(row: &Row<'_>) -> Result<StorageRoot> {
    Ok(StorageRoot {
        id: row.get(0)?,
        name: row.get(1)?,
        protocol: row.get(2)?,
        host: row.get(3)?,
        port: row.get(4)?,
        path: row.get(5)?,
        mount_point: row.get(6)?,
        enabled: row.get(7)?,
    })
}

fn group_from_row(row: &Row<'_>) -> Result<DuplicateGroup> {
    Ok(DuplicateGroup {
        id: row.get(0)?,
        content_hash: row.get(1)?,
        file_count: row.get(2)?,
        total_size: row.get(3)?,
    })
}

impl Catalog {
    // ── File Records ─────────────────────────────────────────────

    pub fn get_file(&self, id: i64) -> Result<Option<FileRecord>> {
        let file = self
            .connection()
            .query_row(&format!("{FILE_SELECT} WHERE f.id = ?1"), params![id], file_from_row)
            .optional()?;
        match file {
            Some(mut file) => {
                file.metadata = self.file_metadata(file.id)?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    pub fn list_files(&self, filter: &FileFilter) -> Result<Vec<FileRecord>> {
        let mut files = self.query_files(filter)?;
        for file in files.iter_mut() {
            file.metadata = self.file_metadata(file.id)?;
        }
        Ok(files)
    }

    pub fn count_files(&self, filter: &FileFilter) -> Result<i64> {
        let (where_sql, args) = filter.where_clause();
        self.connection().query_row(
            &format!(
                "SELECT COUNT(*) FROM files f \
                 JOIN storage_roots sr ON sr.id = f.storage_root_id{where_sql}"
            ),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )
    }

    fn query_files(&self, filter: &FileFilter) -> Result<Vec<FileRecord>> {
        let (where_sql, mut args) = filter.where_clause();
        let mut sql = format!("{FILE_SELECT}{where_sql} ORDER BY {}", filter.order.sql());
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ? OFFSET ?");
            args.push(Value::Integer(limit));
            args.push(Value::Integer(filter.offset));
        } else if filter.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            args.push(Value::Integer(filter.offset));
        }

        let mut stmt = self.connection().prepare(&sql)?;
        let files = stmt
            .query_map(params_from_iter(args.iter()), file_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn file_metadata(&self, file_id: i64) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .connection()
            .prepare_cached("SELECT key, value FROM file_metadata WHERE file_id = ?1 ORDER BY key")?;
        let pairs = stmt
            .query_map(params![file_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<BTreeMap<String, String>>>()?;
        Ok(pairs)
    }

    fn all_metadata(&self) -> Result<HashMap<i64, BTreeMap<String, String>>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT file_id, key, value FROM file_metadata ORDER BY file_id, key")?;
        let mut rows = stmt.query([])?;
        let mut map: HashMap<i64, BTreeMap<String, String>> = HashMap::new();
        while let Some(row) = rows.next()? {
            map.entry(row.get(0)?)
                .or_default()
                .insert(row.get(1)?, row.get(2)?);
        }
        Ok(map)
    }

    // ── Storage Roots ────────────────────────────────────────────

    pub fn list_storage_roots(&self, enabled_only: bool) -> Result<Vec<StorageRoot>> {
        let sql = if enabled_only {
            "SELECT id, name, protocol, host, port, path, mount_point, enabled \
             FROM storage_roots WHERE enabled = 1 ORDER BY id"
        } else {
            "SELECT id, name, protocol, host, port, path, mount_point, enabled \
             FROM storage_roots ORDER BY id"
        };
        let mut stmt = self.connection().prepare(sql)?;
        let roots = stmt
            .query_map([], root_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(roots)
    }

    pub fn get_storage_root(&self, id: i64) -> Result<Option<StorageRoot>> {
        self.connection()
            .query_row(
                "SELECT id, name, protocol, host, port, path, mount_point, enabled \
                 FROM storage_roots WHERE id = ?1",
                params![id],
                root_from_row,
            )
            .optional()
    }

    // ── Duplicate Groups ─────────────────────────────────────────

    pub fn list_duplicate_groups(&self, min_file_count: i64) -> Result<Vec<DuplicateGroup>> {
        let mut stmt = self.connection().prepare(
            "SELECT id, content_hash, file_count, total_size \
             FROM duplicate_groups WHERE file_count >= ?1 ORDER BY id",
        )?;
        let groups = stmt
            .query_map(params![min_file_count], group_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(groups)
    }

    pub fn get_duplicate_group(&self, id: i64) -> Result<Option<DuplicateGroup>> {
        self.connection()
            .query_row(
                "SELECT id, content_hash, file_count, total_size \
                 FROM duplicate_groups WHERE id = ?1",
                params![id],
                group_from_row,
            )
            .optional()
    }

    /// Live members of a group, ordered by path.
    pub fn files_in_duplicate_group(&self, group_id: i64) -> Result<Vec<FileRecord>> {
        self.list_files(&FileFilter {
            duplicate_group_id: Some(group_id),
            order: FileOrder::Path,
            ..Default::default()
        })
    }

    // ── Snapshot ─────────────────────────────────────────────────

    pub fn snapshot(&self) -> Result<CatalogSnapshot> {
        let tx = self.connection().unchecked_transaction()?;

        let roots = self.list_storage_roots(false)?;
        let mut files = self.query_files(&FileFilter::default())?;
        let mut metadata = self.all_metadata()?;
        for file in files.iter_mut() {
            if let Some(pairs) = metadata.remove(&file.id) {
                file.metadata = pairs;
            }
        }
        let groups = self.list_duplicate_groups(0)?;

        tx.commit()?;

        let watermark = files.iter().map(|f| f.modified_at).max().unwrap_or(0);
        debug!(
            "Catalog snapshot: {} roots, {} live files, {} duplicate groups",
            roots.len(),
            files.len(),
            groups.len()
        );
        Ok(CatalogSnapshot {
            roots,
            files,
            groups,
            watermark,
        })
    }
}
