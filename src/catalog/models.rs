use serde::Serialize;
use std::collections::BTreeMap;

const KIB: i64 = 1024;
const MIB: i64 = 1024 * KIB;
const GIB: i64 = 1024 * MIB;

/// A configured remote location whose files the scanner catalogs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageRoot {
    pub id: i64,
    pub name: String,
    pub protocol: String,
    pub host: Option<String>,
    pub port: Option<i64>,
    pub path: Option<String>,
    pub mount_point: Option<String>,
    pub enabled: bool,
}

/// A file or directory known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    /// Path inside the storage root, `/`-separated.
    pub path: String,
    pub name: String,
    pub storage_root_id: i64,
    pub storage_root_name: String,
    pub storage_root_enabled: bool,
    pub size: i64,
    /// Unix seconds, UTC.
    pub modified_at: i64,
    pub extension: Option<String>,
    pub mime_type: Option<String>,
    pub file_type: Option<String>,
    pub is_directory: bool,
    pub is_duplicate: bool,
    pub duplicate_group_id: Option<i64>,
    pub content: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub deleted: bool,
}

impl FileRecord {
    /// Not deleted and reachable through an enabled storage root.
    pub fn is_live(&self) -> bool {
        !self.deleted && self.storage_root_enabled
    }

    pub fn size_category(&self) -> SizeCategory {
        SizeCategory::for_size(self.size)
    }

    /// Category used by the by-type axis and facets. Blank categories fold into `other`.
    pub fn category(&self) -> &str {
        match self.file_type.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => "other",
        }
    }
}

/// A set of records sharing identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub id: i64,
    pub content_hash: String,
    pub file_count: i64,
    pub total_size: i64,
}

/// Fixed half-open byte buckets shared by the size axis and the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SizeCategory {
    Empty,
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
    Massive,
}

impl SizeCategory {
    pub const ALL: [SizeCategory; 7] = [
        SizeCategory::Empty,
        SizeCategory::Tiny,
        SizeCategory::Small,
        SizeCategory::Medium,
        SizeCategory::Large,
        SizeCategory::Huge,
        SizeCategory::Massive,
    ];

    pub fn for_size(size: i64) -> Self {
        match size {
            s if s <= 0 => SizeCategory::Empty,
            s if s < KIB => SizeCategory::Tiny,
            s if s < MIB => SizeCategory::Small,
            s if s < 10 * MIB => SizeCategory::Medium,
            s if s < 100 * MIB => SizeCategory::Large,
            s if s < GIB => SizeCategory::Huge,
            _ => SizeCategory::Massive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeCategory::Empty => "empty",
            SizeCategory::Tiny => "tiny",
            SizeCategory::Small => "small",
            SizeCategory::Medium => "medium",
            SizeCategory::Large => "large",
            SizeCategory::Huge => "huge",
            SizeCategory::Massive => "massive",
        }
    }
}
