use super::axes::PlannedEntry;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use serde::Serialize;
use tracing::debug;

const ENTRY_COLUMNS: &str =
    "virtual_path, target_file_id, is_directory, parent_virtual_path, created_at, updated_at";

/// One row of the virtual tree ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualEntry {
    pub virtual_path: String,
    pub target_file_id: Option<i64>,
    pub is_directory: bool,
    pub parent_virtual_path: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl VirtualEntry {
    pub fn directory(path: &str, parent: Option<String>, timestamp: i64) -> Self {
        Self {
            virtual_path: path.to_string(),
            target_file_id: None,
            is_directory: true,
            parent_virtual_path: parent,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn leaf(path: &str, parent: &str, file_id: i64, timestamp: i64) -> Self {
        Self {
            virtual_path: path.to_string(),
            target_file_id: Some(file_id),
            is_directory: false,
            parent_virtual_path: Some(parent.to_string()),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }
}

impl From<&PlannedEntry> for VirtualEntry {
    fn from(entry: &PlannedEntry) -> Self {
        Self {
            virtual_path: entry.path.clone(),
            target_file_id: entry.target,
            is_directory: entry.is_directory(),
            parent_virtual_path: entry.parent.clone(),
            created_at: entry.timestamp,
            updated_at: entry.timestamp,
        }
    }
}

fn entry_from_row(row: &Row<'_>) -> Result<VirtualEntry> {
    Ok(VirtualEntry {
        virtual_path: row.get(0)?,
        target_file_id: row.get(1)?,
        is_directory: row.get(2)?,
        parent_virtual_path: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// The view's own SQLite database: the live `virtual_tree` table plus the
/// staging table a rebuild fills before swapping it in.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let ledger = Ledger { conn };
        ledger.configure_pragmas()?;
        ledger.apply_schema()?;
        debug!("Opened view ledger at '{}'", path);
        Ok(ledger)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let ledger = Ledger { conn };
        ledger.configure_pragmas()?;
        ledger.apply_schema()?;
        Ok(ledger)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn apply_schema(&self) -> Result<()> {
        self.conn.execute_batch(include_str!("ledger.sql"))?;
        Ok(())
    }

    // ── Reads ────────────────────────────────────────────────────

    pub fn get(&self, path: &str) -> Result<Option<VirtualEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM virtual_tree WHERE virtual_path = ?1"),
                params![path],
                entry_from_row,
            )
            .optional()
    }

    pub fn children(&self, path: &str) -> Result<Vec<VirtualEntry>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM virtual_tree \
             WHERE parent_virtual_path = ?1 ORDER BY virtual_path"
        ))?;
        let rows = stmt
            .query_map(params![path], entry_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn all(&self) -> Result<Vec<VirtualEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM virtual_tree ORDER BY virtual_path"
        ))?;
        let rows = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn leaves_for_file(&self, file_id: i64) -> Result<Vec<VirtualEntry>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {ENTRY_COLUMNS} FROM virtual_tree \
             WHERE target_file_id = ?1 AND is_directory = 0 ORDER BY virtual_path"
        ))?;
        let rows = stmt
            .query_map(params![file_id], entry_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn count_children(&self, path: &str) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM virtual_tree WHERE parent_virtual_path = ?1",
            params![path],
            |row| row.get(0),
        )
    }

    pub fn count_leaves(&self, dir: &str) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM virtual_tree \
             WHERE parent_virtual_path = ?1 AND is_directory = 0",
            params![dir],
            |row| row.get(0),
        )
    }

    pub fn len(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM virtual_tree", [], |row| row.get(0))
    }

    /// Distinct files that still have at least one leaf.
    pub fn leaf_targets(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT target_file_id FROM virtual_tree \
             WHERE is_directory = 0 AND target_file_id IS NOT NULL ORDER BY target_file_id",
        )?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>>>()?;
        Ok(rows)
    }

    /// True when `path` mirrors a live catalog directory record.
    pub fn is_mirrored(&self, path: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM mirrored_directories WHERE virtual_path = ?1",
                params![path],
                |_| Ok(()),
            )
            .optional()
            .map(|found| found.is_some())
    }

    pub fn mirrored_for_file(&self, file_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT virtual_path FROM mirrored_directories \
             WHERE file_id = ?1 ORDER BY virtual_path",
        )?;
        let rows = stmt
            .query_map(params![file_id], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;
        Ok(rows)
    }

    /// Entries whose parent is missing or is not a directory.
    pub fn orphans(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.virtual_path FROM virtual_tree c \
             LEFT JOIN virtual_tree p \
               ON p.virtual_path = c.parent_virtual_path AND p.is_directory = 1 \
             WHERE c.parent_virtual_path IS NOT NULL AND p.virtual_path IS NULL \
             ORDER BY c.virtual_path",
        )?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>>>()?;
        Ok(rows)
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Returns false when the path was already present.
    pub fn insert(&self, entry: &VirtualEntry) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT OR IGNORE INTO virtual_tree ({ENTRY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
        ))?;
        let inserted = stmt.execute(params![
            entry.virtual_path,
            entry.target_file_id,
            entry.is_directory,
            entry.parent_virtual_path,
            entry.created_at,
            entry.updated_at,
        ])?;
        Ok(inserted > 0)
    }

    pub fn delete(&self, path: &str) -> Result<usize> {
        self.conn.execute(
            "DELETE FROM mirrored_directories WHERE virtual_path = ?1",
            params![path],
        )?;
        self.conn
            .execute("DELETE FROM virtual_tree WHERE virtual_path = ?1", params![path])
    }

    /// Record that directory `path` exists because of directory record `file_id`.
    pub fn mirror(&self, path: &str, file_id: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO mirrored_directories (virtual_path, file_id) VALUES (?1, ?2)",
            params![path, file_id],
        )?;
        Ok(())
    }

    pub fn unmirror(&self, path: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM mirrored_directories WHERE virtual_path = ?1",
            params![path],
        )?;
        Ok(())
    }

    /// Delete `path` and everything below it.
    pub fn delete_subtree(&self, path: &str) -> Result<usize> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.conn.execute(
            "DELETE FROM mirrored_directories \
             WHERE virtual_path = ?1 OR substr(virtual_path, 1, length(?2)) = ?2",
            params![path, prefix],
        )?;
        self.conn.execute(
            "DELETE FROM virtual_tree \
             WHERE virtual_path = ?1 OR substr(virtual_path, 1, length(?2)) = ?2",
            params![path, prefix],
        )
    }

    /// Replace the staging tables' contents with `entries`, in order, and
    /// the directories mirrored from catalog directory records.
    pub fn replace_staging(
        &self,
        entries: &[VirtualEntry],
        mirrored: &[(String, i64)],
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM virtual_tree_staging", [])?;
        tx.execute("DELETE FROM mirrored_directories_staging", [])?;
        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO virtual_tree_staging ({ENTRY_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ))?;
            for entry in entries {
                stmt.execute(params![
                    entry.virtual_path,
                    entry.target_file_id,
                    entry.is_directory,
                    entry.parent_virtual_path,
                    entry.created_at,
                    entry.updated_at,
                ])?;
            }
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO mirrored_directories_staging (virtual_path, file_id) \
                 VALUES (?1, ?2)",
            )?;
            for (path, file_id) in mirrored {
                stmt.execute(params![path, file_id])?;
            }
        }
        tx.commit()?;
        debug!("Wrote {} staged ledger rows", entries.len());
        Ok(())
    }

    pub fn clear_staging(&self) -> Result<()> {
        self.conn.execute_batch(
            "DELETE FROM virtual_tree_staging;
             DELETE FROM mirrored_directories_staging;",
        )?;
        Ok(())
    }

    /// Swap staged rows into the live table in one transaction.
    pub fn promote_staging(&self) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM virtual_tree", [])?;
        let promoted = tx.execute(
            &format!(
                "INSERT INTO virtual_tree ({ENTRY_COLUMNS}) \
                 SELECT {ENTRY_COLUMNS} FROM virtual_tree_staging ORDER BY rowid"
            ),
            [],
        )?;
        tx.execute("DELETE FROM virtual_tree_staging", [])?;
        tx.execute("DELETE FROM mirrored_directories", [])?;
        tx.execute(
            "INSERT INTO mirrored_directories (virtual_path, file_id) \
             SELECT virtual_path, file_id FROM mirrored_directories_staging",
            [],
        )?;
        tx.execute("DELETE FROM mirrored_directories_staging", [])?;
        tx.commit()?;
        Ok(promoted)
    }
}
