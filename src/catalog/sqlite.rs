use rusqlite::{Connection, OpenFlags, Result};
use tracing::debug;

/// Read adapter over the scanner-owned catalog database.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open an existing catalog read-only. This crate never writes to it.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        debug!("Opened catalog '{}' read-only", path);
        Ok(Catalog { conn })
    }

    /// Open (or create) a writable catalog with the schema applied. Used for
    /// fixtures and local development, where no scanner owns the file.
    pub fn create(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        let catalog = Catalog { conn };
        catalog.configure_pragmas()?;
        catalog.apply_schema()?;
        Ok(catalog)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let catalog = Catalog { conn };
        catalog.configure_pragmas()?;
        catalog.apply_schema()?;
        Ok(catalog)
    }

    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn apply_schema(&self) -> Result<()> {
        self.conn.execute_batch(include_str!("schema.sql"))?;
        debug!("Catalog schema initialized");
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
