use std::path::Path;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use crate::types::{CombinedRecord, Source, SourceRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to open database {path}: {source}")]
    Open {
        path: String,
        source: rusqlite::Error,
    },
}

/// How long a connection waits on another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const SOURCE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS pharmeasy (
        name TEXT,
        brand TEXT,
        packaging TEXT,
        price TEXT,
        mrp TEXT,
        discount TEXT,
        unit_price TEXT,
        source TEXT,
        UNIQUE(name, brand, packaging, source)
    );

    CREATE TABLE IF NOT EXISTS apollo (
        name TEXT,
        brand TEXT,
        price TEXT,
        discount TEXT,
        unit_price TEXT,
        source TEXT,
        UNIQUE(name, brand, source)
    );
";

const COMBINED_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS combined_data (
        name TEXT,
        brand TEXT,
        price TEXT,
        discount TEXT,
        source TEXT,
        best_price REAL,
        best_offer REAL
    );
";

/// A handle on the medicines database.
///
/// Handles are cheap and short-lived: open one per unit of work and drop it
/// when done, the connection closes with it.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Store { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let store = Store {
            conn: Connection::open_in_memory()?,
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SOURCE_SCHEMA)?;
        Ok(())
    }

    /// Runs `f` inside a transaction, committing only when it succeeds.
    ///
    /// The write lock is taken up front, so whatever `f` reads stays valid
    /// until commit and concurrent writers queue on [`BUSY_TIMEOUT`].
    pub fn in_transaction<T, E>(&self, f: impl FnOnce(&Store) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;
        let value = f(self)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    pub fn ensure_combined_table(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(COMBINED_SCHEMA)?;
        Ok(())
    }

    /// Inserts a scraped row, returning `false` when it duplicates an existing one.
    pub fn insert_source_record(
        &self,
        source: Source,
        record: &SourceRecord,
    ) -> Result<bool, StoreError> {
        let inserted = match source {
            Source::Pharmeasy => self.conn.execute(
                "INSERT OR IGNORE INTO pharmeasy
                    (name, brand, packaging, price, mrp, discount, unit_price, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.name,
                    record.brand,
                    record.packaging,
                    record.price,
                    record.mrp,
                    record.discount,
                    record.unit_price,
                    source.slug(),
                ],
            )?,
            Source::Apollo => self.conn.execute(
                "INSERT OR IGNORE INTO apollo
                    (name, brand, price, discount, unit_price, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.name,
                    record.brand,
                    record.price,
                    record.discount,
                    record.unit_price,
                    source.slug(),
                ],
            )?,
        };
        Ok(inserted > 0)
    }

    pub fn source_records(&self, source: Source) -> Result<Vec<SourceRecord>, StoreError> {
        let records = match source {
            Source::Pharmeasy => {
                let mut stmt = self.conn.prepare(
                    "SELECT name, brand, packaging, price, mrp, discount, unit_price, source
                     FROM pharmeasy",
                )?;
                let records = stmt.query_map([], |row| {
                    Ok(SourceRecord {
                        name: text(row, 0)?,
                        brand: text(row, 1)?,
                        packaging: text(row, 2)?,
                        price: text(row, 3)?,
                        mrp: text(row, 4)?,
                        discount: text(row, 5)?,
                        unit_price: text(row, 6)?,
                        source: text(row, 7)?,
                    })
                })?;
                records.collect::<Result<Vec<_>, _>>()?
            }
            Source::Apollo => {
                let mut stmt = self.conn.prepare(
                    "SELECT name, brand, price, discount, unit_price, source FROM apollo",
                )?;
                let records = stmt.query_map([], |row| {
                    Ok(SourceRecord {
                        name: text(row, 0)?,
                        brand: text(row, 1)?,
                        packaging: None,
                        price: text(row, 2)?,
                        mrp: None,
                        discount: text(row, 3)?,
                        unit_price: text(row, 4)?,
                        source: text(row, 5)?,
                    })
                })?;
                records.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    pub fn combined_count(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM combined_data", [], |row| row.get(0))?)
    }

    /// Copies every source row into `combined_data` with the override pair
    /// unset. Does nothing once `combined_data` holds any row.
    pub fn seed_combined(&self) -> Result<usize, StoreError> {
        let inserted = self.conn.execute(
            "INSERT INTO combined_data (name, brand, price, discount, source, best_price, best_offer)
             SELECT name, brand, price, discount, source_tag, NULL, NULL FROM (
                 SELECT name, brand, price, discount, ?1 AS source_tag FROM pharmeasy
                 UNION ALL
                 SELECT name, brand, price, discount, ?2 AS source_tag FROM apollo
             )
             WHERE NOT EXISTS (SELECT 1 FROM combined_data)",
            params![Source::Pharmeasy.label(), Source::Apollo.label()],
        )?;
        Ok(inserted)
    }

    /// First combined row for `(name, brand)`, in storage order.
    pub fn find_combined(
        &self,
        name: &str,
        brand: &str,
    ) -> Result<Option<CombinedRecord>, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT name, brand, source, price, discount, best_price, best_offer
                 FROM combined_data WHERE name = ?1 AND brand = ?2",
                params![name, brand],
                combined_from_row,
            )
            .optional()?)
    }

    /// Writes the override pair on every combined row matching `(name, brand)`.
    pub fn set_override(
        &self,
        name: &str,
        brand: &str,
        best_price: Option<f64>,
        best_offer: Option<f64>,
    ) -> Result<usize, StoreError> {
        Ok(self.conn.execute(
            "UPDATE combined_data SET best_price = ?1, best_offer = ?2
             WHERE name = ?3 AND brand = ?4",
            params![best_price, best_offer, name, brand],
        )?)
    }

    pub fn combined_records(&self) -> Result<Vec<CombinedRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, brand, source, price, discount, best_price, best_offer
             FROM combined_data",
        )?;
        let records = stmt
            .query_map([], combined_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Lowercases the `name` column of every table that has one.
    pub fn normalize_names(&self) -> Result<usize, StoreError> {
        let tables: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")?;
            let tables = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            tables
        };

        let mut updated = 0;
        for table in tables {
            let columns: Vec<String> = {
                let mut stmt = self.conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
                let columns = stmt
                    .query_map([], |row| row.get(1))?
                    .collect::<Result<Vec<_>, _>>()?;
                columns
            };
            let has_name = columns.iter().any(|column| column == "name");
            if !has_name {
                continue;
            }

            let rows = self.conn.execute(
                &format!("UPDATE \"{table}\" SET name = LOWER(name) WHERE name IS NOT NULL"),
                [],
            )?;
            log::info!("Lowercased {} name(s) in table {}", rows, table);
            updated += rows;
        }
        Ok(updated)
    }
}

fn combined_from_row(row: &Row<'_>) -> rusqlite::Result<CombinedRecord> {
    Ok(CombinedRecord {
        name: text(row, 0)?,
        brand: text(row, 1)?,
        source: text(row, 2)?,
        price: text(row, 3)?,
        discount: text(row, 4)?,
        best_price: number(row, 5)?,
        best_offer: number(row, 6)?,
    })
}

/// Reads a column as text whatever its storage class.
fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    })
}

fn number(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<f64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(f) => Some(f),
        ValueRef::Text(t) => std::str::from_utf8(t).ok().and_then(|s| s.trim().parse().ok()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    })
}
