use duckdb::{params, Connection};
use log::{info, warn};

use crate::api::bfs::agenda::Row;
use crate::db::load_id::{CandidateDraw, IdentifierSpace, LoadIdAllocator};
use crate::errors::LoadError;
use crate::utils::run_context::RunContext;

/// How often a batch commit is retried with a fresh load id after losing
/// the check-then-act race to a concurrent run.
const BACKSTOP_RETRIES: u32 = 3;

#[derive(Clone)]
pub struct BfsAgendaArchive {
    pub duckdb_path: String,
    pub table: String,
}

impl BfsAgendaArchive {
    /// One row per committed load, with `load_id` UNIQUE.  The constraint is
    /// the authoritative backstop for the allocator's pre-check.
    pub fn registry_table(&self) -> String {
        format!("{}_loads", self.table)
    }

    pub fn create_tables(&self, conn: &Connection) -> Result<(), LoadError> {
        let sql = format!(
            r#"
CREATE TABLE IF NOT EXISTS {} (
    created_ts TIMESTAMP NOT NULL,
    load_id INTEGER NOT NULL,
    uuid VARCHAR NOT NULL,
    gnp VARCHAR,
    dam_id BIGINT NOT NULL,
    title VARCHAR NOT NULL,
    published_ts VARCHAR NOT NULL,
    institution_lvl_0_id BIGINT,
    institution_lvl_0_name VARCHAR,
    institution_lvl_1_id BIGINT,
    institution_lvl_1_name VARCHAR,
    prodima_lvl_0_id BIGINT,
    prodima_lvl_0_code VARCHAR,
    prodima_lvl_0_name VARCHAR,
    prodima_lvl_1_id BIGINT,
    prodima_lvl_1_code VARCHAR,
    prodima_lvl_1_name VARCHAR,
    short_text_gnp VARCHAR,
    languages VARCHAR
);

CREATE TABLE IF NOT EXISTS {} (
    load_id INTEGER NOT NULL UNIQUE,
    created_ts TIMESTAMP NOT NULL
);
            "#,
            self.table,
            self.registry_table(),
        );
        conn.execute_batch(&sql)
            .map_err(|e| LoadError::StorageUnavailable(e.to_string()))
    }

    /// Allocate a fresh load id and append the whole batch under it, in one
    /// transaction.  Returns the load id stamped on every row.
    ///
    /// A UNIQUE violation on the load registry means a concurrent run
    /// committed the same id between check and act; the batch is retried
    /// with a fresh allocation, a bounded number of times.
    pub fn append_batch<D: CandidateDraw>(
        &self,
        conn: &mut Connection,
        ctx: &RunContext,
        allocator: &mut LoadIdAllocator<D>,
        rows: &[Row],
    ) -> Result<u32, LoadError> {
        let created_ts = ctx.created_ts();
        for _ in 0..BACKSTOP_RETRIES {
            let load_id = {
                let space = DuckdbIdentifierSpace::new(conn, &self.table);
                allocator.allocate(&space)?
            };
            match self.insert_batch(conn, load_id, &created_ts, rows) {
                Ok(()) => {
                    info!(
                        "[{}] appended {} rows under load id {}",
                        ctx.run_id,
                        rows.len(),
                        load_id
                    );
                    return Ok(load_id);
                }
                Err(e) if is_load_id_taken(&e) => {
                    warn!(
                        "[{}] load id {} was taken concurrently, allocating a new one",
                        ctx.run_id, load_id
                    );
                }
                Err(e) => return Err(LoadError::Persistence(e.to_string())),
            }
        }
        Err(LoadError::Persistence(format!(
            "load id contention persisted after {} attempts",
            BACKSTOP_RETRIES
        )))
    }

    /// Register the load id and insert all rows, atomically.  The
    /// transaction rolls back on drop if anything fails.
    fn insert_batch(
        &self,
        conn: &mut Connection,
        load_id: u32,
        created_ts: &str,
        rows: &[Row],
    ) -> Result<(), duckdb::Error> {
        let tx = conn.transaction()?;
        tx.execute(
            &format!(
                "INSERT INTO {} (load_id, created_ts) VALUES (?, ?)",
                self.registry_table()
            ),
            params![load_id, created_ts],
        )?;
        {
            let mut stmt = tx.prepare(&format!(
                r#"
INSERT INTO {} (
    created_ts, load_id, uuid, gnp, dam_id, title, published_ts,
    institution_lvl_0_id, institution_lvl_0_name,
    institution_lvl_1_id, institution_lvl_1_name,
    prodima_lvl_0_id, prodima_lvl_0_code, prodima_lvl_0_name,
    prodima_lvl_1_id, prodima_lvl_1_code, prodima_lvl_1_name,
    short_text_gnp, languages
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                self.table
            ))?;
            for row in rows {
                stmt.execute(params![
                    created_ts,
                    load_id,
                    row.uuid,
                    row.gnp,
                    row.dam_id,
                    row.title,
                    row.published_ts,
                    row.institution_lvl_0_id,
                    row.institution_lvl_0_name,
                    row.institution_lvl_1_id,
                    row.institution_lvl_1_name,
                    row.prodima_lvl_0_id,
                    row.prodima_lvl_0_code,
                    row.prodima_lvl_0_name,
                    row.prodima_lvl_1_id,
                    row.prodima_lvl_1_code,
                    row.prodima_lvl_1_name,
                    row.short_text_gnp,
                    row.languages,
                ])?;
            }
        }
        tx.commit()
    }

    /// All distinct load ids committed to the archive, ascending.
    pub fn distinct_load_ids(&self, conn: &Connection) -> Result<Vec<u32>, LoadError> {
        let sql = format!(
            "SELECT DISTINCT load_id FROM {} ORDER BY load_id",
            self.table
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LoadError::StorageUnavailable(e.to_string()))?;
        let ids = stmt
            .query_map([], |row| row.get::<usize, u32>(0))
            .and_then(|iter| iter.collect::<Result<Vec<u32>, duckdb::Error>>())
            .map_err(|e| LoadError::StorageUnavailable(e.to_string()))?;
        Ok(ids)
    }

    /// The rows of one load, in dam id order.
    pub fn get_data(&self, conn: &Connection, load_id: u32) -> Result<Vec<Row>, LoadError> {
        let sql = format!(
            r#"
SELECT
    uuid, gnp, dam_id, title, published_ts,
    institution_lvl_0_id, institution_lvl_0_name,
    institution_lvl_1_id, institution_lvl_1_name,
    prodima_lvl_0_id, prodima_lvl_0_code, prodima_lvl_0_name,
    prodima_lvl_1_id, prodima_lvl_1_code, prodima_lvl_1_name,
    short_text_gnp, languages
FROM {}
WHERE load_id = ?
ORDER BY dam_id
            "#,
            self.table
        );
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| LoadError::StorageUnavailable(e.to_string()))?;
        let rows = stmt
            .query_map(params![load_id], |row| {
                Ok(Row {
                    uuid: row.get(0)?,
                    gnp: row.get(1)?,
                    dam_id: row.get(2)?,
                    title: row.get(3)?,
                    published_ts: row.get(4)?,
                    institution_lvl_0_id: row.get(5)?,
                    institution_lvl_0_name: row.get(6)?,
                    institution_lvl_1_id: row.get(7)?,
                    institution_lvl_1_name: row.get(8)?,
                    prodima_lvl_0_id: row.get(9)?,
                    prodima_lvl_0_code: row.get(10)?,
                    prodima_lvl_0_name: row.get(11)?,
                    prodima_lvl_1_id: row.get(12)?,
                    prodima_lvl_1_code: row.get(13)?,
                    prodima_lvl_1_name: row.get(14)?,
                    short_text_gnp: row.get(15)?,
                    languages: row.get(16)?,
                })
            })
            .and_then(|iter| iter.collect::<Result<Vec<Row>, duckdb::Error>>())
            .map_err(|e| LoadError::StorageUnavailable(e.to_string()))?;
        Ok(rows)
    }
}

/// Identifier space backed by the archive's load id column.  The existence
/// check binds the candidate as a statement parameter; only the table name
/// is formatted in.
pub struct DuckdbIdentifierSpace<'a> {
    conn: &'a Connection,
    table: &'a str,
}

impl<'a> DuckdbIdentifierSpace<'a> {
    pub fn new(conn: &'a Connection, table: &'a str) -> DuckdbIdentifierSpace<'a> {
        DuckdbIdentifierSpace { conn, table }
    }
}

impl IdentifierSpace for DuckdbIdentifierSpace<'_> {
    fn count_matching(&self, candidate: u32) -> Result<usize, LoadError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE load_id = ?", self.table);
        self.conn
            .query_row(&sql, params![candidate], |row| row.get(0))
            .map_err(|e| LoadError::StorageUnavailable(e.to_string()))
    }
}

/// True when the insert failed on the load registry's UNIQUE constraint,
/// i.e. a concurrent run committed the same load id first.
fn is_load_id_taken(e: &duckdb::Error) -> bool {
    matches!(e, duckdb::Error::DuckDBFailure(_, Some(msg)) if msg.contains("Constraint Error"))
}
