use std::error::Error;
use std::path::Path;

use duckdb::Connection;
use log::info;

use bfs_agenda::api::bfs::agenda;
use bfs_agenda::db::load_id::LoadIdAllocator;
use bfs_agenda::db::prod_db::ProdDb;
use bfs_agenda::utils::run_context::RunContext;

/// Run this job once a day; it appends the current BFS publishing schedule
/// to the archive under a fresh load id.
fn main() -> Result<(), Box<dyn Error>> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();
    let _ = dotenvy::from_path(Path::new(".env/prod.env"));

    let ctx = RunContext::new();
    let archive = ProdDb::bfs_agenda();

    info!("[{}] fetching BFS publishing schedule ...", ctx.run_id);
    let items = agenda::fetch_agenda(agenda::AGENDA_URL)?;
    let rows = agenda::flatten(&items);
    info!("[{}] {} items in the schedule", ctx.run_id, rows.len());

    if rows.is_empty() {
        info!("[{}] nothing to load, exiting", ctx.run_id);
        return Ok(());
    }

    let mut conn = Connection::open(&archive.duckdb_path)?;
    archive.create_tables(&conn)?;
    let mut allocator = LoadIdAllocator::new();
    let load_id = archive.append_batch(&mut conn, &ctx, &mut allocator, &rows)?;
    info!("[{}] done, load id {}", ctx.run_id, load_id);

    Ok(())
}
