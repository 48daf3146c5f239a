use std::env;

use crate::db::bfs::agenda_archive::BfsAgendaArchive;

pub struct ProdDb {}

impl ProdDb {
    pub fn bfs_agenda() -> BfsAgendaArchive {
        BfsAgendaArchive {
            duckdb_path: env::var("BFS_AGENDA_DUCKDB_PATH").unwrap_or_else(|_| {
                "/home/kmitiy/Downloads/Archive/DuckDB/bfs/agenda.duckdb".to_string()
            }),
            table: env::var("BFS_AGENDA_TABLE")
                .unwrap_or_else(|_| "bfs_publications".to_string()),
        }
    }
}
