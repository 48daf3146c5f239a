pub mod bfs;
pub mod load_id;
pub mod prod_db;
