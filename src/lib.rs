pub mod api;
pub mod db;
pub mod errors;
pub mod utils;
