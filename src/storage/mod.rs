pub mod cache;
pub mod database;
pub mod path_utils;
