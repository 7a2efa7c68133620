pub mod budget;
pub mod chunk;
pub mod config;
pub mod db;
pub mod model;
pub mod repair;
pub mod report;
pub mod search;
pub mod slug;
