pub mod cache;
pub mod db;
pub mod defaults;
pub mod filter;
pub mod memory;
pub mod models;
pub mod pantry;
pub mod planner;
pub mod reconcile;
pub mod remote;
pub mod store;
