pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod tenant;
pub mod rate_limit;
pub mod object_store;
pub mod audit;
pub mod backup;
pub mod pitr;
pub mod health;
pub mod api;

pub use error::{Result, VaultError};
