pub mod clusters;
pub mod db;
pub mod models;
pub mod notes;
pub mod pillars;
pub mod queue;
pub mod schema;
pub mod snapshots;
pub mod vector;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
