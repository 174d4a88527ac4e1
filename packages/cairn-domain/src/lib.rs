//! Pure clustering and time-lapse logic shared by the service and worker.
//!
//! Nothing in this crate performs I/O. Storage and providers feed it plain values and persist
//! whatever it decides.

pub mod author;
pub mod centroid;
pub mod metrics;
pub mod relevance;
pub mod retention;
pub mod routing;
pub mod similarity;
pub mod snapshot;
pub mod status;
pub mod tenancy;

mod error;

pub use error::{Error, Result};
