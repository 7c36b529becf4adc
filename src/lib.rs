//! precache - offline cache controller
//!
//! Provisions a web application's resources into a versioned local cache
//! at install time and answers requests cache-first, falling back to the
//! network on a miss.

pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod manifest;
pub mod network;

pub use error::{PrecacheError, PrecacheResult};
