//! Durable, generation-scoped response cache
//!
//! Each generation is a named store mapping request identity to a full
//! response. A generation is written exactly once per install, in one
//! `put_all`, and is read-only afterwards.
//!
//! # Generation States
//!
//! | State | Activatable | Description |
//! |-------|-------------|-------------|
//! | Building | no | Opened, never committed (or an abandoned install) |
//! | Complete | yes | Full manifest committed, immutable |

pub mod disk;
pub mod generation;
pub mod memory;
pub mod storage;

pub use disk::DiskStorage;
pub use generation::{format_bytes, GenerationId, GenerationInfo, GenerationState};
pub use memory::MemoryStorage;
pub use storage::{CacheStorage, CacheStore};
