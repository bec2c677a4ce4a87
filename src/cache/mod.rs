//! Tiered cache: in-process FIFO + shared (Redis) + disk.

mod disk;
mod error;
mod fifo;
mod shared;
mod tiered;

pub use disk::{DiskCache, f16_bytes_to_f32, f32_to_f16_bytes};
pub use error::CacheError;
pub use fifo::FifoCache;
pub use shared::SharedCache;
pub use tiered::{CacheStats, CacheTier, Namespace, TieredCache};
