//! Result memoization keyed by call signature

mod helper;
mod store;

pub use helper::{CacheHelper, CacheStats};
pub use store::{CacheKey, CacheStore};
