//! Render Cache (spec §4.3): content-addressed storage for rendered PDF
//! pages and crops, keyed by source version so a re-uploaded document never
//! serves a stale render.

pub mod cache;
pub mod key;

pub use cache::{RenderCache, RenderCacheError, RenderCacheResult};
pub use key::CacheKey;
