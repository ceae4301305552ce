pub mod rate_limiter;
pub mod result_cache;
pub mod topaz;
