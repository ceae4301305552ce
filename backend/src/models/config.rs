use std::env;

/// Runtime configuration, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: String,
    pub allowed_origins: Vec<String>,
    /// Vendor credential. Absent means enhancement routes fail with a 500
    /// while health/version keep serving.
    pub topaz_api_key: Option<String>,
    pub topaz_base_url: String,
    pub max_upload_bytes: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_bytes: u64,
    pub upstream_timeout_secs: u64,
    pub upstream_connect_timeout_secs: u64,
    /// Enhancement submissions allowed per client IP per minute.
    pub rate_limit_enhance: u32,
    /// Status/download relays allowed per client IP per minute.
    pub rate_limit_relay: u32,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            listen_addr: env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| {
                    "http://localhost:5173,http://localhost:3000".to_string()
                })
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            topaz_api_key: env::var("TOPAZ_API_KEY").ok().filter(|s| !s.is_empty()),
            topaz_base_url: env::var("TOPAZ_BASE_URL")
                .unwrap_or_else(|_| "https://api.topazlabs.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50 * 1024 * 1024),
            cache_ttl_secs: env::var("CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            cache_max_bytes: env::var("CACHE_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(512 * 1024 * 1024),
            upstream_timeout_secs: env::var("UPSTREAM_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            upstream_connect_timeout_secs: env::var("UPSTREAM_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            rate_limit_enhance: env::var("RATE_LIMIT_ENHANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            rate_limit_relay: env::var("RATE_LIMIT_RELAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }
}
