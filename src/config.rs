use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Absolute base used for pagination links, e.g. `https://foodgram.example`.
    /// Falls back to the request's `Host` header when unset.
    #[serde(default)]
    pub public_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub root: String,
    pub base_url: String,
    pub max_image_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub title: String,
    pub font_size: f32,
    pub margin_mm: f32,
    /// TrueType font for the PDF export. The bundled DejaVu Sans (Latin, Cyrillic,
    /// Greek) is used when unset.
    #[serde(default)]
    pub font_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

/// Request ceilings per client IP. `max_requests` applies to every route in a
/// `window_seconds` window; the rest are per-minute limits on single endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window_seconds: u64,
    pub login_per_minute: usize,
    pub register_per_minute: usize,
    pub export_per_minute: usize,
}

/// Staff account created on startup when missing.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pagination: PaginationConfig,
    pub media: MediaConfig,
    pub export: ExportConfig,
    pub rate_limit: RateLimitConfig,
    pub security: Option<SecurityConfig>,
    pub bootstrap: Option<BootstrapConfig>,
}

const DEFAULTS: &str = include_str!("../config/default.toml");

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        // Optional local file: foodgram.toml (in CWD)
        .add_source(::config::File::with_name("foodgram").required(false));

    if let Ok(custom_path) = std::env::var("FOODGRAM_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("FOODGRAM").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }
    if let Some(url) = cfg.server.public_url.as_deref() {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow::anyhow!("server.public_url must start with http:// or https://"));
        }
    }

    // Database
    if cfg.database.max_connections == 0 {
        return Err(anyhow::anyhow!("database.max_connections must be > 0"));
    }

    // Pagination
    if cfg.pagination.default_page_size == 0 {
        return Err(anyhow::anyhow!("pagination.default_page_size must be > 0"));
    }
    if cfg.pagination.max_page_size < cfg.pagination.default_page_size {
        return Err(anyhow::anyhow!("pagination.max_page_size must be >= default_page_size"));
    }

    // Media
    if cfg.media.root.trim().is_empty() {
        return Err(anyhow::anyhow!("media.root must not be empty"));
    }
    // Mounted as a nested route, so it needs a non-root path like /media/
    let base = &cfg.media.base_url;
    if !base.starts_with('/') || !base.ends_with('/') || base.len() < 3 {
        return Err(anyhow::anyhow!("media.base_url must look like /media/, got '{}'", base));
    }
    if cfg.media.max_image_bytes == 0 {
        return Err(anyhow::anyhow!("media.max_image_bytes must be > 0"));
    }

    // Export
    if !(4.0..=72.0).contains(&cfg.export.font_size) {
        return Err(anyhow::anyhow!("export.font_size must be in 4..=72"));
    }
    if !(0.0..=50.0).contains(&cfg.export.margin_mm) {
        return Err(anyhow::anyhow!("export.margin_mm must be in 0..=50"));
    }
    if let Some(font) = cfg.export.font_path.as_deref() {
        if !Path::new(font).is_file() {
            return Err(anyhow::anyhow!("export.font_path does not exist: {}", font));
        }
    }

    // Rate limits
    let rl = &cfg.rate_limit;
    if rl.max_requests == 0 || rl.window_seconds == 0 {
        return Err(anyhow::anyhow!("rate_limit.max_requests and rate_limit.window_seconds must be > 0"));
    }
    if rl.login_per_minute == 0 || rl.register_per_minute == 0 || rl.export_per_minute == 0 {
        return Err(anyhow::anyhow!("per-endpoint rate limits must be > 0"));
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}
