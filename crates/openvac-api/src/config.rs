//! API configuration.

use std::path::PathBuf;
use std::time::Duration;

use openvac_media::ToolConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size (uploads included)
    pub max_body_size: usize,
    /// Root of all job and preview workspaces
    pub scratch_dir: PathBuf,
    /// Program that runs the conversion tool
    pub tool_program: String,
    /// Script handed to `tool_program`; `None` runs the program directly
    pub tool_script: Option<String>,
    /// Wall-clock ceiling for a full conversion
    pub convert_timeout: Duration,
    /// Wall-clock ceiling for a preview conversion
    pub preview_timeout: Duration,
    /// Age after which a job workspace is reaped
    pub job_ttl: Duration,
    /// Run the background workspace reaper
    pub enable_reaper: bool,
    /// Expose Prometheus metrics at /metrics
    pub metrics_enabled: bool,
    /// Emit JSON log lines instead of ANSI text
    pub log_json: bool,
    /// Environment (development/production)
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_body_size: 512 * 1024 * 1024, // 512MB
            scratch_dir: default_scratch_dir(),
            tool_program: "bash".to_string(),
            tool_script: Some("openvac.sh".to_string()),
            convert_timeout: Duration::from_secs(300),
            preview_timeout: Duration::from_secs(60),
            job_ttl: Duration::from_secs(3600),
            enable_reaper: true,
            metrics_enabled: true,
            log_json: false,
            environment: "development".to_string(),
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("openvac")
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default),
    )
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(512 * 1024 * 1024),
            scratch_dir: std::env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_scratch_dir()),
            tool_program: std::env::var("OPENVAC_TOOL").unwrap_or_else(|_| "bash".to_string()),
            tool_script: match std::env::var("OPENVAC_TOOL_SCRIPT") {
                Ok(s) if s.trim().is_empty() => None,
                Ok(s) => Some(s),
                Err(_) => Some("openvac.sh".to_string()),
            },
            convert_timeout: env_secs("CONVERT_TIMEOUT_SECS", 300),
            preview_timeout: env_secs("PREVIEW_TIMEOUT_SECS", 60),
            job_ttl: env_secs("JOB_TTL_SECS", 3600),
            enable_reaper: env_flag("ENABLE_WORKSPACE_REAPER", true),
            metrics_enabled: env_flag("METRICS_ENABLED", true),
            log_json: std::env::var("LOG_FORMAT")
                .map(|v| v.to_lowercase() == "json")
                .unwrap_or(false),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// How to launch the conversion tool.
    pub fn tool_config(&self) -> ToolConfig {
        match &self.tool_script {
            Some(script) => ToolConfig::script(&self.tool_program, script),
            None => ToolConfig::direct(&self.tool_program),
        }
    }
}
