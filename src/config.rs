//! Environment-driven configuration.
//!
//! All secrets and deployment knobs come from the process environment
//! (optionally seeded from a `.env` file at startup). Missing required
//! variables are reported together, in one error, so an operator can fix a
//! fresh deployment in a single pass.

use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {0}")]
    MissingVars(String),
    #[error("SHEET_ENGINE must be \"library\" or \"automation\", got {0:?}")]
    UnknownEngine(String),
}

/// Which spreadsheet engine renders templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetEngine {
    /// In-process workbook model plus a headless converter subprocess.
    Library,
    /// Live spreadsheet application driven through a bridge subprocess.
    Automation,
}

const REQUIRED_VARS: [&str; 3] = [
    "PLATFORM_CLIENT_ID",
    "PLATFORM_CLIENT_SECRET",
    "PLATFORM_REDIRECT_URI",
];

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub redirect_uri: String,
    pub oauth_scope: String,
    pub credential_file: PathBuf,
    pub sheet_engine: SheetEngine,
    pub template_dir: PathBuf,
    pub output_dir: PathBuf,
    pub converter_cmd: String,
    pub bridge_cmd: String,
    /// Local root of the cloud-synced folder tree.
    pub sync_root: PathBuf,
    pub sync_agent_cmd: String,
    pub cell_map_file: Option<PathBuf>,
}

impl PlatformConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let missing: Vec<&str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|name| env::var(name).map(|v| v.trim().is_empty()).unwrap_or(true))
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing.join(", ")));
        }

        let sheet_engine = match env::var("SHEET_ENGINE").ok() {
            None => SheetEngine::Library,
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "library" | "" => SheetEngine::Library,
                "automation" => SheetEngine::Automation,
                _ => return Err(ConfigError::UnknownEngine(raw)),
            },
        };

        Ok(Self {
            client_id: env::var("PLATFORM_CLIENT_ID").unwrap_or_default(),
            client_secret: env::var("PLATFORM_CLIENT_SECRET").unwrap_or_default(),
            base_url: var_or("PLATFORM_BASE_URL", "https://api.constructioncloud.example"),
            redirect_uri: env::var("PLATFORM_REDIRECT_URI").unwrap_or_default(),
            oauth_scope: var_or("PLATFORM_OAUTH_SCOPE", "data:read"),
            credential_file: var_or("CREDENTIAL_FILE", "refresh_token.txt").into(),
            sheet_engine,
            template_dir: var_or("TEMPLATE_DIR", "templates").into(),
            output_dir: var_or("OUTPUT_DIR", "modified_files").into(),
            converter_cmd: var_or("CONVERTER_CMD", "libreoffice"),
            bridge_cmd: var_or("BRIDGE_CMD", "sheet-bridge"),
            sync_root: var_or("SYNC_ROOT", "synced").into(),
            sync_agent_cmd: var_or("SYNC_AGENT_CMD", "cloudsync"),
            cell_map_file: env::var("CELL_MAP_FILE").ok().map(PathBuf::from),
        })
    }

    /// Absolute URL for a data endpoint path.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    pub fn token_url(&self) -> String {
        self.endpoint_url("authentication/v2/token")
    }

    pub fn authorize_url(&self) -> String {
        self.endpoint_url("authentication/v2/authorize")
    }
}

fn var_or(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => default.to_string(),
    }
}
