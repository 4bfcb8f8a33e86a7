use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base URL used when building absolute media and short-link URLs.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,

    #[serde(default = "default_media_dir")]
    pub media_dir: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    jwt_secret: Option<String>,
    listen_addr: Option<String>,
    public_url: Option<String>,
    frontend_url: Option<String>,
    media_dir: Option<String>,
    log_dir: Option<String>,
    token_ttl_hours: Option<i64>,
    max_connections: Option<u32>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_media_dir() -> String {
    "media".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_max_connections() -> u32 {
    10
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialServerConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            if path.exists() {
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?
            } else {
                PartialServerConfig::default()
            }
        } else {
            PartialServerConfig::default()
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        // 3. Merge: environment overrides file
        merge(env_config, file_config)
    }

    #[cfg(test)]
    pub(crate) fn for_tests(database_url: &str, jwt_secret: &str) -> Self {
        merge(
            PartialServerConfig {
                database_url: Some(database_url.to_string()),
                jwt_secret: Some(jwt_secret.to_string()),
                ..Default::default()
            },
            PartialServerConfig::default(),
        )
        .unwrap_or_else(|e| panic!("{e}"))
    }
}

fn merge(env_config: PartialServerConfig, file_config: PartialServerConfig) -> Result<ServerConfig, String> {
    let final_config = ServerConfig {
        database_url: env_config.database_url.or(file_config.database_url)
            .ok_or("DATABASE_URL is required")?,
        jwt_secret: env_config.jwt_secret.or(file_config.jwt_secret)
            .ok_or("JWT_SECRET is required")?,
        listen_addr: env_config.listen_addr.or(file_config.listen_addr)
            .unwrap_or_else(default_listen_addr),
        public_url: env_config.public_url.or(file_config.public_url)
            .unwrap_or_else(default_public_url),
        frontend_url: env_config.frontend_url.or(file_config.frontend_url)
            .unwrap_or_else(default_frontend_url),
        media_dir: env_config.media_dir.or(file_config.media_dir)
            .unwrap_or_else(default_media_dir),
        log_dir: env_config.log_dir.or(file_config.log_dir)
            .unwrap_or_else(default_log_dir),
        token_ttl_hours: env_config.token_ttl_hours.or(file_config.token_ttl_hours)
            .unwrap_or_else(default_token_ttl_hours),
        max_connections: env_config.max_connections.or(file_config.max_connections)
            .unwrap_or_else(default_max_connections),
    };

    Ok(final_config)
}
