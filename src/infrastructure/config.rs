// Configuration - layered file + environment settings for the service
use crate::application::cluster_index::ClusterOptions;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub fleet_api: FleetApiSettings,
    #[serde(default)]
    pub routing: RoutingSettings,
    #[serde(default)]
    pub polling: PollingSettings,
    #[serde(default)]
    pub clustering: ClusterOptions,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FleetApiSettings {
    #[serde(default = "default_fleet_api_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingSettings {
    #[serde(default = "default_routing_url")]
    pub base_url: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Enter live mode (and start polling) right after the first load.
    #[serde(default = "default_true")]
    pub start_live: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_fleet_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_routing_url() -> String {
    "https://router.project-osrm.org".to_string()
}

fn default_profile() -> String {
    "driving".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_interval_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

impl Default for FleetApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_fleet_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            base_url: default_routing_url(),
            profile: default_profile(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            start_live: default_true(),
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// `config/fleet.{toml,...}` if present, overridden by `FLEET_SECTION__KEY` variables.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/fleet").required(false))
        .add_source(
            config::Environment::with_prefix("FLEET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "[polling]\ninterval_secs = 3\n\n[clustering]\nmax_zoom = 9\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: AppConfig = settings.try_deserialize().unwrap();

        assert_eq!(cfg.polling.interval(), Duration::from_secs(3));
        assert!(cfg.polling.start_live);
        assert_eq!(cfg.clustering.max_zoom, 9);
        assert_eq!(cfg.clustering.radius, 50.0);
        assert_eq!(cfg.server.bind, "0.0.0.0:8080");
        assert_eq!(cfg.routing.profile, "driving");
    }

    #[test]
    fn test_empty_sources_yield_defaults() {
        let settings = config::Config::builder().build().unwrap();
        let cfg: AppConfig = settings.try_deserialize().unwrap();
        assert_eq!(cfg.fleet_api.base_url, "http://localhost:8000");
        assert_eq!(cfg.polling.interval_secs, 10);
    }
}
