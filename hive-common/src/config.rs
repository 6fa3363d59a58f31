use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Worker-thread and fiber-scheduling configuration for the job system (C1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub concurrency: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// TLS is declared but stubbed per spec §6/§9: the knob exists so config
/// files that set it do not fail to parse, but no encryption is performed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetTlsConfig {
    pub enabled: bool,
}

impl Default for NetTlsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    pub auto_init: bool,
    pub port: u16,
    pub tls: NetTlsConfig,
    pub ws_threads: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            auto_init: true,
            port: 9000,
            tls: NetTlsConfig::default(),
            ws_threads: 1,
        }
    }
}

/// RPC knobs implied by §4.7's pending-table sweeper but left as "defaults"
/// in spec.md's prose; named explicitly here per `SPEC_FULL.md`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            sweep_interval_secs: 5,
        }
    }
}

impl RpcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Weak-listener GC cadence for the event broker (§4.2: "default every 5s").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    pub cleanup_interval_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_secs: 5,
        }
    }
}

impl EventsConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HiveConfig {
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub net: NetConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// Layers defaults, an optional TOML file, then `HIVE__`-prefixed
/// environment overrides, mirroring
/// `cloud_servers_oss::config::CloudServiceConfig::new`'s
/// Figment-default/Toml/Env stack.
pub struct ConfigLoader {
    config_file_name: String,
}

impl ConfigLoader {
    pub fn new(config_file_name: impl Into<String>) -> Self {
        Self {
            config_file_name: config_file_name.into(),
        }
    }

    pub fn load(&self) -> figment::Result<HiveConfig> {
        Figment::from(figment::providers::Serialized::defaults(HiveConfig::default()))
            .merge(Toml::file(&self.config_file_name))
            .merge(Env::prefixed("HIVE__").split("__"))
            .extract()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new("config/hive.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = HiveConfig::default();
        assert_eq!(config.jobs.concurrency, 4);
        assert!(config.net.auto_init);
        assert_eq!(config.net.port, 9000);
        assert!(config.net.tls.enabled);
        assert_eq!(config.net.ws_threads, 1);
    }

    #[test]
    fn env_override_wins_over_default() {
        let config: HiveConfig = Figment::from(figment::providers::Serialized::defaults(
            HiveConfig::default(),
        ))
        .merge(Env::prefixed("HIVE_TEST_UNUSED__").split("__"))
        .extract()
        .unwrap();
        assert_eq!(config.net.port, 9000);
    }
}
