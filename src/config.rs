//! Service configuration
//!
//! Defaults are compiled in. An optional JSON file can override any part of
//! it; fields left out of the file keep their defaults.

use crate::types::{CompetitorEntry, CxError, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub trii: TriiConfig,
    pub playstore: PlayStoreConfig,
    pub appstore: AppStoreConfig,
    pub bvc: BvcConfig,
    pub server: ServerConfig,
}

/// Store ids of the Trii app
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriiConfig {
    pub play_store_package: String,
    pub app_store_id: String,
    /// Ratings differ per App Store country
    pub app_store_country: String,
}

impl Default for TriiConfig {
    fn default() -> Self {
        Self {
            play_store_package: "com.triico.app".into(),
            app_store_id: "1513826307".into(),
            app_store_country: "co".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayStoreConfig {
    pub lang: String,
    pub country: String,
    pub competitors: Vec<CompetitorEntry>,
}

impl Default for PlayStoreConfig {
    fn default() -> Self {
        Self {
            lang: "es".into(),
            country: "co".into(),
            competitors: vec![
                CompetitorEntry::new("com.miflink.android_app", "Flink"),
                CompetitorEntry::new("com.hapicorp.imhapi", "Hapi"),
                CompetitorEntry::new("com.tyba.app", "tyba"),
                CompetitorEntry::new("cl.fintual.fintualapp", "Fintual"),
                CompetitorEntry::new("com.treid", "Zesty"),
                CompetitorEntry::new("cl.racional.app", "Racional"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppStoreConfig {
    pub country: String,
    pub competitors: Vec<CompetitorEntry>,
}

impl Default for AppStoreConfig {
    fn default() -> Self {
        Self {
            country: "co".into(),
            competitors: vec![
                CompetitorEntry::new("1303438003", "Flink").with_country("mx"),
                CompetitorEntry::new("1532828502", "Hapi").with_country("mx"),
                CompetitorEntry::new("1460681130", "tyba").with_country("mx"),
                CompetitorEntry::new("1485050953", "Fintual").with_country("mx"),
            ],
        }
    }
}

/// BVC hosts: the public site issues the token, the REST host serves data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BvcConfig {
    pub base_url: String,
    pub api_url: String,
    /// Domain the token cookie is scoped to (shared by both hosts)
    pub cookie_domain: String,
}

impl Default for BvcConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.bvc.com.co".into(),
            api_url: "https://rest.bvc.com.co".into(),
            cookie_domain: ".bvc.com.co".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl ServiceConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, `~/.cx-service/config.json`
    /// is used when present, otherwise the compiled-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            CxError::Config(format!("invalid config file {}: {}", path.display(), e))
        })?;
        tracing::info!("loaded configuration from {}", path.display());
        Ok(config)
    }
}

/// Default config file location (~/.cx-service/config.json)
pub fn default_config_path() -> Option<PathBuf> {
    BaseDirs::new().map(|d| d.home_dir().join(".cx-service").join("config.json"))
}
