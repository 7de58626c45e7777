use crate::error::{GeoError, Result};
use crate::geocode::{DEFAULT_ENDPOINT, DEFAULT_MAX_DISTANCE_KM};
use crate::types::GeocoderId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE: &str = "geostate.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// GeocoderConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeocoderConfig {
    Local {
        /// YAML reference table; the built-in table when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reference: Option<PathBuf>,
        #[serde(default = "default_max_distance_km")]
        max_distance_km: f64,
    },
    Osm {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        email: Option<String>,
        #[serde(default = "default_endpoint")]
        endpoint: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_max_distance_km() -> f64 {
    DEFAULT_MAX_DISTANCE_KM
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        GeocoderConfig::Local {
            reference: None,
            max_distance_km: default_max_distance_km(),
        }
    }
}

impl GeocoderConfig {
    /// Default settings for the named backend.
    pub fn for_id(id: GeocoderId) -> Self {
        match id {
            GeocoderId::Local => Self::default(),
            GeocoderId::Osm => GeocoderConfig::Osm {
                email: None,
                endpoint: default_endpoint(),
                timeout_secs: default_timeout_secs(),
            },
        }
    }

    pub fn id(&self) -> GeocoderId {
        match self {
            GeocoderConfig::Local { .. } => GeocoderId::Local,
            GeocoderConfig::Osm { .. } => GeocoderId::Osm,
        }
    }

    /// Set the contact email; only meaningful for `osm`.
    pub fn set_email(&mut self, value: String) {
        if let GeocoderConfig::Osm { email, .. } = self {
            *email = Some(value);
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Cap on backend calls per run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Minimum spacing between calls; the backend's own default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace_ms: Option<u64>,
    /// Resolutions per checkpoint write.
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_failures: Option<u32>,
}

fn default_flush_every() -> usize {
    25
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            limit: None,
            pace_ms: None,
            flush_every: default_flush_every(),
            max_consecutive_failures: None,
        }
    }
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    /// Prior annotated stores, highest precedence first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub match_coordinates: bool,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub geocoder: GeocoderConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            geocoder: GeocoderConfig::default(),
            dispatch: DispatchConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load `path` when given (it must exist), otherwise [`CONFIG_FILE`] in
    /// `dir` if present, otherwise defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(p) = path {
            if !p.exists() {
                return Err(GeoError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("config file not found: {}", p.display()),
                )));
            }
            return Self::load(p);
        }
        let candidate = dir.join(CONFIG_FILE);
        if candidate.exists() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        match &self.geocoder {
            GeocoderConfig::Osm {
                email, timeout_secs, ..
            } => {
                if email.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: "geocoder 'osm' requires an email address".to_string(),
                    });
                }
                if let Some(pace) = self.dispatch.pace_ms {
                    if pace < 1000 {
                        warnings.push(ConfigWarning {
                            level: WarnLevel::Warning,
                            message: format!(
                                "dispatch.pace_ms={pace} is below the 1000 ms Nominatim usage policy"
                            ),
                        });
                    }
                }
                if *timeout_secs == 0 {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: "geocoder.timeout_secs must be positive".to_string(),
                    });
                }
            }
            GeocoderConfig::Local {
                reference,
                max_distance_km,
            } => {
                if *max_distance_km <= 0.0 {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: "geocoder.max_distance_km must be positive".to_string(),
                    });
                }
                if let Some(path) = reference {
                    if !path.exists() {
                        warnings.push(ConfigWarning {
                            level: WarnLevel::Error,
                            message: format!("reference table not found: {}", path.display()),
                        });
                    }
                }
            }
        }

        if self.dispatch.limit == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "dispatch.limit is 0; no points will be geocoded".to_string(),
            });
        }

        if self.dispatch.flush_every == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "dispatch.flush_every is 0; the store is written only at the end"
                    .to_string(),
            });
        }

        for source in &self.cache.sources {
            if !source.exists() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("cache source not found: {}", source.display()),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
