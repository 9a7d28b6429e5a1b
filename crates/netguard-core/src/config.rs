//! Configuration management for NetGuard services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`NETGUARD__SECTION__KEY`)
//! 2. Config file (`netguard.toml`, prefix overridable per binary)
//! 3. Defaults declared by each section's serde attributes
//!
//! Each crate owns its section type; this module only builds the layered
//! source and extracts sections from it.

use serde::de::DeserializeOwned;

use crate::error::NetguardError;

/// Default config file prefix (`netguard.toml`).
pub const DEFAULT_CONFIG_PREFIX: &str = "netguard";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "NETGUARD";

/// Build the layered configuration source.
pub fn layered(file_prefix: &str) -> Result<config::Config, NetguardError> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(cfg)
}

/// Extract one section. A missing section yields the section's defaults;
/// a present but malformed section is an error.
pub fn section<T>(cfg: &config::Config, key: &str) -> Result<T, NetguardError>
where
    T: DeserializeOwned + Default,
{
    match cfg.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(NetguardError::Config(format!("[{key}]: {e}"))),
    }
}

/// Load one section straight from the layered sources.
pub fn load_section<T>(file_prefix: &str, key: &str) -> Result<T, NetguardError>
where
    T: DeserializeOwned + Default,
{
    let cfg = layered(file_prefix)?;
    section(&cfg, key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Demo {
        #[serde(default = "default_port")]
        port: u16,
        #[serde(default)]
        name: String,
    }

    fn default_port() -> u16 {
        8080
    }

    impl Default for Demo {
        fn default() -> Self {
            Self {
                port: default_port(),
                name: String::new(),
            }
        }
    }

    #[test]
    fn missing_section_yields_defaults() {
        let cfg = config::Config::builder().build().unwrap();
        let demo: Demo = section(&cfg, "demo").unwrap();
        assert_eq!(demo, Demo::default());
    }

    #[test]
    fn file_section_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netguard-test.toml");
        std::fs::write(&path, "[demo]\nname = \"lab\"\n").unwrap();

        let prefix = dir.path().join("netguard-test");
        let cfg = layered(prefix.to_str().unwrap()).unwrap();
        let demo: Demo = section(&cfg, "demo").unwrap();
        assert_eq!(demo.name, "lab");
        assert_eq!(demo.port, 8080);
    }

    #[test]
    fn malformed_section_is_an_error() {
        let cfg = config::Config::builder()
            .set_override("demo.port", "not-a-number")
            .unwrap()
            .build()
            .unwrap();
        let result: Result<Demo, _> = section(&cfg, "demo");
        assert!(matches!(result, Err(NetguardError::Config(_))));
    }
}
