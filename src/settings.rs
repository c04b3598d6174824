use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::warn;

use crate::error::Error;

const CONFIG_FILE: &str = "lot_pipeline";
const ENV_PREFIX: &str = "LOTS";

/// Defaults, then `lot_pipeline.toml` (optional), then `LOTS_*` variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    pub batch_size: usize,
    /// Profile used when `--source` is not given; unset means each lot's own `source`.
    pub default_source: Option<String>,
    pub profiles_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/lots.sqlite"),
            output_dir: PathBuf::from("data/normalized"),
            batch_size: 500,
            default_source: None,
            profiles_path: None,
        }
    }
}

impl Settings {
    pub fn load() -> Self {
        let built = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build();
        match built.map_err(Error::from).and_then(Settings::from_config) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "falling back to default settings");
                Settings::default()
            }
        }
    }

    pub fn from_config(config: Config) -> Result<Self, Error> {
        let mut settings: Settings = config.try_deserialize()?;
        settings.batch_size = settings.batch_size.max(1);
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_set() {
        let config = Config::builder().build().unwrap();
        let settings = Settings::from_config(config).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.batch_size, 500);
        assert_eq!(settings.default_source, None);
    }

    #[test]
    fn overrides_apply() {
        let config = Config::builder()
            .set_override("db_path", "/tmp/lots.sqlite")
            .unwrap()
            .set_override("batch_size", 0)
            .unwrap()
            .set_override("profiles_path", "profiles.json")
            .unwrap()
            .set_override("default_source", "sodre")
            .unwrap()
            .build()
            .unwrap();
        let settings = Settings::from_config(config).unwrap();
        assert_eq!(settings.db_path, PathBuf::from("/tmp/lots.sqlite"));
        assert_eq!(settings.batch_size, 1);
        assert_eq!(settings.profiles_path, Some(PathBuf::from("profiles.json")));
        assert_eq!(settings.output_dir, PathBuf::from("data/normalized"));
        assert_eq!(settings.default_source.as_deref(), Some("sodre"));
    }

    #[test]
    fn bad_type_is_an_error() {
        let config = Config::builder()
            .set_override("batch_size", "many")
            .unwrap()
            .build()
            .unwrap();
        assert!(Settings::from_config(config).is_err());
    }
}
