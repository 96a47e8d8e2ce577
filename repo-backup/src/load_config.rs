/// `load_config` module: reads the optional YAML file that can stand in for any
/// `backup` flag.
///
/// Every key is optional. Flags given on the command line win over the file
/// (see [`crate::cli::Settings::resolve`]). Secrets never live here: the access
/// token comes from the environment or the terminal, AWS credentials from the
/// ambient AWS configuration.
///
/// Accepted schema:
///
/// ```yaml
/// destination: backups/github-
/// output: archives/github-
/// filter: service
/// concurrency: 8
/// api_url: https://api.github.com
/// strict: true
/// s3:
///   bucket: my-backups
///   key_prefix: github
///   region: eu-west-1
/// ```
use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub destination: Option<String>,
    pub output: Option<String>,
    pub filter: Option<String>,
    pub concurrency: Option<usize>,
    pub api_url: Option<String>,
    pub strict: Option<bool>,
    pub s3: Option<S3Section>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3Section {
    pub bucket: String,
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

/// Loads a static YAML config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid "no overrides" config.
    if config_content.trim().is_empty() {
        info!(config_path = ?path_ref, "Config file is empty, using defaults");
        return Ok(CliConfig::default());
    }

    match serde_yaml::from_str::<CliConfig>(&config_content) {
        Ok(config) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(config)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}
