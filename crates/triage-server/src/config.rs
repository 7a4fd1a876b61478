//! Server configuration

use crate::cli::Cli;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use triage_classifiers::ModelConfig;
use triage_core::FeatureSchema;
use triage_store::StoreConfig;

/// Environment variable prefix; nested keys use `__`, e.g. `TRIAGE__STORE__PATH`
pub const ENV_PREFIX: &str = "TRIAGE";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Model artifact
    #[serde(default)]
    pub model: ModelConfig,

    /// Record store
    #[serde(default)]
    pub store: StoreConfig,

    /// Declared feature schema, read from the file's `schema` section
    #[serde(skip)]
    pub schema: FeatureSchema,
}

impl ServerConfig {
    /// Load configuration from file and environment, then apply CLI overrides
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = Path::new(&cli.config);
        let mut builder = ::config::Config::builder();
        if file.exists() {
            builder = builder.add_source(::config::File::new(&cli.config, ::config::FileFormat::Yaml));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .with_context(|| format!("invalid configuration in {}", cli.config))?;

        if file.exists() {
            if let Some(schema) = schema_section(file)? {
                config.schema = schema;
            }
        }

        if let Some(listen) = &cli.listen {
            config.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(model) = &cli.model {
            config.model = ModelConfig::from_local(model);
        }
        if let Some(database) = &cli.database {
            config.store.path = Some(database.clone());
        }
        if let Some(schema) = &cli.schema {
            config.schema = FeatureSchema::from_file(schema)?;
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

/// Parse the `schema` section with serde_yaml directly.
///
/// The layered loader lowercases map keys, and category names in encoding
/// tables are case-sensitive.
fn schema_section(path: &Path) -> anyhow::Result<Option<FeatureSchema>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let root: serde_yaml::Value = serde_yaml::from_str(&content)
        .with_context(|| format!("invalid YAML in {}", path.display()))?;

    match root.get("schema") {
        Some(section) if !section.is_null() => {
            let schema = serde_yaml::from_value(section.clone())
                .with_context(|| format!("invalid schema section in {}", path.display()))?;
            Ok(Some(schema))
        }
        _ => Ok(None),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            model: ModelConfig::default(),
            store: StoreConfig::default(),
            schema: FeatureSchema::default(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_ms() -> u64 {
    30_000
}
