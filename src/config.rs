use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::batch::FailurePolicy;
use crate::error::PipelineError;

pub const LOCAL_CONFIG: &str = "genome-pipeline.json";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub tools: ToolsEntry,
    #[serde(default)]
    pub policy: PolicyEntry,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsEntry {
    #[serde(default)]
    pub datasets: Option<String>,
    #[serde(default)]
    pub build_database: Option<String>,
    #[serde(default)]
    pub repeat_modeler: Option<String>,
    #[serde(default)]
    pub repeat_masker: Option<String>,
    #[serde(default)]
    pub braker: Option<String>,
    #[serde(default)]
    pub ltr_struct: Option<bool>,
    #[serde(default)]
    pub trf_dir: Option<String>,
    #[serde(default)]
    pub braker_flags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PolicyEntry {
    #[serde(default)]
    pub acquisition: Option<FailurePolicy>,
    #[serde(default)]
    pub masking: Option<FailurePolicy>,
    #[serde(default)]
    pub annotation: Option<FailurePolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    pub datasets: String,
    pub build_database: String,
    pub repeat_modeler: String,
    pub repeat_masker: String,
    pub braker: String,
    pub ltr_struct: bool,
    pub trf_dir: Option<String>,
    pub braker_flags: Vec<String>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            datasets: "datasets".to_string(),
            build_database: "BuildDatabase".to_string(),
            repeat_modeler: "RepeatModeler".to_string(),
            repeat_masker: "RepeatMasker".to_string(),
            braker: "braker.pl".to_string(),
            ltr_struct: true,
            trf_dir: None,
            braker_flags: default_braker_flags(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePolicies {
    pub acquisition: FailurePolicy,
    pub masking: FailurePolicy,
    pub annotation: FailurePolicy,
}

impl Default for StagePolicies {
    fn default() -> Self {
        Self {
            acquisition: FailurePolicy::Isolate,
            masking: FailurePolicy::Halt,
            annotation: FailurePolicy::Halt,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub tools: ToolSettings,
    pub policies: StagePolicies,
    pub source: Option<PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist. Without one, `./genome-pipeline.json` and
    /// then the user config directory are tried before falling back to defaults.
    pub fn resolve(path: Option<&Path>) -> Result<ResolvedConfig, PipelineError> {
        let config_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };
        let Some(config_path) = config_path else {
            tracing::debug!("no config file found, using defaults");
            return Ok(ResolvedConfig::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PipelineError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PipelineError::ConfigParse(err.to_string()))?;
        tracing::debug!("loaded config from {}", config_path.display());

        let mut resolved = Self::resolve_config(config);
        resolved.source = Some(config_path);
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = ToolSettings::default();
        let tools = config.tools;
        let policy_defaults = StagePolicies::default();

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            tools: ToolSettings {
                datasets: tools.datasets.unwrap_or(defaults.datasets),
                build_database: tools.build_database.unwrap_or(defaults.build_database),
                repeat_modeler: tools.repeat_modeler.unwrap_or(defaults.repeat_modeler),
                repeat_masker: tools.repeat_masker.unwrap_or(defaults.repeat_masker),
                braker: tools.braker.unwrap_or(defaults.braker),
                ltr_struct: tools.ltr_struct.unwrap_or(defaults.ltr_struct),
                trf_dir: tools.trf_dir.or(defaults.trf_dir),
                braker_flags: tools.braker_flags.unwrap_or(defaults.braker_flags),
            },
            policies: StagePolicies {
                acquisition: config
                    .policy
                    .acquisition
                    .unwrap_or(policy_defaults.acquisition),
                masking: config.policy.masking.unwrap_or(policy_defaults.masking),
                annotation: config
                    .policy
                    .annotation
                    .unwrap_or(policy_defaults.annotation),
            },
            source: None,
        }
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.is_file() {
            return Some(local);
        }
        BaseDirs::new()
            .map(|dirs| {
                dirs.config_dir()
                    .join("genome-pipeline")
                    .join("config.json")
            })
            .filter(|path| path.is_file())
    }
}

pub fn default_braker_flags() -> Vec<String> {
    vec!["--fungus".to_string()]
}
