use crate::core::error::AppError;
use crate::core::mapping::containers::{RegistryRewrite, DEFAULT_CONTAINER};
use crate::core::mapping::quantity::ByteQuantity;
use crate::core::mapping::resources::{
    duration_text, CapabilityEntry, ComputeShape, DEFAULT_COMPUTE_SHAPE,
};
use crate::core::nextflow::Template;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Converter configuration loaded from cwl2nf.toml
///
/// Holds the capability table and registry-rewrite table consumed by the mappers together
/// with every platform constant the emitter writes. It is passed to the core explicitly and
/// is never mutated during a conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Ordered capability table, ascending by capacity
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<CapabilityEntry>,

    /// Ordered registry rewrites, first match wins
    #[serde(default = "default_registry_rewrites")]
    pub registry_rewrites: Vec<RegistryRewrite>,

    /// Registry that images are re-tagged under for mirroring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_registry: Option<String>,

    /// Shape for steps without a ResourceRequirement
    #[serde(default = "default_shape")]
    pub default_shape: ComputeShape,

    /// Container for steps without a DockerRequirement
    #[serde(default = "default_container")]
    pub default_container: String,

    /// Execution backend settings
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Named resource presets emitted as Nextflow profiles
    #[serde(default = "default_profiles")]
    pub profiles: IndexMap<String, ProfilePreset>,

    /// Directory the workflow outputs are published to
    #[serde(default = "default_outdir")]
    pub outdir: String,

    /// Custom layout for the generated .nf script
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,

    /// Parsed `template`, filled by `load_template`
    #[serde(skip)]
    pub script_template: Option<Template>,
}

impl ConverterConfig {
    /// Read the file named by `template`, if any.
    pub fn load_template(&mut self) -> Result<(), AppError> {
        self.script_template = match &self.template {
            Some(path) => Some(Template::from_file(path).map_err(|e| e.with_field("template"))?),
            None => None,
        };
        Ok(())
    }

    /// Capability entry every step is pinned to, when `platform.instance_type` names one.
    pub fn pinned_capability(&self) -> Option<&CapabilityEntry> {
        let wanted = self.platform.instance_type.as_deref()?;
        self.capabilities.iter().find(|entry| {
            entry.label == wanted || entry.instance_class.as_deref() == Some(wanted)
        })
    }
}

/// Which flavor of the batch platform the configuration block targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformFlavor {
    /// Plain batch job queues
    #[default]
    Batch,
    /// Managed genomics workflow service on top of batch
    HealthOmics,
}

impl std::fmt::Display for PlatformFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformFlavor::Batch => write!(f, "batch"),
            PlatformFlavor::HealthOmics => write!(f, "healthomics"),
        }
    }
}

impl std::str::FromStr for PlatformFlavor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(PlatformFlavor::Batch),
            "healthomics" => Ok(PlatformFlavor::HealthOmics),
            other => Err(format!("unknown platform flavor '{}'", other)),
        }
    }
}

/// Execution backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Nextflow executor
    #[serde(default = "default_executor")]
    pub executor: String,

    /// Batch job queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    /// Platform region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default = "default_error_strategy")]
    pub error_strategy: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Shared work directory, usually an object store URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,

    #[serde(default)]
    pub flavor: PlatformFlavor,

    /// Capability label or instance class every step is pinned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
}

/// One named resource preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePreset {
    pub cpus: u32,
    pub memory: ByteQuantity,
    #[serde(with = "duration_text")]
    pub time: Duration,
}

impl ProfilePreset {
    pub fn new(cpus: u32, memory: ByteQuantity, hours: u64) -> Self {
        ProfilePreset {
            cpus,
            memory,
            time: Duration::from_secs(hours * 60 * 60),
        }
    }
}

// Default functions
fn default_capabilities() -> Vec<CapabilityEntry> {
    vec![
        CapabilityEntry::new("t3.small", 2, ByteQuantity::from_gibibytes(2), Some("t3.small")),
        CapabilityEntry::new("t3.medium", 2, ByteQuantity::from_gibibytes(4), Some("t3.medium")),
        CapabilityEntry::new("t3.large", 2, ByteQuantity::from_gibibytes(8), Some("t3.large")),
        CapabilityEntry::new("t3.xlarge", 4, ByteQuantity::from_gibibytes(16), Some("t3.xlarge")),
        CapabilityEntry::new("t3.2xlarge", 8, ByteQuantity::from_gibibytes(32), Some("t3.2xlarge")),
    ]
}

fn default_registry_rewrites() -> Vec<RegistryRewrite> {
    vec![
        RegistryRewrite::new("docker.io/library/", "public.ecr.aws/docker/library/"),
        RegistryRewrite::new("docker.io/", "public.ecr.aws/"),
        RegistryRewrite::new("quay.io/", "public.ecr.aws/"),
        RegistryRewrite::new("gcr.io/", "public.ecr.aws/"),
        RegistryRewrite::new("k8s.gcr.io/", "public.ecr.aws/"),
    ]
}

fn default_shape() -> ComputeShape {
    DEFAULT_COMPUTE_SHAPE
}

fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}

fn default_profiles() -> IndexMap<String, ProfilePreset> {
    let mut profiles = IndexMap::new();
    profiles.insert("small".to_string(), ProfilePreset::new(2, ByteQuantity::from_gibibytes(4), 2));
    profiles.insert("medium".to_string(), ProfilePreset::new(4, ByteQuantity::from_gibibytes(16), 8));
    profiles.insert("large".to_string(), ProfilePreset::new(8, ByteQuantity::from_gibibytes(32), 24));
    profiles
}

fn default_outdir() -> String {
    "results".to_string()
}

fn default_executor() -> String {
    "awsbatch".to_string()
}

fn default_error_strategy() -> String {
    "retry".to_string()
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ConverterConfig {
    fn default() -> Self {
        ConverterConfig {
            capabilities: default_capabilities(),
            registry_rewrites: default_registry_rewrites(),
            artifact_registry: None,
            default_shape: default_shape(),
            default_container: default_container(),
            platform: PlatformConfig::default(),
            profiles: default_profiles(),
            outdir: default_outdir(),
            template: None,
            script_template: None,
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            executor: default_executor(),
            queue: None,
            region: None,
            error_strategy: default_error_strategy(),
            max_retries: default_max_retries(),
            work_dir: None,
            flavor: PlatformFlavor::Batch,
            instance_type: None,
        }
    }
}

/// Default config file looked up in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("cwl2nf.toml")
}


pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
