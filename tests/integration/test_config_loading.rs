use cwl2nf::core::config::ConfigLoader;
use cwl2nf::core::mapping::quantity::ByteQuantity;
use cwl2nf::core::types::ErrorCategory;
use cwl2nf::core::Converter;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn clear_cwl2nf_env() {
    for v in &[
        "CWL2NF_EXECUTOR",
        "CWL2NF_QUEUE",
        "CWL2NF_REGION",
        "CWL2NF_ARTIFACT_REGISTRY",
        "CWL2NF_DEFAULT_CONTAINER",
        "CWL2NF_MAX_RETRIES",
    ] {
        env::remove_var(v);
    }
}

fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

/// Test integration of config loading with environment variables
#[test]
#[serial]
fn test_config_loading_integration() {
    clear_cwl2nf_env();
    let temp_dir = TempDir::new().unwrap();

    let config_content = r#"
artifact_registry = "123456789012.dkr.ecr.eu-west-1.amazonaws.com/mirror"
outdir = "s3://genomics-results/align"

[[capabilities]]
label = "c5.xlarge"
cpus = 4
memory = "4 GiB"
instance_class = "c5.xlarge"

[[capabilities]]
label = "r5.2xlarge"
cpus = 8
memory = "64 GiB"
instance_class = "r5.2xlarge"

[platform]
executor = "awsbatch"
queue = "genomics-spot"
region = "eu-west-1"
work_dir = "s3://genomics-work/nextflow"
"#;
    fs::write(temp_dir.path().join("cwl2nf.toml"), config_content).unwrap();

    env::set_var("CWL2NF_QUEUE", "genomics-ondemand");
    env::set_var("CWL2NF_MAX_RETRIES", "5");

    let config = ConfigLoader::load(None, temp_dir.path()).unwrap();
    clear_cwl2nf_env();

    assert_eq!(config.capabilities.len(), 2);
    assert_eq!(config.capabilities[1].memory, ByteQuantity::from_gibibytes(64));
    assert_eq!(config.platform.queue.as_deref(), Some("genomics-ondemand"));
    assert_eq!(config.platform.region.as_deref(), Some("eu-west-1"));
    assert_eq!(config.platform.max_retries, 5);
    // Fields absent from the file keep their defaults.
    assert_eq!(config.registry_rewrites.len(), 5);
    assert_eq!(config.profiles.len(), 3);

    let conversion = Converter::new(&config).convert_file(&fixture("align_sort/workflow.cwl"));
    assert!(conversion.is_success(), "{:?}", conversion.diagnostics);
    let target = conversion.target.as_ref().unwrap();

    // bwa asks for 4 cores and 8000 MiB; only the second entry has the memory.
    let script = target.script_text();
    assert!(script.contains("label 'r5.2xlarge'"));
    assert!(script.contains("memory '64 GB'"));

    let config_text = target.config_text();
    assert!(config_text.contains("queue = 'genomics-ondemand'"));
    assert!(config_text.contains("maxRetries = 5"));
    assert!(config_text.contains("region = 'eu-west-1'"));
    assert!(config_text.contains("workDir = 's3://genomics-work/nextflow'"));
    assert!(target.render().contains("params.outdir = 's3://genomics-results/align'"));

    let containers = conversion.containers();
    let (_, align) = containers.iter().find(|(step, _)| step == "align").unwrap();
    assert_eq!(
        align.push_target.as_deref(),
        Some("123456789012.dkr.ecr.eu-west-1.amazonaws.com/mirror/biocontainers/bwa:v0.7.17")
    );
}

#[test]
#[serial]
fn test_explicit_config_takes_precedence_over_workdir() {
    clear_cwl2nf_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("cwl2nf.toml"),
        "[platform]\nexecutor = \"local\"\n",
    )
    .unwrap();
    let explicit = temp_dir.path().join("batch.toml");
    fs::write(&explicit, "[platform]\nexecutor = \"slurm\"\nqueue = \"long\"\n").unwrap();

    let config = ConfigLoader::load(Some(&explicit), temp_dir.path()).unwrap();
    assert_eq!(config.platform.executor, "slurm");
    assert_eq!(config.platform.queue.as_deref(), Some("long"));
}

#[test]
#[serial]
fn test_env_overrides_without_file() {
    clear_cwl2nf_env();
    let temp_dir = TempDir::new().unwrap();
    env::set_var("CWL2NF_EXECUTOR", "local");
    env::set_var("CWL2NF_REGION", "us-west-2");
    env::set_var("CWL2NF_DEFAULT_CONTAINER", "public.ecr.aws/docker/library/debian:12");

    let config = ConfigLoader::load(None, temp_dir.path()).unwrap();
    clear_cwl2nf_env();

    assert_eq!(config.platform.executor, "local");
    assert_eq!(config.platform.region.as_deref(), Some("us-west-2"));
    assert_eq!(config.default_container, "public.ecr.aws/docker/library/debian:12");
}

#[test]
#[serial]
fn test_unordered_capability_table_is_rejected() {
    clear_cwl2nf_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("cwl2nf.toml"),
        r#"
[[capabilities]]
label = "big"
cpus = 8
memory = "32 GiB"

[[capabilities]]
label = "small"
cpus = 2
memory = "4 GiB"
"#,
    )
    .unwrap();

    let err = ConfigLoader::load(None, temp_dir.path()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigError);
    assert_eq!(err.code, "CWL-CONFIG-001");
    assert_eq!(err.field_path.as_deref(), Some("capabilities[1]"));
}

#[test]
#[serial]
fn test_bad_quantity_is_a_config_error() {
    clear_cwl2nf_env();
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("cwl2nf.toml"),
        "[default_shape]\ncpus = 2\nmemory = \"lots\"\ntime = \"2h\"\n",
    )
    .unwrap();

    let err = ConfigLoader::load(None, temp_dir.path()).unwrap_err();
    assert_eq!(err.category, ErrorCategory::ConfigError);
}
