use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::types::JobKind;

pub const DEFAULT_DETECTOR_NAME: &str = "Azure Media Face Detector";
pub const DEFAULT_REDACTOR_NAME: &str = "Azure Media Redactor";

#[derive(Clone, Debug, Args)]
pub struct Config {
    #[arg(
        long,
        long_help = "JSON-RPC url of the media service",
        env = "FACEWORK_RPC_URL",
        default_value = "http://localhost:9944"
    )]
    pub rpc_url: String,

    #[arg(
        long,
        long_help = "Bearer token sent with every media service request",
        env = "FACEWORK_API_TOKEN",
        hide_env_values = true
    )]
    pub api_token: Option<String>,

    #[arg(
        long,
        long_help = "Processor configuration file for face detection jobs",
        env = "FACEWORK_DETECT_CONFIG",
        default_value_os_t = PathBuf::from("faceconfig.json"),
    )]
    pub detect_config: PathBuf,

    #[arg(
        long,
        long_help = "Processor configuration file for face redaction jobs",
        env = "FACEWORK_REDACT_CONFIG",
        default_value_os_t = PathBuf::from("config.json"),
    )]
    pub redact_config: PathBuf,

    #[arg(
        long,
        long_help = "Registry name of the face detection processor",
        env = "FACEWORK_DETECTOR_NAME",
        default_value = DEFAULT_DETECTOR_NAME
    )]
    pub detector_name: String,

    #[arg(
        long,
        long_help = "Registry name of the face redaction processor",
        env = "FACEWORK_REDACTOR_NAME",
        default_value = DEFAULT_REDACTOR_NAME
    )]
    pub redactor_name: String,

    #[arg(
        long,
        long_help = "Directory where result_<job id> directories are created",
        env = "FACEWORK_OUTPUT_DIR",
        default_value_os_t = PathBuf::from("."),
    )]
    pub output_dir: PathBuf,

    #[arg(
        long,
        long_help = "Interval between two job state polls, in milliseconds",
        env = "FACEWORK_POLL_INTERVAL_MS",
        default_value_t = 1000
    )]
    pub poll_interval_ms: u64,

    #[arg(
        long,
        long_help = "Maximum time to wait for the job to finish, in seconds. Waits indefinitely when unset.",
        env = "FACEWORK_JOB_TIMEOUT_SECS"
    )]
    pub job_timeout_secs: Option<u64>,

    #[arg(
        long,
        long_help = "Timeout of a single media service request, in seconds",
        env = "FACEWORK_REQUEST_TIMEOUT_SECS",
        default_value_t = 60
    )]
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn configuration_file(&self, kind: JobKind) -> &PathBuf {
        match kind {
            JobKind::Detection => &self.detect_config,
            JobKind::Redaction => &self.redact_config,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        self.job_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
