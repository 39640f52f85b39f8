use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use facework_core::{
    config::Config,
    networking::transfer::TransferEventSender,
    orchestrator::{JobOrchestrator, JobSettings},
    provisioner::{AssetProvisioner, CatalogEntry},
    retriever::{result_directory, ResultRetriever},
    rpc_client::RpcClient,
    types::{AssetHandle, InputTarget, JobId, JobKind, JobStateChange},
    JobError, ServiceContext,
};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod console;
pub mod progress;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FATAL: u8 = 1;
pub const EXIT_INVALID_ARGUMENTS: u8 = 2;
pub const EXIT_JOB_FAILED: u8 = 3;
pub const EXIT_RETRIEVAL_FAILED: u8 = 4;

#[derive(Parser, Debug)]
#[clap(author = "Facework Team", version, about = "Run face detection or face redaction jobs on a media service", long_about = None)]
pub struct ArgConfiguration {
    /// Kind of job to run.
    #[arg(value_enum, required_unless_present = "list_assets")]
    pub mode: Option<Mode>,

    /// ID of an asset already in the store (starts with nb:cid:) or path of a local media file to upload.
    #[arg(value_name = "EXISTING UID or FILE PATH", required_unless_present = "list_assets")]
    pub target: Option<InputTarget>,

    /// List the assets held by the store with their files, then exit.
    #[arg(long, conflicts_with_all = ["mode", "target"])]
    pub list_assets: bool,

    #[command(flatten)]
    pub config: Config,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Redact,
    Detect,
}

impl From<Mode> for JobKind {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Redact => JobKind::Redaction,
            Mode::Detect => JobKind::Detection,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    ListAssets,
    Process { kind: JobKind, target: InputTarget },
}

impl ArgConfiguration {
    pub fn command(&self) -> Result<Command, JobError> {
        if self.list_assets {
            return Ok(Command::ListAssets);
        }
        match (self.mode, &self.target) {
            (Some(mode), Some(target)) => Ok(Command::Process {
                kind: mode.into(),
                target: target.clone(),
            }),
            _ => Err(JobError::InvalidArguments(
                "expected <MODE> <EXISTING UID or FILE PATH>".to_string(),
            )),
        }
    }
}

/// Side channels of a run. None of them influences the result.
#[derive(Default)]
pub struct RunOptions {
    pub observer: Option<UnboundedSender<JobStateChange>>,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
pub enum RunReport {
    Catalog(Vec<CatalogEntry>),
    Completed {
        job: JobId,
        output: AssetHandle,
        result_dir: PathBuf,
        files: Vec<PathBuf>,
    },
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Usage(#[from] clap::Error),

    #[error(transparent)]
    Job(#[from] JobError),

    // The job itself succeeded; only the local copy is missing.
    #[error("job {job} finished but output asset {} could not be retrieved: {source}", .output.id)]
    Retrieval {
        job: JobId,
        output: AssetHandle,
        #[source]
        source: JobError,
    },
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Usage(err) => match err.exit_code() {
                0 => EXIT_SUCCESS,
                _ => EXIT_INVALID_ARGUMENTS,
            },
            CliError::Job(JobError::InvalidArguments(_)) => EXIT_INVALID_ARGUMENTS,
            CliError::Job(
                JobError::JobFailed { .. }
                | JobError::MissingOutput(_)
                | JobError::JobTimedOut(..)
                | JobError::WaitCancelled(_)
                | JobError::RunCancelled(_)
                | JobError::StatusUnavailable { .. },
            ) => EXIT_JOB_FAILED,
            CliError::Job(_) => EXIT_FATAL,
            CliError::Retrieval { .. } => EXIT_RETRIEVAL_FAILED,
        }
    }
}

/// Builds the JSON-RPC backed service context described by `config`.
pub fn connect(
    config: &Config,
    progress: Option<TransferEventSender>,
) -> Result<ServiceContext, JobError> {
    let mut client = RpcClient::new(
        &config.rpc_url,
        config.api_token.as_deref(),
        config.request_timeout(),
    )?;
    if let Some(progress) = progress {
        client = client.with_transfer_progress(progress);
    }
    Ok(ServiceContext::from_backend(Arc::new(client)))
}

/// Parses `args` and runs the selected command. `connect` is only invoked
/// once the arguments are known to be valid.
pub async fn dispatch<I, T, F>(args: I, connect: F, options: RunOptions) -> Result<RunReport, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    F: FnOnce(&Config) -> Result<ServiceContext, JobError>,
{
    let args = ArgConfiguration::try_parse_from(args)?;
    let command = args.command()?;
    let ctx = connect(&args.config)?;
    run(command, &args.config, &ctx, options).await
}

pub async fn run(
    command: Command,
    config: &Config,
    ctx: &ServiceContext,
    options: RunOptions,
) -> Result<RunReport, CliError> {
    match command {
        Command::ListAssets => {
            let catalog = AssetProvisioner::new(ctx.store.clone()).catalog().await?;
            Ok(RunReport::Catalog(catalog))
        }
        Command::Process { kind, target } => {
            run_job_command(config, ctx, kind, &target, options).await
        }
    }
}

async fn run_job_command(
    config: &Config,
    ctx: &ServiceContext,
    kind: JobKind,
    target: &InputTarget,
    options: RunOptions,
) -> Result<RunReport, CliError> {
    let job_id = Uuid::new_v4();
    tracing::info!("starting {} job {job_id} for {target}", kind.label());

    let cancel = options.cancel;

    let provisioner = AssetProvisioner::new(ctx.store.clone());
    let input_name = format!("{} Input Asset {job_id}", kind.label());
    let input = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(JobError::RunCancelled(job_id).into()),
        res = provisioner.provision(target, &input_name) => res?,
    };

    let mut orchestrator =
        JobOrchestrator::new(ctx, JobSettings::from(config)).with_cancellation(cancel.clone());
    if let Some(observer) = options.observer {
        orchestrator = orchestrator.with_observer(observer);
    }
    let output = orchestrator
        .run_job(job_id, kind, &input, config.configuration_file(kind))
        .await?
        .into_output()?;

    let result_dir = result_directory(&config.output_dir, job_id);
    let retriever = ResultRetriever::new(ctx.store.clone());
    let downloaded = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(JobError::WaitCancelled(job_id)),
        res = retriever.download_all(&output, &result_dir) => res,
    };
    let files = downloaded.map_err(|source| CliError::Retrieval {
        job: job_id,
        output: output.clone(),
        source,
    })?;

    Ok(RunReport::Completed {
        job: job_id,
        output,
        result_dir,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facework_core::config::{DEFAULT_DETECTOR_NAME, DEFAULT_REDACTOR_NAME};
    use facework_core::memory::{JobScript, MemoryService};
    use facework_core::types::{ErrorDetail, JobState};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::mpsc;

    struct Workspace {
        dir: tempfile::TempDir,
        service: Arc<MemoryService>,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(
                dir.path().join("faceconfig.json"),
                r#"{"version":"1.0","options":{"TrackingMode":"Fast"}}"#,
            )
            .unwrap();
            std::fs::write(
                dir.path().join("config.json"),
                r#"{"version":"1.0","options":{"Mode":"Combined","BlurType":"High"}}"#,
            )
            .unwrap();
            std::fs::create_dir(dir.path().join("out")).unwrap();
            let service = Arc::new(
                MemoryService::new()
                    .with_processor(DEFAULT_DETECTOR_NAME, "1.0")
                    .with_processor(DEFAULT_REDACTOR_NAME, "1.1")
                    .with_processor(DEFAULT_REDACTOR_NAME, "1.0"),
            );
            Workspace { dir, service }
        }

        fn path(&self, name: &str) -> String {
            self.dir.path().join(name).to_string_lossy().into_owned()
        }

        fn out_dir(&self) -> PathBuf {
            self.dir.path().join("out")
        }

        fn args(&self, positional: &[&str]) -> Vec<String> {
            let mut args = vec!["facework".to_string()];
            args.extend(positional.iter().map(|arg| arg.to_string()));
            args.extend([
                "--detect-config".to_string(),
                self.path("faceconfig.json"),
                "--redact-config".to_string(),
                self.path("config.json"),
                "--output-dir".to_string(),
                self.path("out"),
                "--poll-interval-ms".to_string(),
                "1".to_string(),
            ]);
            args
        }

        async fn dispatch(&self, args: Vec<String>) -> Result<RunReport, CliError> {
            let service = self.service.clone();
            dispatch(
                args,
                move |_: &Config| Ok(ServiceContext::from_backend(service)),
                RunOptions::default(),
            )
            .await
        }
    }

    #[tokio::test]
    async fn test_malformed_arguments_make_no_remote_calls() {
        let ws = Workspace::new();
        let cases: Vec<Vec<&str>> = vec![
            vec!["facework"],
            vec!["facework", "detect"],
            vec!["facework", "detect", "myvideo.mp4", "extra"],
            vec!["facework", "blur", "myvideo.mp4"],
            vec!["facework", "--list-assets", "detect", "myvideo.mp4"],
        ];

        for case in cases {
            let connected = Arc::new(AtomicBool::new(false));
            let service = ws.service.clone();
            let res = dispatch(
                case.clone(),
                {
                    let connected = connected.clone();
                    move |_: &Config| {
                        connected.store(true, Ordering::SeqCst);
                        Ok(ServiceContext::from_backend(service))
                    }
                },
                RunOptions::default(),
            )
            .await;

            let err = res.expect_err("malformed arguments");
            assert!(matches!(err, CliError::Usage(_)), "{case:?}");
            assert_eq!(err.exit_code(), EXIT_INVALID_ARGUMENTS, "{case:?}");
            assert!(!connected.load(Ordering::SeqCst), "{case:?}");
        }
        assert_eq!(ws.service.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_detect_new_file_end_to_end() {
        let ws = Workspace::new();
        std::fs::write(ws.path("myvideo.mp4"), b"not really a video").unwrap();
        ws.service.push_script(
            JobScript::finishing()
                .with_outputs(vec![("faces.json".to_string(), b"{\"fragments\":[]}".to_vec())]),
        );

        let report = ws
            .dispatch(ws.args(&["detect", &ws.path("myvideo.mp4")]))
            .await
            .expect("dispatch");

        let RunReport::Completed {
            job,
            output,
            result_dir,
            files,
        } = report
        else {
            panic!("expected a completed run");
        };
        assert_eq!(result_dir, ws.out_dir().join(format!("result_{job}")));
        assert_eq!(files, vec![result_dir.join("faces.json")]);
        assert_eq!(
            std::fs::read(result_dir.join("faces.json")).unwrap(),
            b"{\"fragments\":[]}"
        );

        assert_eq!(ws.service.call_count("upload_file"), 1);
        let submitted = ws.service.submitted_jobs();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].id, job);
        assert_eq!(submitted[0].task.processor.name, DEFAULT_DETECTOR_NAME);
        assert!(submitted[0].task.configuration.contains("TrackingMode"));
        assert_eq!(submitted[0].task.output_assets, vec![output]);
    }

    #[tokio::test]
    async fn test_redact_existing_reference_skips_upload() {
        let ws = Workspace::new();
        let existing = ws.service.insert_asset(
            "nb:cid:UUID:abc123",
            "stored video",
            vec![("clip.mp4".to_string(), b"clip".to_vec())],
        );

        let report = ws
            .dispatch(ws.args(&["redact", "nb:cid:UUID:abc123"]))
            .await
            .expect("dispatch");

        assert!(matches!(report, RunReport::Completed { .. }));
        assert_eq!(ws.service.call_count("upload_file"), 0);
        assert_eq!(ws.service.call_count("find_asset"), 1);
        let submitted = ws.service.submitted_jobs();
        assert_eq!(submitted[0].task.input_assets, vec![existing]);
        assert_eq!(submitted[0].task.processor.name, DEFAULT_REDACTOR_NAME);
        assert_eq!(submitted[0].task.processor.version, "1.1");
        assert!(submitted[0].task.configuration.contains("BlurType"));
    }

    #[tokio::test]
    async fn test_unknown_reference_fails_before_submission() {
        let ws = Workspace::new();

        let err = ws
            .dispatch(ws.args(&["detect", "nb:cid:UUID:missing"]))
            .await
            .unwrap_err();

        assert!(matches!(err, CliError::Job(JobError::AssetNotFound(_))));
        assert_eq!(err.exit_code(), EXIT_FATAL);
        assert_eq!(ws.service.call_count("submit_job"), 0);
        assert_eq!(ws.service.call_count("upload_file"), 0);
    }

    #[tokio::test]
    async fn test_job_error_reports_detail_and_skips_download() {
        let ws = Workspace::new();
        std::fs::write(ws.path("myvideo.mp4"), b"broken").unwrap();
        ws.service.push_script(JobScript::failing("5000", "decode failure"));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let service = ws.service.clone();
        let err = dispatch(
            ws.args(&["detect", &ws.path("myvideo.mp4")]),
            move |_: &Config| Ok(ServiceContext::from_backend(service)),
            RunOptions {
                observer: Some(tx),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

        match &err {
            CliError::Job(JobError::JobFailed { state, detail, .. }) => {
                assert_eq!(*state, JobState::Error);
                assert_eq!(
                    detail.as_ref(),
                    Some(&ErrorDetail {
                        code: "5000".to_string(),
                        message: "decode failure".to_string(),
                    })
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.exit_code(), EXIT_JOB_FAILED);

        let mut changes = vec![];
        while let Ok(change) = rx.try_recv() {
            changes.push((change.previous, change.current));
        }
        assert_eq!(
            changes,
            vec![
                (JobState::Queued, JobState::Processing),
                (JobState::Processing, JobState::Error),
            ]
        );

        assert_eq!(ws.service.call_count("download_file"), 0);
        assert_eq!(std::fs::read_dir(ws.out_dir()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_failure_keeps_job_successful() {
        let ws = Workspace::new();
        std::fs::write(ws.path("myvideo.mp4"), b"video").unwrap();
        ws.service.push_script(JobScript::finishing().with_outputs(vec![
            ("faces.json".to_string(), b"{}".to_vec()),
            ("faces_thumb.jpg".to_string(), b"jpg".to_vec()),
        ]));
        ws.service.fail_download_of("faces.json");

        let err = ws
            .dispatch(ws.args(&["detect", &ws.path("myvideo.mp4")]))
            .await
            .unwrap_err();

        match &err {
            CliError::Retrieval { source, .. } => {
                assert!(matches!(source, JobError::DownloadFailed { file, .. } if file == "faces.json"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.exit_code(), EXIT_RETRIEVAL_FAILED);
        assert_eq!(ws.service.call_count("download_file"), 1);
    }

    #[tokio::test]
    async fn test_interrupted_run_uploads_nothing() {
        let ws = Workspace::new();
        std::fs::write(ws.path("myvideo.mp4"), b"video").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let service = ws.service.clone();
        let err = dispatch(
            ws.args(&["detect", &ws.path("myvideo.mp4")]),
            move |_: &Config| Ok(ServiceContext::from_backend(service)),
            RunOptions {
                cancel,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CliError::Job(JobError::RunCancelled(_))));
        assert_eq!(err.exit_code(), EXIT_JOB_FAILED);
        assert_eq!(ws.service.call_count("upload_file"), 0);
        assert_eq!(ws.service.call_count("submit_job"), 0);
        assert_eq!(ws.service.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_list_assets() {
        let ws = Workspace::new();
        ws.service.insert_asset(
            "nb:cid:UUID:1",
            "stored video",
            vec![("clip.mp4".to_string(), b"clip".to_vec())],
        );

        let report = ws.dispatch(ws.args(&["--list-assets"])).await.expect("dispatch");
        match report {
            RunReport::Catalog(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].files[0].name, "clip.mp4");
            }
            other => panic!("unexpected report: {other:?}"),
        }
        assert_eq!(ws.service.call_count("submit_job"), 0);
    }

    #[test]
    fn test_config_defaults() {
        let args = ArgConfiguration::try_parse_from(["facework", "detect", "myvideo.mp4"]).unwrap();
        assert_eq!(
            args.command().unwrap(),
            Command::Process {
                kind: JobKind::Detection,
                target: InputTarget::LocalPath(PathBuf::from("myvideo.mp4")),
            }
        );
        assert_eq!(args.config.detect_config, Path::new("faceconfig.json"));
        assert_eq!(args.config.redact_config, Path::new("config.json"));
        assert_eq!(args.config.detector_name, DEFAULT_DETECTOR_NAME);
        assert_eq!(args.config.redactor_name, DEFAULT_REDACTOR_NAME);
        assert_eq!(args.config.job_timeout(), None);
    }
}
