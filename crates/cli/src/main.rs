//! runjobs emulator - run batch jobs locally as containers or processes.

mod config;
mod jobs_file;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::{parse_env_pair, ExecutorKind, Settings};
use jobs_file::JobsFile;
use runjobs_core::{Environment, ExecutionSnapshot, ExecutionStatus, JobName};
use runjobs_execution::JobService;
use runjobs_executor::{ContainerExecutor, Executor, ProcessExecutor};
use runjobs_storage::MemoryRegistry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Poll interval while waiting for an execution.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Wait limit when neither `--timeout` nor the job sets one.
const MAX_WAIT: Duration = Duration::from_secs(7 * 24 * 3600);
/// How long to wait for a run to settle after a stop request.
const STOP_GRACE: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "runjobs-emulator", version)]
#[command(about = "Local emulator for managed batch jobs", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the jobs from the jobs file
    Jobs,
    /// Run a job and wait for it to finish
    Run {
        /// Job id or full resource name
        job: String,
        /// Environment override, repeatable
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
        /// Seconds to wait before stopping the run; defaults to the job's timeout
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Print the new execution and exit without waiting
        #[arg(long)]
        detach: bool,
    },
    /// Validate the configuration and print it
    Check,
}

fn init_logging(level: &str) -> Result<()> {
    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::try_from_default_env().context("parsing RUST_LOG")?
    } else {
        EnvFilter::try_new(level).with_context(|| format!("parsing log level {:?}", level))?
    };

    // stderr keeps the stdout of subprocess jobs and our JSON output clean
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.settings.log_level)?;

    let jobs_file = jobs_file::load(&cli.settings.jobs_config)?;

    match cli.command {
        Commands::Check => check(&cli.settings, &jobs_file),
        Commands::Jobs => {
            let (svc, timeouts) = build_service(&cli.settings, &jobs_file).await?;
            let jobs = svc.list_jobs(&svc.parent()).await;

            println!("Jobs ({})", jobs.len());
            for job in jobs {
                let timeout = timeouts
                    .get(&job.name)
                    .map(|t| format!("{}s", t.as_secs()))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {} | {} | {} | timeout {}",
                    job.short_name(),
                    job.image,
                    job.command.join(" "),
                    timeout,
                );
            }
            Ok(())
        }
        Commands::Run {
            job,
            env,
            timeout,
            detach,
        } => {
            let (svc, timeouts) = build_service(&cli.settings, &jobs_file).await?;
            let job = svc
                .resolve_job(&job)
                .await
                .with_context(|| format!("looking up job {}", job))?;

            let timeout = timeout
                .map(Duration::from_secs)
                .or_else(|| timeouts.get(&job.name).copied());
            let overrides: Environment = env.into_iter().collect();

            run(&svc, &job.name, &overrides, timeout, detach).await
        }
    }
}

/// Build the executor, the service and register every job in the file.
///
/// Also returns the timeouts from the file, keyed by full job name.
async fn build_service(
    settings: &Settings,
    jobs_file: &JobsFile,
) -> Result<(JobService, HashMap<String, Duration>)> {
    let executor = build_executor(settings).await?;
    let svc = JobService::new(
        Arc::new(MemoryRegistry::new()),
        executor,
        settings.project_id.clone(),
        settings.region.clone(),
    );

    let mut timeouts = HashMap::new();
    for definition in &jobs_file.jobs {
        let job = svc
            .register_job(&definition.name, definition.template())
            .await
            .with_context(|| format!("registering job {}", definition.name))?;

        match (definition.timeout.as_deref(), definition.timeout()) {
            (_, Some(timeout)) => {
                timeouts.insert(job.name.clone(), timeout);
            }
            (Some(raw), None) => {
                warn!(job = %job.name, timeout = raw, "ignoring unreadable timeout")
            }
            (None, None) => {}
        }
    }
    Ok((svc, timeouts))
}

async fn build_executor(settings: &Settings) -> Result<Arc<dyn Executor>> {
    match settings.executor {
        ExecutorKind::Docker => {
            let executor = ContainerExecutor::connect(settings.container_options())
                .await
                .context("creating docker executor")?;
            info!(network = %executor.network(), "using docker executor");
            Ok(Arc::new(executor))
        }
        ExecutorKind::Subprocess => {
            info!("using subprocess executor");
            Ok(Arc::new(ProcessExecutor::new()))
        }
    }
}

async fn run(
    svc: &JobService,
    job_name: &str,
    overrides: &Environment,
    timeout: Option<Duration>,
    detach: bool,
) -> Result<()> {
    let handle = svc.run_job(job_name, overrides).await?;
    if detach {
        print_snapshot(&handle.snapshot)?;
        return Ok(());
    }

    let name = handle.name.as_str();
    let snapshot = tokio::select! {
        waited = svc.wait_for_completion(name, timeout.unwrap_or(MAX_WAIT), POLL_INTERVAL) => {
            match waited? {
                Some(snapshot) => snapshot,
                None => {
                    warn!(execution = %name, "timed out, stopping execution");
                    stop(svc, name).await?
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!(execution = %name, "interrupted, stopping execution");
            stop(svc, name).await?
        }
    };

    // Let the backend finish its cleanup before the runtime goes away.
    if tokio::time::timeout(STOP_GRACE, handle.task).await.is_err() {
        warn!(execution = %name, "executor still busy at exit");
    }

    print_snapshot(&snapshot)?;
    if snapshot.status != ExecutionStatus::Succeeded {
        bail!("execution {} finished {}", snapshot.name, snapshot.status);
    }
    Ok(())
}

/// Cancel, or when the backend cannot, give the run a moment to end.
async fn stop(svc: &JobService, name: &str) -> Result<ExecutionSnapshot> {
    match svc.cancel_execution(name).await {
        Ok(snapshot) => Ok(snapshot),
        Err(e) => {
            warn!(execution = %name, error = %e, "cancel failed, waiting for the run to end");
            match svc.wait_for_completion(name, STOP_GRACE, POLL_INTERVAL).await? {
                Some(snapshot) => Ok(snapshot),
                None => Ok(svc.get_execution(name).await?),
            }
        }
    }
}

fn print_snapshot(snapshot: &ExecutionSnapshot) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(snapshot)?);
    Ok(())
}

fn check(settings: &Settings, jobs_file: &JobsFile) -> Result<()> {
    let parent = runjobs_core::name::parent_name(&settings.project_id, &settings.region);

    let mut seen = HashSet::new();
    let mut jobs = Vec::new();
    for definition in &jobs_file.jobs {
        let name = JobName::under(&parent, &definition.name)
            .with_context(|| format!("job {:?}", definition.name))?;
        definition
            .template()
            .validate()
            .with_context(|| format!("job {}", definition.name))?;
        if !seen.insert(definition.name.clone()) {
            bail!("job {} is defined more than once", definition.name);
        }
        if let (Some(raw), None) = (definition.timeout.as_deref(), definition.timeout()) {
            bail!("job {}: unreadable timeout {:?}", definition.name, raw);
        }
        jobs.push(name.to_string());
    }

    let report = serde_json::json!({
        "settings": settings,
        "parent": parent,
        "jobs": jobs,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "runjobs-emulator",
            "--executor",
            "subprocess",
            "run",
            "echo-job",
            "--env",
            "A=1",
            "--env",
            "B=x=y",
            "--timeout",
            "30",
        ])
        .unwrap();

        assert_eq!(cli.settings.executor, ExecutorKind::Subprocess);
        match cli.command {
            Commands::Run {
                job,
                env,
                timeout,
                detach,
            } => {
                assert_eq!(job, "echo-job");
                assert_eq!(
                    env,
                    vec![
                        ("A".to_string(), "1".to_string()),
                        ("B".to_string(), "x=y".to_string()),
                    ]
                );
                assert_eq!(timeout, Some(30));
                assert!(!detach);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["runjobs-emulator", "jobs", "--region", "asia-east1"]).unwrap();
        assert_eq!(cli.settings.region, "asia-east1");
        assert!(matches!(cli.command, Commands::Jobs));
    }

    #[test]
    fn test_bad_env_pair_rejected() {
        let parsed = Cli::try_parse_from(["runjobs-emulator", "run", "job", "--env", "novalue"]);
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_build_service_registers_jobs() {
        let file: JobsFile = serde_yaml::from_str(
            r#"
jobs:
  - name: a
    command: ["true"]
    timeout: 2m
  - name: b
    command: ["true"]
"#,
        )
        .unwrap();
        let args = ["runjobs-emulator", "--executor", "subprocess", "check"];
        let settings = Cli::try_parse_from(args).unwrap().settings;

        let (svc, timeouts) = build_service(&settings, &file).await.unwrap();
        let jobs = svc.list_jobs(&svc.parent()).await;
        assert_eq!(jobs.len(), 2);
        assert_eq!(
            timeouts.get(&jobs[0].name),
            Some(&Duration::from_secs(120))
        );
        assert!(!timeouts.contains_key(&jobs[1].name));
    }

    #[tokio::test]
    async fn test_run_subprocess_job() {
        let svc = JobService::new(
            Arc::new(MemoryRegistry::new()),
            Arc::new(ProcessExecutor::new()),
            "p",
            "r",
        );
        let ok = svc
            .register_job("ok", runjobs_core::JobTemplate::default().with_command(["true"]))
            .await
            .unwrap();
        let bad = svc
            .register_job("bad", runjobs_core::JobTemplate::default().with_command(["false"]))
            .await
            .unwrap();

        run(&svc, &ok.name, &Environment::new(), Some(Duration::from_secs(10)), false)
            .await
            .unwrap();
        let err = run(&svc, &bad.name, &Environment::new(), Some(Duration::from_secs(10)), false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("FAILED"));
    }
}
