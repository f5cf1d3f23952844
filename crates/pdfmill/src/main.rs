use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use pdfmill::config::{default_config_path, load_config, parse_sweep_time, Config};
use pdfmill::janitor::{run_sweeps, Janitor, JanitorScheduler};
use pdfmill::pipeline::{Orchestrator, PipelineConfig};
use pdfmill::processor::{CommandEngine, HttpFetcher, PdfGate};
use pdfmill::storage::InstanceLayout;
use pdfmill::task::{NewTask, TaskStore};
use pdfmill::telemetry::{self, LogFormat};
use pdfmill::webhook::{TaskView, WebhookNotifier};
use pdfmill::worker::{
    DispatchExit, DispatchSettings, Dispatcher, OrchestratorFactory, ProcessSupervisor,
    WorkerPool, EXIT_RESTART,
};
use pdfmill::{ConfigError, Database, PdfmillError, WorkerError};

#[derive(Parser)]
#[command(name = "pdfmill")]
#[command(author, version, about = "PDF extraction job orchestrator")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the configuration file (default: ~/.pdfmill/config.json)
    #[arg(short, long, env = "PDFMILL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log output format: pretty or json
    #[arg(long, default_value = "pretty", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker pool until interrupted
    Worker {
        /// Re-queue tasks left RUNNING by a previous process
        #[arg(long)]
        recover: bool,
    },

    /// Run the retention sweeps on their daily schedule
    Janitor {
        /// Run both sweeps once and exit
        #[arg(long)]
        once: bool,
    },

    /// Create a task and print its uuid
    Submit {
        /// Source document URL
        #[arg(long)]
        file_url: String,

        /// Label used to name the downloaded file
        #[arg(long)]
        file_id: String,

        /// Webhook target notified on completion
        #[arg(long)]
        callback_url: Option<String>,

        /// Tuning options as JSON
        #[arg(long, default_value = "{}")]
        finetune: String,
    },

    /// Print the public view of a task
    Status {
        /// Task uuid
        uuid: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> pdfmill::Result<ExitCode> {
    let config_path = cli
        .config
        .or_else(default_config_path)
        .ok_or_else(|| ConfigError::Validation {
            message: "no config path given and no home directory found".to_string(),
        })?;
    let config = load_config(&config_path)?;
    info!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Commands::Worker { recover } => run_worker(&config, recover),
        Commands::Janitor { once } => run_janitor(&config, once),
        Commands::Submit {
            file_url,
            file_id,
            callback_url,
            finetune,
        } => {
            let tz = config.tz()?;
            let store = Database::open(&config.database_path())?;
            let now = Utc::now().with_timezone(&tz).fixed_offset();
            let new = NewTask::new(&file_id, &file_url, &finetune, callback_url.as_deref(), now)?;
            let task = store.insert(new)?;
            println!("{}", task.uuid);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status { uuid } => {
            let store = Database::open(&config.database_path())?;
            let task = store
                .find_by_uuid(&uuid)?
                .ok_or_else(|| PdfmillError::TaskNotFound(uuid.clone()))?;
            let view = TaskView::from_task(&task, &config.app_url);
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn install_stop_handler() -> Result<Arc<AtomicBool>, WorkerError> {
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::Release);
    })
    .map_err(|e| WorkerError::SignalHandler(e.to_string()))?;
    Ok(stop)
}

fn run_worker(config: &Config, recover: bool) -> pdfmill::Result<ExitCode> {
    let pipeline_config = Arc::new(PipelineConfig::from_config(config)?);
    let timezone = pipeline_config.timezone;
    let store = Arc::new(Database::open(&config.database_path())?);
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
        config.download.timeout_secs,
    ))?);
    let gate = Arc::new(PdfGate::new(pipeline_config.limits));
    let notifier = Arc::new(WebhookNotifier::new(
        &config.app_url,
        Duration::from_secs(config.webhook.timeout_secs),
    )?);

    let factory: Arc<OrchestratorFactory> = {
        let store = Arc::clone(&store);
        let program = config.engine.program.clone();
        let args = config.engine.args.clone();
        Arc::new(move |_worker_id: usize| {
            Orchestrator::new(
                Arc::clone(&pipeline_config),
                store.clone(),
                fetcher.clone(),
                gate.clone(),
                Box::new(CommandEngine::new(program.clone(), args.clone())),
                notifier.clone(),
            )
        })
    };

    let supervisor = Arc::new(ProcessSupervisor::new());
    let pool = WorkerPool::new(
        config.worker_count,
        config.dispatch.queue_capacity,
        supervisor.clone(),
        factory,
    )?;
    let mut dispatcher = Dispatcher::new(
        store,
        pool,
        DispatchSettings::from(&config.dispatch),
        timezone,
    );
    if recover {
        dispatcher.recover()?;
    }

    let stop = install_stop_handler()?;
    info!("Worker running with {} thread(s)", config.worker_count);

    match dispatcher.run(&stop, &supervisor) {
        DispatchExit::Stopped => {
            info!("Worker stopped");
            Ok(ExitCode::SUCCESS)
        }
        DispatchExit::RestartRequested(code) => {
            warn!("Exiting for restart after {}", code);
            Ok(ExitCode::from(EXIT_RESTART as u8))
        }
    }
}

fn run_janitor(config: &Config, once: bool) -> pdfmill::Result<ExitCode> {
    let tz = config.tz()?;
    let retention = &config.retention;
    let janitor = Arc::new(Janitor::new(
        InstanceLayout::new(&config.instance_path),
        tz,
        retention.archive_keep_days,
        retention.workdir_keep_days,
    ));

    if once {
        let (archives, workdirs) = run_sweeps(&janitor, Utc::now().with_timezone(&tz));
        return Ok(if archives.is_some() && workdirs.is_some() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    let archive_at = parse_sweep_time("retention.archive_sweep_at", &retention.archive_sweep_at)?;
    let workdir_at = parse_sweep_time("retention.workdir_sweep_at", &retention.workdir_sweep_at)?;
    let scheduler = JanitorScheduler::new(janitor, archive_at, workdir_at);
    let handle = scheduler.start()?;

    let stop = install_stop_handler()?;
    while !stop.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(200));
    }

    scheduler.stop();
    if handle.join().is_err() {
        error!("Janitor thread panicked");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
