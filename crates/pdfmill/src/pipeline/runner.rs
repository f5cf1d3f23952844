use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info, info_span, warn};

use crate::processor::{ExtractionEngine, FileGate, SourceFetcher, TuningOptions};
use crate::sanitize;
use crate::storage::layout::{self, workdir_name};
use crate::storage::pack_directory;
use crate::task::{ErrorCode, Phase, Task, TaskStore};
use crate::webhook::{Delivery, Notifier};

use super::config::PipelineConfig;
use super::context::JobContext;
use super::error::{JobWarning, OrchestratorError, PhaseFailure};

/// How a single run ended, as seen by the worker that drove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// No record, or the record was already terminal.
    Skipped,
    Completed,
    Terminated(ErrorCode),
    /// The task is terminated and the hosting worker must be replaced before
    /// it runs another job.
    RestartWorker(ErrorCode),
}

/// Drives one task from `CREATED` to a terminal status, committing every
/// transition before the side effect it announces.
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    store: Arc<dyn TaskStore>,
    fetcher: Arc<dyn SourceFetcher>,
    gate: Arc<dyn FileGate>,
    engine: Box<dyn ExtractionEngine>,
    notifier: Arc<dyn Notifier>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<PipelineConfig>,
        store: Arc<dyn TaskStore>,
        fetcher: Arc<dyn SourceFetcher>,
        gate: Arc<dyn FileGate>,
        engine: Box<dyn ExtractionEngine>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            gate,
            engine,
            notifier,
        }
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.config.timezone).fixed_offset()
    }

    fn commit(&self, task: &mut Task) -> Result<(), OrchestratorError> {
        task.updated_at = self.now();
        self.store.save(task)?;
        Ok(())
    }

    fn enter(&self, task: &mut Task, phase: Phase) -> Result<(), OrchestratorError> {
        if !task.advance(phase)? {
            debug!("Re-entering {} with persisted phase {}", phase, task.result);
        }
        self.commit(task)
    }

    /// Run the full lifecycle for the task with `id`.
    ///
    /// Classified failures end as [`JobOutcome::Terminated`]; only a failure
    /// to commit a transition is returned as an error.
    pub fn run(&mut self, id: i64) -> Result<JobOutcome, OrchestratorError> {
        let Some(mut task) = self.store.load(id)? else {
            warn!("Task {} not found, dropping stale job reference", id);
            return Ok(JobOutcome::Skipped);
        };
        if task.status.is_terminal() {
            info!("Task {} is already {}, skipping", id, task.status);
            return Ok(JobOutcome::Skipped);
        }

        let _job_span = info_span!("job",
            task_id = task.id,
            uuid = %task.uuid,
            file_id = %task.file_id,
        )
        .entered();

        let redelivered = task.status == crate::task::Status::Running;
        task.begin(self.now())?;
        self.commit(&mut task)?;
        if redelivered {
            info!("Task redelivered at phase {}, re-running from entry", task.result);
        }

        let mut ctx = JobContext::new(task);

        // Prepare workdir
        if let Err(failure) = self.step_prepare_workdir(&mut ctx) {
            return self.fail(ctx, failure);
        }

        // COLLECTING
        {
            let _step = info_span!("collect").entered();
            self.enter(&mut ctx.task, Phase::Collecting)?;
            if let Err(failure) = self.step_collect(&mut ctx) {
                return self.fail(ctx, failure);
            }
        }

        // CHECKING
        {
            let _step = info_span!("check").entered();
            self.enter(&mut ctx.task, Phase::Checking)?;
            if let Err(failure) = self.step_check(&mut ctx) {
                return self.fail(ctx, failure);
            }
        }

        // INFERRING
        {
            let _step = info_span!("infer").entered();
            self.enter(&mut ctx.task, Phase::Inferring)?;
            if let Err(failure) = self.step_infer(&mut ctx) {
                return self.fail(ctx, failure);
            }
        }

        // PACKING
        {
            let _step = info_span!("pack").entered();
            self.enter(&mut ctx.task, Phase::Packing)?;
            match self.step_pack(&ctx) {
                Ok((location, checksum)) => {
                    ctx.task.record_archive(location, checksum)?;
                    self.commit(&mut ctx.task)?;
                }
                Err(failure) => return self.fail(ctx, failure),
            }
        }

        // CLEANING
        {
            let _step = info_span!("clean").entered();
            self.enter(&mut ctx.task, Phase::Cleaning)?;
            if let Err(failure) = self.step_clean(&mut ctx) {
                return self.fail(ctx, failure);
            }
        }

        ctx.task.complete(self.now())?;
        self.commit(&mut ctx.task)?;
        info!(
            "Task completed: {} ({})",
            ctx.task.tarball_location, ctx.task.tarball_checksum
        );

        for warning in &ctx.warnings {
            match warning {
                JobWarning::WorkdirNotRemoved { path, error } => {
                    warn!(
                        "Working directory {} left behind: {}",
                        sanitize::redact_path(path),
                        error
                    );
                }
            }
        }

        self.step_notify(&ctx.task);
        Ok(JobOutcome::Completed)
    }

    /// Records `failure` on the task and ends the run.
    fn fail(
        &self,
        mut ctx: JobContext,
        failure: PhaseFailure,
    ) -> Result<JobOutcome, OrchestratorError> {
        let code = failure.code();
        warn!(
            "Task terminated in {} with {}: {}",
            ctx.task.result, code, failure
        );
        ctx.task.terminate(code)?;
        self.commit(&mut ctx.task)?;

        if self.config.notify_on_failure {
            self.step_notify(&ctx.task);
        }

        if code.requires_worker_restart() {
            warn!("{} leaves the engine unusable, requesting worker restart", code);
            Ok(JobOutcome::RestartWorker(code))
        } else {
            Ok(JobOutcome::Terminated(code))
        }
    }

    fn step_prepare_workdir(&self, ctx: &mut JobContext) -> Result<(), PhaseFailure> {
        let moment = self.now();
        let name = workdir_name(&ctx.task.uuid, &moment);
        let workdir = self.config.layout.prepare_workdir(&name, &moment)?;
        debug!("Prepared working directory {}", name);
        ctx.moment = Some(moment);
        ctx.workdir = Some(workdir);
        Ok(())
    }

    fn workdir(ctx: &JobContext) -> Result<PathBuf, PhaseFailure> {
        ctx.workdir
            .clone()
            .ok_or_else(|| PhaseFailure::Internal("working directory was not prepared".into()))
    }

    fn step_collect(&self, ctx: &mut JobContext) -> Result<(), PhaseFailure> {
        let workdir = Self::workdir(ctx)?;
        let dest = workdir.join(format!("{}.pdf", ctx.task.file_id));
        let bytes = self.fetcher.fetch(&ctx.task.file_url, &dest)?;
        debug!(
            "Fetched {} bytes from {}",
            bytes,
            sanitize::redact_url(&ctx.task.file_url)
        );
        ctx.source_path = Some(dest);
        Ok(())
    }

    fn step_check(&self, ctx: &mut JobContext) -> Result<(), PhaseFailure> {
        let source = ctx
            .source_path
            .as_deref()
            .ok_or_else(|| PhaseFailure::Internal("source file was not collected".into()))?;
        self.gate.validate(source)?;
        Ok(())
    }

    fn step_infer(&mut self, ctx: &mut JobContext) -> Result<(), PhaseFailure> {
        let workdir = Self::workdir(ctx)?;
        let source = ctx
            .source_path
            .clone()
            .ok_or_else(|| PhaseFailure::Internal("source file was not collected".into()))?;
        let options = TuningOptions::parse_lenient(&ctx.task.finetune_args);
        debug!(
            "Running engine with backend={} method={} lang={}",
            options.parser_engine.as_str(),
            options.parser_prefer.as_str(),
            options.target_language.as_str()
        );
        self.engine.run(&source, &workdir, &options)?;
        Ok(())
    }

    fn step_pack(&self, ctx: &JobContext) -> Result<(String, String), PhaseFailure> {
        let workdir = Self::workdir(ctx)?;
        let folder = workdir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PhaseFailure::Internal("working directory has no name".into()))?
            .to_string();

        let moment = ctx
            .moment
            .ok_or_else(|| PhaseFailure::Internal("working directory was not prepared".into()))?;
        let dest = self.config.layout.prepare_archive_path(&folder, &moment)?;
        let packed = pack_directory(&workdir, &dest)?;
        let location = self
            .config
            .layout
            .relative_location(&packed.path)
            .ok_or_else(|| {
                PhaseFailure::Internal(format!(
                    "archive {} is outside the instance directory",
                    sanitize::redact_path(&packed.path)
                ))
            })?;
        debug!("Packed {} entries into {}", packed.entries, location);

        Ok((location, packed.checksum))
    }

    fn step_clean(&self, ctx: &mut JobContext) -> Result<(), PhaseFailure> {
        let archive_path = self.config.layout.resolve_location(&ctx.task.tarball_location);
        if !archive_path.is_file() {
            return Err(PhaseFailure::Internal(format!(
                "archive {} is missing, keeping working directory",
                ctx.task.tarball_location
            )));
        }

        let workdir = Self::workdir(ctx)?;
        if let Err(e) = layout::remove_tree(&workdir) {
            ctx.warnings.push(JobWarning::WorkdirNotRemoved {
                path: workdir,
                error: e.to_string(),
            });
        }
        Ok(())
    }

    fn step_notify(&self, task: &Task) {
        let _step = info_span!("notify").entered();
        match self.notifier.notify(task) {
            Delivery::Skipped => debug!("No callback configured"),
            Delivery::Delivered { attempts } => {
                info!("Webhook delivered after {} attempt(s)", attempts)
            }
            Delivery::GaveUp { attempts } => {
                warn!("Webhook abandoned after {} attempts", attempts)
            }
        }
    }
}
