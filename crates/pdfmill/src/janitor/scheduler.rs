//! Daily retention scheduler.
//!
//! Runs each sweep once a day at its configured local wall-clock time. The
//! loop lives on its own thread with a current-thread runtime; a broadcast
//! channel wakes it for manual runs and for shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::broadcast;

use super::sweeps::{Janitor, SweepReport};
use crate::error::WorkerError;

/// Next occurrence of `at` strictly after `now`, in `now`'s zone.
///
/// A wall-clock time skipped by a DST jump resolves to the first valid
/// minute after the gap; an ambiguous one resolves to its earlier instant.
pub fn next_run(now: DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let mut day = now.date_naive();
    loop {
        let candidate = resolve_local(&tz, day.and_time(at));
        if let Some(candidate) = candidate {
            if candidate > now {
                return candidate;
            }
        }
        day = match day.checked_add_days(Days::new(1)) {
            Some(next) => next,
            None => return now,
        };
    }
}

fn resolve_local(tz: &Tz, local: chrono::NaiveDateTime) -> Option<DateTime<Tz>> {
    if let Some(instant) = tz.from_local_datetime(&local).earliest() {
        return Some(instant);
    }
    // Skipped by a forward jump; walk to the end of the gap.
    (1..=180).find_map(|minutes| {
        let shifted = local + chrono::Duration::minutes(minutes);
        tz.from_local_datetime(&shifted).earliest()
    })
}

/// Runs both sweeps now and logs their outcome. A sweep that could not read
/// its root is reported as `None`.
pub fn run_sweeps(janitor: &Janitor, now: DateTime<Tz>) -> (Option<SweepReport>, Option<SweepReport>) {
    let archives = match janitor.prune_archives(now) {
        Ok(report) => Some(report),
        Err(e) => {
            log::error!("Archive sweep failed: {}", e);
            None
        }
    };
    let workdirs = match janitor.prune_workdirs(now) {
        Ok(report) => Some(report),
        Err(e) => {
            log::error!("Workdir sweep failed: {}", e);
            None
        }
    };

    let totals = [&archives, &workdirs]
        .into_iter()
        .flatten()
        .fold((0, 0), |(skipped, failed), r| (skipped + r.skipped, failed + r.failed));
    log::info!(
        "Removed {} archive dir(s) and {} cache entr(ies); {} skipped, {} failed",
        archives.as_ref().map_or(0, |r| r.removed.len()),
        workdirs.as_ref().map_or(0, |r| r.removed.len()),
        totals.0,
        totals.1
    );
    (archives, workdirs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    RunNow,
    Wake,
}

/// Periodic retention scheduler.
pub struct JanitorScheduler {
    janitor: Arc<Janitor>,
    archive_at: NaiveTime,
    workdir_at: NaiveTime,
    shutdown: Arc<AtomicBool>,
    signals: broadcast::Sender<Signal>,
}

impl JanitorScheduler {
    pub fn new(janitor: Arc<Janitor>, archive_at: NaiveTime, workdir_at: NaiveTime) -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            janitor,
            archive_at,
            workdir_at,
            shutdown: Arc::new(AtomicBool::new(false)),
            signals,
        }
    }

    /// Start the sweep loop in a background thread.
    pub fn start(&self) -> Result<JoinHandle<()>, WorkerError> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(WorkerError::Runtime)?;

        let janitor = Arc::clone(&self.janitor);
        let shutdown = Arc::clone(&self.shutdown);
        let mut signal_rx = self.signals.subscribe();
        let archive_at = self.archive_at;
        let workdir_at = self.workdir_at;

        let handle = std::thread::Builder::new()
            .name("pdfmill-janitor".to_string())
            .spawn(move || {
                rt.block_on(async {
                    let tz = janitor.tz();
                    let start = Utc::now().with_timezone(&tz);
                    let mut next_archive = next_run(start, archive_at);
                    let mut next_workdir = next_run(start, workdir_at);
                    log::info!(
                        "Janitor scheduled: archives at {}, workdirs at {}",
                        next_archive,
                        next_workdir
                    );

                    loop {
                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        let now = Utc::now().with_timezone(&tz);
                        let due = next_archive.min(next_workdir);
                        let wait = (due - now).to_std().unwrap_or(Duration::ZERO);

                        let manual = tokio::select! {
                            _ = tokio::time::sleep(wait) => false,
                            signal = signal_rx.recv() => match signal {
                                Ok(Signal::RunNow) => {
                                    log::info!("Manual janitor run triggered");
                                    true
                                }
                                Ok(Signal::Wake) => false,
                                Err(broadcast::error::RecvError::Lagged(_)) => false,
                                Err(broadcast::error::RecvError::Closed) => break,
                            },
                        };

                        if shutdown.load(Ordering::Acquire) {
                            break;
                        }

                        let now = Utc::now().with_timezone(&tz);
                        if manual {
                            run_sweeps(&janitor, now);
                            continue;
                        }
                        if now >= next_archive {
                            if let Err(e) = janitor.prune_archives(now) {
                                log::error!("Archive sweep failed: {}", e);
                            }
                            next_archive = next_run(now, archive_at);
                        }
                        if now >= next_workdir {
                            if let Err(e) = janitor.prune_workdirs(now) {
                                log::error!("Workdir sweep failed: {}", e);
                            }
                            next_workdir = next_run(now, workdir_at);
                        }
                    }
                    log::info!("Janitor stopped");
                });
            })
            .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

        Ok(handle)
    }

    /// Requests an immediate run of both sweeps.
    pub fn trigger(&self) {
        let _ = self.signals.send(Signal::RunNow);
    }

    /// Signals the scheduler to stop and wakes it.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _ = self.signals.send(Signal::Wake);
    }
}
