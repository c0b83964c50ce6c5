use super::process::ChildGroup;
use super::startup::{build_input, build_sink, prepare, Prepared};
use crate::capture::CaptureLoop;
use crate::config::{CamrelayConfig, RunMode};
use crate::error::{CamrelayError, Result};
use crate::exchange::ExchangePorts;
use crate::lifecycle::{LoopEnd, LoopReport, LoopRole, StopSignal};
use crate::present::PresentLoop;
use crate::relay::RelayLoop;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::{self, JoinError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const REAP_INTERVAL: Duration = Duration::from_millis(50);
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Starts the three loops and decides when each of them ends.
///
/// Capture and relay end on their own bounds. The presenter has none: it is
/// stopped once both producers are done. A presenter that quits leaves nobody
/// to request frames, so the producers are stopped too. SIGINT/SIGTERM stop
/// everything.
pub struct Supervisor {
    config: CamrelayConfig,
}

impl Supervisor {
    pub fn new(config: CamrelayConfig) -> Self {
        Self { config }
    }

    /// Run to completion and return the process exit code.
    ///
    /// Creates its own tokio runtime; in process mode this happens after the
    /// children are forked, so no runtime threads exist at fork time.
    pub fn run(self) -> Result<i32> {
        info!("Starting camrelay in {:?} mode", self.config.system.mode);
        match self.config.system.mode {
            RunMode::Process => self.run_processes(),
            RunMode::Thread => {
                let runtime = build_runtime()?;
                let reports = runtime.block_on(self.run_threads())?;
                Ok(exit_code(&reports))
            }
        }
    }

    fn run_processes(self) -> Result<i32> {
        let Prepared { camera, exchange } = prepare(&self.config)?;
        let sink = build_sink(&self.config.present)?;
        let ExchangePorts {
            capture,
            relay,
            present,
        } = exchange.ports();
        let config = self.config;

        let mut group = ChildGroup::new();
        let spawned = group
            .spawn(LoopRole::Capture, || {
                CaptureLoop::new(Box::new(camera), capture, &config.capture)
                    .with_stop(StopSignal::Termination)
                    .run()
            })
            .and_then(|_| {
                group.spawn(LoopRole::Relay, || {
                    RelayLoop::new(relay, &config.relay)
                        .with_stop(StopSignal::Termination)
                        .run()
                })
            })
            .and_then(|_| {
                group.spawn(LoopRole::Present, || {
                    let input = build_input(&config.present, StopSignal::Termination);
                    PresentLoop::new(present, Box::new(sink), Box::new(input), &config.present)
                        .run()
                })
            });

        if let Err(e) = spawned {
            error!("Failed to start all loops: {}", e);
            group.abort();
            return Err(e);
        }

        let runtime = build_runtime()?;
        runtime.block_on(supervise_children(group))
    }

    /// Thread mode: the loops run as blocking tasks of the current runtime
    pub async fn run_threads(self) -> Result<Vec<LoopReport>> {
        let Prepared { camera, exchange } = prepare(&self.config)?;
        let sink = build_sink(&self.config.present)?;
        let ports = exchange.ports();

        let producers_stop = CancellationToken::new();
        let presenter_stop = CancellationToken::new();

        let capture = CaptureLoop::new(Box::new(camera), ports.capture, &self.config.capture)
            .with_stop(StopSignal::Token(producers_stop.clone()));
        let relay = RelayLoop::new(ports.relay, &self.config.relay)
            .with_stop(StopSignal::Token(producers_stop.clone()));
        let present_config = self.config.present.clone();
        let present_stop = StopSignal::Token(presenter_stop.clone());

        let capture_task = task::spawn_blocking(move || capture.run());
        let relay_task = task::spawn_blocking(move || relay.run());
        let present_task = task::spawn_blocking(move || {
            let input = build_input(&present_config, present_stop);
            PresentLoop::new(ports.present, Box::new(sink), Box::new(input), &present_config)
                .run()
        });

        let producers = async {
            let capture = joined_report(LoopRole::Capture, capture_task.await);
            let relay = joined_report(LoopRole::Relay, relay_task.await);
            presenter_stop.cancel();
            (capture, relay)
        };
        let consumer = async {
            let present = joined_report(LoopRole::Present, present_task.await);
            producers_stop.cancel();
            present
        };

        let joined = async { tokio::join!(producers, consumer) };
        tokio::pin!(joined);

        let ((capture, relay), present) = tokio::select! {
            results = &mut joined => results,
            reason = shutdown_signal() => {
                info!("Shutdown initiated: {}", reason);
                producers_stop.cancel();
                presenter_stop.cancel();
                (&mut joined).await
            }
        };

        Ok(vec![capture, relay, present])
    }
}

async fn supervise_children(mut group: ChildGroup) -> Result<i32> {
    let mut ticker = tokio::time::interval(REAP_INTERVAL);
    let mut sigterm = signal(SignalKind::terminate())?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c, if !interrupted => {
                info!("Received SIGINT signal (Ctrl+C)");
                interrupted = true;
                group.stop_all();
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
                group.stop_all();
            }
        }

        group.reap()?;
        if group.all_exited() {
            break;
        }

        if !group.is_running(LoopRole::Capture) && !group.is_running(LoopRole::Relay) {
            group.stop(LoopRole::Present);
        }
        if !group.is_running(LoopRole::Present) {
            group.stop(LoopRole::Capture);
            group.stop(LoopRole::Relay);
        }
        group.escalate(KILL_GRACE);
    }

    let code = group.exit_code();
    info!("All loops finished, exit code {}", code);
    Ok(code)
}

async fn shutdown_signal() -> &'static str {
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            }
        }
        Err(e) => {
            warn!("Failed to register SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

fn joined_report(role: LoopRole, joined: std::result::Result<LoopReport, JoinError>) -> LoopReport {
    joined.unwrap_or_else(|e| {
        error!("{} loop panicked: {}", role, e);
        LoopReport {
            role,
            ended_by: LoopEnd::Failed(format!("task failed: {}", e)),
            elapsed: Duration::ZERO,
            frames: 0,
            secondary: 0,
        }
    })
}

/// 0 when every loop ended cleanly
pub fn exit_code(reports: &[LoopReport]) -> i32 {
    if reports.iter().all(|report| report.ended_by.is_clean()) {
        0
    } else {
        1
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CamrelayError::system(format!("Failed to build tokio runtime: {}", e)))
}
