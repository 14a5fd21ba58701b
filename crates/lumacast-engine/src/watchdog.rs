//! Tokio task driving the [`HealthMonitor`] and switching to raw video on
//! fallback.
//!
//! Besides the start-up timeout, two compositor faults force fallback: a
//! render stall, and a context loss that is not followed by a restore
//! within the health timeout.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use lumacast_core::health::{FallbackReason, HealthState};
use lumacast_core::{
    EngineStats, HealthConfig, HealthEvent, HealthMonitor, LivenessSignals, StatsCell, VideoSource,
};

use crate::faults::{EngineFault, FaultBus};
use crate::render_loop::{LoopControl, OutputRoute};

#[derive(Debug)]
enum WatchdogCommand {
    Reinitialize,
}

/// What the watchdog observes.
#[derive(Clone)]
pub struct WatchdogInputs {
    pub source: Arc<dyn VideoSource>,
    pub stats: Arc<StatsCell>,
    pub faults: FaultBus,
    pub control: LoopControl,
}

/// Handle to the running watchdog task. Dropping it aborts the task.
pub struct Watchdog {
    commands: mpsc::UnboundedSender<WatchdogCommand>,
    state: watch::Receiver<HealthState>,
    events: broadcast::Sender<HealthEvent>,
    task: JoinHandle<()>,
}

impl Watchdog {
    pub fn spawn(handle: &Handle, config: HealthConfig, inputs: WatchdogInputs) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(HealthState::Idle);
        let (events, _) = broadcast::channel(16);
        let task = handle.spawn(run(
            HealthMonitor::new(config),
            inputs,
            command_rx,
            state_tx,
            events.clone(),
        ));
        Self {
            commands,
            state,
            events,
            task,
        }
    }

    pub fn state(&self) -> HealthState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<HealthState> {
        self.state.clone()
    }

    /// Health transitions (`BecameHealthy`, `FallbackTriggered`).
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.events.subscribe()
    }

    /// Leave fallback, return to the composited route and re-arm.
    pub fn reinitialize(&self) {
        if self.commands.send(WatchdogCommand::Reinitialize).is_err() {
            tracing::warn!("watchdog is not running; reinitialize ignored");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    mut monitor: HealthMonitor,
    inputs: WatchdogInputs,
    mut commands: mpsc::UnboundedReceiver<WatchdogCommand>,
    state_tx: watch::Sender<HealthState>,
    events: broadcast::Sender<HealthEvent>,
) {
    let mut ticker = tokio::time::interval(monitor.config().poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut faults = inputs.faults.subscribe();
    // Set while a lost context awaits its restore.
    let mut restore_deadline: Option<Instant> = None;

    loop {
        let polling = matches!(monitor.state(), HealthState::Idle | HealthState::Watching { .. });
        let restore_timer = tokio::time::sleep_until(restore_deadline.unwrap_or_else(Instant::now));
        let event = tokio::select! {
            _ = ticker.tick(), if polling => poll_once(&mut monitor, &inputs),
            _ = restore_timer, if restore_deadline.is_some() => {
                restore_deadline = None;
                tracing::error!(
                    "context not restored within {} ms",
                    monitor.config().timeout_ms
                );
                monitor.report_fault(FallbackReason::ContextLost)
            }
            fault = faults.recv() => match fault {
                Ok(EngineFault::RenderStalled { consecutive_failures }) => {
                    tracing::error!("render stalled after {consecutive_failures} failures");
                    monitor.report_fault(FallbackReason::Fault)
                }
                Ok(EngineFault::ContextLost { backend }) => {
                    if restore_deadline.is_none() && !monitor.is_fallback() {
                        tracing::warn!("{backend} context lost; awaiting restore");
                        restore_deadline = Some(Instant::now() + monitor.config().timeout());
                    }
                    None
                }
                Ok(EngineFault::ContextRestored { .. }) => {
                    restore_deadline = None;
                    None
                }
                Ok(_) => None,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("watchdog missed {n} faults");
                    None
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            command = commands.recv() => match command {
                Some(WatchdogCommand::Reinitialize) => {
                    tracing::info!("reinitializing compositor output");
                    monitor.reinitialize();
                    restore_deadline = None;
                    inputs.stats.publish(EngineStats::default());
                    inputs.control.route.set(OutputRoute::Composited);
                    inputs.control.request_restore();
                    ticker.reset();
                    None
                }
                None => break,
            },
        };

        if let Some(event) = event {
            if let HealthEvent::FallbackTriggered(reason) = event {
                tracing::warn!(?reason, "showing raw video");
                inputs.control.route.set(OutputRoute::RawPassthrough);
            }
            let _ = events.send(event);
        }
        state_tx.send_replace(monitor.state());
    }
    tracing::debug!("watchdog exiting");
}

fn poll_once(monitor: &mut HealthMonitor, inputs: &WatchdogInputs) -> Option<HealthEvent> {
    let now = Instant::now().into_std();
    let (source_width, source_height) = inputs.source.dimensions();
    if monitor.state() == HealthState::Idle {
        if source_width == 0 || source_height == 0 {
            return None;
        }
        monitor.arm(now);
    }
    monitor.poll(
        now,
        LivenessSignals {
            source_width,
            source_height,
            fps: inputs.stats.get().fps,
        },
    )
}
