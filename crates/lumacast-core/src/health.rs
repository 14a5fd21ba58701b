//! Liveness monitor for the processed output, sans I/O.
//!
//! The caller supplies the clock and the liveness readings; the monitor only
//! decides. Drive it from a timer at [`HealthConfig::poll_interval_ms`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 150,
            timeout_ms: 3000,
        }
    }
}

impl HealthConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Not armed yet.
    Idle,
    /// Armed, waiting for the output to come alive.
    Watching { since: Instant },
    /// Output confirmed; polling stops.
    Healthy,
    /// Raw video is being shown instead.
    Fallback,
}

/// Values sampled from the compositor each poll.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LivenessSignals {
    pub source_width: u32,
    pub source_height: u32,
    pub fps: f32,
}

impl LivenessSignals {
    pub fn is_alive(&self) -> bool {
        self.source_width > 0 && self.source_height > 0 && self.fps > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    Timeout,
    /// Repeated render failures.
    Fault,
    /// The graphics context was lost and not restored in time.
    ContextLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    BecameHealthy,
    FallbackTriggered(FallbackReason),
}

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    config: HealthConfig,
    state: HealthState,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            state: HealthState::Idle,
        }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// True while polls can still change the state.
    pub fn is_watching(&self) -> bool {
        matches!(self.state, HealthState::Watching { .. })
    }

    pub fn is_fallback(&self) -> bool {
        self.state == HealthState::Fallback
    }

    /// Start the timeout once the video source is ready. Ignored unless idle.
    pub fn arm(&mut self, now: Instant) {
        if self.state == HealthState::Idle {
            self.state = HealthState::Watching { since: now };
        }
    }

    /// One liveness check.
    pub fn poll(&mut self, now: Instant, signals: LivenessSignals) -> Option<HealthEvent> {
        let HealthState::Watching { since } = self.state else {
            return None;
        };
        if signals.is_alive() {
            self.state = HealthState::Healthy;
            tracing::info!(
                "output healthy at {}x{} ({:.1} fps)",
                signals.source_width,
                signals.source_height,
                signals.fps
            );
            return Some(HealthEvent::BecameHealthy);
        }
        if now.saturating_duration_since(since) >= self.config.timeout() {
            self.state = HealthState::Fallback;
            tracing::warn!("no processed output after {} ms; falling back", self.config.timeout_ms);
            return Some(HealthEvent::FallbackTriggered(FallbackReason::Timeout));
        }
        None
    }

    /// An unrecoverable compositor error. Falls back at most once.
    pub fn report_fault(&mut self, reason: FallbackReason) -> Option<HealthEvent> {
        if self.state == HealthState::Fallback {
            return None;
        }
        self.state = HealthState::Fallback;
        tracing::warn!(?reason, "compositor fault reported; falling back");
        Some(HealthEvent::FallbackTriggered(reason))
    }

    /// Leave fallback (or any state) and wait for `arm` again.
    pub fn reinitialize(&mut self) {
        self.state = HealthState::Idle;
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEAD: LivenessSignals = LivenessSignals {
        source_width: 0,
        source_height: 0,
        fps: 0.0,
    };
    const ALIVE: LivenessSignals = LivenessSignals {
        source_width: 640,
        source_height: 480,
        fps: 30.0,
    };

    fn run(monitor: &mut HealthMonitor, start: Instant, until_ms: u64, signals: impl Fn(u64) -> LivenessSignals) -> Vec<HealthEvent> {
        let mut events = Vec::new();
        let mut t = 0;
        while t <= until_ms {
            if let Some(e) = monitor.poll(start + Duration::from_millis(t), signals(t)) {
                events.push(e);
            }
            t += monitor.config().poll_interval_ms;
        }
        events
    }

    #[test]
    fn test_fallback_fires_exactly_once_after_timeout() {
        let mut m = HealthMonitor::default();
        let start = Instant::now();
        m.arm(start);
        let events = run(&mut m, start, 10_000, |_| DEAD);
        assert_eq!(events, vec![HealthEvent::FallbackTriggered(FallbackReason::Timeout)]);
        assert!(m.is_fallback());
    }

    #[test]
    fn test_healthy_before_timeout_never_falls_back() {
        let mut m = HealthMonitor::default();
        let start = Instant::now();
        m.arm(start);
        let events = run(&mut m, start, 10_000, |t| if t >= 1500 { ALIVE } else { DEAD });
        assert_eq!(events, vec![HealthEvent::BecameHealthy]);
        assert_eq!(m.state(), HealthState::Healthy);
    }

    #[test]
    fn test_zero_fps_is_not_alive() {
        let mut m = HealthMonitor::default();
        let start = Instant::now();
        m.arm(start);
        let half = LivenessSignals { fps: 0.0, ..ALIVE };
        assert_eq!(m.poll(start, half), None);
        assert!(m.is_watching());
    }

    #[test]
    fn test_idle_monitor_ignores_polls() {
        let mut m = HealthMonitor::default();
        let start = Instant::now();
        assert_eq!(m.poll(start + Duration::from_secs(60), DEAD), None);
        assert_eq!(m.state(), HealthState::Idle);
    }

    #[test]
    fn test_fault_falls_back_once_until_reinitialized() {
        let mut m = HealthMonitor::default();
        m.arm(Instant::now());
        assert_eq!(
            m.report_fault(FallbackReason::Fault),
            Some(HealthEvent::FallbackTriggered(FallbackReason::Fault))
        );
        assert_eq!(m.report_fault(FallbackReason::ContextLost), None);
        assert_eq!(m.poll(Instant::now(), ALIVE), None);

        m.reinitialize();
        assert_eq!(m.state(), HealthState::Idle);
        m.arm(Instant::now());
        assert_eq!(m.poll(Instant::now(), ALIVE), Some(HealthEvent::BecameHealthy));
    }
}
