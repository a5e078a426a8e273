//! Reconnection policy.
//!
//! A pure state machine: every input (sink event, classified fault, elapsed
//! timer) updates [`ReconnectState`] and yields the [`Effect`]s the controller
//! must carry out. The policy never touches a sink, loader or timer host, so it
//! can be exercised without any of them.
//!
//! Live streams retry forever with a fixed delay; a broadcast is expected to
//! come back. Segmented streams first ask the loader to resume and only rebuild
//! the source after a fatal loader fault or a repeated media fault.

use std::time::Duration;

use serde::Serialize;

use crate::config::ReconnectConfig;
use crate::platform::Capabilities;
use crate::playback::StreamMode;
use crate::sink::SinkEvent;
use crate::source::Fault;
use crate::timer::{TimerKind, TimerToken};

/// Side effect requested by the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Schedule { token: TimerToken, delay: Duration },
    Cancel(TimerToken),
    /// Surface the interruption as buffering.
    MarkBuffering,
    /// Rebuild the source from the current endpoint and play it.
    Reconnect,
    /// Ask the segment loader to continue fetching.
    ResumeLoader,
    /// Ask the segment loader to recover from a media fault in place.
    RecoverMedia,
    /// Re-issue `play()` on the sink.
    ReplaySink,
}

/// What the policy needs to know about the controller when deciding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyContext {
    pub mode: StreamMode,
    pub loader_active: bool,
    pub sink_paused: bool,
    /// The listener asked to play and has not stopped since.
    pub intends_to_play: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconnectState {
    /// Retries fired since the stream last made progress. Observability only.
    pub attempts: u32,
    pub auto_reconnect: bool,
    pub reconnect_timer: Option<TimerToken>,
    pub recovery_timer: Option<TimerToken>,
    /// Progress was observed since the pending retry was scheduled.
    pub healthy: bool,
    pub media_recoveries: u32,
}

#[derive(Debug)]
pub struct ReconnectionPolicy {
    config: ReconnectConfig,
    ios: bool,
    state: ReconnectState,
    next_timer_id: u64,
}

impl ReconnectionPolicy {
    pub fn new(config: ReconnectConfig, capabilities: Capabilities) -> Self {
        Self {
            config,
            ios: capabilities.ios,
            state: ReconnectState::default(),
            next_timer_id: 0,
        }
    }

    pub fn state(&self) -> &ReconnectState {
        &self.state
    }

    pub fn attempts(&self) -> u32 {
        self.state.attempts
    }

    pub fn auto_reconnect(&self) -> bool {
        self.state.auto_reconnect
    }

    pub fn pending_reconnect(&self) -> Option<TimerToken> {
        self.state.reconnect_timer
    }

    /// Arms auto-reconnect for a listener-initiated play.
    pub fn enable(&mut self) -> Vec<Effect> {
        let effects = self.cancel_all();
        self.state.auto_reconnect = true;
        self.state.healthy = true;
        self.state.media_recoveries = 0;
        effects
    }

    /// Disarms auto-reconnect and cancels every pending timer. Must run before
    /// the sink is paused, or the resulting events could schedule a retry.
    pub fn disable(&mut self) -> Vec<Effect> {
        self.state.auto_reconnect = false;
        self.cancel_all()
    }

    pub fn on_sink_event(&mut self, event: &SinkEvent, ctx: PolicyContext) -> Vec<Effect> {
        match event {
            SinkEvent::Playing => {
                self.mark_progress();
                let mut effects = Vec::new();
                self.cancel_reconnect(&mut effects);
                self.cancel_recovery(&mut effects);
                effects
            }
            SinkEvent::TimeUpdate => {
                self.mark_progress();
                Vec::new()
            }
            SinkEvent::CanPlay => {
                self.state.healthy = true;
                Vec::new()
            }
            SinkEvent::Pause => {
                if !self.state.auto_reconnect {
                    return self.cancel_all();
                }
                if self.ios && ctx.mode == StreamMode::Buffered && ctx.intends_to_play {
                    return self.schedule_recovery();
                }
                Vec::new()
            }
            SinkEvent::Suspend => {
                if ctx.mode == StreamMode::Live && ctx.sink_paused && ctx.intends_to_play {
                    return self.schedule_reconnect(ctx.mode);
                }
                Vec::new()
            }
            SinkEvent::Stalled => {
                if ctx.mode == StreamMode::Buffered && ctx.loader_active {
                    if self.state.auto_reconnect {
                        return vec![Effect::MarkBuffering, Effect::ResumeLoader];
                    }
                    return Vec::new();
                }
                self.schedule_reconnect(ctx.mode)
            }
            SinkEvent::Ended | SinkEvent::Error(_) => self.schedule_reconnect(ctx.mode),
            SinkEvent::LoadStart | SinkEvent::Waiting => Vec::new(),
        }
    }

    pub fn on_fault(&mut self, fault: Fault, ctx: PolicyContext) -> Vec<Effect> {
        match fault {
            Fault::Aborted => {
                tracing::trace!("ignoring aborted request");
                Vec::new()
            }
            Fault::AutoplayRejected => self.disable(),
            _ if !self.state.auto_reconnect => Vec::new(),
            Fault::TransientNetwork if ctx.loader_active => {
                vec![Effect::MarkBuffering, Effect::ResumeLoader]
            }
            Fault::MediaDecode if ctx.loader_active && self.state.media_recoveries == 0 => {
                self.state.media_recoveries += 1;
                vec![Effect::RecoverMedia]
            }
            Fault::TransientNetwork | Fault::MediaDecode | Fault::FatalLoader => {
                self.schedule_reconnect(ctx.mode)
            }
        }
    }

    pub fn on_timer(&mut self, token: TimerToken, ctx: PolicyContext) -> Vec<Effect> {
        if self.state.reconnect_timer == Some(token) {
            self.state.reconnect_timer = None;
            if !self.state.auto_reconnect {
                self.state.attempts = 0;
                return Vec::new();
            }
            if self.state.healthy {
                tracing::debug!("stream recovered before retry, skipping reconnect");
                return Vec::new();
            }
            self.state.attempts += 1;
            tracing::debug!(attempts = self.state.attempts, "reconnecting stream");
            return vec![Effect::Reconnect];
        }

        if self.state.recovery_timer == Some(token) {
            self.state.recovery_timer = None;
            if self.state.auto_reconnect && ctx.sink_paused && ctx.intends_to_play {
                tracing::debug!("sink paused without listener intent, resuming");
                return vec![Effect::ReplaySink];
            }
            return Vec::new();
        }

        tracing::trace!(?token, "ignoring stale timer");
        Vec::new()
    }

    fn mark_progress(&mut self) {
        self.state.attempts = 0;
        self.state.healthy = true;
        self.state.media_recoveries = 0;
    }

    fn schedule_reconnect(&mut self, mode: StreamMode) -> Vec<Effect> {
        if !self.state.auto_reconnect {
            self.state.attempts = 0;
            return Vec::new();
        }
        if self.state.reconnect_timer.is_some() {
            // A fresh fault re-arms the pending retry even after progress.
            self.state.healthy = false;
            return vec![Effect::MarkBuffering];
        }
        let token = self.next_token(TimerKind::Reconnect);
        let delay = match mode {
            StreamMode::Live => self.config.live_retry_delay_ms,
            StreamMode::Buffered => self.config.buffered_retry_delay_ms,
        };
        self.state.reconnect_timer = Some(token);
        self.state.healthy = false;
        vec![
            Effect::MarkBuffering,
            Effect::Schedule {
                token,
                delay: Duration::from_millis(delay),
            },
        ]
    }

    fn schedule_recovery(&mut self) -> Vec<Effect> {
        if self.state.recovery_timer.is_some() {
            return Vec::new();
        }
        let token = self.next_token(TimerKind::BufferRecovery);
        self.state.recovery_timer = Some(token);
        vec![Effect::Schedule {
            token,
            delay: Duration::from_millis(self.config.buffer_recovery_delay_ms),
        }]
    }

    fn cancel_all(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        self.cancel_reconnect(&mut effects);
        self.cancel_recovery(&mut effects);
        self.state.attempts = 0;
        effects
    }

    fn cancel_reconnect(&mut self, effects: &mut Vec<Effect>) {
        if let Some(token) = self.state.reconnect_timer.take() {
            effects.push(Effect::Cancel(token));
        }
    }

    fn cancel_recovery(&mut self, effects: &mut Vec<Effect>) {
        if let Some(token) = self.state.recovery_timer.take() {
            effects.push(Effect::Cancel(token));
        }
    }

    fn next_token(&mut self, kind: TimerKind) -> TimerToken {
        self.next_timer_id += 1;
        TimerToken {
            kind,
            id: self.next_timer_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MediaErrorCode, SinkFault};

    fn live() -> PolicyContext {
        PolicyContext {
            mode: StreamMode::Live,
            loader_active: false,
            sink_paused: false,
            intends_to_play: true,
        }
    }

    fn segmented() -> PolicyContext {
        PolicyContext {
            mode: StreamMode::Buffered,
            loader_active: true,
            ..live()
        }
    }

    fn armed(capabilities: Capabilities) -> ReconnectionPolicy {
        let mut policy = ReconnectionPolicy::new(ReconnectConfig::default(), capabilities);
        policy.enable();
        policy
    }

    fn scheduled(effects: &[Effect]) -> Option<TimerToken> {
        effects.iter().find_map(|effect| match effect {
            Effect::Schedule { token, .. } => Some(*token),
            _ => None,
        })
    }

    fn network_error() -> SinkEvent {
        SinkEvent::Error(SinkFault::new(MediaErrorCode::Network, "reset"))
    }

    #[test]
    fn live_stall_schedules_one_retry() {
        let mut policy = armed(Capabilities::headless());
        let effects = policy.on_sink_event(&SinkEvent::Stalled, live());
        let token = scheduled(&effects).expect("retry scheduled");
        assert!(effects.contains(&Effect::MarkBuffering));
        assert!(effects.contains(&Effect::Schedule {
            token,
            delay: Duration::from_millis(1_000)
        }));

        for event in [SinkEvent::Stalled, network_error(), SinkEvent::Ended] {
            assert!(scheduled(&policy.on_sink_event(&event, live())).is_none());
        }
        assert_eq!(policy.pending_reconnect(), Some(token));
    }

    #[test]
    fn disabled_policy_never_schedules() {
        let mut policy = ReconnectionPolicy::new(ReconnectConfig::default(), Capabilities::headless());
        assert!(policy.on_sink_event(&SinkEvent::Stalled, live()).is_empty());
        assert!(policy.on_sink_event(&network_error(), live()).is_empty());
        assert!(policy.pending_reconnect().is_none());
    }

    #[test]
    fn fire_counts_attempts_without_limit() {
        let mut policy = armed(Capabilities::headless());
        for expected in 1..=10 {
            let token = scheduled(&policy.on_sink_event(&network_error(), live())).unwrap();
            assert_eq!(policy.on_timer(token, live()), vec![Effect::Reconnect]);
            assert_eq!(policy.attempts(), expected);
        }
    }

    #[test]
    fn progress_resets_attempts_and_defuses_the_pending_retry() {
        let mut policy = armed(Capabilities::headless());
        let first = scheduled(&policy.on_sink_event(&SinkEvent::Ended, live())).unwrap();
        policy.on_timer(first, live());
        assert_eq!(policy.attempts(), 1);

        let second = scheduled(&policy.on_sink_event(&SinkEvent::Stalled, live())).unwrap();
        policy.on_sink_event(&SinkEvent::TimeUpdate, live());
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.pending_reconnect(), Some(second));

        assert!(policy.on_timer(second, live()).is_empty());
        assert_eq!(policy.attempts(), 0);
        assert!(policy.pending_reconnect().is_none());
    }

    #[test]
    fn fault_after_progress_rearms_the_pending_retry() {
        let mut policy = armed(Capabilities::headless());
        let token = scheduled(&policy.on_sink_event(&SinkEvent::Stalled, live())).unwrap();
        policy.on_sink_event(&SinkEvent::TimeUpdate, live());

        let again = policy.on_sink_event(&SinkEvent::Stalled, live());
        assert_eq!(again, vec![Effect::MarkBuffering]);
        assert_eq!(policy.pending_reconnect(), Some(token));

        assert_eq!(policy.on_timer(token, live()), vec![Effect::Reconnect]);
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn disable_cancels_pending_timers() {
        let mut policy = armed(Capabilities::headless());
        let token = scheduled(&policy.on_sink_event(&SinkEvent::Stalled, live())).unwrap();

        assert_eq!(policy.disable(), vec![Effect::Cancel(token)]);
        assert!(!policy.auto_reconnect());
        assert!(policy.on_timer(token, live()).is_empty());
    }

    #[test]
    fn playing_cancels_the_retry() {
        let mut policy = armed(Capabilities::headless());
        let token = scheduled(&policy.on_sink_event(&SinkEvent::Stalled, live())).unwrap();
        assert_eq!(
            policy.on_sink_event(&SinkEvent::Playing, live()),
            vec![Effect::Cancel(token)]
        );
    }

    #[test]
    fn segmented_stall_resumes_the_loader() {
        let mut policy = armed(Capabilities::headless());
        let effects = policy.on_sink_event(&SinkEvent::Stalled, segmented());
        assert_eq!(effects, vec![Effect::MarkBuffering, Effect::ResumeLoader]);
        assert!(policy.pending_reconnect().is_none());
    }

    #[test]
    fn media_faults_recover_once_then_rebuild() {
        let mut policy = armed(Capabilities::headless());
        assert_eq!(
            policy.on_fault(Fault::MediaDecode, segmented()),
            vec![Effect::RecoverMedia]
        );
        let token = scheduled(&policy.on_fault(Fault::MediaDecode, segmented())).unwrap();
        assert_eq!(policy.on_timer(token, segmented()), vec![Effect::Reconnect]);
    }

    #[test]
    fn fatal_loader_fault_schedules_rebuild() {
        let mut policy = armed(Capabilities::headless());
        let effects = policy.on_fault(Fault::FatalLoader, segmented());
        assert!(scheduled(&effects).is_some());
    }

    #[test]
    fn autoplay_rejection_disarms() {
        let mut policy = armed(Capabilities::headless());
        policy.on_fault(Fault::AutoplayRejected, live());
        assert!(!policy.auto_reconnect());
        assert!(policy.on_fault(Fault::TransientNetwork, live()).is_empty());
        assert!(policy.on_fault(Fault::Aborted, live()).is_empty());
    }

    #[test]
    fn ios_unexpected_pause_replays_segmented_playback() {
        let caps = Capabilities {
            ios: true,
            ..Capabilities::headless()
        };
        let mut policy = armed(caps);
        let token = scheduled(&policy.on_sink_event(&SinkEvent::Pause, segmented())).unwrap();
        assert_eq!(token.kind, TimerKind::BufferRecovery);

        let paused = PolicyContext {
            sink_paused: true,
            ..segmented()
        };
        assert_eq!(policy.on_timer(token, paused), vec![Effect::ReplaySink]);
    }

    #[test]
    fn pause_elsewhere_does_not_arm_recovery() {
        let mut policy = armed(Capabilities::headless());
        assert!(policy.on_sink_event(&SinkEvent::Pause, segmented()).is_empty());
    }

    #[test]
    fn live_suspend_while_paused_reconnects() {
        let mut policy = armed(Capabilities::headless());
        let running = policy.on_sink_event(&SinkEvent::Suspend, live());
        assert!(running.is_empty());

        let paused = PolicyContext {
            sink_paused: true,
            ..live()
        };
        assert!(scheduled(&policy.on_sink_event(&SinkEvent::Suspend, paused)).is_some());
    }
}
