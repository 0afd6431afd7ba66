//! Drowsiness state machine
//!
//! The transition logic is a pure function over `SessionState`; the
//! `DrowsinessMachine` owns one session and delivers the notifications the
//! transition asks for.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::DmsConfig;
use crate::notify::{StateBus, SubscriptionId};

/// Monitoring state of the subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrowsinessState {
    /// No face since the last reset, or the face was just lost
    #[default]
    Initial,
    /// Face visible, eyes open
    FaceDetected,
    /// Eyes closed, closure interval being timed
    EyesClosedDetected,
    /// Sustained closure, warning active
    WarnUser,
    /// Too many warnings; holds for the rest of the session
    SafeMode,
}

impl DrowsinessState {
    pub const ALL: [DrowsinessState; 5] = [
        DrowsinessState::Initial,
        DrowsinessState::FaceDetected,
        DrowsinessState::EyesClosedDetected,
        DrowsinessState::WarnUser,
        DrowsinessState::SafeMode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DrowsinessState::Initial => "INITIAL",
            DrowsinessState::FaceDetected => "FACE_DETECTED",
            DrowsinessState::EyesClosedDetected => "EYES_CLOSED_DETECTED",
            DrowsinessState::WarnUser => "WARN_USER",
            DrowsinessState::SafeMode => "SAFE_MODE",
        }
    }
}

impl fmt::Display for DrowsinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-frame input to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameInput {
    /// No face, or landmark fitting failed
    FaceLost,
    /// Face with a complete landmark set
    FaceFound { eyes_closed: bool },
}

/// Everything the state machine remembers between frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub state: DrowsinessState,
    /// Start of the interval being timed (closure or warning), in ms
    pub timer_start_ms: Option<u64>,
    /// Warnings fired this session
    pub warnings: u32,
}

impl SessionState {
    /// Assign `state` and queue its notification.
    ///
    /// Queues even when `state` equals the current state.
    fn assign(&mut self, state: DrowsinessState, notifications: &mut Vec<DrowsinessState>) {
        self.state = state;
        notifications.push(state);
    }
}

/// Result of one transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub previous: DrowsinessState,
    pub session: SessionState,
    /// States assigned during this step, in order
    pub notifications: Vec<DrowsinessState>,
}

impl Transition {
    pub fn state(&self) -> DrowsinessState {
        self.session.state
    }

    pub fn changed(&self) -> bool {
        self.previous != self.session.state
    }
}

/// Time between `start_ms` and `now_ms`.
///
/// Absolute difference: a clock that steps backwards still counts as elapsed
/// time instead of failing.
pub fn elapsed_ms(start_ms: u64, now_ms: u64) -> u64 {
    start_ms.abs_diff(now_ms)
}

/// True when the interval that started at `start_ms` has run longer than
/// `limit_ms`. An absent start counts as long expired.
fn interval_expired(start_ms: Option<u64>, now_ms: u64, limit_ms: u64) -> bool {
    match start_ms {
        Some(start) => elapsed_ms(start, now_ms) > limit_ms,
        None => true,
    }
}

/// Advance `session` by one frame
pub fn transition(
    session: SessionState,
    input: FrameInput,
    now_ms: u64,
    config: &DmsConfig,
) -> Transition {
    use DrowsinessState::*;

    let mut next = session;
    let mut notifications = Vec::new();

    match input {
        FrameInput::FaceLost => {
            if matches!(session.state, FaceDetected | EyesClosedDetected) {
                next.assign(Initial, &mut notifications);
            }
            next.timer_start_ms = None;
        }
        FrameInput::FaceFound { eyes_closed } => match session.state {
            Initial => next.assign(FaceDetected, &mut notifications),

            FaceDetected => {
                if eyes_closed {
                    next.timer_start_ms = Some(now_ms);
                    next.assign(EyesClosedDetected, &mut notifications);
                }
            }

            EyesClosedDetected => {
                if !eyes_closed {
                    next.timer_start_ms = None;
                    next.assign(FaceDetected, &mut notifications);
                } else if interval_expired(
                    session.timer_start_ms,
                    now_ms,
                    config.eyes_closed_threshold_ms,
                ) {
                    next.timer_start_ms = Some(now_ms);
                    next.warnings += 1;
                    next.assign(WarnUser, &mut notifications);
                }
            }

            WarnUser => {
                if session.warnings >= config.warnings_to_safe_mode {
                    next.assign(SafeMode, &mut notifications);
                } else if interval_expired(
                    session.timer_start_ms,
                    now_ms,
                    config.warning_cooldown_ms,
                ) {
                    next.assign(FaceDetected, &mut notifications);
                    next.timer_start_ms = None;
                }
            }

            // no exit: safe_mode_duration_ms is reserved
            SafeMode => {}
        },
    }

    Transition {
        previous: session.state,
        session: next,
        notifications,
    }
}

/// One monitoring session: state, timer, warning counter and subscribers.
///
/// `process` takes `&mut self`; frames must be fed one at a time, in order.
#[derive(Debug)]
pub struct DrowsinessMachine {
    config: DmsConfig,
    session: SessionState,
    bus: StateBus,
}

impl DrowsinessMachine {
    pub fn new(config: DmsConfig) -> Self {
        Self {
            config,
            session: SessionState::default(),
            bus: StateBus::new(),
        }
    }

    /// Apply one frame and notify subscribers before returning
    pub fn process(&mut self, input: FrameInput, now_ms: u64) -> Transition {
        let step = transition(self.session, input, now_ms, &self.config);
        self.session = step.session;

        if step.changed() {
            debug!(
                "State {} -> {} (warnings={}, timer={:?})",
                step.previous, step.session.state, step.session.warnings, step.session.timer_start_ms
            );
        }

        for &state in &step.notifications {
            self.bus.publish(state);
        }
        step
    }

    pub fn subscribe<F>(&mut self, state: DrowsinessState, callback: F) -> SubscriptionId
    where
        F: FnMut(DrowsinessState) + Send + 'static,
    {
        self.bus.subscribe(state, callback)
    }

    pub fn subscribe_all<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(DrowsinessState) + Send + 'static,
    {
        self.bus.subscribe_all(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn state(&self) -> DrowsinessState {
        self.session.state
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn warnings(&self) -> u32 {
        self.session.warnings
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }

    /// Start a new session; subscribers are kept
    pub fn reset(&mut self) {
        self.session = SessionState::default();
    }
}
