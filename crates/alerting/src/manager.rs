//! Status board fed by drowsiness state notifications

use dms::{DrowsinessMonitor, DrowsinessState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Alert configuration: the label shown for each notified state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Face visible, eyes open (also the initial label)
    pub ok_message: String,
    /// Eyes closed, not yet warned
    pub eyes_closed_message: String,
    /// Warning active
    pub warning_message: String,
    /// Safe mode engaged
    pub safe_mode_message: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            ok_message: "OK!".to_string(),
            eyes_closed_message: "Eyes closed!".to_string(),
            warning_message: "Alarm!".to_string(),
            safe_mode_message: "Automatic mode ON...".to_string(),
        }
    }
}

impl AlertConfig {
    /// Label for `state`; Initial has none and keeps the previous label
    pub fn message_for(&self, state: DrowsinessState) -> Option<&str> {
        match state {
            DrowsinessState::Initial => None,
            DrowsinessState::FaceDetected => Some(&self.ok_message),
            DrowsinessState::EyesClosedDetected => Some(&self.eyes_closed_message),
            DrowsinessState::WarnUser => Some(&self.warning_message),
            DrowsinessState::SafeMode => Some(&self.safe_mode_message),
        }
    }
}

/// How urgently a state should be presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Normal,
    Caution,
    Critical,
}

impl Severity {
    /// Display severity of a state. Safe mode means the vehicle has taken
    /// over, so it is shown as normal.
    pub fn for_state(state: DrowsinessState) -> Self {
        match state {
            DrowsinessState::WarnUser => Severity::Critical,
            DrowsinessState::EyesClosedDetected => Severity::Caution,
            _ => Severity::Normal,
        }
    }

    /// Banner colour (RGB)
    pub fn rgb(&self) -> [u8; 3] {
        match self {
            Severity::Normal => [0, 255, 0],
            Severity::Caution => [244, 158, 66],
            Severity::Critical => [255, 0, 0],
        }
    }
}

/// Notification history of one state
#[derive(Debug, Clone, Default)]
pub struct AlertState {
    /// Number of notifications
    pub fire_count: usize,
    /// Whether the alert was acknowledged
    pub acknowledged: bool,
}

/// Current status label plus per-state notification history
pub struct StatusBoard {
    config: AlertConfig,
    message: String,
    states: HashMap<DrowsinessState, AlertState>,
}

impl StatusBoard {
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating status board with config: {:?}", config);
        Self {
            message: config.ok_message.clone(),
            config,
            states: HashMap::new(),
        }
    }

    /// Subscribe a shared board to every labelled state of `monitor`
    pub fn attach(board: &Arc<Mutex<StatusBoard>>, monitor: &mut DrowsinessMonitor) {
        for state in DrowsinessState::ALL {
            let has_label = board
                .lock()
                .map(|b| b.config.message_for(state).is_some())
                .unwrap_or(false);
            if !has_label {
                continue;
            }

            let board = Arc::clone(board);
            monitor.subscribe(state, move |s| match board.lock() {
                Ok(mut board) => board.record(s),
                Err(_) => warn!("Status board lock poisoned, dropping {} notification", s),
            });
        }
    }

    /// Record a notification for `state`.
    ///
    /// Returning to `FaceDetected` means the driver is attentive again and
    /// acknowledges any outstanding warning.
    pub fn record(&mut self, state: DrowsinessState) {
        if let Some(text) = self.config.message_for(state) {
            self.message = text.to_string();
        }

        let entry = self.states.entry(state).or_default();
        entry.fire_count += 1;
        entry.acknowledged = false;

        if Severity::for_state(state) == Severity::Critical {
            warn!("Alert: {} (count: {})", state, entry.fire_count);
        } else {
            debug!("Status: {} -> \"{}\"", state, self.message);
        }

        if state == DrowsinessState::FaceDetected {
            self.acknowledge(DrowsinessState::WarnUser);
        }
    }

    /// Current label
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Number of notifications seen for `state`
    pub fn fire_count(&self, state: DrowsinessState) -> usize {
        self.states.get(&state).map_or(0, |s| s.fire_count)
    }

    /// Acknowledge an alert
    pub fn acknowledge(&mut self, state: DrowsinessState) -> bool {
        if let Some(entry) = self.states.get_mut(&state) {
            if !entry.acknowledged {
                info!("Alert acknowledged: {}", state);
            }
            entry.acknowledged = true;
            true
        } else {
            false
        }
    }

    /// Critical states notified since their last acknowledgement
    pub fn pending(&self) -> Vec<(DrowsinessState, &AlertState)> {
        let mut pending: Vec<_> = self
            .states
            .iter()
            .filter(|(state, entry)| {
                Severity::for_state(**state) == Severity::Critical && !entry.acknowledged
            })
            .map(|(state, entry)| (*state, entry))
            .collect();
        pending.sort_by_key(|(state, _)| *state as u8);
        pending
    }

    /// Clear history and restore the initial label
    pub fn clear(&mut self) {
        self.states.clear();
        self.message = self.config.ok_message.clone();
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
