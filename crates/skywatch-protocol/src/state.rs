//! Session lifecycle state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The lifecycle state of a flight session.
///
/// ```text
///   live ────(timeout | shutdown)───→ local
///     ↕                                 ↑
///   waiting ─(timeout | shutdown)───────┘
/// ```
///
/// - **live**: the drone is being actively and recently detected.
/// - **waiting**: the session is open but the feed hasn't confirmed the
///   drone recently.
/// - **local**: archived. Terminal for this engine. A drone seen again
///   after its session went `local` gets a brand-new session.
///
/// On the wire the states are the lowercase strings `"live"`,
/// `"waiting"`, and `"local"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Live,
    Waiting,
    Local,
}

impl SessionState {
    /// `true` for `live` and `waiting`: the session can still absorb
    /// detections and is a candidate for the archiving sweep.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Live | Self::Waiting)
    }

    /// `true` once the session is archived.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Local)
    }

    /// Returns `true` if moving from `self` to `target` is allowed.
    ///
    /// Active states may move to any state (including themselves, which
    /// is how repeated detections refresh a session). Nothing leaves
    /// `local`; re-entering `local` is also rejected so callers notice
    /// double archiving.
    pub fn can_transition_to(self, target: Self) -> bool {
        match (self, target) {
            (Self::Local, _) => false,
            (Self::Live | Self::Waiting, _) => true,
        }
    }

    /// Checked transition. Returns the new state or
    /// [`ProtocolError::IllegalTransition`].
    pub fn transition(self, target: Self) -> Result<Self, ProtocolError> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(ProtocolError::IllegalTransition {
                from: self,
                to: target,
            })
        }
    }

    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Waiting => "waiting",
            Self::Local => "local",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Live
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "live" => Ok(Self::Live),
            "waiting" => Ok(Self::Waiting),
            "local" => Ok(Self::Local),
            other => Err(ProtocolError::InvalidRecord(format!(
                "unknown session state {other:?}"
            ))),
        }
    }
}
