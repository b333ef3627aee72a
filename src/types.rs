// =============================================================================
// Shared types used across the Silent Observer kernel
// =============================================================================

use serde::{Deserialize, Serialize};

/// Market-data mode reported by the feed adapter's connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MdMode {
    Realtime,
    Delayed,
    Frozen,
    None,
}

impl Default for MdMode {
    fn default() -> Self {
        Self::None
    }
}

impl std::fmt::Display for MdMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Realtime => write!(f, "Realtime"),
            Self::Delayed => write!(f, "Delayed"),
            Self::Frozen => write!(f, "Frozen"),
            Self::None => write!(f, "None"),
        }
    }
}

/// The user's desired trading direction(s). `Flat` is always an admission
/// gate failure (`INTENT_FLAT`); the others only matter to the (out of
/// scope) order-placement layer this kernel never drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    Long,
    Short,
    Both,
    Flat,
}

impl Default for Intent {
    fn default() -> Self {
        Self::Flat
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "Long"),
            Self::Short => write!(f, "Short"),
            Self::Both => write!(f, "Both"),
            Self::Flat => write!(f, "Flat"),
        }
    }
}

/// Coarse session phase derived from the operating/break windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    Operating,
    Break,
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Operating => write!(f, "Operating"),
            Self::Break => write!(f, "Break"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Engine run state machine: `Idle -> Running -> Stopping -> Stopped`.
/// Re-entry (Stopped -> Running) is not permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineRunState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl EngineRunState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// The closed set of gate reason codes, evaluated in this fixed order by
/// [`crate::gates::evaluate`]. The wire representation is the string given
/// by `Display`/`Serialize`, never the discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    ArmOff,
    IntentFlat,
    OutsideOperatingWindow,
    SessionBreak,
    FeedDisconnected,
    MdNotRealtime,
    NoContract,
    StaleData,
    SpreadUnavailable,
    SpreadWide,
    EngineDegraded,
}

impl ReasonCode {
    /// Fixed evaluation order; gates are always checked and reported in
    /// this sequence, never short-circuited.
    pub const ORDER: [ReasonCode; 11] = [
        ReasonCode::ArmOff,
        ReasonCode::IntentFlat,
        ReasonCode::OutsideOperatingWindow,
        ReasonCode::SessionBreak,
        ReasonCode::FeedDisconnected,
        ReasonCode::MdNotRealtime,
        ReasonCode::NoContract,
        ReasonCode::StaleData,
        ReasonCode::SpreadUnavailable,
        ReasonCode::SpreadWide,
        ReasonCode::EngineDegraded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArmOff => "ARM_OFF",
            Self::IntentFlat => "INTENT_FLAT",
            Self::OutsideOperatingWindow => "OUTSIDE_OPERATING_WINDOW",
            Self::SessionBreak => "SESSION_BREAK",
            Self::FeedDisconnected => "FEED_DISCONNECTED",
            Self::MdNotRealtime => "MD_NOT_REALTIME",
            Self::NoContract => "NO_CONTRACT",
            Self::StaleData => "STALE_DATA",
            Self::SpreadUnavailable => "SPREAD_UNAVAILABLE",
            Self::SpreadWide => "SPREAD_WIDE",
            Self::EngineDegraded => "ENGINE_DEGRADED",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_code_order_is_stable() {
        assert_eq!(ReasonCode::ORDER[0], ReasonCode::ArmOff);
        assert_eq!(ReasonCode::ORDER[7], ReasonCode::StaleData);
        assert_eq!(ReasonCode::ORDER[10], ReasonCode::EngineDegraded);
    }

    #[test]
    fn reason_code_wire_strings_are_stable() {
        assert_eq!(ReasonCode::StaleData.as_str(), "STALE_DATA");
        assert_eq!(ReasonCode::SpreadWide.to_string(), "SPREAD_WIDE");
    }

    #[test]
    fn intent_and_md_mode_defaults() {
        assert_eq!(Intent::default(), Intent::Flat);
        assert_eq!(MdMode::default(), MdMode::None);
    }
}
