//! g2core Command Creator
//!
//! Realtime control bytes and the JSON configuration commands sent to g2core.

/// Real-time commands for g2core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RealTimeCommand {
    /// Request status report
    StatusRequest,
    /// Feed hold (pause)
    FeedHold,
    /// Cycle start/resume
    CycleStart,
    /// Kill the running job and flush the planner
    KillJob,
    /// Soft reset
    SoftReset,
}

impl RealTimeCommand {
    /// Get the byte representation for real-time commands
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::StatusRequest => b'?',
            Self::FeedHold => b'!',
            Self::CycleStart => b'~',
            Self::KillJob => 0x04,
            Self::SoftReset => 0x18,
        }
    }
}

/// Clears an alarm
pub const KILL_ALARM_LOCK: &str = "{clear:n}";

/// Homes X, Y and Z
pub const HOMING: &str = "G28.2 X0 Y0 Z0";

/// Dumps persisted settings
pub const VIEW_SETTINGS: &str = "$$";

/// Fields requested in every status report
pub const STATUS_REPORT_FIELDS: [&str; 14] = [
    "posx", "posy", "posz", "mpox", "mpoy", "mpoz", "plan", "vel", "unit", "stat", "dist", "admo",
    "frmo", "coor",
];

/// Create a relaxed-JSON setting command, e.g. `{jv:4}`
pub fn create_setting(key: &str, value: impl std::fmt::Display) -> String {
    format!("{{{}:{}}}", key, value)
}

/// Command selecting the status report field set
pub fn create_status_report_setup() -> String {
    let fields: Vec<String> = STATUS_REPORT_FIELDS
        .iter()
        .map(|field| format!("{}:t", field))
        .collect();
    format!("{{sr:{{{}}}}}", fields.join(", "))
}

/// Configuration sent after the firmware acknowledges the connection
///
/// In order: enable JSON mode, select status report fields, JSON verbosity,
/// queue report verbosity, status report verbosity, settings dump, then
/// enable and reset the feed, traverse and spindle overrides.
pub fn create_init_commands() -> Vec<String> {
    vec![
        create_setting("ej", 1),
        create_status_report_setup(),
        create_setting("jv", 4),
        create_setting("qv", 0),
        create_setting("sv", 1),
        VIEW_SETTINGS.to_string(),
        create_setting("mfoe", 1),
        create_setting("mfo", 1),
        create_setting("mtoe", 1),
        create_setting("mto", 1),
        create_setting("ssoe", 1),
        create_setting("sso", 1),
    ]
}
