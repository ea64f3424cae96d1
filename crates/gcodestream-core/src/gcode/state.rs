//! Modal state tracking for units and distance mode

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::data::Units;

/// Modal context relevant to jogging
///
/// Tracks the units group (G20/G21) and distance mode group (G90/G91).
/// Updated by observing sent commands and by explicit overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcodeState {
    /// Units mode - Group 6 (G20=inches, G21=millimeters)
    pub units_mode: u8,

    /// Distance mode - Group 3 (G90=absolute, G91=incremental)
    pub distance_mode: u8,
}

impl Default for GcodeState {
    fn default() -> Self {
        Self {
            units_mode: 21,    // G21 (millimeters)
            distance_mode: 90, // G90 (absolute)
        }
    }
}

impl GcodeState {
    /// Create a new G-Code state with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set units mode (G20 for inches, G21 for mm)
    pub fn set_units_mode(&mut self, mode: u8) -> Result<(), String> {
        match mode {
            20 | 21 => {
                self.units_mode = mode;
                Ok(())
            }
            _ => Err(format!("Invalid units mode: {}", mode)),
        }
    }

    /// Set distance mode (G90, G91)
    pub fn set_distance_mode(&mut self, mode: u8) -> Result<(), String> {
        match mode {
            90 | 91 => {
                self.distance_mode = mode;
                Ok(())
            }
            _ => Err(format!("Invalid distance mode: {}", mode)),
        }
    }

    /// Set units from a [`Units`] value; `Unknown` is ignored
    pub fn set_units(&mut self, units: Units) {
        match units {
            Units::MM => self.units_mode = 21,
            Units::INCH => self.units_mode = 20,
            Units::Unknown => {}
        }
    }

    /// Active units
    pub fn units(&self) -> Units {
        match self.units_mode {
            20 => Units::INCH,
            21 => Units::MM,
            _ => Units::Unknown,
        }
    }

    /// Check if absolute positioning (G90) is active
    pub fn is_absolute(&self) -> bool {
        self.distance_mode == 90
    }

    /// G-code word for the active units
    pub fn units_code(&self) -> &'static str {
        if self.units_mode == 20 {
            "G20"
        } else {
            "G21"
        }
    }

    /// Fold the modal words of a command line into this state
    ///
    /// Comments are ignored. Returns `true` if anything changed.
    pub fn apply(&mut self, line: &str) -> bool {
        let before = *self;
        let cleaned = remove_comments(line);
        for code in g_words(&cleaned) {
            match code.as_str() {
                "20" => self.units_mode = 20,
                "21" => self.units_mode = 21,
                "90" => self.distance_mode = 90,
                "91" => self.distance_mode = 91,
                _ => {}
            }
        }
        before != *self
    }
}

/// Remove comments from a G-Code line
fn remove_comments(line: &str) -> String {
    static COMMENT_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    match COMMENT_REGEX.get_or_init(|| Regex::new(r"\([^)]*\)|;.*").ok()) {
        Some(regex) => regex.replace_all(line, "").into_owned(),
        None => line.to_string(),
    }
}

/// Numeric part of every G word, leading zeros stripped (`G091` -> `91`)
fn g_words(line: &str) -> Vec<String> {
    static G_WORD_REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(regex) = G_WORD_REGEX.get_or_init(|| Regex::new(r"(?i)G\s*0*(\d+(?:\.\d+)?)").ok())
    else {
        return Vec::new();
    };
    regex
        .captures_iter(line)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect()
}
