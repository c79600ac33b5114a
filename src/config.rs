//! TOML configuration for the importer and the report writer.
//!
//! Every field has a default matching the behaviour expected for ANAREDE
//! cases, so an empty file (or no file at all) is a valid configuration.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigError, PwfError};
use crate::units::SystemBase;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PwfConfig {
    #[serde(default)]
    pub import: ImportConfig,
    #[serde(default)]
    pub report: ReportFormat,
}

/// Parsing bases and the empirical thresholds used by the record builders.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// System power base (MVA).
    pub base_mva: f64,
    /// Voltage base applied to every bus (kV).
    pub base_kv: f64,
    /// System frequency (Hz).
    pub frequency_hz: f64,

    /// Keywords opening a section whose records are skipped.
    pub ignored_sections: Vec<String>,
    /// Lines shorter than this many characters carry no record.
    pub min_record_width: usize,
    /// A raw line starting with this character is a comment.
    pub comment_marker: char,
    /// Trimmed prefix of the section terminator row.
    pub sentinel: String,

    /// Raw voltages at or above this value are taken as kV-style magnitudes.
    pub voltage_rescale_threshold: f64,
    /// Factor applied to rescaled voltages.
    pub voltage_rescale_factor: f64,
    /// Voltages below this (after rescaling) are replaced by `default_voltage_pu`.
    pub min_plausible_voltage_pu: f64,
    pub default_voltage_pu: f64,

    /// Tap values this close to 0.0 or 1.0 mean "no off-nominal tap".
    pub tap_deadband: f64,
    /// Tap-column values at or above this are flow limits (MVA), not taps.
    pub tap_limit_threshold: f64,
    /// Relative band around a threshold inside which a record is flagged for review.
    pub review_margin: f64,
    /// Thermal limit for lines that carry none (kA).
    pub default_thermal_limit_ka: f64,

    /// Bus that receives a synthesized slack when the case declares none.
    pub fallback_slack_bus: Option<usize>,
    /// Use the first bus in file order when `fallback_slack_bus` is unset or absent.
    pub fallback_to_first_bus: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            base_mva: 100.0,
            base_kv: 138.0,
            frequency_hz: 60.0,
            ignored_sections: ["TITU", "DCTE", "DOPC", "DGBT", "DGLT", "DARE"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_record_width: 10,
            comment_marker: '(',
            sentinel: "99999".to_string(),
            voltage_rescale_threshold: 2.0,
            voltage_rescale_factor: 0.001,
            min_plausible_voltage_pu: 0.1,
            default_voltage_pu: 1.0,
            tap_deadband: 0.001,
            tap_limit_threshold: 2.0,
            review_margin: 0.05,
            default_thermal_limit_ka: 10.0,
            fallback_slack_bus: None,
            fallback_to_first_bus: true,
        }
    }
}

impl ImportConfig {
    pub fn system_base(&self) -> Result<SystemBase, ConfigError> {
        SystemBase::new(self.base_mva, self.base_kv, self.frequency_hz).map_err(|e| {
            ConfigError::new(format!("import.{}", e.field), e.message)
        })
    }

    /// True when `value` lies within `review_margin` (relative) of `threshold`.
    pub fn near_threshold(&self, value: f64, threshold: f64) -> bool {
        (value.abs() - threshold).abs() <= self.review_margin * threshold.abs()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.system_base()?;
        if self.sentinel.trim().is_empty() {
            return Err(ConfigError::new("import.sentinel", "must not be empty"));
        }
        if !(self.voltage_rescale_threshold > 0.0) {
            return Err(ConfigError::new(
                "import.voltage_rescale_threshold",
                "must be positive",
            ));
        }
        if !(self.default_voltage_pu > 0.0) {
            return Err(ConfigError::new("import.default_voltage_pu", "must be positive"));
        }
        if !(self.tap_deadband >= 0.0) {
            return Err(ConfigError::new("import.tap_deadband", "must not be negative"));
        }
        if self.tap_limit_threshold <= 1.0 + self.tap_deadband {
            return Err(ConfigError::new(
                "import.tap_limit_threshold",
                "must lie above the nominal tap band",
            ));
        }
        if !(0.0..1.0).contains(&self.review_margin) {
            return Err(ConfigError::new("import.review_margin", "must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Locale of the exported report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportFormat {
    pub delimiter: char,
    pub decimal_separator: char,
    /// Number of decimal places written for every numeric column.
    pub precision: usize,
}

impl Default for ReportFormat {
    fn default() -> Self {
        Self {
            delimiter: ';',
            decimal_separator: ',',
            precision: 4,
        }
    }
}

impl ReportFormat {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.delimiter.is_ascii() {
            return Err(ConfigError::new("report.delimiter", "must be an ASCII character"));
        }
        if self.delimiter == self.decimal_separator {
            return Err(ConfigError::new(
                "report.decimal_separator",
                "must differ from the delimiter",
            ));
        }
        if self.precision > 12 {
            return Err(ConfigError::new("report.precision", "must be at most 12"));
        }
        Ok(())
    }
}

impl PwfConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, PwfError> {
        let config: PwfConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, PwfError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.import.validate()?;
        self.report.validate()
    }
}
