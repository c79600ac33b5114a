//! Builders for `DBAR` and `DLIN` records.
//!
//! Each numeric column goes through the field decoder with an explicit
//! default; a malformed field costs only that field. A record is rejected as
//! a whole only when its identifier cannot be read.

use std::ops::Range;

use log::debug;
use thiserror::Error;

use crate::case::{BranchModel, Bus, BusType, DeviceKind, GeneratorRole, Network};
use crate::config::ImportConfig;
use crate::diagnostics::ImportDiagnostics;
use crate::error::ConfigError;
use crate::field::{self, Field};
use crate::units::SystemBase;

/// DBAR column layout.
pub mod dbar {
    use std::ops::Range;

    pub const ID: Range<usize> = 0..5;
    pub const TYPE: Range<usize> = 7..8;
    pub const NAME: Range<usize> = 10..22;
    pub const VOLTAGE: Range<usize> = 23..28;
    pub const ANGLE: Range<usize> = 28..32;
    pub const P_GEN: Range<usize> = 32..37;
    pub const Q_GEN: Range<usize> = 37..42;
    pub const Q_MIN: Range<usize> = 42..47;
    pub const Q_MAX: Range<usize> = 47..52;
    pub const P_LOAD: Range<usize> = 58..63;
    pub const Q_LOAD: Range<usize> = 63..68;
    pub const SHUNT: Range<usize> = 68..73;
}

/// DLIN column layout.
pub mod dlin {
    use std::ops::Range;

    pub const FROM: Range<usize> = 0..5;
    pub const TO: Range<usize> = 10..15;
    pub const RESISTANCE: Range<usize> = 20..26;
    pub const REACTANCE: Range<usize> = 26..32;
    pub const CHARGING: Range<usize> = 32..38;
    pub const TAP: Range<usize> = 38..43;
}

/// Series impedance below which a transformer is treated as zero-impedance (%).
pub const MIN_TRANSFORMER_VK_PERCENT: f64 = 0.001;
/// Impedance given to a zero-impedance transformer (%).
pub const ZERO_IMPEDANCE_VK_PERCENT: f64 = 0.1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("unreadable record id {0:?}")]
    BadId(String),
    #[error("bus {0} already defined")]
    DuplicateBus(usize),
}

/// Values read from one DBAR line, after the voltage heuristic.
#[derive(Debug, Clone, PartialEq)]
pub struct BusRecord {
    pub id: usize,
    pub type_code: i64,
    pub name: String,
    pub voltage_pu: f64,
    pub angle_deg: f64,
    pub p_gen_mw: f64,
    pub q_gen_mvar: f64,
    pub q_min_mvar: f64,
    pub q_max_mvar: f64,
    pub p_load_mw: f64,
    pub q_load_mvar: f64,
    /// As written in the case: positive is capacitive injection.
    pub shunt_mvar: f64,
}

struct Fields<'a, 'd> {
    text: &'a str,
    line: usize,
    entity: String,
    diag: &'d mut ImportDiagnostics,
}

impl Fields<'_, '_> {
    fn num(&mut self, name: &str, range: Range<usize>, default: f64) -> f64 {
        let f = field::decode_f64(self.text, range, default);
        if f.is_malformed() {
            self.diag.defaulted(self.line, &self.entity, name, default);
        }
        f.value()
    }

    fn raw(&mut self, name: &str, range: Range<usize>, default: f64) -> Field<f64> {
        let f = field::decode_f64(self.text, range, default);
        if f.is_malformed() {
            self.diag.defaulted(self.line, &self.entity, name, default);
        }
        f
    }
}

fn read_id(text: &str, range: Range<usize>) -> Option<usize> {
    match field::decode_int(text, range, 0) {
        Field::Parsed(id) if id > 0 => usize::try_from(id).ok(),
        _ => None,
    }
}

fn rescale_voltage(raw: f64, config: &ImportConfig) -> f64 {
    if raw >= config.voltage_rescale_threshold {
        raw * config.voltage_rescale_factor
    } else {
        raw
    }
}

/// Applies the unit heuristic to a raw DBAR voltage.
///
/// Values at or above the rescale threshold are kV-style (`1000` for 1.0 pu)
/// and get scaled; anything implausibly small afterwards is replaced by the
/// default voltage.
pub fn normalize_voltage(raw: f64, config: &ImportConfig) -> f64 {
    let v = rescale_voltage(raw, config);
    if v < config.min_plausible_voltage_pu {
        config.default_voltage_pu
    } else {
        v
    }
}

impl BusRecord {
    pub fn parse(
        text: &str,
        line: usize,
        config: &ImportConfig,
        diag: &mut ImportDiagnostics,
    ) -> Result<Self, RecordError> {
        let id = read_id(text, dbar::ID)
            .ok_or_else(|| RecordError::BadId(field::text(text, dbar::ID).to_string()))?;
        let entity = Bus::default_name(id);

        let type_code = match field::decode_int(text, dbar::TYPE, 0) {
            Field::Parsed(code @ 0..=2) => code,
            Field::Blank(code) => code,
            Field::Parsed(_) | Field::Malformed(_) => {
                diag.defaulted(line, &entity, "bus type", 0.0);
                0
            }
        };

        let name = match field::text(text, dbar::NAME) {
            "" => entity.clone(),
            name => name.to_string(),
        };

        let mut fields = Fields {
            text,
            line,
            entity,
            diag,
        };
        let raw_voltage = fields.raw("voltage", dbar::VOLTAGE, config.default_voltage_pu);
        let angle_deg = fields.num("angle", dbar::ANGLE, 0.0);
        let p_gen_mw = fields.num("active generation", dbar::P_GEN, 0.0);
        let q_gen_mvar = fields.num("reactive generation", dbar::Q_GEN, 0.0);
        let q_min_mvar = fields.num("minimum reactive generation", dbar::Q_MIN, 0.0);
        let q_max_mvar = fields.num("maximum reactive generation", dbar::Q_MAX, 0.0);
        let p_load_mw = fields.num("active load", dbar::P_LOAD, 0.0);
        let q_load_mvar = fields.num("reactive load", dbar::Q_LOAD, 0.0);
        let shunt_mvar = fields.num("shunt", dbar::SHUNT, 0.0);

        let voltage_pu = normalize_voltage(raw_voltage.value(), config);
        if raw_voltage.is_parsed()
            && config.near_threshold(raw_voltage.value(), config.voltage_rescale_threshold)
        {
            fields.diag.review(
                line,
                &fields.entity,
                format!(
                    "voltage {} close to the kV/pu threshold {}, read as {:.4} pu",
                    raw_voltage.value(),
                    config.voltage_rescale_threshold,
                    voltage_pu
                ),
            );
        }
        let scaled = rescale_voltage(raw_voltage.value(), config);
        if raw_voltage.is_parsed() && config.near_threshold(scaled, config.min_plausible_voltage_pu) {
            fields.diag.review(
                line,
                &fields.entity,
                format!(
                    "voltage {} close to the plausibility floor {}, read as {:.4} pu",
                    raw_voltage.value(),
                    config.min_plausible_voltage_pu,
                    voltage_pu
                ),
            );
        }

        Ok(Self {
            id,
            type_code,
            name,
            voltage_pu,
            angle_deg,
            p_gen_mw,
            q_gen_mvar,
            q_min_mvar,
            q_max_mvar,
            p_load_mw,
            q_load_mvar,
            shunt_mvar,
        })
    }

    pub fn bus_type(&self) -> BusType {
        match self.type_code {
            2 => BusType::Slack,
            1 => BusType::PV,
            _ if self.p_gen_mw > 0.0 => BusType::PV,
            _ => BusType::PQ,
        }
    }

    pub fn to_bus(&self, nom_voltage: f64) -> Bus {
        Bus {
            bus_id: self.id,
            bus_name: self.name.clone(),
            bus_type: self.bus_type(),
            nom_voltage,
            voltage: self.voltage_pu,
            angle: self.angle_deg,
        }
    }

    /// Devices implied by the record, in load, shunt, generator order.
    pub fn devices(&self) -> Vec<DeviceKind> {
        let mut out = Vec::new();
        if self.p_load_mw != 0.0 || self.q_load_mvar != 0.0 {
            out.push(DeviceKind::Load {
                active_mw: self.p_load_mw,
                reactive_mvar: self.q_load_mvar,
            });
        }
        if self.shunt_mvar != 0.0 {
            out.push(DeviceKind::Shunt {
                reactive_mvar: -self.shunt_mvar,
            });
        }
        let role = match self.bus_type() {
            BusType::Slack => Some(GeneratorRole::Slack),
            BusType::PV => Some(GeneratorRole::PV),
            BusType::PQ => None,
        };
        if let Some(role) = role {
            out.push(DeviceKind::Generator {
                role,
                active_mw: self.p_gen_mw,
                reactive_min_mvar: self.q_min_mvar,
                reactive_max_mvar: self.q_max_mvar,
                voltage_setpoint_pu: self.voltage_pu,
            });
        }
        out
    }
}

/// Meaning of the DLIN tap column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TapClass {
    /// Blank, zero, or not a usable ratio.
    Absent,
    /// Within the deadband of 1.0.
    Nominal,
    /// Off-nominal ratio: the branch is a transformer.
    OffNominal(f64),
    /// A flow limit in MVA that happens to sit in the tap column.
    FlowLimit(f64),
}

pub fn classify_tap(tap: Option<f64>, config: &ImportConfig) -> TapClass {
    let Some(tap) = tap else {
        return TapClass::Absent;
    };
    if tap.abs() <= config.tap_deadband {
        TapClass::Absent
    } else if tap.abs() >= config.tap_limit_threshold {
        TapClass::FlowLimit(tap.abs())
    } else if (tap - 1.0).abs() <= config.tap_deadband {
        TapClass::Nominal
    } else if tap < 0.0 {
        TapClass::Absent
    } else {
        TapClass::OffNominal(tap)
    }
}

/// Values read from one DLIN line.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchRecord {
    pub from: usize,
    pub to: usize,
    pub resistance_percent: f64,
    pub reactance_percent: f64,
    pub charging_mvar: f64,
    pub tap: TapClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    Added(usize),
    /// An endpoint is not in the bus set.
    Dropped,
}

impl BranchRecord {
    pub fn parse(
        text: &str,
        line: usize,
        config: &ImportConfig,
        diag: &mut ImportDiagnostics,
    ) -> Result<Self, RecordError> {
        let from = read_id(text, dlin::FROM)
            .ok_or_else(|| RecordError::BadId(field::text(text, dlin::FROM).to_string()))?;
        let to = read_id(text, dlin::TO)
            .ok_or_else(|| RecordError::BadId(field::text(text, dlin::TO).to_string()))?;
        let mut fields = Fields {
            text,
            line,
            entity: format!("Branch {}-{}", from, to),
            diag,
        };

        let resistance_percent = fields.num("resistance", dlin::RESISTANCE, 0.0);
        let reactance_percent = fields.num("reactance", dlin::REACTANCE, 0.0);
        let charging_mvar = fields.num("charging", dlin::CHARGING, 0.0);
        let raw_tap = fields.raw("tap", dlin::TAP, 0.0);
        let tap_value = raw_tap.is_parsed().then(|| raw_tap.value());
        let tap = classify_tap(tap_value, config);

        if let Some(value) = tap_value {
            let off_nominal = (value - 1.0).abs();
            if config.near_threshold(value, config.tap_limit_threshold)
                || (config.tap_deadband > 0.0 && config.near_threshold(off_nominal, config.tap_deadband))
                || value < -config.tap_deadband
            {
                fields.diag.review(
                    line,
                    &fields.entity,
                    format!("ambiguous tap column value {}, classified as {:?}", value, tap),
                );
            }
        }

        Ok(Self {
            from,
            to,
            resistance_percent,
            reactance_percent,
            charging_mvar,
            tap,
        })
    }

    pub fn model(
        &self,
        base: &SystemBase,
        config: &ImportConfig,
    ) -> Result<BranchModel, ConfigError> {
        if let TapClass::OffNominal(tap_ratio) = self.tap {
            let r = self.resistance_percent;
            let x = self.reactance_percent;
            let mut vk = (r * r + x * x).sqrt();
            if vk < MIN_TRANSFORMER_VK_PERCENT {
                vk = ZERO_IMPEDANCE_VK_PERCENT;
            }
            return Ok(BranchModel::Transformer {
                resistance_percent: r,
                reactance_percent_total: vk,
                tap_ratio,
                rated_power_mva: base.base_mva,
            });
        }

        let shunt_capacitance_nf = if self.charging_mvar != 0.0 {
            base.charging_to_nanofarad(self.charging_mvar)?
        } else {
            0.0
        };
        let thermal_limit_ka = match self.tap {
            TapClass::FlowLimit(mva) => base.mva_to_ka(mva)?,
            _ => config.default_thermal_limit_ka,
        };
        Ok(BranchModel::Line {
            resistance_ohm: base.percent_to_ohm(self.resistance_percent)?,
            reactance_ohm: base.percent_to_ohm(self.reactance_percent)?,
            shunt_capacitance_nf,
            thermal_limit_ka,
        })
    }

    /// Adds the branch to the network unless an endpoint is unknown.
    pub fn attach(
        &self,
        network: &mut Network,
        config: &ImportConfig,
    ) -> Result<BranchOutcome, ConfigError> {
        if !network.contains_bus(self.from) || !network.contains_bus(self.to) {
            debug!("Branch {}-{} references an unknown bus, dropped", self.from, self.to);
            return Ok(BranchOutcome::Dropped);
        }
        let base = network.base;
        let model = self.model(&base, config)?;
        Ok(network
            .add_branch(self.from, self.to, model)
            .map_or(BranchOutcome::Dropped, BranchOutcome::Added))
    }
}
