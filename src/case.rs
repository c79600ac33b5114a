use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use log::warn;

use crate::config::ImportConfig;
use crate::diagnostics::ImportDiagnostics;
use crate::error::PwfError;
use crate::units::{self, SystemBase};

/// Reactive limit given to a synthesized slack, matching the ANAREDE default.
pub const UNLIMITED_Q_MVAR: f64 = 9999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusType {
    Slack, // V-theta, reference bus
    PV,    // generator bus
    PQ,    // load bus
}

impl fmt::Display for BusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusType::Slack => write!(f, "REF"),
            BusType::PV => write!(f, "P-V"),
            BusType::PQ => write!(f, "P-Q"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    // Identifiers
    pub bus_id: usize,
    pub bus_name: String,
    pub bus_type: BusType,
    pub nom_voltage: f64,

    // Initial guess
    pub voltage: f64,
    pub angle: f64,
}

impl Bus {
    pub fn new(bus_id: usize, bus_name: String, bus_type: BusType, nom_voltage: f64) -> Self {
        Self {
            bus_id,
            bus_name,
            bus_type,
            nom_voltage,
            voltage: 1.0,
            angle: 0.0,
        }
    }

    pub fn default_name(bus_id: usize) -> String {
        format!("Bus {}", bus_id)
    }
}

impl fmt::Display for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:>5} {:<14} {:>5} {:>8.2} kV  |V|={:.4}  Angle={:>8.3}",
            self.bus_id, self.bus_name, self.bus_type, self.nom_voltage, self.voltage, self.angle
        )
    }
}

/// Electrical model of a branch, fixed when the record is classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BranchModel {
    Line {
        resistance_ohm: f64,
        reactance_ohm: f64,
        shunt_capacitance_nf: f64,
        thermal_limit_ka: f64,
    },
    Transformer {
        resistance_percent: f64,
        /// Magnitude of the series impedance, `sqrt(r² + x²)`, in per cent.
        reactance_percent_total: f64,
        tap_ratio: f64,
        rated_power_mva: f64,
    },
}

impl BranchModel {
    pub fn is_transformer(&self) -> bool {
        matches!(self, BranchModel::Transformer { .. })
    }

    /// Equivalent tap step of a transformer; `None` for lines.
    pub fn tap_step_percent(&self) -> Option<f64> {
        match self {
            BranchModel::Transformer { tap_ratio, .. } => {
                Some(units::tap_to_step_percent(*tap_ratio))
            }
            BranchModel::Line { .. } => None,
        }
    }
}

impl fmt::Display for BranchModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchModel::Line {
                resistance_ohm,
                reactance_ohm,
                shunt_capacitance_nf,
                thermal_limit_ka,
            } => write!(
                f,
                "Line  R={:>10.4} ohm  X={:>10.4} ohm  C={:>10.3} nF  Imax={:.3} kA",
                resistance_ohm, reactance_ohm, shunt_capacitance_nf, thermal_limit_ka
            ),
            BranchModel::Transformer {
                resistance_percent,
                reactance_percent_total,
                tap_ratio,
                rated_power_mva,
            } => write!(
                f,
                "Xfmr  vkr={:>8.4} %  vk={:>8.4} %  Tap={:.4}  Sn={:.1} MVA",
                resistance_percent, reactance_percent_total, tap_ratio, rated_power_mva
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: usize,
    pub from_bus: usize,
    pub to_bus: usize,
    pub model: BranchModel,
    pub in_service: bool,
}

impl Branch {
    pub fn endpoints(&self) -> (usize, usize) {
        (self.from_bus, self.to_bus)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Id: {:>4} From->To: {:>5} -> {:<5} {}{}",
            self.id,
            self.from_bus,
            self.to_bus,
            self.model,
            if self.in_service { "" } else { "  (out of service)" }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratorRole {
    Slack,
    PV,
    /// Fixed P/Q injection (static generator).
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceKind {
    Load {
        active_mw: f64,
        reactive_mvar: f64,
    },
    Generator {
        role: GeneratorRole,
        active_mw: f64,
        reactive_min_mvar: f64,
        reactive_max_mvar: f64,
        voltage_setpoint_pu: f64,
    },
    /// Positive `reactive_mvar` is inductive (consuming).
    Shunt { reactive_mvar: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: usize,
    pub bus_id: usize,
    pub kind: DeviceKind,
    pub in_service: bool,
}

impl Device {
    pub fn is_load(&self) -> bool {
        matches!(self.kind, DeviceKind::Load { .. })
    }

    pub fn is_generator(&self) -> bool {
        matches!(self.kind, DeviceKind::Generator { .. })
    }

    pub fn is_shunt(&self) -> bool {
        matches!(self.kind, DeviceKind::Shunt { .. })
    }

    pub fn generator_role(&self) -> Option<GeneratorRole> {
        match self.kind {
            DeviceKind::Generator { role, .. } => Some(role),
            _ => None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DeviceKind::Load {
                active_mw,
                reactive_mvar,
            } => write!(
                f,
                "Load  {:>4} Bus {:>5}  P={:>9.3} MW  Q={:>9.3} MVAR",
                self.id, self.bus_id, active_mw, reactive_mvar
            )?,
            DeviceKind::Generator {
                role,
                active_mw,
                reactive_min_mvar,
                reactive_max_mvar,
                voltage_setpoint_pu,
            } => write!(
                f,
                "Gen   {:>4} Bus {:>5}  {:?}  P={:>9.3} MW  Q=[{:.1}, {:.1}] MVAR  Vset={:.4}",
                self.id,
                self.bus_id,
                role,
                active_mw,
                reactive_min_mvar,
                reactive_max_mvar,
                voltage_setpoint_pu
            )?,
            DeviceKind::Shunt { reactive_mvar } => write!(
                f,
                "Shunt {:>4} Bus {:>5}  Q={:>9.3} MVAR",
                self.id, self.bus_id, reactive_mvar
            )?,
        }
        if !self.in_service {
            write!(f, "  (out of service)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub case_name: String,
    pub base: SystemBase,

    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    pub devices: Vec<Device>,
    #[serde(skip)]
    pub bus_map: HashMap<usize, usize>, // bus_id -> position in `buses`
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Case: {}  Sbase: {} MVA  Vbase: {} kV  Frequency: {} Hz",
            self.case_name, self.base.base_mva, self.base.base_kv, self.base.frequency_hz
        )?;
        writeln!(
            f,
            "{} buses, {} lines, {} transformers, {} loads, {} generators, {} shunts\n",
            self.buses.len(),
            self.line_count(),
            self.transformer_count(),
            self.loads().count(),
            self.generators().count(),
            self.shunts().count(),
        )?;

        writeln!(f, "=== Buses ===")?;
        for bus in &self.buses {
            writeln!(f, "  {}", bus)?;
        }

        writeln!(f, "\n=== Branches ===")?;
        for branch in &self.branches {
            writeln!(f, "  {}", branch)?;
        }

        writeln!(f, "\n=== Devices ===")?;
        for device in &self.devices {
            writeln!(f, "  {}", device)?;
        }

        Ok(())
    }
}

impl Network {
    pub fn new(case_name: String, base: SystemBase) -> Self {
        Self {
            case_name,
            base,
            buses: Vec::new(),
            branches: Vec::new(),
            devices: Vec::new(),
            bus_map: HashMap::new(),
        }
    }

    /// Rebuild bus_map from current buses list (must be called after deserializing)
    pub fn rebuild_bus_map(&mut self) {
        self.bus_map = self
            .buses
            .iter()
            .enumerate()
            .map(|(pos, bus)| (bus.bus_id, pos))
            .collect();
    }

    pub fn contains_bus(&self, bus_id: usize) -> bool {
        self.bus_map.contains_key(&bus_id)
    }

    pub fn bus(&self, bus_id: usize) -> Option<&Bus> {
        self.bus_map.get(&bus_id).map(|&pos| &self.buses[pos])
    }

    fn bus_mut(&mut self, bus_id: usize) -> Option<&mut Bus> {
        let pos = *self.bus_map.get(&bus_id)?;
        self.buses.get_mut(pos)
    }

    /// Adds a bus keyed by its own id. Returns false if the id is already taken.
    pub fn add_bus(&mut self, bus: Bus) -> bool {
        if self.bus_map.contains_key(&bus.bus_id) {
            return false;
        }
        self.bus_map.insert(bus.bus_id, self.buses.len());
        self.buses.push(bus);
        true
    }

    /// Adds a branch between two existing buses. Returns the branch id, or
    /// `None` when an endpoint is unknown.
    pub fn add_branch(&mut self, from_bus: usize, to_bus: usize, model: BranchModel) -> Option<usize> {
        if !self.contains_bus(from_bus) || !self.contains_bus(to_bus) {
            return None;
        }
        let id = self.branches.len();
        self.branches.push(Branch {
            id,
            from_bus,
            to_bus,
            model,
            in_service: true,
        });
        Some(id)
    }

    /// Attaches a device to an existing bus. Returns the device id.
    pub fn add_device(&mut self, bus_id: usize, kind: DeviceKind) -> Option<usize> {
        if !self.contains_bus(bus_id) {
            return None;
        }
        let id = self.devices.len();
        self.devices.push(Device {
            id,
            bus_id,
            kind,
            in_service: true,
        });
        Some(id)
    }

    /// Toggles a branch for contingency studies. Returns false for an unknown id.
    pub fn set_branch_in_service(&mut self, branch_id: usize, in_service: bool) -> bool {
        match self.branches.get_mut(branch_id) {
            Some(branch) => {
                branch.in_service = in_service;
                true
            }
            None => false,
        }
    }

    pub fn set_device_in_service(&mut self, device_id: usize, in_service: bool) -> bool {
        match self.devices.get_mut(device_id) {
            Some(device) => {
                device.in_service = in_service;
                true
            }
            None => false,
        }
    }

    pub fn loads(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_load())
    }

    pub fn generators(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_generator())
    }

    pub fn shunts(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_shunt())
    }

    pub fn line_count(&self) -> usize {
        self.branches.iter().filter(|b| !b.model.is_transformer()).count()
    }

    pub fn transformer_count(&self) -> usize {
        self.branches.iter().filter(|b| b.model.is_transformer()).count()
    }

    pub fn slack_buses(&self) -> Vec<usize> {
        self.buses
            .iter()
            .filter(|b| b.bus_type == BusType::Slack)
            .map(|b| b.bus_id)
            .collect()
    }

    /// Leaves exactly one slack bus in the model and returns its id.
    ///
    /// The first declared slack (file order) wins and any others are demoted
    /// to PV. With none declared, a slack generator is synthesized on the
    /// configured fallback bus, or on the first bus in file order if allowed.
    pub fn ensure_slack(
        &mut self,
        config: &ImportConfig,
        diag: &mut ImportDiagnostics,
    ) -> Result<usize, PwfError> {
        if self.buses.is_empty() {
            return Err(PwfError::NoBuses);
        }

        let declared = self.slack_buses();
        if let Some((&keep, extra)) = declared.split_first() {
            for &bus_id in extra {
                warn!("Bus {} also declared as slack, demoting to PV", bus_id);
                diag.model_warning(
                    &Bus::default_name(bus_id),
                    format!("additional slack demoted to PV, bus {} is the reference", keep),
                );
                if let Some(bus) = self.bus_mut(bus_id) {
                    bus.bus_type = BusType::PV;
                }
                for device in self.devices.iter_mut().filter(|d| d.bus_id == bus_id) {
                    if let DeviceKind::Generator { role, .. } = &mut device.kind {
                        if *role == GeneratorRole::Slack {
                            *role = GeneratorRole::PV;
                        }
                    }
                }
            }
            return Ok(keep);
        }

        let target = config
            .fallback_slack_bus
            .filter(|id| self.contains_bus(*id))
            .or_else(|| {
                config
                    .fallback_to_first_bus
                    .then(|| self.buses.first().map(|b| b.bus_id))
                    .flatten()
            })
            .ok_or(PwfError::NoSlack)?;

        warn!("No slack bus declared, adding one at bus {}", target);
        diag.model_warning(&Bus::default_name(target), "slack bus synthesized");

        if let Some(bus) = self.bus_mut(target) {
            bus.bus_type = BusType::Slack;
        }
        self.add_device(
            target,
            DeviceKind::Generator {
                role: GeneratorRole::Slack,
                active_mw: 0.0,
                reactive_min_mvar: -UNLIMITED_Q_MVAR,
                reactive_max_mvar: UNLIMITED_Q_MVAR,
                voltage_setpoint_pu: 1.0,
            },
        );
        diag.stats.generators += 1;
        Ok(target)
    }
}
