//! Per-bus report built from solver results.
//!
//! Device results are grouped by owning bus and summed: loads into the load
//! columns, generators of every role into the generation columns, shunts into
//! their own column with the sign flipped so that a capacitor reads as an
//! injection.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::case::{DeviceKind, Network};
use crate::error::PwfError;
use crate::solver::PowerFlowResults;

/// Decimal places kept in every numeric report column.
pub const DEFAULT_PRECISION: usize = 4;

/// Net balance below this magnitude (MW or Mvar) counts as zero.
pub const NET_INJECTION_DEADBAND: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BusRow {
    pub bus_id: usize,
    pub vm_pu: f64,
    pub va_degree: f64,
    pub load_p_mw: f64,
    pub load_q_mvar: f64,
    pub gen_p_mw: f64,
    pub gen_q_mvar: f64,
    /// Injection convention: positive is capacitive.
    pub shunt_q_mvar: f64,
}

impl BusRow {
    fn empty(bus_id: usize) -> Self {
        Self {
            bus_id,
            ..Self::default()
        }
    }

    fn rounded(self, precision: usize) -> Self {
        Self {
            bus_id: self.bus_id,
            vm_pu: round_to(self.vm_pu, precision),
            va_degree: round_to(self.va_degree, precision),
            load_p_mw: round_to(self.load_p_mw, precision),
            load_q_mvar: round_to(self.load_q_mvar, precision),
            gen_p_mw: round_to(self.gen_p_mw, precision),
            gen_q_mvar: round_to(self.gen_q_mvar, precision),
            shunt_q_mvar: round_to(self.shunt_q_mvar, precision),
        }
    }
}

/// Net generation or demand at one bus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NetInjectionRow {
    pub bus_id: usize,
    pub vm_pu: f64,
    pub va_degree: f64,
    pub p_gen_mw: f64,
    pub p_load_mw: f64,
    pub q_gen_mvar: f64,
    pub q_load_mvar: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BusReport {
    /// One row per bus, ascending bus id.
    pub rows: Vec<BusRow>,
}

/// Rounds half away from zero and never yields `-0.0`.
pub fn round_to(value: f64, places: usize) -> f64 {
    let scale = 10f64.powi(places as i32);
    let rounded = (value * scale).round() / scale;
    if rounded == 0.0 { 0.0 } else { rounded }
}

/// Splits a net balance into its (generation, demand) columns.
fn split_balance(net: f64) -> (f64, f64) {
    if net > NET_INJECTION_DEADBAND {
        (net, 0.0)
    } else if net < -NET_INJECTION_DEADBAND {
        (0.0, net.abs())
    } else {
        (0.0, 0.0)
    }
}

/// Aggregates results at the default precision.
pub fn aggregate(network: &Network, results: &PowerFlowResults) -> Result<BusReport, PwfError> {
    aggregate_with_precision(network, results, DEFAULT_PRECISION)
}

pub fn aggregate_with_precision(
    network: &Network,
    results: &PowerFlowResults,
    precision: usize,
) -> Result<BusReport, PwfError> {
    let mut rows: BTreeMap<usize, BusRow> = BTreeMap::new();
    for bus in &network.buses {
        let result = results.bus(bus.bus_id).ok_or_else(|| {
            PwfError::IncompleteResults(format!("no voltage result for bus {}", bus.bus_id))
        })?;
        let mut row = BusRow::empty(bus.bus_id);
        row.vm_pu = result.vm_pu;
        row.va_degree = result.va_degree;
        rows.insert(bus.bus_id, row);
    }

    for device in network.devices.iter().filter(|d| d.in_service) {
        let result = results.device(device.id).ok_or_else(|| {
            PwfError::IncompleteResults(format!(
                "no result for in-service device {} at bus {}",
                device.id, device.bus_id
            ))
        })?;
        let Some(row) = rows.get_mut(&device.bus_id) else {
            debug!("device {} refers to unknown bus {}", device.id, device.bus_id);
            continue;
        };
        match device.kind {
            DeviceKind::Load { .. } => {
                row.load_p_mw += result.p_mw;
                row.load_q_mvar += result.q_mvar;
            }
            DeviceKind::Generator { .. } => {
                row.gen_p_mw += result.p_mw;
                row.gen_q_mvar += result.q_mvar;
            }
            DeviceKind::Shunt { .. } => row.shunt_q_mvar -= result.q_mvar,
        }
    }

    Ok(BusReport {
        rows: rows.into_values().map(|r| r.rounded(precision)).collect(),
    })
}

impl BusReport {
    pub fn row(&self, bus_id: usize) -> Option<&BusRow> {
        self.rows.iter().find(|r| r.bus_id == bus_id)
    }

    pub fn total_load_mw(&self) -> f64 {
        self.rows.iter().map(|r| r.load_p_mw).sum()
    }

    pub fn total_generation_mw(&self) -> f64 {
        self.rows.iter().map(|r| r.gen_p_mw).sum()
    }

    /// Net generation/demand per bus: generation minus load plus shunt
    /// injection, split into a generation and a demand column and rounded to
    /// `precision` places.
    pub fn net_injection(&self, precision: usize) -> Vec<NetInjectionRow> {
        self.rows
            .iter()
            .map(|r| {
                let (p_gen_mw, p_load_mw) = split_balance(r.gen_p_mw - r.load_p_mw);
                let (q_gen_mvar, q_load_mvar) =
                    split_balance(r.gen_q_mvar - r.load_q_mvar + r.shunt_q_mvar);
                NetInjectionRow {
                    bus_id: r.bus_id,
                    vm_pu: r.vm_pu,
                    va_degree: r.va_degree,
                    p_gen_mw: round_to(p_gen_mw, precision),
                    p_load_mw: round_to(p_load_mw, precision),
                    q_gen_mvar: round_to(q_gen_mvar, precision),
                    q_load_mvar: round_to(q_load_mvar, precision),
                }
            })
            .collect()
    }
}

impl fmt::Display for BusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>6} {:>8} {:>9} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "Bus", "V (pu)", "Ang (deg)", "Pload", "Qload", "Pgen", "Qgen", "Qshunt"
        )?;
        for r in &self.rows {
            writeln!(
                f,
                "{:>6} {:>8.4} {:>9.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                r.bus_id,
                r.vm_pu,
                r.va_degree,
                r.load_p_mw,
                r.load_q_mvar,
                r.gen_p_mw,
                r.gen_q_mvar,
                r.shunt_q_mvar
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::case::{Bus, BusType, GeneratorRole};
    use crate::solver::{BusResult, DeviceResult};
    use crate::units::SystemBase;

    fn generator(role: GeneratorRole, p: f64) -> DeviceKind {
        DeviceKind::Generator {
            role,
            active_mw: p,
            reactive_min_mvar: 0.0,
            reactive_max_mvar: 0.0,
            voltage_setpoint_pu: 1.0,
        }
    }

    /// Buses 3, 1, 2 (file order) with two loads and a shunt at 2, a slack
    /// and a static generator at 1.
    fn case() -> (Network, PowerFlowResults) {
        let mut net = Network::new("agg".into(), SystemBase::default());
        for id in [3, 1, 2] {
            net.add_bus(Bus::new(id, Bus::default_name(id), BusType::PQ, 138.0));
        }
        let load = |p, q| DeviceKind::Load {
            active_mw: p,
            reactive_mvar: q,
        };
        net.add_device(2, load(30.0, 10.0));
        net.add_device(2, load(20.0, 5.0));
        net.add_device(2, DeviceKind::Shunt { reactive_mvar: -12.0 });
        net.add_device(1, generator(GeneratorRole::Slack, 0.0));
        net.add_device(1, generator(GeneratorRole::Static, 5.0));

        let mut results = PowerFlowResults::default();
        for (id, vm, va) in [(1, 1.0, 0.0), (2, 0.98766, -3.14159), (3, 1.0, -1.0)] {
            results.buses.insert(id, BusResult { vm_pu: vm, va_degree: va });
        }
        for (id, p, q) in [
            (0, 30.0, 10.0),
            (1, 20.0, 5.0),
            (2, 0.0, -11.7),
            (3, 45.123456, 7.0),
            (4, 5.0, 0.0),
        ] {
            results.devices.insert(id, DeviceResult { p_mw: p, q_mvar: q });
        }
        (net, results)
    }

    #[test]
    fn sums_by_bus_in_id_order() {
        let (net, results) = case();
        let report = aggregate(&net, &results).unwrap();

        let ids: Vec<usize> = report.rows.iter().map(|r| r.bus_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let bus2 = report.row(2).unwrap();
        assert_eq!(bus2.load_p_mw, 50.0);
        assert_eq!(bus2.load_q_mvar, 15.0);
        assert_eq!(bus2.shunt_q_mvar, 11.7);
        assert_eq!(bus2.vm_pu, 0.9877);
        assert_eq!(bus2.va_degree, -3.1416);
        assert_eq!(bus2.gen_p_mw, 0.0);

        let bus1 = report.row(1).unwrap();
        assert_eq!(bus1.gen_p_mw, 50.1235);
        assert_eq!(bus1.gen_q_mvar, 7.0);
        assert_eq!(bus1.load_p_mw, 0.0);
    }

    #[test]
    fn bus_without_devices_reports_zero() {
        let (net, results) = case();
        let report = aggregate(&net, &results).unwrap();
        let bus3 = report.row(3).unwrap();
        assert_eq!(
            (bus3.load_p_mw, bus3.load_q_mvar, bus3.gen_p_mw, bus3.gen_q_mvar, bus3.shunt_q_mvar),
            (0.0, 0.0, 0.0, 0.0, 0.0)
        );
    }

    #[test]
    fn missing_device_result_is_incomplete() {
        let (net, mut results) = case();
        results.devices.remove(&1);
        let err = aggregate(&net, &results).unwrap_err();
        assert!(matches!(err, PwfError::IncompleteResults(_)));
    }

    #[test]
    fn out_of_service_device_contributes_nothing() {
        let (mut net, mut results) = case();
        net.set_device_in_service(1, false);
        results.devices.remove(&1);
        let report = aggregate(&net, &results).unwrap();
        assert_eq!(report.row(2).unwrap().load_p_mw, 30.0);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(-2.5, 0), -3.0);
        assert_eq!(round_to(-0.00001, 4).to_bits(), 0.0f64.to_bits());
    }

    #[test]
    fn net_injection_splits_balance() {
        let (net, results) = case();
        let net_rows = aggregate(&net, &results).unwrap().net_injection(DEFAULT_PRECISION);

        let bus1 = net_rows.iter().find(|r| r.bus_id == 1).unwrap();
        assert_eq!(bus1.p_gen_mw, 50.1235);
        assert_eq!(bus1.p_load_mw, 0.0);

        let bus2 = net_rows.iter().find(|r| r.bus_id == 2).unwrap();
        assert_eq!(bus2.p_load_mw, 50.0);
        // 15 Mvar demand against 11.7 Mvar of shunt injection
        assert_eq!(bus2.q_load_mvar, 3.3);
        assert_eq!(bus2.q_gen_mvar, 0.0);

        let bus3 = net_rows.iter().find(|r| r.bus_id == 3).unwrap();
        assert_eq!((bus3.p_gen_mw, bus3.p_load_mw), (0.0, 0.0));
    }

    #[test]
    fn net_injection_uses_requested_precision() {
        let (net, results) = case();
        let net_rows = aggregate(&net, &results).unwrap().net_injection(1);
        let bus1 = net_rows.iter().find(|r| r.bus_id == 1).unwrap();
        assert_eq!(bus1.p_gen_mw, 50.1);
        let bus2 = net_rows.iter().find(|r| r.bus_id == 2).unwrap();
        assert_eq!(bus2.q_load_mvar, 3.3);
    }
}
