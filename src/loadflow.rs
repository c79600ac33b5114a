use std::collections::{HashMap, HashSet};

use log::{debug, info};
use num_complex::Complex;
use rsparse::data::Trpl;
use rsparse::{lsolve, lu, sqr, usolve};

use crate::case::*;
use crate::error::SolveError;
use crate::solver::{BusResult, DeviceResult, PowerFlowResults, PowerFlowSolver};
use crate::units::SystemBase;

/// Pivot tolerance for the sparse LU factorization.
const LU_TOLERANCE: f64 = 1e-6;

/// Linearised (DC) power flow.
///
/// Solves `B'θ = P` over the non-slack buses with all magnitudes at 1.0 pu
/// (generator buses at their setpoint). The slack generation closes the
/// active balance, generator reactive output is reported as zero and shunts
/// draw their rated Q scaled by `V²`. Lossless and non-iterative, so it is a
/// reference backend rather than an AC solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct DcPowerFlow;

/// Series admittance of a branch in per unit on the system base.
pub fn series_admittance(model: &BranchModel, base: &SystemBase) -> Complex<f64> {
    let z_base = base.z_base();
    match *model {
        BranchModel::Line {
            resistance_ohm,
            reactance_ohm,
            ..
        } => 1.0 / Complex::new(resistance_ohm / z_base, reactance_ohm / z_base),
        BranchModel::Transformer {
            resistance_percent,
            reactance_percent_total,
            tap_ratio,
            rated_power_mva,
        } => {
            // impedance on the machine base, rescaled to the system base
            let scale = base.base_mva / rated_power_mva;
            let re = resistance_percent * 0.01 * scale;
            let z = reactance_percent_total * 0.01 * scale;
            let im = (z.powi(2) - re.powi(2)).max(0.0).sqrt();
            1.0 / (Complex::new(re, im) * tap_ratio)
        }
    }
}

/// Voltage magnitude per bus: generator setpoint where one is in service.
fn bus_voltages(net: &Network) -> HashMap<usize, f64> {
    let mut vm: HashMap<usize, f64> = net.buses.iter().map(|b| (b.bus_id, 1.0)).collect();
    for device in net.devices.iter().filter(|d| d.in_service) {
        if let DeviceKind::Generator {
            voltage_setpoint_pu,
            ..
        } = device.kind
        {
            vm.insert(device.bus_id, voltage_setpoint_pu);
        }
    }
    vm
}

/// Buses not reachable from `root` over in-service branches, in file order.
pub fn islanded_buses(net: &Network, root: usize) -> Vec<usize> {
    let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
    for branch in net.branches.iter().filter(|b| b.in_service) {
        let (from, to) = branch.endpoints();
        adjacency.entry(from).or_default().push(to);
        adjacency.entry(to).or_default().push(from);
    }

    let mut seen = HashSet::from([root]);
    let mut stack = vec![root];
    while let Some(bus) = stack.pop() {
        for &next in adjacency.get(&bus).into_iter().flatten() {
            if seen.insert(next) {
                stack.push(next);
            }
        }
    }

    net.buses
        .iter()
        .map(|b| b.bus_id)
        .filter(|id| !seen.contains(id))
        .collect()
}

impl DcPowerFlow {
    fn angles(&self, net: &Network, slack: &Bus) -> Result<HashMap<usize, f64>, SolveError> {
        let islanded = islanded_buses(net, slack.bus_id);
        if !islanded.is_empty() {
            return Err(SolveError::NonConvergence(format!(
                "{} bus(es) not connected to slack bus {}: {:?}",
                islanded.len(),
                slack.bus_id,
                islanded
            )));
        }

        // positions of the non-slack buses in B'
        let index: HashMap<usize, usize> = net
            .buses
            .iter()
            .filter(|b| b.bus_id != slack.bus_id)
            .enumerate()
            .map(|(pos, b)| (b.bus_id, pos))
            .collect();
        let n = index.len();
        debug!("Found {:>6} non-slack buses", n);

        let mut angles = HashMap::from([(slack.bus_id, slack.angle)]);
        if n == 0 {
            return Ok(angles);
        }

        let mut b_prime = Trpl::<f64>::new();
        b_prime.m = n;
        b_prime.n = n;

        for branch in net.branches.iter().filter(|b| b.in_service) {
            let b = -series_admittance(&branch.model, &net.base).im;
            if !b.is_finite() {
                return Err(SolveError::NonConvergence(format!(
                    "branch {} ({}-{}) has zero series impedance",
                    branch.id, branch.from_bus, branch.to_bus
                )));
            }

            let from = index.get(&branch.from_bus);
            let to = index.get(&branch.to_bus);
            if let (Some(&i), Some(&j)) = (from, to) {
                b_prime.append(i, i, b);
                b_prime.append(j, j, b);
                b_prime.append(i, j, -b);
                b_prime.append(j, i, -b);
            } else if let Some(&i) = from {
                // to is slack, diagonal only
                b_prime.append(i, i, b);
            } else if let Some(&j) = to {
                // from is slack, diagonal only
                b_prime.append(j, j, b);
            }
        }
        b_prime.sum_dupl();

        // scheduled injections in pu, slack excluded
        let mut p = vec![0.0; n];
        for device in net.devices.iter().filter(|d| d.in_service) {
            let Some(&i) = index.get(&device.bus_id) else {
                continue;
            };
            match device.kind {
                DeviceKind::Load { active_mw, .. } => p[i] -= active_mw / net.base.base_mva,
                DeviceKind::Generator { active_mw, .. } => p[i] += active_mw / net.base.base_mva,
                DeviceKind::Shunt { .. } => {}
            }
        }

        let a = b_prime.to_sprs();
        let mut symbolic = sqr(&a, 1, false);
        let numeric = lu(&a, &mut symbolic, LU_TOLERANCE).map_err(|_| {
            SolveError::NonConvergence("B' is singular, the network is islanded".to_string())
        })?;

        // x = P*b, x = L\x, x = U\x, theta = Q*x
        let mut x = vec![0.0; n];
        permute(&numeric.pinv, &p, &mut x);
        lsolve(&numeric.l, &mut x);
        usolve(&numeric.u, &mut x);
        let mut theta = vec![0.0; n];
        permute(&symbolic.q, &x, &mut theta);

        for (&bus_id, &i) in &index {
            let deg = slack.angle + theta[i].to_degrees();
            if !deg.is_finite() {
                return Err(SolveError::NonConvergence(format!(
                    "non-finite angle at bus {}",
                    bus_id
                )));
            }
            angles.insert(bus_id, deg);
        }
        Ok(angles)
    }
}

fn permute(p: &Option<Vec<isize>>, b: &[f64], x: &mut [f64]) {
    match p {
        Some(p) => {
            for (k, &value) in b.iter().enumerate() {
                x[p[k] as usize] = value;
            }
        }
        None => x.copy_from_slice(b),
    }
}

impl PowerFlowSolver for DcPowerFlow {
    fn solve(&self, net: &Network) -> Result<PowerFlowResults, SolveError> {
        let slack = net
            .buses
            .iter()
            .find(|b| b.bus_type == BusType::Slack)
            .ok_or_else(|| SolveError::NonConvergence("no slack bus".to_string()))?;

        let angles = self.angles(net, slack)?;
        let vm = bus_voltages(net);

        let in_service = || net.devices.iter().filter(|d| d.in_service);
        let slack_units = in_service()
            .filter(|d| d.generator_role() == Some(GeneratorRole::Slack))
            .count();
        let scheduled: f64 = in_service()
            .map(|d| match d.kind {
                DeviceKind::Load { active_mw, .. } => -active_mw,
                DeviceKind::Generator { role, active_mw, .. } if role != GeneratorRole::Slack => {
                    active_mw
                }
                _ => 0.0,
            })
            .sum();
        let slack_share = if slack_units > 0 {
            -scheduled / slack_units as f64
        } else {
            0.0
        };

        let mut results = PowerFlowResults::default();
        for bus in &net.buses {
            results.buses.insert(
                bus.bus_id,
                BusResult {
                    vm_pu: vm.get(&bus.bus_id).copied().unwrap_or(1.0),
                    va_degree: angles.get(&bus.bus_id).copied().unwrap_or(0.0),
                },
            );
        }

        for device in in_service() {
            let result = match device.kind {
                DeviceKind::Load {
                    active_mw,
                    reactive_mvar,
                } => DeviceResult {
                    p_mw: active_mw,
                    q_mvar: reactive_mvar,
                },
                DeviceKind::Generator {
                    role: GeneratorRole::Slack,
                    ..
                } => DeviceResult {
                    p_mw: slack_share,
                    q_mvar: 0.0,
                },
                DeviceKind::Generator { active_mw, .. } => DeviceResult {
                    p_mw: active_mw,
                    q_mvar: 0.0,
                },
                DeviceKind::Shunt { reactive_mvar } => {
                    let v = vm.get(&device.bus_id).copied().unwrap_or(1.0);
                    DeviceResult {
                        p_mw: 0.0,
                        q_mvar: reactive_mvar * v * v,
                    }
                }
            };
            results.devices.insert(device.id, result);
        }

        info!(
            "DC power flow solved: {} buses, slack bus {} supplies {:.3} MW",
            net.buses.len(),
            slack.bus_id,
            slack_share * slack_units as f64
        );
        Ok(results)
    }
}
