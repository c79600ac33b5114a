//! Contract between the network model and a power-flow backend.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::case::Network;
use crate::error::SolveError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusResult {
    pub vm_pu: f64,
    pub va_degree: f64,
}

/// Power drawn (loads, shunts) or produced (generators) by one device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceResult {
    pub p_mw: f64,
    pub q_mvar: f64,
}

/// Converged quantities, keyed by bus id and by device id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerFlowResults {
    pub buses: HashMap<usize, BusResult>,
    pub devices: HashMap<usize, DeviceResult>,
}

impl PowerFlowResults {
    pub fn bus(&self, bus_id: usize) -> Option<&BusResult> {
        self.buses.get(&bus_id)
    }

    pub fn device(&self, device_id: usize) -> Option<&DeviceResult> {
        self.devices.get(&device_id)
    }
}

/// A backend that turns a network into converged results.
///
/// A call either returns results for every in-service bus and device or
/// fails; there is no partial answer.
pub trait PowerFlowSolver {
    fn solve(&self, network: &Network) -> Result<PowerFlowResults, SolveError>;
}

impl<F> PowerFlowSolver for F
where
    F: Fn(&Network) -> Result<PowerFlowResults, SolveError>,
{
    fn solve(&self, network: &Network) -> Result<PowerFlowResults, SolveError> {
        self(network)
    }
}
