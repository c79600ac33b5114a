//! Conversions from the per-cent / per-unit quantities found in PWF records to
//! the physical values carried by the network model.
//!
//! All functions are pure. The only failure mode is a base quantity that is
//! zero, negative or not finite, which is a configuration problem rather than
//! bad input data.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn check_base(field: &str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::new(
            field,
            format!("base must be a positive finite number, got {value}"),
        ))
    }
}

/// Base impedance in ohm for a voltage base in kV and a power base in MVA.
pub fn base_impedance_ohm(base_kv: f64, base_mva: f64) -> Result<f64, ConfigError> {
    let base_kv = check_base("base_kv", base_kv)?;
    let base_mva = check_base("base_mva", base_mva)?;
    Ok(base_kv * base_kv / base_mva)
}

/// `(pct / 100) * kV² / MVA`
pub fn impedance_percent_to_ohm(pct: f64, base_kv: f64, base_mva: f64) -> Result<f64, ConfigError> {
    Ok(pct / 100.0 * base_impedance_ohm(base_kv, base_mva)?)
}

/// Inverse of [`impedance_percent_to_ohm`].
pub fn ohm_to_percent(ohm: f64, base_kv: f64, base_mva: f64) -> Result<f64, ConfigError> {
    Ok(ohm / base_impedance_ohm(base_kv, base_mva)? * 100.0)
}

pub fn pu_impedance_to_ohm(pu: f64, base_kv: f64, base_mva: f64) -> Result<f64, ConfigError> {
    Ok(pu * base_impedance_ohm(base_kv, base_mva)?)
}

/// Capacitance in nF that draws `q_mvar_total` of charging at `base_kv`.
///
/// From `Q = V² · ω · C` with `V` in volts and `ω = 2π·f`.
pub fn susceptance_mvar_to_nanofarad(
    q_mvar_total: f64,
    base_kv: f64,
    freq_hz: f64,
) -> Result<f64, ConfigError> {
    let base_kv = check_base("base_kv", base_kv)?;
    let freq_hz = check_base("frequency_hz", freq_hz)?;
    let v = base_kv * 1e3;
    let omega = 2.0 * PI * freq_hz;
    let farad = q_mvar_total * 1e6 / (v * v * omega);
    Ok(farad * 1e9)
}

/// Capacitance in nF for a per-unit shunt susceptance on the given bases.
pub fn pu_susceptance_to_nanofarad(
    b_pu: f64,
    base_kv: f64,
    base_mva: f64,
    freq_hz: f64,
) -> Result<f64, ConfigError> {
    let freq_hz = check_base("frequency_hz", freq_hz)?;
    let siemens = b_pu / base_impedance_ohm(base_kv, base_mva)?;
    Ok(siemens / (2.0 * PI * freq_hz) * 1e9)
}

/// Equivalent turns-ratio deviation of a fixed tap, in per cent.
pub fn tap_to_step_percent(tap: f64) -> f64 {
    (1.0 - tap) * 100.0
}

/// Three-phase current in kA for an apparent power flow at `base_kv`.
pub fn mva_to_ka(mva: f64, base_kv: f64) -> Result<f64, ConfigError> {
    let base_kv = check_base("base_kv", base_kv)?;
    Ok(mva / (3f64.sqrt() * base_kv))
}

/// System-wide bases used when converting record values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemBase {
    pub base_mva: f64,
    pub base_kv: f64,
    pub frequency_hz: f64,
}

impl SystemBase {
    pub fn new(base_mva: f64, base_kv: f64, frequency_hz: f64) -> Result<Self, ConfigError> {
        Ok(Self {
            base_mva: check_base("base_mva", base_mva)?,
            base_kv: check_base("base_kv", base_kv)?,
            frequency_hz: check_base("frequency_hz", frequency_hz)?,
        })
    }

    pub fn z_base(&self) -> f64 {
        self.base_kv * self.base_kv / self.base_mva
    }

    pub fn percent_to_ohm(&self, pct: f64) -> Result<f64, ConfigError> {
        impedance_percent_to_ohm(pct, self.base_kv, self.base_mva)
    }

    pub fn charging_to_nanofarad(&self, q_mvar_total: f64) -> Result<f64, ConfigError> {
        susceptance_mvar_to_nanofarad(q_mvar_total, self.base_kv, self.frequency_hz)
    }

    pub fn mva_to_ka(&self, mva: f64) -> Result<f64, ConfigError> {
        mva_to_ka(mva, self.base_kv)
    }
}

impl Default for SystemBase {
    fn default() -> Self {
        Self {
            base_mva: 100.0,
            base_kv: 138.0,
            frequency_hz: 60.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn percent_to_ohm_on_138kv_100mva() {
        // z_base = 138² / 100 = 190.44 ohm
        let ohm = impedance_percent_to_ohm(1.0, 138.0, 100.0).unwrap();
        assert!(close(ohm, 1.9044));
    }

    #[test]
    fn pu_impedance_is_percent_over_hundred() {
        let from_pu = pu_impedance_to_ohm(0.05, 138.0, 100.0).unwrap();
        assert!(close(from_pu, 9.522));
        assert!(close(from_pu, impedance_percent_to_ohm(5.0, 138.0, 100.0).unwrap()));
        assert!(pu_impedance_to_ohm(0.05, -1.0, 100.0).is_err());
    }

    #[test]
    fn charging_matches_q_equals_v2_omega_c() {
        let nf = susceptance_mvar_to_nanofarad(10.0, 138.0, 60.0).unwrap();
        let c = nf * 1e-9;
        let q = (138e3f64).powi(2) * 2.0 * PI * 60.0 * c;
        assert!(close(q, 10.0e6));
    }

    #[test]
    fn pu_susceptance_agrees_with_mvar_form() {
        // 0.1 pu on 100 MVA draws 10 Mvar at nominal voltage.
        let from_pu = pu_susceptance_to_nanofarad(0.1, 138.0, 100.0, 60.0).unwrap();
        let from_mvar = susceptance_mvar_to_nanofarad(10.0, 138.0, 60.0).unwrap();
        assert!(close(from_pu, from_mvar));
    }

    #[test]
    fn tap_step() {
        assert!(close(tap_to_step_percent(0.979), 2.1));
        assert_eq!(tap_to_step_percent(1.0), 0.0);
    }

    #[test]
    fn zero_base_is_config_error() {
        let err = impedance_percent_to_ohm(1.0, 138.0, 0.0).unwrap_err();
        assert_eq!(err.field, "base_mva");
        assert!(susceptance_mvar_to_nanofarad(1.0, 0.0, 60.0).is_err());
        assert!(SystemBase::new(100.0, 138.0, f64::NAN).is_err());
    }

    #[test]
    fn mva_limit_to_current() {
        let ka = mva_to_ka(3f64.sqrt() * 138.0, 138.0).unwrap();
        assert!(close(ka, 1.0));
    }

    proptest! {
        #[test]
        fn percent_ohm_round_trip(
            pct in -1000.0f64..1000.0,
            base_kv in 0.1f64..1000.0,
            base_mva in 0.1f64..10000.0,
        ) {
            let ohm = impedance_percent_to_ohm(pct, base_kv, base_mva).unwrap();
            let back = ohm_to_percent(ohm, base_kv, base_mva).unwrap();
            prop_assert!((back - pct).abs() <= 1e-9 * pct.abs().max(1.0));
        }
    }
}
