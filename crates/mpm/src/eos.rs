//! Equations of state: the volumetric half of the stress update.
//!
//! Sign convention: the returned pressure is positive under compression.
//! Tensile pressure is relaxed by accumulated damage so a fully failed
//! particle carries no tension.

use crate::error::{MpmError, Result};

/// Equation-of-state family. Instances are immutable after construction
/// and safe to evaluate from any thread.
#[derive(Clone, Copy, Debug)]
pub enum Eos {
    /// `pH = K (rho/rho0 - 1)`.
    Linear { k: f64 },
    /// Mie-Grüneisen shock Hugoniot cold curve:
    /// `pH = rho0 c0^2 mu (1 + mu) / (1 - (S - 1) mu)^2`, `mu = rho/rho0 - 1`.
    Shock { c0: f64, s: f64 },
    /// Polytropic fluid: `pH = K ((rho/rho0)^gamma - 1)`.
    Fluid { k: f64, gamma: f64 },
}

impl Eos {
    /// Build from a style token and parsed parameter list.
    pub fn from_args(style: &str, args: &[f64]) -> Result<Self> {
        match style {
            "linear" => match args {
                [k] => Ok(Eos::Linear { k: *k }),
                _ => Err(MpmError::config("eos linear expects: <K>")),
            },
            "shock" => match args {
                [c0, s] => Ok(Eos::Shock { c0: *c0, s: *s }),
                _ => Err(MpmError::config("eos shock expects: <c0> <S>")),
            },
            "fluid" => match args {
                [k, gamma] => Ok(Eos::Fluid {
                    k: *k,
                    gamma: *gamma,
                }),
                _ => Err(MpmError::config("eos fluid expects: <K> <gamma>")),
            },
            other => Err(MpmError::config(format!("unknown eos style '{other}'"))),
        }
    }

    /// Hydrostatic pressure for the given volume ratio and density.
    /// The temperature slot is carried for models that need it.
    pub fn compute_pressure(
        &self,
        j: f64,
        rho: f64,
        _temperature: f64,
        damage: f64,
    ) -> f64 {
        let mut ph = match *self {
            Eos::Linear { k } => {
                let rho0 = rho * j;
                k * (rho / rho0 - 1.0)
            }
            Eos::Shock { c0, s } => {
                let rho0 = rho * j;
                let mu = rho / rho0 - 1.0;
                let denom = 1.0 - (s - 1.0) * mu;
                rho0 * c0 * c0 * mu * (1.0 + mu) / (denom * denom)
            }
            Eos::Fluid { k, gamma } => {
                let rho0 = rho * j;
                k * ((rho / rho0).powf(gamma) - 1.0)
            }
        };
        // Damaged material cannot sustain tension.
        if ph < 0.0 {
            ph *= 1.0 - damage;
        }
        ph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_compression_is_positive() {
        let eos = Eos::Linear { k: 2.0e9 };
        // J = 0.9 compresses: rho = rho0 / J.
        let rho0 = 1000.0;
        let j = 0.9;
        let ph = eos.compute_pressure(j, rho0 / j, 0.0, 0.0);
        assert_relative_eq!(ph, 2.0e9 * (1.0 / 0.9 - 1.0), max_relative = 1e-12);
        assert!(ph > 0.0);
    }

    #[test]
    fn linear_tension_scales_with_damage() {
        let eos = Eos::Linear { k: 1.0e9 };
        let rho0 = 1000.0;
        let j = 1.1;
        let intact = eos.compute_pressure(j, rho0 / j, 0.0, 0.0);
        let failed = eos.compute_pressure(j, rho0 / j, 0.0, 1.0);
        assert!(intact < 0.0);
        assert_relative_eq!(failed, 0.0);
    }

    #[test]
    fn shock_reduces_to_acoustic_limit() {
        // For small mu the Hugoniot tends to rho0 c0^2 mu.
        let eos = Eos::Shock { c0: 4500.0, s: 1.49 };
        let rho0 = 2700.0;
        let j = 0.999;
        let mu = 1.0 / j - 1.0;
        let ph = eos.compute_pressure(j, rho0 / j, 0.0, 0.0);
        assert_relative_eq!(ph, rho0 * 4500.0 * 4500.0 * mu, max_relative = 5e-3);
    }

    #[test]
    fn style_parsing() {
        assert!(Eos::from_args("linear", &[1.0]).is_ok());
        assert!(Eos::from_args("linear", &[]).is_err());
        assert!(Eos::from_args("shock", &[4500.0, 1.49]).is_ok());
        assert!(Eos::from_args("vapor", &[1.0]).is_err());
    }
}
