//! Deviatoric strength models: trial elastic update plus radial return.

use nalgebra::Matrix3;

use crate::error::{MpmError, Result};
use crate::math::deviator;

/// Strength family. Immutable after construction, thread-safe.
#[derive(Clone, Copy, Debug)]
pub enum Strength {
    /// Pure elastic deviatoric update, never yields.
    Linear { g: f64 },
    /// Johnson-Cook flow stress
    /// `Y = (A + B eps_p^n) (1 + max(1, epsdot/epsdot0))^C`
    /// with radial return on the trial deviator.
    JohnsonCook {
        g: f64,
        a: f64,
        b: f64,
        n: f64,
        epsdot0: f64,
        c: f64,
    },
}

impl Strength {
    pub fn from_args(style: &str, args: &[f64]) -> Result<Self> {
        match style {
            "linear" => match args {
                [g] => Ok(Strength::Linear { g: *g }),
                _ => Err(MpmError::config("strength linear expects: <G>")),
            },
            "johnson_cook" => match args {
                [g, a, b, n, epsdot0, c] => Ok(Strength::JohnsonCook {
                    g: *g,
                    a: *a,
                    b: *b,
                    n: *n,
                    epsdot0: *epsdot0,
                    c: *c,
                }),
                _ => Err(MpmError::config(
                    "strength johnson_cook expects: <G> <A> <B> <n> <epsdot0> <C>",
                )),
            },
            other => Err(MpmError::config(format!(
                "unknown strength style '{other}'"
            ))),
        }
    }

    /// Shear modulus.
    pub fn g(&self) -> f64 {
        match *self {
            Strength::Linear { g } => g,
            Strength::JohnsonCook { g, .. } => g,
        }
    }

    /// One deviatoric stress update. Returns the new stress deviator and
    /// the effective plastic strain increment (zero below yield).
    pub fn update_deviatoric_stress(
        &self,
        sigma: &Matrix3<f64>,
        d: &Matrix3<f64>,
        dt: f64,
        eff_plastic_strain: f64,
        epsdot: f64,
    ) -> (Matrix3<f64>, f64) {
        let g = self.g();
        // Trial elastic update of the unrotated stress deviator.
        let dev_rate = 2.0 * g * deviator(d);
        let sigma_trial_dev = deviator(sigma) + dt * dev_rate;

        match *self {
            Strength::Linear { .. } => (sigma_trial_dev, 0.0),
            Strength::JohnsonCook {
                a,
                b,
                n,
                epsdot0,
                c,
                ..
            } => {
                let epsdot_ratio = (epsdot / epsdot0).max(1.0);
                let yield_stress =
                    (a + b * eff_plastic_strain.powf(n)) * (1.0 + epsdot_ratio).powf(c);

                let j2 = (3.0f64 / 2.0).sqrt() * sigma_trial_dev.norm();
                if j2 < yield_stress {
                    (sigma_trial_dev, 0.0)
                } else {
                    let plastic_strain_increment = (j2 - yield_stress) / (3.0 * g);
                    (sigma_trial_dev * (yield_stress / j2), plastic_strain_increment)
                }
            }
        }
    }
}
