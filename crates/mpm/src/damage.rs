//! Damage models: accumulate failure and degrade the deviatoric response.

use nalgebra::Matrix3;

use crate::error::{MpmError, Result};

/// Damage family. Immutable after construction, thread-safe.
#[derive(Clone, Copy, Debug)]
pub enum Damage {
    /// Johnson-Cook failure strain driven by stress triaxiality.
    JohnsonCook {
        d1: f64,
        d2: f64,
        d3: f64,
        d4: f64,
        epsdot0: f64,
    },
}

impl Damage {
    pub fn from_args(style: &str, args: &[f64]) -> Result<Self> {
        match style {
            "johnson_cook" => match args {
                [d1, d2, d3, d4, epsdot0] => Ok(Damage::JohnsonCook {
                    d1: *d1,
                    d2: *d2,
                    d3: *d3,
                    d4: *d4,
                    epsdot0: *epsdot0,
                }),
                _ => Err(MpmError::config(
                    "damage johnson_cook expects: <d1> <d2> <d3> <d4> <epsdot0>",
                )),
            },
            other => Err(MpmError::config(format!("unknown damage style '{other}'"))),
        }
    }

    /// Advance the damage state of one particle.
    ///
    /// `damage_init` accumulates plastic strain over the failure strain;
    /// once it exceeds 1 the damage variable ramps linearly and saturates
    /// at 1 after 10% overshoot. The triaxiality clamp is one-sided
    /// (upper bound 3, no lower bound) on purpose.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_damage(
        &self,
        damage_init: &mut f64,
        damage: &mut f64,
        ph: f64,
        sigma_dev: &Matrix3<f64>,
        epsdot: f64,
        plastic_strain_increment: f64,
        _temperature: f64,
    ) {
        let Damage::JohnsonCook {
            d1,
            d2,
            d3,
            d4,
            epsdot0,
        } = *self;

        let vm = (3.0f64 / 2.0).sqrt() * sigma_dev.norm();

        // Stress triaxiality, softened denominator to avoid dividing by
        // zero in the hydrostatic limit.
        let mut triax = 0.0;
        if ph != 0.0 && vm != 0.0 {
            triax = -ph / (vm + 0.01 * ph.abs());
        }
        if triax > 3.0 {
            triax = 3.0;
        }

        let mut failure_strain = d1 + d2 * (d3 * triax).exp();
        if d4 > 0.0 && epsdot > epsdot0 {
            failure_strain *= 1.0 + d4 * (epsdot / epsdot0).ln();
        }

        *damage_init += plastic_strain_increment / failure_strain;
        if *damage_init >= 1.0 {
            *damage = ((*damage_init - 1.0) * 10.0).min(1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn jc() -> Damage {
        Damage::JohnsonCook {
            d1: 0.05,
            d2: 3.44,
            d3: -2.12,
            d4: 0.0,
            epsdot0: 1.0,
        }
    }

    /// Uniaxial-tension stress state: sigma = diag(s, 0, 0).
    fn uniaxial(s: f64) -> (f64, Matrix3<f64>) {
        let ph = -s / 3.0;
        let dev = Matrix3::from_diagonal(&Vector3::new(2.0 * s / 3.0, -s / 3.0, -s / 3.0));
        (ph, dev)
    }

    #[test]
    fn damage_ramp_step_counts() {
        let model = jc();
        let (ph, dev) = uniaxial(100.0e6);
        let mut damage_init = 0.0;
        let mut damage = 0.0;

        let mut init_step = None;
        let mut full_step = None;
        for step in 1..=400 {
            model.compute_damage(&mut damage_init, &mut damage, ph, &dev, 0.0, 0.01, 0.0);
            if init_step.is_none() && damage_init >= 1.0 {
                init_step = Some(step);
            }
            if full_step.is_none() && damage >= 1.0 {
                full_step = Some(step);
                break;
            }
        }

        // Failure strain for chi ~ 1/3 is about 1.75, so initiation lands
        // near step 175 and saturation about 18 increments later.
        let init_step = init_step.expect("damage never initiated");
        let full_step = full_step.expect("damage never saturated");
        assert!((170..=182).contains(&init_step), "init at {init_step}");
        assert!((185..=200).contains(&full_step), "full at {full_step}");
        assert!(full_step > init_step);
    }

    #[test]
    fn damage_is_monotone_and_bounded() {
        let model = jc();
        let (ph, dev) = uniaxial(50.0e6);
        let mut damage_init = 0.0;
        let mut damage = 0.0;
        let mut last = 0.0;
        for _ in 0..500 {
            model.compute_damage(&mut damage_init, &mut damage, ph, &dev, 0.0, 0.02, 0.0);
            assert!(damage >= last);
            assert!((0.0..=1.0).contains(&damage));
            last = damage;
        }
        assert_eq!(damage, 1.0);
    }

    #[test]
    fn triaxiality_upper_clamp_only() {
        // Strong compression drives triax far negative: no clamp there,
        // the failure strain blows up and damage barely accumulates.
        let model = jc();
        let (ph_c, dev_c) = uniaxial(-100.0e6);
        let mut di_c = 0.0;
        let mut d_c = 0.0;
        model.compute_damage(&mut di_c, &mut d_c, ph_c, &dev_c, 0.0, 0.01, 0.0);

        let (ph_t, dev_t) = uniaxial(100.0e6);
        let mut di_t = 0.0;
        let mut d_t = 0.0;
        model.compute_damage(&mut di_t, &mut d_t, ph_t, &dev_t, 0.0, 0.01, 0.0);

        assert!(di_t > di_c, "tension must damage faster than compression");
    }

    #[test]
    fn rate_dependence_requires_d4() {
        let slow = jc();
        let mut di_a = 0.0;
        let mut d_a = 0.0;
        let (ph, dev) = uniaxial(100.0e6);
        slow.compute_damage(&mut di_a, &mut d_a, ph, &dev, 100.0, 0.01, 0.0);

        let fast = Damage::JohnsonCook {
            d1: 0.05,
            d2: 3.44,
            d3: -2.12,
            d4: 0.1,
            epsdot0: 1.0,
        };
        let mut di_b = 0.0;
        let mut d_b = 0.0;
        fast.compute_damage(&mut di_b, &mut d_b, ph, &dev, 100.0, 0.01, 0.0);

        // d4 > 0 with epsdot above reference raises the failure strain.
        assert!(di_b < di_a);
    }
}
