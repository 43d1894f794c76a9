//! Fixes: the per-timestep callbacks the scheduler dispatches around the
//! core kernels.
//!
//! Each fix targets a group; particles and nodes carry group bits in
//! their `mask` fields. Velocity components given as NULL in the input
//! script are left untouched.

use std::collections::HashMap;

use nalgebra::Vector3;

use crate::grid::Grid;
use crate::solid::Solid;

#[derive(Clone, Debug)]
pub enum Fix {
    /// Set particle velocities once, at the first timestep.
    InitialVelocityParticles {
        id: String,
        groupbit: u32,
        v: [Option<f64>; 3],
    },
    /// Pin nodal velocity components (fixed-velocity boundary condition).
    VelocityNodes {
        id: String,
        groupbit: u32,
        v: [Option<f64>; 3],
    },
    /// Constant body force: refreshes `mb = mass * b` every step.
    BodyForce {
        id: String,
        groupbit: u32,
        b: Vector3<f64>,
    },
    /// Reduce the elastic strain energy and publish it as `<id>_s`.
    StrainEnergy { id: String, groupbit: u32 },
}

impl Fix {
    pub fn id(&self) -> &str {
        match self {
            Fix::InitialVelocityParticles { id, .. }
            | Fix::VelocityNodes { id, .. }
            | Fix::BodyForce { id, .. }
            | Fix::StrainEnergy { id, .. } => id,
        }
    }
}

/// Particle-side fixes that run before the scatter.
pub fn initial_integrate(fixes: &[Fix], solids: &mut [Solid], ntimestep: u64) {
    for fix in fixes {
        match fix {
            Fix::InitialVelocityParticles { groupbit, v, .. } => {
                if ntimestep != 1 {
                    continue;
                }
                for solid in solids.iter_mut() {
                    for ip in 0..solid.np_local() {
                        if solid.mask[ip] & groupbit == 0 {
                            continue;
                        }
                        for a in 0..3 {
                            if let Some(value) = v[a] {
                                solid.v[ip][a] = value;
                            }
                        }
                    }
                }
            }
            Fix::BodyForce { groupbit, b, .. } => {
                for solid in solids.iter_mut() {
                    for ip in 0..solid.np_local() {
                        if solid.mask[ip] & groupbit != 0 {
                            solid.mb[ip] = b * solid.mass[ip];
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

/// Nodal boundary conditions on the freshly integrated `v_update`.
pub fn post_update_grid_state(fixes: &[Fix], grid: &mut Grid) {
    for fix in fixes {
        if let Fix::VelocityNodes { groupbit, v, .. } = fix {
            for node in 0..grid.nnodes {
                if grid.mask[node] & groupbit == 0 {
                    continue;
                }
                for a in 0..3 {
                    if let Some(value) = v[a] {
                        grid.v_update[node][a] = value;
                    }
                }
            }
        }
    }
}

/// Nodal boundary conditions on `v` after the MUSL re-scatter.
pub fn post_velocities_to_grid(fixes: &[Fix], grid: &mut Grid) {
    for fix in fixes {
        if let Fix::VelocityNodes { groupbit, v, .. } = fix {
            for node in 0..grid.nnodes {
                if grid.mask[node] & groupbit == 0 {
                    continue;
                }
                for a in 0..3 {
                    if let Some(value) = v[a] {
                        grid.v[node][a] = value;
                    }
                }
            }
        }
    }
}

/// Reductions published into the shared variable map after the stress
/// update. Values are summed across ranks by the caller's reduction.
pub fn final_integrate(
    fixes: &[Fix],
    solids: &[Solid],
    vars: &mut HashMap<String, f64>,
) {
    for fix in fixes {
        if let Fix::StrainEnergy { id, groupbit } = fix {
            let es: f64 = solids.iter().map(|s| s.strain_energy(*groupbit)).sum();
            vars.insert(format!("{id}_s"), es);
        }
    }
}
