//! Per-timestep scheduling: each method style orders the solid kernels
//! into the mandatory sequence (scatter, grid integrate, gather,
//! kinematics, stress, CFL, reset).

use crate::cpdi::CpdiStyle;
use crate::decomp::allreduce_min;
use crate::error::{MpmError, Result};
use crate::fix;
use crate::kernels::ShapeFunction;
use crate::simulation::Simulation;

/// Solver variant: TL/UL, point particles or CPDI domains.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MethodStyle {
    Tlmpm,
    Ulmpm,
    Tlcpdi,
    Ulcpdi,
    Tlcpdi2,
    Ulcpdi2,
}

impl MethodStyle {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "tlmpm" => Ok(MethodStyle::Tlmpm),
            "ulmpm" => Ok(MethodStyle::Ulmpm),
            "tlcpdi" => Ok(MethodStyle::Tlcpdi),
            "ulcpdi" => Ok(MethodStyle::Ulcpdi),
            "tlcpdi2" => Ok(MethodStyle::Tlcpdi2),
            "ulcpdi2" => Ok(MethodStyle::Ulcpdi2),
            other => Err(MpmError::config(format!("unknown method style '{other}'"))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MethodStyle::Tlmpm => "tlmpm",
            MethodStyle::Ulmpm => "ulmpm",
            MethodStyle::Tlcpdi => "tlcpdi",
            MethodStyle::Ulcpdi => "ulcpdi",
            MethodStyle::Tlcpdi2 => "tlcpdi2",
            MethodStyle::Ulcpdi2 => "ulcpdi2",
        }
    }

    /// Total-Lagrangian styles keep the grid in the reference
    /// configuration and build weights once.
    pub fn is_tl(&self) -> bool {
        matches!(
            self,
            MethodStyle::Tlmpm | MethodStyle::Tlcpdi | MethodStyle::Tlcpdi2
        )
    }

    pub fn cpdi(&self) -> Option<CpdiStyle> {
        match self {
            MethodStyle::Tlcpdi | MethodStyle::Ulcpdi => Some(CpdiStyle::R4),
            MethodStyle::Tlcpdi2 | MethodStyle::Ulcpdi2 => Some(CpdiStyle::Q4),
            _ => None,
        }
    }
}

/// Flow variant of the velocity/deformation-rate pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum FlowVariant {
    Usl,
    #[default]
    Musl,
    Apic,
}

impl FlowVariant {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "usl" => Some(FlowVariant::Usl),
            "musl" => Some(FlowVariant::Musl),
            "apic" => Some(FlowVariant::Apic),
            _ => None,
        }
    }
}

/// Scheduler configuration selected by the `method` command.
#[derive(Clone, Copy, Debug)]
pub struct Method {
    pub style: MethodStyle,
    pub flow: FlowVariant,
    /// FLIP blend weight (1 = pure FLIP, 0 = pure PIC).
    pub alpha: f64,
    pub shape: ShapeFunction,
}

impl Method {
    pub fn new(style: MethodStyle) -> Self {
        Self {
            style,
            flow: FlowVariant::default(),
            alpha: 0.99,
            shape: ShapeFunction::default(),
        }
    }

    /// Consistency checks that need the problem dimension.
    pub fn validate(&self, dim: usize) -> Result<()> {
        if self.style.cpdi() == Some(CpdiStyle::Q4) && dim == 3 {
            return Err(MpmError::config(
                "CPDI-Q4 styles support 1-D and 2-D only",
            ));
        }
        if self.style.cpdi().is_some() && self.shape != ShapeFunction::Linear {
            return Err(MpmError::config(
                "CPDI styles require the linear shape function",
            ));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(MpmError::config(format!(
                "FLIP blend must lie in [0, 1], got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Advance the simulation by one timestep.
pub fn step(sim: &mut Simulation) -> Result<()> {
    let method = sim.method.ok_or_else(|| {
        MpmError::config("no method defined; cannot advance the simulation")
    })?;
    let tl = method.style.is_tl();
    let cpdi = method.style.cpdi();
    let dt = sim.dt;
    sim.ntimestep += 1;
    let timestep = sim.ntimestep;

    let Simulation {
        ref mut solids,
        ref mut grids,
        ref domain,
        ref materials,
        ref fixes,
        ref mut vars,
        ref mut weights_built,
        ..
    } = *sim;

    // Neighbor lists and weights: every step for UL and CPDI (particle
    // positions or domains moved), once at setup for plain TL.
    if !*weights_built || !tl || cpdi.is_some() {
        for solid in solids.iter_mut() {
            solid.compute_grid_weights(&grids[solid.grid_id], method.shape, cpdi);
            if method.flow == FlowVariant::Apic {
                solid.compute_inertia_tensor(method.shape, grids[solid.grid_id].cellsize);
            }
        }
        *weights_built = true;
    }

    fix::initial_integrate(fixes, solids, timestep);

    // Particle -> grid scatter, one accumulator phase at a time so shared
    // grids see every solid's mass before velocities normalize by it.
    let mut seen = vec![false; grids.len()];
    for solid in solids.iter() {
        let reset = !std::mem::replace(&mut seen[solid.grid_id], true);
        solid.compute_mass_nodes(&mut grids[solid.grid_id], reset);
    }
    seen.fill(false);
    for solid in solids.iter() {
        let reset = !std::mem::replace(&mut seen[solid.grid_id], true);
        let grid = &mut grids[solid.grid_id];
        if method.flow == FlowVariant::Apic {
            solid.compute_velocity_nodes_apic(grid, reset);
        } else {
            solid.compute_velocity_nodes(grid, reset);
        }
    }
    seen.fill(false);
    for solid in solids.iter() {
        let reset = !std::mem::replace(&mut seen[solid.grid_id], true);
        solid.compute_external_forces_nodes(&mut grids[solid.grid_id], reset);
    }
    seen.fill(false);
    for solid in solids.iter() {
        let reset = !std::mem::replace(&mut seen[solid.grid_id], true);
        let grid = &mut grids[solid.grid_id];
        if tl {
            solid.compute_internal_forces_nodes_tl(grid);
        } else {
            solid.compute_internal_forces_nodes_ul(grid, reset);
        }
    }

    // Integrate nodal momentum and apply boundary conditions.
    for grid in grids.iter_mut() {
        update_grid_state(grid, dt);
        fix::post_update_grid_state(fixes, grid);
    }

    // Grid -> particle gather and kinematics.
    for solid in solids.iter_mut() {
        let grid = &grids[solid.grid_id];
        solid.compute_particle_velocities(grid);
        solid.compute_particle_acceleration(grid, dt);
        solid.update_particle_position(if tl { None } else { Some(domain) }, dt, timestep)?;
        solid.update_particle_velocities(method.alpha, dt);
    }

    // MUSL: scatter the blended velocities back before taking gradients.
    if method.flow == FlowVariant::Musl {
        seen.fill(false);
        for solid in solids.iter() {
            let reset = !std::mem::replace(&mut seen[solid.grid_id], true);
            solid.compute_velocity_nodes(&mut grids[solid.grid_id], reset);
        }
        for grid in grids.iter_mut() {
            fix::post_velocities_to_grid(fixes, grid);
        }
    }

    // Rate of deformation, deformation gradient, stress.
    for solid in solids.iter_mut() {
        let grid = &grids[solid.grid_id];
        match (tl, method.flow) {
            (true, FlowVariant::Musl) => solid.compute_rate_deformation_gradient_tl(grid),
            (true, FlowVariant::Usl) => solid.compute_rate_deformation_gradient_tl_usl(grid),
            (true, FlowVariant::Apic) => solid.compute_rate_deformation_gradient_tl_apic(grid),
            (false, FlowVariant::Musl) => solid.compute_rate_deformation_gradient_ul_musl(grid),
            (false, FlowVariant::Usl) => solid.compute_rate_deformation_gradient_ul_usl(grid),
            (false, FlowVariant::Apic) => solid.compute_rate_deformation_gradient_ul_apic(grid),
        }

        let mat = &materials.materials[solid.mat];
        solid.update_deformation_gradient(dt, tl, mat.is_neo_hookean(), timestep)?;
        solid.update_stress(mat, dt, grids[solid.grid_id].cellsize, tl, timestep)?;
    }

    fix::final_integrate(fixes, solids, vars);

    sim.time += dt;

    // CFL timestep reduction; a fixed timestep (no dt_factor) is left
    // alone, matching explicit `timestep` commands.
    if sim.dt_factor > 0.0 {
        let bounds: Vec<f64> = sim.solids.iter().map(|s| s.dt_cfl).collect();
        let dt_min = allreduce_min(&bounds);
        if dt_min.is_nan() {
            return Err(MpmError::Integration {
                particle: 0,
                timestep,
                msg: "NaN CFL timestep bound".to_string(),
            });
        }
        if dt_min < 1.0e21 {
            sim.dt = sim.dt_factor * dt_min;
        }
    }

    // Reset accumulators and convect CPDI particle domains.
    for grid in sim.grids.iter_mut() {
        grid.reset_accumulators();
    }
    if let Some(style) = cpdi {
        for solid in sim.solids.iter_mut() {
            solid.update_particle_domain(style);
        }
    }

    Ok(())
}

/// Nodal momentum integration: `v_update = v + dt (f + mb) / mass` where
/// mass is present, zero elsewhere.
fn update_grid_state(grid: &mut crate::grid::Grid, dt: f64) {
    use nalgebra::Vector3;
    let crate::grid::Grid {
        ref mut v_update,
        ref v,
        ref f,
        ref mb,
        ref mass,
        ..
    } = *grid;
    for node in 0..v_update.len() {
        v_update[node] = if mass[node] > 0.0 {
            v[node] + (f[node] + mb[node]) * (dt / mass[node])
        } else {
            Vector3::zeros()
        };
    }
}
