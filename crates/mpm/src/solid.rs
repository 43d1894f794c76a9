//! A solid body: the struct-of-arrays particle store, its neighbor lists,
//! and every particle/grid transfer and constitutive kernel.
//!
//! Particle loops parallelize with rayon; the scatter to nodes iterates
//! the transposed neighbor list so each node accumulates its own sum
//! without contention.

use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

use crate::cpdi::{self, CpdiStyle};
use crate::domain::Domain;
use crate::error::{MpmError, Result};
use crate::grid::Grid;
use crate::kernels::ShapeFunction;
use crate::material::Material;
use crate::math;

pub struct Solid {
    pub id: String,
    /// Material registry index.
    pub mat: usize,
    /// Grid slot in the simulation (own grid in TL, shared in UL).
    pub grid_id: usize,
    /// Problem dimension; matrices stay 3x3 with unused entries zero.
    pub dim: usize,

    /// Global particle count (sum of np_local across ranks).
    pub np: u64,
    /// Solid bounds and this rank's slice of them.
    pub lo: Vector3<f64>,
    pub hi: Vector3<f64>,

    // Identity
    pub ptag: Vec<u64>,
    pub mask: Vec<u32>,

    // Kinematics
    pub x: Vec<Vector3<f64>>,
    pub x0: Vec<Vector3<f64>>,
    pub v: Vec<Vector3<f64>>,
    pub v_update: Vec<Vector3<f64>>,
    pub a: Vec<Vector3<f64>>,
    /// External body force times mass.
    pub mb: Vec<Vector3<f64>>,
    /// Effective particle force (gathered acceleration over mass).
    pub f: Vec<Vector3<f64>>,

    // CPDI particle domains: `dim` vectors per particle (R4) or
    // 2^dim corner positions per particle (Q4).
    pub nc: usize,
    pub rp: Vec<Vector3<f64>>,
    pub rp0: Vec<Vector3<f64>>,
    pub xpc: Vec<Vector3<f64>>,
    pub xpc0: Vec<Vector3<f64>>,

    // Deformation and stress state
    pub sigma: Vec<Matrix3<f64>>,
    pub strain_el: Vec<Matrix3<f64>>,
    /// Reference-volume-weighted transposed first Piola-Kirchhoff stress.
    pub vol0_pk1: Vec<Matrix3<f64>>,
    /// Velocity gradient.
    pub l: Vec<Matrix3<f64>>,
    /// Deformation gradient.
    pub fdef: Vec<Matrix3<f64>>,
    pub finv: Vec<Matrix3<f64>>,
    pub fdot: Vec<Matrix3<f64>>,
    pub r: Vec<Matrix3<f64>>,
    pub u: Vec<Matrix3<f64>>,
    /// Rate of deformation (symmetric, unrotated in TL).
    pub d: Vec<Matrix3<f64>>,
    /// APIC inertia scalar (the tensor is diagonal for every supported
    /// shape family).
    pub di: Vec<f64>,

    pub jdet: Vec<f64>,
    pub vol0: Vec<f64>,
    pub vol: Vec<f64>,
    pub rho0: Vec<f64>,
    pub rho: Vec<f64>,
    pub mass: Vec<f64>,
    pub eff_plastic_strain: Vec<f64>,
    pub eff_plastic_strain_rate: Vec<f64>,
    pub damage: Vec<f64>,
    pub damage_init: Vec<f64>,

    // Particle -> node neighbor lists and the transposed node -> particle
    // lists. Rebuilt together, never cross-linked.
    pub neigh_pn: Vec<Vec<usize>>,
    pub wf_pn: Vec<Vec<f64>>,
    pub wfd_pn: Vec<Vec<Vector3<f64>>>,
    pub neigh_np: Vec<Vec<usize>>,
    pub wf_np: Vec<Vec<f64>>,
    pub wfd_np: Vec<Vec<Vector3<f64>>>,

    pub dt_cfl: f64,
    pub vtot: f64,
}

impl Solid {
    pub fn new(id: &str, mat: usize, grid_id: usize, nc: usize, dim: usize) -> Self {
        Self {
            id: id.to_string(),
            mat,
            grid_id,
            dim,
            np: 0,
            lo: Vector3::zeros(),
            hi: Vector3::zeros(),
            ptag: Vec::new(),
            mask: Vec::new(),
            x: Vec::new(),
            x0: Vec::new(),
            v: Vec::new(),
            v_update: Vec::new(),
            a: Vec::new(),
            mb: Vec::new(),
            f: Vec::new(),
            nc,
            rp: Vec::new(),
            rp0: Vec::new(),
            xpc: Vec::new(),
            xpc0: Vec::new(),
            sigma: Vec::new(),
            strain_el: Vec::new(),
            vol0_pk1: Vec::new(),
            l: Vec::new(),
            fdef: Vec::new(),
            finv: Vec::new(),
            fdot: Vec::new(),
            r: Vec::new(),
            u: Vec::new(),
            d: Vec::new(),
            di: Vec::new(),
            jdet: Vec::new(),
            vol0: Vec::new(),
            vol: Vec::new(),
            rho0: Vec::new(),
            rho: Vec::new(),
            mass: Vec::new(),
            eff_plastic_strain: Vec::new(),
            eff_plastic_strain_rate: Vec::new(),
            damage: Vec::new(),
            damage_init: Vec::new(),
            neigh_pn: Vec::new(),
            wf_pn: Vec::new(),
            wfd_pn: Vec::new(),
            neigh_np: Vec::new(),
            wf_np: Vec::new(),
            wfd_np: Vec::new(),
            dt_cfl: 1.0e22,
            vtot: 0.0,
        }
    }

    /// Rank-local particle count.
    #[inline]
    pub fn np_local(&self) -> usize {
        self.x.len()
    }

    /// Append `n` default-initialized particles (F = I, J = 1).
    pub fn grow(&mut self, n: usize) {
        let dim = self.dim;
        let zeros_v = Vector3::zeros();
        let zeros_m = Matrix3::zeros();
        let eye = Matrix3::identity();
        for _ in 0..n {
            self.ptag.push(0);
            self.mask.push(1);
            self.x.push(zeros_v);
            self.x0.push(zeros_v);
            self.v.push(zeros_v);
            self.v_update.push(zeros_v);
            self.a.push(zeros_v);
            self.mb.push(zeros_v);
            self.f.push(zeros_v);
            for _ in 0..if self.nc > 0 { dim } else { 0 } {
                self.rp.push(zeros_v);
                self.rp0.push(zeros_v);
            }
            for _ in 0..self.nc {
                self.xpc.push(zeros_v);
                self.xpc0.push(zeros_v);
            }
            self.sigma.push(zeros_m);
            self.strain_el.push(zeros_m);
            self.vol0_pk1.push(zeros_m);
            self.l.push(zeros_m);
            self.fdef.push(eye);
            self.finv.push(zeros_m);
            self.fdot.push(zeros_m);
            self.r.push(eye);
            self.u.push(zeros_m);
            self.d.push(zeros_m);
            self.di.push(0.0);
            self.jdet.push(1.0);
            self.vol0.push(0.0);
            self.vol.push(0.0);
            self.rho0.push(0.0);
            self.rho.push(0.0);
            self.mass.push(0.0);
            self.eff_plastic_strain.push(0.0);
            self.eff_plastic_strain_rate.push(0.0);
            self.damage.push(0.0);
            self.damage_init.push(0.0);
        }
    }

    /// Size the particle-side neighbor lists and the node-side transposed
    /// lists for the grid this solid interpolates on.
    pub fn init_neighbor_storage(&mut self, nnodes: usize) {
        let np = self.np_local();
        self.neigh_pn = vec![Vec::new(); np];
        self.wf_pn = vec![Vec::new(); np];
        self.wfd_pn = vec![Vec::new(); np];
        self.neigh_np = vec![Vec::new(); nnodes];
        self.wf_np = vec![Vec::new(); nnodes];
        self.wfd_np = vec![Vec::new(); nnodes];
    }

    /// Rebuild both neighbor lists and the shape-function weights. Runs
    /// every step in updated-Lagrangian flavors, once at setup in
    /// total-Lagrangian ones.
    pub fn compute_grid_weights(
        &mut self,
        grid: &Grid,
        shape: ShapeFunction,
        cpdi: Option<CpdiStyle>,
    ) {
        if self.neigh_np.len() != grid.nnodes || self.neigh_pn.len() != self.np_local() {
            self.init_neighbor_storage(grid.nnodes);
        }
        let Self {
            ref mut neigh_pn,
            ref mut wf_pn,
            ref mut wfd_pn,
            ref x,
            ref rp,
            ref xpc,
            nc,
            dim,
            ..
        } = *self;

        neigh_pn
            .par_iter_mut()
            .zip(wf_pn.par_iter_mut())
            .zip(wfd_pn.par_iter_mut())
            .enumerate()
            .for_each(|(ip, ((neigh, wf), wfd))| {
                neigh.clear();
                wf.clear();
                wfd.clear();
                let mut entries: Vec<(usize, f64, Vector3<f64>)> = Vec::with_capacity(32);
                match cpdi {
                    Some(CpdiStyle::R4) => {
                        cpdi::r4_weights(&x[ip], &rp[dim * ip..dim * ip + dim], grid, dim, &mut entries);
                    }
                    Some(CpdiStyle::Q4) => {
                        cpdi::q4_weights(&xpc[nc * ip..nc * ip + nc], grid, dim, &mut entries);
                    }
                    None => {
                        let mut per_axis: [Vec<(usize, f64, f64)>; 3] = Default::default();
                        for (a, axis) in per_axis.iter_mut().enumerate() {
                            if a < dim {
                                shape.axis_weights(
                                    x[ip][a],
                                    grid.origin[a],
                                    grid.cellsize,
                                    grid.nn[a],
                                    axis,
                                );
                            } else {
                                axis.push((0, 1.0, 0.0));
                            }
                        }
                        for &(k, wz, dz) in &per_axis[2] {
                            for &(j, wy, dy) in &per_axis[1] {
                                for &(i, wx, dx) in &per_axis[0] {
                                    entries.push((
                                        grid.node_index(i, j, k),
                                        wx * wy * wz,
                                        Vector3::new(dx * wy * wz, wx * dy * wz, wx * wy * dz),
                                    ));
                                }
                            }
                        }
                    }
                }
                for (node, w, g) in entries {
                    neigh.push(node);
                    wf.push(w);
                    wfd.push(g);
                }
            });

        // Transposed lists, rebuilt together with the forward ones.
        for list in self.neigh_np.iter_mut() {
            list.clear();
        }
        for list in self.wf_np.iter_mut() {
            list.clear();
        }
        for list in self.wfd_np.iter_mut() {
            list.clear();
        }
        for ip in 0..self.np_local() {
            for (jj, &node) in self.neigh_pn[ip].iter().enumerate() {
                self.neigh_np[node].push(ip);
                self.wf_np[node].push(self.wf_pn[ip][jj]);
                self.wfd_np[node].push(self.wfd_pn[ip][jj]);
            }
        }
    }

    /// APIC inertia scalar for every particle.
    pub fn compute_inertia_tensor(&mut self, shape: ShapeFunction, cellsize: f64) {
        let di = shape.apic_inertia(cellsize);
        self.di.fill(di);
    }

    // ---------------- particle -> node scatter ----------------

    pub fn compute_mass_nodes(&self, grid: &mut Grid, reset: bool) {
        let neigh = &self.neigh_np;
        let wf = &self.wf_np;
        let pmass = &self.mass;
        grid.mass.par_iter_mut().enumerate().for_each(|(node, m)| {
            if reset {
                *m = 0.0;
            }
            for (jj, &ip) in neigh[node].iter().enumerate() {
                *m += wf[node][jj] * pmass[ip];
            }
        });
    }

    pub fn compute_velocity_nodes(&self, grid: &mut Grid, reset: bool) {
        let Grid {
            ref mut v,
            ref mass,
            ..
        } = *grid;
        let neigh = &self.neigh_np;
        let wf = &self.wf_np;
        let pmass = &self.mass;
        let pv = &self.v;
        v.par_iter_mut().enumerate().for_each(|(node, vn)| {
            if reset {
                *vn = Vector3::zeros();
            }
            if mass[node] > 0.0 {
                let mut vtemp = Vector3::zeros();
                for (jj, &ip) in neigh[node].iter().enumerate() {
                    vtemp += pv[ip] * (wf[node][jj] * pmass[ip]);
                }
                *vn += vtemp / mass[node];
            }
        });
    }

    /// APIC velocity scatter: each particle contributes its affine field
    /// `v + Fdot (x0_node - x0_p)` instead of the point velocity.
    pub fn compute_velocity_nodes_apic(&self, grid: &mut Grid, reset: bool) {
        let Grid {
            ref mut v,
            ref mass,
            ref x0,
            ..
        } = *grid;
        let neigh = &self.neigh_np;
        let wf = &self.wf_np;
        let pmass = &self.mass;
        let pv = &self.v;
        let px0 = &self.x0;
        let fdot = &self.fdot;
        v.par_iter_mut().enumerate().for_each(|(node, vn)| {
            if reset {
                *vn = Vector3::zeros();
            }
            if mass[node] > 0.0 {
                let mut vtemp = Vector3::zeros();
                for (jj, &ip) in neigh[node].iter().enumerate() {
                    let affine = pv[ip] + fdot[ip] * (x0[node] - px0[ip]);
                    vtemp += affine * (wf[node][jj] * pmass[ip]);
                }
                *vn += vtemp / mass[node];
            }
        });
    }

    pub fn compute_external_forces_nodes(&self, grid: &mut Grid, reset: bool) {
        let Grid {
            ref mut mb,
            ref mass,
            ..
        } = *grid;
        let neigh = &self.neigh_np;
        let wf = &self.wf_np;
        let pmb = &self.mb;
        mb.par_iter_mut().enumerate().for_each(|(node, mbn)| {
            if reset {
                *mbn = Vector3::zeros();
            }
            if mass[node] > 0.0 {
                for (jj, &ip) in neigh[node].iter().enumerate() {
                    *mbn += pmb[ip] * wf[node][jj];
                }
            }
        });
    }

    /// Total-Lagrangian internal forces: gradients are taken with respect
    /// to reference coordinates and contract the stored vol0 * PK1^T.
    pub fn compute_internal_forces_nodes_tl(&self, grid: &mut Grid) {
        let neigh = &self.neigh_np;
        let wfd = &self.wfd_np;
        let vol0_pk1 = &self.vol0_pk1;
        grid.f.par_iter_mut().enumerate().for_each(|(node, fn_)| {
            let mut ftemp = Vector3::zeros();
            for (jj, &ip) in neigh[node].iter().enumerate() {
                ftemp -= vol0_pk1[ip] * wfd[node][jj];
            }
            *fn_ = ftemp;
        });
    }

    pub fn compute_internal_forces_nodes_ul(&self, grid: &mut Grid, reset: bool) {
        let neigh = &self.neigh_np;
        let wfd = &self.wfd_np;
        let sigma = &self.sigma;
        let vol = &self.vol;
        grid.f.par_iter_mut().enumerate().for_each(|(node, fn_)| {
            if reset {
                *fn_ = Vector3::zeros();
            }
            for (jj, &ip) in neigh[node].iter().enumerate() {
                *fn_ -= (sigma[ip] * wfd[node][jj]) * vol[ip];
            }
        });
    }

    // ---------------- node -> particle gather ----------------

    pub fn compute_particle_velocities(&mut self, grid: &Grid) {
        let neigh = &self.neigh_pn;
        let wf = &self.wf_pn;
        let vn_update = &grid.v_update;
        self.v_update
            .par_iter_mut()
            .enumerate()
            .for_each(|(ip, vu)| {
                let mut acc = Vector3::zeros();
                for (jj, &node) in neigh[ip].iter().enumerate() {
                    acc += vn_update[node] * wf[ip][jj];
                }
                *vu = acc;
            });
    }

    pub fn compute_particle_acceleration(&mut self, grid: &Grid, dt: f64) {
        let Self {
            ref mut a,
            ref mut f,
            ref neigh_pn,
            ref wf_pn,
            ref mass,
            ..
        } = *self;
        let vn_update = &grid.v_update;
        let vn = &grid.v;
        let inv_dt = 1.0 / dt;
        a.par_iter_mut()
            .zip(f.par_iter_mut())
            .enumerate()
            .for_each(|(ip, (ap, fp))| {
                let mut acc = Vector3::zeros();
                for (jj, &node) in neigh_pn[ip].iter().enumerate() {
                    acc += (vn_update[node] - vn[node]) * wf_pn[ip][jj];
                }
                *ap = acc * inv_dt;
                // Kept as gathered acceleration over mass; reported only.
                *fp = *ap / mass[ip];
            });
    }

    /// Advance positions; in updated-Lagrangian mode a particle leaving
    /// the problem box is fatal.
    pub fn update_particle_position(
        &mut self,
        domain: Option<&Domain>,
        dt: f64,
        timestep: u64,
    ) -> Result<()> {
        let Self {
            ref mut x,
            ref v_update,
            ..
        } = *self;
        x.iter_mut().enumerate().try_for_each(|(ip, xp)| {
            *xp += v_update[ip] * dt;
            if let Some(dom) = domain {
                if !dom.inside(xp) {
                    log::error!(
                        "particle {ip} left the box at {:?}, box [{:?}, {:?}]",
                        xp,
                        dom.boxlo,
                        dom.boxhi
                    );
                    return Err(MpmError::Domain {
                        particle: ip,
                        timestep,
                        msg: format!(
                            "position {:?} outside box [{:?}, {:?}]",
                            xp, dom.boxlo, dom.boxhi
                        ),
                    });
                }
            }
            Ok(())
        })
    }

    /// FLIP/PIC velocity blend.
    pub fn update_particle_velocities(&mut self, alpha: f64, dt: f64) {
        let Self {
            ref mut v,
            ref v_update,
            ref a,
            ..
        } = *self;
        v.par_iter_mut().enumerate().for_each(|(ip, vp)| {
            *vp = v_update[ip] * (1.0 - alpha) + (*vp + a[ip] * dt) * alpha;
        });
    }

    // ---------------- rate of deformation gradient ----------------

    fn gradient_from_nodes(
        target: &mut [Matrix3<f64>],
        neigh_pn: &[Vec<usize>],
        wfd_pn: &[Vec<Vector3<f64>>],
        vn: &[Vector3<f64>],
        dim: usize,
    ) {
        target.par_iter_mut().enumerate().for_each(|(ip, g)| {
            *g = Matrix3::zeros();
            for (jj, &node) in neigh_pn[ip].iter().enumerate() {
                let grad = &wfd_pn[ip][jj];
                for i in 0..dim {
                    for k in 0..dim {
                        g[(i, k)] += vn[node][i] * grad[k];
                    }
                }
            }
        });
    }

    fn apic_rate_from_nodes(
        target: &mut [Matrix3<f64>],
        neigh_pn: &[Vec<usize>],
        wf_pn: &[Vec<f64>],
        x0n: &[Vector3<f64>],
        x0p: &[Vector3<f64>],
        di: &[f64],
        vn: &[Vector3<f64>],
        dim: usize,
    ) {
        target.par_iter_mut().enumerate().for_each(|(ip, g)| {
            *g = Matrix3::zeros();
            for (jj, &node) in neigh_pn[ip].iter().enumerate() {
                let dx = x0n[node] - x0p[ip];
                let w = wf_pn[ip][jj];
                for i in 0..dim {
                    for k in 0..dim {
                        g[(i, k)] += vn[node][i] * dx[k] * w;
                    }
                }
            }
            *g *= di[ip];
        });
    }

    /// TL: rate of F from the (re-scattered) nodal velocities.
    pub fn compute_rate_deformation_gradient_tl(&mut self, grid: &Grid) {
        Self::gradient_from_nodes(&mut self.fdot, &self.neigh_pn, &self.wfd_pn, &grid.v, self.dim);
    }

    /// TL-USL: rate of F from the updated nodal velocities (no second
    /// momentum scatter).
    pub fn compute_rate_deformation_gradient_tl_usl(&mut self, grid: &Grid) {
        Self::gradient_from_nodes(
            &mut self.fdot,
            &self.neigh_pn,
            &self.wfd_pn,
            &grid.v_update,
            self.dim,
        );
    }

    /// TL-APIC: affine velocity reconstruction around the reference
    /// positions, scaled by the inertia scalar.
    pub fn compute_rate_deformation_gradient_tl_apic(&mut self, grid: &Grid) {
        Self::apic_rate_from_nodes(
            &mut self.fdot,
            &self.neigh_pn,
            &self.wf_pn,
            &grid.x0,
            &self.x0,
            &self.di,
            &grid.v_update,
            self.dim,
        );
    }

    /// UL-MUSL: velocity gradient from nodal velocities after the second
    /// momentum scatter.
    pub fn compute_rate_deformation_gradient_ul_musl(&mut self, grid: &Grid) {
        Self::gradient_from_nodes(&mut self.l, &self.neigh_pn, &self.wfd_pn, &grid.v, self.dim);
    }

    /// UL-USL: velocity gradient from the updated nodal velocities.
    pub fn compute_rate_deformation_gradient_ul_usl(&mut self, grid: &Grid) {
        Self::gradient_from_nodes(
            &mut self.l,
            &self.neigh_pn,
            &self.wfd_pn,
            &grid.v_update,
            self.dim,
        );
    }

    pub fn compute_rate_deformation_gradient_ul_apic(&mut self, grid: &Grid) {
        Self::apic_rate_from_nodes(
            &mut self.l,
            &self.neigh_pn,
            &self.wf_pn,
            &grid.x0,
            &self.x0,
            &self.di,
            &grid.v_update,
            self.dim,
        );
    }

    // ---------------- deformation update ----------------

    /// Integrate F, refresh its derived quantities, and (for non-Neo-
    /// Hookean materials) the polar factors and rate of deformation.
    pub fn update_deformation_gradient(
        &mut self,
        dt: f64,
        tl: bool,
        neo_hookean: bool,
        timestep: u64,
    ) -> Result<()> {
        let eye = Matrix3::identity();
        for ip in 0..self.np_local() {
            if tl {
                self.fdef[ip] += self.fdot[ip] * dt;
            } else {
                self.fdef[ip] = (eye + self.l[ip] * dt) * self.fdef[ip];
            }

            let j = self.fdef[ip].determinant();
            if !(j > 0.0) {
                log::error!(
                    "J[{ip}] = {j} <= 0 at step {timestep}, F = {}",
                    self.fdef[ip]
                );
                return Err(MpmError::Integration {
                    particle: ip,
                    timestep,
                    msg: format!("negative jacobian J = {j}, F = {}", self.fdef[ip]),
                });
            }
            self.jdet[ip] = j;
            self.finv[ip] = self.fdef[ip].try_inverse().ok_or_else(|| {
                MpmError::Integration {
                    particle: ip,
                    timestep,
                    msg: "deformation gradient is not invertible".to_string(),
                }
            })?;
            self.vol[ip] = j * self.vol0[ip];
            self.rho[ip] = self.rho0[ip] / j;

            if !neo_hookean {
                if tl {
                    self.l[ip] = self.fdot[ip] * self.finv[ip];
                }
                let (r, u) = math::polar_decompose(&self.fdef[ip]).ok_or_else(|| {
                    log::error!(
                        "polar decomposition failed for particle {ip} at step {timestep}, F = {}",
                        self.fdef[ip]
                    );
                    MpmError::Integration {
                        particle: ip,
                        timestep,
                        msg: format!("polar decomposition failed, F = {}", self.fdef[ip]),
                    }
                })?;
                self.r[ip] = r;
                self.u[ip] = u;
                let sym_l = self.l[ip] + self.l[ip].transpose();
                self.d[ip] = if tl {
                    // Unrotated rate of deformation.
                    (self.r[ip].transpose() * sym_l * self.r[ip]) * 0.5
                } else {
                    sym_l * 0.5
                };
            }
        }
        Ok(())
    }

    // ---------------- stress update ----------------

    /// Constitutive update for every particle, then the CFL reduction.
    pub fn update_stress(
        &mut self,
        mat: &Material,
        dt: f64,
        cellsize: f64,
        tl: bool,
        timestep: u64,
    ) -> Result<()> {
        let neo_hookean = mat.is_neo_hookean();
        let eye = Matrix3::identity();

        let Self {
            ref mut sigma,
            ref mut strain_el,
            ref mut vol0_pk1,
            ref mut eff_plastic_strain,
            ref mut eff_plastic_strain_rate,
            ref mut damage,
            ref mut damage_init,
            ref fdef,
            ref finv,
            ref jdet,
            ref d,
            ref r,
            ref vol0,
            ref rho,
            ..
        } = *self;

        sigma
            .par_iter_mut()
            .zip(strain_el.par_iter_mut())
            .zip(vol0_pk1.par_iter_mut())
            .zip(eff_plastic_strain.par_iter_mut())
            .zip(eff_plastic_strain_rate.par_iter_mut())
            .zip(damage.par_iter_mut())
            .zip(damage_init.par_iter_mut())
            .enumerate()
            .for_each(|(ip, ((((((sig, eps_el), vpk1), ep), epdot), dam), dam_init))| {
                if let (false, Some(eos), Some(strength)) =
                    (neo_hookean, mat.eos.as_ref(), mat.strength.as_ref())
                {
                    let ph = eos.compute_pressure(jdet[ip], rho[ip], 0.0, *dam);
                    let (mut sigma_dev, dep) =
                        strength.update_deviatoric_stress(sig, &d[ip], dt, *ep, *epdot);
                    *ep += dep;

                    // Plastic strain rate averaged over a characteristic
                    // time tied to the acoustic crossing of a cell.
                    let tav = 1000.0 * cellsize / mat.signal_velocity;
                    *epdot = (*epdot * (1.0 - dt / tav) + dep / tav).max(0.0);

                    if let Some(damage_model) = mat.damage.as_ref() {
                        damage_model.compute_damage(
                            dam_init, dam, ph, &sigma_dev, *epdot, dep, 0.0,
                        );
                    }
                    // Fully failed material carries no deviatoric stress.
                    if *dam >= 1.0 {
                        sigma_dev = Matrix3::zeros();
                    }

                    *sig = eye * (-ph) + sigma_dev;

                    let trace_part = (d[ip].trace() * dt + eps_el.trace()) / 3.0;
                    *eps_el = if *dam > 1e-10 && *dam < 1.0 {
                        eye * trace_part + sigma_dev / (mat.g * (1.0 - *dam))
                    } else {
                        eye * trace_part
                    };

                    if tl {
                        *vpk1 = (r[ip] * *sig * r[ip].transpose())
                            * finv[ip].transpose()
                            * (vol0[ip] * jdet[ip]);
                    }
                } else {
                    let finv_t = finv[ip].transpose();
                    let pk1 = (fdef[ip] - finv_t) * mat.g + finv_t * (mat.lambda * jdet[ip].ln());
                    *vpk1 = pk1 * vol0[ip];
                    *sig = fdef[ip] * pk1.transpose() / jdet[ip];
                    *eps_el = (fdef[ip].transpose() * fdef[ip] - eye) * 0.5;
                }
            });

        // CFL reduction with a stretch-aware cell-size correction.
        let mut min_inv_p_wave_speed = 1.0e22_f64;
        let mut min_h_ratio = 1.0e22_f64;
        for ip in 0..self.np_local() {
            let inv_c2 = self.rho[ip] / (mat.k + 4.0 * mat.g / 3.0);
            if inv_c2.is_nan() {
                return Err(MpmError::Integration {
                    particle: ip,
                    timestep,
                    msg: format!(
                        "NaN wave speed: rho {}, K {}, G {}",
                        self.rho[ip], mat.k, mat.g
                    ),
                });
            }
            if inv_c2 < 0.0 {
                return Err(MpmError::Integration {
                    particle: ip,
                    timestep,
                    msg: format!("negative inverse wave speed {inv_c2}"),
                });
            }
            min_inv_p_wave_speed = min_inv_p_wave_speed.min(inv_c2);
            let f = &self.fdef[ip];
            for row in 0..3 {
                let h = f[(row, 0)] * f[(row, 0)]
                    + f[(row, 1)] * f[(row, 1)]
                    + f[(row, 2)] * f[(row, 2)];
                if h > 0.0 {
                    min_h_ratio = min_h_ratio.min(h);
                }
            }
        }
        if self.np_local() > 0 {
            let dt_bound = min_inv_p_wave_speed.sqrt() * cellsize * min_h_ratio.sqrt();
            self.dt_cfl = self.dt_cfl.min(dt_bound);
            if self.dt_cfl.is_nan() {
                return Err(MpmError::Integration {
                    particle: 0,
                    timestep,
                    msg: format!(
                        "NaN dtCFL: min inverse wave speed {min_inv_p_wave_speed}, cellsize {cellsize}"
                    ),
                });
            }
        }
        Ok(())
    }

    // ---------------- CPDI domain maintenance ----------------

    /// Convect the particle domains with the deformation gradient.
    pub fn update_particle_domain(&mut self, style: CpdiStyle) {
        match style {
            CpdiStyle::R4 => {
                let Self {
                    ref mut rp,
                    ref rp0,
                    ref fdef,
                    dim,
                    ..
                } = *self;
                rp.par_iter_mut().enumerate().for_each(|(idx, r)| {
                    *r = fdef[idx / dim] * rp0[idx];
                });
            }
            CpdiStyle::Q4 => {
                let Self {
                    ref mut xpc,
                    ref xpc0,
                    ref fdef,
                    ref x,
                    ref x0,
                    nc,
                    ..
                } = *self;
                xpc.par_iter_mut().enumerate().for_each(|(idx, c)| {
                    let ip = idx / nc;
                    *c = x[ip] + fdef[ip] * (xpc0[idx] - x0[ip]);
                });
            }
        }
    }

    // ---------------- particle lifecycle ----------------

    /// Copy the full state of particle `i` over particle `j` (tag
    /// included, so identity follows the data).
    pub fn copy_particle(&mut self, i: usize, j: usize) {
        self.ptag[j] = self.ptag[i];
        self.mask[j] = self.mask[i];
        self.x[j] = self.x[i];
        self.x0[j] = self.x0[i];
        self.v[j] = self.v[i];
        self.v_update[j] = self.v_update[i];
        self.a[j] = self.a[i];
        self.mb[j] = self.mb[i];
        self.f[j] = self.f[i];
        self.sigma[j] = self.sigma[i];
        self.strain_el[j] = self.strain_el[i];
        self.vol0_pk1[j] = self.vol0_pk1[i];
        self.l[j] = self.l[i];
        self.fdef[j] = self.fdef[i];
        self.finv[j] = self.finv[i];
        self.fdot[j] = self.fdot[i];
        self.r[j] = self.r[i];
        self.u[j] = self.u[i];
        self.d[j] = self.d[i];
        self.di[j] = self.di[i];
        self.jdet[j] = self.jdet[i];
        self.vol0[j] = self.vol0[i];
        self.vol[j] = self.vol[i];
        self.rho0[j] = self.rho0[i];
        self.rho[j] = self.rho[i];
        self.mass[j] = self.mass[i];
        self.eff_plastic_strain[j] = self.eff_plastic_strain[i];
        self.eff_plastic_strain_rate[j] = self.eff_plastic_strain_rate[i];
        self.damage[j] = self.damage[i];
        self.damage_init[j] = self.damage_init[i];
        if self.nc > 0 {
            let dim = self.dim;
            for a in 0..dim {
                self.rp[dim * j + a] = self.rp[dim * i + a];
                self.rp0[dim * j + a] = self.rp0[dim * i + a];
            }
            for c in 0..self.nc {
                self.xpc[self.nc * j + c] = self.xpc[self.nc * i + c];
                self.xpc0[self.nc * j + c] = self.xpc0[self.nc * i + c];
            }
        }
    }

    /// Remove particle `i` by copying the last particle over it and
    /// truncating every array. Tags travel with their particles.
    pub fn remove_particle(&mut self, i: usize) {
        let last = self.np_local() - 1;
        if i != last {
            self.copy_particle(last, i);
        }
        self.ptag.pop();
        self.mask.pop();
        self.x.pop();
        self.x0.pop();
        self.v.pop();
        self.v_update.pop();
        self.a.pop();
        self.mb.pop();
        self.f.pop();
        self.sigma.pop();
        self.strain_el.pop();
        self.vol0_pk1.pop();
        self.l.pop();
        self.fdef.pop();
        self.finv.pop();
        self.fdot.pop();
        self.r.pop();
        self.u.pop();
        self.d.pop();
        self.di.pop();
        self.jdet.pop();
        self.vol0.pop();
        self.vol.pop();
        self.rho0.pop();
        self.rho.pop();
        self.mass.pop();
        self.eff_plastic_strain.pop();
        self.eff_plastic_strain_rate.pop();
        self.damage.pop();
        self.damage_init.pop();
        if self.nc > 0 {
            for _ in 0..self.dim {
                self.rp.pop();
                self.rp0.pop();
            }
            for _ in 0..self.nc {
                self.xpc.pop();
                self.xpc0.pop();
            }
        }
        self.np -= 1;
    }

    // ---------------- diagnostics ----------------

    pub fn total_mass(&self) -> f64 {
        self.mass.iter().sum()
    }

    /// Strain energy of the particles selected by `groupbit`:
    /// `sum 1/2 vol sigma : strain_el`.
    pub fn strain_energy(&self, groupbit: u32) -> f64 {
        (0..self.np_local())
            .filter(|&ip| self.mask[ip] & groupbit != 0)
            .map(|ip| {
                let s = &self.sigma[ip];
                let e = &self.strain_el[ip];
                0.5 * self.vol[ip] * s.dot(e)
            })
            .sum()
    }
}
