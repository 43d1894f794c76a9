//! The simulation root: every kernel gets its context from this value
//! (no process-global state, so tests run several instances at once).

use std::collections::HashMap;
use std::path::Path;

use crate::cpdi::CpdiStyle;
use crate::decomp::Decomp;
use crate::domain::Domain;
use crate::dump::Dump;
use crate::error::{MpmError, Result};
use crate::fix::Fix;
use crate::grid::Grid;
use crate::group::{GroupKind, GroupRegistry};
use crate::material::MaterialRegistry;
use crate::method::{self, Method};
use crate::populate;
use crate::restart::{self, Snapshot, SolidSnapshot};
use crate::solid::Solid;

pub struct Simulation {
    pub domain: Domain,
    pub decomp: Decomp,
    pub materials: MaterialRegistry,
    pub groups: GroupRegistry,
    pub method: Option<Method>,
    /// Grid slots: UL solids share slot 0, TL solids own one slot each.
    pub grids: Vec<Grid>,
    pub solids: Vec<Solid>,
    pub fixes: Vec<Fix>,
    pub dumps: Vec<Dump>,
    /// Restart schedule: (every, filename pattern with `*`).
    pub restart_every: Option<(u64, String)>,
    /// Shared key -> value map consulted and published by fixes.
    pub vars: HashMap<String, f64>,
    pub dt: f64,
    /// CFL safety factor; zero leaves the timestep fixed.
    pub dt_factor: f64,
    pub time: f64,
    pub ntimestep: u64,
    pub weights_built: bool,
}

impl Simulation {
    pub fn new(decomp: Decomp) -> Self {
        Self {
            domain: Domain::new(),
            decomp,
            materials: MaterialRegistry::new(),
            groups: GroupRegistry::new(),
            method: None,
            grids: Vec::new(),
            solids: Vec::new(),
            fixes: Vec::new(),
            dumps: Vec::new(),
            restart_every: None,
            vars: HashMap::new(),
            dt: 1.0e-16,
            dt_factor: 0.0,
            time: 0.0,
            ntimestep: 0,
            weights_built: false,
        }
    }

    pub fn serial() -> Self {
        Self::new(Decomp::serial())
    }

    pub fn set_method(&mut self, method: Method) -> Result<()> {
        method.validate(self.domain.dimension)?;
        log::info!(
            "method {}, shape {}",
            method.style.name(),
            method.shape.name()
        );
        self.method = Some(method);
        Ok(())
    }

    fn method(&self) -> Result<Method> {
        self.method.ok_or_else(|| {
            MpmError::config("a method must be defined before creating a solid")
        })
    }

    /// Create a solid: lay out its grid, populate the particles owned by
    /// this rank, and stamp their tags.
    pub fn add_solid(
        &mut self,
        id: &str,
        region_name: &str,
        np_per_cell: u8,
        material_name: &str,
        cellsize: Option<f64>,
    ) -> Result<()> {
        let method = self.method()?;
        if self.solids.iter().any(|s| s.id == id) {
            return Err(MpmError::config(format!("solid '{id}' already exists")));
        }
        let region = self
            .domain
            .find_region(region_name)
            .ok_or_else(|| {
                MpmError::config(format!("region '{region_name}' does not exist"))
            })?
            .clone();
        let mat_idx = self.materials.find_material(material_name).ok_or_else(|| {
            MpmError::config(format!("material '{material_name}' does not exist"))
        })?;

        let dim = self.domain.dimension;
        let tl = method.style.is_tl();
        let cpdi = method.style.cpdi();
        let nc = if cpdi.is_some() {
            CpdiStyle::corners(dim)
        } else {
            0
        };

        let grid_id = if tl {
            // Each TL solid owns a grid over its reference configuration.
            let mut grid = Grid::new();
            let cs = cellsize.ok_or_else(|| {
                MpmError::config("total-Lagrangian solids require a cellsize argument")
            })?;
            grid.setup(cs)?;
            let (lo, hi) = region.limits();
            grid.init(lo, hi, dim, method.shape)?;
            self.grids.push(grid);
            self.grids.len() - 1
        } else {
            // Updated-Lagrangian solids share one grid over the box.
            if !self.domain.box_set() {
                return Err(MpmError::config(
                    "updated-Lagrangian solids require the domain box",
                ));
            }
            if self.grids.is_empty() {
                self.grids.push(Grid::new());
            }
            if self.grids[0].cellsize == 0.0 {
                let cs = cellsize.ok_or_else(|| {
                    MpmError::config("the shared grid needs a cellsize argument")
                })?;
                self.grids[0].setup(cs)?;
            }
            if self.grids[0].nnodes == 0 {
                let (lo, hi) = (self.domain.boxlo, self.domain.boxhi);
                self.grids[0].init(lo, hi, dim, method.shape)?;
            }
            0
        };

        let mut solid = Solid::new(id, mat_idx, grid_id, nc, dim);
        let cs = self.grids[grid_id].cellsize;
        let np_local = populate::populate(
            &mut solid,
            &region,
            &self.domain,
            &self.decomp,
            cs,
            &self.materials.materials[mat_idx],
            np_per_cell,
            cpdi,
            tl,
        )?;
        // Script-driven runs are single-rank; multi-rank tag assignment
        // gathers real counts through `populate::assign_tags` directly.
        let mut np_locals = vec![0usize; self.decomp.nranks];
        np_locals[self.decomp.rank] = np_local;
        populate::assign_tags(&mut solid, &self.decomp, &np_locals)?;
        solid.init_neighbor_storage(self.grids[grid_id].nnodes);

        self.weights_built = false;
        self.solids.push(solid);
        Ok(())
    }

    /// Region-defined group: stamps the mask bit on current particles or
    /// nodes.
    pub fn add_group(&mut self, name: &str, kind: GroupKind, region_name: &str) -> Result<()> {
        let region = self
            .domain
            .find_region(region_name)
            .ok_or_else(|| {
                MpmError::config(format!("region '{region_name}' does not exist"))
            })?
            .clone();
        let bit = self.groups.add(name, kind, region_name)?;
        let dim = self.domain.dimension;
        match kind {
            GroupKind::Particles => {
                for solid in self.solids.iter_mut() {
                    for ip in 0..solid.np_local() {
                        if region.inside(&solid.x[ip], dim) {
                            solid.mask[ip] |= bit;
                        }
                    }
                }
            }
            GroupKind::Nodes => {
                for grid in self.grids.iter_mut() {
                    for node in 0..grid.nnodes {
                        if region.inside(&grid.x0[node], dim) {
                            grid.mask[node] |= bit;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Register a fix after checking its group selects the right kind.
    pub fn add_fix(&mut self, fix: Fix, group_name: &str) -> Result<()> {
        if self.fixes.iter().any(|f| f.id() == fix.id()) {
            return Err(MpmError::config(format!(
                "fix '{}' already exists",
                fix.id()
            )));
        }
        if group_name != "all" {
            let group = self.groups.find(group_name).ok_or_else(|| {
                MpmError::config(format!("unknown group '{group_name}'"))
            })?;
            let wants_nodes = matches!(fix, Fix::VelocityNodes { .. });
            let has_nodes = group.kind == GroupKind::Nodes;
            if wants_nodes != has_nodes {
                return Err(MpmError::config(format!(
                    "fix '{}' needs a group of {}, but '{}' selects {}",
                    fix.id(),
                    if wants_nodes { "nodes" } else { "particles" },
                    group_name,
                    if has_nodes { "nodes" } else { "particles" },
                )));
            }
        }
        log::info!("fix '{}' registered", fix.id());
        self.fixes.push(fix);
        Ok(())
    }

    /// Remove every particle inside a region, compacting by copy.
    pub fn delete_particles(&mut self, region_name: &str) -> Result<()> {
        let region = self
            .domain
            .find_region(region_name)
            .ok_or_else(|| {
                MpmError::config(format!("region '{region_name}' does not exist"))
            })?
            .clone();
        let dim = self.domain.dimension;
        for solid in self.solids.iter_mut() {
            let mut ip = 0;
            while ip < solid.np_local() {
                if region.inside(&solid.x[ip], dim) {
                    solid.remove_particle(ip);
                } else {
                    ip += 1;
                }
            }
        }
        self.weights_built = false;
        Ok(())
    }

    pub fn step(&mut self) -> Result<()> {
        method::step(self)
    }

    fn output(&mut self) -> Result<()> {
        for dump in &self.dumps {
            if dump.due(self.ntimestep) {
                dump.write(&self.solids, self.ntimestep)?;
            }
        }
        if let Some((every, pattern)) = self.restart_every.clone() {
            if every > 0 && self.ntimestep % every == 0 {
                let path = match pattern.find('*') {
                    Some(pos) => format!(
                        "{}{}{}",
                        &pattern[..pos],
                        self.ntimestep,
                        &pattern[pos + 1..]
                    ),
                    None => pattern,
                };
                self.save_restart(Path::new(&path))?;
            }
        }
        Ok(())
    }

    pub fn run(&mut self, nsteps: u64) -> Result<()> {
        log::info!("run {} steps from step {}", nsteps, self.ntimestep);
        for _ in 0..nsteps {
            self.step()?;
            self.output()?;
        }
        Ok(())
    }

    pub fn run_time(&mut self, duration: f64) -> Result<()> {
        let target = self.time + duration;
        self.run_until(target)
    }

    pub fn run_until(&mut self, target: f64) -> Result<()> {
        while self.time < target {
            self.step()?;
            self.output()?;
        }
        Ok(())
    }

    /// Step while `<var> <lt|gt> <value>` holds; unknown variables read
    /// as zero, matching unpublished fix outputs before the first step.
    pub fn run_while(&mut self, var: &str, less_than: bool, value: f64) -> Result<()> {
        loop {
            let current = self.vars.get(var).copied().unwrap_or(0.0);
            let keep = if less_than {
                current < value
            } else {
                current > value
            };
            if !keep {
                return Ok(());
            }
            self.step()?;
            self.output()?;
        }
    }

    pub fn save_restart(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot {
            ntimestep: self.ntimestep,
            time: self.time,
            dt: self.dt,
            solids: self.solids.iter().map(SolidSnapshot::capture).collect(),
        };
        restart::save(path, &snapshot)
    }

    /// Restore state into solids created by the same setup commands.
    pub fn load_restart(&mut self, path: &Path) -> Result<()> {
        let snapshot = restart::load(path)?;
        for snap in &snapshot.solids {
            let solid = self
                .solids
                .iter_mut()
                .find(|s| s.id == snap.id)
                .ok_or_else(|| {
                    MpmError::config(format!(
                        "restart references unknown solid '{}'",
                        snap.id
                    ))
                })?;
            snap.restore(solid)?;
        }
        self.ntimestep = snapshot.ntimestep;
        self.time = snapshot.time;
        self.dt = snapshot.dt;
        self.weights_built = false;
        Ok(())
    }

    /// Total particle mass across all solids on this rank.
    pub fn total_mass(&self) -> f64 {
        self.solids.iter().map(|s| s.total_mass()).sum()
    }
}
