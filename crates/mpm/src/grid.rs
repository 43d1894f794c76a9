//! Background grid: a regular Cartesian node lattice with the nodal
//! accumulator arrays the transfer kernels scatter into.
//!
//! Total-Lagrangian solids lay their own grid over their reference
//! configuration; updated-Lagrangian runs share one grid spanning the
//! problem box. Spline shape families pad the lattice by one cell per
//! side so the partition of unity holds everywhere inside the box.

use nalgebra::Vector3;

use crate::error::{MpmError, Result};
use crate::kernels::ShapeFunction;

pub struct Grid {
    /// Cell edge length. Zero until `setup` ran.
    pub cellsize: f64,
    /// Node spacing: `cellsize`, or half of it for Bernstein-quadratic.
    pub spacing: f64,
    /// Lattice origin (box low corner minus padding).
    pub origin: Vector3<f64>,
    /// Node counts per axis (1 on axes beyond the problem dimension).
    pub nn: [usize; 3],
    pub nnodes: usize,

    /// Reference node positions.
    pub x0: Vec<Vector3<f64>>,
    /// Current node positions.
    pub x: Vec<Vector3<f64>>,
    pub mass: Vec<f64>,
    pub v: Vec<Vector3<f64>>,
    pub v_update: Vec<Vector3<f64>>,
    /// External force accumulator.
    pub mb: Vec<Vector3<f64>>,
    /// Internal force accumulator.
    pub f: Vec<Vector3<f64>>,
    /// Group membership bits.
    pub mask: Vec<u32>,
}

impl Grid {
    pub fn new() -> Self {
        Self {
            cellsize: 0.0,
            spacing: 0.0,
            origin: Vector3::zeros(),
            nn: [1, 1, 1],
            nnodes: 0,
            x0: Vec::new(),
            x: Vec::new(),
            mass: Vec::new(),
            v: Vec::new(),
            v_update: Vec::new(),
            mb: Vec::new(),
            f: Vec::new(),
            mask: Vec::new(),
        }
    }

    /// Set the cell size before the lattice is laid out.
    pub fn setup(&mut self, cellsize: f64) -> Result<()> {
        if !(cellsize > 0.0) || !cellsize.is_finite() {
            return Err(MpmError::config(format!(
                "grid cellsize must be positive, got {cellsize}"
            )));
        }
        self.cellsize = cellsize;
        Ok(())
    }

    /// Number of cells needed to span a length (last cell may overhang by
    /// up to half a cell, matching how solids are tiled).
    fn cells_spanning(length: f64, cellsize: f64) -> usize {
        let mut nc = (length / cellsize).floor() as usize;
        while (nc as f64) * cellsize < length - 0.5 * cellsize {
            nc += 1;
        }
        nc.max(1)
    }

    /// Lay the node lattice over `[lo, hi]` for the given problem
    /// dimension and shape family.
    pub fn init(
        &mut self,
        lo: Vector3<f64>,
        hi: Vector3<f64>,
        dim: usize,
        shape: ShapeFunction,
    ) -> Result<()> {
        if self.cellsize <= 0.0 {
            return Err(MpmError::config(
                "grid cellsize must be set before init".to_string(),
            ));
        }
        let npc = shape.nodes_per_cell();
        let pad = shape.padding();
        self.spacing = self.cellsize / npc as f64;

        let mut nn = [1usize; 3];
        let mut origin = Vector3::zeros();
        for a in 0..dim {
            let ncells = Self::cells_spanning(hi[a] - lo[a], self.cellsize) + 2 * pad;
            nn[a] = ncells * npc + 1;
            origin[a] = lo[a] - pad as f64 * self.cellsize;
        }
        self.nn = nn;
        self.origin = origin;
        self.nnodes = nn[0] * nn[1] * nn[2];

        self.x0 = vec![Vector3::zeros(); self.nnodes];
        for k in 0..nn[2] {
            for j in 0..nn[1] {
                for i in 0..nn[0] {
                    let mut p = Vector3::zeros();
                    let ijk = [i, j, k];
                    for a in 0..dim {
                        p[a] = origin[a] + ijk[a] as f64 * self.spacing;
                    }
                    let node = self.node_index(i, j, k);
                    self.x0[node] = p;
                }
            }
        }
        self.x = self.x0.clone();
        self.mass = vec![0.0; self.nnodes];
        self.v = vec![Vector3::zeros(); self.nnodes];
        self.v_update = vec![Vector3::zeros(); self.nnodes];
        self.mb = vec![Vector3::zeros(); self.nnodes];
        self.f = vec![Vector3::zeros(); self.nnodes];
        self.mask = vec![1; self.nnodes];

        log::info!(
            "grid: {} x {} x {} nodes, cellsize {}",
            nn[0],
            nn[1],
            nn[2],
            self.cellsize
        );
        Ok(())
    }

    #[inline]
    pub fn node_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.nn[1] + j) * self.nn[0] + i
    }

    /// Zero every nodal accumulator.
    pub fn reset_accumulators(&mut self) {
        self.mass.fill(0.0);
        self.v.fill(Vector3::zeros());
        self.v_update.fill(Vector3::zeros());
        self.mb.fill(Vector3::zeros());
        self.f.fill(Vector3::zeros());
    }

    pub fn total_mass(&self) -> f64 {
        self.mass.iter().sum()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}
