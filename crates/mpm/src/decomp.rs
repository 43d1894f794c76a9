//! Rank decomposition of the problem box.
//!
//! One rank owns a rectangular slab of the box along x. The decomposition
//! is an explicit value (no process globals) so tests can drive several
//! ranks inside one process; real message passing sits behind this seam.
//! Reductions are expressed over gathered per-rank values: summation for
//! counters, minimum for timesteps.

use nalgebra::Vector3;

use crate::error::{MpmError, Result};

#[derive(Clone, Copy, Debug)]
pub struct Decomp {
    pub rank: usize,
    pub nranks: usize,
}

impl Decomp {
    pub fn new(rank: usize, nranks: usize) -> Result<Self> {
        if nranks == 0 || rank >= nranks {
            return Err(MpmError::config(format!(
                "invalid decomposition: rank {rank} of {nranks}"
            )));
        }
        Ok(Self { rank, nranks })
    }

    pub fn serial() -> Self {
        Self { rank: 0, nranks: 1 }
    }

    /// This rank's subdomain slab of `[boxlo, boxhi]`.
    pub fn sub_bounds(
        &self,
        boxlo: Vector3<f64>,
        boxhi: Vector3<f64>,
    ) -> (Vector3<f64>, Vector3<f64>) {
        let width = (boxhi.x - boxlo.x) / self.nranks as f64;
        let mut sublo = boxlo;
        let mut subhi = boxhi;
        sublo.x = boxlo.x + self.rank as f64 * width;
        subhi.x = if self.rank + 1 == self.nranks {
            boxhi.x
        } else {
            boxlo.x + (self.rank + 1) as f64 * width
        };
        (sublo, subhi)
    }

    /// Subdomain ownership test. Half-open along x so adjacent ranks never
    /// both claim a boundary point; the last rank closes the box.
    pub fn owns(
        &self,
        x: &Vector3<f64>,
        sublo: &Vector3<f64>,
        subhi: &Vector3<f64>,
    ) -> bool {
        if x.x < sublo.x {
            return false;
        }
        if self.rank + 1 == self.nranks {
            x.x <= subhi.x
        } else {
            x.x < subhi.x
        }
    }

    /// First tag of this rank given every rank's local particle count:
    /// lower ranks get lower tags, tags start at 1.
    pub fn tag_base(&self, np_locals: &[usize]) -> u64 {
        1 + np_locals[..self.rank].iter().map(|&n| n as u64).sum::<u64>()
    }
}

/// Sum reduction over gathered per-rank values (global particle counts,
/// energies).
pub fn allreduce_sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Minimum reduction over gathered per-rank values (CFL timesteps).
pub fn allreduce_min(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slabs_tile_the_box() {
        let lo = Vector3::zeros();
        let hi = Vector3::new(4.0, 1.0, 1.0);
        let mut right_edge = 0.0;
        for rank in 0..4 {
            let d = Decomp::new(rank, 4).unwrap();
            let (sublo, subhi) = d.sub_bounds(lo, hi);
            assert!((sublo.x - right_edge).abs() < 1e-12);
            right_edge = subhi.x;
            assert_eq!(sublo.y, 0.0);
            assert_eq!(subhi.y, 1.0);
        }
        assert!((right_edge - 4.0).abs() < 1e-12);
    }

    #[test]
    fn boundary_points_have_one_owner() {
        let lo = Vector3::zeros();
        let hi = Vector3::new(2.0, 1.0, 1.0);
        let x = Vector3::new(1.0, 0.5, 0.5); // on the rank 0/1 boundary
        let mut owners = 0;
        for rank in 0..2 {
            let d = Decomp::new(rank, 2).unwrap();
            let (sublo, subhi) = d.sub_bounds(lo, hi);
            if d.owns(&x, &sublo, &subhi) {
                owners += 1;
            }
        }
        assert_eq!(owners, 1);
    }

    #[test]
    fn tag_bases_prefix_sum() {
        let np = [10, 7, 0, 5];
        assert_eq!(Decomp::new(0, 4).unwrap().tag_base(&np), 1);
        assert_eq!(Decomp::new(1, 4).unwrap().tag_base(&np), 11);
        assert_eq!(Decomp::new(2, 4).unwrap().tag_base(&np), 18);
        assert_eq!(Decomp::new(3, 4).unwrap().tag_base(&np), 18);
    }

    #[test]
    fn reductions() {
        assert_eq!(allreduce_sum(&[1.0, 2.0, 3.0]), 6.0);
        assert_eq!(allreduce_min(&[3.0, 1.0, 2.0]), 1.0);
    }
}
