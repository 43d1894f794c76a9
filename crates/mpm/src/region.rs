//! Geometric regions used to seed solids and define groups.
//!
//! Region geometry is an external collaborator to the solver core; only
//! the axis-aligned block needed by the populate and group paths lives
//! here.

use nalgebra::Vector3;

use crate::error::{MpmError, Result};

#[derive(Clone, Debug)]
pub enum Region {
    Block {
        lo: Vector3<f64>,
        hi: Vector3<f64>,
    },
}

impl Region {
    /// Build a block from `2 * dim` bounds; unused axes collapse to zero.
    pub fn block(bounds: &[f64], dim: usize) -> Result<Self> {
        if bounds.len() != 2 * dim {
            return Err(MpmError::config(format!(
                "region block expects {} bounds for dimension {}, got {}",
                2 * dim,
                dim,
                bounds.len()
            )));
        }
        let mut lo = Vector3::zeros();
        let mut hi = Vector3::zeros();
        for a in 0..dim {
            lo[a] = bounds[2 * a];
            hi[a] = bounds[2 * a + 1];
            if !(lo[a] < hi[a]) {
                return Err(MpmError::config(format!(
                    "region block axis {a}: low bound {} must be below high bound {}",
                    lo[a], hi[a]
                )));
            }
        }
        Ok(Region::Block { lo, hi })
    }

    pub fn limits(&self) -> (Vector3<f64>, Vector3<f64>) {
        match self {
            Region::Block { lo, hi } => (*lo, *hi),
        }
    }

    pub fn inside(&self, x: &Vector3<f64>, dim: usize) -> bool {
        match self {
            Region::Block { lo, hi } => {
                (0..dim).all(|a| x[a] >= lo[a] && x[a] <= hi[a])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_containment() {
        let r = Region::block(&[0.0, 1.0, 0.0, 2.0], 2).unwrap();
        assert!(r.inside(&Vector3::new(0.5, 1.0, 0.0), 2));
        assert!(r.inside(&Vector3::new(0.0, 0.0, 0.0), 2));
        assert!(!r.inside(&Vector3::new(1.5, 1.0, 0.0), 2));
        // The third axis is ignored in 2-D.
        assert!(r.inside(&Vector3::new(0.5, 1.0, 42.0), 2));
    }

    #[test]
    fn block_rejects_bad_arity_and_bounds() {
        assert!(Region::block(&[0.0, 1.0], 2).is_err());
        assert!(Region::block(&[1.0, 0.0], 1).is_err());
    }
}
