//! Problem box, dimension, and the named regions it contains.

use nalgebra::Vector3;

use crate::error::{MpmError, Result};
use crate::region::Region;

pub struct Domain {
    pub dimension: usize,
    pub boxlo: Vector3<f64>,
    pub boxhi: Vector3<f64>,
    box_set: bool,
    pub regions: Vec<(String, Region)>,
}

impl Domain {
    pub fn new() -> Self {
        Self {
            dimension: 3,
            boxlo: Vector3::zeros(),
            boxhi: Vector3::zeros(),
            box_set: false,
            regions: Vec::new(),
        }
    }

    pub fn set_dimension(&mut self, dim: usize) -> Result<()> {
        if !(1..=3).contains(&dim) {
            return Err(MpmError::config(format!(
                "dimension must be 1, 2 or 3, got {dim}"
            )));
        }
        self.dimension = dim;
        Ok(())
    }

    pub fn set_box(&mut self, bounds: &[f64]) -> Result<()> {
        if bounds.len() != 2 * self.dimension {
            return Err(MpmError::config(format!(
                "domain expects {} bounds for dimension {}",
                2 * self.dimension,
                self.dimension
            )));
        }
        for a in 0..self.dimension {
            self.boxlo[a] = bounds[2 * a];
            self.boxhi[a] = bounds[2 * a + 1];
            if !(self.boxlo[a] < self.boxhi[a]) {
                return Err(MpmError::config(format!(
                    "domain axis {a}: low bound must be below high bound"
                )));
            }
        }
        self.box_set = true;
        Ok(())
    }

    pub fn box_set(&self) -> bool {
        self.box_set
    }

    pub fn inside(&self, x: &Vector3<f64>) -> bool {
        (0..self.dimension).all(|a| x[a] >= self.boxlo[a] && x[a] <= self.boxhi[a])
    }

    pub fn add_region(&mut self, name: &str, region: Region) -> Result<()> {
        if self.find_region(name).is_some() {
            return Err(MpmError::config(format!("region '{name}' already exists")));
        }
        self.regions.push((name.to_string(), region));
        Ok(())
    }

    pub fn find_region(&self, name: &str) -> Option<&Region> {
        self.regions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, r)| r)
    }
}

impl Default for Domain {
    fn default() -> Self {
        Self::new()
    }
}
