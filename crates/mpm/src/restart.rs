//! Restart snapshots: serialize the particle state that cannot be
//! reconstructed from the input script and read it back tag-for-tag.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{MpmError, Result};
use crate::solid::Solid;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SolidSnapshot {
    pub id: String,
    pub np: u64,
    pub ptag: Vec<u64>,
    pub x0: Vec<Vector3<f64>>,
    pub x: Vec<Vector3<f64>>,
    pub v: Vec<Vector3<f64>>,
    pub fdef: Vec<Matrix3<f64>>,
    pub sigma: Vec<Matrix3<f64>>,
    pub strain_el: Vec<Matrix3<f64>>,
    pub eff_plastic_strain: Vec<f64>,
    pub eff_plastic_strain_rate: Vec<f64>,
    pub damage: Vec<f64>,
    pub damage_init: Vec<f64>,
    pub mass: Vec<f64>,
    pub vol0: Vec<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Snapshot {
    pub ntimestep: u64,
    pub time: f64,
    pub dt: f64,
    pub solids: Vec<SolidSnapshot>,
}

impl SolidSnapshot {
    pub fn capture(solid: &Solid) -> Self {
        Self {
            id: solid.id.clone(),
            np: solid.np,
            ptag: solid.ptag.clone(),
            x0: solid.x0.clone(),
            x: solid.x.clone(),
            v: solid.v.clone(),
            fdef: solid.fdef.clone(),
            sigma: solid.sigma.clone(),
            strain_el: solid.strain_el.clone(),
            eff_plastic_strain: solid.eff_plastic_strain.clone(),
            eff_plastic_strain_rate: solid.eff_plastic_strain_rate.clone(),
            damage: solid.damage.clone(),
            damage_init: solid.damage_init.clone(),
            mass: solid.mass.clone(),
            vol0: solid.vol0.clone(),
        }
    }

    /// Restore into a solid created by the same input script. Tag
    /// identity is preserved; a count mismatch is a configuration error.
    pub fn restore(&self, solid: &mut Solid) -> Result<()> {
        if solid.np_local() != self.ptag.len() {
            return Err(MpmError::config(format!(
                "restart mismatch for solid '{}': {} particles on disk, {} in setup",
                self.id,
                self.ptag.len(),
                solid.np_local()
            )));
        }
        solid.np = self.np;
        solid.ptag.clone_from(&self.ptag);
        solid.x0.clone_from(&self.x0);
        solid.x.clone_from(&self.x);
        solid.v.clone_from(&self.v);
        solid.fdef.clone_from(&self.fdef);
        solid.sigma.clone_from(&self.sigma);
        solid.strain_el.clone_from(&self.strain_el);
        solid
            .eff_plastic_strain
            .clone_from(&self.eff_plastic_strain);
        solid
            .eff_plastic_strain_rate
            .clone_from(&self.eff_plastic_strain_rate);
        solid.damage.clone_from(&self.damage);
        solid.damage_init.clone_from(&self.damage_init);
        solid.mass.clone_from(&self.mass);
        solid.vol0.clone_from(&self.vol0);

        // Derived quantities refresh from what was persisted.
        for ip in 0..solid.np_local() {
            let j = solid.fdef[ip].determinant();
            solid.jdet[ip] = j;
            solid.vol[ip] = j * solid.vol0[ip];
            if solid.vol0[ip] > 0.0 {
                solid.rho0[ip] = solid.mass[ip] / solid.vol0[ip];
                solid.rho[ip] = solid.rho0[ip] / j;
            }
            if let Some(inv) = solid.fdef[ip].try_inverse() {
                solid.finv[ip] = inv;
            }
        }
        Ok(())
    }
}

pub fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), snapshot)?;
    log::debug!("restart written to {}", path.display());
    Ok(())
}

pub fn load(path: &Path) -> Result<Snapshot> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
