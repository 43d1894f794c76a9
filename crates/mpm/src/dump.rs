//! Particle dump writer.
//!
//! Filenames may carry a `*` that is replaced by the current timestep, so
//! `dump d1 particles 10 out/dump_*.txt` produces one file per report.

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::error::Result;
use crate::solid::Solid;

#[derive(Clone, Debug)]
pub struct Dump {
    pub id: String,
    pub every: u64,
    pub pattern: String,
}

impl Dump {
    pub fn new(id: &str, every: u64, pattern: &str) -> Self {
        Self {
            id: id.to_string(),
            every,
            pattern: pattern.to_string(),
        }
    }

    pub fn due(&self, ntimestep: u64) -> bool {
        self.every > 0 && ntimestep % self.every == 0
    }

    pub fn filename(&self, ntimestep: u64) -> String {
        match self.pattern.find('*') {
            Some(pos) => format!(
                "{}{}{}",
                &self.pattern[..pos],
                ntimestep,
                &self.pattern[pos + 1..]
            ),
            None => self.pattern.clone(),
        }
    }

    /// One row per particle across every solid.
    pub fn write(&self, solids: &[Solid], ntimestep: u64) -> Result<()> {
        let path = self.filename(ntimestep);
        let file = File::create(&path)?;
        let mut out = BufWriter::new(file);
        writeln!(out, "# timestep {ntimestep}")?;
        writeln!(out, "# ptag x y z vx vy vz ep epdot damage")?;
        for solid in solids {
            for ip in 0..solid.np_local() {
                writeln!(
                    out,
                    "{} {} {} {} {} {} {} {} {} {}",
                    solid.ptag[ip],
                    solid.x[ip].x,
                    solid.x[ip].y,
                    solid.x[ip].z,
                    solid.v[ip].x,
                    solid.v[ip].y,
                    solid.v[ip].z,
                    solid.eff_plastic_strain[ip],
                    solid.eff_plastic_strain_rate[ip],
                    solid.damage[ip],
                )?;
            }
        }
        out.flush()?;
        log::debug!("dump '{}' wrote {}", self.id, path);
        Ok(())
    }
}
