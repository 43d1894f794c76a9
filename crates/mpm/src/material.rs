//! Materials: bulk properties plus the three optional sub-model families.
//!
//! A material is Neo-Hookean exactly when it carries neither an EOS nor a
//! strength model; the stress update branches on that.

use crate::damage::Damage;
use crate::eos::Eos;
use crate::error::{MpmError, Result};
use crate::strength::Strength;

#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub rho0: f64,
    /// Bulk modulus.
    pub k: f64,
    /// Shear modulus.
    pub g: f64,
    /// Lamé first parameter.
    pub lambda: f64,
    /// p-wave signal velocity, used for the plastic strain-rate average.
    pub signal_velocity: f64,
    pub eos: Option<Eos>,
    pub strength: Option<Strength>,
    pub damage: Option<Damage>,
}

fn check_elastic(rho0: f64, e: f64, nu: f64) -> Result<()> {
    if rho0 <= 0.0 {
        return Err(MpmError::config("material density must be positive"));
    }
    if e <= 0.0 {
        return Err(MpmError::config("Young's modulus must be positive"));
    }
    if nu <= -1.0 || nu >= 0.5 {
        return Err(MpmError::config(
            "Poisson's ratio must be in (-1, 0.5)",
        ));
    }
    Ok(())
}

impl Material {
    /// Hyperelastic material with no sub-models (branch A of the stress
    /// update).
    pub fn neo_hookean(name: &str, rho0: f64, e: f64, nu: f64) -> Result<Self> {
        check_elastic(rho0, e, nu)?;
        let g = e / (2.0 * (1.0 + nu));
        let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
        let k = e / (3.0 * (1.0 - 2.0 * nu));
        Ok(Self {
            name: name.to_string(),
            rho0,
            k,
            g,
            lambda,
            signal_velocity: ((k + 4.0 * g / 3.0) / rho0).sqrt(),
            eos: None,
            strength: None,
            damage: None,
        })
    }

    /// Small-strain linear elastic material: a linear EOS paired with a
    /// non-yielding linear strength model (branch B).
    pub fn linear(name: &str, rho0: f64, e: f64, nu: f64) -> Result<Self> {
        let mut mat = Self::neo_hookean(name, rho0, e, nu)?;
        mat.eos = Some(Eos::Linear { k: mat.k });
        mat.strength = Some(Strength::Linear { g: mat.g });
        Ok(mat)
    }

    /// Material assembled from named EOS/strength (and optional damage)
    /// instances.
    pub fn with_models(
        name: &str,
        rho0: f64,
        eos: Eos,
        strength: Strength,
        damage: Option<Damage>,
    ) -> Result<Self> {
        if rho0 <= 0.0 {
            return Err(MpmError::config("material density must be positive"));
        }
        let g = strength.g();
        let k = match eos {
            Eos::Linear { k } => k,
            Eos::Shock { c0, .. } => rho0 * c0 * c0,
            Eos::Fluid { k, .. } => k,
        };
        Ok(Self {
            name: name.to_string(),
            rho0,
            k,
            g,
            lambda: k - 2.0 * g / 3.0,
            signal_velocity: ((k + 4.0 * g / 3.0) / rho0).sqrt(),
            eos: Some(eos),
            strength: Some(strength),
            damage,
        })
    }

    /// Branch A of the stress update applies iff this returns true.
    pub fn is_neo_hookean(&self) -> bool {
        self.eos.is_none() || self.strength.is_none()
    }
}

/// Process-wide registry of materials and the named sub-model instances
/// the input script assembles them from.
#[derive(Default)]
pub struct MaterialRegistry {
    pub materials: Vec<Material>,
    pub eos: Vec<(String, Eos)>,
    pub strengths: Vec<(String, Strength)>,
    pub damages: Vec<(String, Damage)>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_material(&mut self, mat: Material) -> Result<usize> {
        if self.find_material(&mat.name).is_some() {
            return Err(MpmError::config(format!(
                "material '{}' already exists",
                mat.name
            )));
        }
        log::info!(
            "material '{}': rho0 {}, K {:.6e}, G {:.6e}",
            mat.name,
            mat.rho0,
            mat.k,
            mat.g
        );
        self.materials.push(mat);
        Ok(self.materials.len() - 1)
    }

    pub fn find_material(&self, name: &str) -> Option<usize> {
        self.materials.iter().position(|m| m.name == name)
    }

    pub fn add_eos(&mut self, name: &str, eos: Eos) -> Result<()> {
        if self.find_eos(name).is_some() {
            return Err(MpmError::config(format!("eos '{name}' already exists")));
        }
        self.eos.push((name.to_string(), eos));
        Ok(())
    }

    pub fn find_eos(&self, name: &str) -> Option<&Eos> {
        self.eos.iter().find(|(n, _)| n == name).map(|(_, e)| e)
    }

    pub fn add_strength(&mut self, name: &str, strength: Strength) -> Result<()> {
        if self.find_strength(name).is_some() {
            return Err(MpmError::config(format!(
                "strength '{name}' already exists"
            )));
        }
        self.strengths.push((name.to_string(), strength));
        Ok(())
    }

    pub fn find_strength(&self, name: &str) -> Option<&Strength> {
        self.strengths
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    pub fn add_damage(&mut self, name: &str, damage: Damage) -> Result<()> {
        if self.find_damage(name).is_some() {
            return Err(MpmError::config(format!("damage '{name}' already exists")));
        }
        self.damages.push((name.to_string(), damage));
        Ok(())
    }

    pub fn find_damage(&self, name: &str) -> Option<&Damage> {
        self.damages.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn neo_hookean_moduli() {
        let m = Material::neo_hookean("steel", 7850.0, 200.0e9, 0.3).unwrap();
        assert_relative_eq!(m.g, 200.0e9 / 2.6, max_relative = 1e-12);
        assert_relative_eq!(m.k, 200.0e9 / (3.0 * 0.4), max_relative = 1e-12);
        assert!(m.is_neo_hookean());
        assert!(m.signal_velocity > 0.0);
    }

    #[test]
    fn zero_poisson_gives_zero_lambda() {
        let m = Material::neo_hookean("foam", 1.0, 1.0, 0.0).unwrap();
        assert_relative_eq!(m.g, 0.5);
        assert_relative_eq!(m.lambda, 0.0);
    }

    #[test]
    fn linear_material_uses_branch_b() {
        let m = Material::linear("alu", 2700.0, 70.0e9, 0.33).unwrap();
        assert!(!m.is_neo_hookean());
        assert!(m.eos.is_some() && m.strength.is_some());
    }

    #[test]
    fn invalid_properties_rejected() {
        assert!(Material::neo_hookean("bad", -1.0, 1.0, 0.3).is_err());
        assert!(Material::neo_hookean("bad", 1.0, 0.0, 0.3).is_err());
        assert!(Material::neo_hookean("bad", 1.0, 1.0, 0.5).is_err());
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut reg = MaterialRegistry::new();
        reg.add_material(Material::neo_hookean("a", 1.0, 1.0, 0.0).unwrap())
            .unwrap();
        assert!(reg
            .add_material(Material::neo_hookean("a", 1.0, 1.0, 0.0).unwrap())
            .is_err());
        assert_eq!(reg.find_material("a"), Some(0));
        assert_eq!(reg.find_material("b"), None);
    }
}
