//! Particle population: tile a region with cells of the grid spacing and
//! drop `nip` integration points into each cell owned by this rank.

use nalgebra::Vector3;

use crate::cpdi::CpdiStyle;
use crate::decomp::Decomp;
use crate::domain::Domain;
use crate::error::{MpmError, Result};
use crate::material::Material;
use crate::region::Region;
use crate::solid::Solid;

/// Per-axis integration point offsets (in cell units, relative to the
/// cell center) and the particle half-width factor for a points-per-cell
/// order.
fn integration_offsets(np_per_cell: u8, cpdi: bool) -> Result<(Vec<f64>, f64)> {
    match np_per_cell {
        1 => Ok((vec![0.0], 0.5)),
        2 => {
            // Gauss points of quadratic elements, or quarter points when
            // the particles carry CPDI domains.
            let xi = if cpdi { 0.25 } else { 0.5 / 3.0_f64.sqrt() };
            Ok((vec![-xi, xi], 0.25))
        }
        3 => {
            // Bernstein elements.
            let xi = if cpdi { 1.0 / 3.0 } else { 0.7746 / 2.0 };
            Ok((vec![-xi, 0.0, xi], 1.0 / 6.0))
        }
        other => Err(MpmError::config(format!(
            "solid command expects 1, 2 or 3 particles per cell, got {other}"
        ))),
    }
}

/// Fill `solid` with this rank's share of integration points for
/// `region`. Returns the rank-local particle count; global counts and
/// tags are assigned afterwards from the gathered per-rank counts.
#[allow(clippy::too_many_arguments)]
pub fn populate(
    solid: &mut Solid,
    region: &Region,
    domain: &Domain,
    decomp: &Decomp,
    cellsize: f64,
    mat: &Material,
    np_per_cell: u8,
    cpdi: Option<CpdiStyle>,
    is_tl: bool,
) -> Result<usize> {
    let dim = domain.dimension;
    let (lo, hi) = region.limits();
    solid.lo = lo;
    solid.hi = hi;

    // TL solids tile from their own bounds; UL solids tile the whole box
    // so every rank lays the same lattice and keeps its own slice.
    let boundlo = if is_tl { lo } else { domain.boxlo };
    let boundhi = if is_tl { hi } else { domain.boxhi };
    let (sublo, subhi) = decomp.sub_bounds(boundlo, boundhi);

    let (offsets, lp_factor) = integration_offsets(np_per_cell, cpdi.is_some())?;
    let lp = cellsize * lp_factor;

    let mut ncells = [1usize; 3];
    for a in 0..dim {
        let length = boundhi[a] - boundlo[a];
        let mut nc = (length / cellsize).floor() as usize;
        while (nc as f64) * cellsize < length - 0.5 * cellsize {
            nc += 1;
        }
        ncells[a] = nc.max(1);
    }

    let per_axis = |active: bool| -> Vec<f64> {
        if active {
            offsets.clone()
        } else {
            vec![0.0]
        }
    };
    let off_x = per_axis(true);
    let off_y = per_axis(dim >= 2);
    let off_z = per_axis(dim == 3);

    let vol_cell = cellsize.powi(dim as i32);
    let nip = off_x.len() * off_y.len() * off_z.len();
    let vol_p = vol_cell / nip as f64;
    let mass_p = mat.rho0 * vol_p;

    let mut positions: Vec<Vector3<f64>> = Vec::new();
    for i in 0..ncells[0] {
        for j in 0..ncells[1] {
            for k in 0..ncells[2] {
                for oz in &off_z {
                    for oy in &off_y {
                        for ox in &off_x {
                            let mut p = Vector3::zeros();
                            p.x = boundlo.x + cellsize * (i as f64 + 0.5 + ox);
                            if dim >= 2 {
                                p.y = boundlo.y + cellsize * (j as f64 + 0.5 + oy);
                            }
                            if dim == 3 {
                                p.z = boundlo.z + cellsize * (k as f64 + 0.5 + oz);
                            }
                            if decomp.owns(&p, &sublo, &subhi) && region.inside(&p, dim) {
                                positions.push(p);
                            }
                        }
                    }
                }
            }
        }
    }

    let base = solid.np_local();
    solid.grow(positions.len());
    for (idx, p) in positions.iter().enumerate() {
        let ip = base + idx;
        solid.x[ip] = *p;
        solid.x0[ip] = *p;
        solid.vol0[ip] = vol_p;
        solid.vol[ip] = vol_p;
        solid.rho0[ip] = mat.rho0;
        solid.rho[ip] = mat.rho0;
        solid.mass[ip] = mass_p;

        match cpdi {
            Some(CpdiStyle::R4) => {
                // Domain basis vectors along the coordinate axes; the
                // third direction is (0, 0, lp).
                for a in 0..dim {
                    let mut r = Vector3::zeros();
                    r[a] = lp;
                    solid.rp0[dim * ip + a] = r;
                    solid.rp[dim * ip + a] = r;
                }
            }
            Some(CpdiStyle::Q4) => {
                let nc = solid.nc;
                let corners: Vec<Vector3<f64>> = match dim {
                    1 => vec![
                        p + Vector3::new(-lp, 0.0, 0.0),
                        p + Vector3::new(lp, 0.0, 0.0),
                    ],
                    2 => vec![
                        p + Vector3::new(-lp, -lp, 0.0),
                        p + Vector3::new(lp, -lp, 0.0),
                        p + Vector3::new(lp, lp, 0.0),
                        p + Vector3::new(-lp, lp, 0.0),
                    ],
                    _ => {
                        // Rejected at method setup; unreachable here.
                        vec![Vector3::zeros(); nc]
                    }
                };
                for (c, corner) in corners.into_iter().enumerate() {
                    solid.xpc0[nc * ip + c] = corner;
                    solid.xpc[nc * ip + c] = corner;
                }
            }
            None => {}
        }
    }

    solid.vtot = solid.vol.iter().sum();
    log::info!(
        "solid '{}': populated {} local particles (nip {}, cellsize {})",
        solid.id,
        positions.len(),
        nip,
        cellsize
    );
    Ok(positions.len())
}

/// Stamp globally unique tags: lower ranks get lower tags, starting at 1.
pub fn assign_tags(solid: &mut Solid, decomp: &Decomp, np_locals: &[usize]) -> Result<()> {
    if np_locals.len() != decomp.nranks {
        return Err(MpmError::config(format!(
            "tag assignment expects {} per-rank counts, got {}",
            decomp.nranks,
            np_locals.len()
        )));
    }
    if np_locals[decomp.rank] != solid.np_local() {
        return Err(MpmError::config(
            "tag assignment count does not match local particle count",
        ));
    }
    let base = decomp.tag_base(np_locals);
    for (i, tag) in solid.ptag.iter_mut().enumerate() {
        *tag = base + i as u64;
    }
    solid.np = np_locals.iter().map(|&n| n as u64).sum();
    if solid.np == 0 {
        return Err(MpmError::config(format!(
            "solid '{}' does not have any particles",
            solid.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn setup(dim: usize, bounds: &[f64]) -> (Domain, Region) {
        let mut domain = Domain::new();
        domain.set_dimension(dim).unwrap();
        domain.set_box(bounds).unwrap();
        let region = Region::block(bounds, dim).unwrap();
        (domain, region)
    }

    #[test]
    fn unit_cube_one_point_per_cell() {
        let (domain, region) = setup(3, &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        let mat = Material::neo_hookean("m", 1.0, 1.0, 0.0).unwrap();
        let decomp = Decomp::serial();
        let mut solid = Solid::new("cube", 0, 0, 0, 3);
        let n = populate(
            &mut solid, &region, &domain, &decomp, 0.1, &mat, 1, None, false,
        )
        .unwrap();
        assert_eq!(n, 1000);
        assert_relative_eq!(solid.vtot, 1.0, epsilon = 1e-12);
        assert_relative_eq!(solid.total_mass(), 1.0, epsilon = 1e-12);

        assign_tags(&mut solid, &decomp, &[n]).unwrap();
        assert_eq!(solid.ptag[0], 1);
        assert_eq!(solid.ptag[999], 1000);
        assert_eq!(solid.np, 1000);
    }

    #[test]
    fn quadratic_order_places_2_pow_dim_points() {
        let (domain, region) = setup(2, &[0.0, 1.0, 0.0, 1.0]);
        let mat = Material::neo_hookean("m", 1.0, 1.0, 0.0).unwrap();
        let decomp = Decomp::serial();
        let mut solid = Solid::new("sq", 0, 0, 0, 2);
        let n = populate(
            &mut solid, &region, &domain, &decomp, 0.5, &mat, 2, None, false,
        )
        .unwrap();
        // 2x2 cells, 4 points per cell.
        assert_eq!(n, 16);
        // Gauss offsets: first point of the first cell at
        // 0.5 * (0.5 - 1/(2 sqrt(3))).
        let xi = 0.5 / 3.0_f64.sqrt();
        assert_relative_eq!(solid.x[0].x, 0.5 * (0.5 - xi), epsilon = 1e-12);
        assert_relative_eq!(solid.vtot, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn region_predicate_filters_points() {
        let (domain, _full) = setup(2, &[0.0, 1.0, 0.0, 1.0]);
        // Solid occupies the left half only.
        let region = Region::block(&[0.0, 0.5, 0.0, 1.0], 2).unwrap();
        let mat = Material::neo_hookean("m", 1.0, 1.0, 0.0).unwrap();
        let decomp = Decomp::serial();
        let mut solid = Solid::new("half", 0, 0, 0, 2);
        let n = populate(
            &mut solid, &region, &domain, &decomp, 0.25, &mat, 1, None, false,
        )
        .unwrap();
        assert_eq!(n, 8);
        assert!(solid.x.iter().all(|p| p.x < 0.5));
    }

    #[test]
    fn four_ranks_partition_without_overlap() {
        let (domain, region) = setup(3, &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        let mat = Material::neo_hookean("m", 1.0, 1.0, 0.0).unwrap();

        let mut counts = Vec::new();
        let mut solids = Vec::new();
        for rank in 0..4 {
            let decomp = Decomp::new(rank, 4).unwrap();
            let mut solid = Solid::new("slab", 0, 0, 0, 3);
            let n = populate(
                &mut solid, &region, &domain, &decomp, 0.125, &mat, 1, None, false,
            )
            .unwrap();
            counts.push(n);
            solids.push(solid);
        }
        assert_eq!(counts.iter().sum::<usize>(), 512);

        let mut tags = std::collections::BTreeSet::new();
        for (rank, solid) in solids.iter_mut().enumerate() {
            let decomp = Decomp::new(rank, 4).unwrap();
            assign_tags(solid, &decomp, &counts).unwrap();
            for &t in &solid.ptag {
                assert!(tags.insert(t), "duplicate tag {t}");
            }
            assert_eq!(solid.np, 512);
        }
        assert_eq!(tags.len(), 512);
        assert_eq!(*tags.iter().next().unwrap(), 1);
        assert_eq!(*tags.iter().last().unwrap(), 512);
    }

    #[test]
    fn cpdi_r4_domain_vectors() {
        let (domain, region) = setup(3, &[0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        let mat = Material::neo_hookean("m", 1.0, 1.0, 0.0).unwrap();
        let decomp = Decomp::serial();
        let mut solid = Solid::new("c", 0, 0, CpdiStyle::corners(3), 3);
        populate(
            &mut solid,
            &region,
            &domain,
            &decomp,
            0.5,
            &mat,
            1,
            Some(CpdiStyle::R4),
            true,
        )
        .unwrap();
        let lp = 0.25;
        assert_relative_eq!(solid.rp0[0].x, lp);
        assert_relative_eq!(solid.rp0[1].y, lp);
        // Third basis direction points along z.
        assert_relative_eq!(solid.rp0[2].z, lp);
        assert_relative_eq!(solid.rp0[2].x, 0.0);
    }
}
