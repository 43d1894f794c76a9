//! Multi-rank population: a slab split across four ranks must produce a
//! gap-free, duplicate-free tag sequence.

use std::collections::BTreeSet;

use mpm::decomp::Decomp;
use mpm::domain::Domain;
use mpm::material::Material;
use mpm::populate::{assign_tags, populate};
use mpm::region::Region;
use mpm::solid::Solid;

#[test]
fn hundred_thousand_tags_across_four_ranks() {
    let bounds = [0.0, 1.0, 0.0, 1.0, 0.0, 0.8];
    let mut domain = Domain::new();
    domain.set_dimension(3).unwrap();
    domain.set_box(&bounds).unwrap();
    let region = Region::block(&bounds, 3).unwrap();
    let mat = Material::neo_hookean("m", 2700.0, 70.0e9, 0.3).unwrap();

    // 50 x 50 x 40 cells, one integration point each.
    let nranks = 4;
    let mut counts = Vec::new();
    let mut solids = Vec::new();
    for rank in 0..nranks {
        let decomp = Decomp::new(rank, nranks).unwrap();
        let mut solid = Solid::new("slab", 0, 0, 0, 3);
        let n = populate(
            &mut solid, &region, &domain, &decomp, 0.02, &mat, 1, None, false,
        )
        .unwrap();
        counts.push(n);
        solids.push(solid);
    }

    let total: usize = counts.iter().sum();
    assert_eq!(total, 100_000);
    // Column counts differ by one cell layer at most between ranks.
    assert!(counts.iter().all(|&n| n > 0), "counts {counts:?}");
    assert!(
        counts.iter().all(|&n| (24_000..=26_000).contains(&n)),
        "counts {counts:?}"
    );

    let mut tags: BTreeSet<u64> = BTreeSet::new();
    for (rank, solid) in solids.iter_mut().enumerate() {
        let decomp = Decomp::new(rank, nranks).unwrap();
        assign_tags(solid, &decomp, &counts).unwrap();
        assert_eq!(solid.np, 100_000);
        for &tag in &solid.ptag {
            assert!(tags.insert(tag), "duplicate tag {tag}");
        }
    }
    assert_eq!(tags.len(), 100_000);
    assert_eq!(tags.first().copied(), Some(1));
    assert_eq!(tags.last().copied(), Some(100_000));
}

#[test]
fn rank_masses_sum_to_the_whole() {
    let bounds = [0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
    let mut domain = Domain::new();
    domain.set_dimension(3).unwrap();
    domain.set_box(&bounds).unwrap();
    let region = Region::block(&bounds, 3).unwrap();
    let mat = Material::neo_hookean("m", 1000.0, 1.0e6, 0.3).unwrap();

    let mut total = 0.0;
    for rank in 0..3 {
        let decomp = Decomp::new(rank, 3).unwrap();
        let mut solid = Solid::new("s", 0, 0, 0, 3);
        populate(
            &mut solid, &region, &domain, &decomp, 0.1, &mat, 1, None, false,
        )
        .unwrap();
        total += solid.total_mass();
    }
    // Unit cube of rho = 1000.
    assert!((total - 1000.0).abs() < 1e-9 * 1000.0);
}
