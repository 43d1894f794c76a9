//! 1-D uniaxial stretch of a single-particle bar, driven by a fixed
//! nodal velocity at the free end.

use mpm::input;
use mpm::simulation::Simulation;

const SCRIPT: &str = "\
dimension 1
domain 0 1
method tlmpm musl flip 1.0 shape linear
region bar block 0 1
material elast neo-hookean 1.0 1.0 0.0
solid rod bar 1 elast 1.0
region rend block 0.9 1.1
region lend block -0.1 0.1
group rn nodes region rend
group ln nodes region lend
fix pull velocity_nodes rn 0.01 NULL NULL
fix hold velocity_nodes ln 0.0 NULL NULL
timestep 1.0
";

#[test]
fn stretch_doubles_the_deformation_gradient() {
    let mut sim = Simulation::serial();
    input::run_script(&mut sim, SCRIPT).unwrap();

    // One particle at the cell center, two nodes at 0 and 1.
    assert_eq!(sim.solids[0].np, 1);
    assert_eq!(sim.grids[0].nnodes, 2);
    assert!((sim.solids[0].x[0].x - 0.5).abs() < 1e-12);

    sim.run(100).unwrap();

    let solid = &sim.solids[0];
    // The driven end moves at 0.01 per unit time against a held end one
    // cell away, so F_xx grows by 0.01 each unit of time.
    let f_xx = solid.fdef[0][(0, 0)];
    assert!((f_xx - 2.0).abs() < 1e-6, "F_xx = {f_xx}");
    assert!((solid.jdet[0] - 2.0).abs() < 1e-6);

    // Tension: positive axial Cauchy stress, G (F - F^-T) with G = 0.5.
    let sigma_xx = solid.sigma[0][(0, 0)];
    assert!((sigma_xx - 0.75).abs() < 1e-6, "sigma_xx = {sigma_xx}");

    // Volume and density follow J.
    assert!((solid.vol[0] - 2.0 * solid.vol0[0]).abs() < 1e-9);
    assert!((solid.rho[0] - solid.rho0[0] / 2.0).abs() < 1e-9);
}

#[test]
fn unloaded_bar_stays_at_identity() {
    let script = "\
dimension 1
domain 0 1
method tlmpm musl shape linear
region bar block 0 1
material elast neo-hookean 1.0 1.0 0.0
solid rod bar 1 elast 1.0
timestep 0.01
";
    let mut sim = Simulation::serial();
    input::run_script(&mut sim, script).unwrap();
    sim.run(10).unwrap();

    let solid = &sim.solids[0];
    assert!((solid.fdef[0][(0, 0)] - 1.0).abs() < 1e-14);
    assert!(solid.sigma[0].norm() < 1e-14);
    assert!((solid.x[0].x - 0.5).abs() < 1e-14);
}
