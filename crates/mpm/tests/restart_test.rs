//! Restart round trips: state written mid-run must reload tag-for-tag
//! and continue to the same trajectory.

use mpm::input;
use mpm::simulation::Simulation;

const SETUP: &str = "\
dimension 2
domain 0 1 0 1
method ulmpm shape quadratic-spline
region blob block 0.2 0.8 0.4 0.8
material elast neo-hookean 1000 1e5 0.3
solid body blob 2 elast 0.1
fix g body_force all 0 -9.81 0
timestep 1e-5
";

fn restart_path(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join("mpm_restart_it");
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

#[test]
fn round_trip_preserves_every_field() {
    let mut sim = Simulation::serial();
    input::run_script(&mut sim, SETUP).unwrap();
    sim.run(10).unwrap();

    let path = restart_path("state.json");
    sim.save_restart(&path).unwrap();

    let mut restored = Simulation::serial();
    input::run_script(&mut restored, SETUP).unwrap();
    restored.load_restart(&path).unwrap();

    assert_eq!(restored.ntimestep, sim.ntimestep);
    assert_eq!(restored.dt, sim.dt);
    let (a, b) = (&sim.solids[0], &restored.solids[0]);
    assert_eq!(a.ptag, b.ptag);
    for ip in 0..a.np_local() {
        assert_eq!(a.x[ip], b.x[ip]);
        assert_eq!(a.v[ip], b.v[ip]);
        assert_eq!(a.fdef[ip], b.fdef[ip]);
        assert_eq!(a.sigma[ip], b.sigma[ip]);
        assert_eq!(a.strain_el[ip], b.strain_el[ip]);
        assert_eq!(a.eff_plastic_strain[ip], b.eff_plastic_strain[ip]);
        assert_eq!(a.damage[ip], b.damage[ip]);
        assert_eq!(a.damage_init[ip], b.damage_init[ip]);
        assert_eq!(a.mass[ip], b.mass[ip]);
        assert_eq!(a.vol0[ip], b.vol0[ip]);
    }
}

#[test]
fn continued_runs_agree() {
    let mut reference = Simulation::serial();
    input::run_script(&mut reference, SETUP).unwrap();
    reference.run(6).unwrap();

    // Same setup, interrupted after 3 steps and resumed from disk.
    let mut first = Simulation::serial();
    input::run_script(&mut first, SETUP).unwrap();
    first.run(3).unwrap();
    let path = restart_path("mid.json");
    first.save_restart(&path).unwrap();

    let mut resumed = Simulation::serial();
    input::run_script(&mut resumed, SETUP).unwrap();
    resumed.load_restart(&path).unwrap();
    resumed.run(3).unwrap();

    assert_eq!(resumed.ntimestep, reference.ntimestep);
    let (a, b) = (&reference.solids[0], &resumed.solids[0]);
    for ip in 0..a.np_local() {
        let dx = (a.x[ip] - b.x[ip]).norm();
        let dv = (a.v[ip] - b.v[ip]).norm();
        assert!(dx < 1e-12, "particle {ip} position diverged by {dx}");
        assert!(dv < 1e-9, "particle {ip} velocity diverged by {dv}");
    }
}

#[test]
fn restart_command_writes_on_schedule() {
    let pattern = restart_path("auto_*.json");
    let script = format!("{SETUP}restart 5 {}\n", pattern.to_str().unwrap());
    let mut sim = Simulation::serial();
    input::run_script(&mut sim, &script).unwrap();
    sim.run(10).unwrap();
    assert!(restart_path("auto_5.json").exists());
    assert!(restart_path("auto_10.json").exists());
}
