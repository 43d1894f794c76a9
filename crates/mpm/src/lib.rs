//! Parallel material point method solver for large-deformation solid
//! mechanics.
//!
//! Lagrangian particles carry the material state (deformation gradient,
//! stress, plastic strain, damage) and exchange momentum with a
//! background grid every timestep. Total-Lagrangian variants keep the
//! grid in the reference configuration; updated-Lagrangian variants share
//! one grid over the problem box. CPDI variants extend each particle's
//! influence over a convected domain.
//!
//! # Example
//!
//! ```
//! use mpm::input;
//! use mpm::simulation::Simulation;
//!
//! let mut sim = Simulation::serial();
//! input::run_script(
//!     &mut sim,
//!     "dimension 3\n\
//!      domain 0 1 0 1 0 1\n\
//!      method ulmpm shape linear\n\
//!      region cube block 0 1 0 1 0 1\n\
//!      material elast neo-hookean 1000 1e6 0.3\n\
//!      solid body cube 1 elast 0.25\n\
//!      timestep 1e-6\n\
//!      run 3\n",
//! )
//! .unwrap();
//! assert_eq!(sim.solids[0].np, 64);
//! ```

pub mod cpdi;
pub mod damage;
pub mod decomp;
pub mod domain;
pub mod dump;
pub mod eos;
pub mod error;
pub mod fix;
pub mod grid;
pub mod group;
pub mod input;
pub mod kernels;
pub mod material;
pub mod math;
pub mod method;
pub mod populate;
pub mod region;
pub mod restart;
pub mod simulation;
pub mod solid;
pub mod strength;

pub use cpdi::CpdiStyle;
pub use decomp::Decomp;
pub use error::{MpmError, Result};
pub use grid::Grid;
pub use kernels::ShapeFunction;
pub use material::{Material, MaterialRegistry};
pub use method::{FlowVariant, Method, MethodStyle};
pub use region::Region;
pub use simulation::Simulation;
pub use solid::Solid;
