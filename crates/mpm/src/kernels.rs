//! Shape-function families for particle/node interpolation.
//!
//! Weights are evaluated per axis and tensor-multiplied by the neighbor
//! builder in `solid.rs`. All families are parameterized by the cell size
//! of the grid they interpolate on; Bernstein-quadratic nodes live on a
//! half-cell lattice (corner/center alternating), the rest on cell corners.

use crate::error::{MpmError, Result};

/// Interpolation kernel family between particles and grid nodes.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ShapeFunction {
    #[default]
    Linear,
    QuadraticSpline,
    CubicSpline,
    BernsteinQuadratic,
}

impl ShapeFunction {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "linear" => Ok(ShapeFunction::Linear),
            "quadratic-spline" => Ok(ShapeFunction::QuadraticSpline),
            "cubic-spline" => Ok(ShapeFunction::CubicSpline),
            "Bernstein-quadratic" => Ok(ShapeFunction::BernsteinQuadratic),
            other => Err(MpmError::config(format!(
                "unknown shape function '{other}'"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShapeFunction::Linear => "linear",
            ShapeFunction::QuadraticSpline => "quadratic-spline",
            ShapeFunction::CubicSpline => "cubic-spline",
            ShapeFunction::BernsteinQuadratic => "Bernstein-quadratic",
        }
    }

    /// Nodes per cell edge: Bernstein carries an extra mid-cell node.
    pub fn nodes_per_cell(&self) -> usize {
        match self {
            ShapeFunction::BernsteinQuadratic => 2,
            _ => 1,
        }
    }

    /// Lattice padding (cells per side) required so that the partition of
    /// unity holds up to the box faces. The splines reach past the cell
    /// containing the particle; linear and Bernstein are cell-local.
    pub fn padding(&self) -> usize {
        match self {
            ShapeFunction::QuadraticSpline | ShapeFunction::CubicSpline => 1,
            _ => 0,
        }
    }

    /// Scalar of the (diagonal) APIC inertia tensor for this family.
    pub fn apic_inertia(&self, cellsize: f64) -> f64 {
        let inv_h2 = 1.0 / (cellsize * cellsize);
        match self {
            ShapeFunction::Linear => 16.0 / 3.0 * inv_h2,
            ShapeFunction::QuadraticSpline => 4.0 * inv_h2,
            ShapeFunction::CubicSpline => 3.0 * inv_h2,
            ShapeFunction::BernsteinQuadratic => 12.0 * inv_h2,
        }
    }

    /// One-axis weights and gradients for a particle at coordinate `x`.
    ///
    /// `origin` is the lattice origin (box low minus padding), `cellsize`
    /// the cell edge, `nnodes` the node count along this axis. Pushes
    /// `(node index, w, dw/dx)` tuples; zero-weight nodes of the particle's
    /// cell are kept because their gradients still act on it.
    pub fn axis_weights(
        &self,
        x: f64,
        origin: f64,
        cellsize: f64,
        nnodes: usize,
        out: &mut Vec<(usize, f64, f64)>,
    ) {
        let gx = (x - origin) / cellsize;
        let inv_h = 1.0 / cellsize;
        match self {
            ShapeFunction::Linear => {
                let ncells = nnodes - 1;
                let cell = (gx.floor() as i64).clamp(0, ncells as i64 - 1) as usize;
                let t = gx - cell as f64;
                out.push((cell, 1.0 - t, -inv_h));
                out.push((cell + 1, t, inv_h));
            }
            ShapeFunction::QuadraticSpline => {
                let base = gx.round() as i64;
                for i in (base - 1)..=(base + 1) {
                    if i < 0 || i >= nnodes as i64 {
                        continue;
                    }
                    let r = gx - i as f64;
                    out.push((i as usize, bspline2(r), dbspline2(r) * inv_h));
                }
            }
            ShapeFunction::CubicSpline => {
                let base = gx.floor() as i64;
                for i in (base - 1)..=(base + 2) {
                    if i < 0 || i >= nnodes as i64 {
                        continue;
                    }
                    let r = gx - i as f64;
                    out.push((i as usize, bspline3(r), dbspline3(r) * inv_h));
                }
            }
            ShapeFunction::BernsteinQuadratic => {
                // Node lattice at half-cell spacing: even indices are cell
                // corners, odd indices cell centers.
                let ncells = (nnodes - 1) / 2;
                let cell = (gx.floor() as i64).clamp(0, ncells as i64 - 1) as usize;
                let t = gx - cell as f64;
                out.push((2 * cell, (1.0 - t) * (1.0 - t), -2.0 * (1.0 - t) * inv_h));
                let s = t - 0.5;
                out.push((2 * cell + 1, 0.5 - 2.0 * s * s, -4.0 * s * inv_h));
                out.push((2 * cell + 2, t * t, 2.0 * t * inv_h));
            }
        }
    }
}

#[inline]
fn bspline2(r: f64) -> f64 {
    let a = r.abs();
    if a < 0.5 {
        0.75 - a * a
    } else if a < 1.5 {
        let t = 1.5 - a;
        0.5 * t * t
    } else {
        0.0
    }
}

#[inline]
fn dbspline2(r: f64) -> f64 {
    let a = r.abs();
    if a < 0.5 {
        -2.0 * r
    } else if a < 1.5 {
        -(1.5 - a) * r.signum()
    } else {
        0.0
    }
}

#[inline]
fn bspline3(r: f64) -> f64 {
    let a = r.abs();
    if a < 1.0 {
        2.0 / 3.0 - a * a + 0.5 * a * a * a
    } else if a < 2.0 {
        let t = 2.0 - a;
        t * t * t / 6.0
    } else {
        0.0
    }
}

#[inline]
fn dbspline3(r: f64) -> f64 {
    let a = r.abs();
    if a < 1.0 {
        -2.0 * r + 1.5 * r * a
    } else if a < 2.0 {
        let t = 2.0 - a;
        -0.5 * t * t * r.signum()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sum_weights(shape: ShapeFunction, x: f64, nnodes: usize) -> (f64, f64) {
        let mut out = Vec::new();
        shape.axis_weights(x, 0.0, 1.0, nnodes, &mut out);
        let w: f64 = out.iter().map(|e| e.1).sum();
        let dw: f64 = out.iter().map(|e| e.2).sum();
        (w, dw)
    }

    #[test]
    fn partition_of_unity_all_families() {
        // Interior sweep; spline lattices get padding from the grid, so an
        // 11-node axis with samples in [1.1, 8.9] mimics a padded box.
        for shape in [
            ShapeFunction::Linear,
            ShapeFunction::QuadraticSpline,
            ShapeFunction::CubicSpline,
        ] {
            for i in 0..200 {
                let x = 1.1 + 7.8 * (i as f64) / 199.0;
                let (w, dw) = sum_weights(shape, x, 11);
                assert_relative_eq!(w, 1.0, epsilon = 1e-12);
                assert_relative_eq!(dw, 0.0, epsilon = 1e-11);
            }
        }
        // Bernstein on its half-spacing lattice (4 cells -> 9 nodes).
        for i in 0..200 {
            let x = 0.01 + 3.98 * (i as f64) / 199.0;
            let (w, dw) = sum_weights(ShapeFunction::BernsteinQuadratic, x, 9);
            assert_relative_eq!(w, 1.0, epsilon = 1e-12);
            assert_relative_eq!(dw, 0.0, epsilon = 1e-11);
        }
    }

    #[test]
    fn linear_keeps_zero_weight_gradient_node() {
        // A particle sitting exactly on a node still sees the far node of
        // its cell through the gradient.
        let mut out = Vec::new();
        ShapeFunction::Linear.axis_weights(0.0, 0.0, 1.0, 2, &mut out);
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out[0].1, 1.0);
        assert_relative_eq!(out[0].2, -1.0);
        assert_relative_eq!(out[1].1, 0.0);
        assert_relative_eq!(out[1].2, 1.0);
    }

    #[test]
    fn quadratic_spline_values() {
        assert_relative_eq!(bspline2(0.0), 0.75);
        assert_relative_eq!(bspline2(0.5), 0.5);
        assert_relative_eq!(bspline2(1.5), 0.0);
        assert_relative_eq!(bspline2(-0.25), bspline2(0.25));
    }

    #[test]
    fn cubic_spline_values() {
        assert_relative_eq!(bspline3(0.0), 2.0 / 3.0);
        assert_relative_eq!(bspline3(1.0), 1.0 / 6.0);
        assert_relative_eq!(bspline3(2.0), 0.0);
        assert_relative_eq!(dbspline3(0.0), 0.0);
    }

    #[test]
    fn apic_inertia_constants() {
        let h = 0.5;
        assert_relative_eq!(
            ShapeFunction::Linear.apic_inertia(h),
            16.0 / 3.0 / (h * h)
        );
        assert_relative_eq!(ShapeFunction::QuadraticSpline.apic_inertia(h), 16.0);
        assert_relative_eq!(ShapeFunction::CubicSpline.apic_inertia(h), 12.0);
        assert_relative_eq!(ShapeFunction::BernsteinQuadratic.apic_inertia(h), 48.0);
    }
}
