//! Convected particle domain interpolation.
//!
//! Particles carry a domain (a parallelepiped spanned by vectors `rp` for
//! CPDI-R4, or explicit corner positions `xpc` for CPDI-Q4) and their
//! grid weights are domain averages of the linear grid basis: the scalar
//! weight is the corner average, the gradient comes from the divergence
//! theorem over the domain boundary. Both styles require the linear shape
//! family on the grid.

use nalgebra::Vector3;

use crate::grid::Grid;
use crate::kernels::ShapeFunction;

/// CPDI flavor: R4 carries per-axis domain vectors, Q4 explicit corners.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CpdiStyle {
    R4,
    Q4,
}

impl CpdiStyle {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "R4" => Some(CpdiStyle::R4),
            "Q4" => Some(CpdiStyle::Q4),
            _ => None,
        }
    }

    /// Corners a particle domain carries in `dim` dimensions.
    pub fn corners(dim: usize) -> usize {
        1 << dim
    }
}

/// Linear grid-basis weights at an arbitrary point (no gradients).
fn point_weights(grid: &Grid, dim: usize, x: &Vector3<f64>) -> Vec<(usize, f64)> {
    let shape = ShapeFunction::Linear;
    let mut per_axis: [Vec<(usize, f64, f64)>; 3] = Default::default();
    for (a, axis) in per_axis.iter_mut().enumerate().take(dim) {
        shape.axis_weights(x[a], grid.origin[a], grid.cellsize, grid.nn[a], axis);
    }
    for axis in per_axis.iter_mut().skip(dim) {
        axis.push((0, 1.0, 0.0));
    }

    let mut out = Vec::with_capacity(8);
    for &(k, wz, _) in &per_axis[2] {
        for &(j, wy, _) in &per_axis[1] {
            for &(i, wx, _) in &per_axis[0] {
                out.push((grid.node_index(i, j, k), wx * wy * wz));
            }
        }
    }
    out
}

fn accumulate(
    out: &mut Vec<(usize, f64, Vector3<f64>)>,
    node: usize,
    w: f64,
    grad: Vector3<f64>,
) {
    if let Some(entry) = out.iter_mut().find(|e| e.0 == node) {
        entry.1 += w;
        entry.2 += grad;
    } else {
        out.push((node, w, grad));
    }
}

fn rot90(v: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(v.y, -v.x, 0.0)
}

/// CPDI-R4 weights for a particle at `x` with domain vectors
/// `rp[0..dim]`. Pushes `(node, wf, wfd)` entries.
pub fn r4_weights(
    x: &Vector3<f64>,
    rp: &[Vector3<f64>],
    grid: &Grid,
    dim: usize,
    out: &mut Vec<(usize, f64, Vector3<f64>)>,
) {
    out.clear();
    let nc = CpdiStyle::corners(dim);
    let share = 1.0 / nc as f64;

    // Corner positions and their grid weights, indexed by the sign bits
    // of each domain vector.
    let mut corner_weights: Vec<Vec<(usize, f64)>> = Vec::with_capacity(nc);
    for c in 0..nc {
        let mut xc = *x;
        for (a, r) in rp.iter().enumerate().take(dim) {
            let s = if c & (1 << a) != 0 { 1.0 } else { -1.0 };
            xc += *r * s;
        }
        let weights = point_weights(grid, dim, &xc);
        for &(node, w) in &weights {
            accumulate(out, node, share * w, Vector3::zeros());
        }
        corner_weights.push(weights);
    }

    // Boundary integral: one outward area vector per +/- face pair along
    // each domain direction, times the face-mean basis difference.
    let (vp, area): (f64, Vec<Vector3<f64>>) = match dim {
        1 => (2.0 * rp[0].x.abs(), vec![Vector3::new(rp[0].x.signum(), 0.0, 0.0)]),
        2 => {
            let cross = rp[0].x * rp[1].y - rp[0].y * rp[1].x;
            let mut n1 = 2.0 * rot90(&rp[1]);
            if n1.dot(&rp[0]) < 0.0 {
                n1 = -n1;
            }
            let mut n2 = 2.0 * rot90(&rp[0]);
            if n2.dot(&rp[1]) < 0.0 {
                n2 = -n2;
            }
            (4.0 * cross.abs(), vec![n1, n2])
        }
        _ => {
            let vol = rp[0].dot(&rp[1].cross(&rp[2]));
            let mut faces = vec![
                4.0 * rp[1].cross(&rp[2]),
                4.0 * rp[2].cross(&rp[0]),
                4.0 * rp[0].cross(&rp[1]),
            ];
            for (a, face) in faces.iter_mut().enumerate() {
                if face.dot(&rp[a]) < 0.0 {
                    *face = -*face;
                }
            }
            (8.0 * vol.abs(), faces)
        }
    };

    for a in 0..dim {
        let face_corners = nc / 2;
        for (c, weights) in corner_weights.iter().enumerate() {
            let sign = if c & (1 << a) != 0 { 1.0 } else { -1.0 };
            let scale = sign * (1.0 / face_corners as f64) / vp;
            for &(node, w) in weights {
                accumulate(out, node, 0.0, area[a] * (scale * w));
            }
        }
    }
}

/// CPDI-Q4 weights for a particle whose domain corners are `xpc`
/// (2 corners in 1-D, 4 counter-clockwise corners in 2-D).
pub fn q4_weights(
    xpc: &[Vector3<f64>],
    grid: &Grid,
    dim: usize,
    out: &mut Vec<(usize, f64, Vector3<f64>)>,
) {
    out.clear();
    let nc = CpdiStyle::corners(dim);
    let share = 1.0 / nc as f64;

    let corner_weights: Vec<Vec<(usize, f64)>> = xpc
        .iter()
        .take(nc)
        .map(|xc| point_weights(grid, dim, xc))
        .collect();
    for weights in &corner_weights {
        for &(node, w) in weights {
            accumulate(out, node, share * w, Vector3::zeros());
        }
    }

    match dim {
        1 => {
            let len = xpc[1].x - xpc[0].x;
            for &(node, w) in &corner_weights[1] {
                accumulate(out, node, 0.0, Vector3::new(w / len, 0.0, 0.0));
            }
            for &(node, w) in &corner_weights[0] {
                accumulate(out, node, 0.0, Vector3::new(-w / len, 0.0, 0.0));
            }
        }
        2 => {
            // Signed shoelace area; raw edge normals flip with it, so the
            // ratio is orientation-independent.
            let mut area = 0.0;
            for e in 0..4 {
                let a = &xpc[e];
                let b = &xpc[(e + 1) % 4];
                area += a.x * b.y - b.x * a.y;
            }
            area *= 0.5;
            for e in 0..4 {
                let ia = e;
                let ib = (e + 1) % 4;
                let edge = xpc[ib] - xpc[ia];
                let normal = Vector3::new(edge.y, -edge.x, 0.0);
                for &(node, w) in &corner_weights[ia] {
                    accumulate(out, node, 0.0, normal * (0.5 * w / area));
                }
                for &(node, w) in &corner_weights[ib] {
                    accumulate(out, node, 0.0, normal * (0.5 * w / area));
                }
            }
        }
        _ => unreachable!("CPDI-Q4 is restricted to 1-D and 2-D at setup"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid_2d() -> Grid {
        let mut g = Grid::new();
        g.setup(1.0).unwrap();
        g.init(
            Vector3::zeros(),
            Vector3::new(10.0, 10.0, 0.0),
            2,
            ShapeFunction::Linear,
        )
        .unwrap();
        g
    }

    #[test]
    fn r4_partition_of_unity() {
        let g = grid_2d();
        let x = Vector3::new(4.3, 5.7, 0.0);
        let rp = [
            Vector3::new(0.3, 0.05, 0.0),
            Vector3::new(-0.04, 0.25, 0.0),
        ];
        let mut out = Vec::new();
        r4_weights(&x, &rp, &g, 2, &mut out);

        let wsum: f64 = out.iter().map(|e| e.1).sum();
        let gsum: Vector3<f64> = out.iter().map(|e| e.2).sum();
        assert_relative_eq!(wsum, 1.0, epsilon = 1e-12);
        assert!(gsum.norm() < 1e-12);
    }

    #[test]
    fn r4_gradient_reproduces_linear_field() {
        // Nodal values phi_I = x_I . k give grad = k when averaged over
        // the particle domain.
        let g = grid_2d();
        let x = Vector3::new(3.4, 6.2, 0.0);
        let rp = [Vector3::new(0.25, 0.0, 0.0), Vector3::new(0.0, 0.2, 0.0)];
        let mut out = Vec::new();
        r4_weights(&x, &rp, &g, 2, &mut out);

        let k = Vector3::new(2.0, -3.0, 0.0);
        let mut grad = Vector3::zeros();
        for &(node, _, wfd) in &out {
            grad += wfd * g.x0[node].dot(&k);
        }
        assert_relative_eq!(grad.x, k.x, epsilon = 1e-10);
        assert_relative_eq!(grad.y, k.y, epsilon = 1e-10);
    }

    #[test]
    fn q4_partition_of_unity_and_linear_field() {
        let g = grid_2d();
        let c = Vector3::new(5.1, 4.9, 0.0);
        let lp = 0.22;
        let xpc = [
            c + Vector3::new(-lp, -lp, 0.0),
            c + Vector3::new(lp, -lp, 0.0),
            c + Vector3::new(lp, lp, 0.0),
            c + Vector3::new(-lp, lp, 0.0),
        ];
        let mut out = Vec::new();
        q4_weights(&xpc, &g, 2, &mut out);

        let wsum: f64 = out.iter().map(|e| e.1).sum();
        assert_relative_eq!(wsum, 1.0, epsilon = 1e-12);

        let k = Vector3::new(-1.5, 0.75, 0.0);
        let mut grad = Vector3::zeros();
        for &(node, _, wfd) in &out {
            grad += wfd * g.x0[node].dot(&k);
        }
        assert_relative_eq!(grad.x, k.x, epsilon = 1e-10);
        assert_relative_eq!(grad.y, k.y, epsilon = 1e-10);
    }

    #[test]
    fn r4_1d_weights() {
        let mut g = Grid::new();
        g.setup(1.0).unwrap();
        g.init(
            Vector3::zeros(),
            Vector3::new(4.0, 0.0, 0.0),
            1,
            ShapeFunction::Linear,
        )
        .unwrap();
        let x = Vector3::new(1.5, 0.0, 0.0);
        let rp = [Vector3::new(0.25, 0.0, 0.0)];
        let mut out = Vec::new();
        r4_weights(&x, &rp, &g, 1, &mut out);
        let wsum: f64 = out.iter().map(|e| e.1).sum();
        assert_relative_eq!(wsum, 1.0, epsilon = 1e-12);
        // Linear field d/dx.
        let mut grad = 0.0;
        for &(node, _, wfd) in &out {
            grad += wfd.x * g.x0[node].x * 3.0;
        }
        assert_relative_eq!(grad, 3.0, epsilon = 1e-12);
    }
}
