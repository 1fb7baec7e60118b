use glam::Vec3;

use gyrus_model::{compute_node_normals, RoiMask, ScalarField, SurfaceMesh};

use crate::config::GradientOptions;
use crate::error::EngineError;
use crate::neighbors::{NodeNeighbors, MIN_USABLE_NEIGHBORS};
use crate::parallel;
use crate::report::Reporter;

/// Per-column gradient output: one 3-D vector and its Euclidean magnitude
/// per mesh node. Out-of-ROI nodes hold exact zeros.
#[derive(Debug, Clone)]
pub struct GradientOutput {
    pub vectors: Vec<[f32; 3]>,
    pub magnitudes: Vec<f32>,
}

/// Tangent-plane gradient estimator for scalar fields on a surface.
///
/// At each in-ROI node the scalar differences to its in-ROI neighbors are
/// regressed against the neighbor offsets projected into the node's tangent
/// plane; the fitted slopes, re-expressed in 3-D, are the tangential
/// gradient. Ill-posed nodes fall back to an averaged finite-difference
/// estimate, and nodes where that fails too get a zero vector.
pub struct GradientEstimator<'a> {
    mesh: &'a SurfaceMesh,
    neighbors: &'a NodeNeighbors,
    roi: &'a RoiMask,
    normals: Vec<Vec3>,
    parallel: bool,
}

impl<'a> GradientEstimator<'a> {
    pub fn new(
        mesh: &'a SurfaceMesh,
        neighbors: &'a NodeNeighbors,
        roi: &'a RoiMask,
        options: GradientOptions,
    ) -> Result<Self, EngineError> {
        if mesh.node_count() == 0 {
            return Err(EngineError::EmptyInput("surface mesh"));
        }
        if roi.len() != mesh.node_count() {
            return Err(EngineError::NodeCountMismatch {
                what: "ROI mask",
                expected: mesh.node_count(),
                actual: roi.len(),
            });
        }
        if neighbors.node_count() != mesh.node_count() {
            return Err(EngineError::NodeCountMismatch {
                what: "neighbor table",
                expected: mesh.node_count(),
                actual: neighbors.node_count(),
            });
        }

        // Normals are computed once and reused across every column.
        let raw = match &mesh.normals {
            Some(normals) => normals.iter().map(|n| Vec3::from(*n)).collect(),
            None => compute_node_normals(&mesh.positions, &mesh.triangles)
                .into_iter()
                .map(Vec3::from)
                .collect::<Vec<_>>(),
        };
        let normals = if options.average_normals {
            averaged_normals(&raw, neighbors)
        } else {
            raw
        };

        Ok(Self {
            mesh,
            neighbors,
            roi,
            normals,
            parallel: options.parallel,
        })
    }

    /// Gradient of one scalar column.
    pub fn column(&self, values: &[f32], reporter: &Reporter) -> Result<GradientOutput, EngineError> {
        if values.len() != self.mesh.node_count() {
            return Err(EngineError::NodeCountMismatch {
                what: "scalar column",
                expected: self.mesh.node_count(),
                actual: values.len(),
            });
        }

        let node_count = self.mesh.node_count();
        let mut vectors = vec![[0.0f32; 3]; node_count];
        let mut magnitudes = vec![0.0f32; node_count];
        for node in 0..node_count {
            let vector = self.node_gradient(node, values, reporter);
            vectors[node] = vector.to_array();
            magnitudes[node] = vector.length();
        }

        Ok(GradientOutput {
            vectors,
            magnitudes,
        })
    }

    /// Gradient of every column of a field, columns dispatched as
    /// independent parallel tasks.
    pub fn field(
        &self,
        field: &ScalarField,
        reporter: &Reporter,
    ) -> Result<Vec<GradientOutput>, EngineError> {
        if field.node_count() != self.mesh.node_count() {
            return Err(EngineError::NodeCountMismatch {
                what: "scalar field",
                expected: self.mesh.node_count(),
                actual: field.node_count(),
            });
        }
        if field.column_count() == 0 {
            return Err(EngineError::EmptyInput("scalar field"));
        }

        parallel::try_map_indices(field.column_count(), self.parallel, |index| {
            let values = field
                .column(index)
                .ok_or(EngineError::EmptyInput("scalar field column"))?;
            self.column(values, reporter)
        })
    }

    fn node_gradient(&self, node: usize, values: &[f32], reporter: &Reporter) -> Vec3 {
        if !self.roi.is_inside(node) {
            return Vec3::ZERO;
        }

        let normal = self.normals[node];
        let (xhat, yhat) = tangent_frame(normal);
        let center = self.mesh.position(node);
        let center_value = values[node];

        let neighbor_nodes = self.neighbors.neighbors_in_roi(node, self.roi);
        if neighbor_nodes.is_empty() {
            reporter.warn_zero_gradient();
            return Vec3::ZERO;
        }

        if neighbor_nodes.len() >= MIN_USABLE_NEIGHBORS {
            if let Some(gradient) = self.regress(
                &neighbor_nodes,
                center,
                center_value,
                values,
                xhat,
                yhat,
            ) {
                if gradient.is_finite() {
                    return gradient;
                }
            }
        }

        match self.finite_difference(&neighbor_nodes, center, center_value, values, normal) {
            Some(gradient) if gradient.is_finite() => gradient,
            _ => {
                reporter.warn_zero_gradient();
                Vec3::ZERO
            }
        }
    }

    /// Weighted least squares of value differences against tangent-plane
    /// offsets, model `diff = a*x + b*y + c`. Returns the tangential
    /// gradient `a*xhat + b*yhat`, or None when the system is singular.
    fn regress(
        &self,
        neighbor_nodes: &[u32],
        center: Vec3,
        center_value: f32,
        values: &[f32],
        xhat: Vec3,
        yhat: Vec3,
    ) -> Option<Vec3> {
        let mut system = [[0.0f64; 4]; 3];
        for &neighbor in neighbor_nodes {
            let offset = self.mesh.position(neighbor as usize) - center;
            let diff = (values[neighbor as usize] - center_value) as f64;
            let x = offset.dot(xhat) as f64;
            let y = offset.dot(yhat) as f64;
            let weight = 1.0 / (offset.length() as f64).max(1.0e-6);

            system[0][0] += weight * x * x;
            system[0][1] += weight * x * y;
            system[0][2] += weight * x;
            system[0][3] += weight * x * diff;
            system[1][1] += weight * y * y;
            system[1][2] += weight * y;
            system[1][3] += weight * y * diff;
            system[2][2] += weight;
            system[2][3] += weight * diff;
        }
        system[1][0] = system[0][1];
        system[2][0] = system[0][2];
        system[2][1] = system[1][2];

        let solution = solve_3x4(system)?;
        Some(xhat * solution[0] as f32 + yhat * solution[1] as f32)
    }

    /// Fallback: average of per-neighbor directional difference quotients,
    /// with the normal-direction component removed afterwards (projecting
    /// curved-surface offsets leaves an ambiguous normal part).
    fn finite_difference(
        &self,
        neighbor_nodes: &[u32],
        center: Vec3,
        center_value: f32,
        values: &[f32],
        normal: Vec3,
    ) -> Option<Vec3> {
        let mut accum = Vec3::ZERO;
        let mut used = 0;
        for &neighbor in neighbor_nodes {
            let offset = self.mesh.position(neighbor as usize) - center;
            let length = offset.length();
            if length <= 0.0 {
                continue;
            }
            let diff = values[neighbor as usize] - center_value;
            accum += offset * (diff / (length * length));
            used += 1;
        }
        if used == 0 {
            return None;
        }
        let mut average = accum / used as f32;
        average -= normal * average.dot(normal);
        Some(average)
    }
}

/// Two unit vectors orthogonal to `normal` and to each other. The seed axis
/// is chosen against the largest normal components so the first cross
/// product never degenerates on axis-aligned normals.
fn tangent_frame(normal: Vec3) -> (Vec3, Vec3) {
    let seed = if normal.x.abs() > normal.y.abs() {
        Vec3::Y
    } else {
        Vec3::X
    };
    let xhat = normal.cross(seed).normalize_or_zero();
    let yhat = normal.cross(xhat).normalize_or_zero();
    (xhat, yhat)
}

fn averaged_normals(normals: &[Vec3], neighbors: &NodeNeighbors) -> Vec<Vec3> {
    normals
        .iter()
        .enumerate()
        .map(|(node, &normal)| {
            let mut sum = normal;
            for &n in neighbors.direct(node) {
                sum += normals[n as usize];
            }
            let averaged = sum.normalize_or_zero();
            if averaged == Vec3::ZERO {
                normal
            } else {
                averaged
            }
        })
        .collect()
}

/// Partial-pivot Gaussian elimination on a 3x4 augmented system, followed by
/// back substitution. None when a pivot vanishes.
fn solve_3x4(mut m: [[f64; 4]; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let mut pivot_row = col;
        for row in col + 1..3 {
            if m[row][col].abs() > m[pivot_row][col].abs() {
                pivot_row = row;
            }
        }
        if m[pivot_row][col].abs() < 1.0e-12 {
            return None;
        }
        m.swap(col, pivot_row);

        for row in col + 1..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut solution = [0.0f64; 3];
    for row in (0..3).rev() {
        let mut value = m[row][3];
        for col in row + 1..3 {
            value -= m[row][col] * solution[col];
        }
        solution[row] = value / m[row][row];
    }
    Some(solution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gyrus_model::{make_grid, make_uv_sphere};

    fn linear_field(mesh: &SurfaceMesh, gx: f32, gy: f32) -> Vec<f32> {
        mesh.positions
            .iter()
            .map(|p| gx * p[0] + gy * p[1])
            .collect()
    }

    #[test]
    fn solver_inverts_known_system() {
        // x = 1, y = 2, z = 3
        let system = [
            [2.0, 1.0, 1.0, 7.0],
            [1.0, 3.0, 2.0, 13.0],
            [1.0, 0.0, 0.0, 1.0],
        ];
        let solution = solve_3x4(system).expect("solvable");
        assert!((solution[0] - 1.0).abs() < 1.0e-9);
        assert!((solution[1] - 2.0).abs() < 1.0e-9);
        assert!((solution[2] - 3.0).abs() < 1.0e-9);
    }

    #[test]
    fn solver_rejects_singular_system() {
        let system = [
            [1.0, 2.0, 3.0, 1.0],
            [2.0, 4.0, 6.0, 2.0],
            [0.0, 0.0, 0.0, 0.0],
        ];
        assert!(solve_3x4(system).is_none());
    }

    #[test]
    fn tangent_frame_is_orthonormal_for_axis_normals() {
        for normal in [Vec3::X, Vec3::Y, Vec3::Z, Vec3::NEG_Z] {
            let (xhat, yhat) = tangent_frame(normal);
            assert!(xhat.length() > 0.99);
            assert!(yhat.length() > 0.99);
            assert!(xhat.dot(normal).abs() < 1.0e-6);
            assert!(yhat.dot(normal).abs() < 1.0e-6);
            assert!(xhat.dot(yhat).abs() < 1.0e-6);
        }
    }

    #[test]
    fn linear_ramp_recovers_exact_gradient_at_interior_nodes() {
        let mesh = make_grid(5, 5, 1.0);
        let neighbors = NodeNeighbors::build(&mesh);
        let roi = RoiMask::all_ones(25);
        let estimator =
            GradientEstimator::new(&mesh, &neighbors, &roi, GradientOptions::default())
                .expect("estimator");
        let values = linear_field(&mesh, 2.0, 3.0);
        let reporter = Reporter::new();
        let output = estimator.column(&values, &reporter).expect("gradient");

        for iy in 1..4u32 {
            for ix in 1..4u32 {
                let node = (iy * 5 + ix) as usize;
                let v = output.vectors[node];
                assert!((v[0] - 2.0).abs() < 1.0e-3, "node {} vx {}", node, v[0]);
                assert!((v[1] - 3.0).abs() < 1.0e-3, "node {} vy {}", node, v[1]);
                assert!(v[2].abs() < 1.0e-3);
                let expected = (4.0f32 + 9.0).sqrt();
                assert!((output.magnitudes[node] - expected).abs() < 1.0e-3);
            }
        }
        assert!(!reporter.warned_zero_gradient());
    }

    #[test]
    fn constant_field_has_zero_gradient_everywhere() {
        let mesh = make_uv_sphere(10.0, 8, 12);
        let neighbors = NodeNeighbors::build(&mesh);
        let roi = RoiMask::all_ones(mesh.node_count());
        let estimator =
            GradientEstimator::new(&mesh, &neighbors, &roi, GradientOptions::default())
                .expect("estimator");
        let values = vec![7.5f32; mesh.node_count()];
        let output = estimator.column(&values, &Reporter::new()).expect("gradient");
        for magnitude in output.magnitudes {
            assert!(magnitude.abs() < 1.0e-4);
        }
    }

    #[test]
    fn out_of_roi_nodes_are_exactly_zero() {
        let mesh = make_grid(5, 5, 1.0);
        let neighbors = NodeNeighbors::build(&mesh);
        let mut roi_values = vec![1.0f32; 25];
        roi_values[12] = 0.0;
        roi_values[3] = 0.0;
        let roi = RoiMask::from_values(roi_values);
        let estimator =
            GradientEstimator::new(&mesh, &neighbors, &roi, GradientOptions::default())
                .expect("estimator");
        let values = linear_field(&mesh, 1.0, -1.0);
        let output = estimator.column(&values, &Reporter::new()).expect("gradient");
        assert_eq!(output.vectors[12], [0.0, 0.0, 0.0]);
        assert_eq!(output.magnitudes[12], 0.0);
        assert_eq!(output.magnitudes[3], 0.0);
    }

    #[test]
    fn fallback_agrees_in_sign_with_regression_on_ramp() {
        let mesh = make_grid(5, 5, 1.0);
        let neighbors = NodeNeighbors::build(&mesh);
        let roi = RoiMask::all_ones(25);
        let estimator =
            GradientEstimator::new(&mesh, &neighbors, &roi, GradientOptions::default())
                .expect("estimator");
        let values = linear_field(&mesh, 2.0, 3.0);

        let center = mesh.position(12);
        let neighbor_nodes = neighbors.neighbors_in_roi(12, &roi);
        let normal = Vec3::Z;
        let (xhat, yhat) = tangent_frame(normal);
        let regressed = estimator
            .regress(&neighbor_nodes, center, values[12], &values, xhat, yhat)
            .expect("regression");
        let fallback = estimator
            .finite_difference(&neighbor_nodes, center, values[12], &values, normal)
            .expect("fallback");
        // Both point uphill.
        assert!(regressed.x > 0.0 && fallback.x > 0.0);
        assert!(regressed.y > 0.0 && fallback.y > 0.0);
        assert!(regressed.dot(fallback) > 0.0);
    }

    #[test]
    fn isolated_node_warns_once_and_yields_zero() {
        let mut mesh = make_grid(3, 3, 1.0);
        mesh.positions.push([10.0, 10.0, 0.0]);
        mesh.positions.push([20.0, 20.0, 0.0]);
        let neighbors = NodeNeighbors::build(&mesh);
        let roi = RoiMask::all_ones(11);
        let estimator =
            GradientEstimator::new(&mesh, &neighbors, &roi, GradientOptions::default())
                .expect("estimator");
        let values = vec![1.0f32; 11];
        let reporter = Reporter::new();
        assert!(!reporter.warned_zero_gradient());
        let output = estimator.column(&values, &reporter).expect("gradient");
        // Two isolated nodes, one aggregated warning.
        assert_eq!(output.vectors[9], [0.0, 0.0, 0.0]);
        assert_eq!(output.vectors[10], [0.0, 0.0, 0.0]);
        assert!(reporter.warned_zero_gradient());
    }

    #[test]
    fn multi_column_matches_single_column() {
        let mesh = make_grid(4, 4, 1.0);
        let neighbors = NodeNeighbors::build(&mesh);
        let roi = RoiMask::all_ones(16);
        let options = GradientOptions {
            parallel: true,
            ..Default::default()
        };
        let estimator =
            GradientEstimator::new(&mesh, &neighbors, &roi, options).expect("estimator");

        let mut field = ScalarField::new(16);
        field
            .add_column("a", linear_field(&mesh, 1.0, 0.0))
            .expect("column");
        field
            .add_column("b", linear_field(&mesh, 0.0, 2.0))
            .expect("column");

        let reporter = Reporter::new();
        let outputs = estimator.field(&field, &reporter).expect("field gradient");
        assert_eq!(outputs.len(), 2);
        let single = estimator
            .column(field.column(1).expect("column"), &reporter)
            .expect("gradient");
        assert_eq!(outputs[1].magnitudes, single.magnitudes);
    }

    #[test]
    fn averaged_normals_still_recover_ramp_on_flat_grid() {
        let mesh = make_grid(5, 5, 1.0);
        let neighbors = NodeNeighbors::build(&mesh);
        let roi = RoiMask::all_ones(25);
        let options = GradientOptions {
            average_normals: true,
            ..Default::default()
        };
        let estimator =
            GradientEstimator::new(&mesh, &neighbors, &roi, options).expect("estimator");
        let values = linear_field(&mesh, 2.0, 3.0);
        let output = estimator.column(&values, &Reporter::new()).expect("gradient");
        let v = output.vectors[12];
        assert!((v[0] - 2.0).abs() < 1.0e-3);
        assert!((v[1] - 3.0).abs() < 1.0e-3);
    }

    #[test]
    fn mismatched_column_length_is_a_structured_error() {
        let mesh = make_grid(3, 3, 1.0);
        let neighbors = NodeNeighbors::build(&mesh);
        let roi = RoiMask::all_ones(9);
        let estimator =
            GradientEstimator::new(&mesh, &neighbors, &roi, GradientOptions::default())
                .expect("estimator");
        let result = estimator.column(&[0.0; 4], &Reporter::new());
        assert!(matches!(
            result,
            Err(EngineError::NodeCountMismatch { .. })
        ));
    }
}
