use gyrus_model::{RoiMask, ScalarField, SurfaceMesh};

use crate::config::SmoothingOptions;
use crate::error::EngineError;
use crate::geodesic::GeodesicDistance;
use crate::neighbors::NodeNeighbors;
use crate::parallel;
use crate::report::Reporter;

/// Kernel support radius as a multiple of sigma. Weights at the cutoff are
/// exp(-8), small enough to truncate.
const RADIUS_SIGMAS: f32 = 4.0;

/// Below this many in-ROI geodesic neighbors the kernel switches to 1-hop
/// topological neighbors plus the center, with exact distances to that set.
const MIN_KERNEL_NEIGHBORS: usize = 6;

#[derive(Debug, Clone, Default)]
struct KernelRow {
    nodes: Vec<u32>,
    weights: Vec<f32>,
    weight_sum: f32,
}

/// Precomputed geodesic-Gaussian smoothing kernel, one row per mesh node.
/// A kernel is valid for one (mesh, ROI, sigma) combination; rows already
/// exclude out-of-ROI neighbors and are immutable once built, so repeated
/// passes and multi-column runs share them read-only. Changing sigma means
/// rebuilding; distances are never rescaled from an old kernel.
pub struct SmoothingKernel {
    rows: Vec<KernelRow>,
    sigma: f32,
}

impl SmoothingKernel {
    pub fn build(
        mesh: &SurfaceMesh,
        neighbors: &NodeNeighbors,
        roi: &RoiMask,
        sigma: f32,
        parallel: bool,
    ) -> Result<Self, EngineError> {
        if mesh.node_count() == 0 {
            return Err(EngineError::EmptyInput("surface mesh"));
        }
        if !(sigma > 0.0) {
            return Err(EngineError::InvalidSigma(sigma));
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

        let radius = RADIUS_SIGMAS * sigma;
        let rows = parallel::map_indices(mesh.node_count(), parallel, |node| {
            if !roi.is_inside(node) {
                return KernelRow::default();
            }
            let geo = GeodesicDistance::new(mesh, neighbors);
            let mut pairs: Vec<(u32, f32)> = geo
                .within_radius(node, radius)
                .into_iter()
                .filter(|(n, _)| roi.is_inside(*n as usize))
                .collect();

            if pairs.len() < MIN_KERNEL_NEIGHBORS {
                let mut targets: Vec<u32> = neighbors
                    .direct(node)
                    .iter()
                    .copied()
                    .filter(|&n| roi.is_inside(n as usize))
                    .collect();
                targets.push(node as u32);
                pairs = geo.distances_to(node, &targets);
            }

            let mut row = KernelRow {
                nodes: Vec::with_capacity(pairs.len()),
                weights: Vec::with_capacity(pairs.len()),
                weight_sum: 0.0,
            };
            for (n, dist) in pairs {
                let scaled = dist / sigma;
                let weight = (-0.5 * scaled * scaled).exp();
                row.nodes.push(n);
                row.weights.push(weight);
                row.weight_sum += weight;
            }
            row
        });

        Ok(Self { rows, sigma })
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    pub fn node_count(&self) -> usize {
        self.rows.len()
    }

    /// One smoothing pass over a column. Out-of-ROI nodes (empty rows) and
    /// zero-support rows come back as 0.
    fn pass(&self, input: &[f32], output: &mut [f32], reporter: &Reporter) {
        for (node, row) in self.rows.iter().enumerate() {
            if row.nodes.is_empty() || row.weight_sum <= 0.0 {
                if !row.nodes.is_empty() {
                    reporter.warn_zero_weight();
                }
                output[node] = 0.0;
                continue;
            }
            let mut sum = 0.0f32;
            for (n, weight) in row.nodes.iter().zip(&row.weights) {
                sum += weight * input[*n as usize];
            }
            output[node] = sum / row.weight_sum;
        }
    }

    /// Smooths one column in place, compounding across iterations.
    pub fn smooth_in_place(
        &self,
        values: &mut [f32],
        iterations: usize,
        reporter: &Reporter,
    ) -> Result<(), EngineError> {
        if values.len() != self.rows.len() {
            return Err(EngineError::NodeCountMismatch {
                what: "scalar column",
                expected: self.rows.len(),
                actual: values.len(),
            });
        }
        let mut scratch = vec![0.0f32; values.len()];
        for _ in 0..iterations {
            self.pass(values, &mut scratch, reporter);
            values.copy_from_slice(&scratch);
        }
        Ok(())
    }

    /// Smooths every column of a field, whole columns dispatched as parallel
    /// tasks over the shared kernel table.
    pub fn smooth_field(
        &self,
        field: &mut ScalarField,
        iterations: usize,
        parallel: bool,
        reporter: &Reporter,
    ) -> Result<(), EngineError> {
        if field.node_count() != self.rows.len() {
            return Err(EngineError::NodeCountMismatch {
                what: "scalar field",
                expected: self.rows.len(),
                actual: field.node_count(),
            });
        }
        let rows = &*self;
        crate::parallel::for_each_mut(field.columns_mut(), parallel, |_, column| {
            // Lengths were validated against the field above.
            let mut scratch = vec![0.0f32; column.len()];
            for _ in 0..iterations {
                rows.pass(column, &mut scratch, reporter);
                column.copy_from_slice(&scratch);
            }
        });
        Ok(())
    }
}

/// Standalone smoothing entry: builds the adjacency table and kernel for one
/// run, then smooths every column of the field.
pub fn smooth_scalar_field(
    mesh: &SurfaceMesh,
    roi: &RoiMask,
    field: &mut ScalarField,
    options: &SmoothingOptions,
    reporter: &Reporter,
) -> Result<(), EngineError> {
    let neighbors = NodeNeighbors::build(mesh);
    let kernel = SmoothingKernel::build(mesh, &neighbors, roi, options.sigma, options.parallel)?;
    kernel.smooth_field(field, options.iterations, options.parallel, reporter)
}
