use glam::{Mat4, Vec3};
use tracing::warn;

use gyrus_model::{
    BrainGroup, BrainMapping, DenseMatrix, GroupKind, Hemisphere, RoiMask, ScalarField,
    SurfaceMesh, Volume,
};

use crate::config::{GradientOptions, PipelineOptions};
use crate::correlation::correlation_matrix;
use crate::error::EngineError;
use crate::gradient::GradientEstimator;
use crate::neighbors::NodeNeighbors;
use crate::parallel;
use crate::progress::{Progress, ProgressSink};
use crate::report::Reporter;
use crate::smoothing::SmoothingKernel;
use crate::volume_gradient::{CentralDifferenceGradient, VolumeGradientOperator};

/// Surfaces and optional ROI overrides handed in by the caller. The pipeline
/// never loads files itself.
#[derive(Default, Clone, Copy)]
pub struct PipelineInputs<'a> {
    pub left_surface: Option<&'a SurfaceMesh>,
    pub right_surface: Option<&'a SurfaceMesh>,
    pub left_roi: Option<&'a RoiMask>,
    pub right_roi: Option<&'a RoiMask>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Each matrix column is one scalar column: smooth, take the gradient,
    /// write the magnitude back in place.
    Direct,
    /// Correlate the ROI-selected rows all-pairs first, run the smoothed
    /// gradient over the correlation maps, and average each selected row's
    /// magnitudes down to a single summary value.
    RoiCorrelation,
}

/// What the pipeline hands back: the (possibly rebuilt) structural mapping
/// and any intermediate fields captured for inspection.
pub struct PipelineOutput {
    pub mapping: BrainMapping,
    pub debug_fields: Vec<(String, ScalarField)>,
}

pub struct ConnectomeGradientPipeline<'a> {
    options: PipelineOptions,
    inputs: PipelineInputs<'a>,
    default_operator: CentralDifferenceGradient,
    volume_operator: Option<&'a dyn VolumeGradientOperator>,
    progress_sink: Option<ProgressSink>,
}

impl<'a> ConnectomeGradientPipeline<'a> {
    pub fn new(options: PipelineOptions, inputs: PipelineInputs<'a>) -> Self {
        Self {
            default_operator: CentralDifferenceGradient::new(options.volume_gradient_kernel),
            options,
            inputs,
            volume_operator: None,
            progress_sink: None,
        }
    }

    /// Replaces the built-in central-difference volume operator.
    pub fn with_volume_operator(mut self, operator: &'a dyn VolumeGradientOperator) -> Self {
        self.volume_operator = Some(operator);
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    fn operator(&self) -> &dyn VolumeGradientOperator {
        match self.volume_operator {
            Some(operator) => operator,
            None => &self.default_operator,
        }
    }

    /// Runs the whole pipeline over the matrix. The structural mapping is
    /// taken by value and handed back, rebuilt when the output shape
    /// changed. Structural validation happens up front: a fatal error
    /// returns before any matrix value is touched. Groups already processed
    /// when a later stage fails keep their computed values; the matrix is
    /// not rolled back.
    pub fn run(
        &self,
        matrix: &mut DenseMatrix,
        mapping: BrainMapping,
        mode: PipelineMode,
    ) -> Result<PipelineOutput, EngineError> {
        self.validate(matrix, &mapping)?;

        let rows = matrix.rows();
        let collapse =
            self.options.collapse_to_average || mode == PipelineMode::RoiCorrelation;
        let mut summary = vec![0.0f32; rows];
        let mut debug_fields = Vec::new();
        let reporter = Reporter::new();

        let entry = mapping
            .entry_for_dimension(0)
            .ok_or(EngineError::MissingMapping { dimension: 0 })?;

        for group in &entry.groups {
            match &group.kind {
                GroupKind::Surface { .. } => {
                    let Some(hemisphere) = Hemisphere::from_structure(&group.structure) else {
                        warn!(
                            "unrecognized structure suffix on {}; leaving its rows untouched",
                            group.structure
                        );
                        continue;
                    };
                    match mode {
                        PipelineMode::Direct => self.surface_direct(
                            matrix,
                            group,
                            hemisphere,
                            &reporter,
                            &mut debug_fields,
                        )?,
                        PipelineMode::RoiCorrelation => self.surface_correlation(
                            matrix,
                            group,
                            hemisphere,
                            &reporter,
                            &mut summary,
                            &mut debug_fields,
                        )?,
                    }
                }
                GroupKind::Volume { .. } => match mode {
                    PipelineMode::Direct => self.volume_direct(matrix, group)?,
                    PipelineMode::RoiCorrelation => {
                        self.volume_correlation(matrix, group, &mut summary)?
                    }
                },
            }
        }

        let mapping = if collapse {
            if mode == PipelineMode::Direct {
                // Gradient-of-average case: fold the in-place magnitudes.
                for row in 0..rows {
                    let values = matrix.row(row);
                    summary[row] = values.iter().sum::<f32>() / values.len() as f32;
                }
            }
            let (_, rows_taken, _) = matrix.take_data();
            matrix
                .set_data(rows_taken, 1, summary)
                .map_err(|_| EngineError::InvalidMatrix {
                    rows: rows_taken,
                    cols: 1,
                })?;
            // Rebuild instead of erasing in place: keep every entry that
            // does not describe the collapsed column dimension.
            BrainMapping {
                entries: mapping
                    .entries
                    .into_iter()
                    .filter(|entry| entry.dimension != 1)
                    .collect(),
            }
        } else {
            mapping
        };

        Ok(PipelineOutput {
            mapping,
            debug_fields,
        })
    }

    fn validate(&self, matrix: &DenseMatrix, mapping: &BrainMapping) -> Result<(), EngineError> {
        if matrix.rows() == 0 || matrix.cols() == 0 || matrix.is_empty() {
            return Err(EngineError::InvalidMatrix {
                rows: matrix.rows(),
                cols: matrix.cols(),
            });
        }
        let entry = mapping
            .entry_for_dimension(0)
            .ok_or(EngineError::MissingMapping { dimension: 0 })?;
        if entry.groups.is_empty() {
            return Err(EngineError::MissingMapping { dimension: 0 });
        }

        for group in &entry.groups {
            if group.index_offset + group.index_count > matrix.rows() {
                return Err(EngineError::GroupOutOfRange {
                    structure: group.structure.clone(),
                    offset: group.index_offset,
                    count: group.index_count,
                    rows: matrix.rows(),
                });
            }
            match &group.kind {
                GroupKind::Surface {
                    node_indices,
                    mesh_node_count,
                } => {
                    let Some(hemisphere) = Hemisphere::from_structure(&group.structure) else {
                        continue;
                    };
                    let mesh = self.surface_for(hemisphere).ok_or_else(|| {
                        EngineError::MissingSurface {
                            structure: group.structure.clone(),
                        }
                    })?;
                    if *mesh_node_count != mesh.node_count() {
                        return Err(EngineError::NodeCountMismatch {
                            what: "structural mapping",
                            expected: mesh.node_count(),
                            actual: *mesh_node_count,
                        });
                    }
                    let listed = node_indices.len();
                    let synthesizable = listed == 0 && group.index_count == *mesh_node_count;
                    if listed != group.index_count && !synthesizable {
                        return Err(EngineError::GroupIndexMismatch {
                            structure: group.structure.clone(),
                            declared: group.index_count,
                            actual: listed,
                        });
                    }
                }
                GroupKind::Volume {
                    voxel_indices,
                    transform,
                    ..
                } => {
                    if transform.is_none() {
                        return Err(EngineError::MissingVolumeTransform {
                            structure: group.structure.clone(),
                        });
                    }
                    if voxel_indices.len() != group.index_count {
                        return Err(EngineError::GroupIndexMismatch {
                            structure: group.structure.clone(),
                            declared: group.index_count,
                            actual: voxel_indices.len(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn surface_for(&self, hemisphere: Hemisphere) -> Option<&'a SurfaceMesh> {
        match hemisphere {
            Hemisphere::Left => self.inputs.left_surface,
            Hemisphere::Right => self.inputs.right_surface,
        }
    }

    fn roi_override_for(&self, hemisphere: Hemisphere) -> Option<&'a RoiMask> {
        match hemisphere {
            Hemisphere::Left => self.inputs.left_roi,
            Hemisphere::Right => self.inputs.right_roi,
        }
    }

    /// Group node list, synthesizing the identity list for the "all nodes"
    /// encoding (empty list, declared count equal to the mesh node count).
    fn group_nodes(group: &BrainGroup, mesh: &SurfaceMesh) -> Vec<u32> {
        let GroupKind::Surface { node_indices, .. } = &group.kind else {
            return Vec::new();
        };
        if node_indices.is_empty() && group.index_count == mesh.node_count() {
            (0..mesh.node_count() as u32).collect()
        } else {
            node_indices.clone()
        }
    }

    /// ROI over mesh nodes for one group: membership in the group,
    /// intersected with the per-hemisphere override when one is supplied.
    fn group_roi(&self, nodes: &[u32], hemisphere: Hemisphere, mesh: &SurfaceMesh) -> RoiMask {
        let override_roi = self.roi_override_for(hemisphere);
        let mut values = vec![0.0f32; mesh.node_count()];
        for &node in nodes {
            let inside = override_roi.map_or(true, |roi| roi.is_inside(node as usize));
            if inside {
                values[node as usize] = 1.0;
            }
        }
        RoiMask::from_values(values)
    }

    fn surface_direct(
        &self,
        matrix: &mut DenseMatrix,
        group: &BrainGroup,
        hemisphere: Hemisphere,
        reporter: &Reporter,
        debug_fields: &mut Vec<(String, ScalarField)>,
    ) -> Result<(), EngineError> {
        let mesh = self
            .surface_for(hemisphere)
            .ok_or_else(|| EngineError::MissingSurface {
                structure: group.structure.clone(),
            })?;
        let nodes = Self::group_nodes(group, mesh);
        let roi = self.group_roi(&nodes, hemisphere, mesh);
        let neighbors = NodeNeighbors::build(mesh);
        let kernel = self.build_kernel(mesh, &neighbors, &roi)?;
        let estimator = GradientEstimator::new(
            mesh,
            &neighbors,
            &roi,
            GradientOptions {
                average_normals: self.options.average_normals,
                parallel: self.options.parallel,
            },
        )?;

        let cols = matrix.cols();
        let offset = group.index_offset;
        let capture_debug = self.options.debug_intermediate_output;
        let matrix_ref = &*matrix;
        let per_column = parallel::try_map_indices(cols, self.options.parallel, |col| {
            let mut values = vec![0.0f32; mesh.node_count()];
            for (k, &node) in nodes.iter().enumerate() {
                values[node as usize] = matrix_ref.value(offset + k, col);
            }
            if let Some(kernel) = &kernel {
                kernel.smooth_in_place(&mut values, 1, reporter)?;
            }
            let smoothed = capture_debug.then(|| values.clone());
            let output = estimator.column(&values, reporter)?;
            let magnitudes: Vec<f32> = nodes
                .iter()
                .map(|&node| output.magnitudes[node as usize])
                .collect();
            Ok::<_, EngineError>((magnitudes, smoothed))
        })?;

        for (col, (magnitudes, _)) in per_column.iter().enumerate() {
            for (k, magnitude) in magnitudes.iter().enumerate() {
                matrix.set_value(offset + k, col, *magnitude);
            }
        }

        if capture_debug {
            let mut field = ScalarField::new(mesh.node_count());
            for (col, (_, smoothed)) in per_column.into_iter().enumerate() {
                if let Some(smoothed) = smoothed {
                    let actual = smoothed.len();
                    field.add_column(format!("col {}", col), smoothed).map_err(|_| {
                        EngineError::NodeCountMismatch {
                            what: "debug column",
                            expected: mesh.node_count(),
                            actual,
                        }
                    })?;
                }
            }
            debug_fields.push((format!("{} smoothed", group.structure), field));
        }
        Ok(())
    }

    fn surface_correlation(
        &self,
        matrix: &DenseMatrix,
        group: &BrainGroup,
        hemisphere: Hemisphere,
        reporter: &Reporter,
        summary: &mut [f32],
        debug_fields: &mut Vec<(String, ScalarField)>,
    ) -> Result<(), EngineError> {
        let mesh = self
            .surface_for(hemisphere)
            .ok_or_else(|| EngineError::MissingSurface {
                structure: group.structure.clone(),
            })?;
        let nodes = Self::group_nodes(group, mesh);
        let roi = self.group_roi(&nodes, hemisphere, mesh);

        // Only rows whose node passes the ROI take part in the correlation.
        let selected: Vec<usize> = (0..nodes.len())
            .filter(|&k| roi.is_inside(nodes[k] as usize))
            .collect();
        if selected.is_empty() {
            warn!(
                "group {} has no rows inside the ROI; leaving it untouched",
                group.structure
            );
            return Ok(());
        }

        let offset = group.index_offset;
        let row_refs: Vec<&[f32]> = selected
            .iter()
            .map(|&k| matrix.row(offset + k))
            .collect();
        let progress = Progress::new(
            "correlation",
            row_refs.len(),
            self.progress_sink.clone(),
        );
        let corr = correlation_matrix(&row_refs, self.options.parallel, Some(&progress));
        progress.finish();

        let m = selected.len();
        let neighbors = NodeNeighbors::build(mesh);
        let kernel = self.build_kernel(mesh, &neighbors, &roi)?;
        let estimator = GradientEstimator::new(
            mesh,
            &neighbors,
            &roi,
            GradientOptions {
                average_normals: self.options.average_normals,
                parallel: self.options.parallel,
            },
        )?;

        if self.options.debug_intermediate_output {
            let mut field = ScalarField::new(mesh.node_count());
            for (j, &k) in selected.iter().enumerate() {
                let mut values = vec![0.0f32; mesh.node_count()];
                for (i, &ks) in selected.iter().enumerate() {
                    values[nodes[ks] as usize] = corr[i * m + j];
                }
                let actual = values.len();
                field
                    .add_column(format!("seed node {}", nodes[k]), values)
                    .map_err(|_| EngineError::NodeCountMismatch {
                        what: "debug column",
                        expected: mesh.node_count(),
                        actual,
                    })?;
            }
            debug_fields.push((format!("{} correlation", group.structure), field));
        }

        // One correlation map per selected row: smooth it, take the
        // gradient, keep the magnitudes at the selected nodes.
        let magnitude_columns =
            parallel::try_map_indices(m, self.options.parallel, |j| {
                let mut values = vec![0.0f32; mesh.node_count()];
                for (i, &k) in selected.iter().enumerate() {
                    values[nodes[k] as usize] = corr[i * m + j];
                }
                if let Some(kernel) = &kernel {
                    kernel.smooth_in_place(&mut values, 1, reporter)?;
                }
                let output = estimator.column(&values, reporter)?;
                Ok::<_, EngineError>(output.magnitudes)
            })?;

        // Average each selected row's magnitudes across the map dimension.
        for &k in &selected {
            let node = nodes[k] as usize;
            let total: f32 = magnitude_columns.iter().map(|col| col[node]).sum();
            summary[offset + k] = total / m as f32;
        }
        Ok(())
    }

    fn volume_extent(voxels: &[[u32; 3]]) -> ([u32; 3], [u32; 3]) {
        let mut min = [u32::MAX; 3];
        let mut max = [0u32; 3];
        for v in voxels {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        (min, max)
    }

    /// Builds the minimal working volume around the group's voxels and the
    /// local voxel coordinates of each row.
    fn working_volume(
        voxels: &[[u32; 3]],
        transform: Mat4,
    ) -> (Volume, Vec<[u32; 3]>) {
        let (min, max) = Self::volume_extent(voxels);
        let dims = [
            max[0] - min[0] + 1,
            max[1] - min[1] + 1,
            max[2] - min[2] + 1,
        ];
        let local_transform = transform
            * Mat4::from_translation(Vec3::new(min[0] as f32, min[1] as f32, min[2] as f32));
        let volume = Volume::new(dims, local_transform);
        let local: Vec<[u32; 3]> = voxels
            .iter()
            .map(|v| [v[0] - min[0], v[1] - min[1], v[2] - min[2]])
            .collect();
        (volume, local)
    }

    fn volume_direct(
        &self,
        matrix: &mut DenseMatrix,
        group: &BrainGroup,
    ) -> Result<(), EngineError> {
        let GroupKind::Volume {
            voxel_indices,
            transform,
            ..
        } = &group.kind
        else {
            return Ok(());
        };
        let transform = (*transform).ok_or_else(|| EngineError::MissingVolumeTransform {
            structure: group.structure.clone(),
        })?;
        if voxel_indices.is_empty() {
            return Ok(());
        }

        let (template, local) = Self::working_volume(voxel_indices, transform);
        let offset = group.index_offset;
        let cols = matrix.cols();
        let matrix_ref = &*matrix;
        let operator = self.operator();

        let per_column = parallel::try_map_indices(cols, self.options.parallel, |col| {
            let mut volume = template.clone();
            for (k, v) in local.iter().enumerate() {
                let idx = volume.value_index(v[0], v[1], v[2]);
                volume.values[idx] = matrix_ref.value(offset + k, col);
            }
            let magnitudes = operator.gradient_magnitude(&volume)?;
            let out: Vec<f32> = local
                .iter()
                .map(|v| magnitudes[template.value_index(v[0], v[1], v[2])])
                .collect();
            Ok::<_, EngineError>(out)
        })?;

        for (col, values) in per_column.iter().enumerate() {
            for (k, value) in values.iter().enumerate() {
                matrix.set_value(offset + k, col, *value);
            }
        }
        Ok(())
    }

    fn volume_correlation(
        &self,
        matrix: &DenseMatrix,
        group: &BrainGroup,
        summary: &mut [f32],
    ) -> Result<(), EngineError> {
        let GroupKind::Volume {
            voxel_indices,
            transform,
            ..
        } = &group.kind
        else {
            return Ok(());
        };
        let transform = (*transform).ok_or_else(|| EngineError::MissingVolumeTransform {
            structure: group.structure.clone(),
        })?;
        if voxel_indices.is_empty() {
            return Ok(());
        }

        let offset = group.index_offset;
        let count = group.index_count;
        let row_refs: Vec<&[f32]> = (0..count).map(|k| matrix.row(offset + k)).collect();
        let progress = Progress::new(
            "correlation",
            row_refs.len(),
            self.progress_sink.clone(),
        );
        let corr = correlation_matrix(&row_refs, self.options.parallel, Some(&progress));
        progress.finish();

        let (template, local) = Self::working_volume(voxel_indices, transform);
        let operator = self.operator();
        let magnitude_columns =
            parallel::try_map_indices(count, self.options.parallel, |j| {
                let mut volume = template.clone();
                for (k, v) in local.iter().enumerate() {
                    let idx = volume.value_index(v[0], v[1], v[2]);
                    volume.values[idx] = corr[k * count + j];
                }
                let magnitudes = operator.gradient_magnitude(&volume)?;
                let out: Vec<f32> = local
                    .iter()
                    .map(|v| magnitudes[template.value_index(v[0], v[1], v[2])])
                    .collect();
                Ok::<_, EngineError>(out)
            })?;

        for k in 0..count {
            let total: f32 = magnitude_columns.iter().map(|col| col[k]).sum();
            summary[offset + k] = total / count as f32;
        }
        Ok(())
    }

    fn build_kernel(
        &self,
        mesh: &SurfaceMesh,
        neighbors: &NodeNeighbors,
        roi: &RoiMask,
    ) -> Result<Option<SmoothingKernel>, EngineError> {
        if self.options.surface_smoothing_sigma > 0.0 {
            Ok(Some(SmoothingKernel::build(
                mesh,
                neighbors,
                roi,
                self.options.surface_smoothing_sigma,
                self.options.parallel,
            )?))
        } else {
            Ok(None)
        }
    }
}
