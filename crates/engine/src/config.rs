use serde::{Deserialize, Serialize};

/// Options for the standalone tangent-plane gradient command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientOptions {
    /// Average each node normal with its direct neighbors before building
    /// the tangent frame. Reduces noise on jagged anatomical surfaces.
    pub average_normals: bool,
    pub parallel: bool,
}

impl Default for GradientOptions {
    fn default() -> Self {
        Self {
            average_normals: false,
            parallel: true,
        }
    }
}

/// Options for the standalone geodesic smoothing command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingOptions {
    /// Geodesic Gaussian sigma in surface units (millimeters).
    pub sigma: f32,
    pub iterations: usize,
    pub parallel: bool,
}

impl Default for SmoothingOptions {
    fn default() -> Self {
        Self {
            sigma: 2.0,
            iterations: 1,
            parallel: true,
        }
    }
}

/// Options for the dense-connectome gradient pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Geodesic smoothing sigma applied to surface groups before the
    /// gradient pass; zero or negative disables smoothing.
    pub surface_smoothing_sigma: f32,
    pub average_normals: bool,
    /// Gaussian presmoothing sigma (world units) for the volume gradient
    /// operator; zero disables presmoothing.
    pub volume_gradient_kernel: f32,
    pub parallel: bool,
    /// Collapse each row's column dimension to one summary value and drop
    /// the collapsed dimension from the structural mapping.
    pub collapse_to_average: bool,
    /// Capture named intermediate scalar fields for inspection.
    pub debug_intermediate_output: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            surface_smoothing_sigma: 2.0,
            average_normals: false,
            volume_gradient_kernel: 0.0,
            parallel: true,
            collapse_to_average: false,
            debug_intermediate_output: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_options_round_trip_json() {
        let options = PipelineOptions {
            surface_smoothing_sigma: 4.0,
            collapse_to_average: true,
            ..Default::default()
        };
        let text = serde_json::to_string(&options).expect("serialize");
        let back: PipelineOptions = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, options);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let options: SmoothingOptions = serde_json::from_str("{\"sigma\": 1.5}").expect("parse");
        assert_eq!(options.sigma, 1.5);
        assert_eq!(options.iterations, 1);
        assert!(options.parallel);
    }
}
