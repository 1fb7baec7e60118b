//! Scalar-field analysis over anatomical surfaces and voxel grids: geodesic
//! neighborhoods, tangent-plane gradients, geodesic-Gaussian smoothing,
//! all-pairs correlation, and the dense-connectome gradient pipeline that
//! strings them together per brain structure.

pub mod config;
pub mod correlation;
pub mod error;
pub mod geodesic;
pub mod gradient;
pub mod neighbors;
pub mod parallel;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod smoothing;
pub mod volume_gradient;

pub use config::{GradientOptions, PipelineOptions, SmoothingOptions};
pub use correlation::correlation_matrix;
pub use error::EngineError;
pub use geodesic::GeodesicDistance;
pub use gradient::{GradientEstimator, GradientOutput};
pub use neighbors::NodeNeighbors;
pub use pipeline::{
    ConnectomeGradientPipeline, PipelineInputs, PipelineMode, PipelineOutput,
};
pub use progress::{Progress, ProgressEvent, ProgressSink};
pub use report::Reporter;
pub use smoothing::{smooth_scalar_field, SmoothingKernel};
pub use volume_gradient::{CentralDifferenceGradient, VolumeGradientOperator};
