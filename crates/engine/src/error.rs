use std::fmt;

/// Fatal, structural failures. Per-location numerical trouble is resolved by
/// the documented fallbacks and never surfaces here.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    EmptyInput(&'static str),
    NodeCountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    InvalidSigma(f32),
    InvalidMatrix {
        rows: usize,
        cols: usize,
    },
    MissingMapping {
        dimension: usize,
    },
    MissingVolumeTransform {
        structure: String,
    },
    MissingSurface {
        structure: String,
    },
    GroupIndexMismatch {
        structure: String,
        declared: usize,
        actual: usize,
    },
    GroupOutOfRange {
        structure: String,
        offset: usize,
        count: usize,
        rows: usize,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::EmptyInput(what) => write!(f, "{} is empty", what),
            EngineError::NodeCountMismatch {
                what,
                expected,
                actual,
            } => write!(
                f,
                "{} has {} nodes, expected {} to match the surface",
                what, actual, expected
            ),
            EngineError::InvalidSigma(sigma) => {
                write!(f, "smoothing sigma must be positive, got {}", sigma)
            }
            EngineError::InvalidMatrix { rows, cols } => {
                write!(f, "matrix dimensions {}x{} are not usable", rows, cols)
            }
            EngineError::MissingMapping { dimension } => write!(
                f,
                "no structural mapping entry describes matrix dimension {}",
                dimension
            ),
            EngineError::MissingVolumeTransform { structure } => write!(
                f,
                "volume group {} has no voxel-to-world transform",
                structure
            ),
            EngineError::MissingSurface { structure } => {
                write!(f, "no surface supplied for structure {}", structure)
            }
            EngineError::GroupIndexMismatch {
                structure,
                declared,
                actual,
            } => write!(
                f,
                "group {} declares {} indices but lists {}",
                structure, declared, actual
            ),
            EngineError::GroupOutOfRange {
                structure,
                offset,
                count,
                rows,
            } => write!(
                f,
                "group {} covers rows {}..{} outside matrix of {} rows",
                structure,
                offset,
                offset + count,
                rows
            ),
        }
    }
}

impl std::error::Error for EngineError {}
