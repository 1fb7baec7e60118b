use glam::{Mat4, Vec3};

/// Triangulated anatomical surface. Positions and triangles are supplied by
/// the file-format layer; normals exist only after an explicit
/// `compute_normals` call and are not kept in sync with position edits.
#[derive(Debug, Clone, Default)]
pub struct SurfaceMesh {
    pub positions: Vec<[f32; 3]>,
    pub triangles: Vec<u32>,
    pub normals: Option<Vec<[f32; 3]>>,
}

impl SurfaceMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positions_triangles(positions: Vec<[f32; 3]>, triangles: Vec<u32>) -> Self {
        Self {
            positions,
            triangles,
            normals: None,
        }
    }

    pub fn node_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position(&self, node: usize) -> Vec3 {
        Vec3::from(self.positions[node])
    }

    pub fn compute_normals(&mut self) -> bool {
        if self.triangles.len() % 3 != 0 || self.positions.is_empty() {
            return false;
        }
        self.normals = Some(compute_node_normals(&self.positions, &self.triangles));
        true
    }
}

/// Area-weighted node normals from triangle cross products. Degenerate or
/// unreferenced nodes get a +Y placeholder normal.
pub fn compute_node_normals(positions: &[[f32; 3]], triangles: &[u32]) -> Vec<[f32; 3]> {
    let mut accum = vec![Vec3::ZERO; positions.len()];

    for tri in triangles.chunks_exact(3) {
        let i0 = tri[0] as usize;
        let i1 = tri[1] as usize;
        let i2 = tri[2] as usize;
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }

        let p0 = Vec3::from(positions[i0]);
        let p1 = Vec3::from(positions[i1]);
        let p2 = Vec3::from(positions[i2]);
        let normal = (p1 - p0).cross(p2 - p0);
        accum[i0] += normal;
        accum[i1] += normal;
        accum[i2] += normal;
    }

    accum
        .into_iter()
        .map(|n| {
            let len = n.length();
            if len > 0.0 {
                (n / len).to_array()
            } else {
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelError {
    InvalidColumn(usize),
    InvalidLength { expected: usize, actual: usize },
    InvalidDimensions { rows: usize, cols: usize, len: usize },
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::InvalidColumn(index) => write!(f, "no column at index {}", index),
            ModelError::InvalidLength { expected, actual } => {
                write!(f, "expected {} values, got {}", expected, actual)
            }
            ModelError::InvalidDimensions { rows, cols, len } => {
                write!(f, "buffer of {} values cannot hold {}x{} matrix", len, rows, cols)
            }
        }
    }
}

impl std::error::Error for ModelError {}

/// Named scalar columns over mesh nodes, one value per node per column.
#[derive(Debug, Clone, Default)]
pub struct ScalarField {
    node_count: usize,
    names: Vec<String>,
    columns: Vec<Vec<f32>>,
}

impl ScalarField {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn column(&self, index: usize) -> Option<&[f32]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    pub fn column_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        self.columns.get_mut(index).map(Vec::as_mut_slice)
    }

    pub fn columns_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.columns
    }

    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<f32>) -> Result<(), ModelError> {
        if values.len() != self.node_count {
            return Err(ModelError::InvalidLength {
                expected: self.node_count,
                actual: values.len(),
            });
        }
        self.names.push(name.into());
        self.columns.push(values);
        Ok(())
    }

    pub fn add_columns(&mut self, count: usize) {
        for _ in 0..count {
            self.names.push(String::new());
            self.columns.push(vec![0.0; self.node_count]);
        }
    }

    pub fn set_column(&mut self, index: usize, values: Vec<f32>) -> Result<(), ModelError> {
        if values.len() != self.node_count {
            return Err(ModelError::InvalidLength {
                expected: self.node_count,
                actual: values.len(),
            });
        }
        let slot = self
            .columns
            .get_mut(index)
            .ok_or(ModelError::InvalidColumn(index))?;
        *slot = values;
        Ok(())
    }
}

/// Boolean-like mask over mesh nodes, stored as 0.0 / non-zero floats the way
/// mask files carry it.
#[derive(Debug, Clone, Default)]
pub struct RoiMask {
    values: Vec<f32>,
}

impl RoiMask {
    pub fn from_values(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn all_ones(node_count: usize) -> Self {
        Self {
            values: vec![1.0; node_count],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn is_inside(&self, node: usize) -> bool {
        self.values.get(node).is_some_and(|v| *v != 0.0)
    }

    pub fn selected_nodes(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(idx, _)| idx)
            .collect()
    }
}

/// Regular voxel grid with a voxel-to-world transform, x-fastest layout.
#[derive(Debug, Clone)]
pub struct Volume {
    pub dims: [u32; 3],
    pub transform: Mat4,
    pub values: Vec<f32>,
}

impl Volume {
    pub fn new(dims: [u32; 3], transform: Mat4) -> Self {
        let len = dims[0] as usize * dims[1] as usize * dims[2] as usize;
        Self {
            dims,
            transform,
            values: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value_index(&self, x: u32, y: u32, z: u32) -> usize {
        let nx = self.dims[0].max(1);
        let ny = self.dims[1].max(1);
        (z * nx * ny + y * nx + x) as usize
    }
}

/// Row-major numeric buffer for the dense-connectome container. The value
/// buffer can be moved out with `take_data`, which leaves the matrix empty
/// instead of dangling.
#[derive(Debug, Clone, Default)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_data(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, ModelError> {
        if data.len() != rows * cols {
            return Err(ModelError::InvalidDimensions {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn value(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn set_value(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    /// Moves the value buffer out, leaving an empty 0x0 matrix behind.
    pub fn take_data(&mut self) -> (Vec<f32>, usize, usize) {
        let rows = std::mem::take(&mut self.rows);
        let cols = std::mem::take(&mut self.cols);
        (std::mem::take(&mut self.data), rows, cols)
    }

    pub fn set_data(&mut self, rows: usize, cols: usize, data: Vec<f32>) -> Result<(), ModelError> {
        if data.len() != rows * cols {
            return Err(ModelError::InvalidDimensions {
                rows,
                cols,
                len: data.len(),
            });
        }
        self.rows = rows;
        self.cols = cols;
        self.data = data;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    Left,
    Right,
}

impl Hemisphere {
    /// Resolves a hemisphere from a brain-structure name suffix.
    pub fn from_structure(name: &str) -> Option<Hemisphere> {
        if name.ends_with("_LEFT") {
            Some(Hemisphere::Left)
        } else if name.ends_with("_RIGHT") {
            Some(Hemisphere::Right)
        } else {
            None
        }
    }
}

/// Per-group payload of the structural mapping: surface groups carry mesh
/// node indices, volume groups carry voxel index triplets plus grid metadata.
#[derive(Debug, Clone)]
pub enum GroupKind {
    Surface {
        node_indices: Vec<u32>,
        mesh_node_count: usize,
    },
    Volume {
        voxel_indices: Vec<[u32; 3]>,
        dims: [u32; 3],
        transform: Option<Mat4>,
    },
}

#[derive(Debug, Clone)]
pub struct BrainGroup {
    pub structure: String,
    pub index_offset: usize,
    pub index_count: usize,
    pub kind: GroupKind,
}

/// One structural-mapping entry: which matrix dimension it describes and the
/// ordered groups partitioning that dimension's index space.
#[derive(Debug, Clone)]
pub struct MappingEntry {
    pub dimension: usize,
    pub groups: Vec<BrainGroup>,
}

#[derive(Debug, Clone, Default)]
pub struct BrainMapping {
    pub entries: Vec<MappingEntry>,
}

impl BrainMapping {
    pub fn entry_for_dimension(&self, dimension: usize) -> Option<&MappingEntry> {
        self.entries.iter().find(|e| e.dimension == dimension)
    }

    pub fn has_volume_groups(&self) -> bool {
        self.entries.iter().any(|entry| {
            entry
                .groups
                .iter()
                .any(|group| matches!(group.kind, GroupKind::Volume { .. }))
        })
    }
}

/// Flat grid of `nx` by `ny` nodes in the z = 0 plane with the given node
/// spacing. Node (ix, iy) sits at index `iy * nx + ix`.
pub fn make_grid(nx: u32, ny: u32, spacing: f32) -> SurfaceMesh {
    let nx = nx.max(2);
    let ny = ny.max(2);

    let mut positions = Vec::new();
    for iy in 0..ny {
        for ix in 0..nx {
            positions.push([ix as f32 * spacing, iy as f32 * spacing, 0.0]);
        }
    }

    let mut triangles = Vec::new();
    for iy in 0..ny - 1 {
        for ix in 0..nx - 1 {
            let i0 = iy * nx + ix;
            let i1 = i0 + 1;
            let i2 = i0 + nx;
            let i3 = i2 + 1;
            triangles.extend_from_slice(&[i0, i1, i2, i1, i3, i2]);
        }
    }

    SurfaceMesh::with_positions_triangles(positions, triangles)
}

pub fn make_uv_sphere(radius: f32, rows: u32, cols: u32) -> SurfaceMesh {
    let rows = rows.max(3);
    let cols = cols.max(3);
    let mut positions = Vec::new();
    let mut triangles = Vec::new();

    for r in 0..=rows {
        let v = r as f32 / rows as f32;
        let theta = v * std::f32::consts::PI;
        let sin_theta = theta.sin();
        let cos_theta = theta.cos();

        for c in 0..=cols {
            let u = c as f32 / cols as f32;
            let phi = u * std::f32::consts::TAU;
            let x = sin_theta * phi.cos();
            let y = cos_theta;
            let z = sin_theta * phi.sin();
            positions.push([x * radius, y * radius, z * radius]);
        }
    }

    let stride = cols + 1;
    for r in 0..rows {
        for c in 0..cols {
            let i0 = r * stride + c;
            let i1 = i0 + 1;
            let i2 = i0 + stride;
            let i3 = i2 + 1;
            triangles.extend_from_slice(&[i0, i1, i2, i1, i3, i2]);
        }
    }

    SurfaceMesh::with_positions_triangles(positions, triangles)
}
