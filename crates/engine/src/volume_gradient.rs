use glam::Vec3;

use gyrus_model::Volume;

use crate::error::EngineError;

/// Seam to the volume-domain gradient machinery. The pipeline drives it per
/// extracted working volume and scatters the returned magnitudes back; any
/// implementation only needs to produce one magnitude per voxel.
pub trait VolumeGradientOperator: Send + Sync {
    fn gradient_magnitude(&self, volume: &Volume) -> Result<Vec<f32>, EngineError>;
}

/// Central-difference gradient magnitude with optional separable Gaussian
/// presmoothing. Voxel spacing comes from the volume's voxel-to-world
/// transform column lengths; boundary voxels use one-sided differences.
#[derive(Debug, Clone, Copy)]
pub struct CentralDifferenceGradient {
    /// Presmoothing sigma in world units; zero or negative disables it.
    pub presmooth_sigma: f32,
}

impl CentralDifferenceGradient {
    pub fn new(presmooth_sigma: f32) -> Self {
        Self { presmooth_sigma }
    }
}

impl VolumeGradientOperator for CentralDifferenceGradient {
    fn gradient_magnitude(&self, volume: &Volume) -> Result<Vec<f32>, EngineError> {
        if volume.is_empty() {
            return Err(EngineError::EmptyInput("volume"));
        }

        let spacing = voxel_spacing(volume);
        let values = if self.presmooth_sigma > 0.0 {
            gaussian_presmooth(volume, spacing, self.presmooth_sigma)
        } else {
            volume.values.clone()
        };

        let [nx, ny, nz] = volume.dims.map(|d| d as usize);
        let mut output = vec![0.0f32; values.len()];
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let idx = z * nx * ny + y * nx + x;
                    let gx = axis_difference(&values, idx, x, nx, 1, spacing.x);
                    let gy = axis_difference(&values, idx, y, ny, nx, spacing.y);
                    let gz = axis_difference(&values, idx, z, nz, nx * ny, spacing.z);
                    output[idx] = (gx * gx + gy * gy + gz * gz).sqrt();
                }
            }
        }
        Ok(output)
    }
}

fn voxel_spacing(volume: &Volume) -> Vec3 {
    let t = volume.transform;
    Vec3::new(
        t.x_axis.truncate().length().max(1.0e-6),
        t.y_axis.truncate().length().max(1.0e-6),
        t.z_axis.truncate().length().max(1.0e-6),
    )
}

/// Central difference along one axis, one-sided at the ends. `stride` is the
/// index step for one voxel along the axis.
fn axis_difference(
    values: &[f32],
    idx: usize,
    coord: usize,
    extent: usize,
    stride: usize,
    spacing: f32,
) -> f32 {
    if extent < 2 {
        return 0.0;
    }
    if coord == 0 {
        (values[idx + stride] - values[idx]) / spacing
    } else if coord == extent - 1 {
        (values[idx] - values[idx - stride]) / spacing
    } else {
        (values[idx + stride] - values[idx - stride]) / (2.0 * spacing)
    }
}

/// Three separable 1-D Gaussian passes, kernel truncated at three sigma.
fn gaussian_presmooth(volume: &Volume, spacing: Vec3, sigma: f32) -> Vec<f32> {
    let [nx, ny, nz] = volume.dims.map(|d| d as usize);
    let mut current = volume.values.clone();

    for (axis, (extent, stride)) in [
        (nx, 1usize),
        (ny, nx),
        (nz, nx * ny),
    ]
    .into_iter()
    .enumerate()
    {
        let step = [spacing.x, spacing.y, spacing.z][axis];
        let radius = ((3.0 * sigma / step).ceil() as usize).max(1);
        let weights: Vec<f32> = (0..=radius)
            .map(|offset| {
                let d = offset as f32 * step / sigma;
                (-0.5 * d * d).exp()
            })
            .collect();

        let mut next = vec![0.0f32; current.len()];
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    let idx = z * nx * ny + y * nx + x;
                    let coord = [x, y, z][axis];
                    let mut sum = weights[0] * current[idx];
                    let mut total = weights[0];
                    for offset in 1..=radius {
                        if coord + offset < extent {
                            sum += weights[offset] * current[idx + offset * stride];
                            total += weights[offset];
                        }
                        if coord >= offset {
                            sum += weights[offset] * current[idx - offset * stride];
                            total += weights[offset];
                        }
                    }
                    next[idx] = sum / total;
                }
            }
        }
        current = next;
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn ramp_volume(dims: [u32; 3], slope: f32) -> Volume {
        let mut volume = Volume::new(dims, Mat4::IDENTITY);
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    let idx = volume.value_index(x, y, z);
                    volume.values[idx] = slope * x as f32;
                }
            }
        }
        volume
    }

    #[test]
    fn ramp_yields_constant_magnitude() {
        let volume = ramp_volume([5, 4, 3], 2.0);
        let operator = CentralDifferenceGradient::new(0.0);
        let magnitudes = operator.gradient_magnitude(&volume).expect("gradient");
        for m in magnitudes {
            assert!((m - 2.0).abs() < 1.0e-4);
        }
    }

    #[test]
    fn constant_volume_has_zero_gradient() {
        let mut volume = Volume::new([4, 4, 4], Mat4::IDENTITY);
        volume.values.fill(3.0);
        let operator = CentralDifferenceGradient::new(1.0);
        let magnitudes = operator.gradient_magnitude(&volume).expect("gradient");
        for m in magnitudes {
            assert!(m.abs() < 1.0e-4);
        }
    }

    #[test]
    fn spacing_scales_the_result() {
        let mut volume = ramp_volume([5, 3, 3], 1.0);
        // Double the voxel size: the same index ramp is half as steep in
        // world units.
        volume.transform = Mat4::from_scale(Vec3::splat(2.0));
        let operator = CentralDifferenceGradient::new(0.0);
        let magnitudes = operator.gradient_magnitude(&volume).expect("gradient");
        for m in magnitudes {
            assert!((m - 0.5).abs() < 1.0e-4);
        }
    }

    #[test]
    fn presmoothing_lowers_a_spike_gradient() {
        let mut volume = Volume::new([7, 7, 7], Mat4::IDENTITY);
        let center = volume.value_index(3, 3, 3);
        volume.values[center] = 10.0;
        let sharp = CentralDifferenceGradient::new(0.0)
            .gradient_magnitude(&volume)
            .expect("gradient");
        let smooth = CentralDifferenceGradient::new(1.0)
            .gradient_magnitude(&volume)
            .expect("gradient");
        let neighbor = volume.value_index(2, 3, 3);
        assert!(smooth[neighbor] < sharp[neighbor]);
    }

    #[test]
    fn empty_volume_is_an_error() {
        let volume = Volume::new([0, 0, 0], Mat4::IDENTITY);
        let operator = CentralDifferenceGradient::new(0.0);
        assert!(operator.gradient_magnitude(&volume).is_err());
    }
}
