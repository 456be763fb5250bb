use ndarray::{Array3, ArrayView3, Zip};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{NucspotError, Result};
use crate::gate::CancelToken;

const AXIS_Z: usize = 0;
const AXIS_Y: usize = 1;
const AXIS_X: usize = 2;

/// 3D Laplacian of Gaussian with separate lateral and axial sigma.
///
/// Computed separably as `Dxx*Gy*Gz + Gx*Dyy*Gz + Gx*Gy*Dzz` with mirrored
/// borders. Bright blobs produce negative responses; flat regions give 0.
/// `cancel` is checked before every 1D pass; a set token returns
/// [`NucspotError::Cancelled`].
pub fn laplacian_of_gaussian_3d(
    volume: &ArrayView3<f32>,
    sigma_xy: f32,
    sigma_z: f32,
    cancel: &CancelToken,
) -> Result<Array3<f32>> {
    let g_xy = gaussian_kernel(sigma_xy);
    let g_z = gaussian_kernel(sigma_z);
    let d2_xy = second_derivative_kernel(sigma_xy);
    let d2_z = second_derivative_kernel(sigma_z);

    let pass = |data: &Array3<f32>, kernel: &[f32], axis: usize| -> Result<Array3<f32>> {
        if cancel.is_cancelled() {
            return Err(NucspotError::Cancelled);
        }
        Ok(convolve_axis(data, kernel, axis))
    };

    let volume = volume.to_owned();

    let gz = pass(&volume, &g_z, AXIS_Z)?;
    let gyz = pass(&gz, &g_xy, AXIS_Y)?;
    let gxz = pass(&gz, &g_xy, AXIS_X)?;
    drop(gz);

    let mut result = pass(&gyz, &d2_xy, AXIS_X)?;
    result += &pass(&gxz, &d2_xy, AXIS_Y)?;
    drop(gyz);
    drop(gxz);

    let gxy = pass(&pass(&volume, &g_xy, AXIS_Y)?, &g_xy, AXIS_X)?;
    result += &pass(&gxy, &d2_z, AXIS_Z)?;
    Ok(result)
}

fn kernel_radius(sigma: f32) -> usize {
    (sigma * 3.0).ceil().max(1.0) as usize
}

/// Sampled Gaussian, normalized to unit sum.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = kernel_radius(sigma);
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Sampled second derivative of the Gaussian, shifted to zero sum so that
/// constant input gives zero response.
pub fn second_derivative_kernel(sigma: f32) -> Vec<f32> {
    let radius = kernel_radius(sigma);
    let s2 = sigma * sigma;
    let gaussian = gaussian_kernel(sigma);
    let mut kernel: Vec<f32> = gaussian
        .iter()
        .enumerate()
        .map(|(i, &g)| {
            let x = i as f32 - radius as f32;
            (x * x / (s2 * s2) - 1.0 / s2) * g
        })
        .collect();
    let mean = kernel.iter().sum::<f32>() / kernel.len() as f32;
    for v in &mut kernel {
        *v -= mean;
    }
    kernel
}

/// Mirror an out-of-range index back into `0..len` (edge sample not repeated).
fn reflect(mut i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    loop {
        if i < 0 {
            i = -i;
        } else if i > last {
            i = 2 * last - i;
        } else {
            return i as usize;
        }
    }
}

fn convolve_axis(data: &Array3<f32>, kernel: &[f32], axis: usize) -> Array3<f32> {
    let (d, h, w) = data.dim();
    let len = [d, h, w][axis];
    let radius = kernel.len() as isize / 2;

    let sample = |(z, row, col): (usize, usize, usize)| -> f32 {
        let mut idx = [z, row, col];
        let center = idx[axis] as isize;
        let mut sum = 0.0f32;
        for (ki, &kv) in kernel.iter().enumerate() {
            idx[axis] = reflect(center + ki as isize - radius, len);
            sum += data[idx] * kv;
        }
        sum
    };

    let mut out = Array3::<f32>::zeros((d, h, w));
    if data.len() >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut out).par_for_each(|idx, o| *o = sample(idx));
    } else {
        Zip::indexed(&mut out).for_each(|idx, o| *o = sample(idx));
    }
    out
}
