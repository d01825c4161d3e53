//! Derivative-of-Gaussian filtering.
//!
//! Overview
//! - Builds 1-D convolution masks for the 0th, 1st and 2nd derivative of a
//!   Gaussian at scale `sigma`. Taps are integrals of the respective kernel
//!   over unit pixel intervals, so the masks stay exact under truncation:
//!   the boundary taps absorb the tail mass that falls outside the radius.
//! - Mask radii are `ceil(K * sigma)` with per-order constants chosen so the
//!   truncation error per side stays below 1e-3.
//! - 2-D convolution is separable: a row pass followed by a column pass,
//!   both mirroring the image at its borders.
//! - [`derivatives`] runs the five passes a detection needs and bundles the
//!   results into a [`DerivativeField`].

use crate::image::ImageF32;

/// Mask radius factor for the Gaussian smoothing mask.
pub const MAX_SIZE_MASK_0: f64 = 3.09023230616781;
/// Mask radius factor for the 1st derivative mask.
pub const MAX_SIZE_MASK_1: f64 = 3.46087178201605;
/// Mask radius factor for the 2nd derivative mask.
pub const MAX_SIZE_MASK_2: f64 = 3.82922419517181;

const SQRT_2_PI_INV: f64 = 0.398942280401432677939946059935;

/// Maximum mask index for a given radius factor and scale.
#[inline]
pub fn mask_size(max: f64, sigma: f64) -> usize {
    (max * sigma).ceil() as usize
}

/// Mirror a coordinate at the borders of a length-`n` axis.
#[inline]
pub(crate) fn mirror(i: isize, n: usize) -> usize {
    if i < 0 {
        (-i) as usize
    } else if i as usize >= n {
        2 * n - 2 - i as usize
    } else {
        i as usize
    }
}

/// Integral of the Gaussian, i.e. the normal CDF of `x / sigma`.
#[inline]
pub fn phi0(x: f64, sigma: f64) -> f64 {
    normal_cdf(x / sigma)
}

/// The Gaussian function.
#[inline]
pub fn phi1(x: f64, sigma: f64) -> f64 {
    let t = x / sigma;
    SQRT_2_PI_INV / sigma * (-0.5 * t * t).exp()
}

/// First derivative of the Gaussian function.
#[inline]
pub fn phi2(x: f64, sigma: f64) -> f64 {
    let t = x / sigma;
    -x * SQRT_2_PI_INV / (sigma * sigma * sigma) * (-0.5 * t * t).exp()
}

/// Standard normal cumulative distribution function.
///
/// Rational approximations in three regimes of |x|/sqrt(2); absolute error
/// is far below the 1e-9 mass-conservation requirement on the masks.
pub fn normal_cdf(x: f64) -> f64 {
    const SQRTPI: f64 = 1.772453850905516027;
    const SQRT2: f64 = 1.41421356237309504880;
    const UPPERLIMIT: f64 = 20.0;

    const P1: [f64; 4] = [
        242.66795523053175,
        21.979261618294152,
        6.9963834886191355,
        -0.035609843701815385,
    ];
    const Q1: [f64; 4] = [
        215.05887586986120,
        91.164905404514901,
        15.082797630407787,
        1.0,
    ];
    const P2: [f64; 8] = [
        300.4592610201616005,
        451.9189537118729422,
        339.3208167343436870,
        152.9892850469404039,
        43.16222722205673530,
        7.211758250883093659,
        0.5641955174789739711,
        -0.0000001368648573827167067,
    ];
    const Q2: [f64; 8] = [
        300.4592609569832933,
        790.9509253278980272,
        931.3540948506096211,
        638.9802644656311665,
        277.5854447439876434,
        77.00015293522947295,
        12.78272731962942351,
        1.0,
    ];
    const P3: [f64; 5] = [
        -0.00299610707703542174,
        -0.0494730910623250734,
        -0.226956593539686930,
        -0.278661308609647788,
        -0.0223192459734184686,
    ];
    const Q3: [f64; 5] = [
        0.0106209230528467918,
        0.191308926107829841,
        1.05167510706793207,
        1.98733201817135256,
        1.0,
    ];

    if x < -UPPERLIMIT {
        return 0.0;
    }
    if x > UPPERLIMIT {
        return 1.0;
    }

    let mut y = x / SQRT2;
    let negative = y < 0.0;
    if negative {
        y = -y;
    }
    let y2 = y * y;

    if y < 0.46875 {
        let y4 = y2 * y2;
        let y6 = y4 * y2;
        let r1 = P1[0] + P1[1] * y2 + P1[2] * y4 + P1[3] * y6;
        let r2 = Q1[0] + Q1[1] * y2 + Q1[2] * y4 + Q1[3] * y6;
        let erf = y * r1 / r2;
        if negative {
            0.5 - 0.5 * erf
        } else {
            0.5 + 0.5 * erf
        }
    } else if y < 4.0 {
        let mut r1 = P2[7];
        let mut r2 = Q2[7];
        for k in (0..7).rev() {
            r1 = r1 * y + P2[k];
            r2 = r2 * y + Q2[k];
        }
        let erfc = (-y2).exp() * r1 / r2;
        if negative {
            0.5 * erfc
        } else {
            1.0 - 0.5 * erfc
        }
    } else {
        let z = y2 * y2;
        let mut r1 = P3[4];
        let mut r2 = Q3[4];
        for k in (0..4).rev() {
            r1 = r1 * z + P3[k];
            r2 = r2 * z + Q3[k];
        }
        let erfc = ((-y2).exp() / y) * (1.0 / SQRTPI + r1 / (r2 * y2));
        if negative {
            0.5 * erfc
        } else {
            1.0 - 0.5 * erfc
        }
    }
}

/// Derivative selector for [`convolve_gauss`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Derivative {
    /// First derivative in row direction
    R,
    /// First derivative in column direction
    C,
    /// Second derivative in row direction
    Rr,
    /// Mixed second derivative
    Rc,
    /// Second derivative in column direction
    Cc,
}

/// Gaussian smoothing mask of radius `n`; returns (taps, n), taps indexed
/// `[-n..=n]` shifted by `n`.
pub fn gauss_mask_0(sigma: f64) -> (Vec<f64>, usize) {
    let n = mask_size(MAX_SIZE_MASK_0, sigma);
    let mut h = vec![0.0; 2 * n + 1];
    for i in -(n as isize) + 1..=n as isize - 1 {
        let fi = i as f64;
        h[(n as isize + i) as usize] = phi0(-fi + 0.5, sigma) - phi0(-fi - 0.5, sigma);
    }
    // Fold the truncated tail mass into the boundary taps.
    h[0] = 1.0 - phi0(n as f64 - 0.5, sigma);
    h[2 * n] = phi0(-(n as f64) + 0.5, sigma);
    (h, n)
}

/// First derivative of the Gaussian smoothing mask.
pub fn gauss_mask_1(sigma: f64) -> (Vec<f64>, usize) {
    let n = mask_size(MAX_SIZE_MASK_1, sigma);
    let mut h = vec![0.0; 2 * n + 1];
    for i in -(n as isize) + 1..=n as isize - 1 {
        let fi = i as f64;
        h[(n as isize + i) as usize] = phi1(-fi + 0.5, sigma) - phi1(-fi - 0.5, sigma);
    }
    h[0] = -phi1(n as f64 - 0.5, sigma);
    h[2 * n] = phi1(-(n as f64) + 0.5, sigma);
    (h, n)
}

/// Second derivative of the Gaussian smoothing mask.
pub fn gauss_mask_2(sigma: f64) -> (Vec<f64>, usize) {
    let n = mask_size(MAX_SIZE_MASK_2, sigma);
    let mut h = vec![0.0; 2 * n + 1];
    for i in -(n as isize) + 1..=n as isize - 1 {
        let fi = i as f64;
        h[(n as isize + i) as usize] = phi2(-fi + 0.5, sigma) - phi2(-fi - 0.5, sigma);
    }
    h[0] = -phi2(n as f64 - 0.5, sigma);
    h[2 * n] = phi2(-(n as f64) + 0.5, sigma);
    (h, n)
}

/// Convolve along the row coordinate (vertically), mirroring at the borders.
fn convolve_rows(image: &ImageF32, mask: &[f64], n: usize, out: &mut ImageF32) {
    let width = image.w;
    let height = image.h;
    let inner_end = height.saturating_sub(n);

    for r in n..inner_end {
        for c in 0..width {
            let mut sum = 0.0f64;
            for j in 0..=2 * n {
                let rr = r + j - n;
                sum += image.get(rr, c) as f64 * mask[j];
            }
            out.set(r, c, sum as f32);
        }
    }
    let mut border = |r: usize| {
        for c in 0..width {
            let mut sum = 0.0f64;
            for j in 0..=2 * n {
                let rr = mirror(r as isize + j as isize - n as isize, height);
                sum += image.get(rr, c) as f64 * mask[j];
            }
            out.set(r, c, sum as f32);
        }
    };
    for r in 0..n.min(height) {
        border(r);
    }
    for r in inner_end..height {
        border(r);
    }
}

/// Convolve along the column coordinate (horizontally), mirroring at the
/// borders.
fn convolve_cols(image: &ImageF32, mask: &[f64], n: usize, out: &mut ImageF32) {
    let width = image.w;
    let height = image.h;
    let inner_end = width.saturating_sub(n);

    for r in 0..height {
        for c in n..inner_end {
            let mut sum = 0.0f64;
            for j in 0..=2 * n {
                let cc = c + j - n;
                sum += image.get(r, cc) as f64 * mask[j];
            }
            out.set(r, c, sum as f32);
        }
        let mut border = |c: usize| {
            let mut sum = 0.0f64;
            for j in 0..=2 * n {
                let cc = mirror(c as isize + j as isize - n as isize, width);
                sum += image.get(r, cc) as f64 * mask[j];
            }
            out.set(r, c, sum as f32);
        };
        for c in 0..n.min(width) {
            border(c);
        }
        for c in inner_end..width {
            border(c);
        }
    }
}

/// Convolve an image with a derivative of the Gaussian at scale `sigma`.
pub fn convolve_gauss(image: &ImageF32, sigma: f64, deriv: Derivative) -> ImageF32 {
    let (mask_r, nr) = match deriv {
        Derivative::R | Derivative::Rc => gauss_mask_1(sigma),
        Derivative::C => gauss_mask_0(sigma),
        Derivative::Rr => gauss_mask_2(sigma),
        Derivative::Cc => gauss_mask_0(sigma),
    };
    let (mask_c, nc) = match deriv {
        Derivative::R => gauss_mask_0(sigma),
        Derivative::C | Derivative::Rc => gauss_mask_1(sigma),
        Derivative::Rr => gauss_mask_0(sigma),
        Derivative::Cc => gauss_mask_2(sigma),
    };

    let mut tmp = ImageF32::new(image.w, image.h);
    let mut out = ImageF32::new(image.w, image.h);
    convolve_rows(image, &mask_r, nr, &mut tmp);
    convolve_cols(&tmp, &mask_c, nc, &mut out);
    out
}

/// The five partial derivatives of the Gaussian-smoothed image.
#[derive(Clone, Debug)]
pub struct DerivativeField {
    pub r: ImageF32,
    pub c: ImageF32,
    pub rr: ImageF32,
    pub rc: ImageF32,
    pub cc: ImageF32,
}

/// Compute all derivative fields needed by one detection pass.
pub fn derivatives(image: &ImageF32, sigma: f64) -> DerivativeField {
    DerivativeField {
        r: convolve_gauss(image, sigma, Derivative::R),
        c: convolve_gauss(image, sigma, Derivative::C),
        rr: convolve_gauss(image, sigma, Derivative::Rr),
        rc: convolve_gauss(image, sigma, Derivative::Rc),
        cc: convolve_gauss(image, sigma, Derivative::Cc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_cdf_symmetry() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        for &x in &[0.1, 0.7, 1.5, 3.0, 6.0] {
            let s = normal_cdf(x) + normal_cdf(-x);
            assert!((s - 1.0).abs() < 1e-12, "cdf({x}) not symmetric: {s}");
        }
        assert!((normal_cdf(1.0) - 0.841344746068543).abs() < 1e-7);
    }

    #[test]
    fn smoothing_mask_conserves_mass() {
        for &sigma in &[0.4, 1.0, 1.5, 2.4, 5.0] {
            let (mask, _) = gauss_mask_0(sigma);
            let sum: f64 = mask.iter().sum();
            assert!(
                (sum - 1.0).abs() < 1e-9,
                "mask mass for sigma={sigma}: {sum}"
            );
        }
    }

    #[test]
    fn derivative_masks_are_antisymmetric_or_symmetric() {
        let (m1, n1) = gauss_mask_1(1.3);
        for i in 0..=n1 {
            assert!((m1[n1 + i] + m1[n1 - i]).abs() < 1e-12);
        }
        let sum1: f64 = m1.iter().sum();
        assert!(sum1.abs() < 1e-12);

        let (m2, n2) = gauss_mask_2(1.3);
        for i in 0..=n2 {
            assert!((m2[n2 + i] - m2[n2 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn constant_image_has_zero_derivatives() {
        let img = ImageF32::from_vec(16, 12, vec![42.0; 16 * 12]);
        let d = derivatives(&img, 1.0);
        for r in 0..12 {
            for c in 0..16 {
                assert!(d.r.get(r, c).abs() < 1e-4);
                assert!(d.rr.get(r, c).abs() < 1e-4);
                assert!(d.rc.get(r, c).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn mirror_reflects_both_ends() {
        assert_eq!(mirror(-3, 10), 3);
        assert_eq!(mirror(4, 10), 4);
        assert_eq!(mirror(10, 10), 8);
        assert_eq!(mirror(12, 10), 6);
    }
}
