//! Borrowed 8-bit grayscale view, the cheapest way to hand pixel data in.
use super::ImageF32;

#[derive(Clone, Copy, Debug)]
pub struct ImageU8<'a> {
    /// Image width in pixels
    pub w: usize,
    /// Image height in pixels
    pub h: usize,
    /// Number of bytes between consecutive rows
    pub stride: usize,
    /// Borrowed pixel data in row-major order
    pub data: &'a [u8],
}

impl<'a> ImageU8<'a> {
    /// Widen to an owned float image, preserving the raw 0..255 scale.
    pub fn to_f32(&self) -> ImageF32 {
        let mut out = ImageF32::new(self.w, self.h);
        for r in 0..self.h {
            let src = &self.data[r * self.stride..r * self.stride + self.w];
            let dst = out.row_mut(r);
            for (d, &s) in dst.iter_mut().zip(src) {
                *d = s as f32;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_f32_honors_stride() {
        // 2x2 payload inside rows of stride 3.
        let data = [1u8, 2, 255, 3, 4, 255];
        let view = ImageU8 {
            w: 2,
            h: 2,
            stride: 3,
            data: &data,
        };
        let img = view.to_f32();
        assert_eq!(img.get(0, 0), 1.0);
        assert_eq!(img.get(0, 1), 2.0);
        assert_eq!(img.get(1, 0), 3.0);
        assert_eq!(img.get(1, 1), 4.0);
    }
}
