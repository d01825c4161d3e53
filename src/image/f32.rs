//! Owned single-channel f32 image in row-major layout (stride == width).
//!
//! The detector input and all intermediate derivative fields use this type.
#[derive(Clone, Debug)]
pub struct ImageF32 {
    /// Image width in pixels
    pub w: usize,
    /// Image height in pixels
    pub h: usize,
    /// Number of f32 elements between consecutive rows (equals `w`)
    pub stride: usize,
    /// Backing storage in row-major order
    pub data: Vec<f32>,
}

impl ImageF32 {
    /// Construct a zero-initialized buffer of size `w × h`.
    pub fn new(w: usize, h: usize) -> Self {
        Self {
            w,
            h,
            stride: w,
            data: vec![0.0; w * h],
        }
    }

    /// Wrap an existing row-major buffer. Panics if the length is wrong.
    pub fn from_vec(w: usize, h: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), w * h, "buffer length must equal w * h");
        Self {
            w,
            h,
            stride: w,
            data,
        }
    }

    #[inline]
    /// Convert (row, col) to a linear index into `data`.
    pub fn idx(&self, r: usize, c: usize) -> usize {
        r * self.stride + c
    }

    #[inline]
    /// Get the pixel value at (row, col).
    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[self.idx(r, c)]
    }

    #[inline]
    /// Set the pixel value at (row, col).
    pub fn set(&mut self, r: usize, c: usize, v: f32) {
        let i = self.idx(r, c);
        self.data[i] = v;
    }

    #[inline]
    pub fn row(&self, r: usize) -> &[f32] {
        let start = r * self.stride;
        &self.data[start..start + self.w]
    }

    #[inline]
    pub fn row_mut(&mut self, r: usize) -> &mut [f32] {
        let start = r * self.stride;
        let end = start + self.w;
        &mut self.data[start..end]
    }
}
