use ridge_detector::prelude::*;

/// Bright bar of the given total width along the main diagonal.
pub fn diagonal_line_f32(width: usize, height: usize, line_width: f32) -> ImageF32 {
    let mut img = ImageF32::new(width, height);
    for r in 0..height {
        for c in 0..width {
            let d = (r as f32 - c as f32).abs() / std::f32::consts::SQRT_2;
            if d <= line_width / 2.0 {
                img.set(r, c, 100.0);
            }
        }
    }
    img
}

/// Two bright diagonal bars crossing in the image center.
pub fn x_crossing_f32(width: usize, height: usize, line_width: f32) -> ImageF32 {
    let mut img = ImageF32::new(width, height);
    let anti = (width - 1) as f32;
    for r in 0..height {
        for c in 0..width {
            let d1 = (r as f32 - c as f32).abs() / std::f32::consts::SQRT_2;
            let d2 = (r as f32 + c as f32 - anti).abs() / std::f32::consts::SQRT_2;
            if d1.min(d2) <= line_width / 2.0 {
                img.set(r, c, 100.0);
            }
        }
    }
    img
}

/// Bright ring centered in the image.
pub fn ring_f32(width: usize, height: usize, radius: f32, line_width: f32) -> ImageF32 {
    let mut img = ImageF32::new(width, height);
    let cr = (height - 1) as f32 / 2.0;
    let cc = (width - 1) as f32 / 2.0;
    for r in 0..height {
        for c in 0..width {
            let d = ((r as f32 - cr).hypot(c as f32 - cc) - radius).abs();
            if d <= line_width / 2.0 {
                img.set(r, c, 100.0);
            }
        }
    }
    img
}

/// Photometric inversion, turning bright lines into dark ones.
pub fn inverted(img: &ImageF32) -> ImageF32 {
    let data = img.data.iter().map(|&v| 255.0 - v).collect();
    ImageF32::from_vec(img.w, img.h, data)
}
