//! Run-length extraction of the candidate-seed region.

/// A maximal horizontal run of pixels passing the threshold test, in row
/// `r` spanning columns `cb..=ce`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Chord {
    pub r: usize,
    pub cb: usize,
    pub ce: usize,
}

/// Collect all chords of pixels with `image[pos] >= min`.
pub(crate) fn threshold(image: &[u8], min: u8, width: usize, height: usize) -> Vec<Chord> {
    let mut chords = Vec::new();
    for r in 0..height {
        let row = &image[r * width..(r + 1) * width];
        let mut inside: Option<usize> = None;
        for (c, &grey) in row.iter().enumerate() {
            if grey >= min {
                if inside.is_none() {
                    inside = Some(c);
                }
            } else if let Some(cb) = inside.take() {
                chords.push(Chord { r, cb, ce: c - 1 });
            }
        }
        if let Some(cb) = inside {
            chords.push(Chord {
                r,
                cb,
                ce: width - 1,
            });
        }
    }
    chords
}
