use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use ridge_detector::image::io::{load_grayscale_f32, write_json_file};
use ridge_detector::prelude::*;

/// Synthetic fallback input: a bright diagonal bar on a dark background.
fn synthetic_image(w: usize, h: usize) -> ImageF32 {
    let mut img = ImageF32::new(w, h);
    for r in 0..h {
        for c in 0..w {
            let d = (r as f32 - c as f32).abs();
            let v = 200.0 * (-d * d / 4.5).exp();
            img.set(r, c, v);
        }
    }
    img
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1);
    let input = args.next().map(PathBuf::from);
    let output = args.next().map(PathBuf::from);

    let img = match &input {
        Some(path) => load_grayscale_f32(path)?,
        None => synthetic_image(128, 128),
    };

    let mut det = RidgeDetector::new(RidgeParams {
        sigma: 1.5,
        low: 3.0,
        high: 8.0,
        correct_position: true,
        ..Default::default()
    });
    let res = det.detect(&img).map_err(|e| e.to_string())?;

    println!(
        "lines={} junctions={} latency_ms={:.3}",
        res.lines.len(),
        res.junctions.len(),
        res.latency_ms
    );
    for line in &res.lines {
        println!(
            "  line {:?}: {} points, length {:.1}, class {:?}",
            line.id,
            line.num_points(),
            line.estimate_length(),
            line.class
        );
    }
    if let Some(path) = output {
        write_json_file(&path, &res)?;
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::FAILURE
        }
    }
}
