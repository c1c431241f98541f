//! Motioncam Delta Benchmark
//!
//! Measures frame delta throughput of the scalar, chunked and dispatched
//! (SIMD where available) kernels on synthetic frames.
//!
//! Usage:
//!   cargo run --release --bin delta_benchmark [-- [OPTIONS]]
//!
//! Options:
//!   --width <px>        Frame width (default: 1280)
//!   --height <px>       Frame height (default: 720)
//!   --duration <secs>   Time spent on each kernel (default: 3s)

use std::hint::black_box;
use std::time::{Duration, Instant};

use motioncam_lib::motion::delta::{sum_abs_diff, sum_abs_diff_chunked, sum_abs_diff_scalar};

const DEFAULT_WIDTH: usize = 1280;
const DEFAULT_HEIGHT: usize = 720;
const DEFAULT_DURATION_SECS: u64 = 3;

type Kernel = fn(&[u8], &[u8]) -> u64;

const KERNELS: &[(&str, Kernel)] = &[
    ("scalar", sum_abs_diff_scalar),
    ("chunked", sum_abs_diff_chunked),
    ("dispatch", sum_abs_diff),
];

/// Result for a single kernel run
struct BenchmarkResult {
    name: &'static str,
    frames: u64,
    elapsed: Duration,
    checksum: u64,
}

impl BenchmarkResult {
    fn fps(&self) -> f64 {
        self.frames as f64 / self.elapsed.as_secs_f64()
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let arg = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .and_then(|s| s.parse::<u64>().ok())
    };
    let width = arg("--width").map(|v| v as usize).unwrap_or(DEFAULT_WIDTH);
    let height = arg("--height").map(|v| v as usize).unwrap_or(DEFAULT_HEIGHT);
    let duration = Duration::from_secs(arg("--duration").unwrap_or(DEFAULT_DURATION_SECS));

    println!("\n=== Motioncam Delta Benchmark ===\n");
    println!("  Frame:      {}x{} ({} bytes)", width, height, width * height);
    println!("  Duration:   {}s per kernel", duration.as_secs());
    println!("  Target:     {}", std::env::consts::ARCH);
    println!();

    let frames = synthetic_frames(width * height);

    let results: Vec<BenchmarkResult> = KERNELS
        .iter()
        .map(|&(name, kernel)| run_kernel(name, kernel, &frames, duration))
        .collect();

    let reference = results.first().map(|r| r.checksum);
    let baseline = results.first().map(|r| r.fps()).unwrap_or(1.0);

    println!("  {:<10} {:>12} {:>12} {:>10}  {}", "Kernel", "Frames/s", "GB/s", "Speedup", "Check");
    for r in &results {
        let bytes_per_sec = r.fps() * (width * height * 2) as f64;
        let check = if Some(r.checksum) == reference { "ok" } else { "MISMATCH" };
        println!(
            "  {:<10} {:>12.0} {:>12.2} {:>9.1}x  {}",
            r.name,
            r.fps(),
            bytes_per_sec / 1e9,
            r.fps() / baseline,
            check
        );
    }
    println!();
}

/// Two pseudo-random frames that differ in most pixels
fn synthetic_frames(len: usize) -> [Vec<u8>; 2] {
    let mut state: u32 = 0x9E37_79B9;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state as u8
    };
    let a: Vec<u8> = (0..len).map(|_| next()).collect();
    let b: Vec<u8> = (0..len).map(|_| next()).collect();
    [a, b]
}

fn run_kernel(name: &'static str, kernel: Kernel, frames: &[Vec<u8>; 2], duration: Duration) -> BenchmarkResult {
    let checksum = kernel(&frames[0], &frames[1]);

    let start = Instant::now();
    let mut count = 0u64;
    while start.elapsed() < duration {
        black_box(kernel(black_box(&frames[0]), black_box(&frames[1])));
        count += 1;
    }

    BenchmarkResult {
        name,
        frames: count,
        elapsed: start.elapsed(),
        checksum,
    }
}
