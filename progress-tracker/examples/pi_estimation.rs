//! Estimating π with Monte Carlo
//!
//! Run with:
//!   cargo run --example pi_estimation                        # 30 isolated samples per target
//!   cargo run --example pi_estimation -- --samples 3         # fewer samples
//!   cargo run --example pi_estimation -- --isolated=false    # run in-process
//!   cargo run --example pi_estimation -- list                # show the plan
//!   cargo run --example pi_estimation -- '1000-samples$'     # one target only
//!
//! Results accumulate in progress.json (see --output).

use progress_tracker::prelude::*;
use rand::Rng;
use std::f64::consts::PI;
use std::hint::black_box;

fn estimate_pi(samples: u64) -> f64 {
    let mut rng = rand::thread_rng();
    let mut circle_points = 0u64;

    for _ in 0..samples {
        let x: f64 = rng.gen_range(-1.0..=1.0);
        let y: f64 = rng.gen_range(-1.0..=1.0);
        if x * x + y * y <= 1.0 {
            circle_points += 1;
        }
    }

    4.0 * circle_points as f64 / samples as f64
}

fn bench(rec: &Recorder, params: &Parameters) -> anyhow::Result<()> {
    let samples: u64 = params.get("samples")?;

    let estimation = {
        let _timer = rec
            .metric("time-ms", "Time (ms)")
            .alert(">", samples as f64 * 0.001)?
            .time();
        black_box(estimate_pi(black_box(samples)))
    };

    println!("Estimation: {estimation:.6}");
    rec.record("estimation", "Estimation", estimation);

    let error_percent = (estimation - PI).abs() / PI * 100.0;
    rec.metric("error-percent", "Error (%)")
        .alert(">", 5)?
        .value(error_percent);

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let targets = [1_000u64, 10_000, 100_000, 1_000_000].map(|samples| {
        Target::new(
            format!("monte-carlo-pi-{samples}-samples"),
            format!("Estimating π with Monte Carlo ({samples} samples)"),
        )
        .param("samples", samples)
    });

    let benchmark = Benchmark::new(bench)
        .code(include_str!("pi_estimation.rs"))
        .targets(targets);

    progress_tracker::run(benchmark)
}
