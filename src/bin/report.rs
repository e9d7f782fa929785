use {
    cache_effects::{
        operands, stats::num_unpinned_workers, Config, Padded, Traversal, Unpadded, CONFIG,
    },
    std::{
        hint::black_box,
        time::{Duration, Instant},
    },
};

fn main() -> cache_effects::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let config: &Config = &CONFIG;
    log::info!("{:?}", config);

    false_sharing(config)?;
    matrix_combination(config)?;
    Ok(())
}

/// Mean wall-clock time of `body` over `repetitions` runs, after one untimed warm-up run.
fn per_repetition(repetitions: u32, mut body: impl FnMut()) -> Duration {
    body();
    let now = Instant::now();
    for _ in 0..repetitions {
        body();
    }
    now.elapsed() / repetitions
}

fn ratio(slow: Duration, fast: Duration) -> f64 {
    slow.as_secs_f64() / fast.as_secs_f64()
}

fn false_sharing(config: &Config) -> cache_effects::Result<()> {
    let unpadded = Unpadded::from_config(config)?;
    let unpadded_time = per_repetition(config.repetitions, || unpadded.repetition());
    log::info!("false_sharing/unpadded: {:?}", unpadded_time);
    drop(unpadded);

    let padded = Padded::from_config(config)?;
    let padded_time = per_repetition(config.repetitions, || padded.repetition());
    log::info!("false_sharing/padded: {:?}", padded_time);

    log::info!(
        "unpadded is {:.2}x slower than padded",
        ratio(unpadded_time, padded_time)
    );
    if num_unpinned_workers() > 0 {
        log::warn!(
            "{} worker(s) ran unpinned, results may understate false sharing",
            num_unpinned_workers()
        );
    }
    Ok(())
}

fn matrix_combination(config: &Config) -> cache_effects::Result<()> {
    let tiling = config.tiling()?;
    let mut times = Vec::new();
    for traversal in Traversal::all(tiling) {
        let (mut lhs, rhs) = operands(config.matrix_len);
        let time = per_repetition(config.repetitions, || traversal.apply(&mut lhs, &rhs));
        black_box(&lhs);
        log::info!("matrix_combination/{}: {:?}", traversal.name(), time);
        times.push(time);
    }
    let (row_major, transposed, blocked) = (times[0], times[1], times[2]);
    log::info!(
        "transposed is {:.2}x slower than row_major",
        ratio(transposed, row_major)
    );
    log::info!(
        "transposed is {:.2}x slower than transposed_blocked",
        ratio(transposed, blocked)
    );
    Ok(())
}
