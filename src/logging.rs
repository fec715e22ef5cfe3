use std::io::Write;
use std::time::Instant;

use env_logger::Env;

/// Initialises logging for the osmdb commands. `RUST_LOG` overrides `level`.
///
/// Every line is prefixed with seconds since startup so the periodic import
/// and prefetch progress reports read as one timeline.
pub fn init(level: Option<&str>) {
    let default = level.unwrap_or("info");
    let started = Instant::now();
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default))
        .format(move |buf, record| {
            writeln!(
                buf,
                "[{:9.1} {}] {}",
                started.elapsed().as_secs_f64(),
                record.level(),
                record.args()
            )
        })
        .try_init();
}
