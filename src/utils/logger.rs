use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Builds the filter used by the CLI. `RUST_LOG` always wins; otherwise the
/// configured level applies to this crate, bumped to debug by `--verbose`.
pub fn cli_filter(verbose: bool, configured_level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose {
            "debug"
        } else {
            configured_level.unwrap_or("info")
        };
        EnvFilter::new(format!("juggler={},warn", level))
    })
}

pub fn init_cli_logger(verbose: bool, configured_level: Option<&str>) {
    tracing_subscriber::registry()
        .with(cli_filter(verbose, configured_level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// JSON lines on stderr, for running under a supervisor that ships logs.
pub fn init_json_logger(verbose: bool, configured_level: Option<&str>) {
    tracing_subscriber::registry()
        .with(cli_filter(verbose, configured_level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .json(),
        )
        .init();
}
