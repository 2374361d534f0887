use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` if set, else `default`.
fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Compact human-readable logs on stderr; stdout is left for command output
/// such as barcode lists and YAML dumps.
pub fn init_cli_logger(verbose: bool) {
    let filter = env_filter(if verbose {
        "mtd_parts=debug,info"
    } else {
        "mtd_parts=info"
    });

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .compact();

    // A second init (tests, presets run from the CLI) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}

/// JSON lines for batch jobs whose output is collected by a log shipper.
pub fn init_json_logger() {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .json()
        .with_current_span(false);

    let _ = tracing_subscriber::registry()
        .with(env_filter("mtd_parts=info"))
        .with(layer)
        .try_init();
}
