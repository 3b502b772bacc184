//! Diagnostic logging to stderr
//!
//! stdout carries rendered manifests and helm output, so logs never go there.

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;

/// Install the global subscriber
///
/// `RUST_LOG` wins when it parses; otherwise `warn`, or `debug` with `--debug`.
pub fn setup_logging(debug: bool) {
    let default_level = if debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let default_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .parse_lossy("");

    let env_filter = match std::env::var("RUST_LOG") {
        Ok(directive) => match EnvFilter::builder().parse(&directive) {
            Ok(filter) => filter,
            Err(err) => {
                eprintln!("invalid log filter: {err}");
                eprintln!("falling back to default logging");
                default_filter
            }
        },
        Err(_) => default_filter,
    };

    let use_color = std::io::IsTerminal::is_terminal(&std::io::stderr());
    let fmt_layer = tracing_subscriber::fmt::Layer::new()
        .compact()
        .without_time()
        .with_ansi(use_color)
        .with_writer(std::io::stderr);

    let subscriber = tracing_subscriber::registry().with(fmt_layer).with(env_filter);
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {err}");
    }
}
