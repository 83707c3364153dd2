//! Removes interfaces, processes and bridges left behind by earlier vnet sessions.
//!
//! Needs root. Logging verbosity follows `RUST_LOG`, `info` by default.

use tracing_subscriber::EnvFilter;
use vnet::Cleanup;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cleanup = Cleanup::native();
    tracing::info!(flavor = ?cleanup.flavor(), "cleaning up");

    let report = cleanup.run();
    if report.is_clean() {
        println!("nothing to clean up");
    } else {
        println!("removed {report}");
    }
}
