//! SplitPay Logging
//!
//! One place to install the `tracing` subscriber for SplitPay binaries.
//! `RUST_LOG` always wins over the defaults below.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,splitpay=debug";

/// Filter used for `--verbose` runs when `RUST_LOG` is unset
pub const VERBOSE_FILTER: &str = "debug";

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init(verbose: bool) {
    init_with_default(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER });
}

pub fn init_with_default(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}
