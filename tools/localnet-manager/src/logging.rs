// Copyright 2025 - Nym Technologies SA <contact@nymtech.net>
// SPDX-License-Identifier: Apache-2.0

use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

// RUST_LOG always takes precedence over the level chosen via the command line
pub(crate) fn default_tracing_env_filter(default_level: LevelFilter) -> EnvFilter {
    if ::std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .parse_lossy("")
    }
}

fn default_tracing_fmt_layer<S>() -> impl tracing_subscriber::Layer<S> + Sync + Send + 'static
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
}

pub(crate) fn setup_tracing_logger(default_level: LevelFilter) {
    tracing_subscriber::registry()
        .with(default_tracing_fmt_layer())
        .with(default_tracing_env_filter(default_level))
        .init()
}
