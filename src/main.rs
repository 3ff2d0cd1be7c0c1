//! Sparse n-gram source-code search engine.
//!
//! Binary crate entry point. All CLI logic lives in `gramsearch::cli`.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    gramsearch::cli::run();
}
