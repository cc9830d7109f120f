pub mod common;
pub mod config;

pub use config::ToolConfig;

/// Install the fmt subscriber. `RUST_LOG` wins; otherwise `info` for the workspace crates.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("seg_dataset=info,seg_inference=info,seg_tools=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
