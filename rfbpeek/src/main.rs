use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rfbpeek::args::Args;
use rfbpeek::{replay, Assembler, Capture, Filter};
use tracing::info;

fn init_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("rfbpeek={log_level},rfb_session={log_level},rfb_output={log_level}")
                    .into()
            }),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("Starting rfbpeek {}", env!("CARGO_PKG_VERSION"));

    let config = args.config()?;
    let filter = Filter::parse(args.filter.as_deref().unwrap_or_default())?;
    if !filter.is_empty() {
        info!(%filter, "packet filter");
    }

    let (images, files) = rfb_output::build_sinks(&config.output)?;
    let router = rfb_session::build_router(&config, Arc::new(images), Arc::new(files));
    let mut assembler = Assembler::new(router);

    for path in &args.captures {
        let mut capture = Capture::open(path)?;
        let stats = replay(&mut capture, &filter, &mut assembler);
        info!(
            capture = %path.display(),
            packets = stats.packets,
            segments = stats.segments,
            "capture done"
        );
    }

    assembler.finish();
    info!(unpaired = assembler.router().pending(), "all captures replayed");
    Ok(())
}
