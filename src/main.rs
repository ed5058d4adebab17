mod cli;

use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use cli::Args;
use pagescribe::{BatchRunner, PageScribeBuilder};
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_span_events(FmtSpan::CLOSE)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut builder = PageScribeBuilder::new()
        .detector_model(&args.detector)
        .recognizer_model(&args.encoder, &args.decoder, &args.tokenizer)
        .threads(args.threads);
    if let Some(cache) = &args.engine_cache {
        std::fs::create_dir_all(cache)
            .with_context(|| format!("failed to create {}", cache.display()))?;
        builder = builder.with_engine_cache_path(cache);
    }
    let scribe = builder.build().context("failed to load models")?;

    let start = Instant::now();
    let report = BatchRunner::new(&scribe, &args.input_dir, &args.output_dir)
        .run()
        .with_context(|| format!("failed to process {}", args.input_dir.display()))?;
    log::debug!("{:?}", start.elapsed());

    println!(
        "Processing complete! {} processed, {} skipped, {} unreadable, {} failed",
        report.processed, report.skipped, report.unreadable, report.failed
    );
    Ok(())
}
