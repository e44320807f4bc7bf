//! Application entry point for `doc-transcribe`.
//!
//! # Startup sequence
//!
//! 1. Parse the command line and initialise logging.
//! 2. Load [`PipelineConfig`] (default when no settings file exists).
//! 3. Without an input path, only clean the transcripts (`--clean`) and stop.
//! 4. Fail fast on configuration errors: missing API key, missing input dir.
//! 5. Build the Gemini transcriber and the image filter.
//! 6. Run the orchestrator on a tokio runtime.
//! 7. Optionally clean model boilerplate out of the transcripts.
//!
//! Exit code is 0 on success or a graceful no-op, 1 on any fatal error.

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use doc_transcribe::{
    cleanup::{PhraseCleaner, TokenCosineScorer},
    config::{PipelineConfig, PipelinePaths},
    pipeline::{PipelineOrchestrator, PipelineReport},
    preprocess::ImageFilter,
    transcribe::gemini::GeminiTranscriber,
};

use cli::Cli;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            PipelineConfig::load_from(path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => PipelineConfig::load().context("failed to load settings")?,
    };
    let clean_dir = cli
        .clean_dir
        .clone()
        .unwrap_or_else(|| PipelinePaths::from_config(&config).transcription_dir);

    let Some(input_path) = &cli.input_path else {
        return clean(&clean_dir, &config);
    };

    let api_key = config.transcription.resolve_api_key().ok_or_else(|| {
        anyhow!(
            "no API key: set {} or transcription.api_key in the config file",
            config.transcription.api_key_env
        )
    })?;
    if !input_path.is_dir() {
        bail!("input directory does not exist: {}", input_path.display());
    }

    log::info!(
        "doc-transcribe starting: input {}, work dir {}, model {}",
        input_path.display(),
        config.work_dir.display(),
        config.transcription.model
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let transcriber = GeminiTranscriber::from_config(&config.transcription, api_key);
    let orchestrator = PipelineOrchestrator::new(
        config.clone(),
        Arc::new(ImageFilter::new()),
        Arc::new(transcriber),
    );

    let report = rt.block_on(orchestrator.run(input_path, cli.new))?;
    summarise(&report);

    if cli.clean {
        clean(&clean_dir, &config)?;
    }

    Ok(())
}

/// Strip boilerplate from the transcripts in `dir` and print what needs review.
fn clean(dir: &Path, config: &PipelineConfig) -> Result<()> {
    if !dir.is_dir() {
        bail!("transcript directory does not exist: {}", dir.display());
    }
    let cleaner = PhraseCleaner::new(Box::new(TokenCosineScorer::new()), config.cleanup.clone())
        .with_extension(config.transcription.output_extension.as_str());
    let flagged = cleaner.clean_dir(dir)?;
    for file in &flagged {
        println!("review: {}", file.path.display());
        for line in [&file.first_line, &file.last_line].into_iter().flatten() {
            println!(
                "  line {} (similarity {:.2}): {}",
                line.number, line.score, line.text
            );
        }
    }
    Ok(())
}

fn summarise(report: &PipelineReport) {
    if report.is_noop() {
        log::info!("nothing to do: no images found and nothing queued");
        return;
    }
    if let Some(o) = report.preprocess {
        log::info!(
            "preprocess: {} processed, {} failed, {} skipped, {} missing",
            o.processed,
            o.failed,
            o.skipped,
            o.missing
        );
    }
    if let Some(o) = report.transcribe {
        log::info!(
            "transcribe: {} processed, {} failed, {} skipped, {} missing",
            o.processed,
            o.failed,
            o.skipped,
            o.missing
        );
    }
    if report.remaining > 0 {
        log::warn!("{} items remain queued for the next run", report.remaining);
    }
}
