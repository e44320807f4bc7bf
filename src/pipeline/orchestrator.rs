//! Pipeline orchestrator: preprocess → gather → transcribe → teardown.
//!
//! # Ledger decisions
//!
//! ```text
//! ledger state            preprocess / transcribe stage
//! ─────────────────────   ─────────────────────────────────────────
//! missing / no sentinel   (re)populate from discovery, then drain
//! sentinel, items left    keep as is, drain what is left
//! sentinel first          stage is done, skip it
//! ```
//!
//! Teardown deletes both ledgers once neither has pending items.  It is the
//! clean-slate step at the end of a run, distinct from `--new`, which deletes
//! them before anything runs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::{PipelineConfig, PipelinePaths};
use crate::context::ContextBundle;
use crate::invoke::{RetryPolicy, RetryingInvoker};
use crate::ledger::{Ledger, LedgerError};
use crate::preprocess::{ImagePreprocessor, PreprocessOptions};
use crate::stage::{
    stem_of, PreprocessAction, ProcessingOrder, StageError, StageOutcome, StageRunner,
    TranscribeAction,
};
use crate::transcribe::TranscriptionService;

use super::discover::{discover_images, gather_processed, remove_partials, to_items};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Errors that halt the pipeline.  Per-item failures never surface here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing input directory, invalid filter options, and the like.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineReport
// ---------------------------------------------------------------------------

/// What one run did.  `None` means the stage was skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub preprocess: Option<StageOutcome>,
    pub transcribe: Option<StageOutcome>,
    /// Both ledgers were deleted at the end of the run.
    pub torn_down: bool,
    /// Items still queued across both ledgers when the run ended.
    pub remaining: usize,
}

impl PipelineReport {
    /// Nothing was processed and nothing was left to process.
    pub fn is_noop(&self) -> bool {
        self.preprocess.map_or(true, |o| o.processed == 0)
            && self.transcribe.is_none()
            && self.remaining == 0
    }
}

// ---------------------------------------------------------------------------
// PipelineOrchestrator
// ---------------------------------------------------------------------------

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    paths: PipelinePaths,
    preprocessor: Arc<dyn ImagePreprocessor>,
    transcriber: Arc<dyn TranscriptionService>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        preprocessor: Arc<dyn ImagePreprocessor>,
        transcriber: Arc<dyn TranscriptionService>,
    ) -> Self {
        let paths = PipelinePaths::from_config(&config);
        Self {
            config,
            paths,
            preprocessor,
            transcriber,
        }
    }

    pub fn paths(&self) -> &PipelinePaths {
        &self.paths
    }

    /// Run every stage against the images in `input_dir`.
    ///
    /// With `fresh` set, all tracking state is discarded first.
    pub async fn run(&self, input_dir: &Path, fresh: bool) -> Result<PipelineReport, PipelineError> {
        if !input_dir.is_dir() {
            return Err(PipelineError::Config(format!(
                "input directory does not exist: {}",
                input_dir.display()
            )));
        }
        let options = PreprocessOptions::from_config(&self.config.preprocess);
        options
            .validate()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        if fresh {
            log::info!("pipeline: --new requested, discarding tracking state");
            for ledger in self.paths.ledgers() {
                Ledger::delete(ledger)?;
            }
        }
        self.paths
            .create_dirs()
            .map_err(|e| PipelineError::io(&self.paths.work_dir, e))?;
        for dir in [&self.paths.optimized_dir, &self.paths.transcription_dir] {
            let removed = remove_partials(dir).map_err(|e| PipelineError::io(dir, e))?;
            if removed > 0 {
                log::info!("pipeline: removed {removed} partial files from {}", dir.display());
            }
        }

        let invoker = RetryingInvoker::new(RetryPolicy::from_config(&self.config.retry));
        let mut report = PipelineReport::default();

        // ---- preprocess ---
        let ledger_path = &self.paths.preprocess_ledger;
        if self.prepare_preprocess(input_dir)? {
            let action = PreprocessAction::new(
                Arc::clone(&self.preprocessor),
                options,
                &self.paths.optimized_dir,
                self.config.preprocess.extensions.clone(),
            );
            let runner = StageRunner::new(action, invoker.clone());
            report.preprocess = Some(runner.drain(ledger_path).await?);
        } else {
            log::info!("pipeline: preprocessing already complete, skipping");
        }

        // ---- gather ---
        let newly_processed = report.preprocess.map_or(0, |o| o.processed);
        if !self.gather(newly_processed)? {
            log::info!("pipeline: no processed images found, nothing to transcribe");
            return self.finish(report);
        }

        // ---- transcribe ---
        let ledger_path = &self.paths.transcribe_ledger;
        if Ledger::load(ledger_path)?.is_done() {
            log::info!("pipeline: transcription already complete, skipping");
        } else {
            let context = ContextBundle::load(
                &self.paths.context_dir,
                &self.config.context.global_file,
            )
            .map_err(StageError::from)?;
            let action = TranscribeAction::new(
                Arc::clone(&self.transcriber),
                context,
                &self.paths.transcription_dir,
                self.config.transcription.output_extension.clone(),
            );
            let order = ProcessingOrder::from_reverse_flag(self.config.transcription.reverse_order);
            let runner = StageRunner::new(action, invoker).with_order(order);
            report.transcribe = Some(runner.drain(ledger_path).await?);
        }

        self.finish(report)
    }

    /// Teardown: delete both ledgers once nothing is pending in either.
    fn finish(&self, mut report: PipelineReport) -> Result<PipelineReport, PipelineError> {
        report.remaining = self.pending()?;
        if report.remaining == 0 {
            for ledger in self.paths.ledgers() {
                Ledger::delete(ledger)?;
            }
            report.torn_down = true;
            log::info!("pipeline: all stages complete, tracking files removed");
        } else {
            log::warn!(
                "pipeline: {} items still pending; rerun to retry them",
                report.remaining
            );
        }
        Ok(report)
    }

    /// Decide whether the preprocess stage runs, populating its ledger when
    /// discovery never completed.
    fn prepare_preprocess(&self, input_dir: &Path) -> Result<bool, PipelineError> {
        let path = &self.paths.preprocess_ledger;
        let ledger = Ledger::load(path)?;
        if ledger.is_done() {
            return Ok(false);
        }
        if !ledger.has_sentinel {
            let images = discover_images(input_dir, &self.config.preprocess.extensions)
                .map_err(|e| PipelineError::io(input_dir, e))?;
            log::info!("pipeline: queued {} images for preprocessing", images.len());
            Ledger::repopulate(path, &to_items(&images))?;
        }
        Ok(true)
    }

    /// Populate the transcription ledger from the preprocess output.
    ///
    /// Returns `false` when there is nothing to transcribe at all.
    fn gather(&self, newly_processed: usize) -> Result<bool, PipelineError> {
        let path = &self.paths.transcribe_ledger;
        if Ledger::ensure(path)? {
            log::debug!("pipeline: created {}", path.display());
        }
        let ledger = Ledger::load(path)?;

        if ledger.has_sentinel && newly_processed == 0 {
            return Ok(true);
        }

        // An image whose source is still queued for preprocessing is not a
        // completed output of this run, whatever an older run left behind.
        let unfinished: HashSet<String> = Ledger::load(&self.paths.preprocess_ledger)?
            .items
            .iter()
            .map(|item| stem_of(Path::new(item)))
            .collect();
        let processed: Vec<PathBuf> = gather_processed(&self.paths.optimized_dir)
            .map_err(|e| PipelineError::io(&self.paths.optimized_dir, e))?
            .into_iter()
            .filter(|image| !unfinished.contains(&stem_of(image)))
            .collect();

        if !ledger.has_sentinel {
            if processed.is_empty() && ledger.is_empty() {
                return Ok(false);
            }
            log::info!("pipeline: queued {} images for transcription", processed.len());
            Ledger::repopulate(path, &to_items(&processed))?;
            return Ok(true);
        }

        // Earlier failures were preprocessed this run; add every image whose
        // transcript is missing or older than the image behind the items
        // still pending.
        let mut items = ledger.items;
        let queued: HashSet<String> = items.iter().cloned().collect();
        let added: Vec<String> = to_items(&processed)
            .into_iter()
            .filter(|item| !queued.contains(item) && !self.transcript_is_current(Path::new(item)))
            .collect();
        if !added.is_empty() {
            log::info!("pipeline: queued {} newly processed images for transcription", added.len());
            items.extend(added);
            Ledger::repopulate(path, &items)?;
        }
        Ok(true)
    }

    /// A transcript exists for `image` and was written after it.
    fn transcript_is_current(&self, image: &Path) -> bool {
        let transcript = self.paths.transcription_dir.join(format!(
            "{}.{}",
            stem_of(image),
            self.config.transcription.output_extension
        ));
        let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
        match (modified(&transcript), modified(image)) {
            (Some(text), Some(img)) => text >= img,
            _ => false,
        }
    }

    fn pending(&self) -> Result<usize, PipelineError> {
        let mut total = 0;
        for ledger in self.paths.ledgers() {
            total += Ledger::load(ledger)?.len();
        }
        Ok(total)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
