//! Per-item work performed by a stage.
//!
//! A [`StageAction`] knows which ledger items it can handle, where each
//! item's artifact goes, and how to make one attempt at producing it.
//! Retrying and ledger bookkeeping belong to the
//! [`StageRunner`](crate::stage::StageRunner).

use std::ffi::OsString;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{ContextBundle, BASE_PROMPT};
use crate::invoke::AttemptError;
use crate::preprocess::{ImagePreprocessor, PreprocessOptions};
use crate::transcribe::{mime_for, TranscriptionService};

// ---------------------------------------------------------------------------
// StageAction trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StageAction: Send + Sync {
    /// Short stage name used in progress lines.
    fn name(&self) -> &str;

    /// Whether `item` is something this stage processes.  Rejected items
    /// stay in the ledger and are reported as skipped.
    fn accepts(&self, _item: &Path) -> bool {
        true
    }

    /// Where the artifact for `item` is written.
    fn output_path(&self, item: &Path) -> PathBuf;

    /// One attempt at producing `output` from `item`.
    async fn attempt(&self, item: &Path, output: &Path) -> Result<(), AttemptError>;
}

/// File name without its extension, lossily decoded.
pub fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Whether `path` has one of `extensions`, compared case-insensitively.
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(e)))
}

/// Sibling `<output>.part` that an artifact is written to before it is
/// renamed into place.
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

/// Rename `partial` onto `output` when `result` is `Ok`; remove it otherwise.
fn commit_partial(
    result: Result<(), AttemptError>,
    partial: &Path,
    output: &Path,
) -> Result<(), AttemptError> {
    let result = result.and_then(|()| {
        std::fs::rename(partial, output)
            .map_err(|e| AttemptError::Retryable(format!("{}: {e}", output.display())))
    });
    if result.is_err() {
        let _ = std::fs::remove_file(partial);
    }
    result
}

// ---------------------------------------------------------------------------
// PreprocessAction
// ---------------------------------------------------------------------------

/// Source image → `<out_dir>/<stem>.jpeg`.
///
/// The preprocessor writes `<stem>.jpeg.part`; only a successful call is
/// renamed into place, so the gather stage never sees a half-written image.
pub struct PreprocessAction {
    preprocessor: Arc<dyn ImagePreprocessor>,
    options: PreprocessOptions,
    out_dir: PathBuf,
    extensions: Vec<String>,
}

impl PreprocessAction {
    pub fn new(
        preprocessor: Arc<dyn ImagePreprocessor>,
        options: PreprocessOptions,
        out_dir: impl Into<PathBuf>,
        extensions: Vec<String>,
    ) -> Self {
        Self {
            preprocessor,
            options,
            out_dir: out_dir.into(),
            extensions,
        }
    }
}

#[async_trait]
impl StageAction for PreprocessAction {
    fn name(&self) -> &str {
        "preprocess"
    }

    fn accepts(&self, item: &Path) -> bool {
        has_extension(item, &self.extensions)
    }

    fn output_path(&self, item: &Path) -> PathBuf {
        self.out_dir.join(format!("{}.jpeg", stem_of(item)))
    }

    async fn attempt(&self, item: &Path, output: &Path) -> Result<(), AttemptError> {
        let preprocessor = Arc::clone(&self.preprocessor);
        let options = self.options.clone();
        let source = item.to_path_buf();
        let partial = partial_path(output);
        let dest = partial.clone();

        // CPU-bound; keep it off the async workers.
        let result =
            tokio::task::spawn_blocking(move || preprocessor.preprocess(&source, &dest, &options))
                .await
                .map_err(|e| AttemptError::Retryable(format!("preprocess task failed: {e}")))
                .and_then(|r| r.map_err(AttemptError::from));

        commit_partial(result, &partial, output)
    }
}

// ---------------------------------------------------------------------------
// TranscribeAction
// ---------------------------------------------------------------------------

/// Preprocessed image → `<out_dir>/<stem>.<ext>`, prompt enriched with
/// document context.
///
/// Text is streamed into `<output>.part` and renamed into place only once
/// the stream has completed and been synced, so a visible transcript is
/// always a whole one.
pub struct TranscribeAction {
    service: Arc<dyn TranscriptionService>,
    context: ContextBundle,
    base_prompt: String,
    out_dir: PathBuf,
    extension: String,
}

impl TranscribeAction {
    pub fn new(
        service: Arc<dyn TranscriptionService>,
        context: ContextBundle,
        out_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            service,
            context,
            base_prompt: BASE_PROMPT.to_string(),
            out_dir: out_dir.into(),
            extension: extension.into(),
        }
    }

    pub fn with_base_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.base_prompt = prompt.into();
        self
    }

    /// Prompt sent for `item`.
    pub fn prompt_for(&self, item: &Path) -> String {
        self.context.prompt_for(&stem_of(item), &self.base_prompt)
    }
}

#[async_trait]
impl StageAction for TranscribeAction {
    fn name(&self) -> &str {
        "transcribe"
    }

    fn accepts(&self, item: &Path) -> bool {
        mime_for(item).is_some()
    }

    fn output_path(&self, item: &Path) -> PathBuf {
        self.out_dir
            .join(format!("{}.{}", stem_of(item), self.extension))
    }

    async fn attempt(&self, item: &Path, output: &Path) -> Result<(), AttemptError> {
        let partial = partial_path(output);
        let result = self.stream_to(item, &partial).await;
        commit_partial(result, &partial, output)
    }
}

impl TranscribeAction {
    /// Stream the transcript for `item` into `partial` and sync it.
    async fn stream_to(&self, item: &Path, partial: &Path) -> Result<(), AttemptError> {
        let prompt = self.prompt_for(item);
        let io_err = |e: std::io::Error| AttemptError::Retryable(format!("{}: {e}", partial.display()));

        let file = std::fs::File::create(partial).map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        self.service.transcribe(item, &prompt, &mut writer).await?;

        let file = writer
            .into_inner()
            .map_err(|e| io_err(e.into_error()))?;
        file.sync_all().map_err(io_err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::PreprocessError;
    use crate::transcribe::TranscribeError;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Records the prompt and streams fixed chunks.
    struct FakeTranscriber {
        chunks: Vec<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TranscriptionService for FakeTranscriber {
        async fn transcribe(
            &self,
            _image: &Path,
            prompt: &str,
            sink: &mut (dyn Write + Send),
        ) -> Result<u64, TranscribeError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut n = 0;
            for chunk in &self.chunks {
                sink.write_all(chunk.as_bytes())?;
                n += chunk.len() as u64;
            }
            Ok(n)
        }
    }

    struct FailingTranscriber;

    #[async_trait]
    impl TranscriptionService for FailingTranscriber {
        async fn transcribe(
            &self,
            _image: &Path,
            _prompt: &str,
            sink: &mut (dyn Write + Send),
        ) -> Result<u64, TranscribeError> {
            sink.write_all(b"half a pa")?;
            Err(TranscribeError::Timeout)
        }
    }

    struct FakePreprocessor;

    impl ImagePreprocessor for FakePreprocessor {
        fn preprocess(
            &self,
            source: &Path,
            dest: &Path,
            _options: &PreprocessOptions,
        ) -> Result<(), PreprocessError> {
            if source.to_string_lossy().contains("corrupt") {
                return Err(PreprocessError::Decode("bad header".into()));
            }
            if source.to_string_lossy().contains("full") {
                std::fs::write(dest, b"\xff\xd8trunc").unwrap();
                return Err(PreprocessError::Write("disk full".into()));
            }
            std::fs::write(dest, b"jpeg").map_err(|e| PreprocessError::Write(e.to_string()))
        }
    }

    fn exts() -> Vec<String> {
        vec!["png".into(), "tif".into()]
    }

    // ---- PreprocessAction ---

    #[test]
    fn preprocess_accepts_configured_extensions_only() {
        let action = PreprocessAction::new(
            Arc::new(FakePreprocessor),
            PreprocessOptions::default(),
            "/out",
            exts(),
        );
        assert!(action.accepts(Path::new("/in/a.PNG")));
        assert!(action.accepts(Path::new("/in/b.tif")));
        assert!(!action.accepts(Path::new("/in/notes.txt")));
        assert!(!action.accepts(Path::new("/in/README")));
        assert_eq!(
            action.output_path(Path::new("/in/scan 01.tif")),
            PathBuf::from("/out/scan 01.jpeg")
        );
    }

    #[tokio::test]
    async fn preprocess_attempt_runs_on_blocking_pool() {
        let dir = tempdir().unwrap();
        let action = PreprocessAction::new(
            Arc::new(FakePreprocessor),
            PreprocessOptions::default(),
            dir.path(),
            exts(),
        );
        let out = dir.path().join("a.jpeg");
        action.attempt(Path::new("/in/a.png"), &out).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"jpeg");
    }

    #[tokio::test]
    async fn preprocess_decode_failure_is_terminal() {
        let dir = tempdir().unwrap();
        let action = PreprocessAction::new(
            Arc::new(FakePreprocessor),
            PreprocessOptions::default(),
            dir.path(),
            exts(),
        );
        let err = action
            .attempt(Path::new("/in/corrupt.png"), &dir.path().join("c.jpeg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptError::Terminal(_)));
    }

    #[tokio::test]
    async fn failed_preprocess_write_leaves_no_image() {
        let dir = tempdir().unwrap();
        let action = PreprocessAction::new(
            Arc::new(FakePreprocessor),
            PreprocessOptions::default(),
            dir.path(),
            exts(),
        );
        let out = action.output_path(Path::new("/in/disk_full.png"));

        let err = action
            .attempt(Path::new("/in/disk_full.png"), &out)
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert!(!out.exists());
        assert!(!partial_path(&out).exists());
    }

    #[test]
    fn has_extension_ignores_case() {
        let exts = exts();
        assert!(has_extension(Path::new("a.PnG"), &exts));
        assert!(!has_extension(Path::new("a.png.part"), &exts));
        assert!(!has_extension(Path::new("png"), &exts));
    }

    // ---- TranscribeAction ---

    #[tokio::test]
    async fn transcribe_concatenates_chunks_and_uses_context() {
        let dir = tempdir().unwrap();
        let service = Arc::new(FakeTranscriber {
            chunks: vec!["Dear ", "Sir", ",\n"],
            prompts: Mutex::new(Vec::new()),
        });
        let mut individual = HashMap::new();
        individual.insert("page_2".to_string(), "Second page of a letter".to_string());
        let context = ContextBundle {
            global: String::new(),
            individual,
        };
        let action = TranscribeAction::new(service.clone(), context, dir.path(), "txt")
            .with_base_prompt("Transcribe.");

        let item = Path::new("/img/page_2.jpeg");
        let out = action.output_path(item);
        assert_eq!(out, dir.path().join("page_2.txt"));

        action.attempt(item, &out).await.unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "Dear Sir,\n");
        assert!(!partial_path(&out).exists());
        assert_eq!(
            service.prompts.lock().unwrap().as_slice(),
            ["Given the context: Second page of a letter\nTranscribe.".to_string()]
        );
    }

    #[tokio::test]
    async fn failed_stream_leaves_no_artifact() {
        let dir = tempdir().unwrap();
        let action = TranscribeAction::new(
            Arc::new(FailingTranscriber),
            ContextBundle::default(),
            dir.path(),
            "txt",
        );
        let item = Path::new("/img/p.jpeg");
        let out = action.output_path(item);

        let err = action.attempt(item, &out).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(!out.exists());
        assert!(!partial_path(&out).exists());
    }

    #[test]
    fn transcribe_accepts_supported_images_only() {
        let action = TranscribeAction::new(
            Arc::new(FailingTranscriber),
            ContextBundle::default(),
            "/out",
            "md",
        );
        assert!(action.accepts(Path::new("/x/a.jpeg")));
        assert!(!action.accepts(Path::new("/x/a.tiff")));
        assert_eq!(
            action.output_path(Path::new("/x/a.jpeg")),
            PathBuf::from("/out/a.md")
        );
    }

    #[test]
    fn stem_of_handles_odd_paths() {
        assert_eq!(stem_of(Path::new("/a/b/c.d.jpeg")), "c.d");
        assert_eq!(stem_of(Path::new("/")), "");
    }
}
