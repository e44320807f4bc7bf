//! Transcription prompt composition.
//!
//! [`compose`] is pure: given the context blobs already loaded by
//! [`ContextBundle`](crate::context::ContextBundle) it prefixes the base
//! prompt with `"Given the context: {context}\n"`, or returns the base prompt
//! unchanged when there is no context for the image.

use std::collections::HashMap;

/// Default instruction sent with every page image.
pub const BASE_PROMPT: &str = "\
Please transcribe the text from the uploaded image. \
Ensure that the transcription follows correct English spelling, grammar, and sentence structure. \
If a word is completely missing, mark it as [blank]. \
If a word is unclear or unreadable, make an educated guess based on context rather than providing gibberish, \
and mark it as [unsure].";

/// Build the prompt for the image whose file stem is `basename`.
///
/// The individual entry, when present and non-empty, is appended to the
/// global text on its own line; with an empty global text it stands alone.
/// Lookup tries `basename` as given, then lower-cased.
///
/// # Example
/// ```rust
/// use std::collections::HashMap;
/// use doc_transcribe::context::compose;
///
/// let mut individual = HashMap::new();
/// individual.insert("page_01".to_string(), "Ledger of 1862".to_string());
///
/// let prompt = compose("page_01", "Civil war letters", &individual, "Transcribe.");
/// assert_eq!(prompt, "Given the context: Civil war letters\nLedger of 1862\nTranscribe.");
/// ```
pub fn compose(
    basename: &str,
    global: &str,
    individual: &HashMap<String, String>,
    base_prompt: &str,
) -> String {
    let own = individual
        .get(basename)
        .or_else(|| individual.get(&basename.to_lowercase()))
        .map(String::as_str)
        .filter(|s| !s.is_empty());

    let context = match (global.is_empty(), own) {
        (_, None) => global.to_string(),
        (true, Some(own)) => own.to_string(),
        (false, Some(own)) => format!("{global}\n{own}"),
    };

    if context.is_empty() {
        base_prompt.to_string()
    } else {
        format!("Given the context: {context}\n{base_prompt}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
