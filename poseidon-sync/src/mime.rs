//! MIME resolution, injected into the translator.

use std::future::Future;
use std::path::Path;

use crate::error::MimeError;

/// Asynchronous `path → MIME type` lookup.
pub trait MimeResolver: Send + Sync + 'static {
    fn resolve(&self, path: &Path) -> impl Future<Output = Result<String, MimeError>> + Send;
}

/// Extension-based lookup backed by `mime_guess`.
///
/// Every synced type is text, so unknown extensions (shader sources, for
/// instance) resolve to `text/plain`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuessMimeResolver;

impl MimeResolver for GuessMimeResolver {
    fn resolve(&self, path: &Path) -> impl Future<Output = Result<String, MimeError>> + Send {
        let guessed = mime_guess::from_path(path)
            .first_or_text_plain()
            .essence_str()
            .to_string();
        async move { Ok(guessed) }
    }
}
