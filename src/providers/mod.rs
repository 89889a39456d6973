/*!
 * Provider implementations for translation services.
 *
 * This module contains client implementations for the translation backends:
 * - OpenAI: OpenAI-compatible chat-completions API (primary)
 * - Google: public translate endpoint (fallback)
 * - Mock: scripted behaviors for tests
 */

use async_trait::async_trait;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// Common trait for all translation providers.
///
/// A client is stateless per call: it receives the already serialized batch
/// text and returns the provider's reply verbatim. Splitting the reply back
/// into segments is the engine's job, not the client's.
#[async_trait]
pub trait TranslationClient: Send + Sync + Debug {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// Translate one serialized batch
    ///
    /// # Arguments
    /// * `serialized` - delimiter-joined segment text
    /// * `source_language` - ISO code of the source language
    /// * `target_language` - ISO code of the target language
    ///
    /// # Returns
    /// * The provider's reply text, or a classified `ProviderError`
    async fn translate_batch(
        &self,
        serialized: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<String, ProviderError>;
}

pub mod google;
pub mod mock;
pub mod openai;

pub use google::GoogleClient;
pub use mock::{MockBehavior, MockClient};
pub use openai::OpenAiClient;
