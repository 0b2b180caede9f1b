pub mod openai;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use openai::OpenAiProvider;
pub use traits::CompletionProvider;
pub use types::{CompletionRequest, ProviderError, Turn};
