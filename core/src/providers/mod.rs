pub mod factory;
pub mod openai;
pub mod scripted;

pub use factory::{ProviderKind, create_provider};
pub use openai::OpenAIProvider;
pub use scripted::{RecordedRequest, ScriptedProvider};
