pub mod llm_client;

pub use llm_client::{ChatApi, LlmClient};
