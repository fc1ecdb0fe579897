//! Model client implementations

mod http_client;
mod openai;

pub use http_client::{HttpClient, HttpClientTrait};
pub use openai::{OpenAiCompatibleClient, DEFAULT_OPENAI_BASE_URL};
