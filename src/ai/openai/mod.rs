pub mod client;
pub mod responses;
pub mod types;

pub use client::OpenAiHttpClient;
pub use responses::OpenAiResponsesTransport;
