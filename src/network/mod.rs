pub mod client;
pub mod gemini;
pub mod model;
pub mod sse;

pub use client::{HumanReply, ReplyClient};
pub use gemini::{GeminiClient, GeminiConfig};
