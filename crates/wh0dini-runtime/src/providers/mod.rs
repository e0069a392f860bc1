//! Model provider implementations
//!
//! Concrete implementations of the AIProvider trait for remote model services.

pub mod openai;

pub use openai::OpenAIProvider;
