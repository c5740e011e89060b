pub mod auth;
pub mod core;
pub mod history;
pub mod llm;
pub mod pipeline;
pub mod rag;
pub mod server;
pub mod state;
pub mod tools;
pub mod vector_math;

#[cfg(test)]
mod test_support;
