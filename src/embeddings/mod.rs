// Embedding pipeline: chunking and the embedding service client.

pub mod chunking;
pub mod ollama;
