pub mod agent;
pub mod chat;
pub mod chunker;
pub mod cli;
pub mod config;
pub mod db;
pub mod document;
pub mod embeddings;
pub mod ingestion;
pub mod llm;
pub mod logging;
pub mod pdf;
pub mod rag;
pub mod sources;
pub mod stream;
