// src/services/mod.rs
pub mod credit_store;
pub mod diagram_store;
pub mod gemini_service;
pub mod image_processor;
pub mod redis_service;
pub mod session_verifier;
pub mod vertex_auth;

pub use credit_store::{CreditStore, MemoryCreditStore};
pub use diagram_store::{DiagramStore, MemoryDiagramStore};
pub use gemini_service::{DiagramModel, GeminiService};
pub use image_processor::ImageProcessor;
pub use redis_service::RedisDiagramStore;
pub use session_verifier::{SessionVerifier, SupabaseSessionVerifier};
