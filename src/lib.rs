// src/lib.rs
use std::sync::Arc;

pub mod client;
pub mod config;
pub mod cors;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod prompts;
pub mod services;

use crate::services::{CreditStore, DiagramModel, DiagramStore, ImageProcessor, SessionVerifier};

#[derive(Clone)]
pub struct AppState {
    pub diagram_store: Arc<dyn DiagramStore>,
    pub credit_store: Arc<dyn CreditStore>,
    pub model: Arc<dyn DiagramModel>,
    pub session_verifier: Arc<dyn SessionVerifier>,
    pub image_processor: Arc<ImageProcessor>,
}
