//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate validators and repository calls into use-case APIs.
//! - Keep boundary layers decoupled from storage details.

pub mod aspect_service;
