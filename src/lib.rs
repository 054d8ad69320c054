//! Portraitgen - Themed Portrait Generation Workflow Engine
//!
//! Drives the upload → customize → generate → result flow for turning a photo
//! into a styled portrait, with a cancellable, progress-reporting job runner.

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod gallery;
pub mod image_loader;
pub mod job;
pub mod milestone;
pub mod params;
pub mod transform;
pub mod workflow;

// Re-export commonly used types
pub use catalog::{StyleCatalog, StyleDefinition};
pub use config::Config;
pub use error::{JobError, PortraitError};
pub use image_loader::ImageHandle;
pub use job::{GenerationJob, JobController, JobEvent, JobStatus};
pub use params::{ParameterField, ParameterSet};
pub use workflow::{Stage, Workflow, WorkflowEvent, WorkflowState};
