//! Core shared types for easyport.
//!
//! This crate is intentionally small: it names projects, describes their persisted metadata and
//! defines the seams (`ProjectModel`, `ProjectConfigurator`) between the import driver and the
//! build-tool specific configurators.

mod configurator;
mod description;
mod model;

pub use configurator::{ConfigurationWizard, ProjectConfigurator};
pub use description::{ProjectDescription, ProjectRef};
pub use model::{ProjectModel, ProjectModelError};

/// Best-effort extraction of a panic message.
pub fn panic_payload_to_str(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return message;
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.as_str();
    }
    "<non-string panic payload>"
}
