//! Data models for envpanel.
//!
//! - [`Assignment`] / [`QuoteStyle`]: one shell variable assignment and how it is quoted
//! - [`VariableDefinition`] / [`VariableRegistry`]: static metadata for known variables
//! - [`PanelConfig`]: which service is managed and how the editor behaves, loaded from `envpanel.yaml`
//! - [`ServiceStatus`] / [`ServiceAction`]: the service-control side of the panel
//!
//! The environment file model itself lives in [`crate::envfile`].

pub mod assignment;
pub mod config;
pub mod definition;
pub mod status;

pub use assignment::{Assignment, QuoteStyle};
pub use config::PanelConfig;
pub use definition::{
    CUSTOM_VARIABLE_DESCRIPTION, RegistryError, VariableDefinition, VariableRegistry, VariableType,
};
pub use status::{STATUS_PROPERTIES, ServiceAction, ServiceStatus, format_uptime};
