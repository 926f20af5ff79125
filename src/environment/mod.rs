//! Environment resolution for Agentpod
//!
//! Validates the credentials a run needs and materializes them as a
//! permission-restricted descriptor file consumed by the container engine.

pub mod descriptor;
mod resolver;

pub use descriptor::{descriptor_path, load_descriptor, DESCRIPTOR_FILE_NAME};
pub use resolver::{
    capability_var, layer_sources, resolve, Requirement, RuntimeEnvironment, SecretOverrides, SecretSpec,
    PLAUSIBLE_SECRET_LEN, PROVIDER_CREDENTIAL, SEARCH_API_KEY, SECRETS, SOURCE_CONTROL_TOKEN,
};
