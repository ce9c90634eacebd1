pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{Cli, Command};

pub use adapters::{DirectoryStore, FakeHypervisor};
#[cfg(unix)]
pub use adapters::LibvirtClient;
pub use app::{Operation, Outcome};
pub use config::{ConnectionSettings, Settings};
pub use crate::core::{
    locator::DeviceLocator, normalize::normalize, orchestrator::AttachmentOrchestrator,
};
pub use domain::model::{DeviceDescriptor, DeviceDescriptorSet, Domain, OwnershipMap};
pub use domain::ports::{DescriptorStore, Hypervisor};
pub use utils::error::{JugglerError, Result};
