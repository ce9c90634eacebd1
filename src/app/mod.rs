//! One invocation's work: a single operation run against one daemon
//! session. Decides nothing about exiting; errors go back to the caller.

pub mod output;

use crate::core::directory::DomainDirectory;
use crate::core::locator::DeviceLocator;
use crate::core::orchestrator::{AttachReport, AttachmentOrchestrator, DetachReport, SweepReport};
use crate::domain::model::{DeviceDescriptorSet, Domain, OwnershipMap};
use crate::domain::ports::Hypervisor;
use crate::utils::error::Result;
use crate::utils::validation::validate_non_empty_string;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Attach { domain_name: String },
    /// With `sweep`, devices that could not be located are afterwards
    /// probed on every domain.
    Detach { sweep: bool },
    Find,
    Sweep,
    ListDomains,
}

impl Operation {
    pub fn needs_devices(&self) -> bool {
        !matches!(self, Operation::ListDomains)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Attached(AttachReport),
    Detached {
        report: DetachReport,
        sweep: Option<SweepReport>,
    },
    Found(OwnershipMap),
    Swept(SweepReport),
    Domains(Vec<Domain>),
}

pub async fn execute<H: Hypervisor + ?Sized>(
    hypervisor: &H,
    operation: &Operation,
    devices: &DeviceDescriptorSet,
) -> Result<Outcome> {
    let orchestrator = AttachmentOrchestrator::new(hypervisor);

    match operation {
        Operation::Attach { domain_name } => {
            validate_non_empty_string("domain-name", domain_name)?;
            let domain = DomainDirectory::new(hypervisor).lookup(domain_name).await?;
            let report = orchestrator.attach(&domain, devices).await?;
            Ok(Outcome::Attached(report))
        }
        Operation::Detach { sweep } => {
            let ownership = DeviceLocator::new(hypervisor).locate(devices).await?;
            let report = orchestrator.detach(&ownership, devices).await?;

            let sweep = if *sweep && !report.unlocated.is_empty() {
                let leftovers = devices.filter(|name| report.unlocated.iter().any(|u| u == name));
                Some(orchestrator.sweep_orphans(&leftovers).await?)
            } else {
                None
            };
            Ok(Outcome::Detached { report, sweep })
        }
        Operation::Find => {
            let ownership = DeviceLocator::new(hypervisor).locate(devices).await?;
            Ok(Outcome::Found(ownership))
        }
        Operation::Sweep => Ok(Outcome::Swept(orchestrator.sweep_orphans(devices).await?)),
        Operation::ListDomains => {
            let mut domains = DomainDirectory::new(hypervisor).list_domains().await?;
            domains.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(Outcome::Domains(domains))
        }
    }
}

/// Runs `operation` on `session` and closes the session afterwards,
/// whether the operation succeeded or not.
pub async fn run_in_session<H: Hypervisor + ?Sized>(
    session: &H,
    operation: &Operation,
    devices: &DeviceDescriptorSet,
) -> Result<Outcome> {
    let result = execute(session, operation, devices).await;
    if let Err(e) = session.disconnect().await {
        tracing::warn!("Failed to disconnect from libvirt: {}", e);
    }
    result
}
