use crate::core::directory::DomainDirectory;
use crate::domain::model::{DeviceDescriptorSet, Domain, OwnershipMap};
use crate::domain::ports::Hypervisor;
use crate::utils::error::{JugglerError, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachReport {
    pub domain: String,
    /// Device names in the order they were attached.
    pub attached: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detachment {
    pub device: String,
    pub domain: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetachReport {
    /// In the order they were detached.
    pub detached: Vec<Detachment>,
    /// Devices with no known owner; nothing was sent for them.
    pub unlocated: Vec<String>,
}

/// Result of one detach probe during an orphan sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SweepOutcome {
    /// The domain held the device and let it go.
    Released,
    /// The daemon refused, which is what a domain without the device does.
    ExpectedRejection { reason: String },
    /// The session itself failed; the sweep stops here.
    UnexpectedFailure { reason: String },
}

impl SweepOutcome {
    pub fn classify(result: &Result<()>) -> Self {
        match result {
            Ok(()) => SweepOutcome::Released,
            Err(e) if e.is_daemon_rejection() => SweepOutcome::ExpectedRejection {
                reason: e.to_string(),
            },
            Err(e) => SweepOutcome::UnexpectedFailure {
                reason: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepProbe {
    pub device: String,
    pub domain: String,
    #[serde(flatten)]
    pub outcome: SweepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub probes: Vec<SweepProbe>,
}

impl SweepReport {
    pub fn released(&self) -> impl Iterator<Item = &SweepProbe> {
        self.probes
            .iter()
            .filter(|p| p.outcome == SweepOutcome::Released)
    }

    pub fn rejections(&self) -> usize {
        self.probes
            .iter()
            .filter(|p| matches!(p.outcome, SweepOutcome::ExpectedRejection { .. }))
            .count()
    }
}

/// Applies attach and detach requests across a set of devices, one daemon
/// call at a time, stopping at the first failure. Nothing already applied
/// is rolled back.
pub struct AttachmentOrchestrator<'a, H: Hypervisor + ?Sized> {
    hypervisor: &'a H,
}

impl<'a, H: Hypervisor + ?Sized> AttachmentOrchestrator<'a, H> {
    pub fn new(hypervisor: &'a H) -> Self {
        Self { hypervisor }
    }

    /// Attaches every device to `domain` in ascending name order.
    pub async fn attach(&self, domain: &Domain, devices: &DeviceDescriptorSet) -> Result<AttachReport> {
        tracing::info!("Attaching {} devices to {}", devices.len(), domain.name);
        let mut attached = Vec::with_capacity(devices.len());

        for device in devices.ascending() {
            tracing::debug!("Attaching {} to {}", device.name, domain.name);
            self.hypervisor
                .attach_device(domain, &device.xml)
                .await
                .map_err(|e| JugglerError::Attach {
                    device: device.name.clone(),
                    domain: domain.name.clone(),
                    source: Box::new(e),
                })?;
            tracing::info!("Attached {} to {}", device.name, domain.name);
            attached.push(device.name.clone());
        }

        Ok(AttachReport {
            domain: domain.name.clone(),
            attached,
        })
    }

    /// Detaches every located device from its owner in descending name
    /// order, the reverse of [`attach`](Self::attach).
    pub async fn detach(&self, ownership: &OwnershipMap, devices: &DeviceDescriptorSet) -> Result<DetachReport> {
        tracing::info!(
            "Detaching {} of {} devices",
            ownership.len(),
            devices.len()
        );
        let mut report = DetachReport::default();

        for device in devices.descending() {
            let Some(owner) = ownership.get(&device.name) else {
                tracing::debug!("{} is not attached anywhere, skipping", device.name);
                report.unlocated.push(device.name.clone());
                continue;
            };

            tracing::debug!("Detaching {} from {}", device.name, owner.name);
            self.hypervisor
                .detach_device(owner, &device.xml)
                .await
                .map_err(|e| JugglerError::Detach {
                    device: device.name.clone(),
                    domain: owner.name.clone(),
                    source: Box::new(e),
                })?;
            tracing::info!("Detached {} from {}", device.name, owner.name);
            report.detached.push(Detachment {
                device: device.name.clone(),
                domain: owner.name.clone(),
            });
        }

        Ok(report)
    }

    /// Tries to detach every device from every domain, so that none of them
    /// stays attached anywhere. Issues domains × devices calls.
    pub async fn sweep_orphans(&self, devices: &DeviceDescriptorSet) -> Result<SweepReport> {
        let domains = DomainDirectory::new(self.hypervisor).list_domains().await?;
        tracing::info!(
            "Detaching {} devices from all {} domains",
            devices.len(),
            domains.len()
        );
        let mut report = SweepReport::default();

        for domain in &domains {
            for device in devices.descending() {
                let result = self.hypervisor.detach_device(domain, &device.xml).await;
                let outcome = SweepOutcome::classify(&result);
                match &outcome {
                    SweepOutcome::Released => {
                        tracing::info!("Released {} from {}", device.name, domain.name)
                    }
                    SweepOutcome::ExpectedRejection { reason } => {
                        tracing::debug!("{} not released by {}: {}", device.name, domain.name, reason)
                    }
                    SweepOutcome::UnexpectedFailure { reason } => {
                        tracing::error!("Sweep stopped at {} on {}: {}", device.name, domain.name, reason)
                    }
                }
                report.probes.push(SweepProbe {
                    device: device.name.clone(),
                    domain: domain.name.clone(),
                    outcome,
                });

                if let Err(e) = result {
                    if !e.is_daemon_rejection() {
                        return Err(JugglerError::Detach {
                            device: device.name.clone(),
                            domain: domain.name.clone(),
                            source: Box::new(e),
                        });
                    }
                }
            }
        }

        tracing::info!(
            "Sweep finished: {} released, {} rejected",
            report.released().count(),
            report.rejections()
        );
        Ok(report)
    }
}
