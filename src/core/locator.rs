use crate::core::directory::DomainDirectory;
use crate::core::normalize::normalize;
use crate::domain::model::{DeviceDescriptorSet, Domain, OwnershipMap};
use crate::domain::ports::Hypervisor;
use crate::utils::error::Result;
use std::collections::BTreeMap;

/// Finds which domain holds each descriptor by looking for its normalized
/// XML inside every domain's normalized XML. Only reads from the daemon.
pub struct DeviceLocator<'a, H: Hypervisor + ?Sized> {
    directory: DomainDirectory<'a, H>,
}

impl<'a, H: Hypervisor + ?Sized> DeviceLocator<'a, H> {
    pub fn new(hypervisor: &'a H) -> Self {
        Self {
            directory: DomainDirectory::new(hypervisor),
        }
    }

    pub async fn locate(&self, devices: &DeviceDescriptorSet) -> Result<OwnershipMap> {
        let needles = normalized_descriptors(devices);
        let domains = self.directory.list_domains().await?;
        tracing::info!(
            "Searching for {} devices in {} domains",
            devices.len(),
            domains.len()
        );

        let mut candidates: BTreeMap<&str, Vec<&Domain>> = BTreeMap::new();
        for domain in &domains {
            let config = match self.directory.configuration(domain).await {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Skipping domain {}: {}", domain.name, e);
                    continue;
                }
            };
            let haystack = match normalize(&config) {
                Ok(haystack) => haystack,
                Err(e) => {
                    tracing::warn!("Skipping domain {}: {}", domain.name, e);
                    continue;
                }
            };

            for (name, needle) in &needles {
                tracing::debug!("Searching for {} in domain {}", name, domain.name);
                if haystack.contains(needle.as_str()) {
                    candidates.entry(*name).or_default().push(domain);
                }
            }
        }

        let mut ownership = OwnershipMap::new();
        for (name, found_in) in candidates {
            if let Some(owner) = preferred_owner(&found_in) {
                if found_in.len() > 1 {
                    let all: Vec<&str> = found_in.iter().map(|d| d.name.as_str()).collect();
                    tracing::warn!(
                        "Device {} matches {} domains ({}); using {}",
                        name,
                        found_in.len(),
                        all.join(", "),
                        owner.name
                    );
                }
                ownership.insert(name.to_string(), owner.clone());
            }
        }

        for name in devices.names().filter(|n| !ownership.contains_key(*n)) {
            tracing::info!("Device {} is not attached to any domain", name);
        }

        Ok(ownership)
    }
}

/// Normalizes every descriptor once. Descriptors that cannot be normalized,
/// or normalize to nothing, can never be located.
fn normalized_descriptors(devices: &DeviceDescriptorSet) -> Vec<(&str, String)> {
    devices
        .ascending()
        .filter_map(|device| match normalize(&device.xml) {
            Ok(needle) if needle.is_empty() => {
                tracing::warn!("Device {} has no XML content, it will not be searched for", device.name);
                None
            }
            Ok(needle) => Some((device.name.as_str(), needle)),
            Err(e) => {
                tracing::warn!("Device {} will not be searched for: {}", device.name, e);
                None
            }
        })
        .collect()
}

/// Running domains win over shut-off ones, then the lowest id, then the
/// name. Independent of the daemon's enumeration order.
fn preferred_owner<'d>(found_in: &[&'d Domain]) -> Option<&'d Domain> {
    found_in
        .iter()
        .copied()
        .min_by(|a, b| {
            (!a.is_active(), a.id, &a.name).cmp(&(!b.is_active(), b.id, &b.name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_preferred_owner_ignores_enumeration_order() {
        let stopped = Domain::new(-1, "alpha", Uuid::nil());
        let late = Domain::new(7, "zulu", Uuid::nil());
        let early = Domain::new(3, "mike", Uuid::nil());

        let forward = [&stopped, &late, &early];
        let backward = [&early, &late, &stopped];
        assert_eq!(preferred_owner(&forward).unwrap().name, "mike");
        assert_eq!(preferred_owner(&backward).unwrap().name, "mike");
        assert!(preferred_owner(&[]).is_none());
    }

    #[test]
    fn test_inactive_domains_tie_break_on_name() {
        let b = Domain::new(-1, "b", Uuid::nil());
        let a = Domain::new(-1, "a", Uuid::nil());
        assert_eq!(preferred_owner(&[&b, &a]).unwrap().name, "a");
    }
}
