//! In-memory stand-in for the libvirt daemon.
//!
//! Keeps a device list per domain, renders domain XML from it, and records
//! every call so tests can assert on order and count. Failures can be
//! injected per domain or per device.

use crate::core::normalize::normalize;
use crate::domain::model::Domain;
use crate::domain::ports::Hypervisor;
use crate::utils::error::{JugglerError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// libvirt's VIR_ERR_OPERATION_INVALID.
const OPERATION_INVALID: i32 = 55;
/// libvirt's VIR_ERR_NO_DOMAIN.
const NO_DOMAIN: i32 = 42;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    Version,
    ListDomains,
    LookupDomain(String),
    DomainConfig(String),
    Attach { domain: String, device: String },
    Detach { domain: String, device: String },
    Disconnect,
}

#[derive(Debug, Clone)]
struct FakeDomain {
    domain: Domain,
    devices: Vec<String>,
}

impl FakeDomain {
    fn render(&self) -> String {
        format!(
            "<domain type='kvm' id='{}'>\n  <name>{}</name>\n  <uuid>{}</uuid>\n  <devices>\n    {}\n  </devices>\n</domain>\n",
            self.domain.id,
            self.domain.name,
            self.domain.uuid,
            self.devices.join("\n    ")
        )
    }

    fn position_of(&self, device_xml: &str) -> Option<usize> {
        let wanted = canonical(device_xml);
        self.devices.iter().position(|d| canonical(d) == wanted)
    }
}

fn canonical(xml: &str) -> String {
    normalize(xml).unwrap_or_else(|_| xml.to_string())
}

#[derive(Debug, Default)]
struct FakeState {
    domains: Vec<FakeDomain>,
    calls: Vec<FakeCall>,
    unreadable: HashSet<String>,
    rejected_devices: Vec<String>,
    broken_domains: HashSet<String>,
    disconnected: bool,
}

#[derive(Debug, Default)]
pub struct FakeHypervisor {
    state: Mutex<FakeState>,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a domain that already holds `devices` (raw XML fragments).
    pub fn with_domain(self, domain: Domain, devices: &[&str]) -> Self {
        self.lock().domains.push(FakeDomain {
            domain,
            devices: devices.iter().map(|d| d.to_string()).collect(),
        });
        self
    }

    /// Makes fetching this domain's XML fail.
    pub fn with_unreadable_domain(self, name: &str) -> Self {
        self.lock().unreadable.insert(name.to_string());
        self
    }

    /// Makes the daemon refuse to attach any device whose XML contains `marker`.
    pub fn rejecting_devices_containing(self, marker: &str) -> Self {
        self.lock().rejected_devices.push(marker.to_string());
        self
    }

    /// Makes any device call against this domain fail as if the connection
    /// had dropped.
    pub fn with_broken_domain(self, name: &str) -> Self {
        self.lock().broken_domains.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    /// `(domain, device xml)` of every attach request, in order.
    pub fn attach_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                FakeCall::Attach { domain, device } => Some((domain, device)),
                _ => None,
            })
            .collect()
    }

    /// `(domain, device xml)` of every detach request, in order.
    pub fn detach_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                FakeCall::Detach { domain, device } => Some((domain, device)),
                _ => None,
            })
            .collect()
    }

    /// Raw XML of the devices a domain currently holds.
    pub fn devices_of(&self, name: &str) -> Vec<String> {
        self.lock()
            .domains
            .iter()
            .find(|d| d.domain.name == name)
            .map(|d| d.devices.clone())
            .unwrap_or_default()
    }

    pub fn is_disconnected(&self) -> bool {
        self.lock().disconnected
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FakeState {
    fn record(&mut self, call: FakeCall) -> Result<()> {
        self.calls.push(call);
        if self.disconnected {
            return Err(JugglerError::Protocol {
                message: "session is closed".to_string(),
            });
        }
        Ok(())
    }

    fn domain_mut(&mut self, domain: &Domain, procedure: &'static str) -> Result<&mut FakeDomain> {
        if self.broken_domains.contains(&domain.name) {
            return Err(JugglerError::Protocol {
                message: "connection reset by peer".to_string(),
            });
        }
        self.domains
            .iter_mut()
            .find(|d| d.domain.uuid == domain.uuid && d.domain.name == domain.name)
            .ok_or_else(|| JugglerError::Rpc {
                procedure,
                code: NO_DOMAIN,
                message: format!("Domain not found: no domain with matching name '{}'", domain.name),
            })
    }
}

#[async_trait]
impl Hypervisor for FakeHypervisor {
    async fn version(&self) -> Result<u64> {
        self.lock().record(FakeCall::Version)?;
        Ok(10_000_000)
    }

    async fn list_domains(&self) -> Result<Vec<Domain>> {
        let mut state = self.lock();
        state.record(FakeCall::ListDomains)?;
        Ok(state.domains.iter().map(|d| d.domain.clone()).collect())
    }

    async fn lookup_domain(&self, name: &str) -> Result<Domain> {
        let mut state = self.lock();
        state.record(FakeCall::LookupDomain(name.to_string()))?;
        state
            .domains
            .iter()
            .find(|d| d.domain.name == name)
            .map(|d| d.domain.clone())
            .ok_or_else(|| JugglerError::Rpc {
                procedure: "DOMAIN_LOOKUP_BY_NAME",
                code: NO_DOMAIN,
                message: format!("Domain not found: no domain with matching name '{}'", name),
            })
    }

    async fn domain_config(&self, domain: &Domain) -> Result<String> {
        let mut state = self.lock();
        state.record(FakeCall::DomainConfig(domain.name.clone()))?;
        if state.unreadable.contains(&domain.name) {
            return Err(JugglerError::Rpc {
                procedure: "DOMAIN_GET_XML_DESC",
                code: OPERATION_INVALID,
                message: format!("cannot read XML of domain '{}'", domain.name),
            });
        }
        Ok(state.domain_mut(domain, "DOMAIN_GET_XML_DESC")?.render())
    }

    async fn attach_device(&self, domain: &Domain, device_xml: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(FakeCall::Attach {
            domain: domain.name.clone(),
            device: device_xml.to_string(),
        })?;
        if state
            .rejected_devices
            .iter()
            .any(|marker| device_xml.contains(marker.as_str()))
        {
            return Err(JugglerError::Rpc {
                procedure: "DOMAIN_ATTACH_DEVICE",
                code: OPERATION_INVALID,
                message: "device is in use by another domain".to_string(),
            });
        }

        let target = state.domain_mut(domain, "DOMAIN_ATTACH_DEVICE")?;
        if target.position_of(device_xml).is_some() {
            return Err(JugglerError::Rpc {
                procedure: "DOMAIN_ATTACH_DEVICE",
                code: OPERATION_INVALID,
                message: "device is already attached".to_string(),
            });
        }
        target.devices.push(device_xml.trim().to_string());
        Ok(())
    }

    async fn detach_device(&self, domain: &Domain, device_xml: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(FakeCall::Detach {
            domain: domain.name.clone(),
            device: device_xml.to_string(),
        })?;

        let target = state.domain_mut(domain, "DOMAIN_DETACH_DEVICE")?;
        match target.position_of(device_xml) {
            Some(index) => {
                target.devices.remove(index);
                Ok(())
            }
            None => Err(JugglerError::Rpc {
                procedure: "DOMAIN_DETACH_DEVICE",
                code: OPERATION_INVALID,
                message: "device not found in domain configuration".to_string(),
            }),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.lock();
        state.record(FakeCall::Disconnect)?;
        state.disconnected = true;
        Ok(())
    }
}
