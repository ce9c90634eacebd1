use crate::domain::model::Domain;
use crate::domain::ports::Hypervisor;
use crate::utils::error::{JugglerError, Result};

/// Read-only view of the domains known to the daemon.
pub struct DomainDirectory<'a, H: Hypervisor + ?Sized> {
    hypervisor: &'a H,
}

impl<'a, H: Hypervisor + ?Sized> DomainDirectory<'a, H> {
    pub fn new(hypervisor: &'a H) -> Self {
        Self { hypervisor }
    }

    pub async fn list_domains(&self) -> Result<Vec<Domain>> {
        let domains = self.hypervisor.list_domains().await?;
        tracing::debug!("Daemon reports {} domains", domains.len());
        Ok(domains)
    }

    /// Resolves a domain by name. A daemon refusal means the domain does not
    /// exist; anything else is passed through untouched.
    pub async fn lookup(&self, name: &str) -> Result<Domain> {
        match self.hypervisor.lookup_domain(name).await {
            Ok(domain) => Ok(domain),
            Err(JugglerError::Rpc { message, .. }) => Err(JugglerError::DomainLookup {
                name: name.to_string(),
                reason: message,
            }),
            Err(e) => Err(e),
        }
    }

    pub async fn configuration(&self, domain: &Domain) -> Result<String> {
        self.hypervisor
            .domain_config(domain)
            .await
            .map_err(|e| JugglerError::DomainRead {
                domain: domain.name.clone(),
                reason: e.to_string(),
            })
    }
}
