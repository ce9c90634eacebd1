use crate::domain::model::{DeviceDescriptorSet, Domain};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Source of device descriptors for one invocation.
pub trait DescriptorStore: Send + Sync {
    fn read_all(&self) -> impl std::future::Future<Output = Result<DeviceDescriptorSet>> + Send;
}

/// An open session with the hypervisor management daemon.
///
/// Every call is a blocking round-trip from the caller's point of view; the
/// core never issues two calls at once.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Library version of the daemon, encoded as `major * 1_000_000 + minor * 1_000 + release`.
    async fn version(&self) -> Result<u64>;

    /// Every defined domain, running or not, in no particular order.
    async fn list_domains(&self) -> Result<Vec<Domain>>;

    async fn lookup_domain(&self, name: &str) -> Result<Domain>;

    /// The domain's current XML description.
    async fn domain_config(&self, domain: &Domain) -> Result<String>;

    async fn attach_device(&self, domain: &Domain, device_xml: &str) -> Result<()>;

    async fn detach_device(&self, domain: &Domain, device_xml: &str) -> Result<()>;

    /// Ends the session. Calls after this fail.
    async fn disconnect(&self) -> Result<()>;
}
