// Adapters layer: concrete implementations of the ports in `domain::ports`.

pub mod descriptor_dir;
pub mod fake;
#[cfg(unix)]
pub mod libvirt;

pub use descriptor_dir::DirectoryStore;
pub use fake::FakeHypervisor;
#[cfg(unix)]
pub use libvirt::LibvirtClient;
