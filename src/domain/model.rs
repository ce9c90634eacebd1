use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// One device definition, named after the file it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    pub xml: String,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            xml: xml.into(),
        }
    }
}

/// Descriptors keyed by name. Iteration is always by name, whatever order
/// the descriptors were inserted in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescriptorSet {
    devices: BTreeMap<String, DeviceDescriptor>,
}

impl DeviceDescriptorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a descriptor, returning the one it replaced if the name was
    /// already taken.
    pub fn insert(&mut self, descriptor: DeviceDescriptor) -> Option<DeviceDescriptor> {
        self.devices.insert(descriptor.name.clone(), descriptor)
    }

    pub fn get(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.devices.get(name)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    /// Attach order.
    pub fn ascending(&self) -> impl DoubleEndedIterator<Item = &DeviceDescriptor> {
        self.devices.values()
    }

    /// Detach order: the exact reverse of [`ascending`](Self::ascending).
    pub fn descending(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.devices.values().rev()
    }

    /// The subset of descriptors whose names satisfy `keep`.
    pub fn filter(&self, mut keep: impl FnMut(&str) -> bool) -> Self {
        self.devices
            .values()
            .filter(|d| keep(&d.name))
            .cloned()
            .collect()
    }
}

impl FromIterator<DeviceDescriptor> for DeviceDescriptorSet {
    fn from_iter<I: IntoIterator<Item = DeviceDescriptor>>(iter: I) -> Self {
        let mut set = Self::new();
        for descriptor in iter {
            set.insert(descriptor);
        }
        set
    }
}

/// A libvirt domain as seen over the wire. `id` is -1 while the domain is
/// shut off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Domain {
    pub id: i32,
    pub name: String,
    pub uuid: Uuid,
}

impl Domain {
    pub fn new(id: i32, name: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            id,
            name: name.into(),
            uuid,
        }
    }

    pub fn is_active(&self) -> bool {
        self.id >= 0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Which domain currently holds each located descriptor. Descriptors that
/// were not found anywhere have no entry.
pub type OwnershipMap = BTreeMap<String, Domain>;
