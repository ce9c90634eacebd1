// Domain layer: the device/domain model and the ports the core talks through.

pub mod model;
pub mod ports;
