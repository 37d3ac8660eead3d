//! MIoT device model: descriptors, description-path resolution, and the device and
//! descriptor registries that the collectors read from.

pub mod cache;
pub mod device;
pub mod resolver;
pub mod spec;

pub use cache::SpecCache;
pub use device::{DeviceIndex, DeviceInfo, DeviceRegistry};
pub use resolver::{resolve, resolve_all, NamedPath, PropertyPath, ResolutionFailure, ResolvedProperty};
pub use spec::{Access, ServiceNode, SpecTree};
