//! Mapping of abstract CWL requirements onto concrete platform settings.

pub mod containers;
pub mod quantity;
pub mod resources;

pub use containers::{ContainerMapper, ContainerRef, RegistryKind, RegistryRewrite, DEFAULT_CONTAINER};
pub use quantity::ByteQuantity;
pub use resources::{CapabilityEntry, ComputeShape, ResourceMapper, DEFAULT_COMPUTE_SHAPE};
