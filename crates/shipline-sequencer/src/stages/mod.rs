//! Container-backed stage implementations.

pub mod build;
pub mod package;
pub mod publish;
pub mod scan;
pub mod sign;

pub use build::ContainerBuilder;
pub use package::ContainerPackager;
pub use publish::RegistryPublisher;
pub use scan::GrypeScanner;
pub use sign::CosignSigner;
