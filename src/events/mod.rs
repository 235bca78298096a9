//! The Event Registry and handler protocol: a closed table mapping event
//! ids to `{category, topic hash, handler constructor}`, plus the
//! [`Handler`] trait implementations under [`handlers`].

pub mod handler;
pub mod handlers;
mod registry;

pub use handler::{Handler, HandlerError};
pub use registry::{EventRegistry, RegistryError};
