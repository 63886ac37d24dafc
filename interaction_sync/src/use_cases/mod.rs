// Use cases layer: per-object ownership protocol, host arbitration and the session task.

pub mod host;
pub mod interactable;
pub mod registry;
pub mod reset;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use host::HostAuthority;
pub use interactable::NetworkInteractable;
pub use registry::{BodyFactory, InteractableRegistry};
pub use session::{HostEvent, SessionError, SessionHandle, SessionSettings, spawn_session};
pub use types::{
    InteractableEvent, InteractorKind, InteractorRef, Outbound, ProtocolPhase, Recipient,
    ServerInteractionEvent,
};
