pub mod hub;
pub mod presence;
pub mod registry;
pub mod session;

pub use hub::{CloseReason, Delivery, Hub, Mailbox, SessionId};
pub use registry::{HubRegistry, RegistryStats, SharedHub};
pub use session::{Session, SessionState};
