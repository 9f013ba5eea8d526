pub mod channel;
pub mod coordinator;
pub mod lanes;
pub mod picker;
pub mod protocol;
pub mod session;

pub use channel::{BridgeChannel, ScriptSink, ViewSink};
pub use coordinator::{Dispatch, WorkspaceCoordinator};
pub use protocol::{HostCommand, ViewEvent};
pub use session::{Session, SessionConfig};
