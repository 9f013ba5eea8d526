use serde_json::Value;
use std::sync::Arc;

use quire_core::store::StateStore;

use crate::channel::{BridgeChannel, ViewSink};
use crate::coordinator::{Dispatch, WorkspaceCoordinator, DEFAULT_LIST_DEPTH};
use crate::lanes::IoLanes;
use crate::picker::DirectoryPicker;
use crate::protocol::HostCommand;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub list_depth: u32,
    /// Number of I/O worker lanes; `0` runs file work on the calling thread.
    pub io_workers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            list_depth: DEFAULT_LIST_DEPTH,
            io_workers: 4,
        }
    }
}

/// One host/view pairing: the channel plus the coordinator that feeds it.
///
/// Each session is fully independent, so several can coexist in one process.
pub struct Session {
    channel: Arc<BridgeChannel>,
    coordinator: WorkspaceCoordinator,
}

impl Session {
    pub fn new(
        store: Arc<StateStore>,
        picker: Box<dyn DirectoryPicker>,
        config: SessionConfig,
    ) -> Self {
        let channel = Arc::new(BridgeChannel::new());
        let dispatch = if config.io_workers == 0 {
            Dispatch::Inline
        } else {
            let lanes = IoLanes::new(config.io_workers);
            log::debug!("Started {} I/O lanes", lanes.lane_count());
            Dispatch::Lanes(lanes)
        };
        let coordinator =
            WorkspaceCoordinator::new(Arc::clone(&channel), store, picker, dispatch)
                .with_list_depth(config.list_depth);
        Session {
            channel,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &WorkspaceCoordinator {
        &self.coordinator
    }

    pub fn attach_view(&self, sink: Arc<dyn ViewSink>) {
        self.channel.attach(sink);
    }

    pub fn detach_view(&self) {
        self.channel.detach();
    }

    /// Route one raw message from the view. Messages that do not decode to a
    /// known command are dropped without a reply.
    pub fn handle_message(&self, raw: &str) {
        match HostCommand::parse(raw) {
            Ok(command) => self.dispatch(command),
            Err(e) => log::debug!("Dropping view message: {}", e),
        }
    }

    /// Like [`Session::handle_message`], for hosts that hand over message
    /// bodies already decoded.
    pub fn handle_value(&self, value: Value) {
        match HostCommand::from_value(value) {
            Ok(command) => self.dispatch(command),
            Err(e) => log::debug!("Dropping view message: {}", e),
        }
    }

    fn dispatch(&self, command: HostCommand) {
        log::debug!("View command: {}", command.name());
        self.coordinator.handle(command);
    }
}
