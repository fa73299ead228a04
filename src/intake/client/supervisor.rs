use crate::intake::client::ClientHandle;
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct ClientEntry {
    pub id: Uuid,
    pub handle: ClientHandle,
    pub connected_at: DateTime<Utc>,
}

impl ClientEntry {
    pub fn new(handle: ClientHandle) -> Self {
        Self {
            id: handle.id,
            handle,
            connected_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientSummary {
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
}

pub enum ClientSupervisorCommand {
    AddClient {
        entry: ClientEntry,
        responder: oneshot::Sender<Uuid>,
    },
    ClientFinished {
        id: Uuid,
    },
    ListClients {
        responder: oneshot::Sender<Vec<ClientSummary>>,
    },
    ShutdownAll {
        responder: oneshot::Sender<usize>,
    },
}

/// Registry of live sessions, owned by a single task.
#[derive(Default)]
pub struct ClientSupervisor {
    clients: Vec<ClientEntry>,
}

impl ClientSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn list_clients(&self) -> Vec<ClientSummary> {
        self.clients
            .iter()
            .map(|entry| ClientSummary {
                id: entry.id,
                connected_at: entry.connected_at,
            })
            .collect()
    }

    /// Signal every session to stop and return how many were signalled.
    pub fn shutdown_all(&mut self) -> usize {
        let mut signalled = 0;
        for entry in &self.clients {
            match entry.handle.send_shutdown() {
                Ok(()) => signalled += 1,
                Err(e) => warn!("{}", e),
            }
        }
        signalled
    }

    pub fn handle_command(&mut self, command: ClientSupervisorCommand) {
        match command {
            ClientSupervisorCommand::AddClient { entry, responder } => {
                let id = entry.id;
                self.clients.push(entry);
                debug!("Registered client {:?} ({} active)", id, self.clients.len());
                let _ = responder.send(id);
            }
            ClientSupervisorCommand::ClientFinished { id } => {
                self.clients.retain(|entry| entry.id != id);
                debug!("Removed client {:?} ({} active)", id, self.clients.len());
            }
            ClientSupervisorCommand::ListClients { responder } => {
                let _ = responder.send(self.list_clients());
            }
            ClientSupervisorCommand::ShutdownAll { responder } => {
                let _ = responder.send(self.shutdown_all());
            }
        }
    }
}
