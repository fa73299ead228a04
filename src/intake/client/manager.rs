use crate::{
    error::AppError,
    intake::{
        client::{
            Client, ClientSettings, ClientSupervisor,
            supervisor::{ClientEntry, ClientSummary, ClientSupervisorCommand},
        },
        frame::{reader::FrameReader, writer::FrameWriter},
    },
    pipeline::DetectorPool,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info};
use uuid::Uuid;

const COMMAND_CAPACITY: usize = 100;

#[derive(Clone)]
pub struct ClientManagerHandle {
    command_tx: mpsc::Sender<ClientSupervisorCommand>,
    pool: DetectorPool,
    settings: ClientSettings,
}

impl ClientManagerHandle {
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn pool(&self) -> &DetectorPool {
        &self.pool
    }

    /// Register a new session and start it. The session removes itself from
    /// the registry when it ends.
    pub async fn add_client(
        &self,
        reader: Box<dyn FrameReader>,
        writer: Box<dyn FrameWriter>,
    ) -> Result<Uuid, AppError> {
        let (client, handle) = Client::new(
            reader,
            writer,
            self.pool.session_service(),
            self.settings,
        );
        let id = client.id();
        debug!("Adding client {:?}", id);

        let (responder, response_rx) = oneshot::channel();
        self.send(ClientSupervisorCommand::AddClient {
            entry: ClientEntry::new(handle),
            responder,
        })
        .await?;
        response_rx
            .await
            .map_err(|e| AppError::Supervisor(e.to_string()))?;

        let command_tx = self.command_tx.clone();
        tokio::spawn(async move {
            match client.run().await {
                Ok(stats) => debug!("Client {:?} ended: {:?}", id, stats),
                Err(e) => error!("Client {:?} ended with error: {}", id, e),
            }
            if command_tx
                .send(ClientSupervisorCommand::ClientFinished { id })
                .await
                .is_err()
            {
                debug!("Supervisor gone before client {:?} finished", id);
            }
        });
        Ok(id)
    }

    pub async fn list_clients(&self) -> Result<Vec<ClientSummary>, AppError> {
        let (responder, response_rx) = oneshot::channel();
        self.send(ClientSupervisorCommand::ListClients { responder })
            .await?;
        response_rx
            .await
            .map_err(|e| AppError::Supervisor(e.to_string()))
    }

    /// Ask every live session to stop. Returns how many were signalled.
    pub async fn shutdown_all(&self) -> Result<usize, AppError> {
        let (responder, response_rx) = oneshot::channel();
        self.send(ClientSupervisorCommand::ShutdownAll { responder })
            .await?;
        response_rx
            .await
            .map_err(|e| AppError::Supervisor(e.to_string()))
    }

    async fn send(&self, command: ClientSupervisorCommand) -> Result<(), AppError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|e| AppError::Supervisor(e.to_string()))
    }
}

pub struct ClientManager {
    client_handler: JoinHandle<()>,
}

impl ClientManager {
    pub fn new(pool: DetectorPool, settings: ClientSettings) -> (Self, ClientManagerHandle) {
        let (command_tx, mut command_rx) =
            mpsc::channel::<ClientSupervisorCommand>(COMMAND_CAPACITY);
        let client_handler = tokio::spawn(async move {
            let mut supervisor = ClientSupervisor::new();
            while let Some(command) = command_rx.recv().await {
                supervisor.handle_command(command);
            }
            info!(
                "Client supervisor stopped with {} sessions registered",
                supervisor.len()
            );
        });
        (
            Self { client_handler },
            ClientManagerHandle {
                command_tx,
                pool,
                settings,
            },
        )
    }
}

impl Drop for ClientManager {
    fn drop(&mut self) {
        self.client_handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        intake::frame::{FramedAsyncBufferedReader, FramedAsyncBufferedWriter},
        pipeline::JsonDetector,
    };
    use std::{sync::Arc, time::Duration};
    use tokio::io::{AsyncWriteExt, DuplexStream, WriteHalf};

    fn manager() -> (ClientManager, ClientManagerHandle) {
        let pool = DetectorPool::new(Arc::new(JsonDetector::default()), 2, Duration::from_secs(1));
        ClientManager::new(pool, ClientSettings::default())
    }

    async fn connect(handle: &ClientManagerHandle) -> (Uuid, DuplexStream) {
        let (peer, server) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(server);
        let id = handle
            .add_client(
                Box::new(FramedAsyncBufferedReader::new(
                    read,
                    handle.settings().max_message_size(),
                )),
                Box::new(FramedAsyncBufferedWriter::new(write)),
            )
            .await
            .unwrap();
        (id, peer)
    }

    async fn wait_for_clients(handle: &ClientManagerHandle, expected: usize) {
        for _ in 0..100 {
            if handle.list_clients().await.unwrap().len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never reached {expected} clients");
    }

    #[tokio::test]
    async fn test_clients_are_listed_until_they_disconnect() {
        let (_manager, handle) = manager();
        let (id_a, peer_a) = connect(&handle).await;
        let (id_b, _peer_b) = connect(&handle).await;

        let ids: Vec<Uuid> = handle
            .list_clients()
            .await
            .unwrap()
            .into_iter()
            .map(|summary| summary.id)
            .collect();
        assert_eq!(ids, vec![id_a, id_b]);

        let (_, mut write): (_, WriteHalf<DuplexStream>) = tokio::io::split(peer_a);
        write.shutdown().await.unwrap();
        wait_for_clients(&handle, 1).await;
    }

    #[tokio::test]
    async fn test_shutdown_all_ends_sessions() {
        let (_manager, handle) = manager();
        let (_, _peer_a) = connect(&handle).await;
        let (_, _peer_b) = connect(&handle).await;

        assert_eq!(handle.shutdown_all().await.unwrap(), 2);
        wait_for_clients(&handle, 0).await;
    }

    #[tokio::test]
    async fn test_dropped_manager_reports_supervisor_error() {
        let (manager, handle) = manager();
        drop(manager);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(
            handle.list_clients().await,
            Err(AppError::Supervisor(_))
        ));
    }
}
