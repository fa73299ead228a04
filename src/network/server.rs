use crate::{
    error::AppError,
    intake::{
        client::manager::ClientManagerHandle,
        frame::{reader::FramedAsyncBufferedReader, writer::FramedAsyncBufferedWriter},
    },
};
use tokio::net::{TcpListener, TcpStream};

use tracing::{debug, error, info};
use uuid::Uuid;

pub struct Server {
    address: String,
    client_manager: ClientManagerHandle,
}

impl Server {
    pub fn new(address: impl Into<String>, client_manager: ClientManagerHandle) -> Self {
        Self {
            address: address.into(),
            client_manager,
        }
    }

    pub async fn bind(&self) -> Result<TcpListener, AppError> {
        TcpListener::bind(&self.address)
            .await
            .map_err(|e| AppError::Bind(e, self.address.clone()))
    }

    pub async fn start(&self) -> Result<(), AppError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections forever. Failed accepts are logged and skipped.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), AppError> {
        info!(
            "Realtime server listening on {}",
            listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| self.address.clone())
        );
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("New client attempting to connect: {:?}", peer);
                    match self.handle_client(stream).await {
                        Ok(client_id) => {
                            info!("Client connected: {:?} for peer {:?}", client_id, peer)
                        }
                        Err(e) => error!("Failed to register peer {:?}: {}", peer, e),
                    }
                }
                Err(e) => error!("{}", AppError::Accept(e)),
            }
        }
    }

    async fn handle_client(&self, stream: TcpStream) -> Result<Uuid, AppError> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle on client stream: {}", e);
        }
        let client_manager = &self.client_manager;
        let (stream_rx, stream_tx) = stream.into_split();
        let reader =
            FramedAsyncBufferedReader::new(stream_rx, client_manager.settings().max_message_size());
        let writer = FramedAsyncBufferedWriter::new(stream_tx);
        client_manager
            .add_client(Box::new(reader), Box::new(writer))
            .await
    }
}
