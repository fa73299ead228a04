use crate::{error::FrameError, intake::frame::ClientMessage};
use async_trait::async_trait;

#[async_trait]
pub trait FrameReader: Send {
    /// Read the next message. `Ok(None)` means the peer closed the stream.
    async fn read(&mut self) -> Result<Option<ClientMessage>, FrameError>;
}
