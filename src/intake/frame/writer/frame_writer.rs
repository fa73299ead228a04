use crate::{error::FrameError, intake::frame::ServerMessage};
use async_trait::async_trait;

#[async_trait]
pub trait FrameWriter: Send {
    async fn write(&mut self, message: &ServerMessage) -> Result<(), FrameError>;
    async fn shutdown(&mut self) -> Result<(), FrameError>;
}
