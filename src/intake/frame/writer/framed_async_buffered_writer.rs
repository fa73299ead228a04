use crate::{
    error::FrameError,
    intake::frame::{ServerMessage, writer::FrameWriter},
};
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Writes `[length: u32 LE][JSON payload]` messages, flushing after each one.
pub struct FramedAsyncBufferedWriter<T>
where
    T: AsyncWrite + Unpin + Send,
{
    writer: BufWriter<T>,
}

impl<T: AsyncWrite + Unpin + Send> FramedAsyncBufferedWriter<T> {
    pub fn new(writer: T) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }
}

#[async_trait]
impl<T: AsyncWrite + Unpin + Send> FrameWriter for FramedAsyncBufferedWriter<T> {
    async fn write(&mut self, message: &ServerMessage) -> Result<(), FrameError> {
        let payload = serde_json::to_vec(message).map_err(FrameError::Encode)?;
        let length = u32::try_from(payload.len())
            .map_err(|_| FrameError::Oversized(payload.len(), u32::MAX as usize))?;
        self.writer
            .write_all(&length.to_le_bytes())
            .await
            .map_err(FrameError::Write)?;
        self.writer
            .write_all(&payload)
            .await
            .map_err(FrameError::Write)?;
        self.writer.flush().await.map_err(FrameError::Write)
    }

    async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.writer.shutdown().await.map_err(FrameError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::frame::ErrorCode;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_writes_length_prefixed_json() {
        let (client, mut server) = tokio::io::duplex(1024);
        let mut writer = FramedAsyncBufferedWriter::new(client);
        writer.write(&ServerMessage::Pong).await.unwrap();
        writer
            .write(&ServerMessage::error(ErrorCode::InvalidConfig, "bad"))
            .await
            .unwrap();
        writer.shutdown().await.unwrap();

        let mut bytes = Vec::new();
        server.read_to_end(&mut bytes).await.unwrap();

        let first_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let first: ServerMessage = serde_json::from_slice(&bytes[4..4 + first_len]).unwrap();
        assert_eq!(first, ServerMessage::Pong);

        let rest = &bytes[4 + first_len..];
        let second_len = u32::from_le_bytes(rest[0..4].try_into().unwrap()) as usize;
        let second: ServerMessage = serde_json::from_slice(&rest[4..4 + second_len]).unwrap();
        assert_eq!(second, ServerMessage::error(ErrorCode::InvalidConfig, "bad"));
        assert_eq!(rest.len(), 4 + second_len);
    }
}
