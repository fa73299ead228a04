use crate::{
    error::FrameError,
    intake::frame::{ClientMessage, reader::FrameReader},
};
use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};

pub const FRAME_LENGTH_BYTES: usize = 4;

/// Reads `[length: u32 LE][JSON payload]` messages.
pub struct FramedAsyncBufferedReader<T>
where
    T: AsyncRead + Unpin + Send,
{
    reader: BufReader<T>,
    max_message_size: usize,
}

impl<T: AsyncRead + Unpin + Send> FramedAsyncBufferedReader<T> {
    pub fn new(stream: T, max_message_size: usize) -> Self {
        Self {
            reader: BufReader::new(stream),
            max_message_size,
        }
    }

    async fn read_frame_length(&mut self) -> Result<Option<usize>, FrameError> {
        let mut length_buffer = [0u8; FRAME_LENGTH_BYTES];
        match self.reader.read_exact(&mut length_buffer).await {
            Ok(_) => Ok(Some(u32::from_le_bytes(length_buffer) as usize)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(FrameError::Read(e)),
        }
    }

    // Consume an oversized payload so the stream stays aligned on the next frame.
    async fn skip(&mut self, length: usize) -> Result<(), FrameError> {
        let mut limited = (&mut self.reader).take(length as u64);
        let skipped = tokio::io::copy(&mut limited, &mut tokio::io::sink())
            .await
            .map_err(FrameError::Read)?;
        if skipped < length as u64 {
            return Err(FrameError::Read(ErrorKind::UnexpectedEof.into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<T: AsyncRead + Unpin + Send> FrameReader for FramedAsyncBufferedReader<T> {
    async fn read(&mut self) -> Result<Option<ClientMessage>, FrameError> {
        let Some(length) = self.read_frame_length().await? else {
            return Ok(None);
        };
        if length > self.max_message_size {
            self.skip(length).await?;
            return Err(FrameError::Oversized(length, self.max_message_size));
        }
        let mut payload = vec![0u8; length];
        self.reader
            .read_exact(&mut payload)
            .await
            .map_err(FrameError::Read)?;
        serde_json::from_slice(&payload)
            .map(Some)
            .map_err(FrameError::Decode)
    }
}
