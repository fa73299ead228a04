pub mod latest_frame;
pub mod message;
pub mod reader;
pub mod writer;

pub use latest_frame::LatestFrameSlot;
pub use message::{ClientMessage, DetectionMessage, ErrorCode, ObjectReport, ServerMessage};
pub use reader::{FrameReader, FramedAsyncBufferedReader};
pub use writer::{FrameWriter, FramedAsyncBufferedWriter};
