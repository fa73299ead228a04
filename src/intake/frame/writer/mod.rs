pub mod frame_writer;
pub mod framed_async_buffered_writer;

pub use frame_writer::FrameWriter;
pub use framed_async_buffered_writer::FramedAsyncBufferedWriter;
