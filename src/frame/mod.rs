pub mod pool;
pub mod source;

pub use pool::{PixelBuffer, PixelBufferPool, PooledBuffer};
pub use source::{copy_rows_flipped, FrameSource, Orientation, TestPatternSource};
