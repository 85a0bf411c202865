//! Video processing module
//!
//! Videos are buffered to a scratch file, probed, re-encoded to H.264/AAC MP4
//! and given a square poster frame. All external work goes through [`Encoder`].

pub mod encoder;
pub mod probe;
pub mod scratch;
pub mod transcoder;

pub use encoder::{Encoder, FfmpegEncoder};
pub use scratch::ScratchFile;
pub use transcoder::VideoTranscoder;

#[cfg(test)]
pub(crate) mod testing;
