pub mod backends;
pub mod config;
pub mod core;

pub use config::{Backend, Configuration};
pub use core::{
    DecoderError, DecoderResult, DynVideoSource, SeekFuture, VideoFrame, VideoMetadata,
    VideoSource,
};
