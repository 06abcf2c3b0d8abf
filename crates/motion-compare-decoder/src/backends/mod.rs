pub mod mock;

#[cfg(feature = "backend-image-sequence")]
pub mod image_sequence;
