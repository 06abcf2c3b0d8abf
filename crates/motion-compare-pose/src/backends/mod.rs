#[cfg(feature = "engine-replay")]
pub mod replay;
