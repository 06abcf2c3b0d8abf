use motion_compare_types::VideoFrame;

/// Pose invocation metadata: one decoded frame and its sampling timestamp.
#[derive(Debug)]
pub struct PoseRequest<'a> {
    frame: &'a VideoFrame,
    timestamp_ms: f64,
}

impl<'a> PoseRequest<'a> {
    pub fn new(frame: &'a VideoFrame, timestamp_ms: f64) -> Self {
        Self {
            frame,
            timestamp_ms,
        }
    }

    pub fn frame(&self) -> &'a VideoFrame {
        self.frame
    }

    pub fn timestamp_ms(&self) -> f64 {
        self.timestamp_ms
    }
}
