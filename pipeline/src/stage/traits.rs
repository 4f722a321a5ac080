use imago_common::frame::Frame;

/// A single image transform applied by one pipeline stage.
///
/// Implementations take the previous stage's output and return a new frame;
/// they never mutate the input and carry no state between calls, so the same
/// input and parameters always give the same output.
pub trait Transform {
    fn apply(&self, input: &Frame) -> Frame;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed"
    }
}
