//! Tool execution engine: process registry and media segmenter

pub mod process;
pub mod segmenter;

pub use process::{ProcessRegistry, ShutdownReport, Signal, ToolCommand, ToolOutput};
pub use segmenter::{MediaSegmenter, SegmentOutcome, SegmentSettings};
