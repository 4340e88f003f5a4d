//! deskview - document-camera viewer core
//!
//! This crate implements the real-time frame-processing pipeline behind an
//! interactive document-camera viewer: every tick a raw camera frame is
//! perspective-corrected, adjusted, annotated and mapped for display, while
//! the pipeline stays responsive to drawing, panning and zooming, and
//! tolerant of camera failures.
//!
//! # Architecture
//!
//! Data flow per tick:
//!
//! capture -> raw frame -> perspective correction -> image adjustment ->
//! annotation render -> display mapping -> compositor
//!
//! One interactive task owns all shared state and runs the tick; the only
//! work off that task is device negotiation and enumeration, whose results
//! come back over channels.
//!
//! # Module Structure
//!
//! - `frame`: RGB frame buffer shared by every stage
//! - `capture`: session lifecycle, resolution negotiation, backends
//! - `correct`: control points and planar homography
//! - `adjust`: brightness/contrast, rotation, flips
//! - `annotate`: strokes, drawing state machine, software rendering
//! - `geometry`: screen/image mapping under zoom, pan, letterboxing
//! - `pipeline`: the per-tick orchestrator and input event queue
//! - `settings`: persisted flat JSON record
//! - `export`: PNG/JPEG frame writer
//! - `error`: the recoverable error taxonomy

pub mod adjust;
pub mod annotate;
pub mod capture;
pub mod correct;
pub mod error;
pub mod export;
pub mod frame;
pub mod geometry;
pub mod pipeline;
pub mod settings;

pub use adjust::{adjust, Flip, ImageAdjustmentSettings, Rotation};
pub use annotate::{
    AnnotationSurface, CapturedSurface, Rgb, Stroke, Tool, BACKGROUND_COLOR, ERASER_WIDTH_FACTOR,
};
pub use capture::{
    enumerate_background, list_available_devices, open_background, CaptureConfig, CaptureDevice,
    CaptureSession, PendingOpen, RESOLUTION_LADDER,
};
pub use correct::{ControlPointSet, Homography, Point, CONTROL_POINT_COUNT};
pub use error::ViewerError;
pub use export::{export_frame, ExportFormat, JPEG_QUALITY};
pub use frame::{Frame, CHANNELS};
pub use geometry::{DisplayMapping, ViewTransform, Viewport, MAX_ZOOM, MIN_ZOOM};
pub use pipeline::{
    ActiveSurface, InputEvent, Pipeline, PipelineStats, Status, TickOutput,
    MAX_CONSECUTIVE_READ_FAILURES, TICK_INTERVAL,
};
pub use settings::Settings;
