//! Per-tick frame pipeline orchestrator.
//!
//! The orchestrator owns all session state explicitly (no ambient singletons)
//! and drives one tick at a time on the interactive task:
//!
//! 1. Drain the input event queue.
//! 2. Poll pending capture-open results (non-blocking).
//! 3. Acquire a frame, or reuse a black placeholder on failure.
//! 4. Apply cached perspective correction, then image adjustments.
//! 5. Render committed and in-progress annotations.
//! 6. Hand the composite plus the tick's display mapping to the compositor.
//!
//! While a live stroke is in progress the pipeline composites over a frozen
//! background snapshot instead of acquiring a new frame: a tick is skipped,
//! not queued, so drawing latency never waits on capture latency.

use std::collections::VecDeque;
use std::time::Duration;

use crate::adjust::{adjust, ImageAdjustmentSettings};
use crate::annotate::{AnnotationSurface, CapturedSurface, Rgb, Tool};
use crate::capture::{
    open_background, CaptureConfig, CaptureDevice, CaptureSession, PendingOpen,
};
use crate::correct::{self, ControlPointSet, Homography};
use crate::frame::Frame;
use crate::geometry::{
    zoom_about, DisplayMapping, ViewTransform, Viewport, ZOOM_STEP_IN, ZOOM_STEP_OUT,
};
use crate::settings::Settings;

/// Target cadence of the interactive tick timer.
pub const TICK_INTERVAL: Duration = Duration::from_millis(33);

/// Consecutive read failures before the transient status escalates to a
/// persistent one.
pub const MAX_CONSECUTIVE_READ_FAILURES: u32 = 30;

/// Pointer contacts at or above this radius (pixels) are treated as a palm
/// and auto-switch to the eraser for the duration of the contact.
pub const PALM_CONTACT_RADIUS: f32 = 25.0;

const DEFAULT_PEN_COLOR: Rgb = [255, 0, 0];
const DEFAULT_PEN_WIDTH: u32 = 3;

/// Input fed by any GUI/input layer, consumed once per tick.
#[derive(Clone, Debug)]
pub enum InputEvent {
    PointerDown {
        screen: (f64, f64),
        contact_radius: f32,
    },
    PointerMove {
        screen: (f64, f64),
    },
    PointerUp,
    Wheel {
        screen: (f64, f64),
        delta: f64,
    },
    Pan {
        dx: f32,
        dy: f32,
    },
    SetTool(Tool),
    SetPenStyle {
        color: Rgb,
        width: u32,
    },
    Undo,
    ClearAnnotations,
    SetControlPoints(Option<ControlPointSet>),
    SetAdjustments(ImageAdjustmentSettings),
    SwitchDevice(CaptureDevice),
    CaptureStill,
    SelectCaptured(usize),
    /// Drop every captured surface and return to the live feed.
    ClearCaptured,
    ReturnToLive,
}

/// Which surface input and rendering apply to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActiveSurface {
    Live,
    Captured(usize),
}

/// Coarse session status for the presentation layer.
#[derive(Clone, Debug, PartialEq)]
pub enum Status {
    /// Background device negotiation in flight.
    Opening,
    Streaming,
    /// Open failed or no session; the placeholder frame is shown.
    NoDevice(String),
    /// Too many consecutive read failures.
    ReadDegraded(u32),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    pub ticks: u64,
    pub frames_acquired: u64,
    pub read_failures: u64,
    pub skipped_ticks: u64,
}

/// One tick's result for the compositor.
pub struct TickOutput {
    pub frame: Frame,
    pub mapping: DisplayMapping,
    /// False when the tick reused a frozen background, a captured still, or
    /// the placeholder.
    pub acquired: bool,
}

enum CaptureState {
    Inactive,
    Pending(PendingOpen),
    Ready(CaptureSession),
}

pub struct Pipeline {
    capture: CaptureState,
    events: VecDeque<InputEvent>,

    device: CaptureDevice,
    requested_resolution: Option<(u32, u32)>,

    control_points: Option<ControlPointSet>,
    reference_resolution: (u32, u32),
    homography: Option<Homography>,
    homography_for: Option<(u32, u32)>,
    correction_disabled: Option<String>,

    adjustments: ImageAdjustmentSettings,

    live: AnnotationSurface,
    captured: Vec<CapturedSurface>,
    active: ActiveSurface,
    frozen_background: Option<Frame>,

    tool: Tool,
    previous_tool: Option<Tool>,
    pen_color: Rgb,
    pen_width: u32,

    view: ViewTransform,
    viewport: Viewport,

    /// Size of the last composited frame; the failure placeholder matches it.
    placeholder_size: (u32, u32),
    last_base: Option<Frame>,

    status: Status,
    consecutive_read_failures: u32,
    stats: PipelineStats,
}

impl Pipeline {
    /// Build from persisted settings. No device is opened yet; call
    /// `connect` (or `attach_session` when the caller opened synchronously).
    pub fn new(settings: Settings, viewport: Viewport) -> Self {
        Self {
            capture: CaptureState::Inactive,
            events: VecDeque::new(),
            device: settings.device,
            requested_resolution: settings.adjustments.requested_resolution,
            control_points: settings.correction_points,
            reference_resolution: settings.reference_resolution,
            homography: None,
            homography_for: None,
            correction_disabled: None,
            adjustments: settings.adjustments,
            live: AnnotationSurface::new(),
            captured: Vec::new(),
            active: ActiveSurface::Live,
            frozen_background: None,
            tool: Tool::Pen,
            previous_tool: None,
            pen_color: DEFAULT_PEN_COLOR,
            pen_width: DEFAULT_PEN_WIDTH,
            view: ViewTransform::identity(),
            viewport,
            placeholder_size: settings.reference_resolution,
            last_base: None,
            status: Status::NoDevice("not connected".into()),
            consecutive_read_failures: 0,
            stats: PipelineStats::default(),
        }
    }

    /// Start background negotiation for the configured device. Supersedes any
    /// open already in flight (last-requested-wins).
    pub fn connect(&mut self) {
        let config = CaptureConfig {
            device: self.device.clone(),
            preferred_resolution: self.requested_resolution,
            ..CaptureConfig::default()
        };
        log::info!("pipeline: opening device {} in background", config.device);
        self.capture = CaptureState::Pending(open_background(config));
        self.status = Status::Opening;
    }

    /// Adopt an already-open session (synchronous open paths and tests).
    pub fn attach_session(&mut self, session: CaptureSession) {
        log::info!(
            "pipeline: session ready on device {} at {}x{}",
            session.device(),
            session.resolution().0,
            session.resolution().1
        );
        self.capture = CaptureState::Ready(session);
        self.status = Status::Streaming;
        self.consecutive_read_failures = 0;
    }

    pub fn push_event(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Reason correction is currently off, when the configured points are
    /// degenerate.
    pub fn correction_disabled(&self) -> Option<&str> {
        self.correction_disabled.as_deref()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn active_surface(&self) -> ActiveSurface {
        self.active
    }

    pub fn view(&self) -> &ViewTransform {
        &self.view
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn captured_count(&self) -> usize {
        self.captured.len()
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Annotations of the surface input currently applies to.
    pub fn annotations(&self) -> &AnnotationSurface {
        match self.active {
            ActiveSurface::Live => &self.live,
            ActiveSurface::Captured(index) => &self.captured[index].annotations,
        }
    }

    /// Fully composited frame of the active surface, for the export
    /// collaborator.
    pub fn exportable_frame(&mut self) -> Option<Frame> {
        match self.active {
            ActiveSurface::Live => self.last_base.as_ref().map(|base| self.live.render(base)),
            ActiveSurface::Captured(index) => {
                self.captured.get_mut(index).map(|s| s.composite().clone())
            }
        }
    }

    pub fn thumbnail(&mut self, index: usize) -> Option<Frame> {
        self.captured.get_mut(index).map(|s| s.thumbnail().clone())
    }

    // ------------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------------

    pub fn tick(&mut self) -> TickOutput {
        self.stats.ticks += 1;
        self.drain_events();
        self.poll_pending_open();

        // A captured still needs no acquisition; its composite is memoized.
        if let ActiveSurface::Captured(index) = self.active {
            match self.captured.get_mut(index) {
                Some(surface) => {
                    let frame = surface.composite().clone();
                    let mapping = self.mapping_for(frame.size());
                    return TickOutput {
                        frame,
                        mapping,
                        acquired: false,
                    };
                }
                None => {
                    log::warn!("pipeline: captured surface {} gone, back to live", index);
                    self.active = ActiveSurface::Live;
                }
            }
        }

        // Frozen for live-stroke compositing: skip acquisition, re-render the
        // snapshot with the stroke on top.
        if self.live.is_drawing() {
            if let Some(background) = self.frozen_background.clone() {
                self.stats.skipped_ticks += 1;
                let frame = self.live.render(&background);
                let mapping = self.mapping_for(frame.size());
                return TickOutput {
                    frame,
                    mapping,
                    acquired: false,
                };
            }
        }

        let (raw, acquired) = self.acquire_frame();
        let corrected = self.apply_correction(raw);
        let base = adjust(&corrected, &self.adjustments);
        self.placeholder_size = base.size();

        let frame = self.live.render(&base);
        self.last_base = Some(base);

        let mapping = self.mapping_for(frame.size());
        TickOutput {
            frame,
            mapping,
            acquired,
        }
    }

    fn acquire_frame(&mut self) -> (Frame, bool) {
        if let CaptureState::Ready(session) = &mut self.capture {
            match session.read() {
                Ok(frame) => {
                    self.stats.frames_acquired += 1;
                    self.consecutive_read_failures = 0;
                    if !matches!(self.status, Status::Streaming) {
                        self.status = Status::Streaming;
                    }
                    return (frame, true);
                }
                Err(err) => {
                    // Transient: keep the session, retry next tick.
                    self.stats.read_failures += 1;
                    self.consecutive_read_failures += 1;
                    log::warn!("pipeline: {}", err);
                    if self.consecutive_read_failures >= MAX_CONSECUTIVE_READ_FAILURES {
                        self.status = Status::ReadDegraded(self.consecutive_read_failures);
                    }
                }
            }
        }
        let (w, h) = self.placeholder_size;
        (Frame::black(w, h), false)
    }

    fn poll_pending_open(&mut self) {
        let result = match &self.capture {
            CaptureState::Pending(pending) => pending.poll(),
            _ => return,
        };
        match result {
            None => {}
            Some(Ok(session)) => self.attach_session(session),
            Some(Err(err)) => {
                log::warn!("pipeline: {}", err);
                self.capture = CaptureState::Inactive;
                self.status = Status::NoDevice(err.to_string());
            }
        }
    }

    /// Perspective-correct through the cached matrix, recomputing only when
    /// the control points or the frame size changed.
    fn apply_correction(&mut self, frame: Frame) -> Frame {
        let Some(points) = self.control_points else {
            return frame;
        };
        if self.correction_disabled.is_some() {
            return frame;
        }

        let size = frame.size();
        let stale = self.homography.is_none() || self.homography_for != Some(size);
        if stale {
            let scaled = points.rescale(self.reference_resolution, size);
            match scaled.compute_matrix(size) {
                Ok(h) => {
                    self.homography = Some(h);
                    self.homography_for = Some(size);
                }
                Err(err) => {
                    // Correction stays off until the points change.
                    log::warn!("pipeline: {}; correction disabled", err);
                    self.correction_disabled = Some(err.to_string());
                    self.homography = None;
                    self.homography_for = None;
                    return frame;
                }
            }
        }

        match &self.homography {
            Some(h) => correct::apply(&frame, h),
            None => frame,
        }
    }

    fn mapping_for(&self, image_size: (u32, u32)) -> DisplayMapping {
        DisplayMapping::compute(self.viewport, image_size, &self.view)
    }

    /// Image size the current tick's input mapping runs against.
    fn input_image_size(&self) -> (u32, u32) {
        match self.active {
            ActiveSurface::Captured(index) => match self.captured.get(index) {
                Some(surface) => surface.original().size(),
                None => self.placeholder_size,
            },
            ActiveSurface::Live => match &self.last_base {
                Some(base) => base.size(),
                None => self.placeholder_size,
            },
        }
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    fn drain_events(&mut self) {
        while let Some(event) = self.events.pop_front() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: InputEvent) {
        match event {
            InputEvent::PointerDown {
                screen,
                contact_radius,
            } => self.pointer_down(screen, contact_radius),
            InputEvent::PointerMove { screen } => self.pointer_move(screen),
            InputEvent::PointerUp => self.pointer_up(),
            InputEvent::Wheel { screen, delta } => {
                let factor = if delta > 0.0 {
                    ZOOM_STEP_IN
                } else {
                    ZOOM_STEP_OUT
                };
                let image_size = self.input_image_size();
                zoom_about(&mut self.view, self.viewport, image_size, screen, factor);
            }
            InputEvent::Pan { dx, dy } => self.view.pan_by(dx, dy),
            InputEvent::SetTool(tool) => {
                // A tool switch mid-stroke finalizes the stroke, never drops it.
                self.finish_active_stroke();
                self.previous_tool = None;
                self.tool = tool;
            }
            InputEvent::SetPenStyle { color, width } => {
                self.pen_color = color;
                self.pen_width = width.max(1);
            }
            InputEvent::Undo => {
                if !self.active_annotations_mut().undo() {
                    log::debug!("pipeline: nothing to undo");
                }
            }
            InputEvent::ClearAnnotations => self.active_annotations_mut().clear(),
            InputEvent::SetControlPoints(points) => {
                self.control_points = points;
                self.homography = None;
                self.homography_for = None;
                self.correction_disabled = None;
            }
            InputEvent::SetAdjustments(settings) => self.set_adjustments(settings),
            InputEvent::SwitchDevice(device) => self.switch_device(device),
            InputEvent::CaptureStill => self.capture_still(),
            InputEvent::SelectCaptured(index) => {
                if index < self.captured.len() {
                    self.finish_active_stroke();
                    self.active = ActiveSurface::Captured(index);
                } else {
                    log::warn!("pipeline: no captured surface {}", index);
                }
            }
            InputEvent::ClearCaptured => {
                self.finish_active_stroke();
                self.captured.clear();
                if matches!(self.active, ActiveSurface::Captured(_)) {
                    self.active = ActiveSurface::Live;
                    self.view = ViewTransform::identity();
                }
            }
            InputEvent::ReturnToLive => {
                self.finish_active_stroke();
                self.active = ActiveSurface::Live;
                self.view = ViewTransform::identity();
            }
        }
    }

    fn pointer_down(&mut self, screen: (f64, f64), contact_radius: f32) {
        let image_size = self.input_image_size();
        let mapping = self.mapping_for(image_size);
        let Some((x, y)) = mapping.to_image(screen.0, screen.1) else {
            return;
        };

        // Palm contact: auto-switch to the eraser for this contact, restoring
        // the prior tool on release.
        if contact_radius >= PALM_CONTACT_RADIUS && self.tool != Tool::Eraser {
            self.previous_tool = Some(self.tool);
            self.tool = Tool::Eraser;
        }

        if self.active == ActiveSurface::Live {
            // Freeze the current base so partial-stroke renders never wait on
            // the camera.
            self.frozen_background = self.last_base.clone();
        }
        let (tool, color, width) = (self.tool, self.pen_color, self.pen_width);
        self.active_annotations_mut()
            .begin_stroke((x as f32, y as f32), tool, color, width);
    }

    fn pointer_move(&mut self, screen: (f64, f64)) {
        if !self.annotations().is_drawing() {
            return;
        }
        let image_size = self.input_image_size();
        let mapping = self.mapping_for(image_size);
        // Out of bounds means "ignore input", the stroke simply gets no point.
        if let Some((x, y)) = mapping.to_image(screen.0, screen.1) {
            self.active_annotations_mut().extend_stroke((x as f32, y as f32));
        }
    }

    fn pointer_up(&mut self) {
        self.finish_active_stroke();
        if let Some(previous) = self.previous_tool.take() {
            self.tool = previous;
        }
    }

    fn finish_active_stroke(&mut self) {
        self.active_annotations_mut().end_stroke();
        self.frozen_background = None;
    }

    fn active_annotations_mut(&mut self) -> &mut AnnotationSurface {
        match self.active {
            ActiveSurface::Live => &mut self.live,
            ActiveSurface::Captured(index) => &mut self.captured[index].annotations,
        }
    }

    fn set_adjustments(&mut self, settings: ImageAdjustmentSettings) {
        let settings = settings.clamped();
        let resolution_changed = settings.requested_resolution != self.requested_resolution;
        self.adjustments = settings;
        if resolution_changed {
            // A new requested resolution only takes effect through a session
            // restart.
            self.requested_resolution = settings.requested_resolution;
            if matches!(self.capture, CaptureState::Ready(_) | CaptureState::Pending(_)) {
                self.close_session();
                self.connect();
            }
        }
    }

    fn switch_device(&mut self, device: CaptureDevice) {
        log::info!("pipeline: switching to device {}", device);
        self.close_session();
        self.device = device;
        self.view = ViewTransform::identity();
        self.connect();
    }

    /// Release the current session outright; a pending open is simply
    /// superseded.
    fn close_session(&mut self) {
        match std::mem::replace(&mut self.capture, CaptureState::Inactive) {
            CaptureState::Ready(session) => session.close(),
            CaptureState::Pending(_) | CaptureState::Inactive => {}
        }
    }

    /// Snapshot the current live composite (committed strokes included) into
    /// a new captured surface.
    fn capture_still(&mut self) {
        let Some(base) = &self.last_base else {
            log::warn!("pipeline: no frame to capture yet");
            return;
        };
        let composite = self.live.render(base);
        self.captured.push(CapturedSurface::new(composite));
        log::info!("pipeline: captured still #{}", self.captured.len() - 1);
    }
}
