use crate::backend::ProducerContext;
use crate::error::BridgeResult;
use crate::format::{FrameMetadata, OutputConfig, RenderConfig};

/// Parameters the engine passes when it asks for a device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetupConfig {
    pub hardware_decoding: bool,
}

/// Answer to [`OutputCallbacks::setup`]: the context every engine draw call
/// must go through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceSetup {
    pub context: ProducerContext,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

pub type ReportSizeFn = Box<dyn FnMut(u32, u32) + Send>;
pub type MouseMoveFn = Box<dyn FnMut(i32, i32) + Send>;
pub type MouseButtonFn = Box<dyn FnMut(MouseButton) + Send>;

/// Callbacks the engine registers when the output window is bound.
///
/// Whatever context the engine needs travels inside the closures.
pub struct WindowCallbacks {
    pub report_size: ReportSizeFn,
    pub mouse_move: MouseMoveFn,
    pub mouse_press: MouseButtonFn,
    pub mouse_release: MouseButtonFn,
}

impl WindowCallbacks {
    /// Callbacks that only listen for size reports.
    pub fn with_report_size(report_size: impl FnMut(u32, u32) + Send + 'static) -> Self {
        Self {
            report_size: Box::new(report_size),
            mouse_move: Box::new(|_, _| {}),
            mouse_press: Box::new(|_| {}),
            mouse_release: Box::new(|_| {}),
        }
    }
}

impl std::fmt::Debug for WindowCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowCallbacks").finish_non_exhaustive()
    }
}

/// Entry points a callback-driven render engine invokes on its output.
///
/// Call order for one output: `setup`, `set_window`, then any number of
/// `update_output` / (`make_current(true)`, draw, `make_current(false)`,
/// `swap`) cycles, then `cleanup`. An `Err` aborts only the step that
/// returned it unless the error is fatal.
pub trait OutputCallbacks {
    /// Device negotiation: hands out the producer context.
    fn setup(&mut self, config: &SetupConfig) -> BridgeResult<DeviceSetup>;

    /// Output teardown: releases the shared surface.
    fn cleanup(&mut self);

    /// Window binding. The bridge reports the current presentation size
    /// through `callbacks.report_size` before returning.
    fn set_window(&mut self, callbacks: WindowCallbacks) -> BridgeResult<()>;

    /// Output negotiation for a new size or format.
    fn update_output(&mut self, config: &RenderConfig) -> BridgeResult<OutputConfig>;

    /// The frame is ready to be shown.
    fn swap(&mut self) -> BridgeResult<()>;

    /// Frame bracket: `enter == true` before the engine draws into the
    /// shared surface, `false` once it is done.
    fn make_current(&mut self, enter: bool) -> BridgeResult<()>;

    fn frame_metadata(&mut self, metadata: &FrameMetadata);

    /// Whether the engine may render into `plane`. Only plane 0 exists.
    fn select_plane(&mut self, plane: usize) -> bool;
}
