//! Shared-surface bridge between a callback-driven video render engine and
//! a host-owned Direct3D 11 swap chain.
//!
//! The engine draws on its own producer device into a texture that the
//! consumer device (which owns the window's swap chain) samples with a
//! full-screen quad and presents. A [`Session`] owns both devices, the
//! shared surface and the bridge state; the engine talks to it only through
//! [`OutputCallbacks`], the host through [`Session::resize`] and
//! [`Session::shutdown`].
//!
//! ```no_run
//! use surface_bridge::{OutputCallbacks, RenderConfig, Session, SetupConfig, WindowCallbacks};
//!
//! # fn main() -> surface_bridge::BridgeResult<()> {
//! let mut session = Session::<surface_bridge::SoftwareBackend>::builder()
//!     .initial_size(1280, 720)
//!     .build_software()?;
//! let device = session.setup(&SetupConfig::default())?;
//! session.set_window(WindowCallbacks::with_report_size(|w, h| println!("{w}x{h}")))?;
//! let output = session.update_output(&RenderConfig::sized(1920, 1080))?;
//! # let _ = (device, output);
//! session.make_current(true)?;
//! session.make_current(false)?;
//! session.swap()?;
//! # Ok(())
//! # }
//! ```
//!
//! The orientation reported during output negotiation is configurable
//! through [`SessionBuilder::orientation`] and `SURFACE_BRIDGE_ORIENTATION`,
//! because engines disagree on which tag means "upright" for a render
//! target they did not allocate.

pub mod backend;
pub mod bridge;
pub mod callbacks;
pub(crate) mod env_config;
pub mod error;
pub mod format;
pub mod platform;
mod resize;
pub mod session;
pub mod shader;
pub mod surface_manager;
pub mod window;

pub use backend::{
    BackendKind, ClearColor, GraphicsBackend, MAX_SURFACE_DIMENSION, MIN_SURFACE_DIMENSION,
    ProducerContext, SharedSurface, SurfaceSize,
};
pub use bridge::{BridgeState, FrameBracket};
pub use callbacks::{DeviceSetup, MouseButton, OutputCallbacks, SetupConfig, WindowCallbacks};
pub use error::{BridgeError, BridgeErrorClass, BridgeResult};
pub use format::{
    ColorPrimaries, ColorSpace, FrameMetadata, Hdr10Metadata, Orientation, OutputConfig,
    PixelFormat, RenderConfig, TransferFunction,
};
pub use platform::D3D11Backend;
pub use platform::software::{SoftwareBackend, SoftwareProbe, SoftwareProducer};
pub use session::{Session, SessionBuilder, SessionConfig};
pub use shader::ShaderSource;
pub use surface_manager::{SurfaceInfo, SurfaceManager, SurfaceStats};
pub use window::{WindowId, WindowSize};

/// Opens a session on the window `window` with configuration taken from the
/// environment and defaults.
pub fn open_window_session(window: WindowId) -> BridgeResult<Session<D3D11Backend>> {
    SessionBuilder::new().build_d3d11(window)
}
