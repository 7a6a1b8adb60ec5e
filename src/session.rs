use crate::backend::{BackendKind, ClearColor, GraphicsBackend, SurfaceSize};
use crate::bridge::{BridgeState, FrameBracket};
use crate::callbacks::WindowCallbacks;
use crate::env_config;
use crate::error::{BridgeError, BridgeResult};
use crate::format::{Orientation, OutputConfig, PixelFormat};
use crate::platform::D3D11Backend;
use crate::platform::software::SoftwareBackend;
use crate::shader::ShaderSource;
use crate::surface_manager::{SurfaceManager, SurfaceStats};
use crate::window::{WindowId, WindowSize};

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Presentation size before the host reports its first resize.
    pub initial_size: WindowSize,
    /// Present with a sync interval of 1 instead of 0.
    pub vertical_sync: bool,
    /// Orientation reported in every negotiation record.
    pub orientation: Orientation,
    /// Create both D3D11 devices with the debug layer.
    pub debug_device: bool,
    pub shader: ShaderSource,
    /// Color both the shared surface and the presentation target are
    /// cleared to at the start of their respective passes.
    pub clear_color: ClearColor,
    pub swap_chain_buffers: u32,
}

impl SessionConfig {
    pub fn sync_interval(&self) -> u32 {
        u32::from(self.vertical_sync)
    }

    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Rgba8Unorm
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_size: WindowSize::default(),
            vertical_sync: false,
            orientation: Orientation::default(),
            debug_device: false,
            shader: ShaderSource::default(),
            clear_color: ClearColor::OPAQUE_BLACK,
            swap_chain_buffers: 1,
        }
    }
}

pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Starts from [`SessionConfig::default`] with environment overrides
    /// applied. Setters called afterwards take precedence.
    pub fn new() -> Self {
        let mut config = SessionConfig::default();
        if env_config::env_var_truthy(env_config::VSYNC_VAR) {
            config.vertical_sync = true;
        }
        if env_config::env_var_truthy(env_config::DEBUG_DEVICE_VAR) {
            config.debug_device = true;
        }
        if let Some(orientation) = env_config::env_var_orientation(env_config::ORIENTATION_VAR) {
            config.orientation = orientation;
        }
        Self { config }
    }

    pub fn from_config(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn initial_size(mut self, width: u32, height: u32) -> Self {
        self.config.initial_size = WindowSize::new(width, height);
        self
    }

    pub fn vertical_sync(mut self, enabled: bool) -> Self {
        self.config.vertical_sync = enabled;
        self
    }

    /// Orientation tag handed to the engine. See the crate documentation
    /// for why this is configurable rather than fixed.
    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.config.orientation = orientation;
        self
    }

    pub fn debug_device(mut self, enabled: bool) -> Self {
        self.config.debug_device = enabled;
        self
    }

    pub fn shader(mut self, shader: ShaderSource) -> Self {
        self.config.shader = shader;
        self
    }

    pub fn clear_color(mut self, color: ClearColor) -> Self {
        self.config.clear_color = color;
        self
    }

    pub fn swap_chain_buffers(mut self, count: u32) -> Self {
        self.config.swap_chain_buffers = count.max(1);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Builds the backend from the final configuration and wraps it in a
    /// session.
    pub fn build_with<B, F>(self, create_backend: F) -> BridgeResult<Session<B>>
    where
        B: GraphicsBackend,
        F: FnOnce(&SessionConfig) -> BridgeResult<B>,
    {
        let backend = create_backend(&self.config)?;
        Ok(Session::new(backend, self.config))
    }

    /// Session over the CPU reference backend.
    pub fn build_software(self) -> BridgeResult<Session<SoftwareBackend>> {
        self.build_with(SoftwareBackend::new)
    }

    /// Session presenting into `window` through two D3D11 devices.
    pub fn build_d3d11(self, window: WindowId) -> BridgeResult<Session<D3D11Backend>> {
        self.build_with(|config| D3D11Backend::new(window, config))
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One playback session: both devices, the shared surface, the engine's
/// window callbacks and the bridge state, owned in one place.
///
/// Every engine callback and every host event goes through `&mut Session`,
/// so there is no process-wide state and no second session can observe
/// this one's resources.
pub struct Session<B: GraphicsBackend> {
    pub(crate) backend: B,
    pub(crate) surfaces: SurfaceManager<B>,
    pub(crate) config: SessionConfig,
    pub(crate) state: BridgeState,
    pub(crate) bracket: Option<FrameBracket>,
    pub(crate) window: Option<WindowCallbacks>,
    pub(crate) window_size: WindowSize,
    pub(crate) output: Option<OutputConfig>,
    pub(crate) frames_presented: u64,
    pub(crate) metadata_seen: u64,
}

impl<B: GraphicsBackend> Session<B> {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn new(backend: B, config: SessionConfig) -> Self {
        let window_size = backend.presentation_size();
        log::info!(
            "session started on {} backend, presentation {}x{}",
            backend.kind().as_str(),
            window_size.width,
            window_size.height
        );
        Self {
            surfaces: SurfaceManager::new(config.pixel_format()),
            backend,
            config,
            state: BridgeState::Uninitialized,
            bracket: None,
            window: None,
            window_size,
            output: None,
            frames_presented: 0,
            metadata_seen: 0,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn window_size(&self) -> WindowSize {
        self.window_size
    }

    /// Last Output Negotiation Record, cleared by output cleanup.
    pub fn negotiated_output(&self) -> Option<OutputConfig> {
        self.output
    }

    /// Allocated size of the live shared surface, if any.
    pub fn surface_size(&self) -> Option<SurfaceSize> {
        self.surfaces.current_size()
    }

    pub fn surface_stats(&self) -> SurfaceStats {
        self.surfaces.stats()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn metadata_seen(&self) -> u64 {
        self.metadata_seen
    }

    pub fn is_shut_down(&self) -> bool {
        self.state == BridgeState::ShutDown
    }

    /// Releases everything in dependency order: the shared surface and its
    /// views first, then the producer leases, then pipeline state, the
    /// presentation surface and both devices. Runs once; later calls and
    /// drop are no-ops.
    pub fn shutdown(&mut self) {
        if self.state == BridgeState::ShutDown {
            return;
        }
        self.surfaces.release_surface(&mut self.backend);
        self.output = None;
        self.bracket = None;
        self.window = None;
        let leases = self.backend.release_producer_leases();
        self.backend.shutdown();
        self.state = BridgeState::ShutDown;
        log::info!(
            "session shut down after {} presented frames ({leases} producer context leases released)",
            self.frames_presented
        );
    }

    /// Tears the session down when `err` is fatal, then hands it back for
    /// propagation.
    pub(crate) fn escalate(&mut self, err: BridgeError) -> BridgeError {
        if err.is_fatal() {
            log::error!("fatal bridge error, tearing session down: {err}");
            self.shutdown();
        }
        err
    }
}

impl<B: GraphicsBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
