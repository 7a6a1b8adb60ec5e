use crate::error::BridgeResult;
use crate::format::PixelFormat;
use crate::window::WindowSize;

/// Smallest edge the shared surface is ever allocated with.
pub const MIN_SURFACE_DIMENSION: u32 = 8;

/// Largest 2D texture edge guaranteed by D3D feature level 11.
pub const MAX_SURFACE_DIMENSION: u32 = 16384;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Effective allocation size for a negotiation request. Zero and tiny
    /// edges are degenerate requests, not errors.
    pub fn clamped(width: u32, height: u32) -> Self {
        Self {
            width: width.max(MIN_SURFACE_DIMENSION),
            height: height.max(MIN_SURFACE_DIMENSION),
        }
    }

    pub fn exceeds_device_limit(&self) -> bool {
        self.width > MAX_SURFACE_DIMENSION || self.height > MAX_SURFACE_DIMENSION
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl From<WindowSize> for SurfaceSize {
    fn from(size: WindowSize) -> Self {
        Self::new(size.width, size.height)
    }
}

/// Linear RGBA clear value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearColor(pub [f32; 4]);

impl ClearColor {
    pub const OPAQUE_BLACK: Self = Self([0.0, 0.0, 0.0, 1.0]);

    pub fn to_rgba8(self) -> [u8; 4] {
        self.0.map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

impl Default for ClearColor {
    fn default() -> Self {
        Self::OPAQUE_BLACK
    }
}

/// Opaque producer device-context handle handed to the engine.
///
/// On D3D11 this is the raw `ID3D11DeviceContext*` of the producer device.
/// The bridge never dereferences it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProducerContext {
    raw: usize,
}

impl ProducerContext {
    pub const fn from_raw(raw: usize) -> Self {
        Self { raw }
    }

    pub const fn raw(&self) -> usize {
        self.raw
    }

    pub fn as_ptr(&self) -> *mut std::ffi::c_void {
        self.raw as *mut std::ffi::c_void
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Direct3D11,
    Software,
}

impl BackendKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Direct3D11 => "d3d11",
            Self::Software => "software",
        }
    }
}

/// A live shared surface: one texture visible on both devices.
///
/// Implementations own the export handle, the producer render-target view
/// and the consumer shader-resource view. None of them is reachable from
/// outside the backend.
pub trait SharedSurface {
    fn size(&self) -> SurfaceSize;

    fn format(&self) -> PixelFormat;

    /// Monotonic allocation number; two surfaces with the same generation
    /// are the same allocation.
    fn generation(&self) -> u64;
}

/// The pair of GPU devices the bridge coordinates: a producer device the
/// engine draws with and a consumer device that owns the swap chain.
///
/// Every method runs synchronously on the calling thread and must not block
/// on user input or I/O.
pub trait GraphicsBackend {
    type Surface: SharedSurface;

    fn kind(&self) -> BackendKind;

    /// Takes one counted reference on the producer context for the engine.
    fn lease_producer_context(&mut self) -> BridgeResult<ProducerContext>;

    /// Drops every reference taken by [`lease_producer_context`] and returns
    /// how many were released.
    ///
    /// [`lease_producer_context`]: GraphicsBackend::lease_producer_context
    fn release_producer_leases(&mut self) -> usize;

    fn outstanding_producer_leases(&self) -> usize;

    fn presentation_size(&self) -> WindowSize;

    /// Allocates a shareable texture on the consumer device, exports it,
    /// opens it on the producer device and creates both views.
    fn allocate_surface(
        &mut self,
        size: SurfaceSize,
        format: PixelFormat,
    ) -> BridgeResult<Self::Surface>;

    /// Tears a surface down: unbinds it from the producer context, releases
    /// both views, closes the export handle, then releases the texture.
    fn release_surface(&mut self, surface: Self::Surface);

    /// Makes the surface the producer's render target with a full-surface
    /// viewport.
    fn bind_producer_target(&mut self, surface: &Self::Surface);

    fn clear_producer_target(&mut self, surface: &Self::Surface, color: ClearColor);

    /// Clears the presentation target, binds the quad pipeline with the
    /// surface as shader input and issues the full-screen draw.
    fn composite(
        &mut self,
        surface: &Self::Surface,
        viewport: WindowSize,
        background: ClearColor,
    ) -> BridgeResult<()>;

    fn present(&mut self, sync_interval: u32) -> BridgeResult<()>;

    /// Releases the presentation render target, clears consumer state,
    /// resizes the back buffers and recreates the render target.
    fn resize_presentation(&mut self, size: WindowSize) -> BridgeResult<()>;

    /// Releases pipeline state, the presentation surface and both devices.
    /// Idempotent.
    fn shutdown(&mut self);
}
