pub mod software;

#[cfg(target_os = "windows")]
pub(crate) mod windows;

#[cfg(target_os = "windows")]
pub use windows::{D3D11Backend, D3D11SharedSurface};

#[cfg(not(target_os = "windows"))]
pub use unsupported::{D3D11Backend, D3D11SharedSurface};

#[cfg(not(target_os = "windows"))]
mod unsupported {
    use crate::backend::{
        BackendKind, ClearColor, GraphicsBackend, ProducerContext, SharedSurface, SurfaceSize,
    };
    use crate::error::{BridgeError, BridgeResult};
    use crate::format::PixelFormat;
    use crate::session::SessionConfig;
    use crate::window::{WindowId, WindowSize};

    /// Direct3D 11 does not exist on this platform; no value of this type
    /// can be constructed.
    pub enum D3D11Backend {}

    pub enum D3D11SharedSurface {}

    impl D3D11Backend {
        pub fn new(_window: WindowId, _config: &SessionConfig) -> BridgeResult<Self> {
            Err(BridgeError::BackendUnavailable(
                "Direct3D 11 is only available on Windows".to_string(),
            ))
        }
    }

    impl SharedSurface for D3D11SharedSurface {
        fn size(&self) -> SurfaceSize {
            match *self {}
        }

        fn format(&self) -> PixelFormat {
            match *self {}
        }

        fn generation(&self) -> u64 {
            match *self {}
        }
    }

    impl GraphicsBackend for D3D11Backend {
        type Surface = D3D11SharedSurface;

        fn kind(&self) -> BackendKind {
            match *self {}
        }

        fn lease_producer_context(&mut self) -> BridgeResult<ProducerContext> {
            match *self {}
        }

        fn release_producer_leases(&mut self) -> usize {
            match *self {}
        }

        fn outstanding_producer_leases(&self) -> usize {
            match *self {}
        }

        fn presentation_size(&self) -> WindowSize {
            match *self {}
        }

        fn allocate_surface(
            &mut self,
            _size: SurfaceSize,
            _format: PixelFormat,
        ) -> BridgeResult<D3D11SharedSurface> {
            match *self {}
        }

        fn release_surface(&mut self, surface: D3D11SharedSurface) {
            match surface {}
        }

        fn bind_producer_target(&mut self, _surface: &D3D11SharedSurface) {
            match *self {}
        }

        fn clear_producer_target(&mut self, _surface: &D3D11SharedSurface, _color: ClearColor) {
            match *self {}
        }

        fn composite(
            &mut self,
            _surface: &D3D11SharedSurface,
            _viewport: WindowSize,
            _background: ClearColor,
        ) -> BridgeResult<()> {
            match *self {}
        }

        fn present(&mut self, _sync_interval: u32) -> BridgeResult<()> {
            match *self {}
        }

        fn resize_presentation(&mut self, _size: WindowSize) -> BridgeResult<()> {
            match *self {}
        }

        fn shutdown(&mut self) {
            match *self {}
        }
    }

}
