use crate::backend::{GraphicsBackend, SharedSurface, SurfaceSize};
use crate::error::BridgeResult;
use crate::format::PixelFormat;

/// What [`SurfaceManager::ensure_surface`] left in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub size: SurfaceSize,
    pub format: PixelFormat,
    pub generation: u64,
    /// `true` when this call destroyed (if any) and allocated a surface.
    pub reallocated: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    pub allocations: u64,
    pub releases: u64,
}

impl SurfaceStats {
    pub fn live(&self) -> u64 {
        self.allocations - self.releases
    }
}

/// Owns the single shared surface of a session.
///
/// At most one surface is live. A size change always releases the old
/// surface completely before the new one is allocated.
pub struct SurfaceManager<B: GraphicsBackend> {
    current: Option<B::Surface>,
    format: PixelFormat,
    stats: SurfaceStats,
}

impl<B: GraphicsBackend> SurfaceManager<B> {
    pub fn new(format: PixelFormat) -> Self {
        Self {
            current: None,
            format,
            stats: SurfaceStats::default(),
        }
    }

    /// Returns a surface of `max(width, 8) × max(height, 8)`, reusing the
    /// current one when the clamped size already matches.
    ///
    /// On allocation failure no surface is left behind.
    pub fn ensure_surface(
        &mut self,
        backend: &mut B,
        width: u32,
        height: u32,
    ) -> BridgeResult<SurfaceInfo> {
        let size = SurfaceSize::clamped(width, height);
        if let Some(surface) = &self.current
            && surface.size() == size
        {
            return Ok(SurfaceInfo {
                size,
                format: surface.format(),
                generation: surface.generation(),
                reallocated: false,
            });
        }

        self.release_surface(backend);

        let surface = backend.allocate_surface(size, self.format)?;
        self.stats.allocations += 1;
        let info = SurfaceInfo {
            size,
            format: surface.format(),
            generation: surface.generation(),
            reallocated: true,
        };
        log::debug!(
            "allocated shared surface #{} at {}x{}",
            info.generation,
            size.width,
            size.height
        );
        self.current = Some(surface);
        Ok(info)
    }

    /// Releases the live surface, if any. Returns whether one was released;
    /// calling it again is a no-op.
    pub fn release_surface(&mut self, backend: &mut B) -> bool {
        let Some(surface) = self.current.take() else {
            return false;
        };
        let size = surface.size();
        let generation = surface.generation();
        backend.release_surface(surface);
        self.stats.releases += 1;
        log::debug!(
            "released shared surface #{generation} ({}x{})",
            size.width,
            size.height
        );
        true
    }

    pub fn current(&self) -> Option<&B::Surface> {
        self.current.as_ref()
    }

    pub fn current_size(&self) -> Option<SurfaceSize> {
        self.current.as_ref().map(SharedSurface::size)
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ClearColor;
    use crate::platform::software::SoftwareBackend;
    use crate::session::SessionConfig;

    fn backend() -> SoftwareBackend {
        SoftwareBackend::new(&SessionConfig::default()).expect("software backend")
    }

    #[test]
    fn identical_requests_do_not_reallocate() {
        let mut backend = backend();
        let mut manager = SurfaceManager::<SoftwareBackend>::new(PixelFormat::Rgba8Unorm);

        let first = manager.ensure_surface(&mut backend, 640, 480).unwrap();
        let second = manager.ensure_surface(&mut backend, 640, 480).unwrap();

        assert!(first.reallocated);
        assert!(!second.reallocated);
        assert_eq!(first.generation, second.generation);
        assert_eq!(manager.stats().allocations, 1);
        assert_eq!(manager.stats().releases, 0);
    }

    #[test]
    fn degenerate_requests_share_the_minimum_allocation() {
        let mut backend = backend();
        let mut manager = SurfaceManager::<SoftwareBackend>::new(PixelFormat::Rgba8Unorm);

        let zero = manager.ensure_surface(&mut backend, 0, 0).unwrap();
        assert_eq!(zero.size, SurfaceSize::new(8, 8));
        let tiny = manager.ensure_surface(&mut backend, 3, 8).unwrap();
        assert!(!tiny.reallocated);
        assert_eq!(tiny.generation, zero.generation);
    }

    #[test]
    fn size_change_replaces_surface_without_overlap() {
        let mut backend = backend();
        let probe = backend.probe();
        let mut manager = SurfaceManager::<SoftwareBackend>::new(PixelFormat::Rgba8Unorm);

        let first = manager.ensure_surface(&mut backend, 640, 480).unwrap();
        let second = manager.ensure_surface(&mut backend, 1280, 720).unwrap();

        assert_ne!(first.generation, second.generation);
        assert_eq!(manager.current_size(), Some(SurfaceSize::new(1280, 720)));
        assert_eq!(manager.stats().live(), 1);
        assert_eq!(probe.peak_live_surfaces(), 1);
        assert_eq!(probe.export_handles().open, 1);
    }

    #[test]
    fn release_is_idempotent_and_closes_the_handle_once() {
        let mut backend = backend();
        let probe = backend.probe();
        let mut manager = SurfaceManager::<SoftwareBackend>::new(PixelFormat::Rgba8Unorm);

        manager.ensure_surface(&mut backend, 320, 240).unwrap();
        assert!(manager.release_surface(&mut backend));
        assert!(!manager.release_surface(&mut backend));

        let handles = probe.export_handles();
        assert_eq!(handles.created, 1);
        assert_eq!(handles.closed, 1);
        assert_eq!(handles.open, 0);
        assert_eq!(handles.invalid_closes, 0);
        assert!(manager.current().is_none());
    }

    #[test]
    fn allocation_failure_leaves_no_surface() {
        let mut backend = backend();
        let probe = backend.probe();
        let mut manager = SurfaceManager::<SoftwareBackend>::new(PixelFormat::Rgba8Unorm);

        manager.ensure_surface(&mut backend, 320, 240).unwrap();
        backend.fail_next_allocation();
        let err = manager.ensure_surface(&mut backend, 640, 480).unwrap_err();

        assert!(err.is_fatal());
        assert!(manager.current().is_none());
        assert_eq!(manager.stats().live(), 0);
        assert_eq!(probe.export_handles().open, 0);
    }

    #[test]
    fn producer_sees_what_the_consumer_allocated() {
        let mut backend = backend();
        let producer = backend.producer();
        let mut manager = SurfaceManager::<SoftwareBackend>::new(PixelFormat::Rgba8Unorm);

        manager.ensure_surface(&mut backend, 16, 16).unwrap();
        let surface = manager.current().unwrap();
        backend.bind_producer_target(surface);
        producer.fill(ClearColor([0.0, 1.0, 0.0, 1.0]));

        assert_eq!(surface.consumer_texel(3, 5), [0, 255, 0, 255]);
    }
}
