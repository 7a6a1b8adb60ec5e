//! CPU reference implementation of [`GraphicsBackend`].
//!
//! Both "devices" live in process memory. The shared surface is a single
//! texel buffer; the producer reaches it only by opening the export handle
//! the consumer side registered, the same way the D3D11 backend opens an NT
//! handle on the second device. Every device call is recorded so tests can
//! check ordering and resource balance through [`SoftwareProbe`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::backend::{
    BackendKind, ClearColor, GraphicsBackend, ProducerContext, SharedSurface, SurfaceSize,
};
use crate::error::{BridgeError, BridgeResult};
use crate::format::PixelFormat;
use crate::session::SessionConfig;
use crate::window::WindowSize;

#[derive(Clone, Debug)]
pub(crate) struct TexelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl TexelBuffer {
    fn new(width: u32, height: u32, fill: [u8; 4]) -> Self {
        let mut buffer = Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        };
        buffer.fill(fill);
        buffer
    }

    fn fill(&mut self, rgba: [u8; 4]) {
        for texel in self.data.chunks_exact_mut(4) {
            texel.copy_from_slice(&rgba);
        }
    }

    fn fill_rect(&mut self, x: u32, y: u32, width: u32, height: u32, rgba: [u8; 4]) {
        let x_end = x.saturating_add(width).min(self.width);
        let y_end = y.saturating_add(height).min(self.height);
        for row in y.min(y_end)..y_end {
            for col in x.min(x_end)..x_end {
                let at = self.offset(col, row);
                self.data[at..at + 4].copy_from_slice(&rgba);
            }
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    fn texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let at = self.offset(x, y);
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.data[at..at + 4]);
        Some(rgba)
    }

    fn size(&self) -> WindowSize {
        WindowSize::new(self.width, self.height)
    }

    /// Bilinear sample with clamp addressing at normalized `(u, v)`.
    fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let x = (u * self.width as f32 - 0.5).clamp(0.0, (self.width - 1) as f32);
        let y = (v * self.height as f32 - 0.5).clamp(0.0, (self.height - 1) as f32);
        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let load = |tx: u32, ty: u32| {
            let at = self.offset(tx, ty);
            [0, 1, 2, 3].map(|c| f32::from(self.data[at + c]))
        };
        let (a, b, c, d) = (load(x0, y0), load(x1, y0), load(x0, y1), load(x1, y1));
        [0, 1, 2, 3].map(|ch| {
            let top = a[ch] + (b[ch] - a[ch]) * fx;
            let bottom = c[ch] + (d[ch] - c[ch]) * fx;
            top + (bottom - top) * fy
        })
    }
}

type Texels = Arc<Mutex<TexelBuffer>>;

/// One recorded device call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceOp {
    LeaseProducer,
    AllocateSurface { generation: u64, size: SurfaceSize },
    ReleaseSurface { generation: u64 },
    BindProducerTarget { generation: u64 },
    ClearProducerTarget { generation: u64 },
    Composite { generation: u64, viewport: WindowSize },
    Present { sync_interval: u32 },
    ResizePresentation { size: WindowSize },
    ReleaseProducerLeases { count: usize },
    Shutdown,
}

/// Export-handle bookkeeping at one point in time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportHandleStats {
    pub created: u64,
    pub closed: u64,
    pub open: usize,
    /// Close attempts on a handle that was not open. Always zero unless a
    /// handle is closed twice.
    pub invalid_closes: u64,
}

#[derive(Default)]
struct ExportTable {
    next_value: u64,
    open: FxHashMap<u64, Texels>,
    created: u64,
    closed: u64,
    invalid_closes: u64,
}

impl ExportTable {
    fn export(&mut self, texels: Texels) -> u64 {
        self.next_value += 4;
        let value = self.next_value;
        self.open.insert(value, texels);
        self.created += 1;
        value
    }

    fn open_shared(&self, value: u64) -> Option<Texels> {
        self.open.get(&value).cloned()
    }

    fn close(&mut self, value: u64) {
        if self.open.remove(&value).is_some() {
            self.closed += 1;
        } else {
            self.invalid_closes += 1;
        }
    }
}

/// Owned export handle. Closed exactly once, on [`ExportHandle::close`] or
/// drop, whichever comes first.
struct ExportHandle {
    value: Option<u64>,
    table: Arc<Mutex<ExportTable>>,
}

impl ExportHandle {
    fn close(&mut self) {
        if let Some(value) = self.value.take() {
            self.table.lock().close(value);
        }
    }
}

impl Drop for ExportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct SoftwareSurface {
    size: SurfaceSize,
    format: PixelFormat,
    generation: u64,
    texture: Texels,
    producer_view: Option<Texels>,
    handle: ExportHandle,
}

impl SoftwareSurface {
    /// Texel as the consumer device reads it through its shader resource
    /// view. Out-of-range coordinates read as transparent black.
    pub fn consumer_texel(&self, x: u32, y: u32) -> [u8; 4] {
        self.texture.lock().texel(x, y).unwrap_or_default()
    }
}

impl SharedSurface for SoftwareSurface {
    fn size(&self) -> SurfaceSize {
        self.size
    }

    fn format(&self) -> PixelFormat {
        self.format
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Default)]
struct ProducerState {
    target: Option<Texels>,
}

/// What the engine draws with: the producer context and whatever render
/// target is currently bound on it.
#[derive(Clone, Default)]
pub struct SoftwareProducer {
    state: Arc<Mutex<ProducerState>>,
}

impl SoftwareProducer {
    /// Clears the bound render target. Returns `false` when nothing is bound.
    pub fn fill(&self, color: ClearColor) -> bool {
        let state = self.state.lock();
        match &state.target {
            Some(target) => {
                target.lock().fill(color.to_rgba8());
                true
            }
            None => false,
        }
    }

    pub fn fill_rect(&self, x: u32, y: u32, width: u32, height: u32, color: ClearColor) -> bool {
        let state = self.state.lock();
        match &state.target {
            Some(target) => {
                target.lock().fill_rect(x, y, width, height, color.to_rgba8());
                true
            }
            None => false,
        }
    }

    pub fn has_target(&self) -> bool {
        self.state.lock().target.is_some()
    }

    fn raw(&self) -> usize {
        Arc::as_ptr(&self.state) as usize
    }
}

#[derive(Default)]
struct ProbeState {
    ops: Vec<DeviceOp>,
    live_surfaces: usize,
    peak_live_surfaces: usize,
    outstanding_leases: usize,
    leases_released: usize,
    shutdowns: usize,
    presentation_targets: usize,
    front_buffer: Option<TexelBuffer>,
}

/// Read-only view into a [`SoftwareBackend`] that outlives it.
#[derive(Clone)]
pub struct SoftwareProbe {
    state: Arc<Mutex<ProbeState>>,
    exports: Arc<Mutex<ExportTable>>,
}

impl SoftwareProbe {
    pub fn ops(&self) -> Vec<DeviceOp> {
        self.state.lock().ops.clone()
    }

    pub fn count(&self, predicate: impl Fn(&DeviceOp) -> bool) -> usize {
        self.state.lock().ops.iter().filter(|op| predicate(op)).count()
    }

    pub fn export_handles(&self) -> ExportHandleStats {
        let table = self.exports.lock();
        ExportHandleStats {
            created: table.created,
            closed: table.closed,
            open: table.open.len(),
            invalid_closes: table.invalid_closes,
        }
    }

    pub fn live_surfaces(&self) -> usize {
        self.state.lock().live_surfaces
    }

    pub fn peak_live_surfaces(&self) -> usize {
        self.state.lock().peak_live_surfaces
    }

    pub fn outstanding_leases(&self) -> usize {
        self.state.lock().outstanding_leases
    }

    pub fn leases_released(&self) -> usize {
        self.state.lock().leases_released
    }

    pub fn shutdowns(&self) -> usize {
        self.state.lock().shutdowns
    }

    /// Number of times a presentation render target was created, including
    /// the initial one.
    pub fn presentation_targets_created(&self) -> usize {
        self.state.lock().presentation_targets
    }

    pub fn presented_size(&self) -> WindowSize {
        self.state
            .lock()
            .front_buffer
            .as_ref()
            .map(TexelBuffer::size)
            .unwrap_or(WindowSize::new(0, 0))
    }

    /// Texel of the last presented frame, `None` before the first present or
    /// outside the presented area.
    pub fn presented_texel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.state.lock().front_buffer.as_ref()?.texel(x, y)
    }
}

pub struct SoftwareBackend {
    probe: SoftwareProbe,
    producer: SoftwareProducer,
    back_buffer: TexelBuffer,
    copy_alpha: bool,
    next_generation: u64,
    leases: usize,
    fail_next_allocation: AtomicBool,
    alive: bool,
}

impl SoftwareBackend {
    /// Creates both in-memory devices and "compiles" the configured quad
    /// program by checking that it defines both entry points.
    pub fn new(config: &SessionConfig) -> BridgeResult<Self> {
        if let Some(entry) = config.shader.missing_entry_point() {
            return Err(BridgeError::ShaderCompile(format!(
                "entry point `{entry}` not found in shader source"
            )));
        }
        let copy_alpha = config
            .shader
            .pixel_defines
            .iter()
            .any(|define| define.name == "COPYMODE" && define.value != "0");

        let size = config.initial_size.non_zero();
        let probe = SoftwareProbe {
            state: Arc::new(Mutex::new(ProbeState {
                presentation_targets: 1,
                ..ProbeState::default()
            })),
            exports: Arc::new(Mutex::new(ExportTable::default())),
        };
        log::info!(
            "software backend ready, presentation {}x{}",
            size.width,
            size.height
        );
        Ok(Self {
            probe,
            producer: SoftwareProducer::default(),
            back_buffer: TexelBuffer::new(size.width, size.height, [0, 0, 0, 255]),
            copy_alpha,
            next_generation: 0,
            leases: 0,
            fail_next_allocation: AtomicBool::new(false),
            alive: true,
        })
    }

    pub fn probe(&self) -> SoftwareProbe {
        self.probe.clone()
    }

    pub fn producer(&self) -> SoftwareProducer {
        self.producer.clone()
    }

    /// Makes the next [`GraphicsBackend::allocate_surface`] fail the way a
    /// device out of memory would.
    pub fn fail_next_allocation(&self) {
        self.fail_next_allocation.store(true, Ordering::SeqCst);
    }

    fn record(&self, op: DeviceOp) {
        self.probe.state.lock().ops.push(op);
    }

    fn ensure_alive(&self, what: &str) -> BridgeResult<()> {
        if self.alive {
            Ok(())
        } else {
            Err(BridgeError::Platform(anyhow::anyhow!(
                "{what} called on a shut down device"
            )))
        }
    }
}

impl GraphicsBackend for SoftwareBackend {
    type Surface = SoftwareSurface;

    fn kind(&self) -> BackendKind {
        BackendKind::Software
    }

    fn lease_producer_context(&mut self) -> BridgeResult<ProducerContext> {
        self.ensure_alive("lease_producer_context")?;
        self.leases += 1;
        self.probe.state.lock().outstanding_leases = self.leases;
        self.record(DeviceOp::LeaseProducer);
        Ok(ProducerContext::from_raw(self.producer.raw()))
    }

    fn release_producer_leases(&mut self) -> usize {
        let count = std::mem::take(&mut self.leases);
        {
            let mut state = self.probe.state.lock();
            state.outstanding_leases = 0;
            state.leases_released += count;
        }
        self.record(DeviceOp::ReleaseProducerLeases { count });
        count
    }

    fn outstanding_producer_leases(&self) -> usize {
        self.leases
    }

    fn presentation_size(&self) -> WindowSize {
        self.back_buffer.size()
    }

    fn allocate_surface(
        &mut self,
        size: SurfaceSize,
        format: PixelFormat,
    ) -> BridgeResult<SoftwareSurface> {
        self.ensure_alive("allocate_surface")
            .map_err(|err| BridgeError::Allocation(err.to_string()))?;
        if self.fail_next_allocation.swap(false, Ordering::SeqCst) {
            return Err(BridgeError::allocation(anyhow::anyhow!(
                "CreateTexture2D failed for {}x{}: E_OUTOFMEMORY",
                size.width,
                size.height
            )));
        }

        let texture: Texels = Arc::new(Mutex::new(TexelBuffer::new(
            size.width,
            size.height,
            [0, 0, 0, 0],
        )));
        let value = self.probe.exports.lock().export(texture.clone());
        let handle = ExportHandle {
            value: Some(value),
            table: self.probe.exports.clone(),
        };
        let opened = self.probe.exports.lock().open_shared(value);
        let Some(producer_view) = opened else {
            return Err(BridgeError::allocation(anyhow::anyhow!(
                "OpenSharedResource1 failed: export handle {value:#x} is not open"
            )));
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        {
            let mut state = self.probe.state.lock();
            state.live_surfaces += 1;
            state.peak_live_surfaces = state.peak_live_surfaces.max(state.live_surfaces);
            state.ops.push(DeviceOp::AllocateSurface { generation, size });
        }
        Ok(SoftwareSurface {
            size,
            format,
            generation,
            texture,
            producer_view: Some(producer_view),
            handle,
        })
    }

    fn release_surface(&mut self, mut surface: SoftwareSurface) {
        {
            let mut producer = self.producer.state.lock();
            let bound = matches!(
                (&producer.target, &surface.producer_view),
                (Some(target), Some(view)) if Arc::ptr_eq(target, view)
            );
            if bound {
                producer.target = None;
            }
        }
        surface.producer_view = None;
        surface.handle.close();

        let mut state = self.probe.state.lock();
        state.live_surfaces = state.live_surfaces.saturating_sub(1);
        state.ops.push(DeviceOp::ReleaseSurface {
            generation: surface.generation,
        });
    }

    fn bind_producer_target(&mut self, surface: &SoftwareSurface) {
        self.producer.state.lock().target = surface.producer_view.clone();
        self.record(DeviceOp::BindProducerTarget {
            generation: surface.generation,
        });
    }

    fn clear_producer_target(&mut self, surface: &SoftwareSurface, color: ClearColor) {
        if let Some(view) = &surface.producer_view {
            view.lock().fill(color.to_rgba8());
        }
        self.record(DeviceOp::ClearProducerTarget {
            generation: surface.generation,
        });
    }

    fn composite(
        &mut self,
        surface: &SoftwareSurface,
        viewport: WindowSize,
        background: ClearColor,
    ) -> BridgeResult<()> {
        self.ensure_alive("composite")?;
        self.back_buffer.fill(background.to_rgba8());

        let width = viewport.width.min(self.back_buffer.width);
        let height = viewport.height.min(self.back_buffer.height);
        let source = surface.texture.lock();
        for y in 0..height {
            let v = (y as f32 + 0.5) / viewport.height as f32;
            for x in 0..width {
                let u = (x as f32 + 0.5) / viewport.width as f32;
                let sampled = source.sample(u, v);
                let mut rgba = sampled.map(|c| c.round().clamp(0.0, 255.0) as u8);
                if !self.copy_alpha {
                    rgba[3] = 255;
                }
                let at = self.back_buffer.offset(x, y);
                self.back_buffer.data[at..at + 4].copy_from_slice(&rgba);
            }
        }
        drop(source);

        self.record(DeviceOp::Composite {
            generation: surface.generation,
            viewport,
        });
        Ok(())
    }

    fn present(&mut self, sync_interval: u32) -> BridgeResult<()> {
        self.ensure_alive("present")?;
        let mut state = self.probe.state.lock();
        state.front_buffer = Some(self.back_buffer.clone());
        state.ops.push(DeviceOp::Present { sync_interval });
        Ok(())
    }

    fn resize_presentation(&mut self, size: WindowSize) -> BridgeResult<()> {
        self.ensure_alive("resize_presentation")?;
        let size = size.non_zero();
        self.back_buffer = TexelBuffer::new(size.width, size.height, [0, 0, 0, 255]);
        let mut state = self.probe.state.lock();
        state.presentation_targets += 1;
        state.ops.push(DeviceOp::ResizePresentation { size });
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;
        self.producer.state.lock().target = None;
        let mut state = self.probe.state.lock();
        state.shutdowns += 1;
        state.ops.push(DeviceOp::Shutdown);
        log::debug!("software backend shut down");
    }
}
