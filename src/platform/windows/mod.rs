pub(crate) mod d3d11;
pub(crate) mod pipeline;
pub(crate) mod surface;
pub(crate) mod swap_chain;

use anyhow::Context;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D11::{D3D11_VIEWPORT, ID3D11DeviceContext};
use windows::core::Interface;

use crate::backend::{
    BackendKind, ClearColor, GraphicsBackend, ProducerContext, SharedSurface, SurfaceSize,
};
use crate::error::{BridgeError, BridgeResult};
use crate::format::PixelFormat;
use crate::session::SessionConfig;
use crate::window::{WindowId, WindowSize};

use d3d11::{ConsumerDevice, ProducerDevice};
use pipeline::QuadPipeline;
use swap_chain::Presentation;

pub use surface::D3D11SharedSurface;

/// Everything released by [`GraphicsBackend::shutdown`], in field order.
struct Devices {
    pipeline: QuadPipeline,
    presentation: Presentation,
    producer: ProducerDevice,
    consumer: ConsumerDevice,
}

/// Two hardware devices: the producer handed to the engine and the consumer
/// presenting into the host window.
pub struct D3D11Backend {
    window: WindowId,
    devices: Option<Devices>,
    /// AddRef'd producer contexts, one per engine `setup`.
    leases: Vec<ID3D11DeviceContext>,
    next_generation: u64,
    last_size: WindowSize,
}

impl D3D11Backend {
    pub fn new(window: WindowId, config: &SessionConfig) -> BridgeResult<Self> {
        let hwnd = HWND(window.raw_handle() as *mut core::ffi::c_void);
        let size = config.initial_size.non_zero();

        let producer =
            d3d11::create_producer_device(config.debug_device).map_err(BridgeError::device)?;
        let consumer = d3d11::create_consumer_device(
            hwnd,
            size,
            config.swap_chain_buffers,
            config.debug_device,
        )
        .map_err(BridgeError::device)?;
        d3d11::ignore_window_shortcuts(&consumer.swap_chain, hwnd).map_err(BridgeError::device)?;
        d3d11::enable_multithread_protection(&consumer.device).map_err(BridgeError::device)?;

        let pipeline = QuadPipeline::new(&consumer.device, &config.shader)?;
        let presentation = Presentation::new(
            &consumer.device,
            consumer.swap_chain.clone(),
            size,
            config.swap_chain_buffers,
        )
        .map_err(BridgeError::device)?;

        log::info!(
            "D3D11 devices created for window {} ({}x{}, {} buffer(s), debug layer: {})",
            window.stable_id(),
            size.width,
            size.height,
            config.swap_chain_buffers,
            config.debug_device
        );
        Ok(Self {
            window,
            devices: Some(Devices {
                pipeline,
                presentation,
                producer,
                consumer,
            }),
            leases: Vec::new(),
            next_generation: 0,
            last_size: size,
        })
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    fn devices(&self, what: &str) -> BridgeResult<&Devices> {
        self.devices.as_ref().ok_or_else(|| {
            BridgeError::Platform(anyhow::anyhow!("{what} called after device shutdown"))
        })
    }
}

impl GraphicsBackend for D3D11Backend {
    type Surface = D3D11SharedSurface;

    fn kind(&self) -> BackendKind {
        BackendKind::Direct3D11
    }

    fn lease_producer_context(&mut self) -> BridgeResult<ProducerContext> {
        let context = self.devices("lease_producer_context")?.producer.context.clone();
        let raw = context.as_raw() as usize;
        self.leases.push(context);
        Ok(ProducerContext::from_raw(raw))
    }

    fn release_producer_leases(&mut self) -> usize {
        let count = self.leases.len();
        self.leases.clear();
        count
    }

    fn outstanding_producer_leases(&self) -> usize {
        self.leases.len()
    }

    fn presentation_size(&self) -> WindowSize {
        self.devices
            .as_ref()
            .map(|devices| devices.presentation.size())
            .unwrap_or(self.last_size)
    }

    fn allocate_surface(
        &mut self,
        size: SurfaceSize,
        format: PixelFormat,
    ) -> BridgeResult<D3D11SharedSurface> {
        let devices = self
            .devices("allocate_surface")
            .map_err(|err| BridgeError::Allocation(err.to_string()))?;
        let surface = D3D11SharedSurface::allocate(
            &devices.consumer.device,
            &devices.producer.device1,
            &devices.producer.device,
            size,
            format,
            self.next_generation + 1,
        )?;
        self.next_generation += 1;
        Ok(surface)
    }

    fn release_surface(&mut self, surface: D3D11SharedSurface) {
        if let Some(devices) = &self.devices {
            unsafe {
                devices.producer.context.OMSetRenderTargets(None, None);
                devices.consumer.context.PSSetShaderResources(0, Some(&[None]));
            }
        }
        surface.release();
    }

    fn bind_producer_target(&mut self, surface: &D3D11SharedSurface) {
        let (Some(devices), Some(target)) = (&self.devices, surface.producer_target()) else {
            return;
        };
        let size = surface.size();
        let viewport = D3D11_VIEWPORT {
            TopLeftX: 0.0,
            TopLeftY: 0.0,
            Width: size.width as f32,
            Height: size.height as f32,
            MinDepth: 0.0,
            MaxDepth: 1.0,
        };
        unsafe {
            devices
                .producer
                .context
                .OMSetRenderTargets(Some(&[Some(target.clone())]), None);
            devices.producer.context.RSSetViewports(Some(&[viewport]));
        }
    }

    fn clear_producer_target(&mut self, surface: &D3D11SharedSurface, color: ClearColor) {
        if let (Some(devices), Some(target)) = (&self.devices, surface.producer_target()) {
            unsafe { devices.producer.context.ClearRenderTargetView(target, &color.0) };
        }
    }

    fn composite(
        &mut self,
        surface: &D3D11SharedSurface,
        viewport: WindowSize,
        background: ClearColor,
    ) -> BridgeResult<()> {
        let devices = self.devices("composite")?;
        let target = devices
            .presentation
            .target()
            .context("presentation target missing")?;
        let input = surface
            .shader_view()
            .context("shared surface has no shader resource view")?;
        devices.pipeline.draw(
            &devices.consumer.context,
            target,
            input,
            viewport,
            background,
        );
        Ok(())
    }

    fn present(&mut self, sync_interval: u32) -> BridgeResult<()> {
        self.devices("present")?
            .presentation
            .present(sync_interval)?;
        Ok(())
    }

    fn resize_presentation(&mut self, size: WindowSize) -> BridgeResult<()> {
        let devices = self.devices.as_mut().ok_or_else(|| {
            BridgeError::Platform(anyhow::anyhow!("resize called after device shutdown"))
        })?;
        devices
            .presentation
            .resize(&devices.consumer.device, &devices.consumer.context, size)?;
        self.last_size = size;
        Ok(())
    }

    fn shutdown(&mut self) {
        let Some(devices) = self.devices.take() else {
            return;
        };
        if !self.leases.is_empty() {
            log::warn!(
                "releasing {} producer context lease(s) still held at shutdown",
                self.leases.len()
            );
            self.leases.clear();
        }
        unsafe {
            devices.consumer.context.ClearState();
            devices.producer.context.ClearState();
        }
        let Devices {
            pipeline,
            presentation,
            producer,
            consumer,
        } = devices;
        drop(pipeline);
        drop(presentation);
        drop(producer);
        drop(consumer);
        log::info!("D3D11 devices released for window {}", self.window.stable_id());
    }
}

impl Drop for D3D11Backend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
