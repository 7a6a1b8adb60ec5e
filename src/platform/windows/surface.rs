use anyhow::Context;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Graphics::Direct3D11::{
    D3D11_BIND_RENDER_TARGET, D3D11_BIND_SHADER_RESOURCE, D3D11_RESOURCE_MISC_SHARED,
    D3D11_RESOURCE_MISC_SHARED_NTHANDLE, D3D11_TEXTURE2D_DESC, D3D11_USAGE_DEFAULT,
    ID3D11Device, ID3D11Device1, ID3D11RenderTargetView, ID3D11ShaderResourceView,
    ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT, DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    DXGI_SHARED_RESOURCE_READ, DXGI_SHARED_RESOURCE_WRITE, IDXGIResource1,
};
use windows::core::Interface;

use crate::backend::{SharedSurface, SurfaceSize};
use crate::error::{BridgeError, BridgeResult};
use crate::format::PixelFormat;

fn dxgi_format(format: PixelFormat) -> DXGI_FORMAT {
    match format {
        PixelFormat::Rgba8Unorm => DXGI_FORMAT_R8G8B8A8_UNORM,
    }
}

/// NT handle exported from the consumer texture. Closed exactly once, on
/// [`ExportHandle::close`] or drop.
struct ExportHandle {
    handle: Option<HANDLE>,
}

impl ExportHandle {
    fn create(texture: &ID3D11Texture2D) -> anyhow::Result<Self> {
        let resource = texture
            .cast::<IDXGIResource1>()
            .context("shared texture does not implement IDXGIResource1")?;
        let handle = unsafe {
            resource.CreateSharedHandle(
                None,
                DXGI_SHARED_RESOURCE_READ.0 | DXGI_SHARED_RESOURCE_WRITE.0,
                None,
            )
        }
        .context("IDXGIResource1::CreateSharedHandle failed")?;
        if handle.is_invalid() {
            anyhow::bail!("IDXGIResource1::CreateSharedHandle returned an invalid handle");
        }
        Ok(Self {
            handle: Some(handle),
        })
    }

    fn get(&self) -> Option<HANDLE> {
        self.handle
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(err) = unsafe { CloseHandle(handle) }
        {
            log::warn!("CloseHandle on shared surface export failed: {err}");
        }
    }
}

impl Drop for ExportHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Shared texture created on the consumer device and opened on the producer
/// device through its NT handle.
pub struct D3D11SharedSurface {
    size: SurfaceSize,
    format: PixelFormat,
    generation: u64,
    /// Consumer-side allocation; every other field aliases it.
    _texture: ID3D11Texture2D,
    shader_view: Option<ID3D11ShaderResourceView>,
    /// Render-target view over the producer's alias of the texture. Holds
    /// the only reference to that alias.
    producer_target: Option<ID3D11RenderTargetView>,
    handle: ExportHandle,
}

impl D3D11SharedSurface {
    /// Create the texture on `consumer`, export it, and open it on
    /// `producer`. Any failure drops whatever was already created, closing
    /// the export handle if it exists.
    pub(crate) fn allocate(
        consumer: &ID3D11Device,
        producer: &ID3D11Device1,
        producer_device: &ID3D11Device,
        size: SurfaceSize,
        format: PixelFormat,
        generation: u64,
    ) -> BridgeResult<Self> {
        let desc = D3D11_TEXTURE2D_DESC {
            Width: size.width,
            Height: size.height,
            MipLevels: 1,
            ArraySize: 1,
            Format: dxgi_format(format),
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_DEFAULT,
            BindFlags: (D3D11_BIND_SHADER_RESOURCE.0 | D3D11_BIND_RENDER_TARGET.0) as u32,
            CPUAccessFlags: 0,
            MiscFlags: (D3D11_RESOURCE_MISC_SHARED.0 | D3D11_RESOURCE_MISC_SHARED_NTHANDLE.0)
                as u32,
        };

        let mut texture: Option<ID3D11Texture2D> = None;
        unsafe { consumer.CreateTexture2D(&desc, None, Some(&mut texture)) }
            .with_context(|| format!("CreateTexture2D failed for {}x{}", size.width, size.height))
            .map_err(BridgeError::allocation)?;
        let texture = texture
            .context("CreateTexture2D did not return a texture")
            .map_err(BridgeError::allocation)?;

        let mut shader_view: Option<ID3D11ShaderResourceView> = None;
        unsafe { consumer.CreateShaderResourceView(&texture, None, Some(&mut shader_view)) }
            .context("CreateShaderResourceView failed")
            .map_err(BridgeError::allocation)?;

        let handle = ExportHandle::create(&texture).map_err(BridgeError::allocation)?;
        let raw = handle
            .get()
            .context("export handle closed before it was opened")
            .map_err(BridgeError::allocation)?;

        let producer_texture: ID3D11Texture2D = unsafe { producer.OpenSharedResource1(raw) }
            .context("ID3D11Device1::OpenSharedResource1 failed")
            .map_err(BridgeError::allocation)?;

        let mut producer_target: Option<ID3D11RenderTargetView> = None;
        unsafe {
            producer_device.CreateRenderTargetView(
                &producer_texture,
                None,
                Some(&mut producer_target),
            )
        }
        .context("CreateRenderTargetView failed on the producer device")
        .map_err(BridgeError::allocation)?;

        Ok(Self {
            size,
            format,
            generation,
            _texture: texture,
            shader_view,
            producer_target,
            handle,
        })
    }

    pub(crate) fn shader_view(&self) -> Option<&ID3D11ShaderResourceView> {
        self.shader_view.as_ref()
    }

    pub(crate) fn producer_target(&self) -> Option<&ID3D11RenderTargetView> {
        self.producer_target.as_ref()
    }

    /// Views first (releasing the producer's alias with its view), then the
    /// handle. The consumer texture goes last when `self` is dropped.
    pub(crate) fn release(mut self) {
        self.producer_target = None;
        self.shader_view = None;
        self.handle.close();
        drop(self);
    }
}

impl SharedSurface for D3D11SharedSurface {
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
