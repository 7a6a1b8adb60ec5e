use anyhow::{Context, Result};
use windows::Win32::Graphics::Direct3D11::{
    ID3D11Device, ID3D11DeviceContext, ID3D11RenderTargetView, ID3D11Texture2D,
};
use windows::Win32::Graphics::Dxgi::Common::DXGI_FORMAT_UNKNOWN;
use windows::Win32::Graphics::Dxgi::{DXGI_PRESENT, DXGI_SWAP_CHAIN_FLAG, IDXGISwapChain};

use crate::window::WindowSize;

/// The window's swap chain and the render-target view over its back buffer.
pub(crate) struct Presentation {
    swap_chain: IDXGISwapChain,
    target: Option<ID3D11RenderTargetView>,
    size: WindowSize,
    buffer_count: u32,
}

fn back_buffer_target(
    device: &ID3D11Device,
    swap_chain: &IDXGISwapChain,
) -> Result<ID3D11RenderTargetView> {
    let back_buffer: ID3D11Texture2D =
        unsafe { swap_chain.GetBuffer(0) }.context("IDXGISwapChain::GetBuffer failed")?;
    let mut target: Option<ID3D11RenderTargetView> = None;
    unsafe { device.CreateRenderTargetView(&back_buffer, None, Some(&mut target)) }
        .context("CreateRenderTargetView failed for the back buffer")?;
    target.context("CreateRenderTargetView did not return a view")
}

impl Presentation {
    pub(crate) fn new(
        device: &ID3D11Device,
        swap_chain: IDXGISwapChain,
        size: WindowSize,
        buffer_count: u32,
    ) -> Result<Self> {
        let target = back_buffer_target(device, &swap_chain)?;
        Ok(Self {
            swap_chain,
            target: Some(target),
            size,
            buffer_count,
        })
    }

    pub(crate) fn target(&self) -> Option<&ID3D11RenderTargetView> {
        self.target.as_ref()
    }

    pub(crate) fn size(&self) -> WindowSize {
        self.size
    }

    /// Drops the back-buffer view, clears every binding on `context` so no
    /// reference to the old buffers survives, resizes the buffers keeping
    /// count and format, then recreates the view.
    pub(crate) fn resize(
        &mut self,
        device: &ID3D11Device,
        context: &ID3D11DeviceContext,
        size: WindowSize,
    ) -> Result<()> {
        self.target = None;
        unsafe { context.ClearState() };
        unsafe {
            self.swap_chain.ResizeBuffers(
                self.buffer_count,
                size.width,
                size.height,
                DXGI_FORMAT_UNKNOWN,
                DXGI_SWAP_CHAIN_FLAG(0),
            )
        }
        .with_context(|| format!("ResizeBuffers failed for {}x{}", size.width, size.height))?;
        self.target = Some(back_buffer_target(device, &self.swap_chain)?);
        self.size = size;
        Ok(())
    }

    pub(crate) fn present(&self, sync_interval: u32) -> Result<()> {
        unsafe { self.swap_chain.Present(sync_interval, DXGI_PRESENT(0)) }
            .ok()
            .context("IDXGISwapChain::Present failed")
    }
}
