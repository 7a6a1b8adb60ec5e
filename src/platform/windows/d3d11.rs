use anyhow::{Context, Result};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D::{D3D_DRIVER_TYPE_HARDWARE, D3D_FEATURE_LEVEL_11_1};
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CREATE_DEVICE_DEBUG, D3D11_CREATE_DEVICE_FLAG, D3D11_CREATE_DEVICE_VIDEO_SUPPORT,
    D3D11_SDK_VERSION, D3D11CreateDevice, D3D11CreateDeviceAndSwapChain, ID3D11Device,
    ID3D11Device1, ID3D11DeviceContext, ID3D11Multithread,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_R8G8B8A8_UNORM, DXGI_MODE_DESC, DXGI_RATIONAL, DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    DXGI_MWA_NO_ALT_ENTER, DXGI_MWA_NO_PRINT_SCREEN, DXGI_MWA_NO_WINDOW_CHANGES,
    DXGI_SWAP_CHAIN_DESC, DXGI_SWAP_CHAIN_FLAG_ALLOW_MODE_SWITCH, DXGI_SWAP_EFFECT_DISCARD,
    DXGI_USAGE_RENDER_TARGET_OUTPUT, IDXGIFactory, IDXGISwapChain,
};
use windows::core::Interface;

use crate::window::WindowSize;

/// Device the engine renders with. Never touches the swap chain.
pub(crate) struct ProducerDevice {
    pub(crate) device: ID3D11Device,
    /// Needed to open NT shared handles.
    pub(crate) device1: ID3D11Device1,
    pub(crate) context: ID3D11DeviceContext,
}

/// Device that owns the window's swap chain and composites the shared
/// surface into it.
pub(crate) struct ConsumerDevice {
    pub(crate) device: ID3D11Device,
    pub(crate) context: ID3D11DeviceContext,
    pub(crate) swap_chain: IDXGISwapChain,
}

fn creation_flags(debug: bool) -> D3D11_CREATE_DEVICE_FLAG {
    if debug {
        D3D11_CREATE_DEVICE_DEBUG
    } else {
        D3D11_CREATE_DEVICE_FLAG(0)
    }
}

/// Create the producer device on the default hardware adapter with video
/// support, so the engine can decode straight into its own context.
pub(crate) fn create_producer_device(debug: bool) -> Result<ProducerDevice> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    let feature_levels = [D3D_FEATURE_LEVEL_11_1];

    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            creation_flags(debug) | D3D11_CREATE_DEVICE_VIDEO_SUPPORT,
            Some(&feature_levels),
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
    }
    .context("D3D11CreateDevice failed for the producer device")?;

    let device = device.context("D3D11CreateDevice did not return a device")?;
    let context = context.context("D3D11CreateDevice did not return a device context")?;
    let device1 = device
        .cast::<ID3D11Device1>()
        .context("producer device does not implement ID3D11Device1")?;
    Ok(ProducerDevice {
        device,
        device1,
        context,
    })
}

/// Create the consumer device together with a windowed, single-sample
/// RGBA8 swap chain for `window`.
pub(crate) fn create_consumer_device(
    window: HWND,
    size: WindowSize,
    buffer_count: u32,
    debug: bool,
) -> Result<ConsumerDevice> {
    let desc = DXGI_SWAP_CHAIN_DESC {
        BufferDesc: DXGI_MODE_DESC {
            Width: size.width,
            Height: size.height,
            RefreshRate: DXGI_RATIONAL {
                Numerator: 60,
                Denominator: 1,
            },
            Format: DXGI_FORMAT_R8G8B8A8_UNORM,
            ..Default::default()
        },
        SampleDesc: DXGI_SAMPLE_DESC {
            Count: 1,
            Quality: 0,
        },
        BufferUsage: DXGI_USAGE_RENDER_TARGET_OUTPUT,
        BufferCount: buffer_count,
        OutputWindow: window,
        Windowed: true.into(),
        SwapEffect: DXGI_SWAP_EFFECT_DISCARD,
        Flags: DXGI_SWAP_CHAIN_FLAG_ALLOW_MODE_SWITCH.0 as u32,
    };

    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    let mut swap_chain: Option<IDXGISwapChain> = None;
    let feature_levels = [D3D_FEATURE_LEVEL_11_1];

    unsafe {
        D3D11CreateDeviceAndSwapChain(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            creation_flags(debug),
            Some(&feature_levels),
            D3D11_SDK_VERSION,
            Some(&desc),
            Some(&mut swap_chain),
            Some(&mut device),
            None,
            Some(&mut context),
        )
    }
    .context("D3D11CreateDeviceAndSwapChain failed")?;

    let device = device.context("D3D11CreateDeviceAndSwapChain did not return a device")?;
    let context =
        context.context("D3D11CreateDeviceAndSwapChain did not return a device context")?;
    let swap_chain =
        swap_chain.context("D3D11CreateDeviceAndSwapChain did not return a swap chain")?;
    Ok(ConsumerDevice {
        device,
        context,
        swap_chain,
    })
}

/// The host's resize path and the engine's render path reach the consumer
/// device from different call stacks without a shared lock.
pub(crate) fn enable_multithread_protection(device: &ID3D11Device) -> Result<()> {
    let multithread = device
        .cast::<ID3D11Multithread>()
        .context("device does not implement ID3D11Multithread")?;
    unsafe {
        let _ = multithread.SetMultithreadProtected(true);
    }
    Ok(())
}

/// Stop DXGI from reacting to Alt+Enter, Print Screen and window messages on
/// its own; the host handles those.
pub(crate) fn ignore_window_shortcuts(swap_chain: &IDXGISwapChain, window: HWND) -> Result<()> {
    let factory: IDXGIFactory =
        unsafe { swap_chain.GetParent() }.context("IDXGISwapChain::GetParent failed")?;
    unsafe {
        factory.MakeWindowAssociation(
            window,
            DXGI_MWA_NO_WINDOW_CHANGES | DXGI_MWA_NO_ALT_ENTER | DXGI_MWA_NO_PRINT_SCREEN,
        )
    }
    .context("IDXGIFactory::MakeWindowAssociation failed")
}
