use std::ffi::CString;

use anyhow::Context;
use windows::Win32::Graphics::Direct3D::Fxc::D3DCompile;
use windows::Win32::Graphics::Direct3D::{
    D3D_SHADER_MACRO, D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST, ID3DBlob,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11_COMPARISON_NEVER, D3D11_FILTER_MIN_MAG_MIP_LINEAR, D3D11_FLOAT32_MAX,
    D3D11_SAMPLER_DESC, D3D11_TEXTURE_ADDRESS_CLAMP, D3D11_VIEWPORT, ID3D11Device,
    ID3D11DeviceContext, ID3D11PixelShader, ID3D11RenderTargetView, ID3D11SamplerState,
    ID3D11ShaderResourceView, ID3D11VertexShader,
};
use windows::core::PCSTR;

use crate::backend::ClearColor;
use crate::error::{BridgeError, BridgeResult};
use crate::shader::{PIXEL_TARGET, ShaderDefine, ShaderSource, VERTEX_TARGET};
use crate::window::WindowSize;

fn blob_bytes(blob: &ID3DBlob) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            blob.GetBufferPointer() as *const u8,
            blob.GetBufferSize(),
        )
    }
}

fn c_string(value: &str) -> BridgeResult<CString> {
    CString::new(value)
        .map_err(|_| BridgeError::ShaderCompile(format!("`{value}` contains a NUL byte")))
}

/// Compile one stage of `source` at runtime.
fn compile_stage(
    source: &ShaderSource,
    entry: &str,
    target: &str,
    defines: &[ShaderDefine],
) -> BridgeResult<Vec<u8>> {
    let entry_c = c_string(entry)?;
    let target_c = c_string(target)?;
    let define_strings = defines
        .iter()
        .map(|define| Ok((c_string(&define.name)?, c_string(&define.value)?)))
        .collect::<BridgeResult<Vec<_>>>()?;
    let mut macros: Vec<D3D_SHADER_MACRO> = define_strings
        .iter()
        .map(|(name, value)| D3D_SHADER_MACRO {
            Name: PCSTR::from_raw(name.as_ptr() as *const u8),
            Definition: PCSTR::from_raw(value.as_ptr() as *const u8),
        })
        .collect();
    macros.push(D3D_SHADER_MACRO::default());

    let text = source.text.as_bytes();
    let mut blob: Option<ID3DBlob> = None;
    let mut errors: Option<ID3DBlob> = None;
    let hr = unsafe {
        D3DCompile(
            text.as_ptr() as *const _,
            text.len(),
            None,
            Some(macros.as_ptr()),
            None,
            PCSTR::from_raw(entry_c.as_ptr() as *const u8),
            PCSTR::from_raw(target_c.as_ptr() as *const u8),
            0,
            0,
            &mut blob,
            Some(&mut errors),
        )
    };

    if let Err(err) = hr {
        let msg = errors
            .as_ref()
            .map(|b| String::from_utf8_lossy(blob_bytes(b)).trim_end().to_string())
            .unwrap_or_default();
        return Err(BridgeError::ShaderCompile(format!(
            "{entry} ({target}): {err}: {msg}"
        )));
    }

    let blob = blob.ok_or_else(|| {
        BridgeError::ShaderCompile(format!("{entry} ({target}): D3DCompile returned no bytecode"))
    })?;
    Ok(blob_bytes(&blob).to_vec())
}

/// Full-screen quad program plus the linear clamp sampler it reads the
/// shared surface with.
pub(crate) struct QuadPipeline {
    vertex: ID3D11VertexShader,
    pixel: ID3D11PixelShader,
    sampler: ID3D11SamplerState,
}

impl QuadPipeline {
    pub(crate) fn new(device: &ID3D11Device, source: &ShaderSource) -> BridgeResult<Self> {
        let vs_bytes = compile_stage(source, &source.vertex_entry, VERTEX_TARGET, &[])?;
        let ps_bytes = compile_stage(
            source,
            &source.pixel_entry,
            PIXEL_TARGET,
            &source.pixel_defines,
        )?;

        let mut vertex: Option<ID3D11VertexShader> = None;
        unsafe { device.CreateVertexShader(&vs_bytes, None, Some(&mut vertex)) }
            .context("CreateVertexShader failed")
            .map_err(BridgeError::device)?;
        let mut pixel: Option<ID3D11PixelShader> = None;
        unsafe { device.CreatePixelShader(&ps_bytes, None, Some(&mut pixel)) }
            .context("CreatePixelShader failed")
            .map_err(BridgeError::device)?;

        let sampler_desc = D3D11_SAMPLER_DESC {
            Filter: D3D11_FILTER_MIN_MAG_MIP_LINEAR,
            AddressU: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressV: D3D11_TEXTURE_ADDRESS_CLAMP,
            AddressW: D3D11_TEXTURE_ADDRESS_CLAMP,
            MipLODBias: 0.0,
            MaxAnisotropy: 1,
            ComparisonFunc: D3D11_COMPARISON_NEVER,
            BorderColor: [0.0; 4],
            MinLOD: 0.0,
            MaxLOD: D3D11_FLOAT32_MAX,
        };
        let mut sampler: Option<ID3D11SamplerState> = None;
        unsafe { device.CreateSamplerState(&sampler_desc, Some(&mut sampler)) }
            .context("CreateSamplerState failed")
            .map_err(BridgeError::device)?;

        Ok(Self {
            vertex: vertex
                .context("CreateVertexShader returned no shader")
                .map_err(BridgeError::device)?,
            pixel: pixel
                .context("CreatePixelShader returned no shader")
                .map_err(BridgeError::device)?,
            sampler: sampler
                .context("CreateSamplerState returned no sampler")
                .map_err(BridgeError::device)?,
        })
    }

    /// Clear `target`, then draw `input` over a `viewport`-sized area of it.
    pub(crate) fn draw(
        &self,
        context: &ID3D11DeviceContext,
        target: &ID3D11RenderTargetView,
        input: &ID3D11ShaderResourceView,
        viewport: WindowSize,
        background: ClearColor,
    ) {
        let viewport = D3D11_VIEWPORT {
            TopLeftX: 0.0,
            TopLeftY: 0.0,
            Width: viewport.width as f32,
            Height: viewport.height as f32,
            MinDepth: 0.0,
            MaxDepth: 1.0,
        };
        unsafe {
            context.ClearRenderTargetView(target, &background.0);
            context.OMSetRenderTargets(Some(&[Some(target.clone())]), None);
            context.RSSetViewports(Some(&[viewport]));
            context.IASetInputLayout(None);
            context.IASetPrimitiveTopology(D3D11_PRIMITIVE_TOPOLOGY_TRIANGLELIST);
            context.VSSetShader(&self.vertex, None);
            context.PSSetShader(&self.pixel, None);
            context.PSSetShaderResources(0, Some(&[Some(input.clone())]));
            context.PSSetSamplers(0, Some(&[Some(self.sampler.clone())]));
            context.Draw(4, 0);
        }
    }
}
