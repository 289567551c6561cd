// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Files are read at pipeline build time and
// the resulting modules only live until the pipeline has been created.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::api::DeviceApi;

/// SPIR-V magic number, first word of every module
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V from raw bytes.
///
/// `read_spv` takes care of alignment and byte order, so the bytes may come
/// from anywhere (file, `include_bytes!`, network).
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    let code = ash::util::read_spv(&mut Cursor::new(bytes)).context("Invalid SPIR-V")?;
    if code.first() != Some(&SPIRV_MAGIC) {
        anyhow::bail!("Invalid SPIR-V: missing magic number");
    }
    Ok(code)
}

/// Load a SPIR-V file from disk
pub fn spirv_from_file(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .with_context(|| format!("File not found: {}", path.display()))?;
    spirv_from_bytes(&bytes).with_context(|| format!("Failed to load shader {}", path.display()))
}

pub fn create_shader_module(device: &dyn DeviceApi, code: &[u32]) -> Result<vk::ShaderModule> {
    device
        .create_shader_module(code)
        .context("Failed to create shader module")
}
