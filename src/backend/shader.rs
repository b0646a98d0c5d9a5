// Shader module loading
//
// Vulkan uses SPIR-V bytecode for shaders. build.rs compiles shaders/*.glsl
// into OUT_DIR and `shader!` embeds the result in the binary.

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

/// Create a shader module from SPIR-V bytes
pub fn create_shader_module(device: &VulkanDevice, name: &str, code: &[u8]) -> Result<vk::ShaderModule> {
    let words = spirv_words(name, code)?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    unsafe { device.device.create_shader_module(&create_info, None) }
        .with_context(|| format!("Failed to create shader module {}", name))
}

/// Re-align SPIR-V bytes into 4-byte words
pub fn spirv_words(name: &str, code: &[u8]) -> Result<Vec<u32>> {
    if code.is_empty() {
        anyhow::bail!(
            "Shader {} was not compiled: install glslc (Vulkan SDK) and rebuild",
            name
        );
    }

    ash::util::read_spv(&mut std::io::Cursor::new(code))
        .with_context(|| format!("Shader {} is not valid SPIR-V", name))
}

/// SPIR-V for one shader stage, usually from [`shader!`](crate::shader)
#[derive(Clone, Copy)]
pub struct ShaderCode<'a> {
    pub name: &'a str,
    pub spirv: &'a [u8],
}

/// Embed a shader compiled by build.rs, e.g. `shader!("triangle.vert")`
#[macro_export]
macro_rules! shader {
    ($name:literal) => {
        $crate::backend::shader::ShaderCode {
            name: $name,
            spirv: include_bytes!(concat!(env!("OUT_DIR"), "/", $name, ".spv")),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_shader_names_the_missing_compiler() {
        let err = spirv_words("triangle.vert", &[]).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("triangle.vert"));
        assert!(message.contains("glslc"));
    }

    #[test]
    fn truncated_words_are_rejected() {
        assert!(spirv_words("bad", &[0x03, 0x02, 0x23]).is_err());
    }

    #[test]
    fn bytes_become_little_endian_words() {
        // SPIR-V magic number followed by one more word
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        let words = spirv_words("magic", &bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }
}
