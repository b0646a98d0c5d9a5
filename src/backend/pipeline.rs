// Graphics pipeline creation and management
//
// The graphics pipeline defines how vertices are processed and rasterized.
// Viewport and scissor are dynamic state, so a resized swapchain only needs
// new framebuffers, never a new pipeline.

use anyhow::{Context, Result};
use ash::vk;

use super::shader::{create_shader_module, ShaderCode};
use super::{Swapchain, VulkanDevice};

// =============================================================================
// RENDER PASS + FRAMEBUFFERS
// =============================================================================

/// Single-subpass render pass drawing straight into the swapchain images,
/// with one framebuffer per image
pub struct ColorPass {
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub format: vk::Format,
}

impl ColorPass {
    pub fn new(device: &VulkanDevice, swapchain: &Swapchain) -> Result<Self> {
        let render_pass = create_render_pass(device, swapchain.format)?;
        let framebuffers = match create_framebuffers(device, swapchain, render_pass) {
            Ok(framebuffers) => framebuffers,
            Err(e) => {
                unsafe { device.device.destroy_render_pass(render_pass, None) };
                return Err(e);
            }
        };

        Ok(Self {
            render_pass,
            framebuffers,
            format: swapchain.format,
        })
    }

    /// Rebuild for a new swapchain. Returns true when the image format
    /// changed, in which case pipelines built against the old render pass
    /// must be rebuilt too.
    pub fn resize(&mut self, device: &VulkanDevice, swapchain: &Swapchain) -> Result<bool> {
        self.destroy_framebuffers(device);

        let format_changed = swapchain.format != self.format;
        if format_changed {
            log::info!("Swapchain format changed to {:?}, rebuilding render pass", swapchain.format);
            unsafe { device.device.destroy_render_pass(self.render_pass, None) };
            self.render_pass = vk::RenderPass::null();
            self.render_pass = create_render_pass(device, swapchain.format)?;
            self.format = swapchain.format;
        }

        self.framebuffers = create_framebuffers(device, swapchain, self.render_pass)?;
        Ok(format_changed)
    }

    /// Begin the pass on `image_index`, clearing to `clear_color`
    pub fn begin(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        image_index: u32,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[image_index as usize])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe { device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE) };
    }

    fn destroy_framebuffers(&mut self, device: &VulkanDevice) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe { device.device.destroy_framebuffer(framebuffer, None) };
        }
    }

    pub fn destroy(&mut self, device: &VulkanDevice) {
        self.destroy_framebuffers(device);
        if self.render_pass != vk::RenderPass::null() {
            unsafe { device.device.destroy_render_pass(self.render_pass, None) };
            self.render_pass = vk::RenderPass::null();
        }
    }
}

/// Create a render pass for basic color attachment rendering
pub fn create_render_pass(device: &VulkanDevice, format: vk::Format) -> Result<vk::RenderPass> {
    // Color attachment (the swapchain image)
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    // The layout transition must wait for the acquire semaphore, which the
    // submit waits on at COLOR_ATTACHMENT_OUTPUT
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe { device.device.create_render_pass(&render_pass_info, None) }
        .context("Failed to create render pass")
}

/// Create framebuffers for each swapchain image
pub fn create_framebuffers(
    device: &VulkanDevice,
    swapchain: &Swapchain,
    render_pass: vk::RenderPass,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(swapchain.image_views.len());

    for &image_view in &swapchain.image_views {
        let attachments = &[image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(swapchain.extent.width)
            .height(swapchain.extent.height)
            .layers(1);

        match unsafe { device.device.create_framebuffer(&framebuffer_info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                for framebuffer in framebuffers {
                    unsafe { device.device.destroy_framebuffer(framebuffer, None) };
                }
                return Err(e).context("Failed to create framebuffer");
            }
        }
    }

    Ok(framebuffers)
}

// =============================================================================
// VERTEX INPUT
// =============================================================================

/// Vertex input description: binding + attribute descriptions
#[derive(Debug, Clone, Default)]
pub struct VertexLayout {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexLayout {
    /// No vertex buffers; the shader generates its own vertices
    pub fn none() -> Self {
        Self::default()
    }

    /// One interleaved buffer at binding 0; attribute locations follow
    /// the order of `attributes` (format, byte offset)
    pub fn interleaved(stride: usize, attributes: &[(vk::Format, usize)]) -> Self {
        let binding = vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(stride as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build();

        let attributes = attributes
            .iter()
            .enumerate()
            .map(|(location, &(format, offset))| {
                vk::VertexInputAttributeDescription::builder()
                    .binding(0)
                    .location(location as u32)
                    .format(format)
                    .offset(offset as u32)
                    .build()
            })
            .collect();

        Self {
            bindings: vec![binding],
            attributes,
        }
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

pub struct PipelineDesc<'a> {
    pub vert_shader: ShaderCode<'a>,
    pub frag_shader: ShaderCode<'a>,
    pub vertex_layout: &'a VertexLayout,
    pub set_layouts: &'a [vk::DescriptorSetLayout],
}

pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    pub fn destroy(&self, device: &VulkanDevice) {
        unsafe {
            device.device.destroy_pipeline(self.pipeline, None);
            device.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Create a basic graphics pipeline: triangle list, no culling, no depth, opaque
pub fn create_graphics_pipeline(
    device: &VulkanDevice,
    render_pass: vk::RenderPass,
    desc: &PipelineDesc<'_>,
) -> Result<GraphicsPipeline> {
    // Modules are only needed while the pipeline is built
    let vert_module = create_shader_module(device, desc.vert_shader.name, desc.vert_shader.spirv)?;
    let frag_module = match create_shader_module(device, desc.frag_shader.name, desc.frag_shader.spirv) {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.device.destroy_shader_module(vert_module, None) };
            return Err(e);
        }
    };

    let result = build_pipeline(device, render_pass, desc, vert_module, frag_module);

    unsafe {
        device.device.destroy_shader_module(vert_module, None);
        device.device.destroy_shader_module(frag_module, None);
    }
    result
}

fn build_pipeline(
    device: &VulkanDevice,
    render_pass: vk::RenderPass,
    desc: &PipelineDesc<'_>,
    vert_module: vk::ShaderModule,
    frag_module: vk::ShaderModule,
) -> Result<GraphicsPipeline> {
    // Shader stages
    let entry_point = c"main";

    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_module)
        .name(entry_point)
        .build();

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_module)
        .name(entry_point)
        .build();

    let shader_stages = &[vert_stage, frag_stage];

    // Vertex input
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&desc.vertex_layout.bindings)
        .vertex_attribute_descriptions(&desc.vertex_layout.attributes);

    // Input assembly
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport and scissor are set while recording
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

    // Rasterization
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false);

    // Multisampling (disabled)
    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    // Color blending (no blending, opaque)
    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build();

    let color_blend_attachments = &[color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(color_blend_attachments);

    // Pipeline layout
    let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(desc.set_layouts);

    let pipeline_layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
        .context("Failed to create pipeline layout")?;

    // Create pipeline
    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(pipeline_layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    };

    match pipelines {
        Ok(pipelines) => Ok(GraphicsPipeline {
            pipeline: pipelines[0],
            layout: pipeline_layout,
        }),
        Err((_, e)) => {
            unsafe { device.device.destroy_pipeline_layout(pipeline_layout, None) };
            Err(e).context("Failed to create graphics pipeline")
        }
    }
}

/// Cover the whole extent with the viewport and scissor
pub fn set_viewport_and_scissor(device: &ash::Device, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };

    unsafe {
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[scissor]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_vertex_input() {
        let layout = VertexLayout::none();
        assert!(layout.bindings.is_empty());
        assert!(layout.attributes.is_empty());
    }

    #[test]
    fn interleaved_assigns_locations_in_order() {
        let layout = VertexLayout::interleaved(
            20,
            &[
                (vk::Format::R32G32_SFLOAT, 0),
                (vk::Format::R32G32B32_SFLOAT, 8),
            ],
        );

        assert_eq!(layout.bindings.len(), 1);
        assert_eq!(layout.bindings[0].stride, 20);
        assert_eq!(layout.bindings[0].input_rate, vk::VertexInputRate::VERTEX);

        let described: Vec<_> = layout
            .attributes
            .iter()
            .map(|a| (a.location, a.binding, a.format, a.offset))
            .collect();
        assert_eq!(
            described,
            vec![
                (0, 0, vk::Format::R32G32_SFLOAT, 0),
                (1, 0, vk::Format::R32G32B32_SFLOAT, 8),
            ]
        );
    }
}
