// Graphics pipeline creation
//
// The fixed-function state is the same for every pipeline: triangle lists,
// back-face culling with clockwise front faces, no depth test, alpha blending
// and a dynamic viewport/scissor so pipelines survive a resize untouched.
// What varies is the vertex layout, the shader stages and push constants.

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::CStr;
use std::path::PathBuf;
use std::sync::Arc;

use super::api::SharedDevice;
use super::renderpass::RenderPass;
use super::shader;

const ENTRY_POINT: &CStr = c"main";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInput {
    Vec2,
    Vec3,
    Vec4,
    Float,
    Int,
}

impl VertexInput {
    pub fn format(self) -> vk::Format {
        match self {
            Self::Vec2 => vk::Format::R32G32_SFLOAT,
            Self::Vec3 => vk::Format::R32G32B32_SFLOAT,
            Self::Vec4 => vk::Format::R32G32B32A32_SFLOAT,
            Self::Float => vk::Format::R32_SFLOAT,
            Self::Int => vk::Format::R32_SINT,
        }
    }

    /// Size in bytes
    pub fn size(self) -> u32 {
        match self {
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Float | Self::Int => 4,
        }
    }
}

#[derive(Debug, Clone)]
enum ShaderSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
struct ShaderStage {
    source: ShaderSource,
    stage: vk::ShaderStageFlags,
}

pub struct Pipeline {
    handle: vk::Pipeline,
    layout: vk::PipelineLayout,
    bind_point: vk::PipelineBindPoint,
    // Keeps the render pass alive as long as the pipeline
    _render_pass: Arc<RenderPass>,
    device: SharedDevice,
}

impl Pipeline {
    pub fn handle(&self) -> vk::Pipeline {
        self.handle
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.handle);
        self.device.destroy_pipeline_layout(self.layout);
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphicsPipelineBuilder {
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
    stages: Vec<ShaderStage>,
    push_constants: Vec<vk::PushConstantRange>,
}

impl GraphicsPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one vertex buffer binding made of tightly packed `inputs`.
    ///
    /// Shader locations continue from the previous binding.
    pub fn add_vertex_input(mut self, inputs: &[VertexInput], rate: vk::VertexInputRate) -> Self {
        let binding = self.bindings.len() as u32;
        let mut offset = 0;

        for &input in inputs {
            self.attributes.push(vk::VertexInputAttributeDescription {
                location: self.attributes.len() as u32,
                binding,
                format: input.format(),
                offset,
            });
            offset += input.size();
        }

        self.bindings.push(vk::VertexInputBindingDescription {
            binding,
            stride: offset,
            input_rate: rate,
        });
        self
    }

    /// The file is read when the pipeline is built.
    pub fn add_shader_from_file(
        mut self,
        path: impl Into<PathBuf>,
        stage: vk::ShaderStageFlags,
    ) -> Self {
        self.stages.push(ShaderStage {
            source: ShaderSource::File(path.into()),
            stage,
        });
        self
    }

    pub fn add_shader_from_bytes(mut self, bytes: &[u8], stage: vk::ShaderStageFlags) -> Self {
        self.stages.push(ShaderStage {
            source: ShaderSource::Bytes(bytes.to_vec()),
            stage,
        });
        self
    }

    pub fn add_push_constant_range(
        mut self,
        stages: vk::ShaderStageFlags,
        offset: u32,
        size: u32,
    ) -> Self {
        self.push_constants.push(vk::PushConstantRange {
            stage_flags: stages,
            offset,
            size,
        });
        self
    }

    /// Build against the render pass's next free subpass.
    pub fn build(&self, render_pass: &Arc<RenderPass>, color_blend_count: u32) -> Result<Pipeline> {
        let device = render_pass.device().clone();

        // Read everything up front so a bad path fails before any GPU object exists
        let codes = self
            .stages
            .iter()
            .map(|s| match &s.source {
                ShaderSource::File(path) => shader::spirv_from_file(path),
                ShaderSource::Bytes(bytes) => shader::spirv_from_bytes(bytes),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut modules = Vec::with_capacity(codes.len());
        for code in &codes {
            match shader::create_shader_module(&*device, code) {
                Ok(module) => modules.push(module),
                Err(e) => {
                    destroy_modules(&device, &modules);
                    return Err(e);
                }
            }
        }

        let result = self.create(&device, render_pass, color_blend_count, &modules);

        // Modules are only needed while the pipeline is created
        destroy_modules(&device, &modules);

        let (handle, layout) = result?;
        let subpass = render_pass.subpass_count();
        render_pass.advance_subpass();

        log::debug!("Graphics pipeline created for subpass {}", subpass);

        Ok(Pipeline {
            handle,
            layout,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            _render_pass: render_pass.clone(),
            device,
        })
    }

    fn create(
        &self,
        device: &SharedDevice,
        render_pass: &RenderPass,
        color_blend_count: u32,
        modules: &[vk::ShaderModule],
    ) -> Result<(vk::Pipeline, vk::PipelineLayout)> {
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = self
            .stages
            .iter()
            .zip(modules)
            .map(|(stage, &module)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage.stage)
                    .module(module)
                    .name(ENTRY_POINT)
                    .build()
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.bindings)
            .vertex_attribute_descriptions(&self.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Actual viewport and scissor are set while recording
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let always = vk::StencilOpState {
            compare_op: vk::CompareOp::ALWAYS,
            ..Default::default()
        };
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(false)
            .depth_write_enable(false)
            .depth_compare_op(vk::CompareOp::GREATER)
            .front(always)
            .back(always);

        let blend = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build();
        let blend_attachments = vec![blend; color_blend_count as usize];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let layout_info =
            vk::PipelineLayoutCreateInfo::builder().push_constant_ranges(&self.push_constants);
        let layout = device
            .create_pipeline_layout(&layout_info)
            .context("Failed to create pipeline layout")?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass.handle())
            .subpass(render_pass.subpass_count());

        match device.create_graphics_pipeline(&pipeline_info) {
            Ok(pipeline) => Ok((pipeline, layout)),
            Err(e) => {
                device.destroy_pipeline_layout(layout);
                Err(e).context("Failed to create graphics pipeline")
            }
        }
    }
}

fn destroy_modules(device: &SharedDevice, modules: &[vk::ShaderModule]) {
    for &module in modules {
        device.destroy_shader_module(module);
    }
}
