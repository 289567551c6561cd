// Framebuffers and command recording
//
// Command buffers hold their pool, and framebuffers hold their render pass,
// so a parent can never be destroyed while a child still refers to it.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;

use super::api::{Queue, SharedDevice};
use super::pipeline::Pipeline;
use super::renderpass::RenderPass;

pub struct Framebuffer {
    handle: vk::Framebuffer,
    extent: vk::Extent2D,
    render_pass: Arc<RenderPass>,
    device: SharedDevice,
}

impl Framebuffer {
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn render_pass(&self) -> &Arc<RenderPass> {
        &self.render_pass
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.device.destroy_framebuffer(self.handle);
    }
}

#[derive(Debug, Clone, Default)]
pub struct FramebufferBuilder {
    attachments: Vec<vk::ImageView>,
}

impl FramebufferBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attachments are bound in the order they are added, matching the
    /// render pass attachment order.
    pub fn add_attachment(mut self, view: vk::ImageView) -> Self {
        self.attachments.push(view);
        self
    }

    pub fn build(&self, extent: vk::Extent2D, render_pass: &Arc<RenderPass>) -> Result<Framebuffer> {
        let device = render_pass.device().clone();

        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass.handle())
            .attachments(&self.attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let handle = device
            .create_framebuffer(&create_info)
            .context("Failed to create framebuffer")?;

        Ok(Framebuffer {
            handle,
            extent,
            render_pass: render_pass.clone(),
            device,
        })
    }
}

pub struct CommandPool {
    handle: vk::CommandPool,
    queue: Queue,
    device: SharedDevice,
}

impl CommandPool {
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    pub fn queue(&self) -> Queue {
        self.queue
    }

    /// Reset every buffer allocated from the pool, keeping their memory.
    pub fn reset(&self) -> Result<()> {
        self.device
            .reset_command_pool(self.handle, vk::CommandPoolResetFlags::empty())
            .context("Failed to reset command pool")
    }

    /// Reset and hand the pool's memory back to the driver.
    pub fn release(&self) -> Result<()> {
        self.device
            .reset_command_pool(self.handle, vk::CommandPoolResetFlags::RELEASE_RESOURCES)
            .context("Failed to release command pool")
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.handle);
    }
}

#[derive(Debug, Clone)]
pub struct CommandPoolBuilder {
    flags: vk::CommandPoolCreateFlags,
}

impl Default for CommandPoolBuilder {
    fn default() -> Self {
        Self {
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        }
    }
}

impl CommandPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flags(mut self, flags: vk::CommandPoolCreateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn build(&self, device: SharedDevice, queue: Queue) -> Result<Arc<CommandPool>> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(self.flags)
            .queue_family_index(queue.family);

        let handle = device
            .create_command_pool(&create_info)
            .context("Failed to create command pool")?;

        Ok(Arc::new(CommandPool {
            handle,
            queue,
            device,
        }))
    }
}

pub struct CommandBuffer {
    handle: vk::CommandBuffer,
    pool: Arc<CommandPool>,
    device: SharedDevice,
}

impl CommandBuffer {
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn begin(&self) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        self.device
            .begin_command_buffer(self.handle, &begin_info)
            .context("Failed to begin command buffer")
    }

    pub fn end(&self) -> Result<()> {
        self.device
            .end_command_buffer(self.handle)
            .context("Failed to end command buffer")
    }

    /// Begin the framebuffer's render pass, covering the whole framebuffer.
    ///
    /// Viewport and scissor are set to the framebuffer extent since pipelines
    /// leave them dynamic.
    pub fn bind_framebuffer(&self, framebuffer: &Framebuffer, clear_values: &[vk::ClearValue]) {
        let extent = framebuffer.extent();

        self.device.cmd_set_viewport(
            self.handle,
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
        let area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        self.device.cmd_set_scissor(self.handle, area);

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(framebuffer.render_pass().handle())
            .framebuffer(framebuffer.handle())
            .render_area(area)
            .clear_values(clear_values);

        self.device
            .cmd_begin_render_pass(self.handle, &begin_info, vk::SubpassContents::INLINE);
    }

    pub fn bind_pipeline(&self, pipeline: &Pipeline) {
        self.device
            .cmd_bind_pipeline(self.handle, pipeline.bind_point(), pipeline.handle());
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.device.cmd_draw(
            self.handle,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        );
    }

    pub fn end_render_pass(&self) {
        self.device.cmd_end_render_pass(self.handle);
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.device
            .free_command_buffers(self.pool.handle(), &[self.handle]);
    }
}

#[derive(Debug, Clone)]
pub struct CommandBufferBuilder {
    level: vk::CommandBufferLevel,
}

impl Default for CommandBufferBuilder {
    fn default() -> Self {
        Self {
            level: vk::CommandBufferLevel::PRIMARY,
        }
    }
}

impl CommandBufferBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_level(mut self, level: vk::CommandBufferLevel) -> Self {
        self.level = level;
        self
    }

    pub fn build(&self, pool: &Arc<CommandPool>, count: u32) -> Result<Vec<CommandBuffer>> {
        let device = pool.device.clone();
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool.handle())
            .level(self.level)
            .command_buffer_count(count);

        let handles = device
            .allocate_command_buffers(&alloc_info)
            .context("Failed to allocate command buffers")?;

        Ok(handles
            .into_iter()
            .map(|handle| CommandBuffer {
                handle,
                pool: pool.clone(),
                device: device.clone(),
            })
            .collect())
    }
}
