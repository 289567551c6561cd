// =============================================================================
// RENDER - Frame orchestration
// =============================================================================
//
// Owns every GPU object needed to put a triangle on screen and drives the
// per-frame acquire -> submit -> present sequence.
//
// Command buffers are recorded once per framebuffer and replayed every frame;
// they are only re-recorded when the swapchain is rebuilt.
//
// FIELD ORDER IS TEARDOWN ORDER: command buffers, pool, framebuffers,
// pipeline, render pass, swapchain, and the device last.

use anyhow::{Context, Result};
use ash::vk;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{
    Attachment, CommandBuffer, CommandBufferBuilder, CommandPool, CommandPoolBuilder,
    DeviceBuilder, Framebuffer, FramebufferBuilder, GraphicsPipelineBuilder, InstanceBuilder,
    Pipeline, Queue, QueueType, RenderPass, RenderPassBuilder, SharedDevice, SubpassDescription,
    SurfaceBuilder, Swapchain, SwapchainBuilder,
};
use crate::config::{Config, Validation};
use crate::platform::Window;

/// Everything `Render` needs once a device exists
pub struct RenderSettings {
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
    pub clear_color: vk::ClearValue,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl RenderSettings {
    pub fn from_config(config: &Config, extent: vk::Extent2D) -> Self {
        Self {
            extent,
            present_mode: config.get_present_mode(),
            image_count: config.graphics.image_count,
            clear_color: config.get_clear_color(),
            vertex_shader: PathBuf::from(&config.graphics.vertex_shader),
            fragment_shader: PathBuf::from(&config.graphics.fragment_shader),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Running,
    ShuttingDown,
}

pub struct Render {
    command_buffers: Vec<CommandBuffer>,
    command_pool: Arc<CommandPool>,
    framebuffers: Vec<Framebuffer>,
    pipeline: Pipeline,
    render_pass: Arc<RenderPass>,
    swapchain: Swapchain,
    device: SharedDevice,

    queue: Queue,
    clear_color: vk::ClearValue,
    state: RenderState,
    minimized: bool,
    /// Set when present reports the swapchain no longer matches the surface
    needs_recreate: bool,
    frames_presented: u64,
}

impl Render {
    /// Bring up Vulkan for `window`: instance, surface, device, then the rest.
    pub fn new(window: &Window, config: &Config) -> Result<Self> {
        let extensions = window.instance_extensions()?;

        let builder = InstanceBuilder::new()
            .set_application_name(&config.window.title)
            .set_enabled_extensions(&extensions);
        let builder = match config.get_validation() {
            Validation::None => builder,
            Validation::Standard => builder.set_standard_validation(),
            Validation::Extended => builder.set_extended_validation(),
        };
        let instance = builder.build()?;
        log::info!(
            "Validation {}",
            if instance.validation_enabled() { "enabled" } else { "disabled" }
        );

        let surface = SurfaceBuilder::build(&instance, window)?;
        let (device, queues) = DeviceBuilder::new().build(&instance, &surface, &[QueueType::General])?;
        let queue = queues.first().copied().context("No general queue")?;

        let (width, height) = window.inner_size()?;
        let settings = RenderSettings::from_config(config, vk::Extent2D { width, height });

        Self::with_device(device, queue, settings)
    }

    /// Build everything below the device.
    pub fn with_device(device: SharedDevice, queue: Queue, settings: RenderSettings) -> Result<Self> {
        let swapchain = SwapchainBuilder::new()
            .set_present_mode(settings.present_mode)
            .set_requested_images(settings.image_count)
            .build(device.clone(), queue, settings.extent)?;

        let render_pass = RenderPassBuilder::new()
            .add_attachment(
                "out_image",
                Attachment {
                    load: vk::AttachmentLoadOp::CLEAR,
                    store: vk::AttachmentStoreOp::STORE,
                    format: swapchain.format().format,
                    samples: vk::SampleCountFlags::TYPE_1,
                },
            )
            .add_subpass(SubpassDescription::new().add_colors(&["out_image"]))
            .build(device.clone())?;

        let pipeline = GraphicsPipelineBuilder::new()
            .add_shader_from_file(&settings.vertex_shader, vk::ShaderStageFlags::VERTEX)
            .add_shader_from_file(&settings.fragment_shader, vk::ShaderStageFlags::FRAGMENT)
            .build(&render_pass, 1)?;

        let command_pool = CommandPoolBuilder::new().build(device.clone(), queue)?;

        let mut render = Self {
            command_buffers: Vec::new(),
            command_pool,
            framebuffers: Vec::new(),
            pipeline,
            render_pass,
            swapchain,
            device,
            queue,
            clear_color: settings.clear_color,
            state: RenderState::Running,
            minimized: false,
            needs_recreate: false,
            frames_presented: 0,
        };
        render.rebuild_targets()?;

        log::info!(
            "Renderer ready: {} pre-recorded command buffers",
            render.command_buffers.len()
        );

        Ok(render)
    }

    /// Render one frame. Returns `Ok(true)` if an image was presented.
    ///
    /// A stale swapchain is rebuilt here and the frame skipped, never
    /// reported as an error.
    pub fn draw_frame(&mut self) -> Result<bool> {
        self.ensure_running()?;

        if self.minimized {
            return Ok(false);
        }

        if self.needs_recreate {
            self.recreate(self.swapchain.extent())?;
        }

        let frame = match self.swapchain.acquire_next_image() {
            Ok(frame) => frame,
            Err(e) if e.is_out_of_date() => {
                log::debug!("Swapchain out of date on acquire, recreating");
                self.recreate(self.swapchain.extent())?;
                return Ok(false);
            }
            Err(e) => return Err(e).context("Failed to acquire swapchain image"),
        };

        let command_buffer = self
            .command_buffers
            .get(frame.image_index as usize)
            .context("No command buffer for acquired image")?
            .handle();

        let wait_semaphores = [frame.acquire_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [frame.present_semaphore];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.device
            .queue_submit(self.queue, &submit_info, frame.submit_fence)
            .context("Failed to submit draw commands")?;

        match self.swapchain.present() {
            Ok(suboptimal) => {
                self.needs_recreate |= suboptimal;
            }
            Err(e) if e.is_out_of_date() => {
                log::debug!("Swapchain out of date on present");
                self.needs_recreate = true;
                return Ok(false);
            }
            Err(e) => return Err(e).context("Failed to present"),
        }

        self.frames_presented += 1;
        Ok(true)
    }

    /// React to a new window size.
    ///
    /// A zero-sized window (minimized) pauses drawing until the next
    /// non-zero resize.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.ensure_running()?;

        if width == 0 || height == 0 {
            log::debug!("Window minimized, pausing rendering");
            self.minimized = true;
            return Ok(());
        }

        self.minimized = false;
        self.recreate(vk::Extent2D { width, height })
    }

    /// Stop accepting frames and wait for the GPU to drain.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == RenderState::ShuttingDown {
            return Ok(());
        }
        self.state = RenderState::ShuttingDown;
        log::info!("Renderer shutting down after {} frames", self.frames_presented);
        self.device.wait_idle().context("Failed to wait for device idle")
    }

    /// True while the window has no drawable area.
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn framebuffer_extents(&self) -> Vec<vk::Extent2D> {
        self.framebuffers.iter().map(Framebuffer::extent).collect()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state != RenderState::Running {
            anyhow::bail!("Renderer is shutting down");
        }
        Ok(())
    }

    /// Stop the world and rebuild everything that depends on the swapchain.
    fn recreate(&mut self, extent: vk::Extent2D) -> Result<()> {
        self.device.wait_idle().context("Failed to wait for device idle")?;
        self.swapchain.recreate(extent)?;
        self.rebuild_targets()?;
        self.needs_recreate = false;

        let extent = self.swapchain.extent();
        log::debug!("Resized to {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Framebuffers for the current image views, one command buffer each,
    /// all freshly recorded.
    fn rebuild_targets(&mut self) -> Result<()> {
        let extent = self.swapchain.extent();

        self.framebuffers.clear();
        for view in self.swapchain.image_views() {
            let framebuffer = FramebufferBuilder::new()
                .add_attachment(view)
                .build(extent, &self.render_pass)?;
            self.framebuffers.push(framebuffer);
        }

        if self.command_buffers.len() != self.framebuffers.len() {
            self.command_buffers.clear();
            self.command_buffers = CommandBufferBuilder::new()
                .build(&self.command_pool, self.framebuffers.len() as u32)?;
        }

        self.record_command_buffers()
    }

    fn record_command_buffers(&self) -> Result<()> {
        let clear_values = [self.clear_color];

        for (command_buffer, framebuffer) in self.command_buffers.iter().zip(&self.framebuffers) {
            command_buffer.begin()?;
            command_buffer.bind_framebuffer(framebuffer, &clear_values);
            command_buffer.bind_pipeline(&self.pipeline);
            command_buffer.draw(3, 1, 0, 0);
            command_buffer.end_render_pass();
            command_buffer.end()?;
        }
        Ok(())
    }
}

impl Drop for Render {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Shutdown failed: {:#}", e);
        }
        log::info!("Releasing renderer resources");
    }
}
