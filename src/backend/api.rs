// Device dispatch seam
//
// Every object below the device (swapchain, render pass, pipeline, framebuffer,
// command pool/buffer) talks to the GPU through this trait and keeps an
// `Arc<dyn DeviceApi>` so the device outlives all of its children.
// `VulkanDevice` is the real implementation; tests use `MockDevice`.

use ash::prelude::VkResult;
use ash::vk;
use std::sync::Arc;

/// Shared ownership handle held by every child object.
pub type SharedDevice = Arc<dyn DeviceApi>;

/// A device queue together with the family it was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Queue {
    pub handle: vk::Queue,
    pub family: u32,
}

/// Device-level operations used by the builders and the swapchain.
///
/// All waits are unbounded (`u64::MAX`). Methods mirror the `ash::Device`
/// and `khr::Swapchain` calls they wrap; create-infos are passed through
/// untouched.
pub trait DeviceApi: Send + Sync {
    fn wait_idle(&self) -> VkResult<()>;

    // Surface queries for the surface this device presents to
    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR>;
    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>>;
    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>>;
    fn surface(&self) -> vk::SurfaceKHR;

    // Swapchain
    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>>;
    /// Returns `(image_index, suboptimal)`.
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)>;
    /// Returns `true` when the swapchain is suboptimal.
    fn queue_present(
        &self,
        queue: Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool>;

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    // Synchronization
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn queue_submit(&self, queue: Queue, submit: &vk::SubmitInfo, fence: vk::Fence) -> VkResult<()>;

    // Render pass and pipeline
    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);
    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    // Commands
    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool>;
    fn reset_command_pool(
        &self,
        pool: vk::CommandPool,
        flags: vk::CommandPoolResetFlags,
    ) -> VkResult<()>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo,
    ) -> VkResult<Vec<vk::CommandBuffer>>;
    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]);
    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo,
    ) -> VkResult<()>;
    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()>;
    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, scissor: vk::Rect2D);
    fn cmd_begin_render_pass(
        &self,
        buffer: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo,
        contents: vk::SubpassContents,
    );
    fn cmd_bind_pipeline(
        &self,
        buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
    fn cmd_draw(
        &self,
        buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer);
}
