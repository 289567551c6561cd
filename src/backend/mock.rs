/// Mock device for unit tests (no GPU required)
///
/// Hands out fresh handles for every object, keeps track of which ones are
/// alive, models fence signal state and records what the code under test
/// asked the GPU to do.
use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::api::{DeviceApi, Queue};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordedCommand {
    Begin,
    SetViewport { width: f32, height: f32 },
    SetScissor(vk::Extent2D),
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
    BindPipeline(vk::Pipeline),
    Draw { vertex_count: u32, instance_count: u32 },
    EndRenderPass,
    End,
}

struct MockSwapchain {
    images: Vec<vk::Image>,
    next: usize,
    stale: bool,
}

struct MockState {
    next_handle: u64,
    capabilities: vk::SurfaceCapabilitiesKHR,
    formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
    image_count_override: Option<u32>,
    image_order: Option<Vec<u32>>,
    swapchains: HashMap<u64, MockSwapchain>,
    last_old_swapchain: u64,
    acquire_suboptimal: bool,
    present_failure: Option<vk::Result>,
    live: HashMap<u64, &'static str>,
    created: Vec<&'static str>,
    destroyed: Vec<&'static str>,
    fences: HashMap<u64, bool>,
    fence_stalls: Vec<vk::Fence>,
    submissions: Vec<vk::Fence>,
    presents: Vec<(u32, vk::Semaphore)>,
    render_pass_subpasses: HashMap<u64, u32>,
    pipeline_subpasses: Vec<u32>,
    framebuffer_extents: HashMap<u64, vk::Extent2D>,
    commands: HashMap<u64, Vec<RecordedCommand>>,
    idle_waits: usize,
}

impl MockState {
    fn create<H: Handle>(&mut self, kind: &'static str) -> H {
        self.next_handle += 1;
        self.live.insert(self.next_handle, kind);
        self.created.push(kind);
        H::from_raw(self.next_handle)
    }

    fn destroy<H: Handle>(&mut self, handle: H) {
        let raw = handle.as_raw();
        if raw == 0 {
            return;
        }
        let kind = self
            .live
            .remove(&raw)
            .unwrap_or_else(|| panic!("destroying unknown or already destroyed handle {raw}"));
        self.destroyed.push(kind);
    }
}

pub struct MockDevice {
    state: Mutex<MockState>,
}

impl MockDevice {
    pub fn new() -> Self {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D { width: 800, height: 600 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            max_image_array_layers: 1,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        };

        Self {
            state: Mutex::new(MockState {
                next_handle: 0,
                capabilities,
                formats: vec![
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_SRGB,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                    vk::SurfaceFormatKHR {
                        format: vk::Format::B8G8R8A8_UNORM,
                        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                    },
                ],
                present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
                image_count_override: None,
                image_order: None,
                swapchains: HashMap::new(),
                last_old_swapchain: 0,
                acquire_suboptimal: false,
                present_failure: None,
                live: HashMap::new(),
                created: Vec::new(),
                destroyed: Vec::new(),
                fences: HashMap::new(),
                fence_stalls: Vec::new(),
                submissions: Vec::new(),
                presents: Vec::new(),
                render_pass_subpasses: HashMap::new(),
                pipeline_subpasses: Vec::new(),
                framebuffer_extents: HashMap::new(),
                commands: HashMap::new(),
                idle_waits: 0,
            }),
        }
    }

    pub fn queue(&self) -> Queue {
        Queue {
            handle: vk::Queue::from_raw(0xC0DE),
            family: 0,
        }
    }

    // ─── configuration ───────────────────────────────────────────────────

    pub fn update_capabilities(&self, f: impl FnOnce(&mut vk::SurfaceCapabilitiesKHR)) {
        f(&mut self.state.lock().capabilities);
    }

    pub fn set_present_modes(&self, modes: Vec<vk::PresentModeKHR>) {
        self.state.lock().present_modes = modes;
    }

    /// Make the driver return this many images regardless of what was asked.
    pub fn set_image_count_override(&self, count: Option<u32>) {
        self.state.lock().image_count_override = count;
    }

    /// Order in which acquire hands out images, cycling.
    pub fn set_image_order(&self, order: Vec<u32>) {
        let mut state = self.state.lock();
        for swapchain in state.swapchains.values_mut() {
            swapchain.next = 0;
        }
        state.image_order = Some(order);
    }

    /// Every existing swapchain reports out-of-date from now on.
    pub fn mark_swapchains_stale(&self) {
        for swapchain in self.state.lock().swapchains.values_mut() {
            swapchain.stale = true;
        }
    }

    /// Acquire reports the swapchain as suboptimal while set.
    pub fn set_acquire_suboptimal(&self, suboptimal: bool) {
        self.state.lock().acquire_suboptimal = suboptimal;
    }

    /// The next present fails with `result`; later ones behave normally.
    pub fn fail_next_present(&self, result: vk::Result) {
        self.state.lock().present_failure = Some(result);
    }

    /// Signal every fence with outstanding work, as if the GPU caught up.
    pub fn complete_gpu_work(&self) {
        let mut state = self.state.lock();
        let pending: Vec<u64> = state.submissions.drain(..).map(|f| f.as_raw()).collect();
        for fence in pending {
            if let Some(signaled) = state.fences.get_mut(&fence) {
                *signaled = true;
            }
        }
    }

    // ─── inspection ──────────────────────────────────────────────────────

    pub fn is_alive<H: Handle>(&self, handle: H) -> bool {
        self.state.lock().live.contains_key(&handle.as_raw())
    }

    pub fn live_count(&self, kind: &str) -> usize {
        self.state.lock().live.values().filter(|&&k| k == kind).count()
    }

    pub fn create_count(&self, kind: &str) -> usize {
        self.state.lock().created.iter().filter(|&&k| k == kind).count()
    }

    /// Object kinds in the order they were destroyed
    pub fn destroyed(&self) -> Vec<&'static str> {
        self.state.lock().destroyed.clone()
    }

    /// Fences that were waited on while still unsignaled
    pub fn fence_stalls(&self) -> Vec<vk::Fence> {
        self.state.lock().fence_stalls.clone()
    }

    pub fn presents(&self) -> Vec<(u32, vk::Semaphore)> {
        self.state.lock().presents.clone()
    }

    pub fn last_old_swapchain(&self) -> u64 {
        self.state.lock().last_old_swapchain
    }

    pub fn pipeline_subpasses(&self) -> Vec<u32> {
        self.state.lock().pipeline_subpasses.clone()
    }

    pub fn render_pass_subpass_count(&self, render_pass: vk::RenderPass) -> Option<u32> {
        self.state
            .lock()
            .render_pass_subpasses
            .get(&render_pass.as_raw())
            .copied()
    }

    pub fn framebuffer_extent(&self, framebuffer: vk::Framebuffer) -> Option<vk::Extent2D> {
        self.state
            .lock()
            .framebuffer_extents
            .get(&framebuffer.as_raw())
            .copied()
    }

    pub fn commands(&self, buffer: vk::CommandBuffer) -> Vec<RecordedCommand> {
        self.state
            .lock()
            .commands
            .get(&buffer.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn idle_waits(&self) -> usize {
        self.state.lock().idle_waits
    }

    fn record(&self, buffer: vk::CommandBuffer, command: RecordedCommand) {
        self.state
            .lock()
            .commands
            .entry(buffer.as_raw())
            .or_default()
            .push(command);
    }
}

impl DeviceApi for MockDevice {
    fn wait_idle(&self) -> VkResult<()> {
        self.state.lock().idle_waits += 1;
        self.complete_gpu_work();
        Ok(())
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        Ok(self.state.lock().capabilities)
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        Ok(self.state.lock().formats.clone())
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        Ok(self.state.lock().present_modes.clone())
    }

    fn surface(&self) -> vk::SurfaceKHR {
        vk::SurfaceKHR::from_raw(0x5EED)
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.state.lock();
        let count = state.image_count_override.unwrap_or(info.min_image_count);
        let images = (0..count).map(|_| state.create::<vk::Image>("image")).collect();

        let old = info.old_swapchain.as_raw();
        state.last_old_swapchain = old;
        if let Some(old) = state.swapchains.get_mut(&old) {
            // Retired: can no longer acquire from it
            old.stale = true;
        }

        let handle: vk::SwapchainKHR = state.create("swapchain");
        state.swapchains.insert(
            handle.as_raw(),
            MockSwapchain {
                images,
                next: 0,
                stale: false,
            },
        );
        Ok(handle)
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state.lock();
        if let Some(removed) = state.swapchains.remove(&swapchain.as_raw()) {
            for image in removed.images {
                state.destroy(image);
            }
        }
        state.destroy(swapchain);
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        self.state
            .lock()
            .swapchains
            .get(&swapchain.as_raw())
            .map(|s| s.images.clone())
            .ok_or(vk::Result::ERROR_SURFACE_LOST_KHR)
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        assert!(state.live.contains_key(&semaphore.as_raw()), "acquire with dead semaphore");

        let chain = state
            .swapchains
            .get_mut(&swapchain.as_raw())
            .ok_or(vk::Result::ERROR_OUT_OF_DATE_KHR)?;
        if chain.stale {
            return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        }

        let count = chain.images.len();
        let index = match &state.image_order {
            Some(order) => order[chain.next % order.len()],
            None => (chain.next % count) as u32,
        };
        chain.next += 1;
        Ok((index, state.acquire_suboptimal))
    }

    fn queue_present(
        &self,
        _queue: Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut state = self.state.lock();
        let stale = state
            .swapchains
            .get(&swapchain.as_raw())
            .map_or(true, |s| s.stale);
        if stale {
            return Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        }
        if let Some(failure) = state.present_failure.take() {
            return Err(failure);
        }
        state.presents.push((image_index, wait_semaphore));
        Ok(false)
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        let mut state = self.state.lock();
        assert!(state.live.contains_key(&info.image.as_raw()), "view of dead image");
        Ok(state.create("image_view"))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.lock().destroy(view);
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        Ok(self.state.lock().create("semaphore"))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state.lock().destroy(semaphore);
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut state = self.state.lock();
        let fence: vk::Fence = state.create("fence");
        state.fences.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.lock();
        state.fences.remove(&fence.as_raw());
        state.destroy(fence);
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        let signaled = state
            .fences
            .get_mut(&fence.as_raw())
            .ok_or(vk::Result::ERROR_DEVICE_LOST)?;
        if !*signaled {
            // A real wait would block here until the GPU signals the fence
            *signaled = true;
            state.fence_stalls.push(fence);
        }
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut state = self.state.lock();
        let signaled = state
            .fences
            .get_mut(&fence.as_raw())
            .ok_or(vk::Result::ERROR_DEVICE_LOST)?;
        *signaled = false;
        Ok(())
    }

    fn queue_submit(&self, _queue: Queue, submit: &vk::SubmitInfo, fence: vk::Fence) -> VkResult<()> {
        assert_eq!(submit.wait_semaphore_count, 1);
        assert_eq!(submit.signal_semaphore_count, 1);
        assert_eq!(submit.command_buffer_count, 1);
        let mut state = self.state.lock();
        assert_eq!(state.fences.get(&fence.as_raw()), Some(&false), "submit with signaled fence");
        state.submissions.push(fence);
        Ok(())
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        let mut state = self.state.lock();
        let render_pass: vk::RenderPass = state.create("render_pass");
        state
            .render_pass_subpasses
            .insert(render_pass.as_raw(), info.subpass_count);
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state.lock().destroy(render_pass);
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        if code.is_empty() {
            return Err(vk::Result::ERROR_INVALID_SHADER_NV);
        }
        Ok(self.state.lock().create("shader_module"))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state.lock().destroy(module);
    }

    fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        Ok(self.state.lock().create("pipeline_layout"))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state.lock().destroy(layout);
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        let mut state = self.state.lock();
        assert!(state.live.contains_key(&info.render_pass.as_raw()), "dead render pass");
        assert!(state.live.contains_key(&info.layout.as_raw()), "dead pipeline layout");
        state.pipeline_subpasses.push(info.subpass);
        Ok(state.create("pipeline"))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state.lock().destroy(pipeline);
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        let mut state = self.state.lock();
        assert!(state.live.contains_key(&info.render_pass.as_raw()), "dead render pass");
        let framebuffer: vk::Framebuffer = state.create("framebuffer");
        state.framebuffer_extents.insert(
            framebuffer.as_raw(),
            vk::Extent2D {
                width: info.width,
                height: info.height,
            },
        );
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut state = self.state.lock();
        state.framebuffer_extents.remove(&framebuffer.as_raw());
        state.destroy(framebuffer);
    }

    fn create_command_pool(&self, _info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool> {
        Ok(self.state.lock().create("command_pool"))
    }

    fn reset_command_pool(
        &self,
        pool: vk::CommandPool,
        _flags: vk::CommandPoolResetFlags,
    ) -> VkResult<()> {
        let state = self.state.lock();
        assert!(state.live.contains_key(&pool.as_raw()), "reset of dead pool");
        Ok(())
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.state.lock().destroy(pool);
    }

    fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.state.lock();
        assert!(state.live.contains_key(&info.command_pool.as_raw()), "dead pool");
        Ok((0..info.command_buffer_count)
            .map(|_| state.create("command_buffer"))
            .collect())
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        let mut state = self.state.lock();
        assert!(state.live.contains_key(&pool.as_raw()), "free into dead pool");
        for &buffer in buffers {
            state.commands.remove(&buffer.as_raw());
            state.destroy(buffer);
        }
    }

    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
        _info: &vk::CommandBufferBeginInfo,
    ) -> VkResult<()> {
        // Beginning implicitly resets the buffer
        self.state
            .lock()
            .commands
            .insert(buffer.as_raw(), vec![RecordedCommand::Begin]);
        Ok(())
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        self.record(buffer, RecordedCommand::End);
        Ok(())
    }

    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        self.record(
            buffer,
            RecordedCommand::SetViewport {
                width: viewport.width,
                height: viewport.height,
            },
        );
    }

    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(buffer, RecordedCommand::SetScissor(scissor.extent));
    }

    fn cmd_begin_render_pass(
        &self,
        buffer: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo,
        _contents: vk::SubpassContents,
    ) {
        self.record(
            buffer,
            RecordedCommand::BeginRenderPass {
                render_pass: info.render_pass,
                framebuffer: info.framebuffer,
                extent: info.render_area.extent,
            },
        );
    }

    fn cmd_bind_pipeline(
        &self,
        buffer: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        self.record(buffer, RecordedCommand::BindPipeline(pipeline));
    }

    fn cmd_draw(
        &self,
        buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.record(
            buffer,
            RecordedCommand::Draw {
                vertex_count,
                instance_count,
            },
        );
    }

    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer) {
        self.record(buffer, RecordedCommand::EndRenderPass);
    }
}
