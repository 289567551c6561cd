// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (requested features, prefer discrete GPU)
// - Queue family selection per requested queue type
// - Logical device + queue creation
// - The real `DeviceApi` implementation

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

use super::api::{DeviceApi, Queue};
use super::instance::{Instance, Surface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueType {
    /// Graphics + present
    General,
    /// Dedicated compute family
    Compute,
    /// Dedicated transfer family
    Transfer,
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Vulkan handles (order matters for drop!)
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    swapchain_loader: khr::Swapchain,
    surface: Arc<Surface>,
    _instance: Arc<Instance>,
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_device(None);
        }
    }
}

#[derive(Default)]
pub struct DeviceBuilder {
    features: vk::PhysicalDeviceFeatures,
}

impl DeviceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled_features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        self.features = features;
        self
    }

    /// Create the logical device plus one queue per requested type, in order.
    pub fn build(
        &self,
        instance: &Arc<Instance>,
        surface: &Arc<Surface>,
        queues: &[QueueType],
    ) -> Result<(Arc<VulkanDevice>, Vec<Queue>)> {
        let physical_device = self.find_physical_device(instance)?;

        let families = unsafe {
            instance
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        };

        let mut requested_families = Vec::with_capacity(queues.len());
        for &queue in queues {
            let family = find_queue_family(&families, queue, |index| unsafe {
                surface
                    .loader
                    .get_physical_device_surface_support(physical_device, index, surface.handle)
                    .unwrap_or(false)
            })?;
            requested_families.push(family);
        }

        // A family may only appear once in the create infos
        let mut unique_families = requested_families.clone();
        unique_families.sort_unstable();
        unique_families.dedup();

        let queue_priorities = [1.0];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = [khr::Swapchain::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&self.features);

        let device = unsafe {
            instance
                .instance
                .create_device(physical_device, &create_info, None)
        }
        .context("Could not create device")?;

        let properties = unsafe {
            instance
                .instance
                .get_physical_device_properties(physical_device)
        };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let queues = requested_families
            .iter()
            .map(|&family| Queue {
                handle: unsafe { device.get_device_queue(family, 0) },
                family,
            })
            .collect();

        let swapchain_loader = khr::Swapchain::new(&instance.instance, &device);

        let device = Arc::new(VulkanDevice {
            device,
            physical_device,
            properties,
            swapchain_loader,
            surface: surface.clone(),
            _instance: instance.clone(),
        });

        Ok((device, queues))
    }

    fn find_physical_device(&self, instance: &Instance) -> Result<vk::PhysicalDevice> {
        let devices = unsafe { instance.instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut best: Option<(u32, vk::PhysicalDevice)> = None;
        for device in devices {
            let props = unsafe { instance.instance.get_physical_device_properties(device) };
            let features = unsafe { instance.instance.get_physical_device_features(device) };

            if !features_supported(&self.features, &features) {
                continue;
            }

            let rank = device_type_rank(props.device_type);
            if best.map_or(true, |(best_rank, _)| rank < best_rank) {
                best = Some((rank, device));
            }
        }

        best.map(|(_, device)| device)
            .ok_or_else(|| anyhow::anyhow!("Unable to find a suitable device"))
    }
}

/// Lower is better: discrete, integrated, virtual, cpu, other.
fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

fn find_queue_family(
    families: &[vk::QueueFamilyProperties],
    queue: QueueType,
    supports_present: impl Fn(u32) -> bool,
) -> Result<u32> {
    let found = families.iter().enumerate().find_map(|(index, family)| {
        let index = index as u32;
        let matches = match queue {
            QueueType::General => {
                family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && supports_present(index)
            }
            QueueType::Compute => family.queue_flags == vk::QueueFlags::COMPUTE,
            QueueType::Transfer => family.queue_flags == vk::QueueFlags::TRANSFER,
        };
        matches.then_some(index)
    });

    found.with_context(|| match queue {
        QueueType::General => "Unable to find a queue family supporting present and graphics",
        QueueType::Compute => "Unable to find a dedicated compute family",
        QueueType::Transfer => "Unable to find a dedicated transfer family",
    })
}

macro_rules! features_subset {
    ($requested:expr, $available:expr; $($field:ident),* $(,)?) => {
        true $(&& ($requested.$field == vk::FALSE || $available.$field == vk::TRUE))*
    };
}

/// Every feature enabled in `requested` must be present in `available`.
fn features_supported(
    requested: &vk::PhysicalDeviceFeatures,
    available: &vk::PhysicalDeviceFeatures,
) -> bool {
    features_subset!(requested, available;
        robust_buffer_access,
        full_draw_index_uint32,
        image_cube_array,
        independent_blend,
        geometry_shader,
        tessellation_shader,
        sample_rate_shading,
        dual_src_blend,
        logic_op,
        multi_draw_indirect,
        draw_indirect_first_instance,
        depth_clamp,
        depth_bias_clamp,
        fill_mode_non_solid,
        depth_bounds,
        wide_lines,
        large_points,
        alpha_to_one,
        multi_viewport,
        sampler_anisotropy,
        texture_compression_etc2,
        texture_compression_astc_ldr,
        texture_compression_bc,
        occlusion_query_precise,
        pipeline_statistics_query,
        vertex_pipeline_stores_and_atomics,
        fragment_stores_and_atomics,
        shader_tessellation_and_geometry_point_size,
        shader_image_gather_extended,
        shader_storage_image_extended_formats,
        shader_storage_image_multisample,
        shader_storage_image_read_without_format,
        shader_storage_image_write_without_format,
        shader_uniform_buffer_array_dynamic_indexing,
        shader_sampled_image_array_dynamic_indexing,
        shader_storage_buffer_array_dynamic_indexing,
        shader_storage_image_array_dynamic_indexing,
        shader_clip_distance,
        shader_cull_distance,
        shader_float64,
        shader_int64,
        shader_int16,
        shader_resource_residency,
        shader_resource_min_lod,
        sparse_binding,
        sparse_residency_buffer,
        sparse_residency_image2_d,
        sparse_residency_image3_d,
        sparse_residency2_samples,
        sparse_residency4_samples,
        sparse_residency8_samples,
        sparse_residency16_samples,
        sparse_residency_aliased,
        variable_multisample_rate,
        inherited_queries,
    )
}

impl DeviceApi for VulkanDevice {
    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface.handle)
        }
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_formats(self.physical_device, self.surface.handle)
        }
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.surface
                .loader
                .get_physical_device_surface_present_modes(self.physical_device, self.surface.handle)
        }
    }

    fn surface(&self) -> vk::SurfaceKHR {
        self.surface.handle
    }

    fn create_swapchain(&self, info: &vk::SwapchainCreateInfoKHR) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.swapchain_loader.create_swapchain(info, None) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) }
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, u64::MAX, semaphore, vk::Fence::null())
        }
    }

    fn queue_present(
        &self,
        queue: Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> VkResult<bool> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue.handle, &present_info) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo) -> VkResult<vk::ImageView> {
        unsafe { self.device.create_image_view(info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.create_semaphore(&info, None) }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&info, None) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn queue_submit(&self, queue: Queue, submit: &vk::SubmitInfo, fence: vk::Fence) -> VkResult<()> {
        unsafe {
            self.device
                .queue_submit(queue.handle, std::slice::from_ref(submit), fence)
        }
    }

    fn create_render_pass(&self, info: &vk::RenderPassCreateInfo) -> VkResult<vk::RenderPass> {
        unsafe { self.device.create_render_pass(info, None) }
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe { self.device.create_shader_module(&info, None) }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo,
    ) -> VkResult<vk::PipelineLayout> {
        unsafe { self.device.create_pipeline_layout(info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo,
    ) -> VkResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                std::slice::from_ref(info),
                None,
            )
        }
        .map_err(|(_, e)| e)?;

        pipelines
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> VkResult<vk::Framebuffer> {
        unsafe { self.device.create_framebuffer(info, None) }
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_command_pool(&self, info: &vk::CommandPoolCreateInfo) -> VkResult<vk::CommandPool> {
        unsafe { self.device.create_command_pool(info, None) }
    }

    fn reset_command_pool(
        &self,
        pool: vk::CommandPool,
        flags: vk::CommandPoolResetFlags,
    ) -> VkResult<()> {
        unsafe { self.device.reset_command_pool(pool, flags) }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        info: &vk::CommandBufferAllocateInfo,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe { self.device.allocate_command_buffers(info) }
    }

    fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    fn begin_command_buffer(
        &self,
        buffer: vk::CommandBuffer,
        info: &vk::CommandBufferBeginInfo,
    ) -> VkResult<()> {
        unsafe { self.device.begin_command_buffer(buffer, info) }
    }

    fn end_command_buffer(&self, buffer: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(buffer) }
    }

    fn cmd_set_viewport(&self, buffer: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.device.cmd_set_viewport(buffer, 0, &[viewport]) }
    }

    fn cmd_set_scissor(&self, buffer: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.device.cmd_set_scissor(buffer, 0, &[scissor]) }
    }

    fn cmd_begin_render_pass(
        &self,
        buffer: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo,
        contents: vk::SubpassContents,
    ) {
        unsafe { self.device.cmd_begin_render_pass(buffer, info, contents) }
    }

    fn cmd_bind_pipeline(
        &self,
        buffer: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe { self.device.cmd_bind_pipeline(buffer, bind_point, pipeline) }
    }

    fn cmd_draw(
        &self,
        buffer: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device
                .cmd_draw(buffer, vertex_count, instance_count, first_vertex, first_instance)
        }
    }

    fn cmd_end_render_pass(&self, buffer: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(buffer) }
    }
}
