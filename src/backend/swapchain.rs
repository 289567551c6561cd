// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen,
// together with one set of synchronization primitives per image.
//
// FRAME FLOW:
// acquire (semaphore from the rotating slot) -> wait + reset the fence of the
// acquired image -> caller submits -> present (waits on the image's present
// semaphore)

use anyhow::{Context, Result};
use ash::vk;

use super::api::{Queue, SharedDevice};
use super::error::SwapchainError;
use super::sync::FrameSync;

/// Everything a caller needs to submit work for one acquired image.
///
/// Valid until the next acquire reuses the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub image_index: u32,
    pub acquire_semaphore: vk::Semaphore,
    pub present_semaphore: vk::Semaphore,
    pub submit_fence: vk::Fence,
}

/// Image count the swapchain is created with.
///
/// Below the surface minimum we go one above it; a maximum of 0 means the
/// surface has no upper bound.
pub fn clamp_image_count(requested: u32, caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = requested;
    if count < caps.min_image_count {
        count = caps.min_image_count + 1;
    }
    if caps.max_image_count > 0 && count > caps.max_image_count {
        count = caps.max_image_count;
    }
    count
}

/// Clamp each component into `[min_image_extent, max_image_extent]`.
pub fn clamp_extent(requested: vk::Extent2D, caps: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    // max-of-min rather than `u32::clamp`, which panics on inverted bounds
    vk::Extent2D {
        width: caps
            .min_image_extent
            .width
            .max(caps.max_image_extent.width.min(requested.width)),
        height: caps
            .min_image_extent
            .height
            .max(caps.max_image_extent.height.min(requested.height)),
    }
}

#[derive(Debug, Clone)]
pub struct SwapchainBuilder {
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    requested_images: u32,
}

impl Default for SwapchainBuilder {
    fn default() -> Self {
        Self {
            surface_format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            present_mode: vk::PresentModeKHR::FIFO,
            requested_images: 3,
        }
    }
}

impl SwapchainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_format(mut self, surface_format: vk::SurfaceFormatKHR) -> Self {
        self.surface_format = surface_format;
        self
    }

    pub fn set_present_mode(mut self, present_mode: vk::PresentModeKHR) -> Self {
        self.present_mode = present_mode;
        self
    }

    pub fn set_requested_images(mut self, images: u32) -> Self {
        self.requested_images = images;
        self
    }

    /// Validate the configuration against the surface and create the swapchain.
    ///
    /// An unsupported surface format or present mode is a configuration error
    /// and is not retried.
    pub fn build(
        &self,
        device: SharedDevice,
        present_queue: Queue,
        extent: vk::Extent2D,
    ) -> Result<Swapchain> {
        let formats = device.surface_formats()?;
        let format_supported = formats.iter().any(|f| {
            f.format == self.surface_format.format
                && f.color_space == self.surface_format.color_space
        });
        if !format_supported {
            anyhow::bail!(
                "Surface format not supported: {:?} / {:?}",
                self.surface_format.format,
                self.surface_format.color_space
            );
        }

        let present_modes = device.surface_present_modes()?;
        if !present_modes.contains(&self.present_mode) {
            anyhow::bail!("Present mode not supported: {:?}", self.present_mode);
        }

        let mut swapchain = Swapchain {
            handle: vk::SwapchainKHR::null(),
            surface_format: self.surface_format,
            present_mode: self.present_mode,
            requested_images: self.requested_images,
            image_count: 0,
            extent,
            images: Vec::new(),
            image_views: Vec::new(),
            sync: Vec::new(),
            acquire_index: 0,
            acquired_image: None,
            suboptimal: false,
            present_queue,
            device,
        };

        // First creation goes through the same path as a resize
        swapchain.recreate(extent)?;

        Ok(swapchain)
    }
}

pub struct Swapchain {
    handle: vk::SwapchainKHR,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    requested_images: u32,
    /// Minimum image count asked of the driver after clamping
    image_count: u32,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    /// One set per image; always the same length as `image_views`
    sync: Vec<FrameSync>,
    acquire_index: usize,
    acquired_image: Option<u32>,
    suboptimal: bool,
    present_queue: Queue,
    device: SharedDevice,
}

impl Swapchain {
    /// Acquire the next presentable image.
    ///
    /// Blocks until the image is available and until every submission
    /// previously made against that image has retired, so at most one frame
    /// per image is ever in flight.
    pub fn acquire_next_image(&mut self) -> Result<Frame, SwapchainError> {
        let slot = self.acquire_index;
        let acquire_semaphore = self.sync[slot].acquire_semaphore;

        let (image_index, suboptimal) = self
            .device
            .acquire_next_image(self.handle, acquire_semaphore)?;

        self.acquire_index = (slot + 1) % self.sync.len();

        let sync = self
            .sync
            .get(image_index as usize)
            .ok_or(SwapchainError::Vulkan(vk::Result::ERROR_UNKNOWN))?;

        self.device.wait_for_fence(sync.submit_fence)?;
        self.device.reset_fence(sync.submit_fence)?;

        self.acquired_image = Some(image_index);
        self.suboptimal |= suboptimal;

        Ok(Frame {
            image_index,
            acquire_semaphore,
            present_semaphore: sync.present_semaphore,
            submit_fence: sync.submit_fence,
        })
    }

    /// Present the most recently acquired image.
    ///
    /// The frame's work must already be submitted with its present semaphore
    /// as the signal. Returns `true` when the swapchain no longer matches the
    /// surface exactly and should be recreated.
    pub fn present(&mut self) -> Result<bool, SwapchainError> {
        let image_index = self
            .acquired_image
            .take()
            .ok_or(SwapchainError::NoImageAcquired)?;
        let wait_semaphore = self.sync[image_index as usize].present_semaphore;

        let suboptimal = self.device.queue_present(
            self.present_queue,
            self.handle,
            image_index,
            wait_semaphore,
        )?;

        let acquired_suboptimal = std::mem::take(&mut self.suboptimal);
        Ok(suboptimal || acquired_suboptimal)
    }

    /// Rebuild the swapchain for a new extent, chaining from the current one.
    ///
    /// The device must be idle. Image views are always rebuilt; the sync sets
    /// are rebuilt only when the number of images changes.
    pub fn recreate(&mut self, extent: vk::Extent2D) -> Result<()> {
        let caps = self.device.surface_capabilities()?;

        self.image_count = clamp_image_count(self.requested_images, &caps);
        self.extent = clamp_extent(extent, &caps);

        let old_swapchain = self.handle;
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(self.device.surface())
            .min_image_count(self.image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        self.handle = self
            .device
            .create_swapchain(&create_info)
            .context("Failed to create swapchain")?;

        // Views of the old images go before the swapchain that owns them
        self.destroy_image_views();
        if old_swapchain != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(old_swapchain);
        }

        self.images = self.device.swapchain_images(self.handle)?;
        if self.images.is_empty() {
            anyhow::bail!("Swapchain returned no images");
        }
        self.image_views = self.create_image_views()?;

        if self.sync.len() != self.image_views.len() {
            log::debug!(
                "Rebuilding sync primitives: {} -> {} images",
                self.sync.len(),
                self.image_views.len()
            );
            self.destroy_sync();
            self.sync = FrameSync::create_many(&*self.device, self.image_views.len())?;
        }

        self.acquire_index = 0;
        self.acquired_image = None;
        self.suboptimal = false;

        log::info!(
            "Swapchain ready: {}x{}, {} images, {:?}",
            self.extent.width,
            self.extent.height,
            self.images.len(),
            self.present_mode
        );

        Ok(())
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Number of images actually owned by the swapchain
    pub fn image_count(&self) -> usize {
        self.image_views.len()
    }

    pub fn image_views(&self) -> Vec<vk::ImageView> {
        self.image_views.clone()
    }

    fn create_image_views(&self) -> Result<Vec<vk::ImageView>> {
        let mut views = Vec::with_capacity(self.images.len());
        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            match self.device.create_image_view(&create_info) {
                Ok(view) => views.push(view),
                Err(e) => {
                    for &view in &views {
                        self.device.destroy_image_view(view);
                    }
                    return Err(e).context("Failed to create image view");
                }
            }
        }
        Ok(views)
    }

    fn destroy_image_views(&mut self) {
        for view in self.image_views.drain(..) {
            self.device.destroy_image_view(view);
        }
    }

    fn destroy_sync(&mut self) {
        for sync in self.sync.drain(..) {
            sync.destroy(&*self.device);
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_sync();
        self.destroy_image_views();
        if self.handle != vk::SwapchainKHR::null() {
            self.device.destroy_swapchain(self.handle);
        }
    }
}
