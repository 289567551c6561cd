// Synchronization primitives
//
// One set per swapchain image:
// - acquire semaphore: image is ready to be rendered to (GPU-GPU)
// - present semaphore: rendering finished, image may be presented (GPU-GPU)
// - submit fence: all work submitted against the image has retired (GPU-CPU)

use anyhow::Result;
use ash::vk;

use super::api::DeviceApi;

pub struct FrameSync {
    pub acquire_semaphore: vk::Semaphore,
    pub present_semaphore: vk::Semaphore,
    pub submit_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &dyn DeviceApi) -> Result<Self> {
        Ok(Self {
            acquire_semaphore: device.create_semaphore()?,
            present_semaphore: device.create_semaphore()?,
            // Start signaled so the first wait on an image does not block
            submit_fence: device.create_fence(true)?,
        })
    }

    /// Create `count` sets, destroying any partially created ones on failure.
    pub fn create_many(device: &dyn DeviceApi, count: usize) -> Result<Vec<Self>> {
        let mut sets = Vec::with_capacity(count);
        for _ in 0..count {
            match Self::new(device) {
                Ok(sync) => sets.push(sync),
                Err(e) => {
                    for sync in &sets {
                        sync.destroy(device);
                    }
                    return Err(e);
                }
            }
        }
        Ok(sets)
    }

    pub fn destroy(&self, device: &dyn DeviceApi) {
        device.destroy_semaphore(self.acquire_semaphore);
        device.destroy_semaphore(self.present_semaphore);
        device.destroy_fence(self.submit_fence);
    }
}
