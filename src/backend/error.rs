// Swapchain errors
//
// A stale swapchain is recoverable (recreate and carry on); anything else the
// driver reports is fatal and goes up through anyhow.

use ash::vk;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SwapchainError {
    /// The surface changed under the swapchain; it must be recreated.
    #[error("swapchain is out of date and must be recreated")]
    OutOfDate,

    #[error("present called without an acquired image")]
    NoImageAcquired,

    #[error("vulkan error: {0}")]
    Vulkan(vk::Result),
}

impl From<vk::Result> for SwapchainError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::OutOfDate,
            other => Self::Vulkan(other),
        }
    }
}

impl SwapchainError {
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, Self::OutOfDate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_is_distinct_from_fatal_errors() {
        assert!(SwapchainError::from(vk::Result::ERROR_OUT_OF_DATE_KHR).is_out_of_date());

        let lost = SwapchainError::from(vk::Result::ERROR_DEVICE_LOST);
        assert!(!lost.is_out_of_date());
        assert!(matches!(lost, SwapchainError::Vulkan(vk::Result::ERROR_DEVICE_LOST)));
    }
}
