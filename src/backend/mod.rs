// Backend module - Vulkan builders and object lifetimes
//
// Each builder produces an object that destroys its handle on drop and holds
// shared references to whatever it was built from (device, render pass,
// command pool), so teardown order follows ownership.

pub mod api;
pub mod command;
pub mod device;
pub mod error;
pub mod instance;
pub mod pipeline;
pub mod renderpass;
pub mod shader;
pub mod swapchain;
pub mod sync;

#[cfg(test)]
pub mod mock;

pub use api::{DeviceApi, Queue, SharedDevice};
pub use command::{
    CommandBuffer, CommandBufferBuilder, CommandPool, CommandPoolBuilder, Framebuffer,
    FramebufferBuilder,
};
pub use device::{DeviceBuilder, QueueType, VulkanDevice};
pub use error::SwapchainError;
pub use instance::{Instance, InstanceBuilder, Surface, SurfaceBuilder};
pub use pipeline::{GraphicsPipelineBuilder, Pipeline, VertexInput};
pub use renderpass::{Attachment, RenderPass, RenderPassBuilder, SubpassDescription};
pub use swapchain::{Frame, Swapchain, SwapchainBuilder};
