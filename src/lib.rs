//! Vulkan convenience layer: builders for instance, device, swapchain, render
//! pass, pipeline, framebuffers and command buffers, plus a polled window and
//! a frame orchestrator tying them together.

pub mod backend;
pub mod config;
pub mod platform;
pub mod render;
