//! Vulkan backend implementation
//!
//! Module layering follows bring-up order: context (instance, surface,
//! device), then swapchain, render pass, framebuffers, command state and
//! sync primitives, composed by [`VulkanBackend`].

mod backend;
mod commands;
mod context;
mod device;
mod framebuffer;
mod render_pass;
mod swapchain;
mod sync;

pub use backend::VulkanBackend;
pub use commands::{CommandBuffer, CommandBufferState, CommandPool};
pub use context::{VulkanContext, VulkanError, VulkanInstance, VulkanResult, VulkanSurface};
pub use device::{DeviceRequirements, LogicalDevice, PhysicalDeviceInfo, SwapchainSupport};
pub use framebuffer::Framebuffer;
pub use render_pass::RenderPass;
pub use swapchain::{DepthAttachment, Swapchain};
pub use sync::{Fence, FrameSync, Semaphore, FENCE_WAIT_NS};
