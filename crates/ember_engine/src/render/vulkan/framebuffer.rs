//! Framebuffers binding swapchain color views to the shared depth view

use ash::vk;
use ash::Device;

use crate::render::vulkan::context::{VulkanError, VulkanResult};

/// Framebuffer owning a copy of its attachment list
///
/// The attachment handles are kept so the framebuffer remains self
/// describing; regeneration after a swapchain rebuild constructs entirely
/// new instances rather than patching these in place.
pub struct Framebuffer {
    device: Device,
    /// Raw framebuffer handle
    pub handle: vk::Framebuffer,
    /// Attachment views this framebuffer was created against
    pub attachments: Vec<vk::ImageView>,
}

impl Framebuffer {
    /// Create a framebuffer over `attachments` for `render_pass`.
    pub fn new(
        device: &Device,
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        attachments: Vec<vk::ImageView>,
    ) -> VulkanResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let handle = unsafe {
            device
                .create_framebuffer(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: device.clone(),
            handle,
            attachments,
        })
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.handle, None);
        }
    }
}
