//! Swapchain and depth attachment management
//!
//! Rebuilding on resize goes through [`Swapchain::recreate`], which builds
//! the replacement chain against the retiring handle before the old one is
//! destroyed. Swapchain images are owned by the chain itself, so teardown
//! destroys only the views.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;
use ash::Device;

use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::device::PhysicalDeviceInfo;

/// Swapchain with color image views and a shared depth attachment
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    /// Raw swapchain handle
    pub handle: vk::SwapchainKHR,
    /// Images owned by the swapchain
    pub images: Vec<vk::Image>,
    /// One view per swapchain image
    pub image_views: Vec<vk::ImageView>,
    /// Depth attachment shared by every framebuffer
    pub depth: DepthAttachment,
    /// Selected surface format
    pub format: vk::SurfaceFormatKHR,
    /// Selected present mode
    pub present_mode: vk::PresentModeKHR,
    /// Image extent in pixels
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Build a fresh swapchain for `requested` pixels.
    pub fn new(context: &VulkanContext, requested: vk::Extent2D) -> VulkanResult<Self> {
        Self::create(context, requested, vk::SwapchainKHR::null())
    }

    /// Replace this swapchain with one sized to `requested`, retiring the
    /// old handle through the driver's old-swapchain mechanism.
    ///
    /// The caller must have refreshed surface support on the physical
    /// device and waited for the device to go idle first.
    pub fn recreate(&mut self, context: &VulkanContext, requested: vk::Extent2D) -> VulkanResult<()> {
        let next = Self::create(context, requested, self.handle)?;
        *self = next;
        Ok(())
    }

    fn create(
        context: &VulkanContext,
        requested: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let physical = &context.physical_device;
        let support = &physical.swapchain_support;
        let capabilities = &support.capabilities;

        let format = support
            .formats
            .iter()
            .copied()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_UNORM
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| support.formats.first().copied())
            .ok_or_else(|| {
                VulkanError::InitializationFailed("No surface formats available".to_string())
            })?;

        let present_mode = if support.present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else {
            vk::PresentModeKHR::FIFO
        };

        // The surface dictates the extent unless it reports the sentinel
        // "whatever the window says" value.
        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            vk::Extent2D {
                width: requested.width.clamp(
                    capabilities.min_image_extent.width,
                    capabilities.max_image_extent.width,
                ),
                height: requested.height.clamp(
                    capabilities.min_image_extent.height,
                    capabilities.max_image_extent.height,
                ),
            }
        };

        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
            image_count = capabilities.max_image_count;
        }

        let family_indices = [physical.graphics_family, physical.present_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface.handle)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        create_info = if physical.graphics_family != physical.present_family {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let device = context.device.device.clone();
        let loader = context.device.swapchain_loader.clone();

        let handle = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let images = unsafe {
            loader
                .get_swapchain_images(handle)
                .map_err(VulkanError::Api)?
        };

        let image_views = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                unsafe {
                    device
                        .create_image_view(&view_info, None)
                        .map_err(VulkanError::Api)
                }
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let depth = DepthAttachment::new(&device, physical, extent)?;

        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );

        Ok(Self {
            device,
            loader,
            handle,
            images,
            image_views,
            depth,
            format,
            present_mode,
            extent,
        })
    }

    /// Number of images in the chain.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// Depth image, its device memory and view
pub struct DepthAttachment {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    /// Depth view attached to every framebuffer
    pub view: vk::ImageView,
    /// Format the depth image was created with
    pub format: vk::Format,
}

impl DepthAttachment {
    /// Allocate a device-local depth image matching `extent`.
    pub fn new(
        device: &Device,
        physical: &PhysicalDeviceInfo,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let format = physical.depth_format;

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(VulkanError::Api)?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type = physical.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type);

        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };
        unsafe {
            device
                .bind_image_memory(image, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: device.clone(),
            image,
            memory,
            view,
            format,
        })
    }
}

impl Drop for DepthAttachment {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
