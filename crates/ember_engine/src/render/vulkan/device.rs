//! Physical device selection and logical device creation

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;
use ash::{Device, Instance};
use std::collections::HashSet;
use std::ffi::CStr;

use crate::config::RendererConfig;
use crate::render::vulkan::context::{VulkanError, VulkanResult, VulkanSurface};

/// What a physical device must offer before selection accepts it.
pub struct DeviceRequirements {
    /// Needs a graphics-capable queue family.
    pub graphics: bool,
    /// Needs a family that can present to the surface.
    pub present: bool,
    /// Needs a transfer-capable queue family.
    pub transfer: bool,
    /// Needs anisotropic filtering support.
    pub sampler_anisotropy: bool,
    /// Reject anything that is not a discrete GPU.
    pub discrete_gpu: bool,
    /// Device extensions that must be present.
    pub extensions: Vec<&'static CStr>,
}

impl DeviceRequirements {
    /// Requirements derived from renderer configuration.
    pub fn for_config(config: &RendererConfig) -> Self {
        Self {
            graphics: true,
            present: true,
            transfer: true,
            sampler_anisotropy: true,
            discrete_gpu: config.require_discrete_gpu,
            extensions: vec![SwapchainLoader::name()],
        }
    }
}

/// Surface capabilities a swapchain build works from.
pub struct SwapchainSupport {
    /// Surface capabilities (image counts, extents, transforms).
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    /// Query the surface capabilities of `device`.
    pub fn query(device: vk::PhysicalDevice, surface: &VulkanSurface) -> VulkanResult<Self> {
        let capabilities = unsafe {
            surface
                .loader
                .get_physical_device_surface_capabilities(device, surface.handle)
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(device, surface.handle)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface
                .loader
                .get_physical_device_surface_present_modes(device, surface.handle)
                .map_err(VulkanError::Api)?
        };
        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

#[derive(Default)]
struct QueueFamilyIndices {
    graphics: Option<u32>,
    present: Option<u32>,
    transfer: Option<u32>,
}

/// Picks one family per role. Transfer prefers the family with the fewest
/// other capabilities so dedicated transfer hardware wins when present.
fn select_queue_families(
    families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();
    let mut min_transfer_score = u8::MAX;

    for (index, family) in families.iter().enumerate() {
        let mut transfer_score = 0u8;

        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            if indices.graphics.is_none() {
                indices.graphics = Some(index as u32);
            }
            transfer_score += 1;
        }
        if family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
            transfer_score += 1;
        }
        if family.queue_flags.contains(vk::QueueFlags::TRANSFER)
            && transfer_score <= min_transfer_score
        {
            min_transfer_score = transfer_score;
            indices.transfer = Some(index as u32);
        }

        if present_support[index] && indices.present.is_none() {
            indices.present = Some(index as u32);
        }
    }

    indices
}

/// Selected physical device with its cached capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heap and type layout
    pub memory: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// Index of the transfer queue family
    pub transfer_family: u32,
    /// Surface capabilities at selection time
    pub swapchain_support: SwapchainSupport,
    /// Depth format the device supports
    pub depth_format: vk::Format,
}

impl PhysicalDeviceInfo {
    /// Pick the first enumerated device satisfying `requirements`.
    pub fn select(
        instance: &Instance,
        surface: &VulkanSurface,
        requirements: &DeviceRequirements,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        for device in devices {
            match Self::evaluate_device(instance, device, surface, requirements) {
                Ok(info) => {
                    info.log_selection();
                    return Ok(info);
                }
                Err(e) => log::debug!("Skipping device: {e}"),
            }
        }

        Err(VulkanError::InitializationFailed(
            "No suitable GPU found".to_string(),
        ))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: &VulkanSurface,
        requirements: &DeviceRequirements,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        if requirements.discrete_gpu
            && properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
        {
            return Err(VulkanError::InitializationFailed(
                "Device is not a discrete GPU".to_string(),
            ));
        }

        let mut present_support = Vec::with_capacity(queue_families.len());
        for index in 0..queue_families.len() as u32 {
            let supported = unsafe {
                surface
                    .loader
                    .get_physical_device_surface_support(device, index, surface.handle)
                    .map_err(VulkanError::Api)?
            };
            present_support.push(supported);
        }

        let indices = select_queue_families(&queue_families, &present_support);
        let graphics_family = match (requirements.graphics, indices.graphics) {
            (true, None) => {
                return Err(VulkanError::InitializationFailed(
                    "No graphics queue family found".to_string(),
                ))
            }
            (_, index) => index.unwrap_or(0),
        };
        let present_family = match (requirements.present, indices.present) {
            (true, None) => {
                return Err(VulkanError::InitializationFailed(
                    "No present queue family found".to_string(),
                ))
            }
            (_, index) => index.unwrap_or(0),
        };
        let transfer_family = match (requirements.transfer, indices.transfer) {
            (true, None) => {
                return Err(VulkanError::InitializationFailed(
                    "No transfer queue family found".to_string(),
                ))
            }
            (_, index) => index.unwrap_or(0),
        };

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(VulkanError::Api)?
        };
        let has_required_extensions = requirements.extensions.iter().all(|required| {
            extensions.iter().any(|available| {
                let extension_name =
                    unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                extension_name == *required
            })
        });
        if !has_required_extensions {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        if requirements.sampler_anisotropy && features.sampler_anisotropy == vk::FALSE {
            return Err(VulkanError::InitializationFailed(
                "Device does not support anisotropic filtering".to_string(),
            ));
        }

        let swapchain_support = SwapchainSupport::query(device, surface)?;
        if swapchain_support.formats.is_empty() || swapchain_support.present_modes.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "Device reports no surface formats or present modes".to_string(),
            ));
        }

        let depth_format = Self::detect_depth_format(instance, device).ok_or_else(|| {
            VulkanError::InitializationFailed("No supported depth format found".to_string())
        })?;

        Ok(Self {
            device,
            properties,
            features,
            memory,
            graphics_family,
            present_family,
            transfer_family,
            swapchain_support,
            depth_format,
        })
    }

    fn detect_depth_format(instance: &Instance, device: vk::PhysicalDevice) -> Option<vk::Format> {
        let candidates = [
            vk::Format::D32_SFLOAT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ];
        let required = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

        candidates.into_iter().find(|&format| {
            let props = unsafe { instance.get_physical_device_format_properties(device, format) };
            props.linear_tiling_features.contains(required)
                || props.optimal_tiling_features.contains(required)
        })
    }

    fn log_selection(&self) {
        let name = unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) };
        log::info!("Selected GPU: {}", name.to_string_lossy());
        log::info!(
            "  type: {}, driver {}.{}.{}, Vulkan {}.{}.{}",
            device_type_name(self.properties.device_type),
            vk::api_version_major(self.properties.driver_version),
            vk::api_version_minor(self.properties.driver_version),
            vk::api_version_patch(self.properties.driver_version),
            vk::api_version_major(self.properties.api_version),
            vk::api_version_minor(self.properties.api_version),
            vk::api_version_patch(self.properties.api_version),
        );
        log::info!(
            "  queue families: graphics {}, present {}, transfer {}",
            self.graphics_family,
            self.present_family,
            self.transfer_family
        );
    }

    /// Re-query surface capabilities and depth support after a surface
    /// change. Called before each swapchain rebuild.
    pub fn refresh_surface_support(
        &mut self,
        instance: &Instance,
        surface: &VulkanSurface,
    ) -> VulkanResult<()> {
        self.swapchain_support = SwapchainSupport::query(self.device, surface)?;
        self.depth_format = Self::detect_depth_format(instance, self.device).ok_or_else(|| {
            VulkanError::InitializationFailed("No supported depth format found".to_string())
        })?;
        Ok(())
    }

    /// Find a memory type index matching `type_bits` with all of `properties`.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<u32> {
        for i in 0..self.memory.memory_type_count as usize {
            if type_bits & (1 << i) != 0
                && self.memory.memory_types[i].property_flags.contains(properties)
            {
                return Ok(i as u32);
            }
        }
        Err(VulkanError::NoSuitableMemoryType)
    }
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "discrete",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual",
        vk::PhysicalDeviceType::CPU => "cpu",
        _ => "other",
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Transfer operations queue
    pub transfer_queue: vk::Queue,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
    /// Index of the transfer queue family
    pub transfer_family: u32,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create a new logical device with one queue per required family
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let unique_families: HashSet<u32> = [
            physical_device_info.graphics_family,
            physical_device_info.present_family,
            physical_device_info.transfer_family,
        ]
        .iter()
        .copied()
        .collect();

        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let required_extensions = [SwapchainLoader::name().as_ptr()];

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue =
            unsafe { device.get_device_queue(physical_device_info.graphics_family, 0) };
        let present_queue =
            unsafe { device.get_device_queue(physical_device_info.present_family, 0) };
        let transfer_queue =
            unsafe { device.get_device_queue(physical_device_info.transfer_family, 0) };

        let swapchain_loader = SwapchainLoader::new(instance, &device);
        log::info!("Logical device created");

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            transfer_queue,
            graphics_family: physical_device_info.graphics_family,
            present_family: physical_device_info.present_family,
            transfer_family: physical_device_info.transfer_family,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            // Outstanding GPU work must retire before the device goes away.
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn dedicated_transfer_family_wins() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let present = [true, false];

        let indices = select_queue_families(&families, &present);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert_eq!(indices.transfer, Some(1));
    }

    #[test]
    fn shared_family_covers_all_roles_when_alone() {
        let families = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        )];
        let present = [true];

        let indices = select_queue_families(&families, &present);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(0));
        assert_eq!(indices.transfer, Some(0));
    }

    #[test]
    fn compute_only_family_is_preferred_over_graphics_for_transfer() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        ];
        let present = [true, false];

        let indices = select_queue_families(&families, &present);
        assert_eq!(indices.transfer, Some(1));
    }

    #[test]
    fn missing_roles_stay_unassigned() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        let present = [false];

        let indices = select_queue_families(&families, &present);
        assert_eq!(indices.graphics, None);
        assert_eq!(indices.present, None);
        assert_eq!(indices.transfer, None);
    }
}
