//! Per-frame CPU/GPU synchronization primitives

use ash::vk;
use ash::Device;

use crate::render::vulkan::context::{VulkanError, VulkanResult};

/// Upper bound on any single fence wait, in nanoseconds. A wait that runs
/// past this indicates a stalled queue, not normal pacing.
pub const FENCE_WAIT_NS: u64 = 5_000_000_000;

/// Binary semaphore with RAII cleanup
pub struct Semaphore {
    device: Device,
    /// Raw semaphore handle
    pub handle: vk::Semaphore,
}

impl Semaphore {
    /// Create an unsignaled semaphore.
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let handle = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.handle, None);
        }
    }
}

/// Fence with RAII cleanup
pub struct Fence {
    device: Device,
    /// Raw fence handle
    pub handle: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled.
    pub fn new(device: &Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let handle = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    /// Block until the fence signals or `timeout_ns` elapses.
    pub fn wait(&self, timeout_ns: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.handle], true, timeout_ns)
                .map_err(|e| match e {
                    vk::Result::TIMEOUT => VulkanError::FenceWaitTimeout { timeout_ns },
                    other => VulkanError::Api(other),
                })
        }
    }

    /// Return the fence to the unsignaled state.
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.handle])
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.handle, None);
        }
    }
}

/// Synchronization objects for one in-flight frame slot
///
/// The fence starts signaled so the first wait on a fresh slot passes
/// without a prior submission.
pub struct FrameSync {
    /// Signaled by acquire when the swapchain image is ready to target
    pub image_available: Semaphore,
    /// Signaled by the queue when the frame's commands finish
    pub queue_complete: Semaphore,
    /// Signaled when the frame's submission retires
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the full set of sync objects for one slot.
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device)?,
            queue_complete: Semaphore::new(device)?,
            in_flight: Fence::new(device, true)?,
        })
    }
}
