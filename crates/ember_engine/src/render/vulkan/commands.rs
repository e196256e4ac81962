//! Command pool and command buffer lifecycle tracking

use ash::vk;
use ash::Device;

use crate::render::vulkan::context::{VulkanError, VulkanResult};
use crate::render::vulkan::render_pass::RenderPass;

/// Lifecycle state of a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// Allocated and available to begin recording.
    Ready,
    /// Recording commands outside a render pass.
    Recording,
    /// Recording inside an active render pass.
    InRenderPass,
    /// Recording finished, ready to submit.
    RecordingEnded,
    /// Submitted to a queue and possibly still executing.
    Submitted,
}

/// Command pool with RAII cleanup
///
/// Created with the reset flag so individual buffers can be re-begun each
/// frame without resetting the whole pool.
pub struct CommandPool {
    device: Device,
    /// Raw pool handle
    pub handle: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool for `queue_family`.
    pub fn new(device: &Device, queue_family: u32) -> VulkanResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let handle = unsafe {
            device
                .create_command_pool(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device: device.clone(),
            handle,
        })
    }

    /// Allocate `count` primary command buffers from this pool.
    pub fn allocate(&self, count: u32) -> VulkanResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let handles = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        Ok(handles
            .into_iter()
            .map(|handle| CommandBuffer {
                device: self.device.clone(),
                handle,
                state: CommandBufferState::Ready,
            })
            .collect())
    }

    /// Return `buffers` to the pool. The caller must ensure none of them
    /// are still executing.
    pub fn free(&self, buffers: Vec<CommandBuffer>) {
        let handles: Vec<vk::CommandBuffer> = buffers.iter().map(|b| b.handle).collect();
        if handles.is_empty() {
            return;
        }
        unsafe {
            self.device.free_command_buffers(self.handle, &handles);
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}

/// Primary command buffer with explicit state tracking
///
/// The pool owns the underlying allocation; dropping a `CommandBuffer`
/// without going through [`CommandPool::free`] leaves it to be reclaimed
/// when the pool is destroyed.
pub struct CommandBuffer {
    device: Device,
    /// Raw command buffer handle
    pub handle: vk::CommandBuffer,
    state: CommandBufferState,
}

impl CommandBuffer {
    /// Current lifecycle state.
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Return the buffer to `Ready` so it can be begun again. The pool's
    /// reset flag makes the actual reset implicit in the next begin.
    pub fn reset(&mut self) {
        self.state = CommandBufferState::Ready;
    }

    /// Begin single-use recording.
    pub fn begin(&mut self) -> VulkanResult<()> {
        if self.state != CommandBufferState::Ready {
            return Err(VulkanError::InvalidOperation {
                reason: format!("begin called in state {:?}", self.state),
            });
        }

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(self.handle, &begin_info)
                .map_err(VulkanError::Api)?;
        }
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    /// Record the start of `render_pass` targeting `framebuffer`.
    pub fn begin_render_pass(
        &mut self,
        render_pass: &RenderPass,
        framebuffer: vk::Framebuffer,
    ) -> VulkanResult<()> {
        if self.state != CommandBufferState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: format!("begin_render_pass called in state {:?}", self.state),
            });
        }
        render_pass.begin(self.handle, framebuffer);
        self.state = CommandBufferState::InRenderPass;
        Ok(())
    }

    /// Record the end of the active render pass.
    pub fn end_render_pass(&mut self, render_pass: &RenderPass) -> VulkanResult<()> {
        if self.state != CommandBufferState::InRenderPass {
            return Err(VulkanError::InvalidOperation {
                reason: format!("end_render_pass called in state {:?}", self.state),
            });
        }
        render_pass.end(self.handle);
        self.state = CommandBufferState::Recording;
        Ok(())
    }

    /// Finish recording.
    pub fn end(&mut self) -> VulkanResult<()> {
        if self.state != CommandBufferState::Recording {
            return Err(VulkanError::InvalidOperation {
                reason: format!("end called in state {:?}", self.state),
            });
        }
        unsafe {
            self.device
                .end_command_buffer(self.handle)
                .map_err(VulkanError::Api)?;
        }
        self.state = CommandBufferState::RecordingEnded;
        Ok(())
    }

    /// Note that the buffer has been handed to a queue.
    pub fn mark_submitted(&mut self) {
        self.state = CommandBufferState::Submitted;
    }

    /// Record a dynamic viewport.
    pub fn set_viewport(&self, viewport: vk::Viewport) {
        unsafe {
            self.device.cmd_set_viewport(self.handle, 0, &[viewport]);
        }
    }

    /// Record a dynamic scissor.
    pub fn set_scissor(&self, scissor: vk::Rect2D) {
        unsafe {
            self.device.cmd_set_scissor(self.handle, 0, &[scissor]);
        }
    }
}
