//! Vulkan rendering backend
//!
//! Drives the per-frame acquire/record/submit/present cycle and the
//! swapchain rebuild path. CPU/GPU pacing works through one sync slot per
//! frame in flight; swapchain images are additionally guarded by the
//! `images_in_flight` table because image count and slot count differ.

use ash::vk;
use ash::Device;

use crate::config::RendererConfig;
use crate::render::backend::{BackendType, RenderBackend};
use crate::render::vulkan::commands::{CommandBuffer, CommandPool};
use crate::render::vulkan::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::vulkan::framebuffer::Framebuffer;
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::swapchain::Swapchain;
use crate::render::vulkan::sync::{FrameSync, FENCE_WAIT_NS};
use crate::render::window::Window;
use crate::render::RendererError;

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.2, 1.0];

/// Vulkan implementation of [`RenderBackend`]
///
/// Resource fields are declared in teardown order: sync objects first,
/// then command state, framebuffers, render pass, swapchain, and the
/// context last.
pub struct VulkanBackend {
    frame_sync: Vec<FrameSync>,
    command_buffers: Vec<CommandBuffer>,
    command_pool: CommandPool,
    framebuffers: Vec<Framebuffer>,
    render_pass: RenderPass,
    swapchain: Swapchain,
    context: VulkanContext,

    /// Sync slot that last wrote each swapchain image, if any.
    images_in_flight: Vec<Option<usize>>,
    max_frames_in_flight: usize,
    current_frame: usize,
    image_index: usize,
    framebuffer_width: u32,
    framebuffer_height: u32,
    size_generation: u64,
    size_last_generation: u64,
    recreating_swapchain: bool,
}

impl VulkanBackend {
    /// Bring up the full backend against `window`.
    pub fn new(app_name: &str, window: &mut Window, config: &RendererConfig) -> VulkanResult<Self> {
        let (framebuffer_width, framebuffer_height) = window.get_framebuffer_size();

        let context = VulkanContext::new(window, app_name, config)?;
        let swapchain = Swapchain::new(
            &context,
            vk::Extent2D {
                width: framebuffer_width,
                height: framebuffer_height,
            },
        )?;

        let render_pass = RenderPass::new(
            &context.device.device,
            swapchain.format.format,
            swapchain.depth.format,
            swapchain.extent,
            CLEAR_COLOR,
            1.0,
            0,
        )?;

        let framebuffers =
            Self::build_framebuffers(&context.device.device, &render_pass, &swapchain)?;

        let command_pool = CommandPool::new(&context.device.device, context.device.graphics_family)?;
        let command_buffers = command_pool.allocate(swapchain.image_count() as u32)?;

        let max_frames_in_flight = config.max_frames_in_flight.max(1) as usize;
        let frame_sync = (0..max_frames_in_flight)
            .map(|_| FrameSync::new(&context.device.device))
            .collect::<VulkanResult<Vec<_>>>()?;
        let images_in_flight = vec![None; swapchain.image_count()];

        log::info!(
            "Vulkan backend initialized ({} images, {} frames in flight)",
            swapchain.image_count(),
            max_frames_in_flight
        );

        Ok(Self {
            frame_sync,
            command_buffers,
            command_pool,
            framebuffers,
            render_pass,
            swapchain,
            context,
            images_in_flight,
            max_frames_in_flight,
            current_frame: 0,
            image_index: 0,
            framebuffer_width,
            framebuffer_height,
            size_generation: 0,
            size_last_generation: 0,
            recreating_swapchain: false,
        })
    }

    fn build_framebuffers(
        device: &Device,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
    ) -> VulkanResult<Vec<Framebuffer>> {
        swapchain
            .image_views
            .iter()
            .map(|&view| {
                let attachments = vec![view, swapchain.depth.view];
                Framebuffer::new(device, render_pass.handle, swapchain.extent, attachments)
            })
            .collect()
    }

    fn resize_impl(&mut self, width: u32, height: u32) {
        self.framebuffer_width = width;
        self.framebuffer_height = height;
        self.size_generation += 1;
        log::debug!(
            "Backend resize: {}x{} generation {}",
            width,
            height,
            self.size_generation
        );
    }

    fn begin_frame_impl(&mut self, _delta_time: f32) -> VulkanResult<bool> {
        // Never race an in-progress rebuild.
        if self.recreating_swapchain {
            self.context.wait_idle()?;
            log::debug!("Swapchain recreation in progress, skipping frame");
            return Ok(false);
        }

        // A resize since the last rebuild means the current swapchain no
        // longer matches the surface. Rebuild, then skip this frame; the
        // next one proceeds against the fresh chain.
        if self.size_generation != self.size_last_generation {
            self.context.wait_idle()?;
            self.recreate_swapchain()?;
            log::debug!("Swapchain rebuilt after resize, skipping frame");
            return Ok(false);
        }

        // Back-pressure: this slot's previous submission must retire before
        // its sync objects are reused.
        self.frame_sync[self.current_frame]
            .in_flight
            .wait(FENCE_WAIT_NS)?;

        let acquire = unsafe {
            self.context.device.swapchain_loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                self.frame_sync[self.current_frame].image_available.handle,
                vk::Fence::null(),
            )
        };
        let image_index = match acquire {
            Ok((index, _suboptimal)) => index as usize,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain()?;
                return Ok(false);
            }
            Err(e) => return Err(VulkanError::Api(e)),
        };
        self.image_index = image_index;

        self.render_pass
            .set_render_area(self.framebuffer_width, self.framebuffer_height);

        // Y-flipped viewport so world space keeps +Y up.
        let viewport = vk::Viewport {
            x: 0.0,
            y: self.framebuffer_height as f32,
            width: self.framebuffer_width as f32,
            height: -(self.framebuffer_height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: self.framebuffer_width,
                height: self.framebuffer_height,
            },
        };

        // Recording targets the buffer owned by the acquired image, which
        // need not match the sync slot index.
        let framebuffer = self.framebuffers[image_index].handle;
        let command_buffer = &mut self.command_buffers[image_index];
        command_buffer.reset();
        command_buffer.begin()?;
        command_buffer.set_viewport(viewport);
        command_buffer.set_scissor(scissor);
        command_buffer.begin_render_pass(&self.render_pass, framebuffer)?;

        Ok(true)
    }

    fn end_frame_impl(&mut self, _delta_time: f32) -> VulkanResult<()> {
        let image_index = self.image_index;

        {
            let command_buffer = &mut self.command_buffers[image_index];
            command_buffer.end_render_pass(&self.render_pass)?;
            command_buffer.end()?;
        }

        // The CPU can lap the GPU on a particular image when image count
        // exceeds slot count. Wait out any other slot still writing it.
        if let Some(slot) = self.images_in_flight[image_index] {
            if slot != self.current_frame {
                self.frame_sync[slot].in_flight.wait(FENCE_WAIT_NS)?;
            }
        }
        self.images_in_flight[image_index] = Some(self.current_frame);

        let sync = &self.frame_sync[self.current_frame];
        sync.in_flight.reset()?;

        let wait_semaphores = [sync.image_available.handle];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[image_index].handle];
        let signal_semaphores = [sync.queue_complete.handle];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.context
                .device
                .device
                .queue_submit(
                    self.context.device.graphics_queue,
                    &[submit_info.build()],
                    sync.in_flight.handle,
                )
                .map_err(VulkanError::Api)?;
        }
        self.command_buffers[image_index].mark_submitted();

        let queue_complete = [self.frame_sync[self.current_frame].queue_complete.handle];
        let swapchains = [self.swapchain.handle];
        let image_indices = [image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&queue_complete)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let present_result = unsafe {
            self.context
                .device
                .swapchain_loader
                .queue_present(self.context.device.present_queue, &present_info)
        };
        match present_result {
            Ok(false) => {}
            Ok(true) => {
                // Suboptimal, still presented. Rebuild for the next frame.
                self.recreate_swapchain()?;
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain()?;
            }
            Err(e) => return Err(VulkanError::Api(e)),
        }

        self.current_frame = (self.current_frame + 1) % self.max_frames_in_flight;
        Ok(())
    }

    /// Rebuild the swapchain and everything sized to it.
    ///
    /// Returns `Ok(false)` without touching anything when a rebuild is
    /// already running or the cached size has a zero dimension.
    fn recreate_swapchain(&mut self) -> VulkanResult<bool> {
        if self.recreating_swapchain {
            log::debug!("Swapchain recreation requested while already recreating");
            return Ok(false);
        }
        if self.framebuffer_width == 0 || self.framebuffer_height == 0 {
            log::debug!("Swapchain recreation deferred, window has a zero dimension");
            return Ok(false);
        }
        self.recreating_swapchain = true;

        self.context.wait_idle()?;

        // Device idle means no image is in flight anymore.
        for slot in self.images_in_flight.iter_mut() {
            *slot = None;
        }

        // Capabilities can change across resizes and monitor moves.
        self.context
            .physical_device
            .refresh_surface_support(&self.context.instance.instance, &self.context.surface)?;

        self.swapchain.recreate(
            &self.context,
            vk::Extent2D {
                width: self.framebuffer_width,
                height: self.framebuffer_height,
            },
        )?;

        // The driver may have granted a different extent than requested.
        self.framebuffer_width = self.swapchain.extent.width;
        self.framebuffer_height = self.swapchain.extent.height;
        self.render_pass
            .set_render_area(self.framebuffer_width, self.framebuffer_height);
        self.size_last_generation = self.size_generation;

        let retired = std::mem::take(&mut self.command_buffers);
        self.command_pool.free(retired);
        self.framebuffers.clear();

        self.command_buffers = self
            .command_pool
            .allocate(self.swapchain.image_count() as u32)?;
        self.framebuffers =
            Self::build_framebuffers(&self.context.device.device, &self.render_pass, &self.swapchain)?;
        self.images_in_flight = vec![None; self.swapchain.image_count()];

        self.recreating_swapchain = false;
        log::info!(
            "Swapchain recreated at {}x{}",
            self.framebuffer_width,
            self.framebuffer_height
        );
        Ok(true)
    }
}

impl RenderBackend for VulkanBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Vulkan
    }

    fn on_resize(&mut self, width: u32, height: u32) {
        self.resize_impl(width, height);
    }

    fn begin_frame(&mut self, delta_time: f32) -> Result<bool, RendererError> {
        self.begin_frame_impl(delta_time)
            .map_err(|e| RendererError::Backend(e.to_string()))
    }

    fn end_frame(&mut self, delta_time: f32) -> Result<(), RendererError> {
        self.end_frame_impl(delta_time)
            .map_err(|e| RendererError::Backend(e.to_string()))
    }

    fn wait_idle(&mut self) -> Result<(), RendererError> {
        self.context
            .wait_idle()
            .map_err(|e| RendererError::Backend(e.to_string()))
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Device wait failed during backend teardown: {e}");
        }
        log::debug!("Vulkan backend shutting down");
    }
}
