//! Frame presentation state machine
//!
//! One frame at a time: wait for the present queue, write per-frame data, acquire,
//! submit the prerecorded command buffer, present. Surface invalidation is reported as an outcome rather than
//! an error and answered with a swapchain rebuild.

use crate::render::vulkan::context::VulkanResult;

/// Result of asking the swapchain for the next image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available
    Acquired {
        /// Swapchain image index
        image_index: u32,
        /// The swapchain still works but no longer matches the surface exactly
        suboptimal: bool,
    },
    /// The swapchain can no longer present to the surface
    OutOfDate,
}

/// Result of queueing an image for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented normally
    Presented,
    /// Presented, but the swapchain no longer matches the surface
    Suboptimal,
    /// The swapchain can no longer present to the surface
    OutOfDate,
}

/// What happened during one call to [`FrameLoop::render_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was drawn and presented
    Presented,
    /// Acquisition found the swapchain out of date; nothing was drawn and a rebuild was attempted
    Skipped,
    /// The frame was presented and a swapchain rebuild attempted afterwards
    PresentedAndRebuilt,
}

/// The device operations one frame needs
pub trait PresentationBackend {
    /// Block until the present queue is idle
    fn wait_present_idle(&mut self) -> VulkanResult<()>;

    /// Write per-frame host data; the device is idle when this runs
    fn prepare_frame(&mut self) -> VulkanResult<()>;

    /// Acquire the next swapchain image, signaling the image-available semaphore
    fn acquire_next_image(&mut self) -> VulkanResult<AcquireOutcome>;

    /// Submit the command buffer for `image_index`, waiting on image-available and
    /// signaling render-finished
    fn submit(&mut self, image_index: u32) -> VulkanResult<()>;

    /// Present `image_index` once render-finished is signaled
    fn present(&mut self, image_index: u32) -> VulkanResult<PresentOutcome>;

    /// Replace the swapchain target set; `false` when the rebuild was deferred
    fn rebuild(&mut self) -> VulkanResult<bool>;

    /// Return and clear a pending window resize notification
    fn take_resize_request(&mut self) -> bool;
}

/// Counters for the frames driven so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames presented
    pub presented: u64,
    /// Frames skipped because acquisition found the swapchain out of date
    pub skipped: u64,
    /// Swapchain target sets actually rebuilt by the loop
    pub rebuilds: u64,
}

/// Drives a [`PresentationBackend`] one frame at a time
#[derive(Debug, Default)]
pub struct FrameLoop {
    stats: FrameStats,
}

impl FrameLoop {
    /// Create a loop with zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Render and present one frame
    ///
    /// Any error is unrecoverable; out-of-date and suboptimal swapchains are handled
    /// here by rebuilding.
    pub fn render_frame<B: PresentationBackend>(&mut self, backend: &mut B) -> VulkanResult<FrameOutcome> {
        backend.wait_present_idle()?;
        backend.prepare_frame()?;

        let image_index = match backend.acquire_next_image()? {
            AcquireOutcome::Acquired { image_index, suboptimal } => {
                if suboptimal {
                    log::trace!("Acquired image {image_index} from a suboptimal swapchain");
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                log::debug!("Swapchain out of date on acquire, rebuilding and skipping frame");
                self.rebuild(backend)?;
                self.stats.skipped += 1;
                return Ok(FrameOutcome::Skipped);
            }
        };

        backend.submit(image_index)?;
        let presented = backend.present(image_index)?;
        self.stats.presented += 1;

        let resized = backend.take_resize_request();
        if presented != PresentOutcome::Presented || resized {
            log::debug!("Rebuilding swapchain after present ({presented:?}, resized: {resized})");
            self.rebuild(backend)?;
            return Ok(FrameOutcome::PresentedAndRebuilt);
        }

        Ok(FrameOutcome::Presented)
    }

    fn rebuild<B: PresentationBackend>(&mut self, backend: &mut B) -> VulkanResult<()> {
        if backend.rebuild()? {
            self.stats.rebuilds += 1;
        } else {
            log::debug!("Swapchain rebuild deferred");
        }
        Ok(())
    }

    /// Counters so far
    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::context::VulkanError;
    use ash::vk;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MockBackend {
        acquires: VecDeque<AcquireOutcome>,
        presents: VecDeque<PresentOutcome>,
        resize_pending: bool,
        defer_rebuild: bool,
        fail_submit: bool,
        calls: Vec<&'static str>,
        submitted: Vec<u32>,
        rebuilds: usize,
    }

    impl PresentationBackend for MockBackend {
        fn wait_present_idle(&mut self) -> VulkanResult<()> {
            self.calls.push("wait");
            Ok(())
        }

        fn prepare_frame(&mut self) -> VulkanResult<()> {
            self.calls.push("prepare");
            Ok(())
        }

        fn acquire_next_image(&mut self) -> VulkanResult<AcquireOutcome> {
            self.calls.push("acquire");
            Ok(self.acquires.pop_front().unwrap_or(AcquireOutcome::Acquired {
                image_index: 0,
                suboptimal: false,
            }))
        }

        fn submit(&mut self, image_index: u32) -> VulkanResult<()> {
            self.calls.push("submit");
            if self.fail_submit {
                return Err(VulkanError::Api {
                    call: "vkQueueSubmit",
                    result: vk::Result::ERROR_DEVICE_LOST,
                    location: std::panic::Location::caller(),
                });
            }
            self.submitted.push(image_index);
            Ok(())
        }

        fn present(&mut self, _image_index: u32) -> VulkanResult<PresentOutcome> {
            self.calls.push("present");
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Presented))
        }

        fn rebuild(&mut self) -> VulkanResult<bool> {
            self.calls.push("rebuild");
            self.rebuilds += 1;
            Ok(!self.defer_rebuild)
        }

        fn take_resize_request(&mut self) -> bool {
            std::mem::take(&mut self.resize_pending)
        }
    }

    #[test]
    fn test_normal_frame_order() {
        let mut backend = MockBackend::default();
        backend.acquires.push_back(AcquireOutcome::Acquired {
            image_index: 2,
            suboptimal: false,
        });
        let mut frames = FrameLoop::new();

        assert_eq!(frames.render_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(backend.calls, ["wait", "prepare", "acquire", "submit", "present"]);
        assert_eq!(backend.submitted, [2]);
        assert_eq!(backend.rebuilds, 0);
    }

    #[test]
    fn test_out_of_date_acquire_rebuilds_once_and_skips() {
        let mut backend = MockBackend::default();
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut frames = FrameLoop::new();

        assert_eq!(frames.render_frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert_eq!(backend.rebuilds, 1);
        assert!(backend.submitted.is_empty());
        assert!(!backend.calls.contains(&"present"));
        assert_eq!(
            frames.stats(),
            FrameStats {
                presented: 0,
                skipped: 1,
                rebuilds: 1
            }
        );

        assert_eq!(frames.render_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(backend.rebuilds, 1);
    }

    #[test]
    fn test_suboptimal_acquire_still_draws() {
        let mut backend = MockBackend::default();
        backend.acquires.push_back(AcquireOutcome::Acquired {
            image_index: 1,
            suboptimal: true,
        });
        let mut frames = FrameLoop::new();

        assert_eq!(frames.render_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(backend.submitted, [1]);
    }

    #[test]
    fn test_present_invalidation_rebuilds_after_present() {
        for outcome in [PresentOutcome::OutOfDate, PresentOutcome::Suboptimal] {
            let mut backend = MockBackend::default();
            backend.presents.push_back(outcome);
            let mut frames = FrameLoop::new();

            assert_eq!(frames.render_frame(&mut backend).unwrap(), FrameOutcome::PresentedAndRebuilt);
            assert_eq!(backend.calls.last(), Some(&"rebuild"));
            assert_eq!(backend.rebuilds, 1);
        }
    }

    #[test]
    fn test_resize_request_rebuilds_once() {
        let mut backend = MockBackend {
            resize_pending: true,
            ..MockBackend::default()
        };
        let mut frames = FrameLoop::new();

        assert_eq!(frames.render_frame(&mut backend).unwrap(), FrameOutcome::PresentedAndRebuilt);
        assert_eq!(frames.render_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(backend.rebuilds, 1);
    }

    #[test]
    fn test_per_frame_data_is_written_after_idle_wait() {
        let mut backend = MockBackend::default();
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        let mut frames = FrameLoop::new();

        frames.render_frame(&mut backend).unwrap();
        frames.render_frame(&mut backend).unwrap();

        let waits: Vec<usize> = (0..backend.calls.len()).filter(|&i| backend.calls[i] == "wait").collect();
        assert_eq!(waits.len(), 2);
        for i in waits {
            assert_eq!(backend.calls[i + 1], "prepare");
        }
    }

    #[test]
    fn test_deferred_rebuild_is_not_counted() {
        let mut backend = MockBackend {
            defer_rebuild: true,
            ..MockBackend::default()
        };
        backend.acquires.push_back(AcquireOutcome::OutOfDate);
        backend.presents.push_back(PresentOutcome::OutOfDate);
        let mut frames = FrameLoop::new();

        assert_eq!(frames.render_frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert_eq!(frames.render_frame(&mut backend).unwrap(), FrameOutcome::PresentedAndRebuilt);
        assert_eq!(backend.rebuilds, 2);
        assert_eq!(
            frames.stats(),
            FrameStats {
                presented: 1,
                skipped: 1,
                rebuilds: 0
            }
        );

        backend.defer_rebuild = false;
        backend.resize_pending = true;
        frames.render_frame(&mut backend).unwrap();
        assert_eq!(frames.stats().rebuilds, 1);
    }

    #[test]
    fn test_submit_failure_is_fatal() {
        let mut backend = MockBackend {
            fail_submit: true,
            ..MockBackend::default()
        };
        let mut frames = FrameLoop::new();

        assert!(matches!(
            frames.render_frame(&mut backend),
            Err(VulkanError::Api {
                result: vk::Result::ERROR_DEVICE_LOST,
                ..
            })
        ));
        assert!(!backend.calls.contains(&"present"));
    }
}
