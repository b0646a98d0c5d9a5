// Synchronization primitives
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync
// Critical for correct and efficient multi-frame rendering

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    /// Signalled by acquire, waited on by the submit
    pub image_available: vk::Semaphore,
    /// Signalled by the submit, waited on by present
    pub render_finished: vk::Semaphore,
    /// Signalled when the GPU is done with this slot's command buffer
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        unsafe {
            Ok(Self {
                image_available: device
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create semaphore")?,
                render_finished: device
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .context("Failed to create semaphore")?,
                in_flight_fence: device
                    .device
                    .create_fence(&fence_info, None)
                    .context("Failed to create fence")?,
            })
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}

/// Index of the frame-in-flight slot, cycling through a fixed count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounter {
    index: usize,
    count: usize,
}

impl FrameCounter {
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 {
            anyhow::bail!("At least one frame in flight is required");
        }
        Ok(Self { index: 0, count })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.count;
    }
}

/// The sync slots of all frames in flight plus which one is current
pub struct FramesInFlight {
    frames: Vec<FrameSync>,
    counter: FrameCounter,
}

impl FramesInFlight {
    pub fn new(device: &VulkanDevice, count: usize) -> Result<Self> {
        let counter = FrameCounter::new(count)?;
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            match FrameSync::new(device) {
                Ok(sync) => frames.push(sync),
                Err(e) => {
                    for sync in &frames {
                        sync.destroy(&device.device);
                    }
                    return Err(e);
                }
            }
        }

        log::debug!("Created sync objects for {} frames in flight", count);
        Ok(Self { frames, counter })
    }

    pub fn index(&self) -> usize {
        self.counter.index()
    }

    pub fn count(&self) -> usize {
        self.counter.count()
    }

    pub fn current(&self) -> &FrameSync {
        &self.frames[self.counter.index()]
    }

    /// Block until the GPU has finished the last submit that used this slot
    pub fn wait_current(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.wait_for_fences(&[self.current().in_flight_fence], true, u64::MAX) }
            .context("Failed to wait for in-flight fence")
    }

    /// Unsignal the current fence; only once a submit is certain to follow
    pub fn reset_current(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_fences(&[self.current().in_flight_fence]) }
            .context("Failed to reset in-flight fence")
    }

    pub fn advance(&mut self) {
        self.counter.advance();
    }

    pub fn destroy(&self, device: &ash::Device) {
        for sync in &self.frames {
            sync.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_buffering_alternates() {
        let mut counter = FrameCounter::new(2).unwrap();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(counter.index());
            counter.advance();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn single_frame_stays_at_zero() {
        let mut counter = FrameCounter::new(1).unwrap();
        counter.advance();
        counter.advance();
        assert_eq!(counter.index(), 0);
    }

    #[test]
    fn triple_buffering_wraps_after_three() {
        let mut counter = FrameCounter::new(3).unwrap();
        for _ in 0..3 {
            counter.advance();
        }
        assert_eq!(counter.index(), 0);
        assert_eq!(counter.count(), 3);
    }

    #[test]
    fn zero_frames_is_rejected() {
        assert!(FrameCounter::new(0).is_err());
    }
}
