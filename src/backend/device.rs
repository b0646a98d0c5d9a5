// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (prefer discrete GPU, must present to our surface)
// - Logical device + queue creation
// - Memory allocator setup

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use super::{Surface, VulkanInstance};

/// Queue families used for drawing and presenting; often the same family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// Pick queue families: one family doing both if there is one, otherwise
/// the first graphics family and the first present family.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<QueueFamilies> {
    let mut graphics = None;
    let mut present = None;

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        let has_graphics =
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let has_present = supports_present(index);

        if has_graphics && has_present {
            return Some(QueueFamilies {
                graphics: index,
                present: index,
            });
        }
        if has_graphics && graphics.is_none() {
            graphics = Some(index);
        }
        if has_present && present.is_none() {
            present = Some(index);
        }
    }

    Some(QueueFamilies {
        graphics: graphics?,
        present: present?,
    })
}

/// Preference among suitable GPUs, higher wins
pub fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
        vk::PhysicalDeviceType::CPU => 2,
        _ => 1,
    }
}

/// Highest ranked candidate; ties go to the one enumerated first
pub fn pick_best<T>(candidates: impl IntoIterator<Item = (T, vk::PhysicalDeviceType)>) -> Option<T> {
    let mut best: Option<(T, u32)> = None;
    for (candidate, device_type) in candidates {
        let score = device_type_rank(device_type);
        if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

struct Candidate {
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilies,
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Dropped by hand before the device is destroyed
    allocator: ManuallyDrop<Mutex<Allocator>>,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: Arc<VulkanInstance>,

    // Queue handles
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub queue_families: QueueFamilies,

    // Device properties (cached for performance)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub sampler_anisotropy: bool,
}

impl VulkanDevice {
    /// Create Vulkan device able to present to `surface`
    pub fn new(instance: Arc<VulkanInstance>, surface: &Surface) -> Result<Arc<Self>> {
        // Step 1: Pick physical device (GPU)
        let Candidate {
            physical_device,
            queue_families,
        } = Self::pick_physical_device(&instance.instance, surface)?;

        // Step 2: Cache device properties
        let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        let memory_properties = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(physical_device)
        };
        let features = unsafe { instance.instance.get_physical_device_features(physical_device) };
        let sampler_anisotropy = features.sampler_anisotropy == vk::TRUE;

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: graphics={} present={}",
            queue_families.graphics,
            queue_families.present
        );

        // Step 3: Create logical device
        let device = Self::create_logical_device(
            &instance.instance,
            physical_device,
            &queue_families,
            sampler_anisotropy,
        )?;
        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };

        // Step 4: Create memory allocator
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create memory allocator")?;

        Ok(Arc::new(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            device,
            physical_device,
            instance,
            graphics_queue,
            present_queue,
            queue_families,
            properties,
            memory_properties,
            sampler_anisotropy,
        }))
    }

    fn pick_physical_device(instance: &ash::Instance, surface: &Surface) -> Result<Candidate> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let candidates = devices.into_iter().filter_map(|physical_device| {
            let props = unsafe { instance.get_physical_device_properties(physical_device) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

            if !Self::supports_swapchain(instance, physical_device) {
                log::debug!("Skipping {}: no VK_KHR_swapchain", name);
                return None;
            }

            let queue_families = unsafe {
                instance.get_physical_device_queue_family_properties(physical_device)
            };
            let Some(queue_families) = find_queue_families(&queue_families, |family| {
                surface.supports_queue_family(physical_device, family)
            }) else {
                log::debug!("Skipping {}: cannot draw and present to this window", name);
                return None;
            };

            Some((
                Candidate {
                    physical_device,
                    queue_families,
                },
                props.device_type,
            ))
        });

        pick_best(candidates).context("No suitable GPU found")
    }

    fn supports_swapchain(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> bool {
        let extensions =
            match unsafe { instance.enumerate_device_extension_properties(physical_device) } {
                Ok(extensions) => extensions,
                Err(_) => return false,
            };

        let wanted = ash::extensions::khr::Swapchain::name();
        extensions
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == wanted)
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilies,
        sampler_anisotropy: bool,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions = [ash::extensions::khr::Swapchain::name().as_ptr()];

        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(sampler_anisotropy);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")
    }

    /// Lock the allocator for creating or freeing memory
    pub fn allocator(&self) -> parking_lot::MutexGuard<'_, Allocator> {
        self.allocator.lock()
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")?;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order; the instance Arc is released afterwards
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
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
    fn prefers_a_family_that_does_both() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        // family 1 and 2 can present
        let found = find_queue_families(&families, |i| i >= 1).unwrap();
        assert_eq!(
            found,
            QueueFamilies {
                graphics: 2,
                present: 2
            }
        );
        assert!(found.is_shared());
        assert_eq!(found.unique(), vec![2]);
    }

    #[test]
    fn falls_back_to_separate_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let found = find_queue_families(&families, |i| i == 1).unwrap();
        assert_eq!(
            found,
            QueueFamilies {
                graphics: 0,
                present: 1
            }
        );
        assert!(!found.is_shared());
        assert_eq!(found.unique(), vec![0, 1]);
    }

    #[test]
    fn no_present_support_means_no_families() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(find_queue_families(&families, |_| false), None);
    }

    #[test]
    fn no_graphics_means_no_families() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        assert_eq!(find_queue_families(&families, |_| true), None);
    }

    #[test]
    fn empty_families_are_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let found = find_queue_families(&families, |_| true).unwrap();
        assert_eq!(found.graphics, 1);
    }

    #[test]
    fn discrete_beats_integrated() {
        let picked = pick_best([
            ("integrated", vk::PhysicalDeviceType::INTEGRATED_GPU),
            ("discrete", vk::PhysicalDeviceType::DISCRETE_GPU),
            ("cpu", vk::PhysicalDeviceType::CPU),
        ]);
        assert_eq!(picked, Some("discrete"));
    }

    #[test]
    fn first_device_wins_a_tie() {
        let picked = pick_best([
            ("first", vk::PhysicalDeviceType::INTEGRATED_GPU),
            ("second", vk::PhysicalDeviceType::INTEGRATED_GPU),
        ]);
        assert_eq!(picked, Some("first"));
    }

    #[test]
    fn any_device_is_better_than_none() {
        assert_eq!(pick_best([(7, vk::PhysicalDeviceType::OTHER)]), Some(7));
        assert_eq!(pick_best(Vec::<(u8, vk::PhysicalDeviceType)>::new()), None);
    }
}
