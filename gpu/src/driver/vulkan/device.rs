//! Vulkan physical and logical device management.

use std::ffi::CStr;

use ash::vk;

use crate::error::GraphicsError;

/// Queue families the driver submits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    /// Graphics + present family.
    pub graphics: u32,
    /// Compute family. Equal to `graphics` when no dedicated family exists.
    pub compute: u32,
    /// Queue index of the compute queue inside its family.
    pub compute_index: u32,
}

impl QueueFamilies {
    /// Distinct family indices, for concurrent sharing.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.compute {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.compute]
        }
    }

    /// Whether compute shares the graphics queue itself.
    pub fn shares_graphics_queue(&self) -> bool {
        self.graphics == self.compute && self.compute_index == 0
    }
}

/// Optional features the selected device supports.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalFeatures {
    pub sampler_anisotropy: bool,
    pub pipeline_statistics: bool,
}

/// A physical device that passed selection.
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub families: QueueFamilies,
    pub features: OptionalFeatures,
}

/// Select the best physical device for rendering.
///
/// Devices without timeline semaphores or dynamic rendering are skipped, as
/// are devices whose graphics family cannot present to `surface`. Discrete
/// GPUs are preferred over integrated ones.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
) -> Result<SelectedDevice, GraphicsError> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        GraphicsError::InitializationFailed(format!(
            "Failed to enumerate physical devices: {:?}",
            e
        ))
    })?;

    if devices.is_empty() {
        return Err(GraphicsError::InitializationFailed(
            "No Vulkan-capable GPU found".to_string(),
        ));
    }

    let mut best: Option<(u32, SelectedDevice)> = None;

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };

        if !supports_required_features(instance, device) {
            log::info!("Skipping GPU {:?}: missing timeline semaphores or dynamic rendering", device_name);
            continue;
        }

        let Some(families) = find_queue_families(instance, device, surface) else {
            log::info!("Skipping GPU {:?}: no usable graphics queue", device_name);
            continue;
        };

        let features = unsafe { instance.get_physical_device_features(device) };

        let mut score = 1;
        if properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += 1000;
        } else if properties.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU {
            score += 100;
        }
        if families.graphics != families.compute {
            score += 10;
        }
        score += properties.limits.max_image_dimension2_d / 1024;

        log::info!(
            "Found GPU: {:?} (type: {:?}, score: {})",
            device_name,
            properties.device_type,
            score
        );

        if best.as_ref().is_none_or(|(best_score, _)| score > *best_score) {
            best = Some((
                score,
                SelectedDevice {
                    physical_device: device,
                    properties,
                    families,
                    features: OptionalFeatures {
                        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
                        pipeline_statistics: features.pipeline_statistics_query == vk::TRUE,
                    },
                },
            ));
        }
    }

    best.map(|(_, device)| device)
        .ok_or_else(|| GraphicsError::InitializationFailed("No suitable GPU found".to_string()))
}

fn supports_required_features(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let has_dynamic_rendering_ext = unsafe { instance.enumerate_device_extension_properties(device) }
        .map(|extensions| {
            extensions.iter().any(|ext| {
                // SAFETY: extension names are null-terminated strings from the driver
                let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                name == ash::khr::dynamic_rendering::NAME
            })
        })
        .unwrap_or(false);
    if !has_dynamic_rendering_ext {
        return false;
    }

    let mut vulkan_12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeaturesKHR::default();
    let mut features = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut vulkan_12)
        .push_next(&mut dynamic_rendering);
    unsafe { instance.get_physical_device_features2(device, &mut features) };

    vulkan_12.timeline_semaphore == vk::TRUE && dynamic_rendering.dynamic_rendering == vk::TRUE
}

/// Find the graphics family and the best compute family.
///
/// A compute-only family wins; otherwise a second queue of the graphics
/// family; otherwise the graphics queue itself.
pub fn find_queue_families(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    surface: Option<(&ash::khr::surface::Instance, vk::SurfaceKHR)>,
) -> Option<QueueFamilies> {
    let queue_families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let can_present = |index: u32| match surface {
        Some((loader, surface)) => unsafe {
            loader.get_physical_device_surface_support(physical_device, index, surface)
        }
        .unwrap_or(false),
        None => true,
    };

    let graphics = queue_families
        .iter()
        .enumerate()
        .find(|(index, family)| {
            family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && can_present(*index as u32)
        })
        .map(|(index, _)| index as u32)?;

    let dedicated_compute = queue_families.iter().enumerate().find(|(_, family)| {
        family.queue_flags.contains(vk::QueueFlags::COMPUTE)
            && !family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    });

    let families = match dedicated_compute {
        Some((index, _)) => QueueFamilies {
            graphics,
            compute: index as u32,
            compute_index: 0,
        },
        None => QueueFamilies {
            graphics,
            compute: graphics,
            compute_index: u32::from(queue_families[graphics as usize].queue_count > 1),
        },
    };
    Some(families)
}

/// Create a logical device with required features and extensions.
pub fn create_logical_device(
    instance: &ash::Instance,
    selected: &SelectedDevice,
    with_swapchain: bool,
) -> Result<ash::Device, GraphicsError> {
    let families = selected.families;
    let priorities = [1.0f32, 1.0f32];

    let mut queue_create_infos = vec![
        vk::DeviceQueueCreateInfo::default()
            .queue_family_index(families.graphics)
            .queue_priorities(if families.graphics == families.compute {
                &priorities[..=families.compute_index as usize]
            } else {
                &priorities[..1]
            }),
    ];
    if families.graphics != families.compute {
        queue_create_infos.push(
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(families.compute)
                .queue_priorities(&priorities[..1]),
        );
    }

    let mut device_extensions = vec![ash::khr::dynamic_rendering::NAME.as_ptr()];
    if with_swapchain {
        device_extensions.push(ash::khr::swapchain::NAME.as_ptr());
    }

    let features = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(selected.features.sampler_anisotropy)
        .pipeline_statistics_query(selected.features.pipeline_statistics);

    let mut vulkan_12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
    let mut dynamic_rendering =
        vk::PhysicalDeviceDynamicRenderingFeaturesKHR::default().dynamic_rendering(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&device_extensions)
        .enabled_features(&features)
        .push_next(&mut vulkan_12)
        .push_next(&mut dynamic_rendering);

    unsafe { instance.create_device(selected.physical_device, &create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create logical device: {:?}", e))
    })
}
