//! Swapchain creation, image acquisition and presentation.

use std::sync::atomic::Ordering;

use ash::vk;
use ash::vk::Handle as VkHandle;

use crate::driver::{AcquiredImage, DriverStatus, NativeHandle, SwapchainInfo};
use crate::error::GraphicsError;
use crate::types::Extent2d;

use super::conversion::{convert_result, creation_error, texture_format_from_vk};
use super::{SwapchainRecord, VulkanDriver, native, raw};

/// Formats tried in order; the first the surface offers wins.
const PREFERRED_FORMATS: [vk::Format; 4] = [
    vk::Format::B8G8R8A8_SRGB,
    vk::Format::R8G8B8A8_SRGB,
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::R8G8B8A8_UNORM,
];

impl VulkanDriver {
    pub(super) fn build_swapchain(
        &self,
        old: Option<NativeHandle>,
    ) -> Result<SwapchainInfo, GraphicsError> {
        let (Some(surface), Some(loader)) = (&self.surface, &self.swapchain_loader) else {
            return Err(GraphicsError::FeatureNotSupported(
                "swapchain requested on a headless driver".into(),
            ));
        };

        let capabilities = unsafe {
            surface
                .loader
                .get_physical_device_surface_capabilities(self.physical_device, surface.surface)
        }
        .map_err(|e| match e {
            vk::Result::ERROR_SURFACE_LOST_KHR => GraphicsError::SurfaceLost,
            other => creation_error("surface capabilities", other),
        })?;

        let formats = unsafe {
            surface
                .loader
                .get_physical_device_surface_formats(self.physical_device, surface.surface)
        }
        .map_err(|e| creation_error("surface formats", e))?;

        let (surface_format, format) = PREFERRED_FORMATS
            .iter()
            .find_map(|preferred| {
                formats
                    .iter()
                    .find(|f| f.format == *preferred)
                    .and_then(|f| Some((*f, texture_format_from_vk(f.format)?)))
            })
            .or_else(|| {
                formats
                    .iter()
                    .find_map(|f| Some((*f, texture_format_from_vk(f.format)?)))
            })
            .ok_or_else(|| {
                GraphicsError::FeatureNotSupported("no supported surface format".into())
            })?;

        // FIFO is always available.
        let present_mode = vk::PresentModeKHR::FIFO;

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            let requested = *surface.extent.lock();
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
        if extent.width == 0 || extent.height == 0 {
            return Err(GraphicsError::SurfaceOutdated);
        }

        // Prefer triple buffering.
        let image_count = (capabilities.min_image_count + 1).min(
            if capabilities.max_image_count > 0 {
                capabilities.max_image_count
            } else {
                u32::MAX
            },
        );

        let old_swapchain = old.map_or(vk::SwapchainKHR::null(), raw);
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            )
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None) }.map_err(|e| match e {
            vk::Result::ERROR_SURFACE_LOST_KHR => GraphicsError::SurfaceLost,
            other => creation_error("swapchain", other),
        })?;

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(creation_error("swapchain images", e));
            }
        };

        let mut views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            match unsafe { self.device.create_image_view(&view_info, None) } {
                Ok(view) => views.push(view),
                Err(e) => {
                    unsafe {
                        for view in views {
                            self.device.destroy_image_view(view, None);
                        }
                        loader.destroy_swapchain(swapchain, None);
                    }
                    return Err(creation_error("swapchain image view", e));
                }
            }
        }

        let image_count = images.len() as u32;
        self.swapchains
            .write()
            .insert(swapchain.as_raw(), SwapchainRecord { images, views });
        self.current_swapchain
            .store(swapchain.as_raw(), Ordering::Release);

        log::info!(
            "Vulkan: created swapchain {}x{} {:?} with {} images",
            extent.width,
            extent.height,
            format,
            image_count
        );

        Ok(SwapchainInfo {
            handle: native(swapchain),
            image_count,
            format,
            extent: Extent2d::new(extent.width, extent.height),
        })
    }

    pub(super) fn release_swapchain(&self, swapchain: NativeHandle) {
        let Some(loader) = &self.swapchain_loader else {
            return;
        };
        if let Some(record) = self.swapchains.write().remove(&swapchain.as_raw()) {
            self.render_passes.evict_views(&self.device, &record.views);
            for view in record.views {
                unsafe { self.device.destroy_image_view(view, None) };
            }
        }
        let _ = self.current_swapchain.compare_exchange(
            swapchain.as_raw(),
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        unsafe { loader.destroy_swapchain(raw(swapchain), None) };
    }

    pub(super) fn acquire_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
    ) -> Result<AcquiredImage, DriverStatus> {
        let Some(loader) = &self.swapchain_loader else {
            return Err(DriverStatus::SurfaceLost);
        };
        let (index, suboptimal) = unsafe {
            loader.acquire_next_image(swapchain, u64::MAX, signal, vk::Fence::null())
        }
        .map_err(convert_result)?;
        Ok(AcquiredImage { index, suboptimal })
    }

    pub(super) fn present_image(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> DriverStatus {
        let Some(loader) = &self.swapchain_loader else {
            return DriverStatus::SurfaceLost;
        };
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let _queue_guard = self.queue_lock.lock();
        match unsafe { loader.queue_present(self.graphics_queue, &present_info) } {
            Ok(false) => DriverStatus::Success,
            Ok(true) => DriverStatus::Suboptimal,
            Err(e) => convert_result(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextureFormat;

    #[test]
    fn test_preferred_formats_map_to_texture_formats() {
        for format in PREFERRED_FORMATS {
            assert!(texture_format_from_vk(format).is_some());
        }
        assert_eq!(
            texture_format_from_vk(PREFERRED_FORMATS[0]),
            Some(TextureFormat::Bgra8UnormSrgb)
        );
    }
}
