use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamilies};
use crate::renderer::contexts::device_ctx::single_use;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::util::VkResultExt;

/// Logical device, its queues and the memory allocator shared by every resource
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub name: String,
    pub families: QueueFamilies,

    pub graphics_queue: Queue,
    pub compute_queue: Queue,
    pub present_queue: Queue,

    /// Owns per-frame and single-use command buffers, on the graphics family
    pub command_pool: vk::CommandPool,
    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    instance: ash::Instance,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self> {
        let (physical_device, families) =
            Self::select_physical_device(&instance.instance, surface, surface_loader)?;
        let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown device".to_owned());
        log::info!(
            "Selected GPU: {} ({:?}), graphics/compute family {}, present family {}",
            name,
            properties.device_type,
            families.graphics,
            families.present,
        );

        let logical_device = Self::create_logical_device(&instance.instance, physical_device, &families)?;

        let graphics_queue = Queue::new(families.graphics, unsafe {
            logical_device.get_device_queue(families.graphics, 0)
        });
        let compute_queue = Queue::new(families.graphics, unsafe {
            logical_device.get_device_queue(families.graphics, families.compute_queue_index)
        });
        let present_queue = Queue::new(families.present, unsafe {
            logical_device.get_device_queue(families.present, 0)
        });
        if families.compute_queue_index > 0 {
            log::info!("Compute runs on a dedicated queue of the graphics family");
        }

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: false,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(families.graphics)
            // Allow the pool to reset individual command buffers
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { logical_device.create_command_pool(&command_pool_info, None) }
            .check(vk::ObjectType::COMMAND_POOL)?;

        Ok(Self {
            logical: Arc::new(logical_device),
            physical: physical_device,
            name,
            families,
            graphics_queue,
            compute_queue,
            present_queue,
            command_pool,
            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
            instance: instance.instance.clone(),
        })
    }

    pub fn allocator(&self) -> Arc<Mutex<Allocator>> {
        Arc::clone(&self.memory_allocator)
    }

    pub fn format_supports(&self, format: vk::Format, features: vk::FormatFeatureFlags) -> bool {
        unsafe { self.instance.get_physical_device_format_properties(self.physical, format) }
            .optimal_tiling_features
            .contains(features)
    }

    /// Runs commands on the graphics queue and waits for them to finish
    pub fn immediate_submit<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        single_use::immediate_submit(
            &self.logical,
            self.command_pool,
            self.graphics_queue.handle,
            func,
        )
    }

    pub fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        name: &str,
        location: MemoryLocation,
    ) -> Result<Buffer> {
        Buffer::new(size, usage, name, location, self.allocator(), self.logical.clone())
    }

    /// Device-local buffer filled through a host-visible staging copy
    pub fn create_buffer_with_data<T: bytemuck::Pod>(
        &self,
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<Buffer> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len().max(1) as u64;
        let mut staging = self.create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            &format!("{name} staging"),
            MemoryLocation::CpuToGpu,
        )?;
        staging.write(bytes, 0)?;

        let buffer = self.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            name,
            MemoryLocation::GpuOnly,
        )?;
        self.immediate_submit(|cmd, device| {
            let region = vk::BufferCopy::default().size(size);
            unsafe { device.cmd_copy_buffer(cmd, staging.buffer, buffer.buffer, &[region]) };
            Ok(())
        })?;
        Ok(buffer)
    }

    /// Nanoseconds per timestamp tick and the valid timestamp bits of the graphics family,
    /// or `None` when that family cannot write timestamps
    pub fn timestamp_support(&self) -> Option<(f32, u32)> {
        let period = unsafe { self.instance.get_physical_device_properties(self.physical) }
            .limits
            .timestamp_period;
        let families = unsafe { self.instance.get_physical_device_queue_family_properties(self.physical) };
        let valid_bits = families.get(self.families.graphics as usize)?.timestamp_valid_bits;
        (valid_bits > 0 && period > 0.0).then_some((period, valid_bits))
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.logical.device_wait_idle() }.check(vk::ObjectType::DEVICE)
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let req_device_exts = Self::get_required_device_extensions();

        let devices = unsafe { instance.enumerate_physical_devices() }
            .check(vk::ObjectType::PHYSICAL_DEVICE)?;

        devices
            .into_iter()
            // Filter out devices that do not contain the required device extensions
            .filter(|device| {
                let supported_extensions = unsafe {
                    instance.enumerate_device_extension_properties(*device)
                }
                .unwrap_or_default();
                req_device_exts.iter().all(|req_ext| {
                    let supported = supported_extensions
                        .iter()
                        .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *req_ext));
                    if !supported {
                        log::warn!("Device extension not supported: {:?}", req_ext);
                    }
                    supported
                })
            })
            // Filter out devices without a surface to present to
            .filter(|device| unsafe {
                let formats = surface_loader
                    .get_physical_device_surface_formats(*device, surface)
                    .unwrap_or_default();
                let modes = surface_loader
                    .get_physical_device_surface_present_modes(*device, surface)
                    .unwrap_or_default();
                !formats.is_empty() && !modes.is_empty()
            })
            // Filter out devices that do not contain the required queues
            .filter_map(|device| {
                let props = unsafe { instance.get_physical_device_queue_family_properties(device) };
                let families = QueueFamilies::select(&props, |index| unsafe {
                    surface_loader
                        .get_physical_device_surface_support(device, index, surface)
                        .unwrap_or(false)
                })?;
                Some((device, families))
            })
            .min_by_key(|(device, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                match props.device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                    vk::PhysicalDeviceType::CPU => 3,
                    _ => 4,
                }
            })
            .ok_or_eyre("No suitable physical device found")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: &QueueFamilies,
    ) -> Result<ash::Device> {
        let priorities = [1.0_f32, 1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .queues_per_family()
            .into_iter()
            .map(|(family, count)| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities[..count as usize])
            })
            .collect();

        let supported = unsafe { instance.get_physical_device_features(physical_device) };
        // Only request what the device has; pipelines needing the rest fail on their own
        let features = vk::PhysicalDeviceFeatures::default()
            .tessellation_shader(supported.tessellation_shader == vk::TRUE)
            .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE)
            .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE);

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &device_create_info, None) }
            .check(vk::ObjectType::DEVICE)
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            // Every resource holding an allocator clone is gone by now
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.logical.destroy_command_pool(self.command_pool, None);
            self.logical.destroy_device(None);
        }
    }
}
