//! Vulkan context management
//!
//! Instance creation with optional validation, physical device selection under the
//! renderer's capability contract, and logical device / queue creation.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::prelude::VkResult;
use ash::{vk, Device, Entry, Instance};
use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};
use std::panic::Location;
use thiserror::Error;

use crate::render::vulkan::surface::{Surface, SurfaceSupport};
use crate::render::vulkan::window::Window;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// A Vulkan call returned a failure status
    #[error("{call} failed with {result:?} at {location}")]
    Api {
        /// Name of the failing Vulkan entry point
        call: &'static str,
        /// Status returned by the call
        result: vk::Result,
        /// Source location of the call site
        location: &'static Location<'static>,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed or a required capability is missing
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Format lacks a feature the renderer needs
    #[error("Unsupported format: {0:?}")]
    UnsupportedFormat(vk::Format),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Converts raw Vulkan status results into [`VulkanError::Api`] at the call site
pub trait VkResultExt<T> {
    /// Attach the entry point name and caller location to a failed status
    fn check(self, call: &'static str) -> VulkanResult<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    #[track_caller]
    fn check(self, call: &'static str) -> VulkanResult<T> {
        let location = Location::caller();
        self.map_err(|result| VulkanError::Api { call, result, location })
    }
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance, optionally with the Khronos validation layer
    pub fn new(window: &Window, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        if enable_validation {
            check_validation_layer_support(&entry)?;
        }

        let app_name_cstr = CString::new(app_name)
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {e}")))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vk_renderer")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let required_extensions = window
            .get_required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {e}")))?;

        let cstr_extensions = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid extension name: {e}")))?;

        let mut extensions: Vec<*const c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names: Vec<*const c_char> = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }.check("vkCreateInstance")?;

        let debug_utils = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            Some((debug_utils, messenger))
        } else {
            None
        };

        log::info!(
            "Vulkan instance created ({} extensions, validation {})",
            extensions.len(),
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self { entry, instance, debug_utils })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .check("vkCreateDebugUtilsMessengerEXT")
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = &self.debug_utils {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn check_validation_layer_support(entry: &Entry) -> VulkanResult<()> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .check("vkEnumerateInstanceLayerProperties")?;

    let available = layers
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);

    if available {
        Ok(())
    } else {
        Err(VulkanError::InitializationFailed(
            "validation layers requested, but not available".to_string(),
        ))
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Graphics and present queue family indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the graphics queue family
    pub graphics: u32,
    /// Index of the presentation queue family
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Pick queue families, preferring one family that can both draw and present
    ///
    /// `present_support[i]` tells whether family `i` can present to the surface.
    pub fn find(families: &[vk::QueueFamilyProperties], present_support: &[bool]) -> Option<Self> {
        let is_graphics = |i: usize| {
            families[i].queue_count > 0 && families[i].queue_flags.contains(vk::QueueFlags::GRAPHICS)
        };
        let can_present = |i: usize| present_support.get(i).copied().unwrap_or(false);

        if let Some(combined) = (0..families.len()).find(|&i| is_graphics(i) && can_present(i)) {
            return Some(Self {
                graphics: combined as u32,
                present: combined as u32,
            });
        }

        let graphics = (0..families.len()).find(|&i| is_graphics(i))?;
        let present = (0..families.len()).find(|&i| can_present(i))?;
        Some(Self {
            graphics: graphics as u32,
            present: present as u32,
        })
    }

    /// Whether drawing and presentation happen on different families
    pub fn is_split(&self) -> bool {
        self.graphics != self.present
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Chosen queue families
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Select the first physical device that satisfies the renderer's requirements
    pub fn select_suitable_device(
        instance: &Instance,
        surface: &Surface,
        require_anisotropy: bool,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }.check("vkEnumeratePhysicalDevices")?;

        for device in devices {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy();

            match Self::evaluate_device(instance, device, surface, require_anisotropy) {
                Ok(info) => {
                    log::info!("Selected GPU: {}", name);
                    return Ok(info);
                }
                Err(e) => log::debug!("Skipping GPU {}: {}", name, e),
            }
        }

        Err(VulkanError::InitializationFailed("No suitable GPU found".to_string()))
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: &Surface,
        require_anisotropy: bool,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        if require_anisotropy && features.sampler_anisotropy == vk::FALSE {
            return Err(VulkanError::InitializationFailed(
                "sampler anisotropy not supported".to_string(),
            ));
        }

        let present_support = (0..families.len() as u32)
            .map(|index| surface.supports_present(device, index))
            .collect::<VulkanResult<Vec<_>>>()?;

        let queue_families = QueueFamilyIndices::find(&families, &present_support).ok_or_else(|| {
            VulkanError::InitializationFailed("No graphics and present queue families found".to_string())
        })?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .check("vkEnumerateDeviceExtensionProperties")?;

        let required_extensions = [SwapchainLoader::name()];
        let has_required_extensions = required_extensions.iter().all(|required| {
            extensions.iter().any(|available| {
                let extension_name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                extension_name == *required
            })
        });

        if !has_required_extensions {
            return Err(VulkanError::InitializationFailed(
                "Required device extensions not supported".to_string(),
            ));
        }

        let support = SurfaceSupport::query(surface, device)?;
        if !support.is_adequate() {
            return Err(VulkanError::InitializationFailed(
                "Surface reports no formats or present modes".to_string(),
            ));
        }

        Ok(Self {
            device,
            properties,
            features,
            memory_properties,
            queue_families,
        })
    }

    /// Human readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
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
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create a new logical device with one queue per distinct family
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
        enable_anisotropy: bool,
    ) -> VulkanResult<Self> {
        let families = physical_device_info.queue_families;
        let unique_families: HashSet<u32> = [families.graphics, families.present].into_iter().collect();

        let priorities = [1.0];
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
            .sampler_anisotropy(enable_anisotropy)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe { instance.create_device(physical_device_info.device, &create_info, None) }
            .check("vkCreateDevice")?;

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Device context owning the instance, surface, selected GPU and logical device
///
/// Fields drop top to bottom: the logical device goes first, the instance last.
pub struct VulkanContext {
    device: LogicalDevice,
    surface: Surface,
    physical_device: PhysicalDeviceInfo,
    anisotropy_enabled: bool,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a new Vulkan context for the window
    ///
    /// `anisotropy_requested` makes sampler anisotropy part of the device contract.
    pub fn new(
        window: &mut Window,
        app_name: &str,
        enable_validation: bool,
        anisotropy_requested: bool,
    ) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, app_name, enable_validation)?;

        let surface = Surface::new(&instance.entry, &instance.instance, window)?;

        let physical_device =
            PhysicalDeviceInfo::select_suitable_device(&instance.instance, &surface, anisotropy_requested)?;

        let anisotropy_enabled = anisotropy_requested && physical_device.features.sampler_anisotropy == vk::TRUE;
        let device = LogicalDevice::new(&instance.instance, &physical_device, anisotropy_enabled)?;

        log::info!(
            "Logical device ready (graphics family {}, present family {})",
            physical_device.queue_families.graphics,
            physical_device.queue_families.present
        );

        Ok(Self {
            device,
            surface,
            physical_device,
            anisotropy_enabled,
            instance,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the rendering surface
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Get the swapchain loader
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.device.swapchain_loader
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Get the chosen queue families
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.physical_device.queue_families
    }

    /// Whether sampler anisotropy was enabled on the logical device
    pub fn anisotropy_enabled(&self) -> bool {
        self.anisotropy_enabled
    }

    /// Block until the whole device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle() }.check("vkDeviceWaitIdle")
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
    fn test_prefers_combined_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let present = [false, true, true];

        let indices = QueueFamilyIndices::find(&families, &present).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 2, present: 2 });
        assert!(!indices.is_split());
    }

    #[test]
    fn test_accepts_separate_families() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let present = [false, true];

        let indices = QueueFamilyIndices::find(&families, &present).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 0, present: 1 });
        assert!(indices.is_split());
    }

    #[test]
    fn test_missing_present_family_rejected() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        assert!(QueueFamilyIndices::find(&families, &[false]).is_none());
    }

    #[test]
    fn test_api_error_reports_call_and_location() {
        let result: VkResult<()> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = result.check("vkQueueSubmit").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("vkQueueSubmit"));
        assert!(message.contains("ERROR_DEVICE_LOST"));
        assert!(message.contains("context.rs"));
    }
}
