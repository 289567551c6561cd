// Vulkan instance and presentation surface
//
// Responsibilities:
// - Loading the Vulkan library
// - Instance creation with validation layers filtered against what is installed
// - Debug messenger routing validation output into `log`
// - Platform surface creation for a window

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use crate::platform::Window;

const STANDARD_VALIDATION: [&str; 2] = ["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_monitor"];

const EXTENDED_VALIDATION: [&str; 4] = [
    "VK_LAYER_KHRONOS_validation",
    "VK_LAYER_RENDERDOC_capture",
    "VK_LAYER_LUNARG_api_dump",
    "VK_LAYER_LUNARG_monitor",
];

/// Vulkan instance with automatic cleanup
pub struct Instance {
    pub entry: Entry,
    pub instance: ash::Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    pub fn validation_enabled(&self) -> bool {
        self.debug_utils.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan instance...");
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    application_name: String,
    validation_layers: Vec<String>,
    extensions: Vec<CString>,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self {
            application_name: "vk-scaffold".to_string(),
            validation_layers: Vec::new(),
            extensions: Vec::new(),
        }
    }
}

impl InstanceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_application_name(mut self, name: &str) -> Self {
        self.application_name = name.to_string();
        self
    }

    /// Request validation layers. Layers missing on this system are dropped
    /// with a warning when the instance is built.
    pub fn set_validation_layers<S: AsRef<str>>(mut self, layers: &[S]) -> Self {
        self.validation_layers = layers.iter().map(|l| l.as_ref().to_string()).collect();
        self
    }

    pub fn set_standard_validation(self) -> Self {
        self.set_validation_layers(&STANDARD_VALIDATION)
    }

    pub fn set_extended_validation(self) -> Self {
        self.set_validation_layers(&EXTENDED_VALIDATION)
    }

    pub fn set_enabled_extensions(mut self, extensions: &[&CStr]) -> Self {
        self.extensions = extensions.iter().map(|&e| e.to_owned()).collect();
        self
    }

    pub fn build(&self) -> Result<Arc<Instance>> {
        log::info!("Creating Vulkan instance: {}", self.application_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let available: Vec<String> = entry
            .enumerate_instance_layer_properties()?
            .iter()
            .map(|props| {
                unsafe { CStr::from_ptr(props.layer_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        let (supported, missing) = split_supported_layers(&self.validation_layers, &available);
        for layer in missing {
            log::warn!("Layer not found: {}", layer);
        }

        let layer_names = supported
            .iter()
            .map(|&layer| CString::new(layer))
            .collect::<Result<Vec<_>, _>>()?;
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|l| l.as_ptr()).collect();

        let validation = !layer_names.is_empty();
        let mut extensions: Vec<*const c_char> =
            self.extensions.iter().map(|e| e.as_ptr()).collect();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let app_name = CString::new(self.application_name.as_str())?;
        let engine_name = CString::new("vk-scaffold")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        let debug_utils = if validation {
            log::info!("Validation layers: {:?}", supported);
            match setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Arc::new(Instance {
            entry,
            instance,
            debug_utils,
        }))
    }
}

/// Split the requested layers into (available, missing), preserving order.
fn split_supported_layers<'a>(
    requested: &'a [String],
    available: &[String],
) -> (Vec<&'a str>, Vec<&'a str>) {
    requested
        .iter()
        .map(String::as_str)
        .partition(|layer| available.iter().any(|a| a == layer))
}

fn setup_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = DebugUtils::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .context("CreateDebugUtilsMessenger unsuccessful")?;

    Ok((debug_utils, messenger))
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Validation] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Validation] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Validation] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

/// Presentation surface. Holds the instance so it is destroyed first.
pub struct Surface {
    pub handle: vk::SurfaceKHR,
    pub loader: khr::Surface,
    _instance: Arc<Instance>,
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
    }
}

pub struct SurfaceBuilder;

impl SurfaceBuilder {
    pub fn build(instance: &Arc<Instance>, window: &Window) -> Result<Arc<Surface>> {
        let (display_handle, window_handle) = window.raw_handles()?;

        let handle = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display_handle,
                window_handle,
                None,
            )
        }
        .context("Unable to create window surface")?;

        let loader = khr::Surface::new(&instance.entry, &instance.instance);

        Ok(Arc::new(Surface {
            handle,
            loader,
            _instance: instance.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_layers_are_dropped_in_order() {
        let requested = names(&EXTENDED_VALIDATION);
        let available = names(&["VK_LAYER_LUNARG_monitor", "VK_LAYER_KHRONOS_validation"]);

        let (supported, missing) = split_supported_layers(&requested, &available);

        assert_eq!(supported, vec!["VK_LAYER_KHRONOS_validation", "VK_LAYER_LUNARG_monitor"]);
        assert_eq!(missing, vec!["VK_LAYER_RENDERDOC_capture", "VK_LAYER_LUNARG_api_dump"]);
    }

    #[test]
    fn no_layers_installed_disables_validation() {
        let requested = names(&STANDARD_VALIDATION);
        let (supported, missing) = split_supported_layers(&requested, &[]);

        assert!(supported.is_empty());
        assert_eq!(missing.len(), 2);
    }

    #[test]
    fn builder_keeps_requested_extensions() {
        let builder = InstanceBuilder::new()
            .set_application_name("test")
            .set_enabled_extensions(&[khr::Surface::name()]);

        assert_eq!(builder.extensions.len(), 1);
        assert_eq!(builder.extensions[0].as_c_str(), khr::Surface::name());
        assert_eq!(builder.application_name, "test");
    }
}
