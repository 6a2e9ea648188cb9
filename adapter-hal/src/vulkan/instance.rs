use std::{
    ffi::{c_void, CStr, CString},
    sync::Arc,
    thread,
};

use ash::{ext, khr, vk};

use super::{
    extensions::{InstanceExtension, InstanceExtensionSet},
    info,
};
use adapter_types as adt;

unsafe extern "system" fn debug_utils_messenger_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data_ptr: *const vk::DebugUtilsMessengerCallbackDataEXT,
    user_data: *mut c_void,
) -> vk::Bool32 {
    use std::borrow::Cow;

    if thread::panicking() {
        return vk::FALSE;
    }

    let cd = unsafe { &*callback_data_ptr };
    let user_data = unsafe { &*user_data.cast::<super::DebugUtilsMessengerUserData>() };

    const VUID_VKCMDENDDEBUGUTILSLABELEXT_COMMANDBUFFER_01912: i32 = 0x56146426;
    if cd.message_id_number == VUID_VKCMDENDDEBUGUTILSLABELEXT_COMMANDBUFFER_01912 {
        // https://github.com/KhronosGroup/Vulkan-ValidationLayers/issues/5671
        // Versions 1.3.240 through 1.3.250 return a spurious error here if
        // the debug range start and end appear in different command buffers.
        const KHRONOS_VALIDATION_LAYER: &CStr =
            unsafe { CStr::from_bytes_with_nul_unchecked(b"Khronos Validation Layer\0") };
        if let Some(layer_properties) = user_data.validation_layer_properties.as_ref() {
            if layer_properties.layer_description.as_ref() == KHRONOS_VALIDATION_LAYER
                && layer_properties.layer_spec_version >= vk::make_api_version(0, 1, 3, 240)
                && layer_properties.layer_spec_version <= vk::make_api_version(0, 1, 3, 250)
            {
                return vk::FALSE;
            }
        }
    }

    // Silence Vulkan Validation error "VUID-VkSwapchainCreateInfoKHR-pNext-07781"
    // This happens when a surface is configured with a size outside the allowed extent.
    // It's a false positive due to the inherent racy-ness of surface resizing.
    const VUID_VKSWAPCHAINCREATEINFOKHR_PNEXT_07781: i32 = 0x4c8929c1;
    if cd.message_id_number == VUID_VKSWAPCHAINCREATEINFOKHR_PNEXT_07781 {
        return vk::FALSE;
    }

    // Silence Vulkan Validation error "VUID-VkRenderPassBeginInfo-framebuffer-04627"
    // if the OBS layer is enabled. This is a bug in the OBS layer. As the OBS layer
    // does not have a version number they increment, there is no way to qualify the
    // suppression of the error to a specific version of the OBS layer.
    //
    // See https://github.com/obsproject/obs-studio/issues/9353
    const VUID_VKRENDERPASSBEGININFO_FRAMEBUFFER_04627: i32 = 0x45125641;
    if cd.message_id_number == VUID_VKRENDERPASSBEGININFO_FRAMEBUFFER_04627
        && user_data.has_obs_layer
    {
        return vk::FALSE;
    }

    let level = match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::Level::Debug,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        _ => log::Level::Warn,
    };

    let message_id_name =
        unsafe { cd.message_id_name_as_c_str() }.map_or(Cow::Borrowed(""), CStr::to_string_lossy);
    let message = unsafe { cd.message_as_c_str() }.map_or(Cow::Borrowed(""), CStr::to_string_lossy);

    let _ = std::panic::catch_unwind(|| {
        log::log!(
            level,
            "{:?} [{} (0x{:x})]\n\t{}",
            message_type,
            message_id_name,
            cd.message_id_number,
            message,
        );
    });

    vk::FALSE
}

impl super::DebugUtilsCreateInfo {
    fn to_vk_create_info(&self) -> vk::DebugUtilsMessengerCreateInfoEXT<'_> {
        let user_data_ptr: *const super::DebugUtilsMessengerUserData = &*self.callback_data;
        vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(self.severity)
            .message_type(self.message_type)
            .user_data(user_data_ptr as *mut _)
            .pfn_user_callback(Some(debug_utils_messenger_callback))
    }
}

impl super::InstanceShared {
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    pub fn raw_instance(&self) -> &ash::Instance {
        &self.raw
    }

    pub fn instance_api_version(&self) -> u32 {
        self.instance_api_version
    }

    /// The canonical instance extension set: what was enabled, plus what the
    /// instance API version promises, closed under dependency.
    pub fn extensions(&self) -> &InstanceExtensionSet {
        &self.extensions
    }
}

impl super::Instance {
    pub fn shared_instance(&self) -> &super::InstanceShared {
        &self.shared
    }

    /// Returns the instance extensions this backend would like to enable for
    /// the given flags and discovery strategy, closed under dependency but
    /// not yet intersected with what the loader offers.
    fn desired_extensions(
        flags: adt::InstanceFlags,
        discovery_strategy: adt::DiscoveryStrategy,
    ) -> InstanceExtensionSet {
        let mut wanted = InstanceExtensionSet::default();
        wanted.insert(InstanceExtension::Surface);

        // Platform-specific WSI extensions.
        if cfg!(all(unix, not(target_os = "android"), not(target_os = "macos"))) {
            wanted.insert(InstanceExtension::XlibSurface);
            wanted.insert(InstanceExtension::XcbSurface);
            wanted.insert(InstanceExtension::WaylandSurface);
        }
        if cfg!(target_os = "android") {
            wanted.insert(InstanceExtension::AndroidSurface);
        }
        if cfg!(target_os = "windows") {
            wanted.insert(InstanceExtension::Win32Surface);
        }

        if flags.contains(adt::InstanceFlags::DEBUG) {
            wanted.insert(InstanceExtension::DebugUtils);
        }

        // Wide color gamut surface formats.
        wanted.insert(InstanceExtension::SwapchainColorspace);

        // Required by most extended capability queries; also promoted to 1.1,
        // so its absence as a string is not fatal.
        wanted.insert(InstanceExtension::GetPhysicalDeviceProperties2);
        wanted.insert(InstanceExtension::ExternalMemoryCapabilities);

        // Software implementations are often shipped as incomplete
        // ("portability") implementations, hidden unless asked for.
        if cfg!(target_os = "macos")
            || discovery_strategy == adt::DiscoveryStrategy::SoftwareOnly
        {
            wanted.insert(InstanceExtension::PortabilityEnumeration);
        }

        wanted.ensure_dependencies();
        wanted
    }

    /// # Safety
    ///
    /// - `raw_instance` must be created from `entry` with `enabled_extensions`
    ///   enabled, respecting `instance_api_version`.
    /// - If `drop_guard` is `Some`, this instance takes over destruction of
    ///   `raw_instance`.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn from_raw(
        entry: ash::Entry,
        raw_instance: ash::Instance,
        instance_api_version: u32,
        enabled_extensions: InstanceExtensionSet,
        flags: adt::InstanceFlags,
        discovery_strategy: adt::DiscoveryStrategy,
        debug_utils_create_info: Option<super::DebugUtilsCreateInfo>,
        has_nv_optimus: bool,
        drop_guard: Option<crate::DropGuard>,
    ) -> Result<Self, crate::InstanceError> {
        log::debug!("Instance version: 0x{:x}", instance_api_version);

        let debug_utils = if let Some(debug_utils_create_info) = debug_utils_create_info {
            if enabled_extensions.contains(InstanceExtension::DebugUtils) {
                log::info!("Enabling debug utils");

                let extension = ext::debug_utils::Instance::new(&entry, &raw_instance);
                let vk_info = debug_utils_create_info.to_vk_create_info();
                let messenger =
                    match unsafe { extension.create_debug_utils_messenger(&vk_info, None) } {
                        Ok(messenger) => messenger,
                        Err(err) => {
                            return Err(crate::InstanceError::with_source(
                                String::from("vkCreateDebugUtilsMessengerEXT failed"),
                                err,
                            ));
                        }
                    };

                Some(super::DebugUtils {
                    extension,
                    messenger,
                    callback_data: debug_utils_create_info.callback_data,
                })
            } else {
                log::info!("Debug utils not enabled: extension not listed");
                None
            }
        } else {
            None
        };

        // The extension string may be missing while the promoted core entry
        // point still exists, and a broken loader may list the extension yet
        // fail to resolve its symbol. A null function pointer means the
        // capability is absent, never a crash later.
        let get_physical_device_properties =
            if enabled_extensions.contains(InstanceExtension::GetPhysicalDeviceProperties2) {
                const SYMBOL: &CStr = unsafe {
                    CStr::from_bytes_with_nul_unchecked(b"vkGetPhysicalDeviceProperties2KHR\0")
                };
                let fp = unsafe {
                    entry.get_instance_proc_addr(raw_instance.handle(), SYMBOL.as_ptr())
                };
                if fp.is_none() {
                    log::warn!(
                        "{} is advertised but does not resolve; \
                         falling back to the plain property queries",
                        SYMBOL.to_string_lossy()
                    );
                    None
                } else {
                    log::debug!("Enabling device properties2");
                    Some(super::ExtensionFn::Extension(
                        khr::get_physical_device_properties2::Instance::new(
                            &entry,
                            &raw_instance,
                        ),
                    ))
                }
            } else if instance_api_version >= vk::API_VERSION_1_1 {
                Some(super::ExtensionFn::Promoted)
            } else {
                None
            };

        let mut extensions = enabled_extensions;
        extensions.mark_promoted(instance_api_version);
        extensions.ensure_dependencies();

        Ok(Self {
            shared: Arc::new(super::InstanceShared {
                raw: raw_instance,
                extensions,
                drop_guard,
                flags,
                discovery_strategy,
                debug_utils,
                get_physical_device_properties,
                entry,
                has_nv_optimus,
                instance_api_version,
            }),
        })
    }

    fn create_surface_from_xlib(
        &self,
        dpy: *mut vk::Display,
        window: vk::Window,
    ) -> Result<super::Surface, crate::InstanceError> {
        if !self
            .shared
            .extensions
            .contains(InstanceExtension::XlibSurface)
        {
            return Err(crate::InstanceError::new(String::from(
                "Vulkan driver does not support VK_KHR_xlib_surface",
            )));
        }

        let surface = {
            let xlib_loader =
                khr::xlib_surface::Instance::new(&self.shared.entry, &self.shared.raw);
            let info = vk::XlibSurfaceCreateInfoKHR::default()
                .flags(vk::XlibSurfaceCreateFlagsKHR::empty())
                .window(window)
                .dpy(dpy);

            unsafe { xlib_loader.create_xlib_surface(&info, None) }.map_err(|err| {
                crate::InstanceError::with_source(
                    String::from("vkCreateXlibSurfaceKHR failed"),
                    err,
                )
            })?
        };

        Ok(self.create_surface_from_vk_surface_khr(surface))
    }

    fn create_surface_from_xcb(
        &self,
        connection: *mut vk::xcb_connection_t,
        window: vk::xcb_window_t,
    ) -> Result<super::Surface, crate::InstanceError> {
        if !self
            .shared
            .extensions
            .contains(InstanceExtension::XcbSurface)
        {
            return Err(crate::InstanceError::new(String::from(
                "Vulkan driver does not support VK_KHR_xcb_surface",
            )));
        }

        let surface = {
            let xcb_loader = khr::xcb_surface::Instance::new(&self.shared.entry, &self.shared.raw);
            let info = vk::XcbSurfaceCreateInfoKHR::default()
                .flags(vk::XcbSurfaceCreateFlagsKHR::empty())
                .window(window)
                .connection(connection);

            unsafe { xcb_loader.create_xcb_surface(&info, None) }.map_err(|err| {
                crate::InstanceError::with_source(
                    String::from("vkCreateXcbSurfaceKHR failed"),
                    err,
                )
            })?
        };

        Ok(self.create_surface_from_vk_surface_khr(surface))
    }

    fn create_surface_from_wayland(
        &self,
        display: *mut vk::wl_display,
        surface: *mut vk::wl_surface,
    ) -> Result<super::Surface, crate::InstanceError> {
        if !self
            .shared
            .extensions
            .contains(InstanceExtension::WaylandSurface)
        {
            return Err(crate::InstanceError::new(String::from(
                "Vulkan driver does not support VK_KHR_wayland_surface",
            )));
        }

        let surface = {
            let w_loader =
                khr::wayland_surface::Instance::new(&self.shared.entry, &self.shared.raw);
            let info = vk::WaylandSurfaceCreateInfoKHR::default()
                .flags(vk::WaylandSurfaceCreateFlagsKHR::empty())
                .display(display)
                .surface(surface);

            unsafe { w_loader.create_wayland_surface(&info, None) }.map_err(|err| {
                crate::InstanceError::with_source(
                    String::from("vkCreateWaylandSurfaceKHR failed"),
                    err,
                )
            })?
        };

        Ok(self.create_surface_from_vk_surface_khr(surface))
    }

    fn create_surface_android(
        &self,
        window: *mut vk::ANativeWindow,
    ) -> Result<super::Surface, crate::InstanceError> {
        if !self
            .shared
            .extensions
            .contains(InstanceExtension::AndroidSurface)
        {
            return Err(crate::InstanceError::new(String::from(
                "Vulkan driver does not support VK_KHR_android_surface",
            )));
        }

        let surface = {
            let a_loader =
                khr::android_surface::Instance::new(&self.shared.entry, &self.shared.raw);
            let info = vk::AndroidSurfaceCreateInfoKHR::default()
                .flags(vk::AndroidSurfaceCreateFlagsKHR::empty())
                .window(window);

            unsafe { a_loader.create_android_surface(&info, None) }.map_err(|err| {
                crate::InstanceError::with_source(
                    String::from("vkCreateAndroidSurfaceKHR failed"),
                    err,
                )
            })?
        };

        Ok(self.create_surface_from_vk_surface_khr(surface))
    }

    fn create_surface_from_hwnd(
        &self,
        hinstance: vk::HINSTANCE,
        hwnd: vk::HWND,
    ) -> Result<super::Surface, crate::InstanceError> {
        if !self
            .shared
            .extensions
            .contains(InstanceExtension::Win32Surface)
        {
            return Err(crate::InstanceError::new(String::from(
                "Vulkan driver does not support VK_KHR_win32_surface",
            )));
        }

        let surface = {
            let info = vk::Win32SurfaceCreateInfoKHR::default()
                .flags(vk::Win32SurfaceCreateFlagsKHR::empty())
                .hinstance(hinstance)
                .hwnd(hwnd);
            let win32_loader =
                khr::win32_surface::Instance::new(&self.shared.entry, &self.shared.raw);
            unsafe { win32_loader.create_win32_surface(&info, None) }.map_err(|err| {
                crate::InstanceError::with_source(
                    String::from("vkCreateWin32SurfaceKHR failed"),
                    err,
                )
            })?
        };

        Ok(self.create_surface_from_vk_surface_khr(surface))
    }

    fn create_surface_from_vk_surface_khr(&self, surface: vk::SurfaceKHR) -> super::Surface {
        let functor = khr::surface::Instance::new(&self.shared.entry, &self.shared.raw);
        super::Surface {
            raw: surface,
            functor,
            instance: Arc::clone(&self.shared),
        }
    }
}

impl Drop for super::InstanceShared {
    fn drop(&mut self) {
        unsafe {
            // Keep du alive since destroy_instance may also log
            let _du = self.debug_utils.take().map(|du| {
                du.extension
                    .destroy_debug_utils_messenger(du.messenger, None);
                du
            });
            if let Some(_drop_guard) = self.drop_guard.take() {
                self.raw.destroy_instance(None);
            }
        }
    }
}

impl Drop for super::Surface {
    fn drop(&mut self) {
        unsafe { self.functor.destroy_surface(self.raw, None) };
    }
}

impl crate::Instance for super::Instance {
    type A = super::Api;

    unsafe fn init(desc: &crate::InstanceDescriptor) -> Result<Self, crate::InstanceError> {
        profiling::scope!("Init Vulkan Backend");

        let entry = unsafe {
            profiling::scope!("Load vk library");
            ash::Entry::load()
        }
        .map_err(|err| {
            crate::InstanceError::with_source(String::from("missing Vulkan entry points"), err)
        })?;

        // Enforces the API floor and pulls layers plus per-layer extensions.
        let global = info::gather_global_info(&entry)?;

        let app_name = CString::new(desc.name).map_err(|_| {
            crate::InstanceError::new(String::from(
                "instance name must not contain an interior NUL byte",
            ))
        })?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name.as_c_str())
            .application_version(1)
            .engine_name(CStr::from_bytes_with_nul(b"adapter-hal\0").unwrap())
            .engine_version(1)
            // This is the max Vulkan API version supported by this backend.
            .api_version(global.api_version.min(vk::API_VERSION_1_3));

        let wanted = Self::desired_extensions(desc.flags, desc.discovery_strategy);
        let mut enabled_extensions = InstanceExtensionSet::default();
        for extension in wanted.iter() {
            if global.extensions.contains(extension) {
                enabled_extensions.insert(extension);
            } else {
                log::debug!(
                    "Unable to find extension: {}",
                    extension.name().to_string_lossy()
                );
            }
        }

        let validation_layer_name =
            CStr::from_bytes_with_nul(b"VK_LAYER_KHRONOS_validation\0").unwrap();
        let validation_layer_properties = global.layer_properties(validation_layer_name);

        let nv_optimus_layer = CStr::from_bytes_with_nul(b"VK_LAYER_NV_optimus\0").unwrap();
        let has_nv_optimus = global.has_layer(nv_optimus_layer);

        let obs_layer = CStr::from_bytes_with_nul(b"VK_LAYER_OBS_HOOK\0").unwrap();
        let has_obs_layer = global.has_layer(obs_layer);

        let mut layers: Vec<&'static CStr> = Vec::new();

        let has_debug_extension = enabled_extensions.contains(InstanceExtension::DebugUtils);
        let mut debug_user_data = has_debug_extension.then(|| {
            // Put the callback data on the heap, to ensure it will never be
            // moved.
            Box::new(super::DebugUtilsMessengerUserData {
                validation_layer_properties: None,
                has_obs_layer,
            })
        });

        // Request validation layer if asked.
        if desc.flags.intersects(adt::InstanceFlags::VALIDATION) {
            if let Some(layer_properties) = validation_layer_properties {
                layers.push(validation_layer_name);

                // The layer may expose this extension even though the
                // unconditional query does not list it.
                if !global.supports_raw_extension(ext::validation_features::NAME) {
                    log::debug!(
                        "validation layer found, but {} is unavailable",
                        ext::validation_features::NAME.to_string_lossy()
                    );
                }

                if let Some(debug_user_data) = debug_user_data.as_mut() {
                    debug_user_data.validation_layer_properties =
                        Some(super::ValidationLayerProperties {
                            layer_description: layer_properties
                                .description_as_c_str()
                                .ok()
                                .map(CStr::to_owned)
                                .unwrap_or_default(),
                            layer_spec_version: layer_properties.spec_version,
                        });
                }
            } else {
                log::warn!(
                    "InstanceFlags::VALIDATION requested, but unable to find layer: {}",
                    validation_layer_name.to_string_lossy()
                );
            }
        }

        let mut debug_utils = debug_user_data.map(|callback_data| {
            // having ERROR unconditionally because Vk doesn't like empty flags
            let mut severity = vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
            if log::max_level() >= log::LevelFilter::Debug {
                severity |= vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE;
            }
            if log::max_level() >= log::LevelFilter::Info {
                severity |= vk::DebugUtilsMessageSeverityFlagsEXT::INFO;
            }
            if log::max_level() >= log::LevelFilter::Warn {
                severity |= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING;
            }

            let message_type = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;

            super::DebugUtilsCreateInfo {
                severity,
                message_type,
                callback_data,
            }
        });

        let mut create_flags = vk::InstanceCreateFlags::empty();
        // Only ask the instance to enumerate incomplete Vulkan
        // implementations if we managed to find the extension that provides
        // the flag.
        if enabled_extensions.contains(InstanceExtension::PortabilityEnumeration) {
            create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        }

        let vk_instance = {
            let layer_pointers = layers.iter().map(|&name| name.as_ptr()).collect::<Vec<_>>();
            let extension_pointers = enabled_extensions
                .iter()
                .map(|extension| extension.name().as_ptr())
                .collect::<Vec<_>>();

            let mut create_info = vk::InstanceCreateInfo::default()
                .flags(create_flags)
                .application_info(&app_info)
                .enabled_layer_names(&layer_pointers)
                .enabled_extension_names(&extension_pointers);

            let mut debug_utils_create_info = debug_utils
                .as_mut()
                .map(|create_info| create_info.to_vk_create_info());
            if let Some(debug_utils_create_info) = debug_utils_create_info.as_mut() {
                create_info = create_info.push_next(debug_utils_create_info);
            }

            unsafe {
                profiling::scope!("vkCreateInstance");
                entry.create_instance(&create_info, None)
            }
            .map_err(|err| {
                crate::InstanceError::with_source(String::from("vkCreateInstance failed"), err)
            })?
        };

        unsafe {
            Self::from_raw(
                entry,
                vk_instance,
                global.api_version,
                enabled_extensions,
                desc.flags,
                desc.discovery_strategy,
                debug_utils,
                has_nv_optimus,
                // `Some` signals that this backend is in charge of destroying
                // the raw instance.
                Some(Box::new(())),
            )
        }
    }

    unsafe fn create_surface(
        &self,
        display_handle: raw_window_handle::RawDisplayHandle,
        window_handle: raw_window_handle::RawWindowHandle,
    ) -> Result<super::Surface, crate::InstanceError> {
        use raw_window_handle::{RawDisplayHandle as Rdh, RawWindowHandle as Rwh};

        match (window_handle, display_handle) {
            (Rwh::Wayland(handle), Rdh::Wayland(display)) => {
                self.create_surface_from_wayland(display.display.as_ptr(), handle.surface.as_ptr())
            }
            (Rwh::Xlib(handle), Rdh::Xlib(display)) => {
                let display = display.display.ok_or_else(|| {
                    crate::InstanceError::new(String::from("Xlib display pointer is not set"))
                })?;
                self.create_surface_from_xlib(display.as_ptr(), handle.window)
            }
            (Rwh::Xcb(handle), Rdh::Xcb(display)) => {
                let connection = display.connection.ok_or_else(|| {
                    crate::InstanceError::new(String::from("Xcb connection pointer is not set"))
                })?;
                self.create_surface_from_xcb(connection.as_ptr(), handle.window.get())
            }
            (Rwh::AndroidNdk(handle), _) => {
                self.create_surface_android(handle.a_native_window.as_ptr())
            }
            (Rwh::Win32(handle), _) => {
                let hinstance = handle.hinstance.ok_or_else(|| {
                    crate::InstanceError::new(String::from(
                        "Vulkan requires raw-window-handle's Win32::hinstance to be set",
                    ))
                })?;
                self.create_surface_from_hwnd(hinstance.get(), handle.hwnd.get())
            }
            (_, _) => Err(crate::InstanceError::new(format!(
                "window handle {window_handle:?} is not a Vulkan-compatible handle"
            ))),
        }
    }

    unsafe fn enumerate_adapters(
        &self,
    ) -> Result<Vec<crate::ExposedAdapter<super::Api>>, crate::InstanceError> {
        let raw_devices = {
            profiling::scope!("vkEnumeratePhysicalDevices");
            unsafe {
                info::read_two_call(|count, data| {
                    (self.shared.raw.fp_v1_0().enumerate_physical_devices)(
                        self.shared.raw.handle(),
                        count,
                        data,
                    )
                })
            }
            .map_err(|err| {
                crate::InstanceError::with_source(
                    String::from("vkEnumeratePhysicalDevices failed"),
                    err,
                )
            })?
        };

        let mut candidate_count = 0usize;
        let mut exposed_adapters = Vec::new();
        let mut last_rejection = None;
        for phd in raw_devices {
            if self.shared.discovery_strategy == adt::DiscoveryStrategy::SoftwareOnly {
                let properties = unsafe { self.shared.raw.get_physical_device_properties(phd) };
                if properties.device_type != vk::PhysicalDeviceType::CPU {
                    log::debug!(
                        "software-only discovery: skipping non-CPU device {:?}",
                        phd
                    );
                    continue;
                }
            }
            candidate_count += 1;
            // One device failing its mandatory checks must not abort
            // discovery of its siblings.
            match self.expose_adapter(phd) {
                Ok(adapter) => exposed_adapters.push(adapter),
                Err(err) => {
                    log::info!("not exposing {:?}: {}", phd, err);
                    last_rejection = Some(err);
                }
            }
        }

        if self.shared.discovery_strategy == adt::DiscoveryStrategy::PreferHardware {
            exposed_adapters.sort_by_key(|exposed| match exposed.info.device_type {
                adt::DeviceType::DiscreteGpu => 0,
                adt::DeviceType::IntegratedGpu => 1,
                adt::DeviceType::VirtualGpu => 2,
                adt::DeviceType::Other => 3,
                adt::DeviceType::Cpu => 4,
            });
        }

        if exposed_adapters.is_empty() {
            if let Some(rejection) = last_rejection {
                // Every candidate was rejected; surface the retained
                // diagnostic instead of an unexplained empty list.
                return Err(rejection);
            }
            if candidate_count == 0 {
                log::warn!("no physical devices matched the discovery strategy");
            }
        }

        Ok(exposed_adapters)
    }
}
