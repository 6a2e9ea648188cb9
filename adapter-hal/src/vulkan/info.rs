//! Raw driver information gathering.
//!
//! Everything in this module makes the minimum number of native calls needed
//! to produce the raw capability structs and nothing else; interpreting the
//! data is the capability policy's job. Errors are surfaced immediately, with
//! no partial results.

use std::ptr;

use ash::vk;

use super::extensions::{DeviceExtensionSet, InstanceExtensionSet};

/// The instance API floor. Drivers below it are rejected with a descriptive
/// error rather than silently degraded; this also guarantees that the
/// properties2 family of queries exists.
pub const MINIMUM_INSTANCE_API_VERSION: u32 = vk::API_VERSION_1_1;

/// Runs a native enumeration through the count-then-data calling convention.
///
/// Both `SUCCESS` and `INCOMPLETE` are success codes: either way the written
/// count is authoritative. A zero count returns without a second native call,
/// since some drivers mishandle a zero-sized output buffer. Any other result
/// code fails the whole query.
pub(super) unsafe fn read_two_call<T: Default + Clone>(
    mut f: impl FnMut(&mut u32, *mut T) -> vk::Result,
) -> Result<Vec<T>, crate::DeviceError> {
    let mut count = 0u32;
    match f(&mut count, ptr::null_mut()) {
        vk::Result::SUCCESS | vk::Result::INCOMPLETE => {}
        err => return Err(err.into()),
    }
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut data = vec![T::default(); count as usize];
    match f(&mut count, data.as_mut_ptr()) {
        // `INCOMPLETE` here means the item count shrank between the two
        // calls; the written prefix is still valid.
        vk::Result::SUCCESS | vk::Result::INCOMPLETE => {
            data.truncate(count as usize);
            Ok(data)
        }
        err => Err(err.into()),
    }
}

/// Instance-level capability record: one per native connection.
#[derive(Debug)]
pub struct GlobalInfo {
    /// The loader's instance API version.
    pub api_version: u32,
    /// Layers installed on the system.
    pub layers: Vec<vk::LayerProperties>,
    /// Known instance extensions, unioned over the unconditional query and
    /// one query per discovered layer (a layer may expose extensions that are
    /// invisible without it). Not yet closed under dependency; the resolver
    /// runs when the instance extension list is chosen.
    pub extensions: InstanceExtensionSet,
    /// The raw union of every reported extension property, kept for queries
    /// about extensions outside the known set (e.g. layer-private ones).
    pub extension_properties: Vec<vk::ExtensionProperties>,
}

impl GlobalInfo {
    pub fn has_layer(&self, name: &std::ffi::CStr) -> bool {
        self.layer_properties(name).is_some()
    }

    pub fn layer_properties(&self, name: &std::ffi::CStr) -> Option<&vk::LayerProperties> {
        self.layers
            .iter()
            .find(|layer| layer.layer_name_as_c_str() == Ok(name))
    }

    /// Whether `name` was reported at all, known to the backend or not.
    pub fn supports_raw_extension(&self, name: &std::ffi::CStr) -> bool {
        self.extension_properties
            .iter()
            .any(|ep| ep.extension_name_as_c_str() == Ok(name))
    }
}

/// Queries the loader-level capability record: API version, layers, and the
/// instance extensions visible with and without each layer.
pub fn gather_global_info(entry: &ash::Entry) -> Result<GlobalInfo, crate::InstanceError> {
    let api_version = {
        profiling::scope!("vkEnumerateInstanceVersion");
        match unsafe { entry.try_enumerate_instance_version() } {
            // A loader that predates the query is implicitly 1.0.
            Ok(version) => version.unwrap_or(vk::API_VERSION_1_0),
            Err(err) => {
                return Err(crate::InstanceError::with_source(
                    String::from("vkEnumerateInstanceVersion failed"),
                    err,
                ));
            }
        }
    };
    if api_version < MINIMUM_INSTANCE_API_VERSION {
        return Err(crate::InstanceError::new(format!(
            "Vulkan instance version {}.{} is below the supported minimum {}.{}",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            vk::api_version_major(MINIMUM_INSTANCE_API_VERSION),
            vk::api_version_minor(MINIMUM_INSTANCE_API_VERSION),
        )));
    }

    let layers = {
        profiling::scope!("vkEnumerateInstanceLayerProperties");
        unsafe {
            read_two_call(|count, data| {
                (entry.fp_v1_0().enumerate_instance_layer_properties)(count, data)
            })
        }
        .map_err(|err| {
            crate::InstanceError::with_source(
                String::from("vkEnumerateInstanceLayerProperties failed"),
                err,
            )
        })?
    };

    let mut extension_properties = {
        profiling::scope!("vkEnumerateInstanceExtensionProperties");
        unsafe {
            read_two_call(|count, data| {
                (entry.fp_v1_0().enumerate_instance_extension_properties)(
                    ptr::null(),
                    count,
                    data,
                )
            })
        }
        .map_err(|err| {
            crate::InstanceError::with_source(
                String::from("vkEnumerateInstanceExtensionProperties failed"),
                err,
            )
        })?
    };

    for layer in &layers {
        let per_layer = unsafe {
            read_two_call(|count, data| {
                (entry.fp_v1_0().enumerate_instance_extension_properties)(
                    layer.layer_name.as_ptr(),
                    count,
                    data,
                )
            })
        }
        .map_err(|err| {
            crate::InstanceError::with_source(
                format!(
                    "vkEnumerateInstanceExtensionProperties failed for layer {:?}",
                    layer.layer_name_as_c_str()
                ),
                err,
            )
        })?;
        extension_properties.extend(per_layer);
    }

    let extensions = InstanceExtensionSet::from_properties(&extension_properties);
    log::debug!(
        "Instance version 0x{:x}, {} layers, extensions: {:?}",
        api_version,
        layers.len(),
        extensions
    );

    Ok(GlobalInfo {
        api_version,
        layers,
        extensions,
        extension_properties,
    })
}

impl super::InstanceShared {
    /// Pulls the raw per-device snapshot: properties first (the reported
    /// device API version decides how everything else is queried), then
    /// memory layout, queue families, layers, extensions, and the chained
    /// extension feature/property sub-structures.
    pub(super) unsafe fn gather_device_info(
        &self,
        phd: vk::PhysicalDevice,
    ) -> Result<
        (
            super::adapter::PhysicalDeviceCapabilities,
            super::adapter::PhysicalDeviceFeatures,
        ),
        crate::DeviceError,
    > {
        use super::extensions::DeviceExtension as Ext;

        let properties = {
            profiling::scope!("vkGetPhysicalDeviceProperties");
            unsafe { self.raw.get_physical_device_properties(phd) }
        };
        // Device-level functionality is limited by both sides of the
        // connection.
        let device_api_version = properties.api_version.min(self.instance_api_version);

        let extension_properties = {
            profiling::scope!("vkEnumerateDeviceExtensionProperties");
            unsafe {
                read_two_call(|count, data| {
                    (self.raw.fp_v1_0().enumerate_device_extension_properties)(
                        phd,
                        ptr::null(),
                        count,
                        data,
                    )
                })?
            }
        };
        let mut extensions = DeviceExtensionSet::from_properties(&extension_properties);
        extensions.mark_promoted(device_api_version);
        extensions.ensure_dependencies(&self.extensions);

        let device_layers = unsafe {
            read_two_call(|count, data| {
                (self.raw.fp_v1_0().enumerate_device_layer_properties)(phd, count, data)
            })?
        };
        if !device_layers.is_empty() {
            log::debug!("{} device-level layers reported", device_layers.len());
        }

        let memory = {
            profiling::scope!("vkGetPhysicalDeviceMemoryProperties");
            unsafe { self.raw.get_physical_device_memory_properties(phd) }
        };
        let queue_families = {
            profiling::scope!("vkGetPhysicalDeviceQueueFamilyProperties");
            unsafe { self.raw.get_physical_device_queue_family_properties(phd) }
        };

        let mut capabilities = super::adapter::PhysicalDeviceCapabilities {
            properties,
            memory,
            queue_families,
            extensions,
            driver: None,
            maintenance_3: None,
            subgroup: None,
            device_api_version,
        };
        let mut features = super::adapter::PhysicalDeviceFeatures::default();

        // The extended queries pull one sub-structure per extension through
        // the chained-struct mechanism, in a single native call per category.
        // A sub-structure is only chained if its owning extension is in the
        // canonical set, so the driver never sees a struct it does not know.
        if let Some(ref properties2_fns) = self.get_physical_device_properties {
            {
                let mut properties2 = vk::PhysicalDeviceProperties2::default();

                // Subgroup properties are core since 1.1, which the instance
                // floor guarantees.
                let subgroup = capabilities
                    .subgroup
                    .insert(vk::PhysicalDeviceSubgroupProperties::default());
                properties2 = properties2.push_next(subgroup);

                if extensions.contains(Ext::Maintenance3) {
                    let next = capabilities
                        .maintenance_3
                        .insert(vk::PhysicalDeviceMaintenance3Properties::default());
                    properties2 = properties2.push_next(next);
                }
                if extensions.contains(Ext::DriverProperties) {
                    let next = capabilities
                        .driver
                        .insert(vk::PhysicalDeviceDriverProperties::default());
                    properties2 = properties2.push_next(next);
                }

                profiling::scope!("vkGetPhysicalDeviceProperties2");
                unsafe {
                    match *properties2_fns {
                        super::ExtensionFn::Extension(ref loader) => {
                            loader.get_physical_device_properties2(phd, &mut properties2)
                        }
                        super::ExtensionFn::Promoted => self
                            .raw
                            .get_physical_device_properties2(phd, &mut properties2),
                    }
                };
            }

            {
                let mut features2 = vk::PhysicalDeviceFeatures2::default();

                if extensions.contains(Ext::Multiview) {
                    let next = features
                        .multiview
                        .insert(vk::PhysicalDeviceMultiviewFeatures::default());
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::SamplerYcbcrConversion) {
                    let next = features
                        .sampler_ycbcr_conversion
                        .insert(vk::PhysicalDeviceSamplerYcbcrConversionFeatures::default());
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::DescriptorIndexing) {
                    let next = features
                        .descriptor_indexing
                        .insert(vk::PhysicalDeviceDescriptorIndexingFeatures::default());
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::TimelineSemaphore) {
                    let next = features
                        .timeline_semaphore
                        .insert(vk::PhysicalDeviceTimelineSemaphoreFeatures::default());
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::ImageRobustness) {
                    let next = features
                        .image_robustness
                        .insert(vk::PhysicalDeviceImageRobustnessFeatures::default());
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::Robustness2) {
                    let next = features
                        .robustness2
                        .insert(vk::PhysicalDeviceRobustness2FeaturesEXT::default());
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::TextureCompressionAstcHdr) {
                    let next = features.astc_hdr.insert(
                        vk::PhysicalDeviceTextureCompressionASTCHDRFeatures::default(),
                    );
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::ShaderFloat16Int8) {
                    let next = features.shader_float16.insert((
                        vk::PhysicalDeviceShaderFloat16Int8Features::default(),
                        // 16-bit storage is core since 1.1, so its feature
                        // struct can always be chained alongside.
                        vk::PhysicalDevice16BitStorageFeatures::default(),
                    ));
                    features2 = features2.push_next(&mut next.0);
                    features2 = features2.push_next(&mut next.1);
                }
                if extensions.contains(Ext::AccelerationStructure) {
                    let next = features
                        .acceleration_structure
                        .insert(vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default());
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::BufferDeviceAddress) {
                    let next = features
                        .buffer_device_address
                        .insert(vk::PhysicalDeviceBufferDeviceAddressFeaturesKHR::default());
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::RayQuery) {
                    let next = features
                        .ray_query
                        .insert(vk::PhysicalDeviceRayQueryFeaturesKHR::default());
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::ZeroInitializeWorkgroupMemory) {
                    let next = features.zero_initialize_workgroup_memory.insert(
                        vk::PhysicalDeviceZeroInitializeWorkgroupMemoryFeatures::default(),
                    );
                    features2 = features2.push_next(next);
                }
                if extensions.contains(Ext::CooperativeMatrix) {
                    let next = features
                        .cooperative_matrix
                        .insert(vk::PhysicalDeviceCooperativeMatrixFeaturesKHR::default());
                    features2 = features2.push_next(next);
                }

                profiling::scope!("vkGetPhysicalDeviceFeatures2");
                unsafe {
                    match *properties2_fns {
                        super::ExtensionFn::Extension(ref loader) => {
                            loader.get_physical_device_features2(phd, &mut features2)
                        }
                        super::ExtensionFn::Promoted => {
                            self.raw.get_physical_device_features2(phd, &mut features2)
                        }
                    }
                };
                features.core = features2.features;
            }
        } else {
            features.core = unsafe { self.raw.get_physical_device_features(phd) };
        }

        Ok((capabilities, features))
    }
}

/// Transient surface capability record, refreshed on every query.
#[derive(Debug)]
pub struct SurfaceInfo {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    /// Presentation support per queue family, indexed by family.
    pub queue_family_support: Vec<bool>,
}

/// Queries what `surface` supports on `phd`: capabilities, per-queue-family
/// presentation support, formats and present modes.
pub(super) unsafe fn gather_surface_info(
    phd: vk::PhysicalDevice,
    queue_family_count: u32,
    surface: &super::Surface,
) -> Result<SurfaceInfo, crate::DeviceError> {
    let capabilities = {
        profiling::scope!("vkGetPhysicalDeviceSurfaceCapabilitiesKHR");
        unsafe {
            surface
                .functor
                .get_physical_device_surface_capabilities(phd, surface.raw)
        }?
    };

    let mut queue_family_support = Vec::with_capacity(queue_family_count as usize);
    for family_index in 0..queue_family_count {
        profiling::scope!("vkGetPhysicalDeviceSurfaceSupportKHR");
        let supported = unsafe {
            surface
                .functor
                .get_physical_device_surface_support(phd, family_index, surface.raw)
        }?;
        queue_family_support.push(supported);
    }

    let formats = {
        profiling::scope!("vkGetPhysicalDeviceSurfaceFormatsKHR");
        unsafe {
            read_two_call(|count, data| {
                (surface.functor.fp().get_physical_device_surface_formats_khr)(
                    phd,
                    surface.raw,
                    count,
                    data,
                )
            })?
        }
    };

    let present_modes = {
        profiling::scope!("vkGetPhysicalDeviceSurfacePresentModesKHR");
        unsafe {
            read_two_call(|count, data| {
                (surface
                    .functor
                    .fp()
                    .get_physical_device_surface_present_modes_khr)(
                    phd, surface.raw, count, data,
                )
            })?
        }
    };

    Ok(SurfaceInfo {
        capabilities,
        formats,
        present_modes,
        queue_family_support,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_call_reads_exactly_twice() {
        let mut calls = Vec::new();
        let result = unsafe {
            read_two_call::<u32>(|count, data| {
                calls.push(data.is_null());
                if data.is_null() {
                    *count = 3;
                } else {
                    for i in 0..3 {
                        unsafe { *data.add(i) = i as u32 * 10 };
                    }
                }
                vk::Result::SUCCESS
            })
        };
        assert_eq!(result.unwrap(), vec![0, 10, 20]);
        // One counting call with a null buffer, one filling call.
        assert_eq!(calls, vec![true, false]);
    }

    #[test]
    fn two_call_count_is_stable_without_state_change() {
        let query = |count: &mut u32, _data: *mut u32| {
            *count = 7;
            vk::Result::SUCCESS
        };
        let mut first = 0;
        let mut second = 0;
        assert_eq!(query(&mut first, std::ptr::null_mut()), vk::Result::SUCCESS);
        assert_eq!(query(&mut second, std::ptr::null_mut()), vk::Result::SUCCESS);
        assert_eq!(first, second);
    }

    #[test]
    fn two_call_zero_count_skips_second_call() {
        let mut calls = 0;
        let result = unsafe {
            read_two_call::<u32>(|count, _data| {
                calls += 1;
                *count = 0;
                vk::Result::SUCCESS
            })
        };
        assert_eq!(result.unwrap(), Vec::<u32>::new());
        assert_eq!(calls, 1);
    }

    #[test]
    fn two_call_truncates_when_items_disappear() {
        let result = unsafe {
            read_two_call::<u32>(|count, data| {
                if data.is_null() {
                    *count = 4;
                    vk::Result::SUCCESS
                } else {
                    // Two items vanished between the calls; the shrunken
                    // count is authoritative.
                    *count = 2;
                    unsafe {
                        *data = 1;
                        *data.add(1) = 2;
                    }
                    vk::Result::INCOMPLETE
                }
            })
        };
        assert_eq!(result.unwrap(), vec![1, 2]);
    }

    #[test]
    fn two_call_propagates_failure_codes() {
        let real = unsafe {
            read_two_call::<u32>(|_count, _data| vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        };
        assert_eq!(real.unwrap_err(), crate::DeviceError::OutOfMemory);

        // The injected testing variant must take the same path as a real
        // allocation failure.
        let fake = unsafe {
            read_two_call::<u32>(|_count, _data| super::super::ERROR_FAKE_DEVICE_OOM_FOR_TESTING)
        };
        assert_eq!(fake.unwrap_err(), crate::DeviceError::OutOfMemory);

        let lost =
            unsafe { read_two_call::<u32>(|_count, _data| vk::Result::ERROR_DEVICE_LOST) };
        assert_eq!(lost.unwrap_err(), crate::DeviceError::Lost);

        let unknown =
            unsafe { read_two_call::<u32>(|_count, _data| vk::Result::ERROR_UNKNOWN) };
        assert!(matches!(
            unknown.unwrap_err(),
            crate::DeviceError::Unexpected(_)
        ));
    }
}
