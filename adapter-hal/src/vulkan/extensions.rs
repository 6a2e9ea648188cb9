//! Canonical extension sets.
//!
//! A raw extension string list from the driver is turned into a fixed-size
//! bitset that is *closed under dependency*: if an extension is present, so is
//! everything it transitively requires. Extensions folded into a core API
//! version are forced on when the device reports that version, even if the
//! string is absent from the raw list.

use std::ffi::CStr;

use ash::{ext, khr, vk};

/// Instance-level extensions the backend knows about.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstanceExtension {
    Surface,
    XlibSurface,
    XcbSurface,
    WaylandSurface,
    AndroidSurface,
    Win32Surface,
    MetalSurface,
    DebugUtils,
    SwapchainColorspace,
    GetPhysicalDeviceProperties2,
    ExternalMemoryCapabilities,
    PortabilityEnumeration,
}

impl InstanceExtension {
    pub const ALL: [Self; 12] = [
        Self::Surface,
        Self::XlibSurface,
        Self::XcbSurface,
        Self::WaylandSurface,
        Self::AndroidSurface,
        Self::Win32Surface,
        Self::MetalSurface,
        Self::DebugUtils,
        Self::SwapchainColorspace,
        Self::GetPhysicalDeviceProperties2,
        Self::ExternalMemoryCapabilities,
        Self::PortabilityEnumeration,
    ];

    pub const fn name(self) -> &'static CStr {
        match self {
            Self::Surface => khr::surface::NAME,
            Self::XlibSurface => khr::xlib_surface::NAME,
            Self::XcbSurface => khr::xcb_surface::NAME,
            Self::WaylandSurface => khr::wayland_surface::NAME,
            Self::AndroidSurface => khr::android_surface::NAME,
            Self::Win32Surface => khr::win32_surface::NAME,
            Self::MetalSurface => ext::metal_surface::NAME,
            Self::DebugUtils => ext::debug_utils::NAME,
            Self::SwapchainColorspace => ext::swapchain_colorspace::NAME,
            Self::GetPhysicalDeviceProperties2 => khr::get_physical_device_properties2::NAME,
            Self::ExternalMemoryCapabilities => khr::external_memory_capabilities::NAME,
            Self::PortabilityEnumeration => khr::portability_enumeration::NAME,
        }
    }

    /// The instance API version this extension was folded into, if any.
    const fn promoted_in(self) -> Option<u32> {
        match self {
            Self::GetPhysicalDeviceProperties2 | Self::ExternalMemoryCapabilities => {
                Some(vk::API_VERSION_1_1)
            }
            _ => None,
        }
    }

    const fn depends_on(self) -> &'static [Self] {
        match self {
            Self::XlibSurface
            | Self::XcbSurface
            | Self::WaylandSurface
            | Self::AndroidSurface
            | Self::Win32Surface
            | Self::MetalSurface
            | Self::SwapchainColorspace => &[Self::Surface],
            _ => &[],
        }
    }
}

/// Device-level extensions the backend knows about.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceExtension {
    Swapchain,
    SwapchainMutableFormat,
    Maintenance1,
    Maintenance2,
    Maintenance3,
    StorageBufferStorageClass,
    Multiview,
    SamplerYcbcrConversion,
    ExternalMemory,
    ImageFormatList,
    ImagelessFramebuffer,
    DriverProperties,
    TimelineSemaphore,
    DescriptorIndexing,
    ShaderFloat16Int8,
    DrawIndirectCount,
    BufferDeviceAddress,
    ImageRobustness,
    Robustness2,
    ZeroInitializeWorkgroupMemory,
    TextureCompressionAstcHdr,
    ConservativeRasterization,
    DeferredHostOperations,
    AccelerationStructure,
    RayQuery,
    CooperativeMatrix,
    ImageDrmFormatModifier,
    PortabilitySubset,
}

impl DeviceExtension {
    pub const ALL: [Self; 28] = [
        Self::Swapchain,
        Self::SwapchainMutableFormat,
        Self::Maintenance1,
        Self::Maintenance2,
        Self::Maintenance3,
        Self::StorageBufferStorageClass,
        Self::Multiview,
        Self::SamplerYcbcrConversion,
        Self::ExternalMemory,
        Self::ImageFormatList,
        Self::ImagelessFramebuffer,
        Self::DriverProperties,
        Self::TimelineSemaphore,
        Self::DescriptorIndexing,
        Self::ShaderFloat16Int8,
        Self::DrawIndirectCount,
        Self::BufferDeviceAddress,
        Self::ImageRobustness,
        Self::Robustness2,
        Self::ZeroInitializeWorkgroupMemory,
        Self::TextureCompressionAstcHdr,
        Self::ConservativeRasterization,
        Self::DeferredHostOperations,
        Self::AccelerationStructure,
        Self::RayQuery,
        Self::CooperativeMatrix,
        Self::ImageDrmFormatModifier,
        Self::PortabilitySubset,
    ];

    pub const fn name(self) -> &'static CStr {
        match self {
            Self::Swapchain => khr::swapchain::NAME,
            Self::SwapchainMutableFormat => khr::swapchain_mutable_format::NAME,
            Self::Maintenance1 => khr::maintenance1::NAME,
            Self::Maintenance2 => khr::maintenance2::NAME,
            Self::Maintenance3 => khr::maintenance3::NAME,
            Self::StorageBufferStorageClass => khr::storage_buffer_storage_class::NAME,
            Self::Multiview => khr::multiview::NAME,
            Self::SamplerYcbcrConversion => khr::sampler_ycbcr_conversion::NAME,
            Self::ExternalMemory => khr::external_memory::NAME,
            Self::ImageFormatList => khr::image_format_list::NAME,
            Self::ImagelessFramebuffer => khr::imageless_framebuffer::NAME,
            Self::DriverProperties => khr::driver_properties::NAME,
            Self::TimelineSemaphore => khr::timeline_semaphore::NAME,
            Self::DescriptorIndexing => ext::descriptor_indexing::NAME,
            Self::ShaderFloat16Int8 => khr::shader_float16_int8::NAME,
            Self::DrawIndirectCount => khr::draw_indirect_count::NAME,
            Self::BufferDeviceAddress => khr::buffer_device_address::NAME,
            Self::ImageRobustness => ext::image_robustness::NAME,
            Self::Robustness2 => ext::robustness2::NAME,
            Self::ZeroInitializeWorkgroupMemory => khr::zero_initialize_workgroup_memory::NAME,
            Self::TextureCompressionAstcHdr => ext::texture_compression_astc_hdr::NAME,
            Self::ConservativeRasterization => ext::conservative_rasterization::NAME,
            Self::DeferredHostOperations => khr::deferred_host_operations::NAME,
            Self::AccelerationStructure => khr::acceleration_structure::NAME,
            Self::RayQuery => khr::ray_query::NAME,
            Self::CooperativeMatrix => khr::cooperative_matrix::NAME,
            Self::ImageDrmFormatModifier => ext::image_drm_format_modifier::NAME,
            Self::PortabilitySubset => khr::portability_subset::NAME,
        }
    }

    /// The device API version this extension was folded into, if any.
    const fn promoted_in(self) -> Option<u32> {
        match self {
            Self::Maintenance1
            | Self::Maintenance2
            | Self::Maintenance3
            | Self::StorageBufferStorageClass
            | Self::Multiview
            | Self::SamplerYcbcrConversion
            | Self::ExternalMemory => Some(vk::API_VERSION_1_1),
            Self::ImageFormatList
            | Self::ImagelessFramebuffer
            | Self::DriverProperties
            | Self::TimelineSemaphore
            | Self::DescriptorIndexing
            | Self::ShaderFloat16Int8
            | Self::DrawIndirectCount
            | Self::BufferDeviceAddress => Some(vk::API_VERSION_1_2),
            Self::ImageRobustness
            | Self::ZeroInitializeWorkgroupMemory
            | Self::TextureCompressionAstcHdr => Some(vk::API_VERSION_1_3),
            _ => None,
        }
    }

    const fn depends_on(self) -> &'static [Self] {
        match self {
            Self::SwapchainMutableFormat => {
                &[Self::Swapchain, Self::ImageFormatList, Self::Maintenance2]
            }
            Self::ImagelessFramebuffer => &[Self::ImageFormatList, Self::Maintenance2],
            Self::SamplerYcbcrConversion => &[Self::Maintenance1],
            Self::DescriptorIndexing => &[Self::Maintenance3],
            Self::AccelerationStructure => &[
                Self::DeferredHostOperations,
                Self::DescriptorIndexing,
                Self::BufferDeviceAddress,
            ],
            Self::RayQuery => &[Self::AccelerationStructure],
            Self::ImageDrmFormatModifier => &[Self::ImageFormatList],
            _ => &[],
        }
    }

    /// The instance-level extension this device extension cannot be used
    /// without, if any.
    const fn instance_prerequisite(self) -> Option<InstanceExtension> {
        match self {
            Self::Swapchain | Self::SwapchainMutableFormat => Some(InstanceExtension::Surface),
            Self::ExternalMemory => Some(InstanceExtension::ExternalMemoryCapabilities),
            Self::PortabilitySubset => Some(InstanceExtension::PortabilityEnumeration),
            Self::DescriptorIndexing | Self::Robustness2 | Self::CooperativeMatrix => {
                Some(InstanceExtension::GetPhysicalDeviceProperties2)
            }
            _ => None,
        }
    }
}

macro_rules! extension_set {
    ($set:ident, $extension:ty, $bits:ty) => {
        #[derive(Clone, Copy, Default, PartialEq, Eq)]
        pub struct $set {
            bits: $bits,
        }

        impl $set {
            pub fn from_properties(properties: &[vk::ExtensionProperties]) -> Self {
                let mut set = Self::default();
                for ep in properties {
                    let Ok(name) = ep.extension_name_as_c_str() else {
                        continue;
                    };
                    if let Some(&known) =
                        <$extension>::ALL.iter().find(|known| known.name() == name)
                    {
                        set.insert(known);
                    }
                }
                set
            }

            pub fn contains(&self, extension: $extension) -> bool {
                self.bits & (1 << extension as u32) != 0
            }

            pub fn insert(&mut self, extension: $extension) {
                self.bits |= 1 << extension as u32;
            }

            pub fn remove(&mut self, extension: $extension) {
                self.bits &= !(1 << extension as u32);
            }

            pub fn iter(&self) -> impl Iterator<Item = $extension> + '_ {
                <$extension>::ALL
                    .iter()
                    .copied()
                    .filter(|extension| self.contains(*extension))
            }

            /// Forces on every extension folded into a core version at or
            /// below `api_version`. Promotion is monotonic in the version.
            pub fn mark_promoted(&mut self, api_version: u32) {
                for extension in <$extension>::ALL {
                    if let Some(version) = extension.promoted_in() {
                        if api_version >= version {
                            self.insert(extension);
                        }
                    }
                }
            }
        }

        impl std::fmt::Debug for $set {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_set().entries(self.iter()).finish()
            }
        }
    };
}

extension_set!(InstanceExtensionSet, InstanceExtension, u32);
extension_set!(DeviceExtensionSet, DeviceExtension, u64);

impl InstanceExtensionSet {
    /// Expands the set to its transitive dependency closure.
    ///
    /// Runs to a fixed point, so the result does not depend on the order the
    /// dependency table is declared in.
    pub fn ensure_dependencies(&mut self) {
        loop {
            let before = *self;
            for extension in self.iter().collect::<arrayvec::ArrayVec<_, 32>>() {
                for &dependency in extension.depends_on() {
                    self.insert(dependency);
                }
            }
            if before == *self {
                break;
            }
        }
    }
}

impl DeviceExtensionSet {
    /// Expands the set to its transitive dependency closure, then clears any
    /// extension whose instance-level prerequisite is missing from
    /// `instance_extensions`.
    ///
    /// A missing instance prerequisite does not fail resolution; the
    /// device-level bit alone is dropped.
    pub fn ensure_dependencies(&mut self, instance_extensions: &InstanceExtensionSet) {
        loop {
            let before = *self;
            for extension in self.iter().collect::<arrayvec::ArrayVec<_, 64>>() {
                for &dependency in extension.depends_on() {
                    self.insert(dependency);
                }
            }
            if before == *self {
                break;
            }
        }

        for extension in DeviceExtension::ALL {
            if !self.contains(extension) {
                continue;
            }
            if let Some(prerequisite) = extension.instance_prerequisite() {
                if !instance_extensions.contains(prerequisite) {
                    log::debug!(
                        "dropping {:?}: instance-level prerequisite {:?} is unavailable",
                        extension,
                        prerequisite
                    );
                    self.remove(extension);
                }
            }
        }
    }

    /// The canonical names of every extension in the set.
    pub fn enabled_names(&self) -> Vec<&'static CStr> {
        self.iter().map(DeviceExtension::name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_instance_set() -> InstanceExtensionSet {
        let mut set = InstanceExtensionSet::default();
        for extension in InstanceExtension::ALL {
            set.insert(extension);
        }
        set
    }

    #[test]
    fn dependency_closure_is_transitive() {
        let mut set = DeviceExtensionSet::default();
        set.insert(DeviceExtension::RayQuery);
        set.ensure_dependencies(&full_instance_set());

        // RayQuery -> AccelerationStructure -> DescriptorIndexing -> Maintenance3
        assert!(set.contains(DeviceExtension::AccelerationStructure));
        assert!(set.contains(DeviceExtension::DeferredHostOperations));
        assert!(set.contains(DeviceExtension::BufferDeviceAddress));
        assert!(set.contains(DeviceExtension::DescriptorIndexing));
        assert!(set.contains(DeviceExtension::Maintenance3));
    }

    #[test]
    fn dependency_closure_is_idempotent() {
        let mut once = DeviceExtensionSet::default();
        once.insert(DeviceExtension::SwapchainMutableFormat);
        once.insert(DeviceExtension::RayQuery);
        once.ensure_dependencies(&full_instance_set());

        let mut twice = once;
        twice.ensure_dependencies(&full_instance_set());
        assert_eq!(once, twice);
    }

    #[test]
    fn promotion_is_monotonic_in_api_version() {
        let mut at_1_1 = DeviceExtensionSet::default();
        at_1_1.mark_promoted(vk::API_VERSION_1_1);
        let mut at_1_3 = DeviceExtensionSet::default();
        at_1_3.mark_promoted(vk::API_VERSION_1_3);

        for extension in at_1_1.iter() {
            assert!(at_1_3.contains(extension));
        }
        assert!(at_1_1.contains(DeviceExtension::Maintenance1));
        assert!(!at_1_1.contains(DeviceExtension::TimelineSemaphore));
        assert!(at_1_3.contains(DeviceExtension::TimelineSemaphore));
        assert!(at_1_3.contains(DeviceExtension::ImageRobustness));
        assert!(!at_1_3.contains(DeviceExtension::Swapchain));
    }

    #[test]
    fn missing_instance_prerequisite_clears_device_bit() {
        let mut set = DeviceExtensionSet::default();
        set.insert(DeviceExtension::PortabilitySubset);
        set.insert(DeviceExtension::Maintenance1);

        let mut without = InstanceExtensionSet::default();
        without.insert(InstanceExtension::Surface);
        set.ensure_dependencies(&without);
        assert!(!set.contains(DeviceExtension::PortabilitySubset));
        assert!(set.contains(DeviceExtension::Maintenance1));

        let mut set = DeviceExtensionSet::default();
        set.insert(DeviceExtension::PortabilitySubset);
        set.ensure_dependencies(&full_instance_set());
        assert!(set.contains(DeviceExtension::PortabilitySubset));
    }

    #[test]
    fn prerequisite_filtering_applies_to_added_dependencies_too() {
        // SwapchainMutableFormat pulls in Swapchain, which itself needs the
        // surface instance extension; without it both must go.
        let mut set = DeviceExtensionSet::default();
        set.insert(DeviceExtension::SwapchainMutableFormat);
        set.ensure_dependencies(&InstanceExtensionSet::default());
        assert!(!set.contains(DeviceExtension::Swapchain));
        assert!(!set.contains(DeviceExtension::SwapchainMutableFormat));
        // The purely device-level dependencies stay.
        assert!(set.contains(DeviceExtension::ImageFormatList));
        assert!(set.contains(DeviceExtension::Maintenance2));
    }

    #[test]
    fn instance_surface_dependencies_close_over_surface() {
        let mut set = InstanceExtensionSet::default();
        set.insert(InstanceExtension::WaylandSurface);
        set.ensure_dependencies();
        assert!(set.contains(InstanceExtension::Surface));
    }

    #[test]
    fn raw_properties_round_trip() {
        let mut props = vk::ExtensionProperties::default();
        let name = DeviceExtension::Swapchain.name().to_bytes_with_nul();
        for (dst, &src) in props.extension_name.iter_mut().zip(name) {
            *dst = src as std::os::raw::c_char;
        }
        let set = DeviceExtensionSet::from_properties(&[props]);
        assert!(set.contains(DeviceExtension::Swapchain));
        assert!(!set.contains(DeviceExtension::Maintenance1));
    }
}
