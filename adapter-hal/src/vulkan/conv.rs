use ash::vk;

use adapter_types as adt;

pub fn map_device_type(device_type: vk::PhysicalDeviceType) -> adt::DeviceType {
    match device_type {
        vk::PhysicalDeviceType::OTHER => adt::DeviceType::Other,
        vk::PhysicalDeviceType::INTEGRATED_GPU => adt::DeviceType::IntegratedGpu,
        vk::PhysicalDeviceType::DISCRETE_GPU => adt::DeviceType::DiscreteGpu,
        vk::PhysicalDeviceType::VIRTUAL_GPU => adt::DeviceType::VirtualGpu,
        vk::PhysicalDeviceType::CPU => adt::DeviceType::Cpu,
        _ => adt::DeviceType::Other,
    }
}

pub fn map_texture_format(format: adt::TextureFormat) -> vk::Format {
    use adt::TextureFormat as Tf;
    use ash::vk::Format as F;
    match format {
        Tf::Bgra8Unorm => F::B8G8R8A8_UNORM,
        Tf::Bgra8UnormSrgb => F::B8G8R8A8_SRGB,
        Tf::Rgba8Unorm => F::R8G8B8A8_UNORM,
        Tf::Rgba8UnormSrgb => F::R8G8B8A8_SRGB,
        Tf::Rgba16Float => F::R16G16B16A16_SFLOAT,
        Tf::Rgb10a2Unorm => F::A2B10G10R10_UNORM_PACK32,
    }
}

/// Translates a native surface format to the portable vocabulary.
///
/// Only color-space-correct pairs are accepted: a pixel format reported with
/// anything but its expected color space is unsupported, never substituted.
pub fn map_vk_surface_format(surface_format: vk::SurfaceFormatKHR) -> Option<adt::TextureFormat> {
    use adt::TextureFormat as Tf;
    match (surface_format.format, surface_format.color_space) {
        (vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR) => Some(Tf::Bgra8Unorm),
        (vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR) => Some(Tf::Bgra8UnormSrgb),
        (vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR) => Some(Tf::Rgba8Unorm),
        (vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR) => Some(Tf::Rgba8UnormSrgb),
        (vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT) => {
            Some(Tf::Rgba16Float)
        }
        (vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::HDR10_ST2084_EXT) => {
            Some(Tf::Rgb10a2Unorm)
        }
        _ => None,
    }
}

/// Native usage bits with no portable equivalent are ignored, which keeps the
/// mapping forward compatible with bits newer than this table.
pub fn map_vk_image_usage(usage: vk::ImageUsageFlags) -> crate::TextureUses {
    let mut bits = crate::TextureUses::empty();
    if usage.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
        bits |= crate::TextureUses::COPY_SRC;
    }
    if usage.contains(vk::ImageUsageFlags::TRANSFER_DST) {
        bits |= crate::TextureUses::COPY_DST;
    }
    if usage.contains(vk::ImageUsageFlags::SAMPLED) {
        bits |= crate::TextureUses::SAMPLED;
    }
    if usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT) {
        bits |= crate::TextureUses::COLOR_TARGET;
    }
    if usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        bits |= crate::TextureUses::DEPTH_STENCIL_READ | crate::TextureUses::DEPTH_STENCIL_WRITE;
    }
    if usage.contains(vk::ImageUsageFlags::STORAGE) {
        bits |= crate::TextureUses::STORAGE_LOAD | crate::TextureUses::STORAGE_STORE;
    }
    bits
}

pub fn map_vk_present_mode(mode: vk::PresentModeKHR) -> Option<adt::PresentMode> {
    if mode == vk::PresentModeKHR::IMMEDIATE {
        Some(adt::PresentMode::Immediate)
    } else if mode == vk::PresentModeKHR::MAILBOX {
        Some(adt::PresentMode::Mailbox)
    } else if mode == vk::PresentModeKHR::FIFO_RELAXED {
        Some(adt::PresentMode::FifoRelaxed)
    } else if mode == vk::PresentModeKHR::FIFO {
        Some(adt::PresentMode::Fifo)
    } else {
        log::warn!("Unrecognized present mode {:?}", mode);
        None
    }
}

/// Picks the present mode to configure a surface with.
///
/// The requested mode wins when the surface supports it. Otherwise the search
/// starts at the requested mode's position in
/// [`adt::PresentMode::FALLBACK_ORDER`] and walks toward the front of the
/// chain (lower-latency modes) first; only if nothing in front matches does
/// it degrade toward `Fifo` at the back.
pub fn choose_present_mode(
    requested: adt::PresentMode,
    supported: &[adt::PresentMode],
) -> Option<adt::PresentMode> {
    let order = &adt::PresentMode::FALLBACK_ORDER;
    let start = requested as usize;
    order[..=start]
        .iter()
        .rev()
        .chain(order[start + 1..].iter())
        .copied()
        .find(|mode| supported.contains(mode))
}

/// Appends each supported alpha mode in the table's priority order; the
/// output ordering is part of the contract.
pub fn map_vk_composite_alpha(flags: vk::CompositeAlphaFlagsKHR) -> Vec<adt::CompositeAlphaMode> {
    let table = [
        (vk::CompositeAlphaFlagsKHR::OPAQUE, adt::CompositeAlphaMode::Opaque),
        (
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            adt::CompositeAlphaMode::PreMultiplied,
        ),
        (
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
            adt::CompositeAlphaMode::PostMultiplied,
        ),
        (
            vk::CompositeAlphaFlagsKHR::INHERIT,
            adt::CompositeAlphaMode::Inherit,
        ),
    ];
    table
        .iter()
        .filter(|&&(bit, _)| flags.contains(bit))
        .map(|&(_, mode)| mode)
        .collect()
}

pub fn map_component_type(
    component: vk::ComponentTypeKHR,
) -> Option<adt::SubgroupMatrixComponentType> {
    use adt::SubgroupMatrixComponentType as Ct;
    match component {
        vk::ComponentTypeKHR::FLOAT32 => Some(Ct::F32),
        vk::ComponentTypeKHR::FLOAT16 => Some(Ct::F16),
        vk::ComponentTypeKHR::UINT32 => Some(Ct::U32),
        vk::ComponentTypeKHR::SINT32 => Some(Ct::I32),
        vk::ComponentTypeKHR::UINT8 => Some(Ct::U8),
        vk::ComponentTypeKHR::SINT8 => Some(Ct::I8),
        _ => None,
    }
}

/// Translates the native memory layout into per-heap descriptions, merging
/// the flags of every memory type backed by a heap.
///
/// A host-visible type without the native host-cached bit is marked
/// `HOST_UNCACHED`; types that are not host visible get neither cache flag.
pub fn map_memory_properties(
    memory: &vk::PhysicalDeviceMemoryProperties,
) -> Vec<adt::MemoryHeapInfo> {
    let heaps = &memory.memory_heaps[..memory.memory_heap_count as usize];
    let types = &memory.memory_types[..memory.memory_type_count as usize];

    heaps
        .iter()
        .enumerate()
        .map(|(heap_index, heap)| {
            let mut properties = adt::HeapProperties::empty();
            if heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL) {
                properties |= adt::HeapProperties::DEVICE_LOCAL;
            }
            for memory_type in types
                .iter()
                .filter(|memory_type| memory_type.heap_index as usize == heap_index)
            {
                let flags = memory_type.property_flags;
                if flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL) {
                    properties |= adt::HeapProperties::DEVICE_LOCAL;
                }
                if flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
                    properties |= adt::HeapProperties::HOST_VISIBLE;
                    if flags.contains(vk::MemoryPropertyFlags::HOST_CACHED) {
                        properties |= adt::HeapProperties::HOST_CACHED;
                    } else {
                        properties |= adt::HeapProperties::HOST_UNCACHED;
                    }
                }
                if flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
                    properties |= adt::HeapProperties::HOST_COHERENT;
                }
            }
            adt::MemoryHeapInfo {
                size: heap.size,
                properties,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_format_requires_matching_color_space() {
        let good = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            map_vk_surface_format(good),
            Some(adt::TextureFormat::Bgra8UnormSrgb)
        );

        // The right format in the wrong color space is unsupported, not
        // substituted.
        let wrong_space = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        assert_eq!(map_vk_surface_format(wrong_space), None);
    }

    #[test]
    fn translation_never_fabricates_values() {
        let native = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R5G6B5_UNORM_PACK16,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let translated: Vec<_> = native
            .iter()
            .filter_map(|&sf| map_vk_surface_format(sf))
            .collect();
        // Each output corresponds to exactly one native entry; the
        // untranslatable one is dropped, nothing is invented.
        assert_eq!(translated, vec![adt::TextureFormat::Bgra8Unorm]);
    }

    #[test]
    fn unmapped_usage_bits_are_ignored() {
        let usage = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::FRAGMENT_DENSITY_MAP_EXT;
        assert_eq!(
            map_vk_image_usage(usage),
            crate::TextureUses::COLOR_TARGET | crate::TextureUses::COPY_DST
        );
    }

    #[test]
    fn present_mode_fallback_prefers_the_front_of_the_chain() {
        use adt::PresentMode as Pm;

        // Requested and supported: no fallback.
        assert_eq!(
            choose_present_mode(Pm::Mailbox, &[Pm::Fifo, Pm::Mailbox]),
            Some(Pm::Mailbox)
        );
        // The tie-break: search starts at the requested mode and walks
        // toward the front of the chain before degrading to Fifo.
        assert_eq!(
            choose_present_mode(Pm::Mailbox, &[Pm::Fifo, Pm::Immediate]),
            Some(Pm::Immediate)
        );
        // Nothing in front: degrade towards Fifo.
        assert_eq!(
            choose_present_mode(Pm::Mailbox, &[Pm::Fifo]),
            Some(Pm::Fifo)
        );
        assert_eq!(choose_present_mode(Pm::Immediate, &[]), None);
    }

    #[test]
    fn composite_alpha_preserves_table_order() {
        let flags = vk::CompositeAlphaFlagsKHR::INHERIT | vk::CompositeAlphaFlagsKHR::OPAQUE;
        assert_eq!(
            map_vk_composite_alpha(flags),
            vec![
                adt::CompositeAlphaMode::Opaque,
                adt::CompositeAlphaMode::Inherit
            ]
        );
    }

    #[test]
    fn memory_heaps_follow_the_cache_flag_rule() {
        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 1,
            memory_type_count: 1,
            ..Default::default()
        };
        memory.memory_heaps[0] = vk::MemoryHeap {
            size: 256 << 20,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory.memory_types[0] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            heap_index: 0,
        };

        let heaps = map_memory_properties(&memory);
        assert_eq!(heaps.len(), 1);
        assert_eq!(heaps[0].size, 256 << 20);
        // Device local, not host visible, and in particular neither cache
        // flag: HOST_UNCACHED only applies to host-visible types.
        assert_eq!(heaps[0].properties, adt::HeapProperties::DEVICE_LOCAL);

        memory.memory_type_count = 2;
        memory.memory_types[1] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            heap_index: 0,
        };
        let heaps = map_memory_properties(&memory);
        assert_eq!(
            heaps[0].properties,
            adt::HeapProperties::DEVICE_LOCAL
                | adt::HeapProperties::HOST_VISIBLE
                | adt::HeapProperties::HOST_COHERENT
                | adt::HeapProperties::HOST_UNCACHED
        );

        memory.memory_types[1].property_flags |= vk::MemoryPropertyFlags::HOST_CACHED;
        let heaps = map_memory_properties(&memory);
        assert!(heaps[0]
            .properties
            .contains(adt::HeapProperties::HOST_CACHED));
        assert!(!heaps[0]
            .properties
            .contains(adt::HeapProperties::HOST_UNCACHED));
    }
}
