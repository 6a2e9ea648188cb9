/*! This library describes the portable adapter vocabulary that is agnostic of
 *  the native backend: features, limits, adapter identity and the surface
 *  presentation enums. The hardware abstraction crate fills these types in
 *  from whatever the native driver reports.
 */

#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
)]
#![warn(missing_docs, unsafe_op_in_unsafe_fn)]

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::fmt;

use bitflags::bitflags;

/// Integral type used for buffer slice sizes.
pub type BufferSize = std::num::NonZeroU64;

// Serialization for the bitflags types round-trips the raw bits; bits that
// are unknown to this version survive a round trip instead of failing it.
macro_rules! impl_bitflags {
    ($name:ident) => {
        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                self.bits().serialize(serializer)
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<$name, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = <_ as serde::Deserialize<'de>>::deserialize(deserializer)?;
                Ok($name::from_bits_retain(value))
            }
        }

        impl $name {
            /// Returns true if the bitflags contains bits that are not part
            /// of the bitflags definition.
            pub fn contains_invalid_bits(&self) -> bool {
                let all = Self::all().bits();
                (self.bits() | all) != all
            }
        }
    };
}

bitflags! {
    /// Features that the capability policy may expose on an adapter.
    ///
    /// Every flag is tied to one or more native preconditions (an extension,
    /// a feature-struct boolean, a property threshold), possibly masked by a
    /// vendor/driver quirk. A flag being absent means the precondition did
    /// not hold on this adapter, not that the request was invalid.
    #[repr(transparent)]
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Features: u64 {
        /// Buffers in device-local memory can be mapped by the host.
        const MAPPABLE_PRIMARY_BUFFERS = 1 << 0;
        /// Push constant storage is available to pipelines.
        const PUSH_CONSTANTS = 1 << 1;
        /// Samplers support the clamp-to-border address mode.
        const ADDRESS_MODE_CLAMP_TO_BORDER = 1 << 2;
        /// Timestamp queries are supported.
        const TIMESTAMP_QUERY = 1 << 3;
        /// Pipeline statistics queries are supported.
        const PIPELINE_STATISTICS_QUERY = 1 << 4;
        /// Indirect draws may specify a non-zero first instance.
        const INDIRECT_FIRST_INSTANCE = 1 << 5;
        /// Multiple indirect draws can be issued from one buffer.
        const MULTI_DRAW_INDIRECT = 1 << 6;
        /// The indirect draw count can itself come from a buffer.
        const MULTI_DRAW_INDIRECT_COUNT = 1 << 7;
        /// Line polygon mode rasterization.
        const POLYGON_MODE_LINE = 1 << 8;
        /// Point polygon mode rasterization.
        const POLYGON_MODE_POINT = 1 << 9;
        /// Depth clamping instead of clipping.
        const DEPTH_CLIP_CONTROL = 1 << 10;
        /// The packed depth32float-stencil8 attachment format.
        const DEPTH32FLOAT_STENCIL8 = 1 << 11;
        /// BC compressed texture formats.
        const TEXTURE_COMPRESSION_BC = 1 << 12;
        /// ETC2 compressed texture formats.
        const TEXTURE_COMPRESSION_ETC2 = 1 << 13;
        /// ASTC LDR compressed texture formats.
        const TEXTURE_COMPRESSION_ASTC = 1 << 14;
        /// ASTC HDR compressed texture formats.
        const TEXTURE_COMPRESSION_ASTC_HDR = 1 << 15;
        /// Storage writes from the vertex stage.
        const VERTEX_WRITABLE_STORAGE = 1 << 16;
        /// Rendering to multiple array layers in one pass.
        const MULTIVIEW = 1 << 17;
        /// 64-bit floats in shaders.
        const SHADER_F64 = 1 << 18;
        /// 16-bit ints in shaders.
        const SHADER_I16 = 1 << 19;
        /// 16-bit floats in shaders and 16-bit storage access.
        const SHADER_F16 = 1 << 20;
        /// Dual source blending factors.
        const DUAL_SOURCE_BLENDING = 1 << 21;
        /// The rg11b10ufloat format is renderable and blendable.
        const RG11B10UFLOAT_RENDERABLE = 1 << 22;
        /// Bgra8Unorm can be used as a write-only storage image.
        const BGRA8UNORM_STORAGE = 1 << 23;
        /// 32-bit float textures can be filtered linearly.
        const FLOAT32_FILTERABLE = 1 << 24;
        /// The full family of 16-bit norm formats is usable.
        const TEXTURE_FORMAT_16BIT_NORM = 1 << 25;
        /// Arrays of sampled textures in bind groups.
        const TEXTURE_BINDING_ARRAY = 1 << 26;
        /// Arrays of buffers in bind groups.
        const BUFFER_BINDING_ARRAY = 1 << 27;
        /// Arrays of storage buffers/textures in bind groups.
        const STORAGE_RESOURCE_BINDING_ARRAY = 1 << 28;
        /// Binding arrays may be sparsely populated.
        const PARTIALLY_BOUND_BINDING_ARRAY = 1 << 29;
        /// Non-uniform indexing of sampled textures and storage buffers.
        const SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING = 1 << 30;
        /// Non-uniform indexing of uniform buffers and storage textures.
        const UNIFORM_BUFFER_AND_STORAGE_TEXTURE_ARRAY_NON_UNIFORM_INDEXING = 1 << 31;
        /// Conservative rasterization.
        const CONSERVATIVE_RASTERIZATION = 1 << 32;
        /// Acceleration structure building and usage.
        const RAY_TRACING_ACCELERATION_STRUCTURE = 1 << 33;
        /// Ray queries from any shader stage.
        const RAY_QUERY = 1 << 34;
        /// Cooperative subgroup matrix multiply configurations are exposed.
        const SUBGROUP_MATRIX = 1 << 35;
    }
}

impl_bitflags!(Features);

/// A named bar of mandatory features and limits a device must clear to be
/// usable at that level.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CapabilityTier {
    /// The full feature bar.
    Core,
    /// The reduced bar for older or constrained hardware.
    Compatibility,
}

impl CapabilityTier {
    /// The baseline limits this tier requires.
    pub fn baseline_limits(self) -> Limits {
        match self {
            Self::Core => Limits::default(),
            Self::Compatibility => Limits::compatibility_defaults(),
        }
    }
}

/// Represents the set of limits an adapter supports.
///
/// Two baselines exist, one per [`CapabilityTier`]:
/// - [`Limits::default()`] is the `Core` tier baseline.
/// - [`Limits::compatibility_defaults()`] is the reduced `Compatibility` tier
///   baseline; every one of its bounds is the same or looser than the core
///   baseline.
///
/// A populated record handed out by an adapter is guaranteed to be at least
/// as good as the baseline of the tier it was negotiated at, and equal to the
/// native driver value wherever a single native counterpart exists.
#[repr(C)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Limits {
    /// Maximum width of a 1D texture. Higher is "better".
    pub max_texture_dimension_1d: u32,
    /// Maximum width/height of a 2D texture. Higher is "better".
    pub max_texture_dimension_2d: u32,
    /// Maximum extent of a 3D texture. Higher is "better".
    pub max_texture_dimension_3d: u32,
    /// Maximum layer count of a 2D array texture. Higher is "better".
    pub max_texture_array_layers: u32,
    /// Number of bind groups attachable to a pipeline. Higher is "better".
    pub max_bind_groups: u32,
    /// Maximum binding index in a bind group layout.
    pub max_bindings_per_bind_group: u32,
    /// Dynamic uniform buffer bindings per pipeline layout. Higher is "better".
    pub max_dynamic_uniform_buffers_per_pipeline_layout: u32,
    /// Dynamic storage buffer bindings per pipeline layout. Higher is "better".
    pub max_dynamic_storage_buffers_per_pipeline_layout: u32,
    /// Sampled textures visible to a single shader stage. Higher is "better".
    pub max_sampled_textures_per_shader_stage: u32,
    /// Samplers visible to a single shader stage. Higher is "better".
    pub max_samplers_per_shader_stage: u32,
    /// Storage buffers visible to a single shader stage. Higher is "better".
    pub max_storage_buffers_per_shader_stage: u32,
    /// Storage textures visible to a single shader stage. Higher is "better".
    pub max_storage_textures_per_shader_stage: u32,
    /// Uniform buffers visible to a single shader stage. Higher is "better".
    pub max_uniform_buffers_per_shader_stage: u32,
    /// Maximum size in bytes of a uniform buffer binding. Higher is "better".
    pub max_uniform_buffer_binding_size: u32,
    /// Maximum size in bytes of a storage buffer binding. Higher is "better".
    pub max_storage_buffer_binding_size: u32,
    /// Maximum number of vertex buffers. Higher is "better".
    pub max_vertex_buffers: u32,
    /// Maximum number of vertex attributes. Higher is "better".
    pub max_vertex_attributes: u32,
    /// Maximum vertex buffer array stride. Higher is "better".
    pub max_vertex_buffer_array_stride: u32,
    /// Push constant storage in bytes. Higher is "better".
    pub max_push_constant_size: u32,
    /// Required uniform buffer offset alignment. Lower is "better".
    pub min_uniform_buffer_offset_alignment: u32,
    /// Required storage buffer offset alignment. Lower is "better".
    pub min_storage_buffer_offset_alignment: u32,
    /// Scalar components available for inter-stage communication.
    pub max_inter_stage_shader_components: u32,
    /// Color attachments in a render pass. Higher is "better".
    pub max_color_attachments: u32,
    /// Workgroup memory per compute entry point, in bytes.
    pub max_compute_workgroup_storage_size: u32,
    /// Product of the workgroup size dimensions of a compute entry point.
    pub max_compute_invocations_per_workgroup: u32,
    /// Maximum compute workgroup X dimension.
    pub max_compute_workgroup_size_x: u32,
    /// Maximum compute workgroup Y dimension.
    pub max_compute_workgroup_size_y: u32,
    /// Maximum compute workgroup Z dimension.
    pub max_compute_workgroup_size_z: u32,
    /// Maximum value for each dimension of a dispatch.
    pub max_compute_workgroups_per_dimension: u32,
    /// A size above which buffer allocations are guaranteed to fail.
    pub max_buffer_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_texture_dimension_1d: 8192,
            max_texture_dimension_2d: 8192,
            max_texture_dimension_3d: 2048,
            max_texture_array_layers: 256,
            max_bind_groups: 4,
            max_bindings_per_bind_group: 1000,
            max_dynamic_uniform_buffers_per_pipeline_layout: 8,
            max_dynamic_storage_buffers_per_pipeline_layout: 4,
            max_sampled_textures_per_shader_stage: 16,
            max_samplers_per_shader_stage: 16,
            max_storage_buffers_per_shader_stage: 8,
            max_storage_textures_per_shader_stage: 4,
            max_uniform_buffers_per_shader_stage: 12,
            max_uniform_buffer_binding_size: 64 << 10,
            max_storage_buffer_binding_size: 128 << 20,
            max_vertex_buffers: 8,
            max_vertex_attributes: 16,
            max_vertex_buffer_array_stride: 2048,
            max_push_constant_size: 128,
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 256,
            max_inter_stage_shader_components: 60,
            max_color_attachments: 8,
            max_compute_workgroup_storage_size: 16384,
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_compute_workgroups_per_dimension: 65535,
            max_buffer_size: 1 << 28,
        }
    }
}

impl Limits {
    /// The `Compatibility` tier baseline, low enough for older mobile parts
    /// and software implementations.
    pub fn compatibility_defaults() -> Self {
        Self {
            max_texture_dimension_1d: 2048,
            max_texture_dimension_2d: 2048,
            max_texture_dimension_3d: 256,
            max_storage_buffers_per_shader_stage: 4,
            max_uniform_buffer_binding_size: 16 << 10,
            max_push_constant_size: 0,
            max_color_attachments: 4,
            max_compute_workgroup_storage_size: 16352,
            ..Self::default()
        }
    }

    /// Compares every limit in `self` against the bound given in `allowed`.
    ///
    /// For detailed information on failures, use
    /// [`Limits::check_limits_with_fail_fn`].
    pub fn check_limits(&self, allowed: &Self) -> bool {
        let mut within = true;
        self.check_limits_with_fail_fn(allowed, true, |_, _, _| within = false);
        within
    }

    /// Compares every limit in `self` against the bound given in `allowed`,
    /// calling `fail_fn` with the limit name, self's value and the allowed
    /// value for every violation.
    ///
    /// The comparison order below is fixed; diagnostics that report the first
    /// failing limit are stable because of it. If `fatal` is true the
    /// comparison bails out after the first failure.
    pub fn check_limits_with_fail_fn(
        &self,
        allowed: &Self,
        fatal: bool,
        mut fail_fn: impl FnMut(&'static str, u64, u64),
    ) {
        use std::cmp::Ordering;

        macro_rules! compare {
            ($name:ident, $ordering:ident) => {
                match self.$name.cmp(&allowed.$name) {
                    Ordering::$ordering | Ordering::Equal => (),
                    _ => {
                        fail_fn(stringify!($name), self.$name as u64, allowed.$name as u64);
                        if fatal {
                            return;
                        }
                    }
                }
            };
        }

        compare!(max_texture_dimension_1d, Greater);
        compare!(max_texture_dimension_2d, Greater);
        compare!(max_texture_dimension_3d, Greater);
        compare!(max_texture_array_layers, Greater);
        compare!(max_bind_groups, Greater);
        compare!(max_bindings_per_bind_group, Greater);
        compare!(max_dynamic_uniform_buffers_per_pipeline_layout, Greater);
        compare!(max_dynamic_storage_buffers_per_pipeline_layout, Greater);
        compare!(max_sampled_textures_per_shader_stage, Greater);
        compare!(max_samplers_per_shader_stage, Greater);
        compare!(max_storage_buffers_per_shader_stage, Greater);
        compare!(max_storage_textures_per_shader_stage, Greater);
        compare!(max_uniform_buffers_per_shader_stage, Greater);
        compare!(max_uniform_buffer_binding_size, Greater);
        compare!(max_storage_buffer_binding_size, Greater);
        compare!(max_vertex_buffers, Greater);
        compare!(max_vertex_attributes, Greater);
        compare!(max_vertex_buffer_array_stride, Greater);
        compare!(max_push_constant_size, Greater);
        compare!(min_uniform_buffer_offset_alignment, Less);
        compare!(min_storage_buffer_offset_alignment, Less);
        compare!(max_inter_stage_shader_components, Greater);
        compare!(max_color_attachments, Greater);
        compare!(max_compute_workgroup_storage_size, Greater);
        compare!(max_compute_invocations_per_workgroup, Greater);
        compare!(max_compute_workgroup_size_x, Greater);
        compare!(max_compute_workgroup_size_y, Greater);
        compare!(max_compute_workgroup_size_z, Greater);
        compare!(max_compute_workgroups_per_dimension, Greater);
        compare!(max_buffer_size, Greater);
    }
}

/// Supported physical device types.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DeviceType {
    /// The device could not be classified.
    Other,
    /// A GPU sharing memory with the host.
    IntegratedGpu,
    /// A GPU with dedicated memory.
    DiscreteGpu,
    /// A GPU virtualized by an environment such as a VM.
    VirtualGpu,
    /// A software rasterizer running on the CPU.
    Cpu,
}

/// Backends the adapter vocabulary can describe.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Backend {
    /// Dummy backend, used for testing.
    Empty = 0,
    /// Vulkan API.
    Vulkan = 1,
}

/// A structured driver version, decoded from the native packed value with
/// vendor-specific rules.
#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriverVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch or sub-minor version.
    pub patch: u32,
    /// Vendor-specific build component; zero when the vendor packs only
    /// three fields.
    pub build: u32,
}

impl DriverVersion {
    /// Builds a version from explicit components.
    pub const fn new(major: u32, minor: u32, patch: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }
}

impl fmt::Display for DriverVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.patch, self.build
        )
    }
}

/// Information about an adapter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdapterInfo {
    /// Adapter name, reported by the driver.
    pub name: String,
    /// PCI vendor id of the adapter.
    pub vendor: u32,
    /// PCI device id of the adapter.
    pub device: u32,
    /// Classification of the adapter.
    pub device_type: DeviceType,
    /// Driver name, when the driver reports one.
    pub driver: String,
    /// Free-form driver description.
    pub driver_info: String,
    /// Decoded driver version.
    pub driver_version: DriverVersion,
    /// Backend the adapter belongs to.
    pub backend: Backend,
}

bitflags! {
    /// Instance creation flags.
    #[repr(transparent)]
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct InstanceFlags: u32 {
        /// Enable debug labeling and the debug messenger.
        const DEBUG = 1 << 0;
        /// Enable the validation layer when present.
        const VALIDATION = 1 << 1;
        /// Expose adapters whose driver reports no conformance test pass.
        const ALLOW_NONCOMPLIANT_ADAPTER = 1 << 2;
    }
}

impl_bitflags!(InstanceFlags);

/// Policy selecting which native instances to create and which devices to
/// surface from them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DiscoveryStrategy {
    /// Expose every usable device, hardware implementations listed first.
    #[default]
    PreferHardware,
    /// Only expose CPU/software implementations.
    SoftwareOnly,
}

/// Presentation mode of a surface.
///
/// The declaration order is the fallback chain: when a requested mode is not
/// supported, selection continues down the list starting at the requested
/// mode's own position.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PresentMode {
    /// Present immediately, tearing allowed.
    Immediate = 0,
    /// Wait for v-sync, replacing the queued frame.
    Mailbox = 1,
    /// Wait for v-sync unless the frame is already late.
    FifoRelaxed = 2,
    /// Present frames strictly in submission order.
    Fifo = 3,
}

impl PresentMode {
    /// The fallback chain, in priority order.
    pub const FALLBACK_ORDER: [Self; 4] =
        [Self::Immediate, Self::Mailbox, Self::FifoRelaxed, Self::Fifo];
}

/// How the alpha channel of surface textures is composited.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CompositeAlphaMode {
    /// Alpha is ignored; textures are treated as fully opaque.
    Opaque,
    /// Color channels are already multiplied by alpha.
    PreMultiplied,
    /// The compositor multiplies color channels by alpha.
    PostMultiplied,
    /// The windowing system decides.
    Inherit,
}

/// Pixel formats a surface can be configured with.
///
/// This is deliberately the presentable subset, not a full texture format
/// enumeration.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TextureFormat {
    /// 8-bit BGRA, linear.
    Bgra8Unorm,
    /// 8-bit BGRA, sRGB transfer function.
    Bgra8UnormSrgb,
    /// 8-bit RGBA, linear.
    Rgba8Unorm,
    /// 8-bit RGBA, sRGB transfer function.
    Rgba8UnormSrgb,
    /// 16-bit float RGBA, used for wide gamut output.
    Rgba16Float,
    /// 10-bit color with 2-bit alpha.
    Rgb10a2Unorm,
}

/// Extent of a texture or surface.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Extent3d {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth of a 3D texture or number of array layers.
    pub depth_or_array_layers: u32,
}

bitflags! {
    /// Properties of a memory heap, merged from the memory types backed by it.
    #[repr(transparent)]
    #[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct HeapProperties: u32 {
        /// The heap is local to the device.
        const DEVICE_LOCAL = 1 << 0;
        /// At least one memory type in the heap is mappable.
        const HOST_VISIBLE = 1 << 1;
        /// Host writes are visible without explicit flushes.
        const HOST_COHERENT = 1 << 2;
        /// Host reads go through a CPU cache.
        const HOST_CACHED = 1 << 3;
        /// Host access is uncached; reads are expensive.
        const HOST_UNCACHED = 1 << 4;
    }
}

impl_bitflags!(HeapProperties);

/// Description of one native memory heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MemoryHeapInfo {
    /// Heap size in bytes.
    pub size: u64,
    /// Merged properties of the memory types placed in this heap.
    pub properties: HeapProperties,
}

/// Scalar type of a subgroup matrix operand or accumulator.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SubgroupMatrixComponentType {
    /// 32-bit float.
    F32,
    /// 16-bit float.
    F16,
    /// 32-bit unsigned int.
    U32,
    /// 32-bit signed int.
    I32,
    /// 8-bit unsigned int.
    U8,
    /// 8-bit signed int.
    I8,
}

/// One supported subgroup matrix multiply configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubgroupMatrixConfig {
    /// Scalar type of both multiplicands.
    pub component_type: SubgroupMatrixComponentType,
    /// Scalar type of the accumulator and result.
    pub result_component_type: SubgroupMatrixComponentType,
    /// Rows of the left matrix and the result.
    pub m: u32,
    /// Columns of the right matrix and the result.
    pub n: u32,
    /// Columns of the left matrix / rows of the right matrix.
    pub k: u32,
}

/// Capabilities of one DRM format modifier for a pixel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DrmModifierCaps {
    /// The opaque modifier value.
    pub modifier: u64,
    /// Number of memory planes the layout uses.
    pub plane_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_baseline_is_not_stricter_than_core() {
        // Every core-tier value must satisfy the compatibility baseline,
        // otherwise the tier fallback could reject a device that core
        // accepted.
        assert!(Limits::default().check_limits(&Limits::compatibility_defaults()));
    }

    #[test]
    fn check_limits_reports_first_failure_only_when_fatal() {
        let baseline = Limits::default();
        let mut bad = Limits::default();
        bad.max_texture_dimension_2d = 4096;
        bad.max_bind_groups = 2;

        let mut failures = Vec::new();
        bad.check_limits_with_fail_fn(&baseline, true, |name, value, allowed| {
            failures.push((name, value, allowed));
        });
        assert_eq!(failures, vec![("max_texture_dimension_2d", 4096, 8192)]);

        failures.clear();
        bad.check_limits_with_fail_fn(&baseline, false, |name, value, allowed| {
            failures.push((name, value, allowed));
        });
        assert_eq!(
            failures,
            vec![
                ("max_texture_dimension_2d", 4096, 8192),
                ("max_bind_groups", 2, 4),
            ]
        );
    }

    #[test]
    fn alignment_limits_compare_downwards() {
        let baseline = Limits::default();
        let mut loose = Limits::default();
        loose.min_uniform_buffer_offset_alignment = 64;
        assert!(loose.check_limits(&baseline));

        let mut strict = Limits::default();
        strict.min_storage_buffer_offset_alignment = 512;
        assert!(!strict.check_limits(&baseline));
    }

    #[test]
    fn present_mode_fallback_order_matches_discriminants() {
        for (index, mode) in PresentMode::FALLBACK_ORDER.iter().enumerate() {
            assert_eq!(*mode as usize, index);
        }
    }
}
