use super::{
    conv,
    extensions::{DeviceExtension as Ext, DeviceExtensionSet},
    info,
};

use ash::vk;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::auxil::{self, db};
use adapter_types as adt;

fn depth_stencil_required_flags() -> vk::FormatFeatureFlags {
    vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
}

/// A named condition over the immutable raw-info snapshot.
///
/// Workaround rules are expressed with these instead of inline conditionals,
/// so the whole override policy lives in one auditable table.
#[derive(Debug)]
pub(super) enum Predicate {
    VendorIs(u32),
    DeviceTypeIs(vk::PhysicalDeviceType),
    /// `device_id & mask == value`, for matching hardware generations.
    DeviceIdMasked { mask: u32, value: u32 },
    /// Matches the driver id reported through the driver-properties query;
    /// never matches when the driver did not report one.
    DriverIs(vk::DriverId),
    /// Raw packed driver version strictly below `.0` (exclusive bound).
    DriverVersionBelow(u32),
    /// Raw packed driver version within `first..=last` (inclusive bounds).
    #[allow(dead_code)]
    DriverVersionInRange { first: u32, last: u32 },
    OnWindows,
    OnLinux,
    /// The NVIDIA Optimus layer is active on this connection.
    NvOptimusPresent,
    All(&'static [Predicate]),
    Any(&'static [Predicate]),
    Not(&'static Predicate),
}

/// Evaluation inputs for the quirk table. The platform booleans are passed in
/// rather than read from `cfg!` so the table is testable everywhere.
pub(super) struct QuirkContext<'a> {
    pub caps: &'a PhysicalDeviceCapabilities,
    pub has_nv_optimus: bool,
    pub windows: bool,
    pub linux: bool,
}

impl Predicate {
    pub(super) fn evaluate(&self, ctx: &QuirkContext<'_>) -> bool {
        let props = &ctx.caps.properties;
        match *self {
            Self::VendorIs(vendor) => props.vendor_id == vendor,
            Self::DeviceTypeIs(device_type) => props.device_type == device_type,
            Self::DeviceIdMasked { mask, value } => props.device_id & mask == value,
            Self::DriverIs(driver_id) => ctx
                .caps
                .driver
                .map_or(false, |driver| driver.driver_id == driver_id),
            Self::DriverVersionBelow(bound) => props.driver_version < bound,
            Self::DriverVersionInRange { first, last } => {
                props.driver_version >= first && props.driver_version <= last
            }
            Self::OnWindows => ctx.windows,
            Self::OnLinux => ctx.linux,
            Self::NvOptimusPresent => ctx.has_nv_optimus,
            Self::All(predicates) => predicates.iter().all(|p| p.evaluate(ctx)),
            Self::Any(predicates) => predicates.iter().any(|p| p.evaluate(ctx)),
            Self::Not(predicate) => !predicate.evaluate(ctx),
        }
    }
}

/// One workaround rule: when `when` holds, the named features are forced off
/// regardless of what the driver advertises.
pub(super) struct Quirk {
    pub name: &'static str,
    pub disables: adt::Features,
    pub disables_presentation: bool,
    pub strips_extension: Option<Ext>,
    pub when: Predicate,
}

/// Last two fields of the four-part Intel Windows driver version 31.0.101.2115,
/// the earliest known good one for robustness2.
const INTEL_WINDOWS_ROBUSTNESS2_FIXED: u32 = (101 << 14) | 2115;

/// Mesa 21.2 in standard packing; earlier Mesa breaks presentation behind
/// NVIDIA Optimus.
const MESA_21_2: u32 = (21 << 22) | (2 << 12);

pub(super) const QUIRKS: &[Quirk] = &[
    Quirk {
        name: "intel-windows-partially-bound-descriptors",
        disables: adt::Features::PARTIALLY_BOUND_BINDING_ARRAY,
        disables_presentation: false,
        strips_extension: None,
        when: Predicate::All(&[
            Predicate::VendorIs(db::intel::VENDOR),
            Predicate::OnWindows,
        ]),
    },
    Quirk {
        name: "intel-windows-gen9-dual-source-blending",
        disables: adt::Features::DUAL_SOURCE_BLENDING,
        disables_presentation: false,
        strips_extension: None,
        when: Predicate::All(&[
            Predicate::VendorIs(db::intel::VENDOR),
            Predicate::OnWindows,
            Predicate::Any(&[
                Predicate::DeviceIdMasked {
                    mask: db::intel::DEVICE_KABY_LAKE_MASK,
                    value: db::intel::DEVICE_KABY_LAKE_MASK,
                },
                Predicate::DeviceIdMasked {
                    mask: db::intel::DEVICE_SKY_LAKE_MASK,
                    value: db::intel::DEVICE_SKY_LAKE_MASK,
                },
            ]),
        ]),
    },
    Quirk {
        name: "intel-igpu-outdated-robustness2",
        disables: adt::Features::empty(),
        disables_presentation: false,
        strips_extension: Some(Ext::Robustness2),
        when: Predicate::All(&[
            Predicate::VendorIs(db::intel::VENDOR),
            Predicate::DeviceTypeIs(vk::PhysicalDeviceType::INTEGRATED_GPU),
            Predicate::DriverIs(vk::DriverId::INTEL_PROPRIETARY_WINDOWS),
            Predicate::DriverVersionBelow(INTEL_WINDOWS_ROBUSTNESS2_FIXED),
        ]),
    },
    Quirk {
        name: "intel-mesa-optimus-presentation",
        disables: adt::Features::empty(),
        disables_presentation: true,
        strips_extension: None,
        when: Predicate::All(&[
            Predicate::OnLinux,
            Predicate::NvOptimusPresent,
            Predicate::VendorIs(db::intel::VENDOR),
            Predicate::DeviceTypeIs(vk::PhysicalDeviceType::INTEGRATED_GPU),
            Predicate::DriverIs(vk::DriverId::INTEL_OPEN_SOURCE_MESA),
            Predicate::DriverVersionBelow(MESA_21_2),
        ]),
    },
];

/// Aggregate of the `vk::PhysicalDevice*Features` structs gathered from the
/// driver.
#[derive(Debug, Default)]
pub struct PhysicalDeviceFeatures {
    pub(super) core: vk::PhysicalDeviceFeatures,
    pub(super) descriptor_indexing: Option<vk::PhysicalDeviceDescriptorIndexingFeatures<'static>>,
    pub(super) timeline_semaphore: Option<vk::PhysicalDeviceTimelineSemaphoreFeatures<'static>>,
    pub(super) image_robustness: Option<vk::PhysicalDeviceImageRobustnessFeatures<'static>>,
    pub(super) robustness2: Option<vk::PhysicalDeviceRobustness2FeaturesEXT<'static>>,
    pub(super) multiview: Option<vk::PhysicalDeviceMultiviewFeatures<'static>>,
    pub(super) sampler_ycbcr_conversion:
        Option<vk::PhysicalDeviceSamplerYcbcrConversionFeatures<'static>>,
    pub(super) astc_hdr: Option<vk::PhysicalDeviceTextureCompressionASTCHDRFeatures<'static>>,
    pub(super) shader_float16: Option<(
        vk::PhysicalDeviceShaderFloat16Int8Features<'static>,
        vk::PhysicalDevice16BitStorageFeatures<'static>,
    )>,
    pub(super) acceleration_structure:
        Option<vk::PhysicalDeviceAccelerationStructureFeaturesKHR<'static>>,
    pub(super) buffer_device_address:
        Option<vk::PhysicalDeviceBufferDeviceAddressFeaturesKHR<'static>>,
    pub(super) ray_query: Option<vk::PhysicalDeviceRayQueryFeaturesKHR<'static>>,
    pub(super) zero_initialize_workgroup_memory:
        Option<vk::PhysicalDeviceZeroInitializeWorkgroupMemoryFeatures<'static>>,
    pub(super) cooperative_matrix:
        Option<vk::PhysicalDeviceCooperativeMatrixFeaturesKHR<'static>>,
}

// This is safe because the structs have `p_next: *mut c_void`, which we null out/never read.
unsafe impl Send for PhysicalDeviceFeatures {}
unsafe impl Sync for PhysicalDeviceFeatures {}

type FeatureGetter = fn(&vk::PhysicalDeviceFeatures) -> vk::Bool32;

/// Feature booleans the core tier cannot do without, in the order they are
/// checked. The order is part of the contract: the first entry that fails is
/// the one named in the returned error.
const CORE_REQUIRED_FEATURES: &[(&str, FeatureGetter)] = &[
    ("robustBufferAccess", |f| f.robust_buffer_access),
    ("fullDrawIndexUint32", |f| f.full_draw_index_uint32),
    ("imageCubeArray", |f| f.image_cube_array),
    ("independentBlend", |f| f.independent_blend),
    ("sampleRateShading", |f| f.sample_rate_shading),
    ("fragmentStoresAndAtomics", |f| f.fragment_stores_and_atomics),
    ("depthBiasClamp", |f| f.depth_bias_clamp),
    ("samplerAnisotropy", |f| f.sampler_anisotropy),
];

/// The reduced bar for the compatibility tier, same ordering rules.
const COMPATIBILITY_REQUIRED_FEATURES: &[(&str, FeatureGetter)] = &[
    ("robustBufferAccess", |f| f.robust_buffer_access),
    ("depthBiasClamp", |f| f.depth_bias_clamp),
];

/// Extensions (canonical, i.e. after promotion folding) each tier requires.
const CORE_REQUIRED_EXTENSIONS: &[Ext] = &[Ext::TimelineSemaphore];
const COMPATIBILITY_REQUIRED_EXTENSIONS: &[Ext] = &[];

impl PhysicalDeviceFeatures {
    fn required_by(
        tier: adt::CapabilityTier,
    ) -> (&'static [(&'static str, FeatureGetter)], &'static [Ext]) {
        match tier {
            adt::CapabilityTier::Core => (CORE_REQUIRED_FEATURES, CORE_REQUIRED_EXTENSIONS),
            adt::CapabilityTier::Compatibility => (
                COMPATIBILITY_REQUIRED_FEATURES,
                COMPATIBILITY_REQUIRED_EXTENSIONS,
            ),
        }
    }

    /// Checks the mandatory feature/extension bar of `tier`, reporting the
    /// first entry of the fixed check order that fails.
    pub(super) fn check_mandatory(
        &self,
        caps: &PhysicalDeviceCapabilities,
        tier: adt::CapabilityTier,
    ) -> Result<(), crate::CapabilityError> {
        let (features, extensions) = Self::required_by(tier);
        for &(feature, getter) in features {
            if getter(&self.core) == vk::FALSE {
                return Err(crate::CapabilityError::MissingFeature { tier, feature });
            }
        }
        for &extension in extensions {
            if !caps.supports_extension(extension) {
                return Err(crate::CapabilityError::MissingExtension {
                    tier,
                    extension: extension
                        .name()
                        .to_str()
                        .unwrap_or("<non-utf8 extension name>"),
                });
            }
        }
        Ok(())
    }

    /// Maps the gathered native data to the portable feature set.
    ///
    /// Workaround rules are *not* applied here; they run as a separate pass
    /// so the raw mapping and the override table stay independently testable.
    /// The notes list records, for every flag left off, the native
    /// precondition that was missing.
    fn to_features(
        &self,
        instance: &ash::Instance,
        phd: vk::PhysicalDevice,
        caps: &PhysicalDeviceCapabilities,
    ) -> (adt::Features, Vec<(adt::Features, &'static str)>) {
        use adt::Features as F;

        let mut features = F::MAPPABLE_PRIMARY_BUFFERS
            | F::PUSH_CONSTANTS
            | F::ADDRESS_MODE_CLAMP_TO_BORDER
            | F::TIMESTAMP_QUERY;
        let mut notes: Vec<(adt::Features, &'static str)> = Vec::new();
        let mut gate = |flag: F, enabled: bool, requirement: &'static str| {
            if enabled {
                features |= flag;
            } else {
                notes.push((flag, requirement));
            }
        };

        gate(
            F::INDIRECT_FIRST_INSTANCE,
            self.core.draw_indirect_first_instance != 0,
            "drawIndirectFirstInstance",
        );
        gate(
            F::MULTI_DRAW_INDIRECT,
            self.core.multi_draw_indirect != 0,
            "multiDrawIndirect",
        );
        gate(
            F::POLYGON_MODE_LINE,
            self.core.fill_mode_non_solid != 0,
            "fillModeNonSolid",
        );
        gate(
            F::POLYGON_MODE_POINT,
            self.core.fill_mode_non_solid != 0,
            "fillModeNonSolid",
        );
        gate(
            F::TEXTURE_COMPRESSION_ETC2,
            self.core.texture_compression_etc2 != 0,
            "textureCompressionETC2",
        );
        gate(
            F::TEXTURE_COMPRESSION_ASTC,
            self.core.texture_compression_astc_ldr != 0,
            "textureCompressionASTC_LDR",
        );
        gate(
            F::TEXTURE_COMPRESSION_BC,
            self.core.texture_compression_bc != 0,
            "textureCompressionBC",
        );
        gate(
            F::PIPELINE_STATISTICS_QUERY,
            self.core.pipeline_statistics_query != 0,
            "pipelineStatisticsQuery",
        );
        gate(
            F::VERTEX_WRITABLE_STORAGE,
            self.core.vertex_pipeline_stores_and_atomics != 0,
            "vertexPipelineStoresAndAtomics",
        );
        gate(F::SHADER_F64, self.core.shader_float64 != 0, "shaderFloat64");
        gate(F::SHADER_I16, self.core.shader_int16 != 0, "shaderInt16");
        gate(
            F::DEPTH_CLIP_CONTROL,
            self.core.depth_clamp != 0,
            "depthClamp",
        );
        gate(
            F::DUAL_SOURCE_BLENDING,
            self.core.dual_src_blend != 0,
            "dualSrcBlend",
        );

        gate(
            F::BUFFER_BINDING_ARRAY,
            self.core.shader_uniform_buffer_array_dynamic_indexing != 0,
            "shaderUniformBufferArrayDynamicIndexing",
        );
        gate(
            F::TEXTURE_BINDING_ARRAY,
            self.core.shader_sampled_image_array_dynamic_indexing != 0,
            "shaderSampledImageArrayDynamicIndexing",
        );
        gate(
            F::STORAGE_RESOURCE_BINDING_ARRAY,
            self.core.shader_storage_buffer_array_dynamic_indexing != 0
                && self.core.shader_storage_image_array_dynamic_indexing != 0,
            "shaderStorage{Buffer,Image}ArrayDynamicIndexing",
        );

        let di = self.descriptor_indexing.as_ref();
        gate(
            F::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING,
            di.map_or(false, |di| {
                di.shader_sampled_image_array_non_uniform_indexing != 0
                    && di.shader_storage_buffer_array_non_uniform_indexing != 0
            }),
            "shader{SampledImage,StorageBuffer}ArrayNonUniformIndexing",
        );
        gate(
            F::UNIFORM_BUFFER_AND_STORAGE_TEXTURE_ARRAY_NON_UNIFORM_INDEXING,
            di.map_or(false, |di| {
                di.shader_uniform_buffer_array_non_uniform_indexing != 0
                    && di.shader_storage_image_array_non_uniform_indexing != 0
            }),
            "shader{UniformBuffer,StorageImage}ArrayNonUniformIndexing",
        );
        gate(
            F::PARTIALLY_BOUND_BINDING_ARRAY,
            di.map_or(false, |di| di.descriptor_binding_partially_bound != 0),
            "descriptorBindingPartiallyBound",
        );

        gate(
            F::MULTIVIEW,
            self.multiview.map_or(false, |m| m.multiview != 0),
            "multiview",
        );
        gate(
            F::TEXTURE_COMPRESSION_ASTC_HDR,
            self.astc_hdr
                .map_or(false, |f| f.texture_compression_astc_hdr != 0),
            "textureCompressionASTC_HDR",
        );
        gate(
            F::SHADER_F16,
            self.shader_float16.map_or(false, |(f16, storage16)| {
                f16.shader_float16 != 0
                    && storage16.storage_buffer16_bit_access != 0
                    && storage16.uniform_and_storage_buffer16_bit_access != 0
            }),
            "shaderFloat16 + 16BitStorage",
        );

        gate(
            F::MULTI_DRAW_INDIRECT_COUNT,
            caps.supports_extension(Ext::DrawIndirectCount),
            "VK_KHR_draw_indirect_count",
        );
        gate(
            F::CONSERVATIVE_RASTERIZATION,
            caps.supports_extension(Ext::ConservativeRasterization),
            "VK_EXT_conservative_rasterization",
        );
        gate(
            F::RAY_TRACING_ACCELERATION_STRUCTURE,
            caps.supports_extension(Ext::AccelerationStructure)
                && self
                    .acceleration_structure
                    .map_or(false, |f| f.acceleration_structure != 0)
                && self
                    .buffer_device_address
                    .map_or(false, |f| f.buffer_device_address != 0),
            "VK_KHR_acceleration_structure + bufferDeviceAddress",
        );
        gate(
            F::RAY_QUERY,
            caps.supports_extension(Ext::RayQuery)
                && self.ray_query.map_or(false, |f| f.ray_query != 0),
            "VK_KHR_ray_query",
        );
        gate(
            F::SUBGROUP_MATRIX,
            caps.supports_extension(Ext::CooperativeMatrix)
                && self
                    .cooperative_matrix
                    .map_or(false, |f| f.cooperative_matrix != 0),
            "VK_KHR_cooperative_matrix",
        );

        // The remaining flags depend on per-format properties, which are the
        // only supplementary native queries the policy makes.
        gate(
            F::TEXTURE_FORMAT_16BIT_NORM,
            is_format_16bit_norm_supported(instance, phd),
            "16-bit norm format support",
        );
        gate(
            F::RG11B10UFLOAT_RENDERABLE,
            supports_format(
                instance,
                phd,
                vk::Format::B10G11R11_UFLOAT_PACK32,
                vk::ImageTiling::OPTIMAL,
                vk::FormatFeatureFlags::COLOR_ATTACHMENT
                    | vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND,
            ),
            "B10G11R11_UFLOAT_PACK32 renderability",
        );
        gate(
            F::BGRA8UNORM_STORAGE,
            supports_bgra8unorm_storage(instance, phd, caps.device_api_version),
            "B8G8R8A8_UNORM storage-write support",
        );
        gate(
            F::FLOAT32_FILTERABLE,
            is_float32_filterable_supported(instance, phd),
            "32-bit float filtering",
        );
        gate(
            F::DEPTH32FLOAT_STENCIL8,
            supports_format(
                instance,
                phd,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::ImageTiling::OPTIMAL,
                depth_stencil_required_flags(),
            ),
            "D32_SFLOAT_S8_UINT attachment support",
        );

        (features, notes)
    }
}

/// Information gathered about a physical device's capabilities.
///
/// Immutable once gathered; everything derived from it later is either pure
/// or memoized.
#[derive(Default, Debug)]
pub struct PhysicalDeviceCapabilities {
    pub(super) properties: vk::PhysicalDeviceProperties,
    pub(super) memory: vk::PhysicalDeviceMemoryProperties,
    pub(super) queue_families: Vec<vk::QueueFamilyProperties>,
    /// Canonical extension set: closed under dependency, with promoted
    /// extensions folded in.
    pub(super) extensions: DeviceExtensionSet,
    pub(super) driver: Option<vk::PhysicalDeviceDriverProperties<'static>>,
    pub(super) maintenance_3: Option<vk::PhysicalDeviceMaintenance3Properties<'static>>,
    pub(super) subgroup: Option<vk::PhysicalDeviceSubgroupProperties<'static>>,
    /// The device API version, capped by the instance version.
    pub(super) device_api_version: u32,
}

// This is safe because the structs have `p_next: *mut c_void`, which we null out/never read.
unsafe impl Send for PhysicalDeviceCapabilities {}
unsafe impl Sync for PhysicalDeviceCapabilities {}

impl PhysicalDeviceCapabilities {
    pub fn properties(&self) -> vk::PhysicalDeviceProperties {
        self.properties
    }

    pub fn device_api_version(&self) -> u32 {
        self.device_api_version
    }

    pub fn supports_extension(&self, extension: Ext) -> bool {
        self.extensions.contains(extension)
    }

    /// The biggest single allocation the driver will take, when it told us.
    pub fn max_memory_allocation_size(&self) -> u64 {
        self.maintenance_3
            .map_or(u64::MAX, |m| m.max_memory_allocation_size)
    }

    /// Negotiates the limits record for `tier`.
    ///
    /// Every limit with a direct native counterpart adopts the native value
    /// after checking it against the tier baseline; a native value worse than
    /// the baseline fails the whole negotiation with the offending field
    /// named. Composite limits take the minimum over every contributing
    /// native field, each individually checked. The check order follows the
    /// field order of [`adt::Limits`].
    pub(super) fn negotiate_limits(
        &self,
        tier: adt::CapabilityTier,
    ) -> Result<adt::Limits, crate::CapabilityError> {
        let baseline = tier.baseline_limits();
        let limits = &self.properties.limits;

        macro_rules! require_max {
            ($name:ident, $native_field:ident, $value:expr) => {{
                let value = $value;
                if (value as u64) < baseline.$name as u64 {
                    return Err(crate::CapabilityError::LimitTooWeak {
                        tier,
                        name: stringify!($name),
                        native_field: stringify!($native_field),
                        native: value as u64,
                        required: baseline.$name as u64,
                    });
                }
                value
            }};
        }
        macro_rules! require_min {
            ($name:ident, $native_field:ident, $value:expr) => {{
                let value = $value;
                if value as u64 > baseline.$name as u64 {
                    return Err(crate::CapabilityError::LimitTooWeak {
                        tier,
                        name: stringify!($name),
                        native_field: stringify!($native_field),
                        native: value as u64,
                        required: baseline.$name as u64,
                    });
                }
                value
            }};
        }

        let max_texture_dimension_1d = require_max!(
            max_texture_dimension_1d,
            maxImageDimension1D,
            limits.max_image_dimension1_d
        );
        // The portable 2D ceiling must hold for render targets and cube
        // views too, so every contributing native ceiling is checked and the
        // weakest one wins.
        let max_texture_dimension_2d = require_max!(
            max_texture_dimension_2d,
            maxImageDimension2D,
            limits.max_image_dimension2_d
        )
        .min(require_max!(
            max_texture_dimension_2d,
            maxImageDimensionCube,
            limits.max_image_dimension_cube
        ))
        .min(require_max!(
            max_texture_dimension_2d,
            maxFramebufferWidth,
            limits.max_framebuffer_width
        ))
        .min(require_max!(
            max_texture_dimension_2d,
            maxFramebufferHeight,
            limits.max_framebuffer_height
        ))
        .min(require_max!(
            max_texture_dimension_2d,
            maxViewportDimensions_0,
            limits.max_viewport_dimensions[0]
        ))
        .min(require_max!(
            max_texture_dimension_2d,
            maxViewportDimensions_1,
            limits.max_viewport_dimensions[1]
        ));
        let max_texture_dimension_3d = require_max!(
            max_texture_dimension_3d,
            maxImageDimension3D,
            limits.max_image_dimension3_d
        );
        let max_texture_array_layers = require_max!(
            max_texture_array_layers,
            maxImageArrayLayers,
            limits.max_image_array_layers
        );
        let max_bind_groups = require_max!(
            max_bind_groups,
            maxBoundDescriptorSets,
            limits.max_bound_descriptor_sets
        );
        let max_dynamic_uniform_buffers_per_pipeline_layout = require_max!(
            max_dynamic_uniform_buffers_per_pipeline_layout,
            maxDescriptorSetUniformBuffersDynamic,
            limits.max_descriptor_set_uniform_buffers_dynamic
        );
        let max_dynamic_storage_buffers_per_pipeline_layout = require_max!(
            max_dynamic_storage_buffers_per_pipeline_layout,
            maxDescriptorSetStorageBuffersDynamic,
            limits.max_descriptor_set_storage_buffers_dynamic
        );
        let max_sampled_textures_per_shader_stage = require_max!(
            max_sampled_textures_per_shader_stage,
            maxPerStageDescriptorSampledImages,
            limits.max_per_stage_descriptor_sampled_images
        );
        let max_samplers_per_shader_stage = require_max!(
            max_samplers_per_shader_stage,
            maxPerStageDescriptorSamplers,
            limits.max_per_stage_descriptor_samplers
        );
        let max_storage_buffers_per_shader_stage = require_max!(
            max_storage_buffers_per_shader_stage,
            maxPerStageDescriptorStorageBuffers,
            limits.max_per_stage_descriptor_storage_buffers
        );
        let max_storage_textures_per_shader_stage = require_max!(
            max_storage_textures_per_shader_stage,
            maxPerStageDescriptorStorageImages,
            limits.max_per_stage_descriptor_storage_images
        );
        let max_uniform_buffers_per_shader_stage = require_max!(
            max_uniform_buffers_per_shader_stage,
            maxPerStageDescriptorUniformBuffers,
            limits.max_per_stage_descriptor_uniform_buffers
        );
        let max_uniform_buffer_binding_size = require_max!(
            max_uniform_buffer_binding_size,
            maxUniformBufferRange,
            limits
                .max_uniform_buffer_range
                .min(auxil::MAX_I32_BINDING_SIZE)
        );
        let max_storage_buffer_binding_size = require_max!(
            max_storage_buffer_binding_size,
            maxStorageBufferRange,
            limits
                .max_storage_buffer_range
                .min(auxil::MAX_I32_BINDING_SIZE)
        );
        let max_vertex_buffers = require_max!(
            max_vertex_buffers,
            maxVertexInputBindings,
            limits.max_vertex_input_bindings
        );
        let max_vertex_attributes = require_max!(
            max_vertex_attributes,
            maxVertexInputAttributes,
            limits.max_vertex_input_attributes
        );
        let max_vertex_buffer_array_stride = require_max!(
            max_vertex_buffer_array_stride,
            maxVertexInputBindingStride,
            limits.max_vertex_input_binding_stride
        );
        let max_push_constant_size = require_max!(
            max_push_constant_size,
            maxPushConstantsSize,
            limits.max_push_constants_size
        );
        let min_uniform_buffer_offset_alignment = require_min!(
            min_uniform_buffer_offset_alignment,
            minUniformBufferOffsetAlignment,
            limits.min_uniform_buffer_offset_alignment as u32
        );
        let min_storage_buffer_offset_alignment = require_min!(
            min_storage_buffer_offset_alignment,
            minStorageBufferOffsetAlignment,
            limits.min_storage_buffer_offset_alignment as u32
        );
        let max_inter_stage_shader_components = require_max!(
            max_inter_stage_shader_components,
            maxVertexOutputComponents,
            limits.max_vertex_output_components
        )
        .min(require_max!(
            max_inter_stage_shader_components,
            maxFragmentInputComponents,
            limits.max_fragment_input_components
        ));
        let max_color_attachments = require_max!(
            max_color_attachments,
            maxColorAttachments,
            limits.max_color_attachments
        );
        let max_compute_workgroup_storage_size = require_max!(
            max_compute_workgroup_storage_size,
            maxComputeSharedMemorySize,
            limits.max_compute_shared_memory_size
        );
        let max_compute_invocations_per_workgroup = require_max!(
            max_compute_invocations_per_workgroup,
            maxComputeWorkGroupInvocations,
            limits.max_compute_work_group_invocations
        );
        let max_compute_workgroup_size_x = require_max!(
            max_compute_workgroup_size_x,
            maxComputeWorkGroupSize_0,
            limits.max_compute_work_group_size[0]
        );
        let max_compute_workgroup_size_y = require_max!(
            max_compute_workgroup_size_y,
            maxComputeWorkGroupSize_1,
            limits.max_compute_work_group_size[1]
        );
        let max_compute_workgroup_size_z = require_max!(
            max_compute_workgroup_size_z,
            maxComputeWorkGroupSize_2,
            limits.max_compute_work_group_size[2]
        );
        let max_compute_workgroups_per_dimension = require_max!(
            max_compute_workgroups_per_dimension,
            maxComputeWorkGroupCount,
            limits.max_compute_work_group_count[0]
                .min(limits.max_compute_work_group_count[1])
                .min(limits.max_compute_work_group_count[2])
        );

        // Prevent very large buffers on mesa and most android devices.
        let is_nvidia = self.properties.vendor_id == db::nvidia::VENDOR;
        let max_buffer_size =
            if (cfg!(target_os = "linux") || cfg!(target_os = "android")) && !is_nvidia {
                i32::MAX as u64
            } else {
                u64::MAX
            };

        let mut negotiated = adt::Limits {
            max_texture_dimension_1d,
            max_texture_dimension_2d,
            max_texture_dimension_3d,
            max_texture_array_layers,
            max_bind_groups,
            max_bindings_per_bind_group: baseline.max_bindings_per_bind_group,
            max_dynamic_uniform_buffers_per_pipeline_layout,
            max_dynamic_storage_buffers_per_pipeline_layout,
            max_sampled_textures_per_shader_stage,
            max_samplers_per_shader_stage,
            max_storage_buffers_per_shader_stage,
            max_storage_textures_per_shader_stage,
            max_uniform_buffers_per_shader_stage,
            max_uniform_buffer_binding_size,
            max_storage_buffer_binding_size,
            max_vertex_buffers,
            max_vertex_attributes,
            max_vertex_buffer_array_stride,
            max_push_constant_size,
            min_uniform_buffer_offset_alignment,
            min_storage_buffer_offset_alignment,
            max_inter_stage_shader_components,
            max_color_attachments,
            max_compute_workgroup_storage_size,
            max_compute_invocations_per_workgroup,
            max_compute_workgroup_size_x,
            max_compute_workgroup_size_y,
            max_compute_workgroup_size_z,
            max_compute_workgroups_per_dimension,
            max_buffer_size,
        };
        self.apply_fragment_output_budget(tier, &baseline, &mut negotiated)?;
        Ok(negotiated)
    }

    /// The combined fragment output budget constrains color attachments and
    /// fragment-stage storage resources together. When it is tighter than the
    /// sum of the negotiated per-category limits, the shortfall is
    /// redistributed deterministically: color attachments keep as much as
    /// possible first, then storage textures, then storage buffers, each
    /// leaving at least the baseline to the categories after it.
    fn apply_fragment_output_budget(
        &self,
        tier: adt::CapabilityTier,
        baseline: &adt::Limits,
        negotiated: &mut adt::Limits,
    ) -> Result<(), crate::CapabilityError> {
        let budget = self.properties.limits.max_fragment_combined_output_resources as u64;
        let demand = negotiated.max_color_attachments as u64
            + negotiated.max_storage_textures_per_shader_stage as u64
            + negotiated.max_storage_buffers_per_shader_stage as u64;
        if budget >= demand {
            return Ok(());
        }

        let floor = baseline.max_color_attachments as u64
            + baseline.max_storage_textures_per_shader_stage as u64
            + baseline.max_storage_buffers_per_shader_stage as u64;
        if budget < floor {
            return Err(crate::CapabilityError::LimitTooWeak {
                tier,
                name: "fragment_combined_output_resources",
                native_field: "maxFragmentCombinedOutputResources",
                native: budget,
                required: floor,
            });
        }

        let mut remaining = budget;
        let color = (negotiated.max_color_attachments as u64).min(
            remaining
                - baseline.max_storage_textures_per_shader_stage as u64
                - baseline.max_storage_buffers_per_shader_stage as u64,
        );
        remaining -= color;
        let storage_textures = (negotiated.max_storage_textures_per_shader_stage as u64)
            .min(remaining - baseline.max_storage_buffers_per_shader_stage as u64);
        remaining -= storage_textures;
        let storage_buffers =
            (negotiated.max_storage_buffers_per_shader_stage as u64).min(remaining);

        log::debug!(
            "fragment output budget {} redistributed to {}/{}/{} (color/storage tex/storage buf)",
            budget,
            color,
            storage_textures,
            storage_buffers,
        );
        negotiated.max_color_attachments = color as u32;
        negotiated.max_storage_textures_per_shader_stage = storage_textures as u32;
        negotiated.max_storage_buffers_per_shader_stage = storage_buffers as u32;
        Ok(())
    }

    fn to_alignments(&self) -> crate::Alignments {
        let limits = &self.properties.limits;
        crate::Alignments {
            buffer_copy_offset: adt::BufferSize::new(limits.optimal_buffer_copy_offset_alignment)
                .unwrap_or(adt::BufferSize::MIN),
            buffer_copy_pitch: adt::BufferSize::new(limits.optimal_buffer_copy_row_pitch_alignment)
                .unwrap_or(adt::BufferSize::MIN),
        }
    }
}

/// Tier negotiation state of one device.
///
/// `Unsupported` is entered at most once; the retained reason is logged the
/// first time a caller asks about the unsupported tier. Compatibility-tier
/// support is implied by a device being exposed at all: its prerequisites are
/// a strict subset of the core ones.
#[derive(Debug)]
pub(super) enum CoreSupport {
    /// Negotiation has not started. Only observable during construction.
    #[allow(dead_code)]
    Unknown,
    /// Negotiation in progress.
    #[allow(dead_code)]
    Evaluating,
    Supported,
    Unsupported {
        reason: crate::CapabilityError,
        reported: AtomicBool,
    },
}

/// Outcome of running both tiers of negotiation over one device.
#[derive(Debug)]
pub(super) struct CapabilityDecision {
    pub core_support: CoreSupport,
    pub tier: adt::CapabilityTier,
    pub limits: adt::Limits,
}

/// Runs the full negotiation: the core tier first and, on failure, one retry
/// against the compatibility tier with the core failure reason retained.
pub(super) fn negotiate_capabilities(
    caps: &PhysicalDeviceCapabilities,
    features: &PhysicalDeviceFeatures,
) -> Result<CapabilityDecision, crate::CapabilityError> {
    let negotiate = |tier| -> Result<adt::Limits, crate::CapabilityError> {
        features.check_mandatory(caps, tier)?;
        caps.negotiate_limits(tier)
    };

    match negotiate(adt::CapabilityTier::Core) {
        Ok(limits) => Ok(CapabilityDecision {
            core_support: CoreSupport::Supported,
            tier: adt::CapabilityTier::Core,
            limits,
        }),
        Err(core_reason) => {
            let limits = negotiate(adt::CapabilityTier::Compatibility)?;
            Ok(CapabilityDecision {
                core_support: CoreSupport::Unsupported {
                    reason: core_reason,
                    reported: AtomicBool::new(false),
                },
                tier: adt::CapabilityTier::Compatibility,
                limits,
            })
        }
    }
}

/// Filters the native cooperative matrix list down to the configurations the
/// portable contract can express: subgroup execution scope, both
/// multiplicands of the same mappable component type, a mappable accumulator
/// matching the result type, and no saturating accumulation.
pub(super) fn filter_subgroup_matrix_configs(
    raw: &[vk::CooperativeMatrixPropertiesKHR<'_>],
) -> Vec<adt::SubgroupMatrixConfig> {
    raw.iter()
        .filter(|properties| properties.scope == vk::ScopeKHR::SUBGROUP)
        .filter(|properties| properties.saturating_accumulation == vk::FALSE)
        .filter(|properties| properties.a_type == properties.b_type)
        .filter(|properties| properties.c_type == properties.result_type)
        .filter_map(|properties| {
            Some(adt::SubgroupMatrixConfig {
                component_type: conv::map_component_type(properties.a_type)?,
                result_component_type: conv::map_component_type(properties.result_type)?,
                m: properties.m_size,
                n: properties.n_size,
                k: properties.k_size,
            })
        })
        .collect()
}

impl super::Instance {
    /// Gathers, canonicalizes and negotiates one physical device, producing
    /// the adapter or the reason it cannot be exposed.
    pub(super) fn expose_adapter(
        &self,
        phd: vk::PhysicalDevice,
    ) -> Result<crate::ExposedAdapter<super::Api>, crate::InstanceError> {
        use crate::auxil::cstr_from_bytes_until_nul;

        let (mut phd_capabilities, phd_features) =
            unsafe { self.shared.gather_device_info(phd) }.map_err(|err| {
                crate::InstanceError::with_source(
                    String::from("physical device info gathering failed"),
                    err,
                )
            })?;

        let quirk_ctx = QuirkContext {
            caps: &phd_capabilities,
            has_nv_optimus: self.shared.has_nv_optimus,
            windows: cfg!(windows),
            linux: cfg!(target_os = "linux"),
        };
        let mut quirk_notes: Vec<(adt::Features, &'static str)> = Vec::new();
        let mut can_present = true;
        let mut stripped_extensions = Vec::new();
        for quirk in QUIRKS {
            if !quirk.when.evaluate(&quirk_ctx) {
                continue;
            }
            if !quirk.disables.is_empty() {
                quirk_notes.push((quirk.disables, quirk.name));
            }
            if quirk.disables_presentation {
                log::warn!("disabling presentation per workaround `{}`", quirk.name);
                can_present = false;
            }
            if let Some(extension) = quirk.strips_extension {
                log::warn!("ignoring {:?} per workaround `{}`", extension, quirk.name);
                stripped_extensions.push(extension);
            }
        }
        for extension in stripped_extensions {
            phd_capabilities.extensions.remove(extension);
        }

        let info = adt::AdapterInfo {
            name: {
                cstr_from_bytes_until_nul(&phd_capabilities.properties.device_name)
                    .and_then(|name| name.to_str().ok())
                    .unwrap_or("?")
                    .to_owned()
            },
            vendor: phd_capabilities.properties.vendor_id,
            device: phd_capabilities.properties.device_id,
            device_type: conv::map_device_type(phd_capabilities.properties.device_type),
            driver: {
                phd_capabilities
                    .driver
                    .as_ref()
                    .and_then(|driver| cstr_from_bytes_until_nul(&driver.driver_name))
                    .and_then(|name| name.to_str().ok())
                    .unwrap_or("?")
                    .to_owned()
            },
            driver_info: {
                phd_capabilities
                    .driver
                    .as_ref()
                    .and_then(|driver| cstr_from_bytes_until_nul(&driver.driver_info))
                    .and_then(|name| name.to_str().ok())
                    .unwrap_or("?")
                    .to_owned()
            },
            driver_version: auxil::decode_driver_version(
                phd_capabilities.properties.vendor_id,
                phd_capabilities.properties.driver_version,
            ),
            backend: adt::Backend::Vulkan,
        };

        if let Some(driver) = phd_capabilities.driver {
            if driver.conformance_version.major == 0 {
                if driver.driver_id == vk::DriverId::MOLTENVK {
                    log::debug!("Adapter is not Vulkan compliant, but is MoltenVK, continuing");
                } else if self
                    .shared
                    .flags
                    .contains(adt::InstanceFlags::ALLOW_NONCOMPLIANT_ADAPTER)
                {
                    log::warn!("Adapter is not Vulkan compliant: {}", info.name);
                } else {
                    log::warn!(
                        "Adapter is not Vulkan compliant, hiding adapter: {}",
                        info.name
                    );
                    return Err(crate::InstanceError::new(format!(
                        "adapter `{}` reports no conformance test pass",
                        info.name
                    )));
                }
            }
        }

        let Some(first_family) = phd_capabilities.queue_families.first() else {
            return Err(crate::InstanceError::new(format!(
                "adapter `{}` reports no queue families",
                info.name
            )));
        };
        if !first_family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            log::warn!(
                "The first queue of `{}` only exposes {:?}",
                info.name,
                first_family.queue_flags
            );
            return Err(crate::InstanceError::new(format!(
                "adapter `{}` has no graphics queue in family 0",
                info.name
            )));
        }

        let (mut features, feature_notes) =
            phd_features.to_features(&self.shared.raw, phd, &phd_capabilities);
        for &(disabled, name) in &quirk_notes {
            if features.intersects(disabled) {
                log::warn!(
                    "disabling {:?} on `{}` per workaround `{}`",
                    disabled & features,
                    info.name,
                    name
                );
            }
            features &= !disabled;
        }

        let decision =
            negotiate_capabilities(&phd_capabilities, &phd_features).map_err(|reason| {
                log::warn!("skipping `{}`: {}", info.name, reason);
                crate::InstanceError::with_source(
                    format!("adapter `{}` failed capability negotiation", info.name),
                    reason,
                )
            })?;

        let private_caps = super::PrivateCapabilities {
            can_present,
            robust_buffer_access: phd_features.core.robust_buffer_access != 0,
            robust_image_access: if phd_capabilities.supports_extension(Ext::Robustness2) {
                phd_features
                    .robustness2
                    .map_or(false, |f| f.robust_image_access2 != 0)
            } else {
                phd_features
                    .image_robustness
                    .map_or(false, |f| f.robust_image_access != 0)
            },
            timeline_semaphores: phd_features
                .timeline_semaphore
                .map_or(false, |f| f.timeline_semaphore != 0),
            image_view_usage: phd_capabilities.supports_extension(Ext::Maintenance2),
        };

        let capabilities = crate::Capabilities {
            tier: decision.tier,
            limits: decision.limits,
            alignments: phd_capabilities.to_alignments(),
            memory_heaps: conv::map_memory_properties(&phd_capabilities.memory),
        };

        let adapter = super::Adapter {
            raw: phd,
            instance: Arc::clone(&self.shared),
            phd_capabilities,
            phd_features,
            features,
            feature_notes,
            quirk_notes,
            core_support: decision.core_support,
            private_caps,
            subgroup_matrix_configs: OnceCell::new(),
            default_subgroup_size: OnceCell::new(),
            drm_modifier_caps: Mutex::new(Default::default()),
        };

        Ok(crate::ExposedAdapter {
            adapter,
            info,
            features,
            capabilities,
        })
    }
}

impl super::Adapter {
    pub fn raw_physical_device(&self) -> vk::PhysicalDevice {
        self.raw
    }

    pub fn physical_device_capabilities(&self) -> &PhysicalDeviceCapabilities {
        &self.phd_capabilities
    }

    pub fn physical_device_features(&self) -> &PhysicalDeviceFeatures {
        &self.phd_features
    }

    pub fn shared_instance(&self) -> &super::InstanceShared {
        &self.instance
    }

    /// The subgroup size compute shaders run at when no explicit control is
    /// requested. Computed once per adapter.
    pub fn default_compute_subgroup_size(&self) -> u32 {
        *self.default_subgroup_size.get_or_init(|| {
            let reported = self
                .phd_capabilities
                .subgroup
                .map_or(0, |subgroup| subgroup.subgroup_size);
            if reported != 0 {
                reported
            } else if self.phd_capabilities.properties.vendor_id == db::amd::VENDOR {
                64
            } else {
                32
            }
        })
    }

    /// The cooperative matrix configurations usable through the portable
    /// contract. Queried from the driver and filtered on first access, then
    /// memoized for the life of the adapter.
    pub fn subgroup_matrix_configs(&self) -> &[adt::SubgroupMatrixConfig] {
        self.subgroup_matrix_configs.get_or_init(|| {
            if !self.features.contains(adt::Features::SUBGROUP_MATRIX) {
                return Vec::new();
            }
            let functor = ash::khr::cooperative_matrix::Instance::new(
                self.instance.entry(),
                &self.instance.raw,
            );
            let raw = unsafe {
                info::read_two_call(|count, data| {
                    (functor
                        .fp()
                        .get_physical_device_cooperative_matrix_properties_khr)(
                        self.raw, count, data,
                    )
                })
            };
            match raw {
                Ok(raw) => filter_subgroup_matrix_configs(&raw),
                Err(err) => {
                    log::error!("cooperative matrix query failed: {}", err);
                    Vec::new()
                }
            }
        })
    }

    /// DRM modifier capabilities of `format` on this adapter, memoized per
    /// format. The memo table is the only mutable state on an adapter and is
    /// guarded by its own lock.
    pub fn drm_modifier_caps(&self, format: adt::TextureFormat) -> Arc<[adt::DrmModifierCaps]> {
        let vk_format = conv::map_texture_format(format);
        if let Some(cached) = self.drm_modifier_caps.lock().get(&vk_format) {
            return Arc::clone(cached);
        }

        let caps: Arc<[adt::DrmModifierCaps]> = if self
            .phd_capabilities
            .supports_extension(Ext::ImageDrmFormatModifier)
        {
            self.query_drm_modifiers(vk_format).into()
        } else {
            Vec::new().into()
        };

        self.drm_modifier_caps
            .lock()
            .entry(vk_format)
            .or_insert(caps)
            .clone()
    }

    fn query_drm_modifiers(&self, format: vk::Format) -> Vec<adt::DrmModifierCaps> {
        // The modifier list query is itself a two-call convention, expressed
        // through a chained struct rather than an output-array parameter.
        let count = {
            let mut modifier_list = vk::DrmFormatModifierPropertiesListEXT::default();
            let mut format_properties2 =
                vk::FormatProperties2::default().push_next(&mut modifier_list);
            unsafe {
                self.instance.raw.get_physical_device_format_properties2(
                    self.raw,
                    format,
                    &mut format_properties2,
                );
            }
            modifier_list.drm_format_modifier_count as usize
        };
        if count == 0 {
            return Vec::new();
        }

        let mut storage = vec![vk::DrmFormatModifierPropertiesEXT::default(); count];
        let mut modifier_list = vk::DrmFormatModifierPropertiesListEXT::default();
        modifier_list.drm_format_modifier_count = count as u32;
        modifier_list.p_drm_format_modifier_properties = storage.as_mut_ptr();
        let mut format_properties2 = vk::FormatProperties2::default().push_next(&mut modifier_list);
        unsafe {
            self.instance.raw.get_physical_device_format_properties2(
                self.raw,
                format,
                &mut format_properties2,
            );
        }
        storage.truncate(modifier_list.drm_format_modifier_count as usize);

        storage
            .iter()
            .map(|properties| adt::DrmModifierCaps {
                modifier: properties.drm_format_modifier,
                plane_count: properties.drm_format_modifier_plane_count,
            })
            .collect()
    }
}

impl crate::Adapter for super::Adapter {
    type A = super::Api;

    fn supports_tier(&self, tier: adt::CapabilityTier) -> bool {
        match tier {
            // Being exposed at all means the compatibility bar was cleared.
            adt::CapabilityTier::Compatibility => true,
            adt::CapabilityTier::Core => match self.core_support {
                CoreSupport::Supported => true,
                CoreSupport::Unsupported {
                    ref reason,
                    ref reported,
                } => {
                    if !reported.swap(true, Ordering::Relaxed) {
                        log::warn!("core tier unavailable: {}", reason);
                    }
                    false
                }
                CoreSupport::Unknown | CoreSupport::Evaluating => false,
            },
        }
    }

    fn feature_status(&self, feature: adt::Features) -> crate::FeatureStatus {
        if self.features.contains(feature) {
            return crate::FeatureStatus::Enabled;
        }
        if let Some(&(_, name)) = self
            .quirk_notes
            .iter()
            .find(|&&(disabled, _)| disabled.contains(feature))
        {
            return crate::FeatureStatus::DisabledByQuirk(name);
        }
        if let Some(&(_, requirement)) = self
            .feature_notes
            .iter()
            .find(|&&(flag, _)| flag.contains(feature))
        {
            return crate::FeatureStatus::MissingPrerequisite(requirement);
        }
        crate::FeatureStatus::MissingPrerequisite("not reported by this driver")
    }

    unsafe fn texture_format_capabilities(
        &self,
        format: adt::TextureFormat,
    ) -> crate::TextureFormatCapabilities {
        use crate::TextureFormatCapabilities as Tfc;

        let vk_format = conv::map_texture_format(format);
        let properties = unsafe {
            self.instance
                .raw
                .get_physical_device_format_properties(self.raw, vk_format)
        };
        let features = properties.optimal_tiling_features;

        let mut flags = Tfc::empty();
        flags.set(
            Tfc::SAMPLED,
            features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE),
        );
        flags.set(
            Tfc::SAMPLED_LINEAR,
            features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR),
        );
        flags.set(
            Tfc::STORAGE,
            features.contains(vk::FormatFeatureFlags::STORAGE_IMAGE),
        );
        flags.set(
            Tfc::STORAGE_ATOMIC,
            features.contains(vk::FormatFeatureFlags::STORAGE_IMAGE_ATOMIC),
        );
        flags.set(
            Tfc::COLOR_ATTACHMENT,
            features.contains(vk::FormatFeatureFlags::COLOR_ATTACHMENT),
        );
        flags.set(
            Tfc::COLOR_ATTACHMENT_BLEND,
            features.contains(vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND),
        );
        flags.set(
            Tfc::DEPTH_STENCIL_ATTACHMENT,
            features.contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT),
        );
        flags.set(
            Tfc::COPY_SRC,
            features.intersects(vk::FormatFeatureFlags::TRANSFER_SRC),
        );
        flags.set(
            Tfc::COPY_DST,
            features.intersects(vk::FormatFeatureFlags::TRANSFER_DST),
        );

        let limits = self.phd_capabilities.properties.limits;
        let sample_flags = limits
            .framebuffer_color_sample_counts
            .min(limits.sampled_image_color_sample_counts);
        flags.set(
            Tfc::MULTISAMPLE_X2,
            sample_flags.contains(vk::SampleCountFlags::TYPE_2),
        );
        flags.set(
            Tfc::MULTISAMPLE_X4,
            sample_flags.contains(vk::SampleCountFlags::TYPE_4),
        );
        flags.set(
            Tfc::MULTISAMPLE_X8,
            sample_flags.contains(vk::SampleCountFlags::TYPE_8),
        );

        flags
    }

    unsafe fn surface_capabilities(
        &self,
        surface: &super::Surface,
    ) -> Result<crate::SurfaceCapabilities, crate::SurfaceError> {
        if !self.private_caps.can_present {
            return Err(crate::SurfaceError::NotSupported);
        }

        let surface_info = unsafe {
            info::gather_surface_info(
                self.raw,
                self.phd_capabilities.queue_families.len() as u32,
                surface,
            )?
        };
        if !surface_info.queue_family_support.iter().any(|&s| s) {
            return Err(crate::SurfaceError::NotSupported);
        }

        let caps = &surface_info.capabilities;

        // If image count is 0, the supported number of images is unlimited.
        let max_image_count = if caps.max_image_count == 0 {
            !0
        } else {
            caps.max_image_count
        };

        // `0xFFFFFFFF` indicates that the extent depends on the created
        // swapchain.
        let current_extent = if caps.current_extent.width != !0 && caps.current_extent.height != !0
        {
            Some(adt::Extent3d {
                width: caps.current_extent.width,
                height: caps.current_extent.height,
                depth_or_array_layers: 1,
            })
        } else {
            None
        };

        Ok(crate::SurfaceCapabilities {
            formats: surface_info
                .formats
                .iter()
                .filter_map(|sf| conv::map_vk_surface_format(*sf))
                .collect(),
            swap_chain_sizes: caps.min_image_count..=max_image_count,
            current_extent,
            usage: conv::map_vk_image_usage(caps.supported_usage_flags),
            present_modes: surface_info
                .present_modes
                .iter()
                .filter_map(|&mode| conv::map_vk_present_mode(mode))
                .collect(),
            composite_alpha_modes: conv::map_vk_composite_alpha(caps.supported_composite_alpha),
        })
    }
}

fn is_format_16bit_norm_supported(instance: &ash::Instance, phd: vk::PhysicalDevice) -> bool {
    let tiling = vk::ImageTiling::OPTIMAL;
    let features = vk::FormatFeatureFlags::SAMPLED_IMAGE
        | vk::FormatFeatureFlags::STORAGE_IMAGE
        | vk::FormatFeatureFlags::TRANSFER_SRC
        | vk::FormatFeatureFlags::TRANSFER_DST;
    [
        vk::Format::R16_UNORM,
        vk::Format::R16_SNORM,
        vk::Format::R16G16_UNORM,
        vk::Format::R16G16_SNORM,
        vk::Format::R16G16B16A16_UNORM,
        vk::Format::R16G16B16A16_SNORM,
    ]
    .into_iter()
    .all(|format| supports_format(instance, phd, format, tiling, features))
}

fn is_float32_filterable_supported(instance: &ash::Instance, phd: vk::PhysicalDevice) -> bool {
    let tiling = vk::ImageTiling::OPTIMAL;
    let features = vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR;
    [
        vk::Format::R32_SFLOAT,
        vk::Format::R32G32_SFLOAT,
        vk::Format::R32G32B32A32_SFLOAT,
    ]
    .into_iter()
    .all(|format| supports_format(instance, phd, format, tiling, features))
}

fn supports_format(
    instance: &ash::Instance,
    phd: vk::PhysicalDevice,
    format: vk::Format,
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> bool {
    let properties = unsafe { instance.get_physical_device_format_properties(phd, format) };
    match tiling {
        vk::ImageTiling::LINEAR => properties.linear_tiling_features.contains(features),
        vk::ImageTiling::OPTIMAL => properties.optimal_tiling_features.contains(features),
        _ => false,
    }
}

fn supports_bgra8unorm_storage(
    instance: &ash::Instance,
    phd: vk::PhysicalDevice,
    device_api_version: u32,
) -> bool {
    // The format-feature-flags2 query underneath is only reliably present
    // from 1.3 on.
    if device_api_version < vk::API_VERSION_1_3 {
        return false;
    }

    unsafe {
        let mut properties3 = vk::FormatProperties3::default();
        let mut properties2 = vk::FormatProperties2::default().push_next(&mut properties3);

        instance.get_physical_device_format_properties2(
            phd,
            vk::Format::B8G8R8A8_UNORM,
            &mut properties2,
        );

        let features2 = properties2.format_properties.optimal_tiling_features;
        let features3 = properties3.optimal_tiling_features;

        features2.contains(vk::FormatFeatureFlags::STORAGE_IMAGE)
            && features3.contains(vk::FormatFeatureFlags2::STORAGE_WRITE_WITHOUT_FORMAT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A synthetic device that clears the core bar with room to spare.
    fn healthy_capabilities() -> PhysicalDeviceCapabilities {
        let limits = vk::PhysicalDeviceLimits {
            max_image_dimension1_d: 16384,
            max_image_dimension2_d: 16384,
            max_image_dimension3_d: 2048,
            max_image_dimension_cube: 16384,
            max_image_array_layers: 2048,
            max_bound_descriptor_sets: 8,
            max_descriptor_set_uniform_buffers_dynamic: 8,
            max_descriptor_set_storage_buffers_dynamic: 8,
            max_per_stage_descriptor_sampled_images: 128,
            max_per_stage_descriptor_samplers: 64,
            max_per_stage_descriptor_storage_buffers: 64,
            max_per_stage_descriptor_storage_images: 32,
            max_per_stage_descriptor_uniform_buffers: 15,
            max_uniform_buffer_range: 1 << 16,
            max_storage_buffer_range: 1 << 30,
            max_vertex_input_bindings: 16,
            max_vertex_input_attributes: 32,
            max_vertex_input_binding_stride: 4096,
            max_push_constants_size: 256,
            min_uniform_buffer_offset_alignment: 64,
            min_storage_buffer_offset_alignment: 64,
            max_vertex_output_components: 128,
            max_fragment_input_components: 128,
            max_fragment_combined_output_resources: 1 << 20,
            max_color_attachments: 8,
            max_compute_shared_memory_size: 32768,
            max_compute_work_group_invocations: 1024,
            max_compute_work_group_size: [1024, 1024, 64],
            max_compute_work_group_count: [65535, 65535, 65535],
            max_framebuffer_width: 16384,
            max_framebuffer_height: 16384,
            max_viewport_dimensions: [16384, 16384],
            optimal_buffer_copy_offset_alignment: 64,
            optimal_buffer_copy_row_pitch_alignment: 64,
            ..Default::default()
        };
        let mut extensions = DeviceExtensionSet::default();
        extensions.mark_promoted(vk::API_VERSION_1_2);

        PhysicalDeviceCapabilities {
            properties: vk::PhysicalDeviceProperties {
                api_version: vk::API_VERSION_1_2,
                limits,
                ..Default::default()
            },
            extensions,
            device_api_version: vk::API_VERSION_1_2,
            ..Default::default()
        }
    }

    fn healthy_features() -> PhysicalDeviceFeatures {
        PhysicalDeviceFeatures {
            core: vk::PhysicalDeviceFeatures {
                robust_buffer_access: vk::TRUE,
                full_draw_index_uint32: vk::TRUE,
                image_cube_array: vk::TRUE,
                independent_blend: vk::TRUE,
                sample_rate_shading: vk::TRUE,
                fragment_stores_and_atomics: vk::TRUE,
                depth_bias_clamp: vk::TRUE,
                sampler_anisotropy: vk::TRUE,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn robust_buffer_access_is_the_first_mandatory_check() {
        let caps = healthy_capabilities();
        let mut features = healthy_features();
        // Break two entries; only the earlier one in the check order may be
        // reported.
        features.core.robust_buffer_access = vk::FALSE;
        features.core.full_draw_index_uint32 = vk::FALSE;

        let err = features
            .check_mandatory(&caps, adt::CapabilityTier::Core)
            .unwrap_err();
        assert_eq!(
            err,
            crate::CapabilityError::MissingFeature {
                tier: adt::CapabilityTier::Core,
                feature: "robustBufferAccess",
            }
        );
    }

    #[test]
    fn negotiated_limits_equal_native_values_when_within_bounds() {
        let caps = healthy_capabilities();
        let limits = caps.negotiate_limits(adt::CapabilityTier::Core).unwrap();
        // Never silently clamped down to the baseline.
        assert_eq!(limits.max_texture_dimension_2d, 16384);
        assert_eq!(limits.max_bind_groups, 8);
        assert_eq!(limits.max_push_constant_size, 256);
        assert_eq!(limits.min_uniform_buffer_offset_alignment, 64);
        // And never below it.
        assert!(limits.check_limits(&adt::Limits::default()));
    }

    #[test]
    fn composite_2d_limit_takes_the_weakest_contributor() {
        let mut caps = healthy_capabilities();
        caps.properties.limits.max_viewport_dimensions = [9000, 16384];
        let limits = caps.negotiate_limits(adt::CapabilityTier::Core).unwrap();
        assert_eq!(limits.max_texture_dimension_2d, 9000);
    }

    #[test]
    fn weak_native_limit_fails_with_field_name() {
        let mut caps = healthy_capabilities();
        caps.properties.limits.max_image_dimension2_d = 4096;
        let err = caps
            .negotiate_limits(adt::CapabilityTier::Core)
            .unwrap_err();
        match err {
            crate::CapabilityError::LimitTooWeak {
                name,
                native_field,
                native,
                required,
                ..
            } => {
                assert_eq!(name, "max_texture_dimension_2d");
                assert_eq!(native_field, "maxImageDimension2D");
                assert_eq!(native, 4096);
                assert_eq!(required, 8192);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn tier_fallback_retains_core_reason_and_is_deterministic() {
        let mut caps = healthy_capabilities();
        // Good enough for compatibility (2048), not for core (8192).
        caps.properties.limits.max_image_dimension2_d = 4096;
        caps.properties.limits.max_framebuffer_width = 4096;
        caps.properties.limits.max_framebuffer_height = 4096;
        caps.properties.limits.max_image_dimension_cube = 4096;
        caps.properties.limits.max_viewport_dimensions = [4096, 4096];
        let features = healthy_features();

        let run = || negotiate_capabilities(&caps, &features).unwrap();
        let first = run();
        let second = run();

        for decision in [&first, &second] {
            assert_eq!(decision.tier, adt::CapabilityTier::Compatibility);
            assert_eq!(decision.limits.max_texture_dimension_2d, 4096);
            match decision.core_support {
                CoreSupport::Unsupported { ref reason, .. } => match *reason {
                    crate::CapabilityError::LimitTooWeak { name, .. } => {
                        assert_eq!(name, "max_texture_dimension_2d")
                    }
                    ref other => panic!("unexpected reason {other:?}"),
                },
                ref other => panic!("unexpected support state {other:?}"),
            }
        }
    }

    #[test]
    fn device_failing_both_tiers_reports_the_compatibility_reason() {
        let mut caps = healthy_capabilities();
        caps.properties.limits.max_image_dimension2_d = 1024;
        let features = healthy_features();
        let err = negotiate_capabilities(&caps, &features).unwrap_err();
        match err {
            crate::CapabilityError::LimitTooWeak { tier, native, .. } => {
                assert_eq!(tier, adt::CapabilityTier::Compatibility);
                assert_eq!(native, 1024);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn fragment_output_budget_redistributes_in_pinned_order() {
        let mut caps = healthy_capabilities();
        let native = &mut caps.properties.limits;
        native.max_color_attachments = 8;
        native.max_per_stage_descriptor_storage_images = 8;
        native.max_per_stage_descriptor_storage_buffers = 8;
        native.max_fragment_combined_output_resources = 22;

        let limits = caps.negotiate_limits(adt::CapabilityTier::Core).unwrap();
        // Core baselines are 8 color / 4 storage textures / 8 storage
        // buffers. Color keeps its full value first, storage textures next
        // (leaving the buffer baseline available), storage buffers take the
        // remainder.
        assert_eq!(limits.max_color_attachments, 8);
        assert_eq!(limits.max_storage_textures_per_shader_stage, 6);
        assert_eq!(limits.max_storage_buffers_per_shader_stage, 8);
        assert_eq!(
            limits.max_color_attachments
                + limits.max_storage_textures_per_shader_stage
                + limits.max_storage_buffers_per_shader_stage,
            22
        );
    }

    #[test]
    fn fragment_output_budget_below_floor_is_a_hard_failure() {
        let mut caps = healthy_capabilities();
        // Core floor is 8 + 4 + 8 = 20.
        caps.properties.limits.max_fragment_combined_output_resources = 16;
        let err = caps
            .negotiate_limits(adt::CapabilityTier::Core)
            .unwrap_err();
        match err {
            crate::CapabilityError::LimitTooWeak {
                name,
                native,
                required,
                ..
            } => {
                assert_eq!(name, "fragment_combined_output_resources");
                assert_eq!(native, 16);
                assert_eq!(required, 20);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    fn quirk_by_name(name: &str) -> &'static Quirk {
        QUIRKS.iter().find(|quirk| quirk.name == name).unwrap()
    }

    #[test]
    fn outdated_intel_igpu_strips_robustness2() {
        let quirk = quirk_by_name("intel-igpu-outdated-robustness2");
        assert_eq!(quirk.strips_extension, Some(Ext::Robustness2));

        let mut caps = healthy_capabilities();
        caps.properties.vendor_id = db::intel::VENDOR;
        caps.properties.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        caps.properties.driver_version = (100 << 14) | 512;
        caps.driver = Some(
            vk::PhysicalDeviceDriverProperties::default()
                .driver_id(vk::DriverId::INTEL_PROPRIETARY_WINDOWS),
        );

        let ctx = QuirkContext {
            caps: &caps,
            has_nv_optimus: false,
            windows: true,
            linux: false,
        };
        assert!(quirk.when.evaluate(&ctx));

        // Fixed driver versions are left alone.
        caps.properties.driver_version = INTEL_WINDOWS_ROBUSTNESS2_FIXED;
        let ctx = QuirkContext {
            caps: &caps,
            has_nv_optimus: false,
            windows: true,
            linux: false,
        };
        assert!(!quirk.when.evaluate(&ctx));
    }

    #[test]
    fn optimus_presentation_quirk_requires_every_condition() {
        let quirk = quirk_by_name("intel-mesa-optimus-presentation");
        assert!(quirk.disables_presentation);

        let mut caps = healthy_capabilities();
        caps.properties.vendor_id = db::intel::VENDOR;
        caps.properties.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        caps.properties.driver_version = (20 << 22) | (3 << 12);
        caps.driver = Some(
            vk::PhysicalDeviceDriverProperties::default()
                .driver_id(vk::DriverId::INTEL_OPEN_SOURCE_MESA),
        );

        let ctx = QuirkContext {
            caps: &caps,
            has_nv_optimus: true,
            windows: false,
            linux: true,
        };
        assert!(quirk.when.evaluate(&ctx));

        let without_optimus = QuirkContext {
            caps: &caps,
            has_nv_optimus: false,
            windows: false,
            linux: true,
        };
        assert!(!quirk.when.evaluate(&without_optimus));

        caps.properties.driver_version = MESA_21_2;
        let fixed_mesa = QuirkContext {
            caps: &caps,
            has_nv_optimus: true,
            windows: false,
            linux: true,
        };
        assert!(!quirk.when.evaluate(&fixed_mesa));
    }

    #[test]
    fn predicate_combinators_compose() {
        let caps = healthy_capabilities();
        let ctx = QuirkContext {
            caps: &caps,
            has_nv_optimus: false,
            windows: false,
            linux: true,
        };
        assert!(Predicate::Not(&Predicate::OnWindows).evaluate(&ctx));
        assert!(Predicate::Any(&[Predicate::OnWindows, Predicate::OnLinux]).evaluate(&ctx));
        assert!(!Predicate::All(&[Predicate::OnWindows, Predicate::OnLinux]).evaluate(&ctx));
    }

    #[test]
    fn driver_version_bounds_are_exclusive_below_and_inclusive_in_range() {
        let mut caps = healthy_capabilities();
        caps.properties.driver_version = 100;
        let ctx = QuirkContext {
            caps: &caps,
            has_nv_optimus: false,
            windows: false,
            linux: false,
        };
        assert!(!Predicate::DriverVersionBelow(100).evaluate(&ctx));
        assert!(Predicate::DriverVersionBelow(101).evaluate(&ctx));
        assert!(Predicate::DriverVersionInRange {
            first: 100,
            last: 100
        }
        .evaluate(&ctx));
        assert!(!Predicate::DriverVersionInRange {
            first: 101,
            last: 200
        }
        .evaluate(&ctx));
    }

    #[test]
    fn subgroup_matrix_filter_rejects_unsupported_shapes() {
        let usable = vk::CooperativeMatrixPropertiesKHR::default()
            .m_size(16)
            .n_size(16)
            .k_size(16)
            .a_type(vk::ComponentTypeKHR::FLOAT16)
            .b_type(vk::ComponentTypeKHR::FLOAT16)
            .c_type(vk::ComponentTypeKHR::FLOAT32)
            .result_type(vk::ComponentTypeKHR::FLOAT32)
            .saturating_accumulation(false)
            .scope(vk::ScopeKHR::SUBGROUP);
        let workgroup_scope = usable.scope(vk::ScopeKHR::WORKGROUP);
        let saturating = usable.saturating_accumulation(true);
        let mixed_operands = usable.b_type(vk::ComponentTypeKHR::FLOAT32);
        let unmappable = usable
            .a_type(vk::ComponentTypeKHR::FLOAT64)
            .b_type(vk::ComponentTypeKHR::FLOAT64);

        let configs = filter_subgroup_matrix_configs(&[
            usable,
            workgroup_scope,
            saturating,
            mixed_operands,
            unmappable,
        ]);
        assert_eq!(
            configs,
            vec![adt::SubgroupMatrixConfig {
                component_type: adt::SubgroupMatrixComponentType::F16,
                result_component_type: adt::SubgroupMatrixComponentType::F32,
                m: 16,
                n: 16,
                k: 16,
            }]
        );
    }
}
