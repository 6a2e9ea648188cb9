/*!
# Vulkan capability discovery

The backend discovers adapters in one eager pass per connection:

- [`instance`] owns the loaded driver library and the native instance, and
  walks the physical devices the discovery strategy selects.
- [`info`] makes the raw native queries, insulating everything else from the
  count-then-data calling convention and the chained-structure queries.
- [`extensions`] folds promoted extensions in and closes extension sets under
  their dependencies.
- [`adapter`] holds the capability policy: feature gating, the workaround
  table, and tiered limits negotiation.
- [`conv`] translates native enumerations into the portable vocabulary.

Everything an [`Adapter`] holds is immutable after discovery (the derived
caches are memoized, not mutable), so adapters are freely shared across
threads. Each adapter keeps its [`InstanceShared`] alive through an `Arc`;
dropping the last reference tears down the native instance.
*/

mod adapter;
mod conv;
mod extensions;
mod info;
mod instance;

pub use adapter::{PhysicalDeviceCapabilities, PhysicalDeviceFeatures};
pub use conv::choose_present_mode;
pub use extensions::{
    DeviceExtension, DeviceExtensionSet, InstanceExtension, InstanceExtensionSet,
};
pub use info::{gather_global_info, GlobalInfo, SurfaceInfo, MINIMUM_INSTANCE_API_VERSION};

use std::{ffi::CString, sync::Arc};

use ash::{ext, khr, vk};
use fxhash::FxHashMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use adapter_types as adt;

#[derive(Clone)]
pub struct Api;

impl crate::Api for Api {
    type Instance = Instance;
    type Surface = Surface;
    type Adapter = Adapter;
}

/// Result code injected by fault-testing layers to simulate allocation
/// failure. Mapped exactly like the real out-of-memory codes, so injected
/// faults exercise the real recovery path.
pub(crate) const ERROR_FAKE_DEVICE_OOM_FOR_TESTING: vk::Result =
    vk::Result::from_raw(-1_000_244_001);

impl From<vk::Result> for crate::DeviceError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | ERROR_FAKE_DEVICE_OOM_FOR_TESTING => Self::OutOfMemory,
            vk::Result::ERROR_DEVICE_LOST => Self::Lost,
            other => Self::Unexpected(other.as_raw()),
        }
    }
}

/// How a promoted extension's entry points are reached.
enum ExtensionFn<T> {
    /// The loaded function table of the extension itself.
    Extension(T),
    /// The extension was folded into the core API version in use; the core
    /// entry points are used instead.
    Promoted,
}

struct DebugUtils {
    extension: ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
    /// Owns the data the messenger callback reads; must outlive the
    /// messenger.
    #[allow(dead_code)]
    callback_data: Box<DebugUtilsMessengerUserData>,
}

pub struct DebugUtilsCreateInfo {
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: Box<DebugUtilsMessengerUserData>,
}

#[derive(Debug)]
pub struct ValidationLayerProperties {
    layer_description: CString,
    layer_spec_version: u32,
}

/// State the debug messenger callback consults to silence known
/// false-positive messages.
#[derive(Debug)]
pub struct DebugUtilsMessengerUserData {
    validation_layer_properties: Option<ValidationLayerProperties>,
    has_obs_layer: bool,
}

pub struct InstanceShared {
    raw: ash::Instance,
    /// Canonical instance extension set (enabled + promoted, closed under
    /// dependency).
    extensions: InstanceExtensionSet,
    drop_guard: Option<crate::DropGuard>,
    flags: adt::InstanceFlags,
    discovery_strategy: adt::DiscoveryStrategy,
    debug_utils: Option<DebugUtils>,
    get_physical_device_properties:
        Option<ExtensionFn<khr::get_physical_device_properties2::Instance>>,
    entry: ash::Entry,
    has_nv_optimus: bool,
    instance_api_version: u32,
}

pub struct Instance {
    shared: Arc<InstanceShared>,
}

pub struct Surface {
    raw: vk::SurfaceKHR,
    functor: khr::surface::Instance,
    /// Keeps the native instance alive for as long as the surface exists.
    #[allow(dead_code)]
    instance: Arc<InstanceShared>,
}

impl Surface {
    pub fn raw_handle(&self) -> vk::SurfaceKHR {
        self.raw
    }
}

/// Internal capabilities that don't show up in the exposed feature set but
/// affect how upper layers drive the device.
#[derive(Clone, Debug)]
pub struct PrivateCapabilities {
    /// Presentation is possible at all on this adapter. Cleared by
    /// workaround rules for configurations with broken presentation paths.
    pub can_present: bool,
    /// Out-of-bounds buffer access is defined behavior.
    pub robust_buffer_access: bool,
    /// Out-of-bounds image access is defined behavior, through either
    /// robustness extension.
    pub robust_image_access: bool,
    /// Timeline semaphores are usable.
    pub timeline_semaphores: bool,
    /// Image views can restrict the usage they were created with.
    pub image_view_usage: bool,
}

pub struct Adapter {
    raw: vk::PhysicalDevice,
    /// Counted reference to the owning connection; the connection is
    /// destroyed when its last adapter (and surface) goes away.
    instance: Arc<InstanceShared>,
    phd_capabilities: adapter::PhysicalDeviceCapabilities,
    phd_features: adapter::PhysicalDeviceFeatures,
    /// Portable features after quirk masking.
    features: adt::Features,
    /// Missing-precondition notes for features that are off.
    feature_notes: Vec<(adt::Features, &'static str)>,
    /// Workaround notes for features that were forced off.
    quirk_notes: Vec<(adt::Features, &'static str)>,
    core_support: adapter::CoreSupport,
    private_caps: PrivateCapabilities,
    /// Memoized cooperative-matrix configurations; computed at most once.
    subgroup_matrix_configs: OnceCell<Vec<adt::SubgroupMatrixConfig>>,
    /// Memoized default subgroup size; computed at most once.
    default_subgroup_size: OnceCell<u32>,
    /// Per-format DRM modifier memo table. The lock is scoped to this table
    /// alone; nothing else on an adapter is mutable.
    drm_modifier_caps: Mutex<FxHashMap<vk::Format, Arc<[adt::DrmModifierCaps]>>>,
}

impl Adapter {
    pub fn private_capabilities(&self) -> &PrivateCapabilities {
        &self.private_caps
    }
}
