/*! This library describes the capability discovery layer sitting between a
 *  native graphics driver and the portable adapter vocabulary.
 *
 *  It reconciles what a driver reports against what the portable contract
 *  requires, with the following principles:
 *  - Discovery is eager: every adapter handed out has already passed the
 *    mandatory baseline checks for at least one capability tier.
 *  - Capability data is immutable once gathered; adapters can be shared by
 *    reference across threads without synchronization.
 *  - Vendor and driver workarounds are table entries, never inline special
 *    cases, so the policy can be audited and unit tested.
 */

#![allow(
    // We don't use syntax sugar where it's not necessary.
    clippy::match_like_matches_macro,
    // Redundant matching is more explicit.
    clippy::redundant_pattern_matching,
    // Explicit lifetimes are often easier to reason about.
    clippy::needless_lifetimes,
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unsafe_op_in_unsafe_fn,
    unused_extern_crates,
    unused_qualifications
)]

pub mod auxil;
#[cfg(feature = "vulkan")]
pub mod vulkan;

use std::{fmt, ops::RangeInclusive, sync::Arc};

use bitflags::bitflags;
use thiserror::Error;

use adapter_types as adt;

/// A guard dropped together with the object that owns it. Used to tie the
/// lifetime of externally created native handles to ours.
pub type DropGuard = Box<dyn std::any::Any + Send + Sync>;

/// Failure while setting up the native connection or a surface.
///
/// These are environment errors: the driver library is missing, the reported
/// API version is below the supported floor, or a native call failed outright.
/// None of them are retried.
#[derive(Clone, Debug)]
pub struct InstanceError {
    /// These errors are very platform specific, so the body is an
    /// already-rendered message plus an optional chained source.
    message: String,
    source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for InstanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for InstanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|source| &**source as _)
    }
}

impl InstanceError {
    pub(crate) fn new(message: String) -> Self {
        Self {
            message,
            source: None,
        }
    }

    pub(crate) fn with_source(
        message: String,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message,
            source: Some(Arc::new(source)),
        }
    }
}

/// Failure reported by the native driver during an otherwise valid call.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// A native allocation failed. The injected-for-testing variant of the
    /// native signal maps here as well, so fault injection exercises the same
    /// recovery path as a real allocation failure.
    #[error("out of memory")]
    OutOfMemory,
    /// The native device-lost signal. Callers may respond by recreating the
    /// connection rather than treating the hardware as unsupported.
    #[error("device is lost")]
    Lost,
    /// A result code outside the recognized set. Fatal to the operation in
    /// progress; carries the raw native code for diagnostics.
    #[error("unexpected native error code {0}")]
    Unexpected(i32),
}

/// A mandatory baseline check failed during capability negotiation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// A feature the tier requires is not reported by the device.
    #[error("`{feature}` is required by the {tier:?} tier but not supported")]
    MissingFeature {
        /// The tier whose bar was missed.
        tier: adt::CapabilityTier,
        /// Native name of the missing feature boolean.
        feature: &'static str,
    },
    /// An extension the tier requires is absent from the canonical set.
    #[error("extension `{extension}` is required by the {tier:?} tier but not supported")]
    MissingExtension {
        /// The tier whose bar was missed.
        tier: adt::CapabilityTier,
        /// Canonical name of the missing extension.
        extension: &'static str,
    },
    /// A native limit is worse than the tier baseline allows.
    #[error(
        "limit `{name}` is {native} on this device, \
         but the {tier:?} tier requires at least {required} (from `{native_field}`)"
    )]
    LimitTooWeak {
        /// The tier whose bar was missed.
        tier: adt::CapabilityTier,
        /// Portable name of the failed limit.
        name: &'static str,
        /// Native field the value came from.
        native_field: &'static str,
        /// Value the driver reported.
        native: u64,
        /// Bound the baseline requires.
        required: u64,
    },
}

/// Failure while querying the capabilities of a presentation surface.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The adapter cannot present to this surface at all.
    #[error("presentation to this surface is not supported by the adapter")]
    NotSupported,
    /// The native driver failed the capability query.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Why a feature is or is not enabled on an adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureStatus {
    /// The feature is enabled.
    Enabled,
    /// A native precondition (extension or feature boolean) is missing.
    MissingPrerequisite(&'static str),
    /// Advertised by the driver, but disabled by a named workaround rule.
    DisabledByQuirk(&'static str),
}

pub trait Api: Clone + Sized {
    type Instance: Instance<A = Self>;
    type Surface;
    type Adapter: Adapter<A = Self>;
}

pub trait Instance: Sized {
    type A: Api;

    /// Loads the native driver library and builds the connection appropriate
    /// to the requested discovery strategy.
    ///
    /// A missing driver library or an API version below the supported floor
    /// is a hard error.
    unsafe fn init(desc: &InstanceDescriptor) -> Result<Self, InstanceError>;

    /// Wraps an OS window in a presentation surface.
    unsafe fn create_surface(
        &self,
        display_handle: raw_window_handle::RawDisplayHandle,
        window_handle: raw_window_handle::RawWindowHandle,
    ) -> Result<<Self::A as Api>::Surface, InstanceError>;

    /// Discovers the physical devices reachable through this connection and
    /// evaluates each of them eagerly.
    ///
    /// A single device failing its mandatory checks is skipped, not fatal.
    /// If candidates existed but none survived, the retained diagnostic of
    /// the last rejected device is returned so the caller can report why no
    /// adapter was found.
    unsafe fn enumerate_adapters(
        &self,
    ) -> Result<Vec<ExposedAdapter<Self::A>>, InstanceError>;
}

pub trait Adapter {
    type A: Api;

    /// Whether this adapter cleared the bar of the given tier.
    fn supports_tier(&self, tier: adt::CapabilityTier) -> bool;

    /// Whether `feature` is enabled, and if not, why.
    fn feature_status(&self, feature: adt::Features) -> FeatureStatus;

    /// Return the set of supported capabilities for a texture format.
    unsafe fn texture_format_capabilities(
        &self,
        format: adt::TextureFormat,
    ) -> TextureFormatCapabilities;

    /// Returns the capabilities of working with a specified surface.
    ///
    /// The result is query scoped: surface capabilities change with the
    /// window, so callers must not cache it across frames.
    unsafe fn surface_capabilities(
        &self,
        surface: &<Self::A as Api>::Surface,
    ) -> Result<SurfaceCapabilities, SurfaceError>;
}

/// Parameters for building the native connection.
#[derive(Clone, Debug)]
pub struct InstanceDescriptor<'a> {
    pub name: &'a str,
    pub flags: adt::InstanceFlags,
    pub discovery_strategy: adt::DiscoveryStrategy,
}

bitflags!(
    /// Texture format capability flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TextureFormatCapabilities: u32 {
        /// Format can be sampled.
        const SAMPLED = 0x1;
        /// Format can be sampled with a linear sampler.
        const SAMPLED_LINEAR = 0x2;

        /// Format can be used as storage with exclusive read & write access.
        const STORAGE = 0x10;
        /// Format can be used as storage with atomics.
        const STORAGE_ATOMIC = 0x40;

        /// Format can be used as color and input attachment.
        const COLOR_ATTACHMENT = 0x100;
        /// Format can be used as color (with blending) and input attachment.
        const COLOR_ATTACHMENT_BLEND = 0x200;
        /// Format can be used as depth-stencil and input attachment.
        const DEPTH_STENCIL_ATTACHMENT = 0x400;

        /// Format can be copied from.
        const COPY_SRC = 0x1000;
        /// Format can be copied to.
        const COPY_DST = 0x2000;

        /// Format can be multisampled by x2.
        const MULTISAMPLE_X2 = 0x10000;
        /// Format can be multisampled by x4.
        const MULTISAMPLE_X4 = 0x20000;
        /// Format can be multisampled by x8.
        const MULTISAMPLE_X8 = 0x40000;
    }
);

bitflags! {
    /// Internal usage flags of a texture, including surface textures.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TextureUses: u32 {
        const COPY_SRC = 1;
        const COPY_DST = 2;
        const SAMPLED = 4;
        const COLOR_TARGET = 8;
        const DEPTH_STENCIL_READ = 16;
        const DEPTH_STENCIL_WRITE = 32;
        const STORAGE_LOAD = 64;
        const STORAGE_STORE = 128;
    }
}

/// Alignment requirements the adapter guarantees for buffer transfers.
#[derive(Clone, Debug)]
pub struct Alignments {
    /// The alignment of the start of the buffer used as a GPU copy source.
    pub buffer_copy_offset: adt::BufferSize,
    /// The alignment of the row pitch of the texture data stored in a buffer
    /// that is used in a GPU copy operation.
    pub buffer_copy_pitch: adt::BufferSize,
}

/// The negotiated capability set of an adapter.
///
/// A value of this type is fully checked: every limit satisfies the baseline
/// of `tier`, and equals the native value wherever a direct native
/// counterpart exists. Construction fails rather than producing a partially
/// checked record.
#[derive(Clone, Debug)]
pub struct Capabilities {
    /// The tier the limits were negotiated at.
    pub tier: adt::CapabilityTier,
    pub limits: adt::Limits,
    pub alignments: Alignments,
    /// Per-heap memory description, translated from the native layout.
    pub memory_heaps: Vec<adt::MemoryHeapInfo>,
}

/// An adapter together with the data negotiated for it at discovery time.
#[derive(Debug)]
pub struct ExposedAdapter<A: Api> {
    pub adapter: A::Adapter,
    pub info: adt::AdapterInfo,
    pub features: adt::Features,
    pub capabilities: Capabilities,
}

/// Describes what a surface supports on a particular adapter.
///
/// Fetch this with [`Adapter::surface_capabilities`]. The values change when
/// the window is resized or moved across outputs, so they must be re-queried
/// rather than cached.
#[derive(Debug, Clone)]
pub struct SurfaceCapabilities {
    /// List of supported texture formats.
    ///
    /// Must be at least one.
    pub formats: Vec<adt::TextureFormat>,

    /// Range for the number of queued frames.
    pub swap_chain_sizes: RangeInclusive<u32>,

    /// Current extent of the surface, if known.
    pub current_extent: Option<adt::Extent3d>,

    /// Supported texture usage flags.
    ///
    /// Must have at least `TextureUses::COLOR_TARGET`.
    pub usage: TextureUses,

    /// List of supported present modes.
    ///
    /// Must be at least one.
    pub present_modes: Vec<adt::PresentMode>,

    /// List of supported alpha composition modes, in the translation table's
    /// priority order.
    ///
    /// Must be at least one.
    pub composite_alpha_modes: Vec<adt::CompositeAlphaMode>,
}
