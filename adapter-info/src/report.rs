use std::io;

use adapter_hal::{vulkan, ExposedAdapter};
use adapter_types as adt;
use serde::{Deserialize, Serialize};

/// Everything known about one adapter, in a serializable shape.
#[derive(Serialize, Deserialize)]
pub struct AdapterReport {
    pub info: adt::AdapterInfo,
    pub tier: adt::CapabilityTier,
    pub features: Vec<String>,
    pub limits: adt::Limits,
    pub memory_heaps: Vec<adt::MemoryHeapInfo>,
}

impl AdapterReport {
    fn new(exposed: &ExposedAdapter<vulkan::Api>) -> Self {
        Self {
            info: exposed.info.clone(),
            tier: exposed.capabilities.tier,
            features: exposed
                .features
                .iter_names()
                .map(|(name, _)| name.to_owned())
                .collect(),
            limits: exposed.capabilities.limits.clone(),
            memory_heaps: exposed.capabilities.memory_heaps.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct GpuReport {
    pub devices: Vec<AdapterReport>,
}

impl GpuReport {
    pub fn from_adapters(adapters: &[ExposedAdapter<vulkan::Api>]) -> Self {
        Self {
            devices: adapters.iter().map(AdapterReport::new).collect(),
        }
    }

    pub fn into_json(self, output: &mut dyn io::Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *output, &self)?;
        writeln!(output)
    }
}
