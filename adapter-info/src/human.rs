use std::io;

use adapter_hal::{vulkan, Adapter as _, ExposedAdapter, FeatureStatus};
use adapter_types as adt;

fn print_empty_string(input: &str) -> &str {
    if input.is_empty() {
        "<empty>"
    } else {
        input
    }
}

// Lets keep these print statements on one line
#[rustfmt::skip]
fn print_adapter(
    output: &mut dyn io::Write,
    exposed: &ExposedAdapter<vulkan::Api>,
    idx: usize,
) -> io::Result<()> {
    let info = &exposed.info;
    let caps = &exposed.capabilities;

    writeln!(output, "Adapter {idx}:")?;
    writeln!(output, "\t         Name: {}", print_empty_string(&info.name))?;
    writeln!(output, "\t    VendorID: 0x{:x}", info.vendor)?;
    writeln!(output, "\t    DeviceID: 0x{:x}", info.device)?;
    writeln!(output, "\t        Type: {:?}", info.device_type)?;
    writeln!(output, "\t      Driver: {}", print_empty_string(&info.driver))?;
    writeln!(output, "\t  DriverInfo: {}", print_empty_string(&info.driver_info))?;
    writeln!(output, "\t     Version: {}", info.driver_version)?;
    writeln!(output, "\t     Backend: {:?}", info.backend)?;
    writeln!(output, "\t        Tier: {:?}", caps.tier)?;
    writeln!(output, "\t    CoreTier: {}", exposed.adapter.supports_tier(adt::CapabilityTier::Core))?;

    writeln!(output, "\tFeatures:")?;
    let max_feature_flag_width = adt::Features::all()
        .iter_names()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);
    for (name, flag) in adt::Features::all().iter_names() {
        let status = match exposed.adapter.feature_status(flag) {
            FeatureStatus::Enabled => String::from("✔"),
            FeatureStatus::MissingPrerequisite(requirement) => {
                format!("✘ (needs {requirement})")
            }
            FeatureStatus::DisabledByQuirk(quirk) => format!("✘ (workaround `{quirk}`)"),
        };
        writeln!(output, "\t\t{name:>max_feature_flag_width$}: {status}")?;
    }

    writeln!(output, "\tLimits:")?;
    let limits = format!("{:#?}", caps.limits);
    for line in limits.lines().skip(1) {
        let trimmed = line.trim_end_matches(['{', '}']).trim();
        if !trimmed.is_empty() {
            writeln!(output, "\t\t{trimmed}")?;
        }
    }

    writeln!(output, "\tMemory heaps:")?;
    for (heap_idx, heap) in caps.memory_heaps.iter().enumerate() {
        writeln!(
            output,
            "\t\theap {heap_idx}: {} MiB, {:?}",
            heap.size >> 20,
            heap.properties
        )?;
    }

    Ok(())
}

pub fn print_adapters(
    output: &mut dyn io::Write,
    adapters: &[ExposedAdapter<vulkan::Api>],
) -> io::Result<()> {
    writeln!(output, "Available adapters: {}", adapters.len())?;
    for (idx, exposed) in adapters.iter().enumerate() {
        print_adapter(output, exposed, idx)?;
    }
    Ok(())
}
