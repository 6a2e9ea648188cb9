use std::{io, process::exit};

use adapter_hal::{Instance as _, InstanceDescriptor};
use adapter_types as adt;

const HELP: &str = "\
Usage: adapter-info [--output <PATH>] [--json] [--software] [--validation]

Options:
  -h, --help          Print this help
  -o, --output <PATH> Destination to write output to
  -j, --json          Output JSON information instead of text
      --software      Only discover software (CPU) implementations
      --validation    Enable the validation layer during discovery
";

pub fn main() {
    let mut args = pico_args::Arguments::from_env();
    let help = args.contains(["-h", "--help"]);

    if help {
        eprintln!("{HELP}");
        exit(101);
    }

    let output_path: Option<String> = args.opt_value_from_str(["-o", "--output"]).unwrap();
    let json = args.contains(["-j", "--json"]);
    let software = args.contains("--software");
    let validation = args.contains("--validation");

    env_logger::init();

    let mut flags = adt::InstanceFlags::empty();
    if validation {
        flags |= adt::InstanceFlags::VALIDATION | adt::InstanceFlags::DEBUG;
    }
    let desc = InstanceDescriptor {
        name: "adapter-info",
        flags,
        discovery_strategy: if software {
            adt::DiscoveryStrategy::SoftwareOnly
        } else {
            adt::DiscoveryStrategy::PreferHardware
        },
    };

    let instance = match unsafe { adapter_hal::vulkan::Instance::init(&desc) } {
        Ok(instance) => instance,
        Err(err) => {
            eprintln!("failed to initialize the Vulkan backend: {err}");
            exit(1);
        }
    };
    let adapters = match unsafe { instance.enumerate_adapters() } {
        Ok(adapters) => adapters,
        Err(err) => {
            eprintln!("no usable adapter found: {err}");
            exit(1);
        }
    };

    let mut file_handle;
    let mut std_handle;
    let output: &mut dyn io::Write = match output_path {
        Some(path) => {
            file_handle = match std::fs::File::create(&path) {
                Ok(file) => file,
                Err(err) => {
                    eprintln!("failed to create {path}: {err}");
                    exit(1);
                }
            };
            &mut file_handle
        }
        None => {
            std_handle = io::stdout();
            &mut std_handle
        }
    };

    let result = if json {
        crate::report::GpuReport::from_adapters(&adapters).into_json(output)
    } else {
        crate::human::print_adapters(output, &adapters)
    };
    if let Err(err) = result {
        eprintln!("failed to write report: {err}");
        exit(1);
    }
}
