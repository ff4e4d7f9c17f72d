use anyhow::{Context, Result};
use log::{info, warn};

use uwb_sensor::core::ANCHOR_SLOTS;
use uwb_sensor::{
    ConfigurationManager, DriverConfig, DriverHandle, MessageFormatter, MockUwb, Point3,
    SerialUwb, TagSimulator, UwbDriver, UwbMsg,
};

use crate::cli::{Options, Subcommands};

mod cli;

/// Anchors used by `--simulate` when the configuration has none: a 10 m square
const SIMULATED_ANCHORS: [[f64; 3]; ANCHOR_SLOTS] = [
    [0.0, 0.0, 0.0],
    [10.0, 0.0, 0.0],
    [10.0, 10.0, 0.0],
    [0.0, 10.0, 0.0],
];

fn main() -> Result<()> {
    let options = Options::new();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(options.log_level)
        .init();

    let manager = match &options.config {
        Some(path) => ConfigurationManager::from_file(path)
            .with_context(|| format!("unable to load {}", path.display()))?,
        None => {
            info!("No config file given; using defaults");
            ConfigurationManager::new()
        }
    };
    let mut config = manager.config().clone();
    options.override_config(&mut config);
    config.validate()?;

    match options.subcommands {
        Some(Subcommands::DumpConfig) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Some(Subcommands::Definition) => {
            print!("{}", UwbMsg::definition());
        }
        None => run(&options, config)?,
    }

    Ok(())
}

fn run(options: &Options, mut config: DriverConfig) -> Result<()> {
    let handle = if options.simulate {
        start_simulation(options, &mut config)?
    } else {
        let source = SerialUwb::open(&config)?;
        UwbDriver::new(source, &config).spawn(config.queue_capacity)?
    };

    let formatter = MessageFormatter::new(options.format);
    if let Some(preamble) = formatter.preamble() {
        println!("{}", preamble);
    }

    let mut printed = 0;
    for msg in handle.receiver().iter() {
        println!("{}", formatter.format(&msg)?);
        printed += 1;
        if options.count.map_or(false, |count| printed >= count) {
            break;
        }
    }

    let stats = handle.join()?;
    info!("Reader stopped: {:?}", stats);
    Ok(())
}

fn start_simulation(options: &Options, config: &mut DriverConfig) -> Result<DriverHandle> {
    if !config.has_anchors() {
        warn!("No anchors configured; simulating a 10 m square");
        config.anchors = SIMULATED_ANCHORS.iter().copied().map(Some).collect();
    }

    let slots = config.anchor_slots();
    let anchors: [Option<Point3>; ANCHOR_SLOTS] = std::array::from_fn(|i| slots[i].deployed_position());
    let tag = match options.tag_position.as_deref() {
        Some([x, y, z]) => Point3::new(*x, *y, *z),
        _ => Point3::new(3.0, 4.0, 0.0),
    };
    info!("Simulating tag at ({}, {}, {})", tag.x, tag.y, tag.z);

    let simulator = TagSimulator::new(anchors, tag).with_noise(options.noise);
    let handle = UwbDriver::new(MockUwb::with_simulator(simulator), config).spawn(config.queue_capacity)?;
    Ok(handle)
}
