//! probe_devices - finite capture-device probe
//!
//! Prints the indices that answer an open probe, one per line. An empty
//! result means no device, which is a status for the caller, not an error.

use clap::Parser;

use deskview::list_available_devices;

#[derive(Parser, Debug)]
#[command(name = "probe_devices", about = "List available capture device indices")]
struct Args {
    /// Highest device index to probe (exclusive).
    #[arg(long, default_value_t = 10)]
    max_index: u32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let devices = list_available_devices(args.max_index);
    if devices.is_empty() {
        log::info!("no capture devices found below index {}", args.max_index);
    }
    for index in devices {
        println!("{}", index);
    }
}
