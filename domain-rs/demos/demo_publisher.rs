//! Demo publisher: a fake weather station on the loopback messenger.
//!
//! Registers one node with a temperature output, polls a new value every
//! few seconds and publishes it. Run with:
//!
//! ```text
//! cargo run --example demo-publisher -- --domain local --publisher-id demo
//! ```

use anyhow::Result;
use clap::Parser;
use iotdomain::{init_logging, DummyMessenger, MessengerConfig, Publisher, PublisherConfig};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(about = "iotdomain demo publisher")]
struct Args {
    /// Domain to publish in
    #[arg(long, default_value = "local")]
    domain: String,

    /// Publisher ID on the bus
    #[arg(long, default_value = "demo")]
    publisher_id: String,

    /// Seconds between output value polls
    #[arg(long, default_value_t = 3)]
    poll_interval: usize,

    /// Log level: error, warn, info, debug
    #[arg(long, default_value = "info")]
    loglevel: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.loglevel, None)?;

    let config = PublisherConfig {
        domain: args.domain,
        publisher_id: args.publisher_id,
        ..PublisherConfig::default()
    };
    let messenger = Arc::new(DummyMessenger::new(&MessengerConfig::default()));
    let publisher = Publisher::new(&config, messenger)?;

    let node = publisher.registered_nodes().create_node("station-1", "weather");
    publisher
        .registered_outputs()
        .create_output(&node.node_id, &node.hw_id, "temperature", "0", "C");

    publisher.set_poll_interval(args.poll_interval, Arc::new(|publisher: &Publisher| {
        let node = publisher.registered_nodes().get_node_by_hw_id("station-1");
        let Some(node) = node else { return };
        // fake reading
        let value = format!("{:.1}", 15.0 + rand::random::<f64>() * 10.0);
        publisher
            .registered_output_values()
            .update_output_value(&node.node_id, "temperature", "0", &value);
    }));

    publisher.start();
    publisher.wait_for_signal();
    publisher.stop();
    Ok(())
}
