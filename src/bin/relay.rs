use altbit::constants::DEFAULT_RELAY_PORT;
use altbit::relay::Relay;
use clap::Parser;
use owo_colors::OwoColorize;
use std::net::{Ipv4Addr, SocketAddr};

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay that pairs peers and impairs their frames", long_about = None)]
struct Args {
    /// Listening addr
    #[arg(short, long, value_name = "LISTEN", default_value_t = SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_RELAY_PORT)))]
    listen: SocketAddr,

    /// Seed for reproducible loss, corruption and delay.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut relay = Relay::bind(args.listen).await?;
    if let Some(seed) = args.seed {
        relay = relay.with_seed(seed);
    }
    println!("Relay ready on {}", relay.local_addr()?.bright_blue());
    relay.run().await?;
    Ok(())
}
