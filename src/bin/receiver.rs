use altbit::config::{Config, Overrides};
use altbit::engine::{ArqEngine, Completion};
use altbit::session::{PeerRole, open_channel};
use altbit::util::{content_hash, file::write_output};
use anyhow::anyhow;
use clap::Parser;
use directories::UserDirs;
use humansize::{BINARY, format_size};
use owo_colors::OwoColorize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Receive a file through the relay", long_about = None)]
struct Args {
    /// Configuration file (TOML format). Flags override it.
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Where to store the received bytes (optional, in your download folder as default).
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = Config::resolve(args.config.as_deref(), &args.overrides)?;
    let params = config.session_params(PeerRole::Receiver)?;

    let output = match args.output {
        Some(path) => path,
        None => {
            let user_dir = UserDirs::new();
            let downloads_dir = user_dir.as_ref().and_then(UserDirs::download_dir).ok_or(
                anyhow!("Failed to determine the output path. Please designate one with --output."),
            )?;
            downloads_dir.join(format!("altbit-{}.txt", params.session_id))
        }
    };

    println!(
        "Receiving session {} via {} into {}",
        params.session_id.bright_blue(),
        config.session.relay,
        output.display()
    );

    let channel = open_channel(
        config.session.relay.as_str(),
        &params,
        config.connect_timeout(),
    )
    .await?;
    let mut engine = ArqEngine::with_digest(channel, config.engine_config(), config.engine.digest);
    let report = engine.receive().await?;
    let stats = report.stats;

    write_output(&output, &report.data)?;

    println!("Checksum:    {}", report.checksum.bright_yellow());
    println!("Content:     {}", content_hash(&report.data).bright_black());
    println!("Size:        {}", format_size(report.data.len(), BINARY));
    println!("Received:    {}", stats.received);
    println!("Accepted:    {}", stats.accepted);
    println!("Rejected:    {}", stats.rejected);
    println!("Incomplete:  {}", stats.incomplete);

    match report.completion {
        Completion::TimedOut => println!("{}", "Gave up waiting for the sender".red()),
        completion => println!("{}", format!("Transfer {completion}").green()),
    }
    Ok(())
}
