use altbit::config::{Config, Overrides};
use altbit::engine::{ArqEngine, Completion};
use altbit::session::{PeerRole, open_channel};
use altbit::util::{content_hash, file::read_payload};
use anyhow::bail;
use clap::Parser;
use humansize::{BINARY, format_size};
use owo_colors::OwoColorize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Send a file through the relay", long_about = None)]
struct Args {
    /// Configuration file (TOML format). Flags override it.
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// The file to send. Only its first bytes are sent, see --max-payload-len.
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    #[arg(long, value_name = "BYTES")]
    max_payload_len: Option<usize>,

    #[command(flatten)]
    overrides: Overrides,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = Config::resolve(args.config.as_deref(), &args.overrides)?;
    if let Some(max_payload_len) = args.max_payload_len {
        config.engine.max_payload_len = max_payload_len;
    }
    let params = config.session_params(PeerRole::Sender)?;
    let payload = read_payload(&args.file, config.engine.max_payload_len)?;

    println!(
        "Sending {} of {} in session {} via {}",
        format_size(payload.len(), BINARY).yellow(),
        args.file.display(),
        params.session_id.bright_blue(),
        config.session.relay
    );

    let channel = open_channel(
        config.session.relay.as_str(),
        &params,
        config.connect_timeout(),
    )
    .await?;
    let mut engine = ArqEngine::with_digest(channel, config.engine_config(), config.engine.digest);
    let report = engine.send(payload.clone()).await?;
    let stats = report.stats;

    println!("Checksum:    {}", report.checksum.bright_yellow());
    println!("Content:     {}", content_hash(&payload).bright_black());
    println!("Sent:        {}", stats.sent);
    println!("Received:    {}", stats.received);
    println!("Corrupted:   {}", stats.corrupted);
    println!("Stale acks:  {}", stats.stale_acks);
    println!("Timeouts:    {}", stats.timeouts);

    if report.completion != Completion::Finished {
        bail!(
            "transfer {} after {} / {}",
            report.completion,
            format_size(report.delivered, BINARY),
            format_size(payload.len(), BINARY)
        );
    }
    println!("{}", "Transfer finished".green());
    Ok(())
}
