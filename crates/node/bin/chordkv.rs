use std::path::PathBuf;
use std::sync::Arc;

use chordkv_node::client::Client;
use chordkv_node::logging::init_logging;
use chordkv_node::logging::LogLevel;
use chordkv_node::native::config::Config;
use chordkv_node::native::config::DEFAULT_ENDPOINT_URL;
use chordkv_node::native::endpoint::run_api;
use chordkv_node::processor::Processor;
use clap::Args;
use clap::Parser;
use clap::Subcommand;

#[derive(Parser, Debug)]
#[command(about, version, author)]
struct Cli {
    #[arg(long, default_value_t = LogLevel::Info, value_enum, env)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    #[command(about = "Write a default config file")]
    Init(InitCommand),
    #[command(about = "Run a ring member")]
    Run(RunCommand),
    #[command(about = "Store a value")]
    Put(PutCommand),
    #[command(about = "Read a value")]
    Get(KeyCommand),
    #[command(about = "Delete a value")]
    Delete(KeyCommand),
    #[command(about = "Show ring state of a node")]
    Inspect(ClientArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(long, short = 'c', default_value = "~/.chordkv/config.yaml", env)]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct InitCommand {
    #[command(flatten)]
    config_args: ConfigArgs,

    #[arg(long, env)]
    hostname: Option<String>,
}

#[derive(Args, Debug)]
struct RunCommand {
    #[command(flatten)]
    config_args: ConfigArgs,

    #[arg(long, env)]
    hostname: Option<String>,

    #[arg(long, short = 'p', env)]
    port: Option<u16>,

    #[arg(long, short = 'b', env)]
    bind_addr: Option<String>,

    #[arg(long, env)]
    advertise_addr: Option<String>,

    #[arg(long, env = "NETWORK_ALIAS", help = "DNS name resolving to ring members")]
    rendezvous: Option<String>,

    #[arg(long, value_delimiter = ',', env)]
    seeds: Vec<String>,

    #[arg(long, env)]
    ring_bits: Option<u8>,

    #[arg(long, short = 'r', env)]
    replication_factor: Option<u8>,
}

impl RunCommand {
    fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = if self.config_args.config_exists() {
            Config::read_fs(&self.config_args.config)?
        } else {
            tracing::info!("config {:?} not found, use defaults", self.config_args.config);
            Config::default()
        };

        if let Some(v) = &self.hostname {
            config.hostname = v.clone();
        }
        if let Some(v) = self.port {
            config.port = v;
        }
        if let Some(v) = &self.bind_addr {
            config.bind_addr = v.clone();
        }
        if let Some(v) = &self.advertise_addr {
            config.advertise_addr = Some(v.clone());
        }
        if let Some(v) = &self.rendezvous {
            config.rendezvous = Some(v.clone());
        }
        if !self.seeds.is_empty() {
            config.seeds = self.seeds.clone();
        }
        if let Some(v) = self.ring_bits {
            config.ring_bits = v;
        }
        if let Some(v) = self.replication_factor {
            config.replication_factor = v;
        }
        config.validate()?;
        Ok(config)
    }
}

impl ConfigArgs {
    fn config_exists(&self) -> bool {
        chordkv_node::util::expand_home(&self.config)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }
}

#[derive(Args, Debug)]
struct ClientArgs {
    #[arg(
        long,
        short = 'u',
        default_value = DEFAULT_ENDPOINT_URL,
        help = "chordkv node endpoint url.",
        env
    )]
    endpoint_url: String,
}

impl ClientArgs {
    fn new_client(&self) -> Client {
        Client::new(self.endpoint_url.as_str())
    }
}

#[derive(Args, Debug)]
struct PutCommand {
    #[command(flatten)]
    client_args: ClientArgs,
    key: String,
    value: String,
}

#[derive(Args, Debug)]
struct KeyCommand {
    #[command(flatten)]
    client_args: ClientArgs,
    key: String,
}

async fn daemon_run(config: Config) -> anyhow::Result<()> {
    let processor = Arc::new(Processor::from_config(&config)?);
    let bind_addr = config.bind_addr.clone();

    // Serve before bootstrapping so peers can reach us while we join.
    let api = tokio::spawn(run_api_owned(bind_addr, processor.clone()));
    processor.bootstrap().await?;
    let _daemons = processor.spawn_daemons();

    tokio::select! {
        r = api => r??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down, hand off data");
            processor.leave().await?;
        }
    }
    Ok(())
}

async fn run_api_owned(bind_addr: String, processor: Arc<Processor>) -> anyhow::Result<()> {
    run_api(&bind_addr, processor).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Command::Init(args) => {
            let mut config = Config::default();
            if let Some(hostname) = args.hostname {
                config.hostname = hostname;
            }
            let p = config.write_fs(&args.config_args.config)?;
            println!("Your config file has saved to: {}", p);
            Ok(())
        }
        Command::Run(args) => daemon_run(args.resolve_config()?).await,
        Command::Put(args) => {
            args.client_args
                .new_client()
                .put(&args.key, args.value.into_bytes())
                .await?;
            println!("OK");
            Ok(())
        }
        Command::Get(args) => {
            match args.client_args.new_client().get(&args.key).await? {
                Some(v) => println!("{}", String::from_utf8_lossy(&v)),
                None => println!("(not found)"),
            }
            Ok(())
        }
        Command::Delete(args) => {
            let removed = args.client_args.new_client().delete(&args.key).await?;
            println!("{}", if removed { "OK" } else { "(not found)" });
            Ok(())
        }
        Command::Inspect(args) => {
            let info = args.new_client().inspect().await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}
