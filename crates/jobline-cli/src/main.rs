use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;

use jobline_core::client::{self, AutoCallSummary};
use jobline_core::config::{DEFAULT_CLIENT_PORT, DEFAULT_MULTICAST_GROUP};
use jobline_core::shutdown::install_shutdown_handler;
use jobline_core::worker::{
    MulticastListener, MulticastWordSink, NoopSink, StatusSink, SyslogNotifier, WordSink,
};
use jobline_core::{Broker, BrokerConfig, WorkerConfig, WorkerRuntime};

#[derive(Parser, Debug)]
#[command(name = "jobline")]
#[command(version)]
#[command(about = "A minimal job broker with pull-based workers")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the broker (client port + worker port)
    Broker(BrokerArgs),

    /// Run a worker against a broker's worker port
    Worker(WorkerArgs),

    /// Submit a job; words come from the arguments or from stdin
    Job {
        #[command(flatten)]
        client: ClientArgs,

        /// Job text
        words: Vec<String>,
    },

    /// Query the state of a job
    Status {
        #[command(flatten)]
        client: ClientArgs,

        /// Job id
        id: String,
    },

    /// Submit a batch of random jobs
    AutoCall {
        #[command(flatten)]
        client: ClientArgs,

        /// Number of jobs to submit
        #[arg(long, default_value = "50")]
        num_jobs: usize,

        /// Seconds to wait between jobs
        #[arg(long, default_value = "0.1")]
        delay: f64,

        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },

    /// Print words multicast by workers
    Listen {
        /// UDP port to listen on
        #[arg(value_parser = clap::value_parser!(u16).range(1..))]
        port: u16,

        /// Multicast group address
        #[arg(long, default_value_t = DEFAULT_MULTICAST_GROUP)]
        group: Ipv4Addr,
    },
}

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct BrokerArgs {
    /// Port for client connections (JOB / STATUS)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    client_port: Option<u16>,

    /// Port for worker connections (FETCH / DONE)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    worker_port: Option<u16>,

    /// Address both listeners bind to
    #[arg(long)]
    bind: Option<IpAddr>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Broker worker endpoint, host:port (e.g. localhost:50001)
    workqueue: String,

    /// UDP multicast port for job words
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    output_port: Option<u16>,

    /// Local UDP port for syslog notifications
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    syslog_port: Option<u16>,

    /// Multicast group for job words
    #[arg(long)]
    group: Option<Ipv4Addr>,

    /// JSON configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Broker host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Broker client port
    #[arg(long, short = 'p', default_value_t = DEFAULT_CLIENT_PORT,
          value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
}

impl ClientArgs {
    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct AutoCallOutput<'a> {
    addr: String,
    submitted: usize,
    failed: usize,
    #[serde(flatten)]
    summary: &'a AutoCallSummary,
}

// =============================================================================
// Commands
// =============================================================================

fn init_logging(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run_broker(args: BrokerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => BrokerConfig::from_json_file(path)?,
        None => BrokerConfig::default(),
    };
    if let Some(ip) = args.bind {
        config.client_addr.set_ip(ip);
        config.worker_addr.set_ip(ip);
    }
    if let Some(port) = args.client_port {
        config.client_addr.set_port(port);
    }
    if let Some(port) = args.worker_port {
        config.worker_addr.set_port(port);
    }

    let broker = Broker::bind(config).await?;
    let shutdown = install_shutdown_handler()?;
    broker.run(shutdown).await;
    Ok(())
}

async fn run_worker(args: WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => WorkerConfig::from_json_file(path)?,
        None => WorkerConfig::default(),
    };
    config.broker_addr = args.workqueue;
    if args.output_port.is_some() {
        config.output_port = args.output_port;
    }
    if args.syslog_port.is_some() {
        config.syslog_port = args.syslog_port;
    }
    if let Some(group) = args.group {
        config.multicast_group = group;
    }
    config.validate()?;

    let words: Arc<dyn WordSink> = match config.output_port {
        Some(port) => Arc::new(MulticastWordSink::new(config.multicast_group, port).await?),
        None => Arc::new(NoopSink),
    };
    let status: Arc<dyn StatusSink> = match config.syslog_port {
        Some(port) => Arc::new(SyslogNotifier::new(port).await?),
        None => Arc::new(NoopSink),
    };

    let shutdown = install_shutdown_handler()?;
    let summary = WorkerRuntime::new(config, words, status).run(shutdown).await;
    tracing::info!(?summary, "worker exited");
    Ok(())
}

async fn run_job(client: ClientArgs, words: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let text = if words.is_empty() {
        let mut input = String::new();
        tokio::io::stdin().read_to_string(&mut input).await?;
        input.trim().to_string()
    } else {
        words.join(" ")
    };
    if text.is_empty() {
        return Err("JOB requires text (pass words after the command or pipe input)".into());
    }

    let id = client::submit(&client.addr(), &text).await?;
    println!("ID {id}");
    Ok(())
}

async fn run_auto_call(
    client: ClientArgs,
    num_jobs: usize,
    delay: f64,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let delay = Duration::try_from_secs_f64(delay.max(0.0))?;
    let addr = client.addr();

    if matches!(output, OutputFormat::Table) {
        println!("Sending {num_jobs} random jobs to {addr}");
        println!("Delay between jobs: {}s", delay.as_secs_f64());
        println!("{}", "-".repeat(50));
    }

    let summary = client::auto_call(&addr, num_jobs, delay).await;

    match output {
        OutputFormat::Json => {
            let out = AutoCallOutput {
                addr,
                submitted: summary.job_ids().len(),
                failed: summary.failures(),
                summary: &summary,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Table => {
            for (i, s) in summary.submissions.iter().enumerate() {
                let result = match (&s.job_id, &s.error) {
                    (Some(id), _) => format!("ID {id}"),
                    (None, Some(e)) => format!("ERROR: {e}"),
                    (None, None) => "?".to_string(),
                };
                println!("Job {:2}: {:<30} -> {}", i + 1, s.text, result);
            }
            let ids: Vec<String> = summary.job_ids().iter().map(|id| id.to_string()).collect();
            println!("{}", "-".repeat(10));
            println!("Successfully submitted {} jobs", ids.len());
            println!("Job IDs: {}", ids.join(", "));
        }
    }
    Ok(())
}

async fn run_listen(port: u16, group: Ipv4Addr) -> Result<(), Box<dyn std::error::Error>> {
    let listener = MulticastListener::bind(group, port).await?;
    let shutdown = install_shutdown_handler()?;
    tracing::info!(%group, port, "listening for words");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = listener.recv_word() => {
                let (word, from) = received?;
                tracing::debug!(%from, "datagram");
                println!("{word}");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Broker(broker_args) => {
            init_logging("info");
            run_broker(broker_args).await?;
        }
        Commands::Worker(worker_args) => {
            init_logging("info");
            run_worker(worker_args).await?;
        }
        Commands::Job { client, words } => {
            init_logging("warn");
            run_job(client, words).await?;
        }
        Commands::Status { client, id } => {
            init_logging("warn");
            println!("{}", client::status(&client.addr(), &id).await?);
        }
        Commands::AutoCall {
            client,
            num_jobs,
            delay,
            output,
        } => {
            init_logging("warn");
            run_auto_call(client, num_jobs, delay, output).await?;
        }
        Commands::Listen { port, group } => {
            init_logging("info");
            run_listen(port, group).await?;
        }
    }

    Ok(())
}
