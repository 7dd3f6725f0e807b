//! PageBeacon CLI
//!
//! Runs the event collector, sends test events and reads event logs.

use clap::{Parser, Subcommand};
use pagebeacon::{config::Config, event::LogRecord, PRIVACY_DECLARATION, VERSION};
use std::io::BufRead;
use std::path::{Path, PathBuf};

#[cfg(feature = "server")]
use pagebeacon::server::{self, ServerConfig};

#[cfg(feature = "client")]
use pagebeacon::{
    client::{ClientConfig, HttpTransport, SensorClient},
    event::EventType,
    identity::MemoryCookieJar,
};

#[derive(Parser)]
#[command(name = "pagebeacon")]
#[command(author = "PageBeacon")]
#[command(version = VERSION)]
#[command(about = "Browser visitor/session telemetry collector", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the event collector
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long, short)]
        port: Option<u16>,

        /// Address to bind (overrides config)
        #[arg(long)]
        bind: Option<String>,

        /// Event log file (overrides config; tracing output when unset)
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Send one event to a collector and print its acknowledgment
    #[cfg(feature = "client")]
    Send {
        /// Collector base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        collector: String,

        /// Site id
        #[arg(long)]
        site: String,

        /// Channel within the site
        #[arg(long)]
        channel: Option<String>,

        /// Event type (page, exit, file or user)
        #[arg(long = "type", default_value = "user")]
        event_type: String,

        /// Event name
        name: String,

        /// Event description
        #[arg(long)]
        desc: Option<String>,
    },

    /// Read an event log and print its events
    ParseLog {
        /// Event log file
        path: PathBuf,

        /// Print every field as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config,

    /// Display privacy declaration
    Privacy,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        #[cfg(feature = "server")]
        Commands::Serve {
            port,
            bind,
            log_file,
        } => {
            cmd_serve(port, bind, log_file);
        }
        #[cfg(feature = "client")]
        Commands::Send {
            collector,
            site,
            channel,
            event_type,
            name,
            desc,
        } => {
            cmd_send(&collector, &site, channel, &event_type, &name, desc);
        }
        Commands::ParseLog { path, json } => {
            cmd_parse_log(&path, json);
        }
        Commands::Config => {
            cmd_config();
        }
        Commands::Privacy => {
            cmd_privacy();
        }
    }
}

#[cfg(feature = "server")]
fn cmd_serve(port: Option<u16>, bind: Option<String>, log_file: Option<PathBuf>) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagebeacon=info".into()),
        )
        .init();

    let mut config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config, using defaults: {e}");
            Config::default()
        }
    };
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(bind) = bind {
        config.bind_address = bind;
    }
    if log_file.is_some() {
        config.event_log_path = log_file;
    }

    println!("PageBeacon Collector v{VERSION}");
    println!();
    println!(
        "  Event log: {}",
        config
            .event_log_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "tracing output".to_string())
    );
    println!("  Cookie domain: {}", config.cookie_domain.as_deref().unwrap_or("(request host)"));
    println!("  Namespace: {}", config.namespace);
    println!();

    let server_config = match ServerConfig::from_config(config) {
        Ok(server_config) => server_config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };

    let result: anyhow::Result<()> = runtime.block_on(async move {
        let (addr, shutdown_tx) = server::run(server_config).await?;
        println!("Listening on http://{addr}");
        println!("Press Ctrl+C to stop.");

        tokio::signal::ctrl_c().await?;
        println!();
        println!("Stopping collector...");
        let _ = shutdown_tx.send(());
        Ok(())
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(feature = "client")]
fn cmd_send(
    collector: &str,
    site: &str,
    channel: Option<String>,
    event_type: &str,
    name: &str,
    desc: Option<String>,
) {
    let Ok(event_type) = event_type.parse::<EventType>() else {
        eprintln!("Error: Unknown event type '{event_type}' (expected page, exit, file or user)");
        std::process::exit(1);
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            std::process::exit(1);
        }
    };
    // the transport spawns onto the current runtime
    let _guard = runtime.enter();

    let transport = match HttpTransport::new() {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let config = ClientConfig::new(collector).with_site(site, channel);
    let sensor = SensorClient::new(
        config,
        std::sync::Arc::new(MemoryCookieJar::new()),
        std::sync::Arc::new(transport),
    );

    let (tx, rx) = std::sync::mpsc::channel();
    sensor.callbacks().set_on_event(move |ack| {
        let _ = tx.send(ack.clone());
    });

    if let Err(e) = sensor.record_event(event_type, name, desc.as_deref()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    match rx.recv_timeout(std::time::Duration::from_secs(15)) {
        Ok(ack) => println!(
            "{}",
            serde_json::to_string_pretty(&ack).unwrap_or_else(|_| "Error".to_string())
        ),
        Err(_) => {
            eprintln!("No acknowledgment received (collector unreachable, or event declined).");
            std::process::exit(1);
        }
    }
}

fn cmd_parse_log(path: &Path, json: bool) {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Error opening {path:?}: {e}");
            std::process::exit(1);
        }
    };

    let mut events = 0usize;
    let mut skipped = 0usize;
    for line in std::io::BufReader::new(file).lines() {
        let Ok(line) = line else {
            skipped += 1;
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }

        match LogRecord::parse(&line) {
            Ok(record) => {
                events += 1;
                if json {
                    let fields: serde_json::Map<String, serde_json::Value> = record
                        .fields()
                        .map(|(key, _)| {
                            let value = if key == "ed" {
                                record.event_desc()
                            } else {
                                record.decoded(key)
                            }
                            .unwrap_or_default();
                            (key.to_string(), serde_json::Value::String(value))
                        })
                        .collect();
                    println!("{}", serde_json::Value::Object(fields));
                } else {
                    println!(
                        "{} {:<5} site={} visit={} {}",
                        record.get("tm").unwrap_or_default(),
                        record.get("et").unwrap_or_default(),
                        record.get("si").unwrap_or_default(),
                        record.get("vi").unwrap_or_default(),
                        record.event_name().unwrap_or_default()
                    );
                }
            }
            Err(e) => {
                skipped += 1;
                tracing::debug!("Skipping line: {}", e);
            }
        }
    }

    if !json {
        println!();
        println!("Events: {events}");
        println!("Skipped lines: {skipped}");
    }
}

fn cmd_config() {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn cmd_privacy() {
    println!("{PRIVACY_DECLARATION}");
}
