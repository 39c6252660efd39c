//! `actionrpcd` – NDJSON daemon serving the action runtime.

use actionrpc::runtime::config::load_or_default;
use actionrpc::service::Service;
use actionrpc::things;
use std::env;
use std::io::{self, BufReader, BufWriter};
use std::net::TcpListener;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> io::Result<()> {
    let mut args = env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut transport: Option<Transport> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = match args.next() {
                    Some(path) => path,
                    None => {
                        eprintln!("--config requires a path argument");
                        print_usage();
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "missing value for --config",
                        ));
                    }
                };
                config_path = Some(PathBuf::from(path));
            }
            "--stdio" => {
                transport = Some(Transport::Stdio);
            }
            "--listen" => {
                let addr = match args.next() {
                    Some(addr) => addr,
                    None => {
                        eprintln!("--listen requires an address argument");
                        print_usage();
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "missing value for --listen",
                        ));
                    }
                };
                transport = Some(Transport::Tcp(addr));
            }
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "invalid command-line argument",
                ));
            }
        }
    }

    let config = load_or_default(config_path.as_deref()).map_err(to_io_error)?;

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    let transport = select_transport(transport, config.listen.clone());
    let (runtime, store) = things::sample_runtime(config).map_err(to_io_error)?;
    info!(
        actions = runtime.registry().len(),
        things = store.len(),
        "runtime ready"
    );

    let service = Service::from_config(runtime);
    match transport {
        Transport::Tcp(addr) => run_tcp(&service, &addr),
        Transport::Stdio => run_stdio(&service),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transport {
    Stdio,
    Tcp(String),
}

/// The last `--stdio` or `--listen` flag wins; the config's `listen` only
/// applies when neither was given.
fn select_transport(flag: Option<Transport>, configured: Option<String>) -> Transport {
    flag.unwrap_or_else(|| configured.map_or(Transport::Stdio, Transport::Tcp))
}

fn run_stdio(service: &Service) -> io::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = stdin.lock();
    let writer = BufWriter::new(stdout.lock());
    service.handle(reader, writer)
}

fn run_tcp(service: &Service, addr: &str) -> io::Result<()> {
    let listener = TcpListener::bind(addr)?;
    let actual = listener.local_addr()?;
    info!(addr = %actual, "actionrpcd listening");

    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let peer = stream.peer_addr().ok();
                let reader = BufReader::new(stream.try_clone()?);
                let writer = BufWriter::new(stream);
                if let Err(err) = service.handle(reader, writer) {
                    warn!(peer = ?peer, error = %err, "connection error");
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to accept connection");
            }
        }
    }

    Ok(())
}

fn print_usage() {
    eprintln!(
        "Usage: actionrpcd [--config PATH] [--stdio] [--listen ADDR]\n\
         \n\
         Options:\n\
           --config PATH Runtime configuration file (JSON)\n\
           --stdio       Communicate over stdin/stdout (default)\n\
           --listen ADDR Listen on TCP ADDR instead of stdio\n"
    );
}

fn to_io_error(error: impl std::fmt::Display) -> io::Error {
    io::Error::other(error.to_string())
}
