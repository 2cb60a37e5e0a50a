use std::{env, net::SocketAddr, path::PathBuf, process::ExitCode};

use anyhow::{bail, Context, Error};
use ember_http::ServerConfig;
use ember_mio::Registry;
use tracing::{event, Level};

const USAGE: &str = "Usage:\tember-server <port> [-v|--verbose] [--root <dir>]";

fn main() -> ExitCode {
    let config = match parse_args(env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{}", USAGE);
            return ExitCode::SUCCESS;
        }
        Err(error) => {
            eprintln!("error: {:#}\n{}", error, USAGE);
            return ExitCode::FAILURE;
        }
    };

    devutils::init_logging(if config.verbose { "debug" } else { "info" });

    match run(config.server) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            event!(Level::ERROR, "server failed: {:#}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(config: ServerConfig) -> Result<(), Error> {
    let mut registry = Registry::new()?;

    // Interrupting closes all connections and the listener before exiting
    let shutdown = registry.shutdown();
    ctrlc::set_handler(move || {
        event!(Level::INFO, "interrupted, shutting down");
        shutdown.trigger();
    })
    .context("failed to install interrupt handler")?;

    ember_http::serve(&mut registry, config)
}

struct Args {
    server: ServerConfig,
    verbose: bool,
}

/// Parse command line arguments, `Ok(None)` means help was requested.
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Args>, Error> {
    let mut port = None;
    let mut root = None;
    let mut verbose = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-v" | "--verbose" => verbose = true,
            "--root" => {
                let value = args.next().context("missing value for --root")?;
                root = Some(PathBuf::from(value));
            }
            value if port.is_none() => {
                let value: u16 = value
                    .parse()
                    .with_context(|| format!("invalid port \"{}\"", value))?;
                port = Some(value);
            }
            value => bail!("unexpected argument \"{}\"", value),
        }
    }

    let port = port.context("missing port")?;

    let mut server = ServerConfig {
        addr: SocketAddr::from(([127, 0, 0, 1], port)),
        ..ServerConfig::default()
    };
    if let Some(root) = root {
        server.root = root;
    }

    Ok(Some(Args { server, verbose }))
}
