//! ripple-node - broadcast node speaking line-delimited JSON on stdio
//!
//! Environment:
//! - `RIPPLE_RETRY_INTERVAL` gossip re-send interval (default `1s`)
//! - `RIPPLE_INBOUND_BUFFER` inbound queue capacity (default 1024)
//! - `RIPPLE_LOG_FORMAT` `text` or `json`
//! - `RIPPLE_LOG` tracing filter (default `info`), written to stderr

use std::process::ExitCode;

use ripple_core::RippleResult;
use ripple_runtime::{logging, NodeConfig};
use ripple_transport::{spawn_stdin_reader, spawn_stdout_writer, ChannelOutbox};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match NodeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ripple-node: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(config.log_format) {
        eprintln!("ripple-node: {e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("ripple-node stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: NodeConfig) -> RippleResult<()> {
    let (outbox, outbound) = ChannelOutbox::new();
    let writer = spawn_stdout_writer(outbound);
    let inbound = spawn_stdin_reader(config.inbound_buffer);
    ripple_runtime::run(inbound, outbox, writer, config).await
}
