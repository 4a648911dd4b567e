// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Apply, Download, Version};
use tokio_util::sync::CancellationToken;

use hvsync_cli::{describe_api_error, find_api_error, logging};

command_enum! {
    (Apply, Apply),
    (Download, Download),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let guard = logging::init_logging(args.log_level);

    // resolved lazily, so `version` works without a usable configuration
    let client_args = cli::op::ClientArgs {
        address: args.address,
        token: args.token,
        namespace: args.namespace,
        config_path: args.config_path,
    };

    let cancel = CancellationToken::new();
    let ctx = cli::op::OpContext::new(client_args, cancel.clone());

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling outstanding operations");
            cancel.cancel();
        }
    });

    match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            drop(guard);
            std::process::exit(0);
        }
        Err(e) => exit_with(guard, &e),
    }
}

/// Report an error and exit non-zero, flushing logs first
fn exit_with(
    guard: tracing_appender::non_blocking::WorkerGuard,
    err: &(dyn std::error::Error + 'static),
) -> ! {
    drop(guard);

    eprintln!("Error: {}", err);
    if let Some(api) = find_api_error(err) {
        eprintln!("{}", describe_api_error(api));
    }
    std::process::exit(1);
}
