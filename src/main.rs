use anyhow::Result;
use clap::Parser;
use tapedeck::{
    app,
    cli::{self, Cli, CliCommand},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("tapedeck {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Record(args)) => {
            return cli::handle_record_command(args, cli::resolve_port(cli.port)).await;
        }
        Some(CliCommand::Play(args)) => {
            return cli::handle_play_command(args, cli::resolve_port(cli.port)).await;
        }
        Some(CliCommand::Pause) => {
            return cli::handle_pause_command(cli::resolve_port(cli.port)).await;
        }
        Some(CliCommand::Resume) => {
            return cli::handle_resume_command(cli::resolve_port(cli.port)).await;
        }
        Some(CliCommand::Seek(args)) => {
            return cli::handle_seek_command(args, cli::resolve_port(cli.port)).await;
        }
        Some(CliCommand::Stop) => {
            return cli::handle_stop_command(cli::resolve_port(cli.port)).await;
        }
        Some(CliCommand::Status) => {
            return cli::handle_status_command(cli::resolve_port(cli.port)).await;
        }
        Some(CliCommand::List(args)) => {
            return cli::handle_list_command(args, cli::resolve_port(cli.port)).await;
        }
        Some(CliCommand::Serve) | None => {}
    }

    app::run_service().await
}
