mod clipboard;
mod credential;
mod error;
mod qr;
mod session;
mod totp;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::clipboard::SystemClipboard;
use crate::session::{Clock, SessionConfig, SystemClock, DEFAULT_REFRESH_LIMIT};

#[derive(Parser)]
#[command(name = "auth", version)]
#[command(about = "Extract TOTP codes from otpauth:// QR images")]
#[command(long_about = "Extract TOTP codes from otpauth:// QR images.\n\n\
    On a terminal the code is kept on the clipboard and refreshed with a live \
    countdown; the previous clipboard content is restored on exit. When output \
    is piped, a single code is printed for scripting.")]
#[command(after_help = "QR codes contain unencrypted secrets. Keep the images somewhere safe.")]
struct Cli {
    /// PNG or JPEG image containing an otpauth:// QR code
    #[arg(value_name = "IMAGE")]
    image: PathBuf,

    /// Code refreshes shown before an interactive session exits
    #[arg(
        short = 'n',
        long,
        default_value_t = DEFAULT_REFRESH_LIMIT,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    refreshes: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version land here too.
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let uri = qr::extract_otpauth_uri(&cli.image).context("Error parsing QR code")?;
    let credential = credential::parse(&uri)?;

    if !std::io::stdout().is_terminal() {
        debug!("stdout is not a terminal, printing a single code");
        session::write_code(&mut std::io::stdout(), &credential, SystemClock.now())?;
        return Ok(());
    }

    let config = SessionConfig {
        refresh_limit: cli.refreshes,
        ..Default::default()
    };
    let outcome = session::run(
        &credential,
        &config,
        SystemClipboard::new(),
        &SystemClock,
        &mut std::io::stdout(),
        session::shutdown_signal(),
    )
    .await?;
    debug!(?outcome, "session ended");

    Ok(())
}
