mod cli;
mod engine;
mod logging;
mod model;
mod orchestrator;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let interactive = args.is_interactive();

    let target = logging::resolve_target(args.log_file.as_deref(), interactive);
    logging::init(&target, &args.log_level);
    logging::install_panic_hook(move || {
        // Leave the terminal usable before the panic message is printed.
        #[cfg(feature = "tui")]
        if interactive {
            tui::restore_terminal();
        }
    });

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success, especially for non-TUI modes
            if !interactive {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "exiting with error");
            Err(e)
        }
    }
}
