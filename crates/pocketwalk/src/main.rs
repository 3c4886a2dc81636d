//! Pocketwalk: runs a configured set of static-analysis tools against a
//! project's files in a tight edit-check-commit loop, and commits the tree
//! once every tool passes.

mod run_loop;

use pocketwalk_cancel::Cancellation;
use run_loop::Supervisor;

#[tokio::main]
async fn main() {
    let argv: Vec<String> = std::env::args().collect();

    let default_level = match pocketwalk_config::cli::count_verbose_flags(&argv) {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .try_init()
        .ok();

    if argv.iter().any(|a| a == "--version" || a == "-V") {
        println!("pocketwalk {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(err) => {
            eprintln!("pocketwalk: could not read current directory: {err}");
            std::process::exit(1);
        }
    };

    let cancellation = Cancellation::install();
    let supervisor = Supervisor::new(cwd, argv, cancellation);

    let exit_code = match supervisor.run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("pocketwalk: {err:#}");
            1
        }
    };

    std::process::exit(exit_code);
}
