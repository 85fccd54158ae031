use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

mod cli;
mod modes;

use cli::Cli;

fn init_logging(log_path: Option<&Path>) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    if let Some(path) = log_path {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || file.try_clone().expect("clone log file handle"));
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(stderr_layer)
            .with(file_layer)
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(stderr_layer)
            .try_init()
            .ok();
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log.as_deref())?;

    if cli.list_modes {
        eprintln!("modes:");
        for mode in modes::MODES {
            eprintln!("  --mode={}\n      {}\n", mode.name, mode.description);
        }
        std::process::exit(1);
    }

    // SAFETY: installing a process-wide signal disposition before any
    // other thread exists (the runtime is single-threaded).
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }

    let mode = modes::build(&cli.mode)?;

    let mut system = pline_engine::System::new();
    system.register_observer(Box::new(modes::Shared(mode.clone())));

    if let Some(n) = cli.max_parallel {
        if n > 0 {
            system.set_max_running_tasks(n);
        }
    }

    let mut n_input_sources = 0usize;
    for filename in &cli.inputs {
        if filename == "-" {
            system.add_input_stdin();
        } else {
            system
                .add_input_script(Path::new(filename))
                .with_context(|| format!("opening script {filename}"))?;
        }
        n_input_sources += 1;
    }

    if n_input_sources == 0 {
        eprintln!("pline: no inputs given, nothing to do. try --help");
        return Ok(());
    }

    pline_engine::run(&mut system).await;

    std::process::exit(mode.borrow().exit_code());
}
