use clap::Parser;
use miette::Result;
use tracing_subscriber::EnvFilter;

use csvimp::cli::{Cli, Commands, GlobalOpts};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_tracing(&global);

    match cli.command {
        Commands::Init(args) => csvimp::cli::commands::init::run(args),
        Commands::Upload(args) => csvimp::cli::commands::upload::run(args, &global),
        Commands::Preview(args) => csvimp::cli::commands::preview::run(args, &global),
        Commands::Map(args) => csvimp::cli::commands::map::run(args, &global),
        Commands::Chunk(args) => csvimp::cli::commands::chunk::run(args, &global),
        Commands::Run(args) => csvimp::cli::commands::run::run(args, &global),
        Commands::Status(args) => csvimp::cli::commands::status::run(args, &global),
        Commands::Errors(args) => csvimp::cli::commands::errors::run(args, &global),
        Commands::Finish(args) => csvimp::cli::commands::finish::run(args, &global),
        Commands::Cancel(args) => csvimp::cli::commands::cancel::run(args, &global),
        Commands::Completions(args) => csvimp::cli::commands::completions::run(args),
    }
}

fn init_tracing(global: &GlobalOpts) {
    let filter = if global.quiet {
        EnvFilter::new("off")
    } else if global.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
