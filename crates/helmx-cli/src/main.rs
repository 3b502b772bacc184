//! helm-x - treat Kubernetes manifests, kustomizations and charts as Helm releases

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, Subcommand};

mod commands;
mod error;
mod exit_codes;
mod interrupt;
mod logging;

use commands::adopt::AdoptArgs;
use commands::apply::{ApplyArgs, UpgradeArgs};
use commands::diff::DiffArgs;
use commands::dump::DumpArgs;
use commands::template::TemplateArgs;

#[derive(Parser)]
#[command(name = "helm-x")]
#[command(version)]
#[command(about = "Install, diff and render plain manifests, kustomizations and charts as Helm releases", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,

    /// Verbose logging; keeps the generated chart on disk
    #[arg(long, global = true, env = "HELM_DEBUG")]
    pub(crate) debug: bool,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Install or upgrade a release (installs when missing)
    Apply(ApplyArgs),

    /// Upgrade a release (fails when missing unless --install)
    Upgrade(UpgradeArgs),

    /// Show what apply would change in a release
    Diff(DiffArgs),

    /// Render the chart locally
    Template(TemplateArgs),

    /// Print a stored release
    Dump(DumpArgs),

    /// Make existing resources part of a release
    Adopt(AdoptArgs),
}

fn run(cli: &Cli, matches: &ArgMatches) -> error::Result<i32> {
    match &cli.command {
        Commands::Apply(args) => commands::apply::run(&args.common, args.install, matches, cli.debug),
        Commands::Upgrade(args) => {
            commands::apply::run(&args.common, args.install, matches, cli.debug)
        }
        Commands::Diff(args) => commands::diff::run(args, matches, cli.debug),
        Commands::Template(args) => commands::template::run(args, matches, cli.debug),
        Commands::Dump(args) => commands::dump::run(args),
        Commands::Adopt(args) => commands::adopt::run(args),
    }
}

fn main() {
    miette::set_panic_hook();

    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    logging::setup_logging(cli.debug);
    interrupt::install();

    let sub_matches = matches
        .subcommand()
        .map(|(_, m)| m)
        .unwrap_or(&matches);

    let code = match run(&cli, sub_matches) {
        Ok(code) => code,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}
