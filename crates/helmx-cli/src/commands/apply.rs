//! Apply and upgrade commands - chartify, optionally adopt, then `helm upgrade`

use clap::{ArgAction, ArgMatches, Args};
use console::style;
use helmx_engine::{Helm, ProcessRunner, UpgradeRequest};
use helmx_kube::ResourceRef;

use super::adopt::{adopt_resources, parse_refs};
use super::{ChartArgs, ClientArgs, prepare};
use crate::error::Result;
use crate::exit_codes;

/// Flags shared by `apply` and `upgrade`
#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Release name
    pub release: String,

    /// Manifest directory, kustomization, local chart or REPO/CHART
    #[arg(value_name = "DIR_OR_CHART")]
    pub input: String,

    #[command(flatten)]
    pub chart: ChartArgs,

    #[command(flatten)]
    pub client: ClientArgs,

    /// Seconds to wait for any individual Kubernetes operation
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Simulate the upgrade
    #[arg(long)]
    pub dry_run: bool,

    /// Existing resources (KIND/NAME) to adopt before upgrading
    #[arg(long, value_delimiter = ',', value_name = "KIND/NAME")]
    pub adopt: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub common: ReleaseArgs,

    /// Install the release when it does not exist yet
    #[arg(long, default_value_t = true, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub install: bool,
}

#[derive(Args, Debug)]
pub struct UpgradeArgs {
    #[command(flatten)]
    pub common: ReleaseArgs,

    /// Install the release when it does not exist yet
    #[arg(long, default_value_t = false, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub install: bool,
}

pub fn run(args: &ReleaseArgs, install: bool, matches: &ArgMatches, debug: bool) -> Result<i32> {
    // Bad references fail before anything is built
    let adopt: Vec<ResourceRef> = parse_refs(&args.adopt)?;

    // Rendering, adoption and the upgrade all target the same namespace
    let namespace = args.client.namespace(args.chart.namespace.as_deref())?;
    let mut options = args.chart.chartify_options(
        &args.release,
        args.client.kube_context.as_deref(),
        matches,
        debug,
    )?;
    options.namespace = Some(namespace.clone());
    let prepared = prepare(&args.input, options)?;

    if !adopt.is_empty() {
        if args.dry_run {
            eprintln!(
                "{} Dry run: not adopting {} resource(s)",
                style("!").yellow().bold(),
                adopt.len()
            );
        } else {
            adopt_resources(&args.release, &namespace, &adopt, &args.client)?;
        }
    }

    eprintln!(
        "{} {} release {}",
        style("→").blue().bold(),
        if install { "Applying" } else { "Upgrading" },
        style(&args.release).cyan()
    );

    let helm = Helm::new(&prepared.options.binaries.helm, &ProcessRunner);
    let output = helm.upgrade(&UpgradeRequest {
        release: &args.release,
        chart: &prepared.chart.dir,
        namespace: Some(&namespace),
        values: &prepared.chart.values,
        install,
        dry_run: args.dry_run,
        timeout_secs: args.timeout,
        dependency_update: prepared.chart.needs_dependency_update(),
        kube_context: args.client.kube_context.as_deref(),
    })?;

    print!("{}", output.stdout);
    if !output.stderr.trim().is_empty() {
        eprint!("{}", output.stderr);
    }
    eprintln!(
        "{} Release {} {}",
        style("✓").green().bold(),
        style(&args.release).cyan(),
        if args.dry_run { "simulated" } else { "applied" }
    );
    Ok(exit_codes::SUCCESS)
}
