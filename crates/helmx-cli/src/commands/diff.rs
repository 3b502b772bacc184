//! Diff command - compare the chartified input with the deployed release

use clap::{ArgMatches, Args};
use console::style;
use helmx_kube::{ChangeType, DiffEngine, DiffResult, KubeError, LineType, ResourceChange};

use super::{ChartArgs, ClientArgs, prepare, runtime};
use crate::error::Result;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Release name
    pub release: String,

    /// Manifest directory, kustomization, local chart or REPO/CHART
    #[arg(value_name = "DIR_OR_CHART")]
    pub input: String,

    #[command(flatten)]
    pub chart: ChartArgs,

    #[command(flatten)]
    pub client: ClientArgs,

    /// Exit with 2 when there are changes; errors then exit with 1
    #[arg(long)]
    pub detailed_exitcode: bool,

    /// Lines of context around each change
    #[arg(long, default_value_t = 3)]
    pub context: usize,
}

pub fn run(args: &DiffArgs, matches: &ArgMatches, debug: bool) -> Result<i32> {
    match diff(args, matches, debug) {
        Ok(result) if args.detailed_exitcode && result.has_changes() => {
            Ok(exit_codes::CHANGES_DETECTED)
        }
        Ok(_) => Ok(exit_codes::SUCCESS),
        Err(err) if args.detailed_exitcode => Err(err.generic()),
        Err(err) => Err(err),
    }
}

fn diff(args: &DiffArgs, matches: &ArgMatches, debug: bool) -> Result<DiffResult> {
    let namespace = args.client.namespace(args.chart.namespace.as_deref())?;
    let mut options = args.chart.chartify_options(
        &args.release,
        args.client.kube_context.as_deref(),
        matches,
        debug,
    )?;
    options.namespace = Some(namespace.clone());
    let prepared = prepare(&args.input, options)?;
    let rendered = prepared.render()?;

    let client = args.client.options();
    let release = runtime()?.block_on(async {
        let storage = client.storage().await?;
        match storage.get_latest(&namespace, &args.release).await {
            Ok(record) => Ok(Some(record)),
            Err(KubeError::ReleaseNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    })?;

    match &release {
        Some(record) => tracing::debug!(release = %args.release, revision = record.version, "comparing against release"),
        None => tracing::debug!(release = %args.release, "release not installed, everything is new"),
    }

    let engine = DiffEngine::new().with_context(args.context);
    let result = engine.diff_release(release.as_ref(), &rendered)?;

    for change in &result.changes {
        print_change(change);
    }

    let summary = engine.summary(&result);
    if result.has_changes() {
        eprintln!("{} {}", style("Δ").yellow().bold(), summary);
    } else {
        eprintln!("{} {}", style("✓").green().bold(), summary);
    }

    Ok(result)
}

fn print_change(change: &ResourceChange) {
    let header = format!("{}, {}", change.display_name(), change.change_type);
    let header = match change.change_type {
        ChangeType::Added => style(header).green().bold(),
        ChangeType::Removed => style(header).red().bold(),
        ChangeType::Modified => style(header).yellow().bold(),
    };
    println!("{}", header);

    for line in &change.diff.lines {
        match line.line_type {
            LineType::Added => println!("{}", style(format!("+ {}", line.content)).green()),
            LineType::Removed => println!("{}", style(format!("- {}", line.content)).red()),
            LineType::Context => println!("  {}", line.content),
            LineType::Separator => println!("{}", style("...").dim()),
        }
    }
    println!();
}
