//! Adopt command - annotate existing resources so helm treats them as release-owned

use clap::Args;
use console::style;
use helmx_kube::{KubeAnnotator, ResourceRef, adopt};

use super::{ClientArgs, runtime};
use crate::error::Result;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct AdoptArgs {
    /// Release that takes ownership
    pub release: String,

    /// Resources to adopt, as KIND/NAME or KIND.GROUP/NAME
    #[arg(required = true, value_name = "KIND/NAME")]
    pub resources: Vec<String>,

    /// Namespace of the release and the resources
    #[arg(short, long, env = "HELM_NAMESPACE")]
    pub namespace: Option<String>,

    #[command(flatten)]
    pub client: ClientArgs,
}

pub fn run(args: &AdoptArgs) -> Result<i32> {
    let resources = parse_refs(&args.resources)?;
    let namespace = args.client.namespace(args.namespace.as_deref())?;
    adopt_resources(&args.release, &namespace, &resources, &args.client)?;
    Ok(exit_codes::SUCCESS)
}

pub fn parse_refs(raw: &[String]) -> Result<Vec<ResourceRef>> {
    let refs = raw
        .iter()
        .map(|r| r.trim().parse::<ResourceRef>())
        .collect::<helmx_kube::Result<Vec<_>>>()?;
    Ok(refs)
}

/// Adopt into `release` in `namespace`, reporting each adopted resource
pub fn adopt_resources(
    release: &str,
    namespace: &str,
    resources: &[ResourceRef],
    client: &ClientArgs,
) -> Result<Vec<String>> {
    eprintln!(
        "{} Adopting {} resource(s) into {}",
        style("→").blue().bold(),
        resources.len(),
        style(release).cyan()
    );

    let options = client.options();
    let adopted = runtime()?.block_on(async {
        let client = options.connect().await?;
        let annotator = KubeAnnotator::new(client).await?;
        adopt(&annotator, release, namespace, namespace, resources).await
    })?;

    for name in &adopted {
        eprintln!("  {} {}", style("✓").green(), name);
    }
    Ok(adopted)
}
