//! Template command - chartify and render locally
//!
//! With `--include-release-secret` or `--include-release-configmap` the
//! output also carries the storage object of a first revision, so applying
//! it with kubectl leaves a release that helm recognizes.

use clap::{ArgMatches, Args};
use console::style;
use helmx_core::{ChartMetadata, ManifestSet, Values, parse_set_string_values, parse_set_values};
use helmx_engine::{DEFAULT_RELEASE_NAME, ValuesLayers};
use helmx_kube::{ReleaseRecord, build_configmap, build_secret};
use serde_json::Value as JsonValue;

use super::{ChartArgs, prepare};
use crate::error::Result;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Manifest directory, kustomization, local chart or REPO/CHART
    #[arg(value_name = "DIR_OR_CHART")]
    pub input: String,

    /// Release name
    #[arg(long, default_value = DEFAULT_RELEASE_NAME)]
    pub name: String,

    #[command(flatten)]
    pub chart: ChartArgs,

    /// Append the release as a helm storage Secret
    #[arg(long, conflicts_with = "include_release_configmap")]
    pub include_release_secret: bool,

    /// Append the release as a helm storage ConfigMap
    #[arg(long)]
    pub include_release_configmap: bool,
}

/// Kind of storage object appended to rendered output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageObject {
    Secret,
    ConfigMap,
}

impl TemplateArgs {
    fn storage_object(&self) -> Option<StorageObject> {
        if self.include_release_secret {
            Some(StorageObject::Secret)
        } else if self.include_release_configmap {
            Some(StorageObject::ConfigMap)
        } else {
            None
        }
    }
}

pub fn run(args: &TemplateArgs, matches: &ArgMatches, debug: bool) -> Result<i32> {
    let options = args.chart.chartify_options(&args.name, None, matches, debug)?;
    let prepared = prepare(&args.input, options)?;
    let rendered = prepared.render()?;

    let output = match args.storage_object() {
        None => rendered,
        Some(object) => {
            if debug {
                eprintln!(
                    "{} Appending release {} as a {:?}",
                    style("DEBUG").dim(),
                    args.name,
                    object
                );
            }
            let config = user_config(&prepared.chart.values)?;
            with_release_object(
                &rendered,
                &args.name,
                args.chart.offline_namespace(),
                &prepared.chart.metadata,
                config,
                object,
            )?
        }
    };

    print!("{}", output);
    Ok(exit_codes::SUCCESS)
}

/// User-supplied values as helm stores them in a release's `config`
pub fn user_config(layers: &ValuesLayers) -> Result<JsonValue> {
    let mut values = Values::new();
    for file in &layers.files {
        values.merge(&Values::from_file(file)?);
    }
    if !layers.set.is_empty() {
        values.merge(&parse_set_values(&layers.set)?);
    }
    if !layers.set_string.is_empty() {
        values.merge(&parse_set_string_values(&layers.set_string)?);
    }
    Ok(values.into_inner())
}

/// Rendered manifests without hooks, followed by the release storage object
pub fn with_release_object(
    rendered: &str,
    release: &str,
    namespace: &str,
    chart: &ChartMetadata,
    config: JsonValue,
    object: StorageObject,
) -> Result<String> {
    let manifests = ManifestSet::parse(rendered, Some("rendered"))?.without_hooks();
    let stream = manifests.to_yaml_stream()?;

    let record = ReleaseRecord::first_revision(release, namespace, chart, config, stream.clone())?;
    let storage = match object {
        StorageObject::Secret => serde_yaml::to_string(&build_secret(&record)?)?,
        StorageObject::ConfigMap => serde_yaml::to_string(&build_configmap(&record)?)?,
    };

    let mut out = stream;
    out.push_str("---\n");
    out.push_str(&storage);
    Ok(out)
}
