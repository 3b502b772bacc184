//! Dump command

use clap::Args;

use super::{ClientArgs, runtime};
use crate::error::Result;
use crate::exit_codes;

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Release name
    pub release: String,

    /// Revision to print (latest when omitted)
    #[arg(long)]
    pub revision: Option<u32>,

    /// Namespace of the release
    #[arg(short, long, env = "HELM_NAMESPACE")]
    pub namespace: Option<String>,

    #[command(flatten)]
    pub client: ClientArgs,
}

pub fn run(args: &DumpArgs) -> Result<i32> {
    let namespace = args.client.namespace(args.namespace.as_deref())?;
    let options = args.client.options();

    let output = runtime()?.block_on(async {
        let storage = options.storage().await?;
        helmx_kube::dump::dump(storage.as_ref(), &namespace, &args.release, args.revision).await
    })?;

    print!("{}", output);
    Ok(exit_codes::SUCCESS)
}
