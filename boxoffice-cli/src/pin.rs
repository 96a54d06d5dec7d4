use std::path::PathBuf;

use boxoffice_chain::pinata::gateway_url;

use crate::context::Context;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// File to upload
    file: PathBuf,
}

pub async fn run(ctx: &Context, args: Args) -> anyhow::Result<()> {
    let pinata = ctx.pinata()?;
    let cid = pinata.pin_file(&args.file).await?;

    println!("{cid}");

    if let Some(url) = gateway_url(&ctx.settings.pinata.gateway, &cid) {
        println!("{url}");
    }

    Ok(())
}
