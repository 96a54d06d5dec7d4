use anyhow::Context as _;
use boxoffice_txbuilder::{MintRequest, OutputRole};
use tracing::info;

use crate::context::Context;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Asset name, taken as UTF-8 text
    name: String,

    /// How many tokens to mint
    quantity: u64,

    /// Read the asset name as hex instead
    #[arg(long)]
    hex: bool,
}

impl Args {
    fn request(self) -> anyhow::Result<MintRequest> {
        let name = if self.hex {
            hex::decode(&self.name).context("asset name is not valid hex")?
        } else {
            self.name.into_bytes()
        };

        if name.len() > 32 {
            anyhow::bail!("asset name is {} bytes, at most 32 fit", name.len());
        }

        Ok(MintRequest {
            name,
            quantity: self.quantity,
        })
    }
}

pub async fn run(ctx: &Context, args: Args) -> anyhow::Result<()> {
    let request = args.request()?;
    let market = ctx.market()?;

    let unsigned = market.prepare_mint(&request).await?;

    let unit = unsigned
        .output_with(OutputRole::Minted)
        .and_then(|x| x.value.first_token())
        .map(|x| x.unit.clone())
        .unwrap_or_default();

    info!(%unit, quantity = request.quantity, "minting");

    let tx_id = market.submit(unsigned).await?;

    println!("{unit}");
    println!("{tx_id}");

    Ok(())
}
