use anyhow::Context as _;
use boxoffice_codec::TicketStatus;
use boxoffice_txbuilder::LockRequest;
use tracing::info;

use crate::context::Context;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// `lovelace`, or policy id followed by the hex asset name
    unit: String,

    /// How many units to lock
    quantity: u64,

    /// Seller key hash in hex, the wallet's own by default
    #[arg(long)]
    seller: Option<String>,

    /// `listed` or `sold`
    #[arg(long)]
    status: Option<TicketStatus>,

    /// Asking price in lovelace
    #[arg(long)]
    price: Option<u64>,
}

impl Args {
    fn request(self) -> anyhow::Result<LockRequest> {
        let seller = self
            .seller
            .map(hex::decode)
            .transpose()
            .context("seller must be a hex key hash")?;

        Ok(LockRequest {
            seller,
            status: self.status,
            price: self.price,
            unit: self.unit,
            quantity: self.quantity,
        })
    }
}

pub async fn run(ctx: &Context, args: Args) -> anyhow::Result<()> {
    let request = args.request()?;
    let market = ctx.market()?;

    info!(unit = %request.unit, quantity = request.quantity, "locking");

    let tx_id = market.lock(&request).await?;
    println!("{tx_id}");

    Ok(())
}
