use boxoffice_codec::{Action, ListingDatum};
use boxoffice_txbuilder::UnlockRequest;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::Context;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Transaction that created the listing
    tx_hash: String,

    /// buy, cancel, update-price, relock or burn (or their codes 0 to 4)
    action: Action,

    /// Units to buy, 1 by default
    #[arg(long)]
    quantity: Option<u64>,

    /// New price in lovelace for update-price
    #[arg(long)]
    price: Option<u64>,

    /// Datum to relock with, as JSON
    #[arg(long, value_parser = ListingDatum::from_json)]
    datum: Option<ListingDatum>,
}

impl From<Args> for UnlockRequest {
    fn from(args: Args) -> Self {
        UnlockRequest {
            quantity: args.quantity,
            price: args.price,
            datum: args.datum,
            ..UnlockRequest::new(args.tx_hash, args.action)
        }
    }
}

pub async fn run(ctx: &Context, args: Args) -> anyhow::Result<()> {
    let request = UnlockRequest::from(args);
    let market = ctx.market()?;

    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, giving up");
                cancel.cancel();
            }
        }
    });

    info!(tx_hash = %request.tx_hash, action = %request.action, "unlocking");

    let tx_id = market.unlock(&request, &cancel).await?;
    println!("{tx_id}");

    Ok(())
}
