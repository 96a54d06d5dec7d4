use boxoffice_chain::{pinata::gateway_url, ScriptUtxo, Value};
use boxoffice_codec::{ListingDatum, TicketStatus};
use serde::Serialize;

use crate::context::Context;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Only listings of this seller (hex key hash or recorded seller)
    #[arg(long)]
    seller: Option<String>,

    /// Only listings in this status, `listed` or `sold`
    #[arg(long)]
    status: Option<TicketStatus>,
}

/// A listing as printed.
#[derive(Debug, Serialize)]
struct ListingView<'a> {
    input: String,
    value: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    seller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    datum: &'static str,
}

impl<'a> ListingView<'a> {
    fn new(listing: &'a ScriptUtxo, gateway: &str) -> Self {
        let datum = listing.datum.as_ref();

        let (event_id, image) = match datum {
            Some(ListingDatum::Record(x)) => (
                Some(x.event_id.as_str()),
                x.image.as_deref().and_then(|i| gateway_url(gateway, i)),
            ),
            _ => (None, None),
        };

        let kind = match datum {
            Some(ListingDatum::Structural(_)) => "structural",
            Some(ListingDatum::Record(_)) => "record",
            Some(ListingDatum::Opaque(_)) => "opaque",
            Some(ListingDatum::Malformed(_)) => "malformed",
            None => "none",
        };

        Self {
            input: listing.input().to_string(),
            value: listing.value(),
            seller: datum.and_then(ListingDatum::seller),
            status: datum.and_then(ListingDatum::status).map(|x| x.to_string()),
            price: datum.and_then(ListingDatum::price),
            event_id,
            image,
            datum: kind,
        }
    }
}

pub async fn run(ctx: &Context, args: Args) -> anyhow::Result<()> {
    let market = ctx.market()?;

    let listings = market
        .tickets_of(args.seller.as_deref(), args.status)
        .await?;

    let gateway = &ctx.settings.pinata.gateway;
    let views: Vec<_> = listings
        .iter()
        .map(|x| ListingView::new(x, gateway))
        .collect();

    println!("{}", serde_json::to_string_pretty(&views)?);

    Ok(())
}
