use boxoffice_chain::BlockfrostClient;

use crate::context::Context;

pub fn run(ctx: &Context) -> anyhow::Result<()> {
    // nothing is fetched, so no project id is needed
    let offline = BlockfrostClient::for_network(ctx.settings.market.network, "");
    let wallet = ctx.wallet(offline)?;

    println!("wallet: {}", wallet.address());

    if !ctx.settings.market.script_cbor.is_empty() {
        println!("script: {}", ctx.settings.market.script_address()?);
    }

    Ok(())
}
