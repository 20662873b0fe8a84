//! Feed command - latest gallery items

use crate::style::*;
use anyhow::Result;

pub async fn run(url: &str, featured: bool) -> Result<()> {
    print_header(if featured {
        "Featured Gallery"
    } else {
        "Latest Gallery"
    });

    let client = crate::client::StationClient::new(url);
    let list = client.latest(featured).await?;

    if list.nft_list.is_empty() {
        print_info("No gallery items yet.");
        return Ok(());
    }

    println!();
    println!("{:>4}  {:<40}  Submitted", "#", "NFT");
    println!("{}", "─".repeat(75));
    for (i, item) in list.nft_list.iter().enumerate() {
        println!(
            "{:>4}  {:<40}  {}",
            i + 1,
            item.nft_id,
            style_dim(&item.timestamp)
        );
    }

    Ok(())
}
