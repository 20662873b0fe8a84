//! Gallery command - one address's submissions

use crate::style::*;
use anyhow::Result;

pub async fn run(url: &str, address: &str) -> Result<()> {
    print_header("Gallery Submissions");

    let client = crate::client::StationClient::new(url);
    let gallery = client.gallery(address).await?;

    println!("Address:    {}", truncate_address(address));
    println!(
        "Rewarded:   {}",
        if gallery.rewarded {
            style_green("yes")
        } else {
            style_yellow("no")
        }
    );
    println!();

    if gallery.nft_id_list.is_empty() {
        print_info("Nothing submitted yet.");
    } else {
        for nft_id in &gallery.nft_id_list {
            println!("  - {}", nft_id);
        }
    }

    Ok(())
}
