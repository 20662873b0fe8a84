//! Status command - show one sign request

use crate::style::*;
use anyhow::Result;

pub async fn run(url: &str, request_key: &str, gallery: bool) -> Result<()> {
    print_header("Sign Request");

    let client = crate::client::StationClient::new(url);
    let request = client.request_status(request_key, gallery).await?;

    println!("Key:        {}", style_cyan(request_key));
    println!("Status:     {}", style_status(request.status));

    if request.status == -1 && request.kind.is_empty() {
        println!();
        print_warning("Request not found or expired.");
        return Ok(());
    }

    println!("Type:       {}", request.kind);
    println!("Created:    {} UTC", request.added_at);
    if request.signer.is_empty() {
        println!("Signer:     {}", style_dim("(not bound)"));
    } else {
        println!("Signer:     {}", truncate_address(&request.signer));
    }
    if !request.extra.is_empty() {
        println!("Extra:      {}", request.extra);
    }
    if !request.sign_data.is_empty() {
        println!("Sign data:  {}", style_dim(&request.sign_data));
    }

    Ok(())
}
