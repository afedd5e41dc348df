//! Print the OpenAPI document of the HTTP surface as pretty JSON.

use anyhow::Context;
use fibbing_it_back::services::documentation::ApiDoc;
use utoipa::OpenApi;

fn main() -> anyhow::Result<()> {
    let doc = ApiDoc::openapi()
        .to_pretty_json()
        .context("serializing the OpenAPI document")?;
    println!("{doc}");
    Ok(())
}
