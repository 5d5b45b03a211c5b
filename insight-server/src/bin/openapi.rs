//! Print the OpenAPI document as JSON

use anyhow::Result;
use insight_server::docs::ApiDoc;
use utoipa::OpenApi;

fn main() -> Result<()> {
    println!("{}", ApiDoc::openapi().to_pretty_json()?);
    Ok(())
}
