//! Print the OpenAPI document of leadgate-server as JSON

use anyhow::Result;
use leadgate_server::docs::ApiDoc;
use std::io::{self, Write};
use utoipa::OpenApi;

fn main() -> Result<()> {
    let json = ApiDoc::openapi().to_pretty_json()?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(json.as_bytes())?;
    stdout.write_all(b"\n")?;
    Ok(())
}
