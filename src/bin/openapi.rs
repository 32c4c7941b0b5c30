use anyhow::Result;

// Print the OpenAPI document for the auth routes.
fn main() -> Result<()> {
    let spec = sessa::api::openapi();
    println!("{}", serde_json::to_string_pretty(&spec)?);
    Ok(())
}
