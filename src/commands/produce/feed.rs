use std::fs::File;
use std::io::Read;
use std::time::Duration;

use anyhow::{Context, Result};

/// Opens the source feed as a byte stream. http(s) sources stream the
/// response body; anything else is treated as a local file path.
pub(crate) fn open_source(source: &str) -> Result<Box<dyn Read>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            // feed bodies are multi-gigabyte streams, no overall deadline
            .timeout(None)
            .build()
            .context("failed to build http client")?;

        let response = client
            .get(source)
            .send()
            .with_context(|| format!("failed to fetch source feed: {source}"))?
            .error_for_status()
            .with_context(|| format!("source feed returned an error status: {source}"))?;

        return Ok(Box::new(response));
    }

    let file =
        File::open(source).with_context(|| format!("failed to open source feed: {source}"))?;
    Ok(Box::new(file))
}
