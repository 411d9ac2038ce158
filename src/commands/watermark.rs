use anyhow::{Context, Result};
use tracing::info;

use crate::cli::WatermarkArgs;
use crate::store::WatermarkStore;
use crate::util::parse_instant;

pub fn run(args: WatermarkArgs) -> Result<()> {
    let store = WatermarkStore::new(args.data_root.join("watermark"));

    match args.set {
        Some(value) => {
            let value = value.trim().to_string();
            parse_instant(&value).context("refusing to store an unparseable watermark")?;
            store.set(&value)?;
            info!(watermark = %value, "watermark updated");
        }
        None => match store.get()? {
            Some(value) => info!(watermark = %value, "stored watermark"),
            None => info!("no stored watermark"),
        },
    }

    Ok(())
}
