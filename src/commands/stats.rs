use crate::context::AppContext;
use crate::history::entity_statistics;
use crate::models::EntityKey;
use anyhow::{anyhow, Context, Result};

pub async fn run(app: &AppContext, commodity: &str, region: &str) -> Result<()> {
    let key = EntityKey::new(commodity.trim(), region.trim());
    let series = app
        .service()
        .store()
        .series(&key)
        .with_context(|| format!("No price history for {key}"))?;
    let statistics =
        entity_statistics(&series).ok_or_else(|| anyhow!("Price history for {key} is empty"))?;

    println!("{}", serde_json::to_string_pretty(&statistics)?);
    Ok(())
}
