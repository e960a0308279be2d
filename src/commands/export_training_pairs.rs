use crate::context::AppContext;
use crate::feature_schema::feature_names;
use crate::models::EntityKey;
use anyhow::{anyhow, Context, Result};
use log::info;
use std::fs;
use std::path::Path;

/// Writes the scaled supervised pairs of one entity as a flat CSV: the target
/// date, the scaled target price, then every window cell as `f{step}_{feature}`.
pub async fn run(app: &AppContext, commodity: &str, region: &str, output_path: &Path) -> Result<()> {
    let key = EntityKey::new(commodity.trim(), region.trim());
    let service = app.service();
    let series = service
        .store()
        .series(&key)
        .with_context(|| format!("No price history for {key}"))?;
    let pairs = service
        .supervised_pairs(&key)
        .with_context(|| format!("Failed to build training pairs for {key}"))?;
    if pairs.is_empty() {
        return Err(anyhow!(
            "{} has {} row(s); at least {} are needed for one training pair",
            key,
            series.len(),
            service.settings().sequence_length + 1
        ));
    }

    if let Some(parent) = output_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let sequence_length = service.settings().sequence_length;
    let names = feature_names();
    let mut header = vec!["target_date".to_string(), "target".to_string()];
    for step in 0..sequence_length {
        header.extend(names.iter().map(|name| format!("f{step}_{name}")));
    }

    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    writer.write_record(&header)?;
    for (idx, pair) in pairs.iter().enumerate() {
        let target_row = series
            .rows
            .get(sequence_length + idx)
            .ok_or_else(|| anyhow!("Training pair {idx} has no matching row in {key}"))?;
        let mut record = Vec::with_capacity(header.len());
        record.push(target_row.date.to_string());
        record.push(pair.target.to_string());
        for row in pair.window.rows() {
            record.extend(row.values.iter().map(|value| value.to_string()));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!(
        "Wrote {} training pair(s) for {} to {}",
        pairs.len(),
        key,
        output_path.display()
    );
    Ok(())
}
