use crate::context::AppContext;
use crate::history::quality_report;
use anyhow::Result;
use log::info;

pub async fn run(app: &AppContext) -> Result<()> {
    let service = app.service();
    let report = quality_report(service.store());
    info!(
        "Dataset covers {} day(s) across {} entities; {} gap(s) reported",
        report.coverage_days,
        report.entity_count,
        report.gaps.len()
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
