use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use nutriscan_client::PeriodRange;
use nutriscan_client::config::Config;
use nutriscan_engine::NutritionTracker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_env = nutriscan_engine::logging::init();
    tracing::info!("nutriscan: log filter: {}", log_env);

    let date = match std::env::args().nth(1) {
        Some(raw) => nutriscan_client::utils::parse_log_date(&raw)
            .with_context(|| format!("invalid date argument: {raw}"))?,
        None => chrono::Local::now().date_naive(),
    };

    let cfg = Config::from_env().context("reading NUTRISCAN_* configuration")?;
    tracing::info!(base_url = %cfg.base_url, "nutriscan: using log store");
    let tracker = NutritionTracker::from_config(&cfg);

    let session = tracker.bootstrap(cfg.token.clone()).await;
    if !session.is_authenticated() {
        anyhow::bail!("not signed in: set NUTRISCAN_TOKEN to a valid bearer token");
    }

    let report = build_report(&tracker, date).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn build_report(
    tracker: &NutritionTracker,
    date: NaiveDate,
) -> anyhow::Result<serde_json::Value> {
    let profile = tracker.editable_profile()?;
    let daily = tracker.daily_summary(date).await?;
    let progress = tracker.daily_progress(date, None).await?;
    let foods = tracker.food_breakdown(date).await?;
    let weekly = tracker
        .period_summary(PeriodRange::WeekEnding { date }, None)
        .await?;
    let monthly = tracker
        .period_summary(
            PeriodRange::Month {
                year: date.year(),
                month: date.month(),
            },
            None,
        )
        .await?;

    Ok(serde_json::json!({
        "date": date,
        "profile": profile.profile,
        "recommendations": profile.recommendations,
        "daily": daily,
        "progress": progress,
        "foods": foods,
        "weekly": weekly,
        "monthly": monthly,
    }))
}
