use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, warn};

use glucose_timeline::cache::DatasetCache;
use glucose_timeline::config::{Args, PipelineConfig, UserConfig};
use glucose_timeline::output;
use glucose_timeline::stats::{
    compare_sleep_awake, compare_weekday_weekend, meal_windows, Comparison, GlucoseRange,
};
use glucose_timeline::{EventType, UserDataset};

fn print_summary(dataset: &UserDataset) {
    let (Some(first), Some(last)) = (dataset.glucose.first(), dataset.glucose.last()) else {
        println!("\n{}: no glucose samples", dataset.user);
        return;
    };
    let missing = dataset.glucose.iter().filter(|s| s.glucose.is_nan()).count();

    println!("\n{}", dataset.user);
    println!(
        "  {} to {}",
        first.timestamp.format("%Y-%m-%d %H:%M"),
        last.timestamp.format("%Y-%m-%d %H:%M")
    );
    println!(
        "  Samples: {} ({} original, {} missing)",
        dataset.glucose.len(),
        dataset.original_points().count(),
        missing
    );
    for event_type in [EventType::Sleep, EventType::Meal, EventType::Activity] {
        println!(
            "  {} records: {}",
            event_type,
            dataset.records_of(event_type).count()
        );
    }
}

fn print_comparison(comparison: &Comparison) {
    println!(
        "\n  {} vs {} (time in range, %)",
        comparison.first.name, comparison.second.name
    );
    println!(
        "    {:<15} {:>9} {:>9}",
        "", comparison.first.name, comparison.second.name
    );
    for range in GlucoseRange::ALL {
        println!(
            "    {:<15} {:>9.1} {:>9.1}",
            range.label(),
            comparison.first.ranges.percent(range),
            comparison.second.ranges.percent(range)
        );
    }
}

fn process_user(cache: &DatasetCache, user: &UserConfig, args: &Args) -> Result<()> {
    let dataset = cache
        .get_dataset(user)
        .with_context(|| format!("Failed to build dataset for {}", user.name))?;

    print_summary(&dataset);

    let comparisons = [
        compare_sleep_awake(&dataset),
        compare_weekday_weekend(&dataset, &args.exclude_days),
    ];
    for comparison in &comparisons {
        print_comparison(comparison);
    }

    if let Some(prefix) = &args.csv_output {
        output::write_glucose_csv(prefix, &dataset)?;
        output::write_comparison_csv(prefix, &dataset.user, &comparisons)?;
        output::write_meal_windows_csv(prefix, &dataset.user, &meal_windows(&dataset))?;
    }

    Ok(())
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();
    let mut config = PipelineConfig::load(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;

    if let Some(dir) = &args.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(window) = args.post_prandial_window {
        warn!("Cached datasets keep the post-prandial window they were built with");
        for user in &mut config.users {
            user.post_prandial_window_minutes = window;
        }
        config.validate().context("Invalid --post-prandial-window")?;
    }

    let users: Vec<&UserConfig> = match &args.user {
        Some(name) => vec![config.user(name)?],
        None => config.users.iter().collect(),
    };

    let cache = DatasetCache::new(&config.cache_dir);
    let mut failed = Vec::new();

    // Users are independent; one user's failure does not stop the others.
    for user in users {
        if let Err(e) = process_user(&cache, user, &args) {
            error!("{:#}", e);
            failed.push(user.name.as_str());
        }
    }

    if !failed.is_empty() {
        bail!("Processing failed for: {}", failed.join(", "));
    }
    Ok(())
}
