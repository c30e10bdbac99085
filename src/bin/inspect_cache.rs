use anyhow::{Context, Result};
use arrow::ipc::reader::FileReaderBuilder;
use std::fs::File;
use std::path::Path;

use glucose_timeline::cache::{read_glucose, DatasetCache};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 && args.len() != 3 {
        println!("Usage: {} <glucose.arrow> | <cache_dir> <user>", args[0]);
        std::process::exit(1);
    }

    let path = if args.len() == 3 {
        DatasetCache::new(&args[1]).glucose_path(&args[2])
    } else {
        Path::new(&args[1]).to_path_buf()
    };

    let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
    let reader = FileReaderBuilder::new().build(file)?;

    println!("\nSchema:");
    println!("{:#?}", reader.schema());

    let samples = read_glucose(&path)?;
    let missing = samples.iter().filter(|s| s.glucose.is_nan()).count();
    println!("\nRows: {} ({} NaN)", samples.len(), missing);
    if let (Some(first), Some(last)) = (samples.first(), samples.last()) {
        println!(
            "Range: {} to {}",
            first.timestamp.format("%Y-%m-%d %H:%M"),
            last.timestamp.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}
