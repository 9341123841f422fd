/// opencv
/// https://docs.rs/opencv/latest/opencv/all.html
///
/// nalgebra
/// https://docs.rs/nalgebra/latest/nalgebra/
///
extern crate opencv;

mod annotation;
mod annotator;
mod config;
mod dataset;
mod global_cast;
mod pose_estimator;
mod shape;

use annotator::Annotator;
use pose_estimator::PnpBatch;

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_nanos()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mode = args.get(1).map(String::as_str).unwrap_or("solve");
    let imgdir = args.get(2).map(String::as_str).unwrap_or("images/");
    let shapedir = args.get(3).map(String::as_str).unwrap_or("shapes/");
    log::info!("mode: {}, images: {:?}, shapes: {:?}", mode, imgdir, shapedir);

    match mode {
        "annotate" => {
            let mut annotator = Annotator::new(imgdir)?;
            annotator.run()?;
        }
        "solve" => {
            let batch = PnpBatch::new(imgdir, shapedir)?;
            let outcomes = batch.run();
            PnpBatch::print_summary(&outcomes);
        }
        _ => anyhow::bail!("unknown mode {:?}, expected annotate or solve", mode),
    }
    Ok(())
}
