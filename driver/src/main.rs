use anyhow::Context;
use clap::Parser;
use generator::profile::build_track_dataset;
use gui_bridge::bridge::GuiBridge;
use gui_bridge::model::SummaryModel;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod worker;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Track-geometry transformation workflow driver")]
struct Args {
    /// Run a single synthetic measurement wave and emit a baseline summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, default_value_t = 1024)]
    rows: usize,
    #[arg(long, default_value_t = 4)]
    window_rows: usize,
    /// Keep the HTTP bridge alive for incoming datasets
    #[arg(long, default_value_t = false)]
    serve: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.rows, args.window_rows)
    };

    let runner = Runner::new(workflow_config.clone());
    let gui_bridge = GuiBridge::new(Arc::new(runner.clone()));
    let dataset = build_track_dataset(workflow_config.rows, workflow_config.seed)?;

    if args.offline {
        let result = runner.execute(&dataset)?;

        println!(
            "Offline run -> {} rows in, {} corrected, planarity windows {}, straightness windows {}",
            result.rows_in,
            result.rows_corrected,
            result.planarity.len(),
            result.straightness.len()
        );

        let model = SummaryModel::from_result(&result);
        gui_bridge.publish(&model)?;
        gui_bridge.publish_status("Offline workflow results ready.");

        let report = format!(
            "rows_in={} rows_corrected={} planarity={} straightness={} notes={:?}\n",
            result.rows_in,
            result.rows_corrected,
            result.planarity.len(),
            result.straightness.len(),
            result.stage_notes
        );
        let report_path = PathBuf::from("tools/data/offline_summary.log");
        if let Some(parent) = report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(report_path)?;
        file.write_all(report.as_bytes())?;
    }
    if args.serve {
        gui_bridge.publish_status("HTTP bridge running (Ctrl+C to stop)...");
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for signal handling")?;
        runtime.block_on(async {
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    Ok(())
}
