use crate::generator::profile::{build_track_dataset_from_config, GeneratorConfig};
use crate::gui_bridge::model::SummaryModel;
use crate::workflow::runner::Runner;
use anyhow::Result;
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock},
    thread,
};
use tokio::runtime::Builder;
use trackcore::model::Dataset;
use warp::{http::StatusCode, Filter};

fn bridge_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9400))
}

#[derive(Debug)]
struct WarpError;

impl warp::reject::Reject for WarpError {}

/// Hosts the HTTP endpoint serving run snapshots and accepting datasets
/// to push through the workflow.
pub struct GuiBridge {
    state: Arc<RwLock<SummaryModel>>,
}

impl GuiBridge {
    pub fn new(runner: Arc<Runner>) -> Self {
        let state = Arc::new(RwLock::new(SummaryModel::default()));
        let state_for_filter = state.clone();
        let state_filter = warp::any().map(move || state_for_filter.clone());
        let runner_filter = warp::any().map(move || runner.clone());

        let get_route = warp::path("summary")
            .and(warp::get())
            .and(state_filter.clone())
            .map(|state: Arc<RwLock<SummaryModel>>| warp::reply::json(&*state.read().unwrap()));

        let ingest_route = warp::path("ingest")
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter.clone())
            .and(runner_filter.clone())
            .and_then(
                |dataset: Dataset, state: Arc<RwLock<SummaryModel>>, runner: Arc<Runner>| async move {
                    match dataset
                        .validate()
                        .map_err(anyhow::Error::from)
                        .and_then(|_| runner.execute(&dataset))
                    {
                        Ok(result) => {
                            let mut guard = state.write().unwrap();
                            *guard = SummaryModel::from_result(&result);
                            Ok::<_, warp::Rejection>(warp::reply::with_status(
                                warp::reply::json(&json!({
                                    "status": "ok",
                                    "rowsCorrected": result.rows_corrected
                                })),
                                StatusCode::OK,
                            ))
                        }
                        Err(err) => {
                            eprintln!("ingest error: {}", err);
                            Err(warp::reject::custom(WarpError))
                        }
                    }
                },
            );

        let generator_route = warp::path("generate")
            .and(warp::post())
            .and(warp::body::json())
            .and(state_filter)
            .and(runner_filter)
            .and_then(
                |config: GeneratorConfig,
                 state: Arc<RwLock<SummaryModel>>,
                 runner: Arc<Runner>| async move {
                    match build_track_dataset_from_config(&config)
                        .and_then(|dataset| runner.execute(&dataset))
                    {
                        Ok(result) => {
                            let mut guard = state.write().unwrap();
                            *guard = SummaryModel::from_result(&result);
                            if let Some(name) = config.scenario.as_ref() {
                                println!(
                                    "[GUI] Scenario {} -> {} corrected rows",
                                    name, result.rows_corrected
                                );
                            }
                            Ok::<_, warp::Rejection>(warp::reply::with_status(
                                warp::reply::json(&json!({
                                    "status": "ok",
                                    "rowsIn": result.rows_in,
                                    "rowsCorrected": result.rows_corrected
                                })),
                                StatusCode::OK,
                            ))
                        }
                        Err(err) => {
                            eprintln!("generate error: {}", err);
                            Err(warp::reject::custom(WarpError))
                        }
                    }
                },
            );

        thread::spawn(move || {
            let routes = get_route.or(ingest_route).or(generator_route);
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build runtime");
            runtime.block_on(async move {
                warp::serve(routes).run(bridge_bind_address()).await;
            });
        });

        Self { state }
    }

    pub fn publish(&self, model: &SummaryModel) -> Result<()> {
        let mut guard = self.state.write().unwrap();
        *guard = model.clone();
        println!(
            "[GUI] rows in: {}, corrected: {}, planarity windows: {}",
            guard.rows_in,
            guard.rows_corrected,
            guard.planarity.len()
        );
        Ok(())
    }

    pub fn publish_status(&self, message: &str) {
        println!("[GUI] {}", message);
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> SummaryModel {
        self.state.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::build_track_dataset;
    use crate::workflow::config::WorkflowConfig;
    use crate::workflow::runner::Runner;
    use std::sync::Arc;

    #[test]
    fn gui_bridge_updates_state() {
        let cfg = WorkflowConfig::from_args(128, 2);
        let runner = Arc::new(Runner::new(cfg.clone()));
        let gui = GuiBridge::new(runner.clone());
        let dataset = build_track_dataset(cfg.rows, cfg.seed).unwrap();
        let result = runner.execute(&dataset).unwrap();
        gui.publish(&SummaryModel::from_result(&result)).unwrap();
        assert_eq!(gui.snapshot().rows_corrected, result.rows_corrected);
    }
}
