/*
 * backend.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Simulated geometry backend with configurable latency.
 */

use std::time::Duration;

use async_trait::async_trait;
use recompute_core::{
    BackendError, ParamValue, Parameters, Presentable, RecomputeBackend, RecomputeRequest,
};

/// Preview mesh for one distance.
#[derive(Debug, Clone)]
pub struct Preview {
    pub distance: f64,
}

/// Committed solid, swapped into view on `show()`.
#[derive(Debug)]
pub struct Solid {
    pub distance: f64,
    visible: bool,
}

impl Presentable for Solid {
    fn show(&mut self) {
        self.visible = true;
        tracing::info!(distance = self.distance, visible = self.visible, "Solid shown");
    }

    fn cancel(&mut self) {
        self.visible = false;
        tracing::info!(distance = self.distance, visible = self.visible, "Solid withdrawn");
    }
}

/// Backend that sleeps for a fixed latency and rejects large distances.
pub struct SimulatedBackend {
    latency: Duration,
    max_distance: f64,
}

impl SimulatedBackend {
    pub fn new(latency: Duration, max_distance: f64) -> Self {
        Self {
            latency,
            max_distance,
        }
    }

    fn validate(&self, parameters: &Parameters) -> Result<f64, BackendError> {
        let distance = distance(parameters);
        if distance > self.max_distance {
            return Err(BackendError::validation(format!(
                "distance {} exceeds {}",
                distance, self.max_distance
            )));
        }
        Ok(distance)
    }
}

#[async_trait]
impl RecomputeBackend for SimulatedBackend {
    type Visual = Preview;
    type Output = Solid;

    fn name(&self) -> &str {
        "simulated"
    }

    fn check(&self, parameters: &Parameters) -> Result<(), BackendError> {
        if distance(parameters) == 0.0 {
            return Err(BackendError::NoOp("zero distance".to_string()));
        }
        Ok(())
    }

    async fn recompute(&self, request: RecomputeRequest) -> Result<Vec<Preview>, BackendError> {
        tokio::select! {
            _ = tokio::time::sleep(self.latency) => {}
            _ = request.cancellation.cancelled() => {
                tracing::debug!(call = request.call, "Preview abandoned");
                return Err(BackendError::failed("cancelled"));
            }
        }
        let distance = self.validate(&request.parameters)?;
        Ok(vec![Preview { distance }])
    }

    async fn commit(&self, parameters: Parameters) -> Result<Vec<Solid>, BackendError> {
        tokio::time::sleep(self.latency * 2).await;
        let distance = self.validate(&parameters)?;
        Ok(vec![Solid {
            distance,
            visible: false,
        }])
    }

    fn restore_baseline(&self) {
        tracing::info!("Scene restored to baseline");
    }
}

fn distance(parameters: &Parameters) -> f64 {
    parameters
        .get("distance")
        .and_then(ParamValue::as_f64)
        .unwrap_or_default()
}
