use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct ServiceStatus {
    inner: Arc<Mutex<ServiceStatusData>>,
}

#[derive(Default)]
struct ServiceStatusData {
    phase: String,
    forecasts_served: usize,
    simulated_forecasts: usize,
    failed_forecasts: usize,
    last_error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusSnapshot {
    pub phase: String,
    pub forecasts_served: usize,
    pub simulated_forecasts: usize,
    pub failed_forecasts: usize,
    pub last_error: Option<String>,
}

impl ServiceStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ServiceStatusData {
                phase: "Initializing".to_string(),
                ..Default::default()
            })),
        }
    }

    pub fn set_phase<S: Into<String>>(&self, phase: S) {
        if let Ok(mut data) = self.inner.lock() {
            data.phase = phase.into();
        }
    }

    pub fn record_forecast(&self, simulated: bool) {
        if let Ok(mut data) = self.inner.lock() {
            data.forecasts_served += 1;
            if simulated {
                data.simulated_forecasts += 1;
            }
        }
    }

    pub fn record_failure<S: Into<String>>(&self, message: S) {
        if let Ok(mut data) = self.inner.lock() {
            data.failed_forecasts += 1;
            data.last_error = Some(message.into());
        }
    }

    pub fn snapshot(&self) -> ServiceStatusSnapshot {
        if let Ok(data) = self.inner.lock() {
            ServiceStatusSnapshot {
                phase: data.phase.clone(),
                forecasts_served: data.forecasts_served,
                simulated_forecasts: data.simulated_forecasts,
                failed_forecasts: data.failed_forecasts,
                last_error: data.last_error.clone(),
            }
        } else {
            ServiceStatusSnapshot {
                phase: "Status unavailable".to_string(),
                forecasts_served: 0,
                simulated_forecasts: 0,
                failed_forecasts: 0,
                last_error: None,
            }
        }
    }
}
