use std::sync::Arc;

use crate::{
    sampler::{ProcfsSampler, Sampler},
    settings::manager::Settings,
};

/// Everything a request needs, built once before the server starts and
/// shared read-only by every worker.
#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub sampler: Arc<dyn Sampler>,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        let sampler = ProcfsSampler::new(settings.sample_interval(), settings.counter_mode);
        Self::with_sampler(settings, Arc::new(sampler))
    }

    pub fn with_sampler(settings: Settings, sampler: Arc<dyn Sampler>) -> Self {
        Self {
            settings: Arc::new(settings),
            sampler,
        }
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
