use std::sync::Arc;

use crate::{config::AppConfig, db::Db, dvr::DvrClient, guide::GuideService};

/// Shared application state injected into every Axum handler.
#[derive(Debug, Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<AppConfig>,
    pub dvr: DvrClient,
    pub guide: GuideService,
}

impl AppState {
    pub fn new(db: Db, config: Arc<AppConfig>, dvr: DvrClient) -> anyhow::Result<Self> {
        let guide = GuideService::new(dvr.clone(), config.guide_config()?);
        Ok(Self {
            db,
            config,
            dvr,
            guide,
        })
    }
}
