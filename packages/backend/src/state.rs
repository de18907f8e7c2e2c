use std::sync::Arc;
use std::time::Instant;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::middleware::rate_limit::RateLimiter;
use crate::services::llm_provider::LLMProvider;
use crate::services::tutor::{AnswerCache, TutorDeps};

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    pool: SqlitePool,
    config: Arc<Config>,
    llm: Arc<LLMProvider>,
    answer_cache: Arc<AnswerCache>,
    rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config, llm: LLMProvider) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Self {
            started_at: Instant::now(),
            pool,
            config: Arc::new(config),
            llm: Arc::new(llm),
            answer_cache: Arc::new(AnswerCache::new()),
            rate_limiter,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn llm(&self) -> &LLMProvider {
        &self.llm
    }

    pub fn answer_cache(&self) -> &AnswerCache {
        &self.answer_cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn tutor_deps(&self) -> TutorDeps<'_> {
        TutorDeps {
            pool: &self.pool,
            llm: &self.llm,
            cache: &self.answer_cache,
            limits: &self.config.plan_limits,
        }
    }
}
