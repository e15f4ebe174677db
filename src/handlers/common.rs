use crate::config::AppConfig;
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

/// Pagination parameters for list operations
#[derive(Debug, Default, Deserialize, Serialize, IntoParams)]
pub struct PaginationParams {
    /// 1-based page number
    pub page: Option<u64>,
    /// Items per page, capped at the configured maximum
    pub per_page: Option<u64>,
}

impl PaginationParams {
    /// Resolves defaults and bounds from the configuration.
    pub fn resolve(&self, config: &AppConfig) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self
            .per_page
            .unwrap_or(config.default_page_size)
            .clamp(1, config.max_page_size.max(1));
        (page, per_page)
    }
}

pub fn total_pages(total: u64, per_page: u64) -> u64 {
    if total == 0 || per_page == 0 {
        0
    } else {
        (total + per_page - 1) / per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".to_string(),
            "k3y-for-unit-tests-only-0123456789abcdef".to_string(),
            "test".to_string(),
        )
    }

    #[test]
    fn defaults_and_bounds_come_from_config() {
        let cfg = config();
        assert_eq!(
            PaginationParams::default().resolve(&cfg),
            (1, cfg.default_page_size)
        );

        let params = PaginationParams {
            page: Some(0),
            per_page: Some(10_000),
        };
        assert_eq!(params.resolve(&cfg), (1, cfg.max_page_size));
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 20), 0);
        assert_eq!(total_pages(20, 20), 1);
        assert_eq!(total_pages(21, 20), 2);
    }
}
