use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Search criteria for one platform run. Built once from external
/// configuration before the run starts; the engine never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Keywords searched in order; crossed with `city_codes` during
    /// collection.
    pub keywords: Vec<String>,
    pub city_codes: Vec<String>,
    /// Inclusive monthly salary bounds in thousands, if configured.
    pub salary_min_k: Option<u32>,
    pub salary_max_k: Option<u32>,
    pub experience: Option<String>,
    pub degree: Option<String>,
    pub company_scale: Option<String>,
    pub funding_stage: Option<String>,
    /// Message sent when initiating contact.
    pub greeting: String,
    /// Target role description used by the semantic matcher.
    pub role_description: String,
    pub ai_matching: bool,
    /// Keywords that must appear in the title or tags, and ones that must
    /// not.
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
    pub company_blacklist: Vec<String>,
    pub recruiter_blacklist: Vec<String>,
    /// Recruiter last-active phrases that disqualify a posting.
    pub inactive_vocabulary: Vec<String>,
    pub delivery_ceiling: usize,
    pub pacing: PacingConfig,
    pub retry: RetryConfig,
    /// Hard stop for pagination per keyword/city pair, guarding against
    /// broken "next page" affordances.
    pub max_pages: usize,
    pub auth_timeout: Duration,
    pub auth_poll_interval: Duration,
}

impl SearchCriteria {
    pub fn new(keyword: impl Into<String>, city_code: impl Into<String>) -> Self {
        Self {
            keywords: vec![keyword.into()],
            city_codes: vec![city_code.into()],
            salary_min_k: None,
            salary_max_k: None,
            experience: None,
            degree: None,
            company_scale: None,
            funding_stage: None,
            greeting: "Hello, I'd like to discuss this role.".to_string(),
            role_description: String::new(),
            ai_matching: false,
            include_keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            company_blacklist: Vec::new(),
            recruiter_blacklist: Vec::new(),
            inactive_vocabulary: default_inactive_vocabulary(),
            delivery_ceiling: 20,
            pacing: PacingConfig::default(),
            retry: RetryConfig::default(),
            max_pages: 10,
            auth_timeout: Duration::from_secs(120),
            auth_poll_interval: Duration::from_secs(1),
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into());
        self
    }

    pub fn with_city(mut self, city_code: impl Into<String>) -> Self {
        self.city_codes.push(city_code.into());
        self
    }

    pub fn with_salary_range(mut self, min_k: u32, max_k: u32) -> Self {
        self.salary_min_k = Some(min_k);
        self.salary_max_k = Some(max_k);
        self
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    pub fn with_ai_matching(mut self, role_description: impl Into<String>) -> Self {
        self.ai_matching = true;
        self.role_description = role_description.into();
        self
    }

    pub fn with_delivery_ceiling(mut self, ceiling: usize) -> Self {
        self.delivery_ceiling = ceiling;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingConfig) -> Self {
        self.pacing = pacing;
        self
    }
}

/// Delay bounds between outreach actions. A random point in [min, max] is
/// slept before each attempt so the traffic doesn't look machine-paced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PacingConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl PacingConfig {
    /// Zero-delay pacing for tests.
    pub fn immediate() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Retry policy for transient failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per item before it is recorded as failed.
    pub max_item_attempts: usize,
    /// Rate-limit backoffs before the delivery phase aborts.
    pub max_rate_limit_retries: usize,
    /// First backoff interval; doubles per consecutive rate limit.
    pub backoff_base: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_item_attempts: 2,
            max_rate_limit_retries: 3,
            backoff_base: Duration::from_secs(30),
        }
    }
}

fn default_inactive_vocabulary() -> Vec<String> {
    [
        "active 3 months ago",
        "active 6 months ago",
        "active within a year",
        "3月内活跃",
        "半年前活跃",
        "近半年活跃",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
