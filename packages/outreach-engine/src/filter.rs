use std::sync::Arc;

use crate::config::SearchCriteria;
use crate::matcher::SemanticMatcher;
use crate::store::Blacklist;
use crate::types::{Posting, RejectionReason};

/// Ordered, short-circuiting predicates over a posting. Cheap deterministic
/// checks run first; the semantic matcher runs last and only when enabled.
/// The first rejecting predicate wins and its reason is recorded.
pub struct FilterPipeline {
    criteria: Arc<SearchCriteria>,
    blacklist: Blacklist,
    matcher: Option<Arc<dyn SemanticMatcher>>,
}

impl FilterPipeline {
    pub fn new(
        criteria: Arc<SearchCriteria>,
        blacklist: Blacklist,
        matcher: Option<Arc<dyn SemanticMatcher>>,
    ) -> Self {
        Self {
            criteria,
            blacklist,
            matcher,
        }
    }

    /// Evaluate one posting. `None` means it survives.
    pub async fn evaluate(&self, posting: &Posting) -> Option<RejectionReason> {
        if let Some(reason) = self.check_recruiter_activity(posting) {
            return Some(reason);
        }
        if let Some(reason) = self.check_blacklist(posting) {
            return Some(reason);
        }
        if let Some(reason) = self.check_keywords(posting) {
            return Some(reason);
        }
        if let Some(reason) = self.check_salary(posting) {
            return Some(reason);
        }
        self.check_semantic(posting).await
    }

    fn check_recruiter_activity(&self, posting: &Posting) -> Option<RejectionReason> {
        let last_active = posting.recruiter_last_active.trim();
        if last_active.is_empty() {
            return None;
        }
        let stale = self
            .criteria
            .inactive_vocabulary
            .iter()
            .any(|phrase| last_active.contains(phrase.as_str()));
        stale.then(|| RejectionReason::RecruiterInactive {
            last_active: last_active.to_string(),
        })
    }

    fn check_blacklist(&self, posting: &Posting) -> Option<RejectionReason> {
        let company_hit = self
            .criteria
            .company_blacklist
            .iter()
            .chain(self.blacklist.companies.iter())
            .find(|name| contains_ignore_case(&posting.company, name));
        if let Some(name) = company_hit {
            return Some(RejectionReason::Blacklisted { name: name.clone() });
        }

        let recruiter_hit = self
            .criteria
            .recruiter_blacklist
            .iter()
            .chain(self.blacklist.recruiters.iter())
            .find(|name| contains_ignore_case(&posting.recruiter_name, name));
        recruiter_hit.map(|name| RejectionReason::Blacklisted { name: name.clone() })
    }

    fn check_keywords(&self, posting: &Posting) -> Option<RejectionReason> {
        let haystack = format!(
            "{} {}",
            posting.title.to_lowercase(),
            posting.source_tags.join(" ").to_lowercase()
        );

        for excluded in &self.criteria.exclude_keywords {
            if haystack.contains(&excluded.to_lowercase()) {
                return Some(RejectionReason::KeywordMismatch {
                    detail: format!("excluded keyword present: {excluded}"),
                });
            }
        }

        if !self.criteria.include_keywords.is_empty() {
            let any_present = self
                .criteria
                .include_keywords
                .iter()
                .any(|k| haystack.contains(&k.to_lowercase()));
            if !any_present {
                return Some(RejectionReason::KeywordMismatch {
                    detail: "no required keyword present".to_string(),
                });
            }
        }

        None
    }

    fn check_salary(&self, posting: &Posting) -> Option<RejectionReason> {
        let (min_wanted, max_wanted) = match (self.criteria.salary_min_k, self.criteria.salary_max_k)
        {
            (None, None) => return None,
            bounds => bounds,
        };

        // Unparseable salary text passes through; only a clear miss rejects.
        let (offer_min, offer_max) = parse_salary_range_k(&posting.salary_text)?;

        if let Some(min_wanted) = min_wanted {
            if offer_max < min_wanted {
                return Some(RejectionReason::SalaryOutOfRange {
                    salary_text: posting.salary_text.clone(),
                });
            }
        }
        if let Some(max_wanted) = max_wanted {
            if offer_min > max_wanted {
                return Some(RejectionReason::SalaryOutOfRange {
                    salary_text: posting.salary_text.clone(),
                });
            }
        }
        None
    }

    async fn check_semantic(&self, posting: &Posting) -> Option<RejectionReason> {
        if !self.criteria.ai_matching {
            return None;
        }
        let matcher = self.matcher.as_ref()?;

        match matcher.matches(posting, &self.criteria.role_description).await {
            Ok(true) => None,
            Ok(false) => Some(RejectionReason::SemanticMismatch {
                detail: "matcher verdict: no".to_string(),
            }),
            Err(e) => {
                // Matcher infrastructure failure keeps the posting in the run.
                tracing::warn!(
                    scoped_id = %posting.scoped_id,
                    error = %e,
                    "semantic matcher unavailable, posting passes"
                );
                None
            }
        }
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    !needle.is_empty() && haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Parse salary text like "25-40K" or "15K" into inclusive bounds in
/// thousands. Returns `None` when no figure is recognizable.
fn parse_salary_range_k(text: &str) -> Option<(u32, u32)> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if !current.is_empty() {
            if let Ok(n) = current.parse::<u32>() {
                numbers.push(n);
            }
            current.clear();
        }
    }
    if !current.is_empty() {
        if let Ok(n) = current.parse::<u32>() {
            numbers.push(n);
        }
    }

    match numbers.as_slice() {
        [] => None,
        [single, rest @ ..] => {
            // Trailing figures like "13薪" (months of pay) are ignored.
            let max = rest.first().copied().unwrap_or(*single);
            Some((*single, max.max(*single)))
        }
    }
}
