use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::adapter::PlatformAdapter;
use crate::config::SearchCriteria;
use crate::error::EngineResult;
use crate::session::{require_element, SessionCapability};
use crate::types::{OutreachOutcome, Platform, Posting};

const ELEMENT_WAIT: Duration = Duration::from_secs(10);

const LOGIN_MARKER: &str = ".header-user .avatar";
const JOB_ITEM: &str = ".job-list .job-item";
const NEXT_PAGE: &str = ".pagination .btn-next";
const APPLY_BUTTON: &str = ".apply-btn";
const CONFIRM_APPLY: &str = ".apply-dialog .confirm-btn";
const GREETING_INPUT: &str = ".apply-dialog .leave-message";
const LIMIT_DIALOG: &str = ".limit-dialog";

/// Classic job board. Results are server-rendered cards, so DOM extraction
/// is the only discovery path; outreach is an apply-and-confirm flow with an
/// optional message box.
pub struct YupaoAdapter;

impl YupaoAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for YupaoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformAdapter for YupaoAdapter {
    fn platform(&self) -> Platform {
        Platform::Yupao
    }

    fn home_url(&self) -> Url {
        Url::parse("https://www.yupao.com/").expect("static url")
    }

    async fn is_authenticated(&self, session: &dyn SessionCapability) -> EngineResult<bool> {
        match session.find(LOGIN_MARKER).await? {
            Some(marker) => marker.is_visible().await,
            None => Ok(false),
        }
    }

    fn build_search_url(
        &self,
        criteria: &SearchCriteria,
        keyword: &str,
        city_code: &str,
        page: usize,
    ) -> Url {
        let mut url = Url::parse("https://www.yupao.com/recruit/list").expect("static url");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("keyword", keyword);
            pairs.append_pair("cityCode", city_code);
            pairs.append_pair("page", &page.to_string());
            if let Some(min) = criteria.salary_min_k {
                pairs.append_pair("salaryMin", &min.to_string());
            }
            if let Some(max) = criteria.salary_max_k {
                pairs.append_pair("salaryMax", &max.to_string());
            }
            if let Some(experience) = &criteria.experience {
                pairs.append_pair("workYear", experience);
            }
        }
        url
    }

    async fn extract_postings(
        &self,
        session: &dyn SessionCapability,
    ) -> EngineResult<Vec<Posting>> {
        let items = session.find_all(JOB_ITEM).await?;
        let mut postings = Vec::with_capacity(items.len());

        for item in items {
            let Some(scoped_id) = item.attr("data-id").await? else {
                tracing::debug!("job item without data-id, skipping");
                continue;
            };

            let mut posting = Posting::new(Platform::Yupao, scoped_id);
            posting.title = child_text(&item, ".job-title").await?;
            posting.company = child_text(&item, ".company-name").await?;
            posting.salary_text = child_text(&item, ".job-salary").await?;
            posting.location = child_text(&item, ".job-city").await?;
            posting.recruiter_name = child_text(&item, ".contact-name").await?;
            posting.recruiter_last_active = child_text(&item, ".active-state").await?;
            if let Some(href) = item.attr("data-href").await? {
                posting.detail_url = Url::parse(&href)
                    .or_else(|_| self.home_url().join(&href))
                    .ok();
            }
            let tags = child_text(&item, ".job-tags").await?;
            posting.source_tags = tags.split_whitespace().map(String::from).collect();

            postings.push(posting);
        }

        Ok(postings)
    }

    async fn advance_page(&self, session: &dyn SessionCapability) -> EngineResult<bool> {
        let Some(next) = session.find(NEXT_PAGE).await? else {
            return Ok(false);
        };
        if let Some(class) = next.attr("class").await? {
            if class.contains("is-disabled") {
                return Ok(false);
            }
        }
        next.click().await?;
        Ok(true)
    }

    async fn initiate_contact(
        &self,
        session: &dyn SessionCapability,
        posting: &Posting,
        greeting: &str,
    ) -> EngineResult<OutreachOutcome> {
        let Some(detail_url) = &posting.detail_url else {
            return Ok(OutreachOutcome::Failed {
                reason: "posting has no detail url".to_string(),
            });
        };
        session.navigate(detail_url).await?;

        let apply = require_element(session, APPLY_BUTTON, ELEMENT_WAIT).await?;
        if apply.text().await?.contains("已投递") {
            return Ok(OutreachOutcome::AlreadyContacted);
        }
        apply.click().await?;

        if let Some(dialog) = session.find(LIMIT_DIALOG).await? {
            if dialog.text().await?.contains("上限") {
                return Ok(OutreachOutcome::RateLimited);
            }
        }

        // The message box is optional on this platform.
        if let Some(input) = session.find(GREETING_INPUT).await? {
            input.fill(greeting).await?;
        }
        let confirm = require_element(session, CONFIRM_APPLY, ELEMENT_WAIT).await?;
        confirm.click().await?;

        Ok(OutreachOutcome::Sent)
    }
}

async fn child_text(
    item: &crate::session::ElementRef,
    selector: &str,
) -> EngineResult<String> {
    match item.query(selector).await? {
        Some(element) => element.text().await,
        None => Ok(String::new()),
    }
}
