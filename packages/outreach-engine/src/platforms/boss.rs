use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::adapter::PlatformAdapter;
use crate::config::SearchCriteria;
use crate::error::{EngineError, EngineResult};
use crate::session::{require_element, InterceptedResponse, SessionCapability};
use crate::types::{OutreachOutcome, Platform, Posting};

const ELEMENT_WAIT: Duration = Duration::from_secs(10);

const LOGIN_MARKER: &str = ".user-nav .nav-figure";
const JOB_CARD: &str = ".job-card-wrapper";
const NEXT_PAGE: &str = ".options-pages a.ui-icon-arrow-right";
const CHAT_BUTTON: &str = ".btn-startchat";
const CHAT_INPUT: &str = ".chat-input";
const CHAT_SEND: &str = ".send-message";
const LIMIT_DIALOG: &str = ".dialog-wrap .dialog-container";

/// Chat-first platform. Its result list is rendered from an internal
/// `joblist.json` API, so interception is the primary discovery path and
/// DOM extraction the fallback; outreach opens a chat and sends the
/// greeting.
pub struct BossAdapter;

impl BossAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BossAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// Raw payload of the platform's internal search API. Unknown fields are
// ignored; missing optional fields default to empty.
#[derive(Debug, Deserialize)]
struct JobListPayload {
    #[serde(rename = "zpData")]
    zp_data: JobListData,
}

#[derive(Debug, Deserialize)]
struct JobListData {
    #[serde(rename = "jobList", default)]
    job_list: Vec<RawJob>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    #[serde(rename = "encryptJobId")]
    encrypt_job_id: String,
    #[serde(rename = "jobName", default)]
    job_name: String,
    #[serde(rename = "brandName", default)]
    brand_name: String,
    #[serde(rename = "salaryDesc", default)]
    salary_desc: String,
    #[serde(rename = "cityName", default)]
    city_name: String,
    #[serde(rename = "bossName", default)]
    boss_name: String,
    #[serde(rename = "activeTimeDesc", default)]
    active_time_desc: String,
    #[serde(rename = "jobLabels", default)]
    job_labels: Vec<String>,
    #[serde(default)]
    skills: Vec<String>,
}

impl RawJob {
    fn into_posting(self) -> Posting {
        let detail_url =
            Url::parse(&format!("https://www.zhipin.com/job_detail/{}.html", self.encrypt_job_id))
                .ok();
        let mut posting = Posting::new(Platform::Boss, self.encrypt_job_id);
        posting.title = self.job_name;
        posting.company = self.brand_name;
        posting.salary_text = self.salary_desc;
        posting.location = self.city_name;
        posting.recruiter_name = self.boss_name;
        posting.recruiter_last_active = self.active_time_desc;
        posting.detail_url = detail_url;
        posting.source_tags = self
            .job_labels
            .into_iter()
            .chain(self.skills)
            .collect();
        posting
    }
}

#[async_trait]
impl PlatformAdapter for BossAdapter {
    fn platform(&self) -> Platform {
        Platform::Boss
    }

    fn home_url(&self) -> Url {
        Url::parse("https://www.zhipin.com/").expect("static url")
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
        let mut url = Url::parse("https://www.zhipin.com/web/geek/job").expect("static url");
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", keyword);
            pairs.append_pair("city", city_code);
            pairs.append_pair("page", &page.to_string());
            if let (Some(min), Some(max)) = (criteria.salary_min_k, criteria.salary_max_k) {
                pairs.append_pair("salary", &format!("{min}-{max}K"));
            }
            if let Some(experience) = &criteria.experience {
                pairs.append_pair("experience", experience);
            }
            if let Some(degree) = &criteria.degree {
                pairs.append_pair("degree", degree);
            }
            if let Some(scale) = &criteria.company_scale {
                pairs.append_pair("scale", scale);
            }
            if let Some(stage) = &criteria.funding_stage {
                pairs.append_pair("stage", stage);
            }
        }
        url
    }

    async fn extract_postings(
        &self,
        session: &dyn SessionCapability,
    ) -> EngineResult<Vec<Posting>> {
        let cards = session.find_all(JOB_CARD).await?;
        let mut postings = Vec::with_capacity(cards.len());

        for card in cards {
            let Some(scoped_id) = card.attr("data-jobid").await? else {
                tracing::debug!("job card without data-jobid, skipping");
                continue;
            };

            let mut posting = Posting::new(Platform::Boss, scoped_id);
            posting.title = child_text(&card, ".job-name").await?;
            posting.company = child_text(&card, ".company-name").await?;
            posting.salary_text = child_text(&card, ".salary").await?;
            posting.location = child_text(&card, ".job-area").await?;
            posting.recruiter_name = child_text(&card, ".info-public").await?;
            posting.recruiter_last_active = child_text(&card, ".job-active-time").await?;
            if let Some(link) = card.query(".job-card-left").await? {
                if let Some(href) = link.attr("href").await? {
                    posting.detail_url = Url::parse(&href)
                        .or_else(|_| self.home_url().join(&href))
                        .ok();
                }
            }
            let tags = child_text(&card, ".tag-list").await?;
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
            if class.contains("disabled") {
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

        let chat_button = require_element(session, CHAT_BUTTON, ELEMENT_WAIT).await?;
        if chat_button.text().await?.contains("继续沟通") {
            return Ok(OutreachOutcome::AlreadyContacted);
        }
        chat_button.click().await?;

        // The daily-limit dialog appears instead of the chat box once the
        // platform cuts us off.
        if let Some(dialog) = session.find(LIMIT_DIALOG).await? {
            let text = dialog.text().await?;
            if text.contains("今日沟通人数已达上限") || text.contains("上限") {
                return Ok(OutreachOutcome::RateLimited);
            }
        }

        let input = require_element(session, CHAT_INPUT, ELEMENT_WAIT).await?;
        input.fill(greeting).await?;
        let send = require_element(session, CHAT_SEND, ELEMENT_WAIT).await?;
        send.click().await?;

        Ok(OutreachOutcome::Sent)
    }

    fn response_pattern(&self) -> Option<&'static str> {
        Some("wapi/zpgeek/search/joblist.json")
    }

    fn decode_response(&self, response: &InterceptedResponse) -> EngineResult<Vec<Posting>> {
        let payload: JobListPayload =
            serde_json::from_str(&response.body).map_err(|source| EngineError::NetworkDecode {
                url: response.url.to_string(),
                source,
            })?;
        Ok(payload
            .zp_data
            .job_list
            .into_iter()
            .map(RawJob::into_posting)
            .collect())
    }
}

async fn child_text(
    card: &crate::session::ElementRef,
    selector: &str,
) -> EngineResult<String> {
    match card.query(selector).await? {
        Some(element) => element.text().await,
        None => Ok(String::new()),
    }
}
