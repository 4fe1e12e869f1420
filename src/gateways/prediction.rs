//! Prediction gateway: typed lookups against the astrology API.
//!
//! Each [`PredictionQuery`] variant maps to one endpoint. `lookup` never
//! fails: errors come back as a JSON error string that the generation step
//! can fold into its prompt.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::GatewayError;
use crate::onboarding::BirthDetails;

const SERVICE: &str = "prediction";

/// Payloads are logged up to this many characters.
const LOG_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlookPeriod {
    Today,
    Week,
    CurrentMonth,
    Quarter,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeArea {
    Love,
    Career,
    Wealth,
    Health,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoroscopePeriod {
    Daily,
    Weekly,
    Monthly,
}

/// The closed set of lookups the generation step can make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredictionQuery {
    Outlook(OutlookPeriod),
    Area {
        area: LifeArea,
        start_date: Option<String>,
        end_date: Option<String>,
    },
    Horoscope(HoroscopePeriod),
    FreeForm {
        query: String,
        specific_date: Option<String>,
    },
}

impl PredictionQuery {
    /// Endpoint path relative to the API base.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Outlook(p) => match p {
                OutlookPeriod::Today => "/predictions/today",
                OutlookPeriod::Week => "/predictions/week",
                OutlookPeriod::CurrentMonth => "/predictions/current-month",
                OutlookPeriod::Quarter => "/predictions/quarter",
                OutlookPeriod::Year => "/predictions/yearly",
            },
            Self::Area { area, .. } => match area {
                LifeArea::Love => "/predictions/love",
                LifeArea::Career => "/predictions/career",
                LifeArea::Wealth => "/predictions/wealth",
                LifeArea::Health => "/predictions/health",
            },
            Self::Horoscope(p) => match p {
                HoroscopePeriod::Daily => "/horoscope/daily",
                HoroscopePeriod::Weekly => "/horoscope/weekly",
                HoroscopePeriod::Monthly => "/horoscope/monthly",
            },
            Self::FreeForm { .. } => "/predictions/wildcard",
        }
    }

    /// Short label for logs and error strings.
    pub fn label(&self) -> &'static str {
        self.path().rsplit('/').next().unwrap_or("prediction")
    }

    /// Request body: the birth fields plus any optional filters.
    pub fn body(&self, birth: &BirthDetails) -> Value {
        let mut body = Map::new();
        body.insert("date_of_birth".into(), json!(birth.date_of_birth));
        body.insert("time_of_birth".into(), json!(birth.time_of_birth));
        body.insert("place_of_birth".into(), json!(birth.place_of_birth));
        match self {
            Self::Area {
                start_date,
                end_date,
                ..
            } => {
                if let Some(d) = start_date {
                    body.insert("start_date".into(), json!(d));
                }
                if let Some(d) = end_date {
                    body.insert("end_date".into(), json!(d));
                }
            }
            Self::FreeForm {
                query,
                specific_date,
            } => {
                body.insert("query".into(), json!(query));
                if let Some(d) = specific_date {
                    body.insert("specific_date".into(), json!(d));
                }
            }
            Self::Outlook(_) | Self::Horoscope(_) => {}
        }
        Value::Object(body)
    }

    /// Pick at most one lookup for a user message.
    ///
    /// Horoscope requests win over life areas, which win over plain time
    /// periods. A message that only carries a date becomes a free-form
    /// lookup for that date.
    pub fn classify(text: &str) -> Option<Self> {
        let words = normalize(text);
        let dates = find_dates(text);

        if has_any(&words, &["horoscope", "horoscopes"]) {
            let period = if has_any(&words, &["weekly", "week"]) {
                HoroscopePeriod::Weekly
            } else if has_any(&words, &["monthly", "month"]) {
                HoroscopePeriod::Monthly
            } else {
                HoroscopePeriod::Daily
            };
            return Some(Self::Horoscope(period));
        }

        const AREAS: &[(LifeArea, &[&str])] = &[
            (
                LifeArea::Love,
                &["love", "relationship", "relationships", "marriage", "partner", "romance", "dating"],
            ),
            (
                LifeArea::Career,
                &["career", "job", "promotion", "work", "business", "office"],
            ),
            (
                LifeArea::Wealth,
                &["money", "wealth", "finance", "finances", "financial", "investment"],
            ),
            (LifeArea::Health, &["health", "wellness", "healthy", "fitness"]),
        ];
        for (area, keys) in AREAS {
            if has_any(&words, keys) {
                return Some(Self::Area {
                    area: *area,
                    start_date: dates.first().cloned(),
                    end_date: dates.get(1).cloned(),
                });
            }
        }

        const PERIODS: &[(OutlookPeriod, &[&str])] = &[
            (OutlookPeriod::Today, &["today", "right now", "tonight"]),
            (OutlookPeriod::Week, &["week", "weekly", "next 7 days", "7 days"]),
            (
                OutlookPeriod::Quarter,
                &["quarter", "quarterly", "next 3 months", "3 months", "three months"],
            ),
            (
                OutlookPeriod::Year,
                &["year", "yearly", "12 months", "twelve months", "annual"],
            ),
            (OutlookPeriod::CurrentMonth, &["month", "monthly", "currently"]),
        ];
        for (period, keys) in PERIODS {
            if has_any(&words, keys) {
                return Some(Self::Outlook(*period));
            }
        }

        if let Some(date) = dates.into_iter().next() {
            return Some(Self::FreeForm {
                query: text.trim().to_string(),
                specific_date: Some(date),
            });
        }
        None
    }
}

/// Lowercase, strip punctuation, pad with spaces so keys match whole words.
fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(" {joined} ")
}

fn has_any(words: &str, keys: &[&str]) -> bool {
    keys.iter().any(|k| words.contains(&format!(" {k} ")))
}

/// `YYYY-MM-DD` tokens that name real dates, in order of appearance.
fn find_dates(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '-'))
        .filter_map(crate::onboarding::validate::validate_date)
        .collect()
}

fn preview(s: &str) -> String {
    if s.chars().count() <= LOG_PREVIEW_CHARS {
        s.to_string()
    } else {
        let cut: String = s.chars().take(LOG_PREVIEW_CHARS).collect();
        format!("{cut}...")
    }
}

#[async_trait]
pub trait PredictionGateway: Send + Sync {
    /// One round trip for `query`.
    async fn try_lookup(
        &self,
        birth: &BirthDetails,
        query: &PredictionQuery,
    ) -> Result<Value, GatewayError>;

    /// Payload as a string, or a JSON error string on failure.
    async fn lookup(&self, birth: &BirthDetails, query: &PredictionQuery) -> String {
        match self.try_lookup(birth, query).await {
            Ok(payload) => {
                let text = payload.to_string();
                tracing::info!(
                    lookup = query.label(),
                    chars = text.len(),
                    payload = %preview(&text),
                    "Prediction lookup succeeded"
                );
                text
            }
            Err(e) => {
                tracing::warn!(lookup = query.label(), error = %e, "Prediction lookup failed");
                json!({ "error": format!("{} lookup failed: {e}", query.label()) }).to_string()
            }
        }
    }
}

/// HTTP client for the astrology API.
pub struct HttpPredictionGateway {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPredictionGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl PredictionGateway for HttpPredictionGateway {
    async fn try_lookup(
        &self,
        birth: &BirthDetails,
        query: &PredictionQuery,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}{}", self.base_url, query.path());
        self.client
            .post(&url)
            .header("accept", "application/json")
            .json(&query.body(birth))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| GatewayError::from_reqwest(SERVICE, e))?
            .json()
            .await
            .map_err(|e| GatewayError::Malformed {
                service: SERVICE,
                reason: e.to_string(),
            })
    }
}
