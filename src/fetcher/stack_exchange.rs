//! Stack Exchange API dialect
//!
//! Quota travels in the response body (`quota_remaining`) and resets daily at
//! UTC midnight. A `backoff` field asks the client to pause before hitting the
//! same method again.

use chrono::{DateTime, Days, Utc};
use serde_json::Value;
use std::time::Duration;

use super::dialect::{inclusive_end, page_number, parse_json, Auth, Dialect, PageRequest, RawResponse};
use super::endpoint::EndpointSpec;
use super::{FetchResult, PageError};
use crate::credential::{Credential, QuotaInfo};
use crate::split::DateChunk;

/// Stack Exchange API base URL
pub const STACK_EXCHANGE_API_BASE_URL: &str = "https://api.stackexchange.com";

/// Stack Exchange API dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct StackExchangeDialect;

fn next_utc_midnight(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    now.date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn body_quota(body: &Value) -> QuotaInfo {
    let remaining = body.get("quota_remaining").and_then(Value::as_i64);
    QuotaInfo {
        remaining,
        reset_at: remaining.and_then(|_| next_utc_midnight(Utc::now())),
    }
}

impl Dialect for StackExchangeDialect {
    fn build_request(
        &self,
        endpoint: &EndpointSpec,
        filter: &DateChunk,
        cursor: Option<&str>,
        credential: &Credential,
    ) -> Result<PageRequest, PageError> {
        let page = page_number(cursor)?;
        Ok(PageRequest {
            path: endpoint.path.clone(),
            query: vec![
                ("site".to_string(), endpoint.scope.clone()),
                ("fromdate".to_string(), filter.start().timestamp().to_string()),
                ("todate".to_string(), inclusive_end(filter).timestamp().to_string()),
                ("sort".to_string(), "creation".to_string()),
                ("order".to_string(), "asc".to_string()),
                ("page".to_string(), page.to_string()),
                ("pagesize".to_string(), endpoint.page_size.to_string()),
            ],
            auth: Auth::Query {
                name: "key".to_string(),
                value: credential.secret().to_string(),
            },
        })
    }

    fn quota(&self, response: &RawResponse) -> QuotaInfo {
        serde_json::from_str::<Value>(&response.body)
            .map(|body| body_quota(&body))
            .unwrap_or_default()
    }

    fn parse_page(
        &self,
        _endpoint: &EndpointSpec,
        cursor: Option<&str>,
        response: &RawResponse,
    ) -> Result<FetchResult, PageError> {
        let page = page_number(cursor)?;
        let mut body = parse_json(&response.body)?;

        let items = match body.get_mut("items").map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => return Err(PageError::Decode("response has no 'items' array".to_string())),
        };
        let has_more = body.get("has_more").and_then(Value::as_bool).unwrap_or(false);
        let min_delay = body
            .get("backoff")
            .and_then(Value::as_u64)
            .map(Duration::from_secs);

        Ok(FetchResult {
            next_cursor: (has_more && !items.is_empty()).then(|| (page + 1).to_string()),
            items,
            quota: body_quota(&body),
            min_delay,
        })
    }
}
