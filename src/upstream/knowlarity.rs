use serde_json::Value;

use super::{check, UpstreamError};

const CLICK2CALL_URL: &str = "https://konnect.knowlarity.com/konnect/makecall/";
const CALL_LOG_URL: &str = "https://kpi.knowlarity.com/Basic/v1/account/calllog";

/// Parameters for a carrier click-to-call request.
#[derive(Debug, Clone)]
pub struct Click2CallParams {
    pub customer_number: String,
    /// Defaults to the account SR number when absent.
    pub agent_number: Option<String>,
    pub caller_id: Option<String>,
    pub is_promotional: bool,
}

/// Query for the carrier call-log listing.
#[derive(Debug, Clone, Default)]
pub struct CallLogQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

/// API-key client for the telephony carrier.
pub struct KnowlarityClient {
    http: reqwest::Client,
    api_key: String,
    sr_number: String,
}

impl KnowlarityClient {
    pub fn new(
        http: reqwest::Client,
        api_key: impl Into<String>,
        sr_number: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            sr_number: sr_number.into(),
        }
    }

    pub fn sr_number(&self) -> &str {
        &self.sr_number
    }

    /// Trigger the carrier to bridge an agent number with a customer.
    pub async fn click_to_call(&self, params: &Click2CallParams) -> Result<Value, UpstreamError> {
        let agent_number = params
            .agent_number
            .clone()
            .unwrap_or_else(|| self.sr_number.clone());
        let caller_id = params.caller_id.clone().unwrap_or_default();

        tracing::debug!(
            customer = %params.customer_number,
            agent = %agent_number,
            "carrier click-to-call request"
        );

        let response = self
            .http
            .get(CLICK2CALL_URL)
            .header("X-API-Key", &self.api_key)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("k_number", self.sr_number.as_str()),
                ("customer", params.customer_number.as_str()),
                ("agent_number", agent_number.as_str()),
                ("caller_id", caller_id.as_str()),
                ("is_promotional", if params.is_promotional { "true" } else { "false" }),
            ])
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Retrieve historical call logs for analytics.
    pub async fn call_logs(&self, query: &CallLogQuery) -> Result<Value, UpstreamError> {
        let mut request = self
            .http
            .get(CALL_LOG_URL)
            .header("X-API-Key", &self.api_key)
            .query(&[
                ("limit", query.limit.to_string()),
                ("offset", query.offset.to_string()),
            ]);
        if let Some(start) = &query.start_date {
            request = request.query(&[("start_date", start)]);
        }
        if let Some(end) = &query.end_date {
            request = request.query(&[("end_date", end)]);
        }

        let response = request.send().await?;
        Ok(check(response).await?.json().await?)
    }
}

/// Normalize a phone number to the `+91XXXXXXXXXX` form the carrier expects.
///
/// Strips spaces, dashes and parentheses; numbers without a country prefix are
/// treated as Indian.
pub fn normalize_phone_number(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    if cleaned.starts_with('+') {
        cleaned
    } else if cleaned.starts_with("91") && cleaned.len() > 10 {
        format!("+{cleaned}")
    } else {
        format!("+91{cleaned}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_bare_ten_digit_number() {
        assert_eq!(normalize_phone_number("9876543210"), "+919876543210");
    }

    #[test]
    fn test_strips_formatting_characters() {
        assert_eq!(normalize_phone_number("(987) 654-3210"), "+919876543210");
    }

    #[test]
    fn test_keeps_existing_country_prefix() {
        assert_eq!(normalize_phone_number("+14155550100"), "+14155550100");
        assert_eq!(normalize_phone_number("919876543210"), "+919876543210");
    }
}
