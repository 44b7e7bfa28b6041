//! Entra ID sign-in logs (auditLogs/signIns)
//!
//! Requires AuditLog.Read.All and an Entra ID P1/P2 license on the tenant.

use crate::error::{Exp365Error, Result};
use crate::graph::{GraphClient, PageCollection};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInLog {
    pub id: String,
    pub created_date_time: DateTime<Utc>,
    #[serde(default)]
    pub user_display_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub app_display_name: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub client_app_used: Option<String>,
    #[serde(default)]
    pub conditional_access_status: Option<String>,
    #[serde(default)]
    pub is_interactive: Option<bool>,
    #[serde(default)]
    pub risk_level_during_sign_in: Option<String>,
    #[serde(default)]
    pub status: Option<SignInStatus>,
    #[serde(default)]
    pub device_detail: Option<DeviceDetail>,
    #[serde(default)]
    pub location: Option<SignInLocation>,
}

impl SignInLog {
    /// Graph reports success as error code 0
    pub fn is_success(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.error_code)
            .is_none_or(|code| code == 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInStatus {
    #[serde(default)]
    pub error_code: Option<i32>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub additional_details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetail {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub operating_system: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInLocation {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country_or_region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInStatusFilter {
    Success,
    Failure,
}

/// Filter options for sign-in logs
#[derive(Debug, Default, Clone)]
pub struct SignInFilter {
    /// User principal name substring
    pub user: Option<String>,
    /// Application display name substring
    pub app: Option<String>,
    pub status: Option<SignInStatusFilter>,
    /// Page size requested from the server
    pub top: Option<u32>,
    pub created_after: Option<DateTime<Utc>>,
}

/// Longest lookback accepted, about ten years
pub const MAX_LOOKBACK_DAYS: u32 = 3650;

/// OData string literal body: single quotes are doubled
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

impl SignInFilter {
    /// Filter covering the last `days` days up to `now`
    pub fn lookback(days: u32, now: DateTime<Utc>) -> Result<Self> {
        if days == 0 || days > MAX_LOOKBACK_DAYS {
            return Err(Exp365Error::InvalidConfig(format!(
                "lookback must be between 1 and {} days, got {}",
                MAX_LOOKBACK_DAYS, days
            )));
        }

        let created_after = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| {
                Exp365Error::InvalidConfig(format!("lookback of {} days is out of range", days))
            })?;

        Ok(Self {
            created_after: Some(created_after),
            ..Default::default()
        })
    }

    /// Percent-encoded query string, starting with `?`
    pub fn to_query_string(&self) -> String {
        let mut filters: Vec<String> = Vec::new();
        let mut params: Vec<(&str, String)> = Vec::new();

        if let Some(ref user) = self.user {
            filters.push(format!(
                "startswith(userPrincipalName, '{}')",
                odata_literal(user)
            ));
        }

        if let Some(ref app) = self.app {
            filters.push(format!("startswith(appDisplayName, '{}')", odata_literal(app)));
        }

        match self.status {
            Some(SignInStatusFilter::Success) => filters.push("status/errorCode eq 0".to_string()),
            Some(SignInStatusFilter::Failure) => filters.push("status/errorCode ne 0".to_string()),
            None => {}
        }

        if let Some(date) = &self.created_after {
            filters.push(format!(
                "createdDateTime ge {}",
                date.format("%Y-%m-%dT%H:%M:%SZ")
            ));
        }

        if !filters.is_empty() {
            params.push(("$filter", filters.join(" and ")));
        }

        if let Some(top) = self.top {
            params.push(("$top", top.to_string()));
        }

        params.push(("$orderby", "createdDateTime desc".to_string()));

        let query: Vec<String> = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect();

        format!("?{}", query.join("&"))
    }
}

/// Page through sign-in logs matching the filter, at most `max_pages` pages (0 = all)
pub async fn list_sign_ins(
    client: &GraphClient,
    filter: &SignInFilter,
    max_pages: usize,
) -> PageCollection<SignInLog> {
    let endpoint = format!("auditLogs/signIns{}", filter.to_query_string());
    client.collect_pages_limited(&endpoint, max_pages).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Decoded `(key, value)` pairs of a query string
    fn decoded(query: &str) -> Vec<(String, String)> {
        query
            .trim_start_matches('?')
            .split('&')
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap();
                (key.to_string(), urlencoding::decode(value).unwrap().into_owned())
            })
            .collect()
    }

    fn param(query: &str, key: &str) -> Option<String> {
        decoded(query)
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    #[test]
    fn test_lookback_filter_query_string() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let filter = SignInFilter {
            top: Some(500),
            ..SignInFilter::lookback(7, now).unwrap()
        };
        let query = filter.to_query_string();
        assert_eq!(
            param(&query, "$filter").as_deref(),
            Some("createdDateTime ge 2024-05-03T12:00:00Z")
        );
        assert_eq!(param(&query, "$top").as_deref(), Some("500"));
        assert_eq!(
            param(&query, "$orderby").as_deref(),
            Some("createdDateTime desc")
        );
        assert!(!query.contains(' '));
    }

    #[test]
    fn test_status_and_user_filters() {
        let filter = SignInFilter {
            user: Some("alice@contoso.com".to_string()),
            status: Some(SignInStatusFilter::Failure),
            ..Default::default()
        };
        let filter_value = param(&filter.to_query_string(), "$filter").unwrap();
        assert_eq!(
            filter_value,
            "startswith(userPrincipalName, 'alice@contoso.com') and status/errorCode ne 0"
        );
    }

    #[test]
    fn test_app_filter_escapes_reserved_characters() {
        let filter = SignInFilter {
            app: Some("AT&T O'Brien #1+".to_string()),
            ..Default::default()
        };
        let query = filter.to_query_string();
        assert_eq!(decoded(&query).len(), 2);
        assert_eq!(
            param(&query, "$filter").as_deref(),
            Some("startswith(appDisplayName, 'AT&T O''Brien #1+')")
        );
    }

    #[test]
    fn test_lookback_rejects_out_of_range_days() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        assert!(matches!(
            SignInFilter::lookback(200_000_000, now),
            Err(Exp365Error::InvalidConfig(_))
        ));
        assert!(matches!(
            SignInFilter::lookback(0, now),
            Err(Exp365Error::InvalidConfig(_))
        ));
        assert!(SignInFilter::lookback(MAX_LOOKBACK_DAYS, now).is_ok());
    }

    #[test]
    fn test_is_success() {
        let mut log: SignInLog = serde_json::from_value(serde_json::json!({
            "id": "s1",
            "createdDateTime": "2024-05-09T08:00:00Z",
            "status": {"errorCode": 50126, "failureReason": "Invalid username or password"}
        }))
        .unwrap();
        assert!(!log.is_success());

        log.status = None;
        assert!(log.is_success());
    }
}
