//! Sign-in log report
//!
//! Fetches sign-ins over a lookback window and writes the flattened entries
//! plus a per-day success/failure chart.

use crate::cmd::ExportOptions;
use crate::cmd::progress;
use crate::error::Result;
use crate::graph::audit::{self, MAX_LOOKBACK_DAYS, SignInFilter, SignInLog, SignInStatusFilter};
use crate::report::html::{ChartKind, ChartPage, ChartSeries};
use crate::report::{self, CellValue, Pivot, TabularRecord};
use chrono::{DateTime, Local, NaiveDate, Utc};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

const SUCCESS: &str = "Success";
const FAILURE: &str = "Failure";
const UNKNOWN_APP: &str = "(unknown)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Success,
    Failure,
}

impl From<StatusArg> for SignInStatusFilter {
    fn from(status: StatusArg) -> Self {
        match status {
            StatusArg::Success => SignInStatusFilter::Success,
            StatusArg::Failure => SignInStatusFilter::Failure,
        }
    }
}

#[derive(Args, Debug)]
pub struct SignInReportArgs {
    /// Lookback window in days (default: export.lookback_days from config.toml)
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_LOOKBACK_DAYS))
    )]
    pub days: Option<u32>,

    /// Only users whose UPN starts with this value
    #[arg(long)]
    pub user: Option<String>,

    /// Only applications whose name starts with this value
    #[arg(long)]
    pub app: Option<String>,

    /// Only successful or failed sign-ins
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    /// Stop after this many pages (0 = all)
    #[arg(long, default_value_t = 0)]
    pub max_pages: usize,

    #[command(flatten)]
    pub export: ExportOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignInRecord {
    pub id: String,
    pub created: DateTime<Utc>,
    pub user: Option<String>,
    pub user_principal_name: Option<String>,
    pub app: Option<String>,
    pub ip_address: Option<String>,
    pub client_app: Option<String>,
    pub location: Option<String>,
    pub device: Option<String>,
    pub operating_system: Option<String>,
    pub status: String,
    pub error_code: Option<i32>,
    pub failure_reason: Option<String>,
    pub conditional_access_status: Option<String>,
    pub interactive: Option<bool>,
}

impl SignInRecord {
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS
    }
}

impl From<&SignInLog> for SignInRecord {
    fn from(log: &SignInLog) -> Self {
        let location = log.location.as_ref().and_then(|loc| {
            let parts: Vec<&str> = [&loc.city, &loc.state, &loc.country_or_region]
                .into_iter()
                .filter_map(|part| part.as_deref())
                .filter(|part| !part.is_empty())
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        });

        let status = log.status.as_ref();
        let success = log.is_success();

        Self {
            id: log.id.clone(),
            created: log.created_date_time,
            user: log.user_display_name.clone(),
            user_principal_name: log.user_principal_name.clone(),
            app: log.app_display_name.clone(),
            ip_address: log.ip_address.clone(),
            client_app: log.client_app_used.clone(),
            location,
            device: log.device_detail.as_ref().and_then(|d| d.display_name.clone()),
            operating_system: log
                .device_detail
                .as_ref()
                .and_then(|d| d.operating_system.clone()),
            status: if success { SUCCESS } else { FAILURE }.to_string(),
            error_code: status.and_then(|s| s.error_code),
            failure_reason: status
                .and_then(|s| s.failure_reason.clone())
                .filter(|_| !success),
            conditional_access_status: log.conditional_access_status.clone(),
            interactive: log.is_interactive,
        }
    }
}

impl TabularRecord for SignInRecord {
    fn headers() -> &'static [&'static str] {
        &[
            "Time (UTC)",
            "User",
            "UPN",
            "Application",
            "IP Address",
            "Client App",
            "Location",
            "Device",
            "OS",
            "Status",
            "Error Code",
            "Failure Reason",
            "Conditional Access",
            "Interactive",
        ]
    }

    fn row(&self) -> Vec<CellValue> {
        vec![
            Some(self.created).into(),
            self.user.clone().into(),
            self.user_principal_name.clone().into(),
            self.app.clone().into(),
            self.ip_address.clone().into(),
            self.client_app.clone().into(),
            self.location.clone().into(),
            self.device.clone().into(),
            self.operating_system.clone().into(),
            self.status.as_str().into(),
            self.error_code
                .map(|code| CellValue::Number(f64::from(code)))
                .unwrap_or(CellValue::Empty),
            self.failure_reason.clone().into(),
            self.conditional_access_status.clone().into(),
            self.interactive.map(CellValue::Bool).unwrap_or(CellValue::Empty),
        ]
    }
}

/// Per-day success and failure counts
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    pub days: Vec<NaiveDate>,
    pub success: Vec<u64>,
    pub failure: Vec<u64>,
}

/// Count sign-ins per UTC day from `from` to `to` inclusive
///
/// Days without sign-ins are present with zero counts; records outside the
/// window are ignored.
pub fn daily_series(records: &[SignInRecord], from: NaiveDate, to: NaiveDate) -> DailySeries {
    let mut counts: BTreeMap<NaiveDate, (u64, u64)> = from
        .iter_days()
        .take_while(|day| *day <= to)
        .map(|day| (day, (0, 0)))
        .collect();

    for record in records {
        if let Some((success, failure)) = counts.get_mut(&record.created.date_naive()) {
            if record.is_success() {
                *success += 1;
            } else {
                *failure += 1;
            }
        }
    }

    DailySeries {
        days: counts.keys().copied().collect(),
        success: counts.values().map(|(s, _)| *s).collect(),
        failure: counts.values().map(|(_, f)| *f).collect(),
    }
}

/// Sign-ins per application by status
pub fn app_pivot(records: &[SignInRecord]) -> Pivot {
    Pivot::from_pairs(
        "Application",
        &[SUCCESS, FAILURE],
        records.iter().map(|r| {
            (
                r.app.clone().unwrap_or_else(|| UNKNOWN_APP.to_string()),
                r.status.clone(),
            )
        }),
    )
}

pub fn build_chart(
    tenant_name: &str,
    lookback_days: u32,
    records: &[SignInRecord],
    series: &DailySeries,
    pivot: &Pivot,
) -> ChartPage {
    let failed = records.iter().filter(|r| !r.is_success()).count();
    let users: HashSet<&str> = records
        .iter()
        .filter_map(|r| r.user_principal_name.as_deref())
        .collect();

    ChartPage {
        title: "Sign-in Activity".to_string(),
        subtitle: format!("Sign-ins per day, last {} day(s)", lookback_days),
        tenant_name: tenant_name.to_string(),
        generated_at: Local::now(),
        kind: ChartKind::Line,
        stacked: false,
        labels: series
            .days
            .iter()
            .map(|day| day.format("%Y-%m-%d").to_string())
            .collect(),
        series: vec![
            ChartSeries {
                label: SUCCESS.to_string(),
                color: "#16a34a".to_string(),
                values: series.success.clone(),
            },
            ChartSeries {
                label: FAILURE.to_string(),
                color: "#dc2626".to_string(),
                values: series.failure.clone(),
            },
        ],
        summary: vec![
            ("Sign-ins".to_string(), records.len().to_string()),
            ("Successful".to_string(), (records.len() - failed).to_string()),
            ("Failed".to_string(), failed.to_string()),
            ("Users".to_string(), users.len().to_string()),
        ],
        table: Some(pivot.clone()),
    }
}

pub async fn report(args: SignInReportArgs) -> Result<()> {
    let ctx = args.export.connect().await?;
    let days = args.days.unwrap_or(ctx.defaults.lookback_days);
    let now = Utc::now();

    let filter = SignInFilter {
        user: args.user.clone(),
        app: args.app.clone(),
        status: args.status.map(Into::into),
        ..SignInFilter::lookback(days, now)?
    };

    println!(
        "{} Sign-in report for {} (last {} day(s))",
        "→".cyan(),
        ctx.tenant_name.bold(),
        days
    );

    let spinner = progress::create_spinner("Fetching sign-in logs...");
    let logs = audit::list_sign_ins(&ctx.client, &filter, args.max_pages).await;
    let message = format!("Fetched {} sign-in(s) in {} page(s)", logs.len(), logs.pages);
    if logs.complete {
        progress::finish_spinner_success(&spinner, &message);
    } else {
        progress::finish_spinner_error(&spinner, &format!("{} (incomplete)", message));
    }

    let records: Vec<SignInRecord> = logs.items.iter().map(SignInRecord::from).collect();
    let from = filter.created_after.unwrap_or(now).date_naive();
    let series = daily_series(&records, from, now.date_naive());
    let pivot = app_pivot(&records);
    let chart = build_chart(&ctx.tenant_name, days, &records, &series, &pivot);

    let written = report::write_reports(
        &ctx.output_dir,
        "signins",
        ctx.format,
        &records,
        &pivot,
        &chart,
    )?;

    for path in &written {
        println!("{} Wrote {}", "✓".green(), path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn log(id: &str, at: DateTime<Utc>, app: Option<&str>, error_code: i32) -> SignInLog {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "createdDateTime": at,
            "userDisplayName": "Alice",
            "userPrincipalName": "alice@contoso.com",
            "appDisplayName": app,
            "status": {"errorCode": error_code, "failureReason": "Invalid password"},
            "location": {"city": "Oslo", "state": "", "countryOrRegion": "NO"}
        }))
        .unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_record_from_log() {
        let at = Utc.with_ymd_and_hms(2024, 5, 9, 8, 0, 0).unwrap();

        let failed = SignInRecord::from(&log("s1", at, Some("Outlook"), 50126));
        assert_eq!(failed.status, "Failure");
        assert_eq!(failed.location.as_deref(), Some("Oslo, NO"));
        assert_eq!(failed.failure_reason.as_deref(), Some("Invalid password"));

        let ok = SignInRecord::from(&log("s2", at, Some("Outlook"), 0));
        assert!(ok.is_success());
        assert!(ok.failure_reason.is_none());
        assert_eq!(ok.row().len(), SignInRecord::headers().len());
    }

    #[test]
    fn test_daily_series_fills_every_day() {
        let records: Vec<SignInRecord> = [
            log("a", Utc.with_ymd_and_hms(2024, 5, 2, 1, 0, 0).unwrap(), None, 0),
            log("b", Utc.with_ymd_and_hms(2024, 5, 2, 23, 0, 0).unwrap(), None, 50126),
            log("c", Utc.with_ymd_and_hms(2024, 5, 4, 12, 0, 0).unwrap(), None, 0),
            // outside the window
            log("d", Utc.with_ymd_and_hms(2024, 4, 30, 12, 0, 0).unwrap(), None, 0),
        ]
        .iter()
        .map(SignInRecord::from)
        .collect();

        let series = daily_series(&records, day(1), day(5));
        assert_eq!(series.days, vec![day(1), day(2), day(3), day(4), day(5)]);
        assert_eq!(series.success, vec![0, 1, 0, 1, 0]);
        assert_eq!(series.failure, vec![0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_daily_series_without_records() {
        let series = daily_series(&[], day(1), day(7));
        assert_eq!(series.days.len(), 7);
        assert!(series.success.iter().chain(&series.failure).all(|c| *c == 0));
    }

    #[test]
    fn test_app_pivot_and_chart() {
        let at = Utc.with_ymd_and_hms(2024, 5, 3, 9, 0, 0).unwrap();
        let records: Vec<SignInRecord> = [
            log("a", at, Some("Teams"), 0),
            log("b", at, Some("Teams"), 53003),
            log("c", at, None, 0),
        ]
        .iter()
        .map(SignInRecord::from)
        .collect();

        let pivot = app_pivot(&records);
        assert_eq!(pivot.columns, vec!["Success", "Failure"]);
        assert_eq!(
            pivot.rows,
            vec![
                ("(unknown)".to_string(), vec![1, 0]),
                ("Teams".to_string(), vec![1, 1]),
            ]
        );

        let series = daily_series(&records, day(3), day(3));
        let chart = build_chart("Contoso", 1, &records, &series, &pivot);
        assert_eq!(chart.kind, ChartKind::Line);
        assert_eq!(chart.labels, vec!["2024-05-03"]);
        assert_eq!(chart.series[0].values, vec![2]);
        assert_eq!(chart.series[1].values, vec![1]);
        assert!(chart.summary.contains(&("Users".to_string(), "1".to_string())));
    }
}
