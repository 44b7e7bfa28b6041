//! Service principal configuration export
//!
//! Owners, app-role assignments, delegated permission grants and credential
//! expiry for each service principal. A principal whose related listings
//! cannot be read is reported and skipped.

use crate::cmd::ExportOptions;
use crate::cmd::progress;
use crate::error::{Exp365Error, Result};
use crate::graph::service_principals::{self, Credential, ServicePrincipal};
use crate::graph::users::{IdentityLookup, UserResolver};
use crate::graph::{GraphClient, PageCollection};
use crate::report::html::ChartPage;
use crate::report::{self, CellValue, Pivot, TabularRecord};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use colored::Colorize;
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::HashMap;

const EXPIRY_WARNING_DAYS: i64 = 30;
const ALL_USERS: &str = "All users";

#[derive(Args, Debug)]
pub struct SpExportArgs {
    /// Export a single service principal by object id
    #[arg(long)]
    pub id: Option<String>,

    #[command(flatten)]
    pub export: ExportOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppRoleRecord {
    pub resource: String,
    pub app_role_id: Option<String>,
    pub granted: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrantRecord {
    pub resource: String,
    pub scope: String,
    pub consent_type: String,
    /// Consenting user, or "All users" for admin consent
    pub principal: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CredentialRecord {
    pub kind: String,
    pub display_name: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServicePrincipalRecord {
    pub id: String,
    pub app_id: Option<String>,
    pub display_name: String,
    pub principal_type: Option<String>,
    pub enabled: Option<bool>,
    pub owners: Vec<String>,
    pub app_roles: Vec<AppRoleRecord>,
    pub permission_grants: Vec<GrantRecord>,
    pub credentials: Vec<CredentialRecord>,
    pub next_credential_expiry: Option<DateTime<Utc>>,
    /// Some related listing stopped early
    pub incomplete: bool,
}

impl ServicePrincipalRecord {
    pub fn enabled_label(&self) -> &'static str {
        match self.enabled {
            Some(true) => "Enabled",
            Some(false) => "Disabled",
            None => "Unknown",
        }
    }
}

impl TabularRecord for ServicePrincipalRecord {
    fn headers() -> &'static [&'static str] {
        &[
            "ID",
            "App ID",
            "Display Name",
            "Type",
            "Enabled",
            "Owners",
            "App Roles",
            "Delegated Grants",
            "Credentials",
            "Next Credential Expiry",
            "Incomplete",
        ]
    }

    fn row(&self) -> Vec<CellValue> {
        let app_roles = self
            .app_roles
            .iter()
            .map(|role| match &role.app_role_id {
                Some(role_id) => format!("{} ({})", role.resource, role_id),
                None => role.resource.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let grants = self
            .permission_grants
            .iter()
            .map(|g| format!("{}: {} [{}]", g.resource, g.scope, g.principal))
            .collect::<Vec<_>>()
            .join("\n");

        let credentials = self
            .credentials
            .iter()
            .map(|c| {
                let end = c
                    .end
                    .map(|end| end.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "no expiry".to_string());
                let expired = if c.expired { " (expired)" } else { "" };
                format!(
                    "{} {}: {}{}",
                    c.kind,
                    c.display_name.as_deref().unwrap_or("-"),
                    end,
                    expired
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        vec![
            self.id.as_str().into(),
            self.app_id.clone().into(),
            self.display_name.as_str().into(),
            self.principal_type.clone().into(),
            self.enabled_label().into(),
            self.owners.join("; ").into(),
            app_roles.into(),
            grants.into(),
            credentials.into(),
            self.next_credential_expiry.into(),
            CellValue::Bool(self.incomplete),
        ]
    }
}

/// Display names of resource service principals, filled from the full
/// listing when available and otherwise fetched on first use
pub struct ResourceNames<'a> {
    client: &'a GraphClient,
    names: HashMap<String, String>,
}

impl<'a> ResourceNames<'a> {
    pub fn new(client: &'a GraphClient) -> Self {
        Self {
            client,
            names: HashMap::new(),
        }
    }

    pub fn seed(&mut self, principals: &[ServicePrincipal]) {
        for sp in principals {
            self.names.insert(sp.id.clone(), sp.name().to_string());
        }
    }

    /// Unknown resources fall back to their id
    pub async fn name(&mut self, id: &str) -> String {
        if let Some(name) = self.names.get(id) {
            return name.clone();
        }

        let name = match service_principals::get_service_principal(self.client, id).await {
            Ok(sp) => sp.name().to_string(),
            Err(e) => {
                tracing::warn!(resource_id = id, "Resource lookup failed: {}", e);
                id.to_string()
            }
        };
        self.names.insert(id.to_string(), name.clone());
        name
    }
}

fn credential_records(
    kind: &str,
    credentials: &[Credential],
    now: DateTime<Utc>,
) -> Vec<CredentialRecord> {
    credentials
        .iter()
        .map(|c| CredentialRecord {
            kind: kind.to_string(),
            display_name: c.display_name.clone(),
            start: c.start_date_time,
            end: c.end_date_time,
            expired: c.end_date_time.is_some_and(|end| end <= now),
        })
        .collect()
}

/// A listing that returned no page at all fails the principal
fn require<T>(
    collection: PageCollection<T>,
    what: &str,
    sp: &ServicePrincipal,
) -> Result<PageCollection<T>> {
    if collection.pages == 0 {
        return Err(Exp365Error::GraphApiError(format!(
            "Could not list {} of '{}'",
            what,
            sp.name()
        )));
    }
    Ok(collection)
}

/// Build the record for one service principal
pub async fn export_service_principal<L: IdentityLookup>(
    client: &GraphClient,
    resolver: &mut UserResolver<L>,
    resources: &mut ResourceNames<'_>,
    sp: &ServicePrincipal,
    now: DateTime<Utc>,
) -> Result<ServicePrincipalRecord> {
    let owners = require(service_principals::list_owners(client, &sp.id).await, "owners", sp)?;
    let assignments = require(
        service_principals::list_app_role_assignments(client, &sp.id).await,
        "app role assignments",
        sp,
    )?;
    let grants = require(
        service_principals::list_permission_grants(client, &sp.id).await,
        "permission grants",
        sp,
    )?;
    let incomplete = !(owners.complete && assignments.complete && grants.complete);

    let mut owner_names = Vec::with_capacity(owners.len());
    for owner in &owners.items {
        let name = match &owner.display_name {
            Some(name) => name.clone(),
            None if owner.is_user() => resolver.resolve(&owner.id).await,
            None => owner.id.clone(),
        };
        owner_names.push(name);
    }

    let mut app_roles = Vec::with_capacity(assignments.len());
    for assignment in &assignments.items {
        let resource = match (&assignment.resource_display_name, &assignment.resource_id) {
            (Some(name), _) => name.clone(),
            (None, Some(id)) => resources.name(id).await,
            (None, None) => String::new(),
        };
        app_roles.push(AppRoleRecord {
            resource,
            app_role_id: assignment.app_role_id.clone(),
            granted: assignment.created_date_time,
        });
    }

    let mut permission_grants = Vec::with_capacity(grants.len());
    for grant in &grants.items {
        let resource = match &grant.resource_id {
            Some(id) => resources.name(id).await,
            None => String::new(),
        };
        let consent_type = grant.consent_type.clone().unwrap_or_default();
        let principal = match (&grant.principal_id, consent_type.as_str()) {
            (Some(id), "Principal") => resolver.resolve(id).await,
            _ => ALL_USERS.to_string(),
        };
        permission_grants.push(GrantRecord {
            resource,
            scope: grant.scope.as_deref().unwrap_or("").trim().to_string(),
            consent_type,
            principal,
        });
    }

    let mut credentials = credential_records("Password", &sp.password_credentials, now);
    credentials.extend(credential_records("Certificate", &sp.key_credentials, now));
    let next_credential_expiry = credentials
        .iter()
        .filter_map(|c| c.end)
        .filter(|end| *end > now)
        .min();

    Ok(ServicePrincipalRecord {
        id: sp.id.clone(),
        app_id: sp.app_id.clone(),
        display_name: sp.name().to_string(),
        principal_type: sp.service_principal_type.clone(),
        enabled: sp.account_enabled,
        owners: owner_names,
        app_roles,
        permission_grants,
        credentials,
        next_credential_expiry,
        incomplete,
    })
}

#[derive(Debug, Default)]
pub struct ServicePrincipalExport {
    pub records: Vec<ServicePrincipalRecord>,
    /// `(service principal id, error)` for each principal that was skipped
    pub failed: Vec<(String, String)>,
}

/// Export principals in order; a principal that fails is logged and skipped
pub async fn export_service_principals<L: IdentityLookup>(
    client: &GraphClient,
    resolver: &mut UserResolver<L>,
    principals: &[ServicePrincipal],
    bar: &ProgressBar,
) -> ServicePrincipalExport {
    let now = Utc::now();
    let mut resources = ResourceNames::new(client);
    resources.seed(principals);

    let mut export = ServicePrincipalExport::default();
    for sp in principals {
        bar.set_message(sp.name().to_string());

        match export_service_principal(client, resolver, &mut resources, sp, now).await {
            Ok(record) => export.records.push(record),
            Err(e) => {
                tracing::warn!(
                    sp_id = %sp.id,
                    "Service principal export failed, continuing: {}",
                    e
                );
                export.failed.push((sp.id.clone(), e.to_string()));
            }
        }

        bar.inc(1);
    }

    export
}

/// Principals per type by enabled state
pub fn type_pivot(records: &[ServicePrincipalRecord]) -> Pivot {
    Pivot::from_pairs(
        "Type",
        &["Enabled", "Disabled"],
        records.iter().map(|r| {
            (
                r.principal_type.clone().unwrap_or_else(|| "Unknown".to_string()),
                r.enabled_label().to_string(),
            )
        }),
    )
}

/// `(expired, expiring within the warning window)` credential counts
pub fn credential_summary(
    records: &[ServicePrincipalRecord],
    now: DateTime<Utc>,
) -> (usize, usize) {
    let horizon = now + Duration::days(EXPIRY_WARNING_DAYS);
    let credentials = records.iter().flat_map(|r| &r.credentials);

    let expired = credentials.clone().filter(|c| c.expired).count();
    let expiring = credentials
        .filter(|c| !c.expired && c.end.is_some_and(|end| end <= horizon))
        .count();
    (expired, expiring)
}

pub async fn export(args: SpExportArgs) -> Result<()> {
    let ctx = args.export.connect().await?;

    println!(
        "{} Exporting service principals from {}",
        "→".cyan(),
        ctx.tenant_name.bold()
    );

    let spinner = progress::create_spinner("Loading service principals...");
    let principals = match &args.id {
        Some(id) => match service_principals::get_service_principal(&ctx.client, id).await {
            Ok(sp) => vec![sp],
            Err(e) => {
                progress::finish_spinner_error(&spinner, "Service principal not found");
                return Err(e);
            }
        },
        None => {
            let listing = service_principals::list_service_principals(&ctx.client).await;
            if !listing.complete {
                tracing::warn!(count = listing.len(), "Service principal listing is incomplete");
            }
            listing.items
        }
    };
    progress::finish_spinner_success(
        &spinner,
        &format!("Found {} service principal(s)", principals.len()),
    );

    let bar = progress::create_progress_bar(principals.len() as u64, "Exporting");
    let mut resolver = UserResolver::new(&ctx.client);
    let result = export_service_principals(&ctx.client, &mut resolver, &principals, &bar).await;
    progress::finish_progress_success(
        &bar,
        &format!("{} service principal(s) exported", result.records.len()),
    );

    let pivot = type_pivot(&result.records);
    let (expired, expiring) = credential_summary(&result.records, Utc::now());
    let mut chart = ChartPage::from_pivot("Service Principals", &ctx.tenant_name, &pivot);
    chart.summary = vec![
        ("Service principals".to_string(), result.records.len().to_string()),
        ("Expired credentials".to_string(), expired.to_string()),
        (
            format!("Expiring in {} days", EXPIRY_WARNING_DAYS),
            expiring.to_string(),
        ),
        ("Failed".to_string(), result.failed.len().to_string()),
    ];

    let written = report::write_reports(
        &ctx.output_dir,
        "service-principals",
        ctx.format,
        &result.records,
        &pivot,
        &chart,
    )?;

    for path in &written {
        println!("{} Wrote {}", "✓".green(), path.display());
    }

    if !result.failed.is_empty() {
        println!(
            "\n{} {} service principal(s) could not be exported:",
            "!".yellow(),
            result.failed.len()
        );
        for (id, error) in &result.failed {
            println!("  {} {}", id.bold(), error.dimmed());
        }
    }

    Ok(())
}
