//! Service principal configuration (servicePrincipals)
//!
//! Requires Application.Read.All, plus Directory.Read.All for delegated grants.

use crate::error::Result;
use crate::graph::{GraphClient, PageCollection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const SELECT_FIELDS: &str = "id,appId,displayName,servicePrincipalType,accountEnabled,\
appOwnerOrganizationId,signInAudience,tags,passwordCredentials,keyCredentials";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    pub id: String,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub service_principal_type: Option<String>,
    #[serde(default)]
    pub account_enabled: Option<bool>,
    #[serde(default)]
    pub app_owner_organization_id: Option<String>,
    #[serde(default)]
    pub sign_in_audience: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub password_credentials: Vec<Credential>,
    #[serde(default)]
    pub key_credentials: Vec<Credential>,
}

impl ServicePrincipal {
    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.id)
    }
}

/// Secret or certificate metadata (never the secret itself)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryObject {
    pub id: String,
    #[serde(default, rename = "@odata.type")]
    pub odata_type: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

impl DirectoryObject {
    pub fn is_user(&self) -> bool {
        self.odata_type.as_deref() == Some("#microsoft.graph.user")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRoleAssignment {
    pub id: String,
    #[serde(default)]
    pub app_role_id: Option<String>,
    #[serde(default)]
    pub principal_id: Option<String>,
    #[serde(default)]
    pub principal_display_name: Option<String>,
    #[serde(default)]
    pub principal_type: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_display_name: Option<String>,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2PermissionGrant {
    pub id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    /// `AllPrincipals` (admin consent) or `Principal` (single user)
    #[serde(default)]
    pub consent_type: Option<String>,
    #[serde(default)]
    pub principal_id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

pub async fn list_service_principals(client: &GraphClient) -> PageCollection<ServicePrincipal> {
    client
        .collect_pages(&format!("servicePrincipals?$select={}", SELECT_FIELDS))
        .await
}

pub async fn get_service_principal(client: &GraphClient, id: &str) -> Result<ServicePrincipal> {
    client
        .get(&format!("servicePrincipals/{}?$select={}", id, SELECT_FIELDS))
        .await
}

pub async fn list_owners(client: &GraphClient, id: &str) -> PageCollection<DirectoryObject> {
    client
        .collect_pages(&format!("servicePrincipals/{}/owners", id))
        .await
}

/// App roles this service principal has been granted on other resources
pub async fn list_app_role_assignments(
    client: &GraphClient,
    id: &str,
) -> PageCollection<AppRoleAssignment> {
    client
        .collect_pages(&format!("servicePrincipals/{}/appRoleAssignments", id))
        .await
}

/// Delegated permissions granted to this service principal
pub async fn list_permission_grants(
    client: &GraphClient,
    id: &str,
) -> PageCollection<OAuth2PermissionGrant> {
    client
        .collect_pages(&format!("servicePrincipals/{}/oauth2PermissionGrants", id))
        .await
}
