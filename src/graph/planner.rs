//! Microsoft Planner and group conversation endpoints
//!
//! Required permissions:
//! - Tasks.Read.All - plans, buckets, tasks and task details
//! - Group.Read.All - group plans and the conversation threads holding task comments

use crate::error::Result;
use crate::graph::{GraphClient, PageCollection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySet {
    #[serde(default)]
    pub user: Option<Identity>,
    #[serde(default)]
    pub application: Option<Identity>,
}

impl IdentitySet {
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.id.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerPlanContainer {
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default, rename = "type")]
    pub container_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerPlan {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Owning group id (older plans only expose this)
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub container: Option<PlannerPlanContainer>,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
}

impl PlannerPlan {
    /// Id of the Microsoft 365 group that owns the plan, if it is group-backed
    pub fn group_id(&self) -> Option<&str> {
        if let Some(container) = &self.container {
            if container.container_type.as_deref() == Some("group") {
                return container.container_id.as_deref();
            }
        }
        self.owner.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerBucket {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub plan_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerAssignment {
    #[serde(default)]
    pub assigned_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_by: Option<IdentitySet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerTask {
    pub id: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub bucket_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub percent_complete: u8,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub start_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: Option<IdentitySet>,
    #[serde(default)]
    pub completed_by: Option<IdentitySet>,
    /// Keyed by assignee user id
    #[serde(default)]
    pub assignments: HashMap<String, PlannerAssignment>,
    #[serde(default)]
    pub conversation_thread_id: Option<String>,
}

impl PlannerTask {
    /// Assignee ids ordered by assignment time, then id
    pub fn assignee_ids(&self) -> Vec<&str> {
        let mut assignees: Vec<(&String, &PlannerAssignment)> = self.assignments.iter().collect();
        assignees.sort_by(|(a_id, a), (b_id, b)| {
            a.assigned_date_time
                .cmp(&b.assigned_date_time)
                .then_with(|| a_id.cmp(b_id))
        });
        assignees.into_iter().map(|(id, _)| id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub is_checked: bool,
    #[serde(default)]
    pub order_hint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannerTaskDetails {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub checklist: HashMap<String, ChecklistItem>,
}

impl PlannerTaskDetails {
    /// Checklist items in Planner display order
    pub fn ordered_checklist(&self) -> Vec<&ChecklistItem> {
        let mut items: Vec<&ChecklistItem> = self.checklist.values().collect();
        items.sort_by(|a, b| a.order_hint.cmp(&b.order_hint).then_with(|| a.title.cmp(&b.title)));
        items
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAddress {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: EmailAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemBody {
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// One post of a group conversation thread (a Planner task comment)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub created_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: Option<ItemBody>,
    #[serde(default)]
    pub from: Option<Recipient>,
    #[serde(default)]
    pub sender: Option<Recipient>,
}

impl Post {
    pub fn author(&self) -> Option<&str> {
        self.from
            .as_ref()
            .or(self.sender.as_ref())
            .and_then(|r| r.email_address.name.as_deref())
    }
}

// ============================================================================
// API calls
// ============================================================================

pub async fn get_plan(client: &GraphClient, plan_id: &str) -> Result<PlannerPlan> {
    client.get(&format!("planner/plans/{}", plan_id)).await
}

pub async fn list_group_plans(client: &GraphClient, group_id: &str) -> PageCollection<PlannerPlan> {
    client
        .collect_pages(&format!("groups/{}/planner/plans", group_id))
        .await
}

pub async fn list_plan_tasks(client: &GraphClient, plan_id: &str) -> PageCollection<PlannerTask> {
    client
        .collect_pages(&format!("planner/plans/{}/tasks", plan_id))
        .await
}

pub async fn list_plan_buckets(
    client: &GraphClient,
    plan_id: &str,
) -> PageCollection<PlannerBucket> {
    client
        .collect_pages(&format!("planner/plans/{}/buckets", plan_id))
        .await
}

pub async fn get_task_details(client: &GraphClient, task_id: &str) -> Result<PlannerTaskDetails> {
    client
        .get(&format!("planner/tasks/{}/details", task_id))
        .await
}

pub async fn list_thread_posts(
    client: &GraphClient,
    group_id: &str,
    thread_id: &str,
) -> PageCollection<Post> {
    client
        .collect_pages(&format!("groups/{}/threads/{}/posts", group_id, thread_id))
        .await
}
