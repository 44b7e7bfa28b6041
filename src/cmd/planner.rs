//! Planner task export
//!
//! One flat record per task with bucket, assignees, details and comments
//! inlined. Plans are processed one after another; a plan that fails is
//! reported and skipped.

use crate::cmd::ExportOptions;
use crate::cmd::progress;
use crate::error::{Exp365Error, Result};
use crate::graph::GraphClient;
use crate::graph::planner::{self, PlannerPlan, PlannerTask};
use crate::graph::users::{FORMER_MEMBER, IdentityLookup, UserResolver};
use crate::report::html::ChartPage;
use crate::report::{self, CellValue, Pivot, TabularRecord};
use crate::sanitize::sanitize_comment;
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::HashMap;

pub const STATUS_COLUMNS: [&str; 3] = ["Not started", "In progress", "Completed"];

const NO_BUCKET: &str = "(no bucket)";

#[derive(Args, Debug)]
pub struct PlannerExportArgs {
    /// Plan id to export (repeatable)
    #[arg(long = "plan", required_unless_present = "group")]
    pub plans: Vec<String>,

    /// Export every plan owned by this Microsoft 365 group
    #[arg(long)]
    pub group: Option<String>,

    #[command(flatten)]
    pub export: ExportOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChecklistEntry {
    pub title: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskComment {
    pub author: String,
    pub created: Option<DateTime<Utc>>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannerTaskRecord {
    pub plan_id: String,
    pub plan_title: String,
    pub task_id: String,
    pub title: String,
    pub bucket: String,
    pub percent_complete: u8,
    pub status: String,
    pub priority: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub due: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub completed_by: Option<String>,
    pub assignees: Vec<String>,
    pub description: Option<String>,
    pub checklist: Vec<ChecklistEntry>,
    pub comments: Vec<TaskComment>,
}

impl TabularRecord for PlannerTaskRecord {
    fn headers() -> &'static [&'static str] {
        &[
            "Plan",
            "Task ID",
            "Title",
            "Bucket",
            "Status",
            "% Complete",
            "Priority",
            "Start",
            "Due",
            "Created",
            "Completed",
            "Created By",
            "Completed By",
            "Assignees",
            "Description",
            "Checklist",
            "Comments",
        ]
    }

    fn row(&self) -> Vec<CellValue> {
        let checklist = self
            .checklist
            .iter()
            .map(|item| format!("[{}] {}", if item.checked { "x" } else { " " }, item.title))
            .collect::<Vec<_>>()
            .join("\n");

        let comments = self
            .comments
            .iter()
            .map(|c| match c.created {
                Some(at) => format!("{} ({}): {}", c.author, at.format("%Y-%m-%d %H:%M"), c.text),
                None => format!("{}: {}", c.author, c.text),
            })
            .collect::<String>();

        vec![
            self.plan_title.as_str().into(),
            self.task_id.as_str().into(),
            self.title.as_str().into(),
            self.bucket.as_str().into(),
            self.status.as_str().into(),
            CellValue::Number(f64::from(self.percent_complete)),
            self.priority.clone().into(),
            self.start.into(),
            self.due.into(),
            self.created.into(),
            self.completed.into(),
            self.created_by.clone().into(),
            self.completed_by.clone().into(),
            self.assignees.join("; ").into(),
            self.description.clone().into(),
            checklist.into(),
            comments.into(),
        ]
    }
}

/// Planner reports progress as 0, 50 or 100
pub fn task_status(percent_complete: u8) -> &'static str {
    match percent_complete {
        0 => STATUS_COLUMNS[0],
        100.. => STATUS_COLUMNS[2],
        _ => STATUS_COLUMNS[1],
    }
}

/// Planner stores priority as 0-10 and shows four labels
pub fn priority_label(priority: u8) -> &'static str {
    match priority {
        0..=1 => "Urgent",
        2..=4 => "Important",
        5..=7 => "Medium",
        _ => "Low",
    }
}

/// Result of exporting a set of plans
#[derive(Debug, Default)]
pub struct PlannerExport {
    pub records: Vec<PlannerTaskRecord>,
    pub exported_plans: usize,
    /// `(plan id, error)` for each plan that was skipped
    pub failed_plans: Vec<(String, String)>,
}

/// Plans named explicitly plus every plan of `group`
///
/// A plan id that cannot be fetched is logged and left out.
pub async fn collect_plans(
    client: &GraphClient,
    plan_ids: &[String],
    group: Option<&str>,
) -> Vec<PlannerPlan> {
    let mut plans = Vec::new();

    for plan_id in plan_ids {
        match planner::get_plan(client, plan_id).await {
            Ok(plan) => plans.push(plan),
            Err(e) => tracing::warn!(plan_id = %plan_id, "Skipping plan: {}", e),
        }
    }

    if let Some(group_id) = group {
        let group_plans = planner::list_group_plans(client, group_id).await;
        if !group_plans.complete {
            tracing::warn!(group_id, "Group plan listing is incomplete");
        }
        for plan in group_plans.items {
            if !plans.iter().any(|p| p.id == plan.id) {
                plans.push(plan);
            }
        }
    }

    plans
}

async fn task_comments(
    client: &GraphClient,
    group_id: Option<&str>,
    task: &PlannerTask,
) -> Vec<TaskComment> {
    let (Some(group_id), Some(thread_id)) = (group_id, task.conversation_thread_id.as_deref())
    else {
        return Vec::new();
    };

    let posts = planner::list_thread_posts(client, group_id, thread_id).await;
    posts
        .items
        .iter()
        .filter_map(|post| {
            let content = post.body.as_ref().map(|b| b.content.as_str()).unwrap_or("");
            let text = sanitize_comment(content);
            if text.trim().is_empty() {
                return None;
            }
            Some(TaskComment {
                author: post.author().unwrap_or(FORMER_MEMBER).to_string(),
                created: post.created_date_time,
                text,
            })
        })
        .collect()
}

/// Build the records for every task of one plan
///
/// Listings that stop after some pages keep what they collected. A task
/// listing with no pages at all, or a failed task details request, fails the
/// whole plan.
pub async fn export_plan<L: IdentityLookup>(
    client: &GraphClient,
    resolver: &mut UserResolver<L>,
    plan: &PlannerPlan,
) -> Result<Vec<PlannerTaskRecord>> {
    let buckets: HashMap<String, String> = planner::list_plan_buckets(client, &plan.id)
        .await
        .items
        .into_iter()
        .map(|b| (b.id, b.name))
        .collect();

    let tasks = planner::list_plan_tasks(client, &plan.id).await;
    if tasks.pages == 0 {
        return Err(Exp365Error::GraphApiError(format!(
            "Could not list tasks of plan '{}'",
            plan.title
        )));
    }
    if !tasks.complete {
        tracing::warn!(plan_id = %plan.id, tasks = tasks.len(), "Task listing is incomplete");
    }

    let group_id = plan.group_id();
    let mut records = Vec::with_capacity(tasks.len());

    for task in &tasks.items {
        let details = planner::get_task_details(client, &task.id).await?;

        let assignees = resolver.resolve_many(task.assignee_ids()).await;
        let created_by = match task.created_by.as_ref().and_then(|s| s.user_id()) {
            Some(id) => Some(resolver.resolve(id).await),
            None => None,
        };
        let completed_by = match task.completed_by.as_ref().and_then(|s| s.user_id()) {
            Some(id) => Some(resolver.resolve(id).await),
            None => None,
        };

        let bucket = task
            .bucket_id
            .as_ref()
            .and_then(|id| buckets.get(id))
            .cloned()
            .unwrap_or_else(|| NO_BUCKET.to_string());

        let comments = task_comments(client, group_id, task).await;

        records.push(PlannerTaskRecord {
            plan_id: plan.id.clone(),
            plan_title: plan.title.clone(),
            task_id: task.id.clone(),
            title: task.title.clone(),
            bucket,
            percent_complete: task.percent_complete,
            status: task_status(task.percent_complete).to_string(),
            priority: task.priority.map(|p| priority_label(p).to_string()),
            start: task.start_date_time,
            due: task.due_date_time,
            created: task.created_date_time,
            completed: task.completed_date_time,
            created_by,
            completed_by,
            assignees,
            description: details
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty())
                .map(str::to_string),
            checklist: details
                .ordered_checklist()
                .into_iter()
                .map(|item| ChecklistEntry {
                    title: item.title.clone(),
                    checked: item.is_checked,
                })
                .collect(),
            comments,
        });
    }

    tracing::debug!(plan_id = %plan.id, tasks = records.len(), "Plan exported");
    Ok(records)
}

/// Export plans in order; a plan that fails is logged and the next one runs
pub async fn export_plans<L: IdentityLookup>(
    client: &GraphClient,
    resolver: &mut UserResolver<L>,
    plans: &[PlannerPlan],
    bar: &ProgressBar,
) -> PlannerExport {
    let mut export = PlannerExport::default();

    for plan in plans {
        bar.set_message(plan.title.clone());

        match export_plan(client, resolver, plan).await {
            Ok(records) => {
                export.records.extend(records);
                export.exported_plans += 1;
            }
            Err(e) => {
                tracing::warn!(plan_id = %plan.id, "Plan export failed, continuing: {}", e);
                export.failed_plans.push((plan.id.clone(), e.to_string()));
            }
        }

        bar.inc(1);
    }

    export
}

/// Tasks per bucket by status
pub fn status_pivot(records: &[PlannerTaskRecord]) -> Pivot {
    Pivot::from_pairs(
        "Bucket",
        &STATUS_COLUMNS,
        records
            .iter()
            .map(|r| (r.bucket.clone(), r.status.clone())),
    )
}

pub async fn export(args: PlannerExportArgs) -> Result<()> {
    let ctx = args.export.connect().await?;

    println!(
        "{} Exporting Planner tasks from {}",
        "→".cyan(),
        ctx.tenant_name.bold()
    );

    let spinner = progress::create_spinner("Loading plans...");
    let plans = collect_plans(&ctx.client, &args.plans, args.group.as_deref()).await;
    if plans.is_empty() {
        progress::finish_spinner_error(&spinner, "No plans found");
        return Ok(());
    }
    progress::finish_spinner_success(&spinner, &format!("Found {} plan(s)", plans.len()));

    let bar = progress::create_progress_bar(plans.len() as u64, "Exporting plans");
    let mut resolver = UserResolver::new(&ctx.client);
    let result = export_plans(&ctx.client, &mut resolver, &plans, &bar).await;
    progress::finish_progress_success(
        &bar,
        &format!(
            "{} task(s) from {} plan(s)",
            result.records.len(),
            result.exported_plans
        ),
    );
    tracing::debug!(users = resolver.len(), lookups = resolver.lookups(), "Identity cache");

    let pivot = status_pivot(&result.records);
    let mut chart = ChartPage::from_pivot("Planner Tasks", &ctx.tenant_name, &pivot);
    chart.summary = vec![
        ("Tasks".to_string(), result.records.len().to_string()),
        ("Plans".to_string(), result.exported_plans.to_string()),
        ("Failed plans".to_string(), result.failed_plans.len().to_string()),
    ];

    let written = report::write_reports(
        &ctx.output_dir,
        "planner-tasks",
        ctx.format,
        &result.records,
        &pivot,
        &chart,
    )?;

    for path in &written {
        println!("{} Wrote {}", "✓".green(), path.display());
    }

    if !result.failed_plans.is_empty() {
        println!(
            "\n{} {} plan(s) could not be exported:",
            "!".yellow(),
            result.failed_plans.len()
        );
        for (plan_id, error) in &result.failed_plans {
            println!("  {} {}", plan_id.bold(), error.dimmed());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(bucket: &str, percent: u8) -> PlannerTaskRecord {
        PlannerTaskRecord {
            plan_id: "plan-1".into(),
            plan_title: "Launch".into(),
            task_id: format!("{}-{}", bucket, percent),
            title: "Task".into(),
            bucket: bucket.into(),
            percent_complete: percent,
            status: task_status(percent).into(),
            priority: Some(priority_label(5).into()),
            start: None,
            due: None,
            created: None,
            completed: None,
            created_by: None,
            completed_by: None,
            assignees: vec!["Alice".into(), "Former Member".into()],
            description: None,
            checklist: vec![
                ChecklistEntry {
                    title: "Draft".into(),
                    checked: true,
                },
                ChecklistEntry {
                    title: "Review".into(),
                    checked: false,
                },
            ],
            comments: vec![TaskComment {
                author: "Bob".into(),
                created: None,
                text: "Looks good\n".into(),
            }],
        }
    }

    #[test]
    fn test_task_status() {
        assert_eq!(task_status(0), "Not started");
        assert_eq!(task_status(50), "In progress");
        assert_eq!(task_status(100), "Completed");
    }

    #[test]
    fn test_priority_label() {
        assert_eq!(priority_label(1), "Urgent");
        assert_eq!(priority_label(3), "Important");
        assert_eq!(priority_label(5), "Medium");
        assert_eq!(priority_label(9), "Low");
    }

    #[test]
    fn test_row_matches_headers() {
        let row = record("To do", 50).row();
        assert_eq!(row.len(), PlannerTaskRecord::headers().len());
        assert_eq!(row[13], CellValue::Text("Alice; Former Member".into()));
        assert_eq!(row[15], CellValue::Text("[x] Draft\n[ ] Review".into()));
        assert_eq!(row[16], CellValue::Text("Bob: Looks good\n".into()));
    }

    #[test]
    fn test_status_pivot() {
        let pivot = status_pivot(&[record("To do", 0), record("To do", 100), record("Doing", 50)]);
        assert_eq!(pivot.columns, STATUS_COLUMNS);
        assert_eq!(
            pivot.rows,
            vec![
                ("Doing".to_string(), vec![0, 1, 0]),
                ("To do".to_string(), vec![1, 0, 1]),
            ]
        );
    }

    #[test]
    fn test_record_serializes_snake_case() {
        let value = serde_json::to_value(record("To do", 0)).unwrap();
        assert_eq!(value["plan_title"], "Launch");
        assert_eq!(value["checklist"][0]["checked"], true);
        assert_eq!(value["comments"][0]["author"], "Bob");
    }
}
