//! Built-in workflow templates.

use std::collections::HashMap;

use serde_json::json;

use crate::{
    engine::WorkflowTemplate,
    model::{ActionModel, StepModel, TriggerModel, WorkflowModel},
};

fn step(
    id: &str,
    name: &str,
    actions: Vec<ActionModel>,
    on_success: Option<&str>,
) -> StepModel {
    StepModel {
        id: id.to_string(),
        name: name.to_string(),
        actions,
        on_success: on_success.map(str::to_string),
        on_failure: None,
        parallel: false,
    }
}

fn trigger(
    trigger_type: &str,
    config: serde_json::Value,
) -> TriggerModel {
    TriggerModel {
        trigger_type: trigger_type.to_string(),
        config,
        conditions: Vec::new(),
    }
}

fn template(
    id: &str,
    category: &str,
    description: &str,
    workflow: WorkflowModel,
) -> WorkflowTemplate {
    WorkflowTemplate {
        id: id.to_string(),
        name: workflow.name.clone(),
        description: description.to_string(),
        category: category.to_string(),
        workflow,
    }
}

fn lead_nurturing() -> WorkflowTemplate {
    let workflow = WorkflowModel {
        name: "Lead Nurturing".to_string(),
        desc: "Welcome new leads, follow up after a few days and hand warm leads to sales".to_string(),
        tags: vec!["sales".to_string(), "email".to_string()],
        trigger: trigger("event", json!({"event": "lead.created"})),
        steps: vec![
            step(
                "welcome",
                "Send welcome email",
                vec![ActionModel::new("welcome_email", "send_email", json!({
                    "to": "{lead.email}",
                    "subject": "Welcome, {lead.name}!",
                    "body": "Thanks for your interest. Here is what we can do for you."
                }))],
                Some("wait"),
            ),
            step(
                "wait",
                "Wait three days",
                vec![ActionModel::new("pause", "delay", json!({"seconds": 259200})).with_retry_count(0).with_timeout_seconds(0)],
                Some("follow_up"),
            ),
            step(
                "follow_up",
                "Follow up",
                vec![
                    ActionModel::new("follow_up_email", "send_email", json!({
                        "to": "{lead.email}",
                        "subject": "Still interested, {lead.name}?",
                        "body": "Reply to this email to book a call."
                    })),
                    ActionModel::new("sales_task", "create_task", json!({
                        "title": "Call {lead.name}",
                        "description": "Lead {lead.email} received the nurturing sequence",
                        "priority": "medium",
                        "due_in_days": 2
                    })),
                ],
                None,
            ),
        ],
        ..Default::default()
    };
    template("lead_nurturing", "sales", "Nurture new leads with a timed email sequence", workflow)
}

fn weekly_report() -> WorkflowTemplate {
    let workflow = WorkflowModel {
        name: "Weekly Report".to_string(),
        desc: "Generate the weekly sales report every Monday morning and notify the owner".to_string(),
        tags: vec!["reporting".to_string()],
        variables: HashMap::from([("recipient".to_string(), json!("team@example.com"))]),
        trigger: trigger("schedule", json!({"cron": "0 8 * * MON"})),
        steps: vec![
            step(
                "generate",
                "Generate report",
                vec![ActionModel::new("report", "generate_report", json!({
                    "report_type": "sales",
                    "title": "Weekly sales report",
                    "period": "weekly"
                }))],
                Some("deliver"),
            ),
            step(
                "deliver",
                "Deliver report",
                vec![ActionModel::new("report_email", "send_email", json!({
                    "to": "{recipient}",
                    "subject": "{report.title}",
                    "body": "Report {report.report_id} is ready."
                }))],
                None,
            ),
        ],
        ..Default::default()
    };
    template("weekly_report", "reporting", "Build and send a sales report every week", workflow)
}

fn social_publishing() -> WorkflowTemplate {
    let mut publish = step(
        "publish",
        "Publish everywhere",
        vec![
            ActionModel::new("social", "social_post", json!({
                "platforms": ["twitter", "linkedin", "facebook"],
                "content": "{post.content}",
                "media_urls": []
            })),
            ActionModel::new("notify_author", "send_notification", json!({
                "user_id": "{post.author_id}",
                "title": "Post queued",
                "message": "Your post was queued for publishing",
                "type": "success"
            })),
        ],
        None,
    );
    publish.parallel = true;

    let workflow = WorkflowModel {
        name: "Social Publishing".to_string(),
        desc: "Queue an approved post on every social platform at once".to_string(),
        tags: vec!["marketing".to_string(), "social".to_string()],
        trigger: trigger("user_action", json!({"action": "post.approved"})),
        steps: vec![publish],
        ..Default::default()
    };
    template("social_publishing", "marketing", "Publish approved content to several platforms", workflow)
}

fn support_escalation() -> WorkflowTemplate {
    let mut triage = step(
        "triage",
        "Open escalation task",
        vec![ActionModel::new("escalation_task", "create_task", json!({
            "title": "Escalated ticket {ticket.id}",
            "description": "{ticket.subject}",
            "assignee": "{ticket.owner}",
            "priority": "urgent",
            "due_in_days": 0
        }))],
        Some("alert"),
    );
    triage.on_failure = Some("alert".to_string());

    let mut workflow = WorkflowModel {
        name: "Support Escalation".to_string(),
        desc: "Escalate urgent tickets to the support lead".to_string(),
        tags: vec!["support".to_string()],
        trigger: trigger("webhook", json!({"path": "/support/tickets"})),
        steps: vec![
            triage,
            step(
                "alert",
                "Alert the support lead",
                vec![ActionModel::new("alert_lead", "send_notification", json!({
                    "user_id": "{ticket.owner}",
                    "title": "Ticket {ticket.id} escalated",
                    "message": "{ticket.subject}",
                    "type": "warning"
                }))],
                None,
            ),
        ],
        ..Default::default()
    };
    workflow.trigger.conditions.push(crate::model::ConditionModel {
        field: "ticket.priority".to_string(),
        operator: "in".to_string(),
        value: Some(json!(["high", "urgent"])),
    });
    template("support_escalation", "support", "Escalate high priority tickets to a lead", workflow)
}

pub fn templates() -> Vec<WorkflowTemplate> {
    vec![lead_nurturing(), weekly_report(), social_publishing(), support_escalation()]
}
