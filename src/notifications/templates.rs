//! Email bodies for reminders, digests and workflow events.
//!
//! Every message carries an HTML and a plain-text part built from the same
//! data; user-supplied text is escaped before it reaches the HTML part.

use chrono::NaiveDate;
use serde::Serialize;

use crate::shared::utils::html_escape;

use super::events::EventSubject;
use super::mailer::OutgoingEmail;
use super::types::{DueItem, EntityType, Recipient, ReminderType};

const DIGEST_WEEK_DAYS: i64 = 7;

pub fn item_link(base_url: &str, entity_type: EntityType, entity_id: uuid::Uuid) -> String {
    let base = base_url.trim_end_matches('/');
    match entity_type {
        EntityType::Assessment => format!("{base}/api/assessments/{entity_id}"),
        EntityType::RiskAction => format!("{base}/api/risk-actions/{entity_id}"),
        EntityType::Digest => format!("{base}/api/reminders/logs"),
    }
}

fn wrap_html(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><title>{}</title></head>
<body style="font-family: sans-serif; color: #222;">
{}
<p style="color: #888; font-size: 12px;">You receive this message because reminders are enabled for your account.</p>
</body></html>"#,
        html_escape(title),
        body
    )
}

fn due_phrase(days_until_due: i64) -> String {
    match days_until_due {
        0 => "is due today".to_string(),
        1 => "is due tomorrow".to_string(),
        d if d > 0 => format!("is due in {d} days"),
        -1 => "is 1 day overdue".to_string(),
        d => format!("is {} days overdue", -d),
    }
}

pub fn reminder_email(
    recipient: &Recipient,
    item: &DueItem,
    reminder_type: ReminderType,
    days_until_due: i64,
    base_url: &str,
) -> OutgoingEmail {
    let prefix = match reminder_type {
        ReminderType::Overdue => "Overdue",
        ReminderType::DueToday => "Due today",
        _ => "Reminder",
    };
    let subject = format!("[{prefix}] {}: {}", item.entity_type.label(), item.title);
    let phrase = due_phrase(days_until_due);
    let link = item_link(base_url, item.entity_type, item.entity_id);

    let text = format!(
        "Hello {},\n\n{} \"{}\" {} (due {}, status {}).\n\nOpen it at {}\n",
        recipient.greeting_name(),
        item.entity_type.label(),
        item.title,
        phrase,
        item.due_date,
        item.status,
        link
    );
    let body = format!(
        r#"<p>Hello {},</p>
<p>{} <strong>{}</strong> {} (due {}, status <code>{}</code>).</p>
<p><a href="{}">Open it</a></p>"#,
        html_escape(recipient.greeting_name()),
        item.entity_type.label(),
        html_escape(&item.title),
        phrase,
        item.due_date,
        html_escape(&item.status),
        html_escape(&link)
    );

    OutgoingEmail {
        to: recipient.email.clone(),
        html: wrap_html(&subject, &body),
        subject,
        text,
    }
}

/// Items of one user grouped for the weekly digest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DigestContent {
    pub overdue: Vec<DueItem>,
    pub due_this_week: Vec<DueItem>,
    pub later: Vec<DueItem>,
}

impl DigestContent {
    pub fn from_items(items: Vec<DueItem>, today: NaiveDate) -> Self {
        let mut digest = Self::default();
        for item in items {
            match item.days_until_due(today) {
                d if d < 0 => digest.overdue.push(item),
                d if d <= DIGEST_WEEK_DAYS => digest.due_this_week.push(item),
                _ => digest.later.push(item),
            }
        }
        digest
    }

    pub fn total(&self) -> usize {
        self.overdue.len() + self.due_this_week.len() + self.later.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

fn digest_section(
    heading: &str,
    items: &[DueItem],
    base_url: &str,
    html: &mut String,
    text: &mut String,
) {
    if items.is_empty() {
        return;
    }
    html.push_str(&format!("<h3>{} ({})</h3>\n<ul>\n", heading, items.len()));
    text.push_str(&format!("{} ({})\n", heading, items.len()));
    for item in items {
        let link = item_link(base_url, item.entity_type, item.entity_id);
        html.push_str(&format!(
            r#"<li>{}: <a href="{}">{}</a> (due {}, {})</li>"#,
            item.entity_type.label(),
            html_escape(&link),
            html_escape(&item.title),
            item.due_date,
            html_escape(&item.status)
        ));
        html.push('\n');
        text.push_str(&format!(
            "  - {}: {} (due {}, {})\n",
            item.entity_type.label(),
            item.title,
            item.due_date,
            item.status
        ));
    }
    html.push_str("</ul>\n");
    text.push('\n');
}

pub fn digest_email(
    recipient: &Recipient,
    digest: &DigestContent,
    week_of: NaiveDate,
    base_url: &str,
) -> OutgoingEmail {
    let subject = format!(
        "Weekly GRC digest for {}: {} open items, {} overdue",
        week_of,
        digest.total(),
        digest.overdue.len()
    );

    let mut body = format!(
        "<p>Hello {},</p>\n<p>Here is your summary for the week of {}.</p>\n",
        html_escape(recipient.greeting_name()),
        week_of
    );
    let mut text = format!(
        "Hello {},\n\nHere is your summary for the week of {}.\n\n",
        recipient.greeting_name(),
        week_of
    );
    digest_section("Overdue", &digest.overdue, base_url, &mut body, &mut text);
    digest_section(
        "Due this week",
        &digest.due_this_week,
        base_url,
        &mut body,
        &mut text,
    );
    digest_section("Coming up", &digest.later, base_url, &mut body, &mut text);

    OutgoingEmail {
        to: recipient.email.clone(),
        html: wrap_html(&subject, &body),
        subject,
        text,
    }
}

pub fn assignment_email(
    recipient: &Recipient,
    subject: &EventSubject,
    base_url: &str,
) -> OutgoingEmail {
    let title = format!(
        "{} assigned to you: {}",
        subject.entity_type.label(),
        subject.title
    );
    let due = subject
        .due_date
        .map(|d| format!(" It is due {d}."))
        .unwrap_or_default();
    let link = item_link(base_url, subject.entity_type, subject.entity_id);

    let text = format!(
        "Hello {},\n\n{} \"{}\" was assigned to you.{}\n\nOpen it at {}\n",
        recipient.greeting_name(),
        subject.entity_type.label(),
        subject.title,
        due,
        link
    );
    let body = format!(
        r#"<p>Hello {},</p>
<p>{} <strong>{}</strong> was assigned to you.{}</p>
<p><a href="{}">Open it</a></p>"#,
        html_escape(recipient.greeting_name()),
        subject.entity_type.label(),
        html_escape(&subject.title),
        due,
        html_escape(&link)
    );

    OutgoingEmail {
        to: recipient.email.clone(),
        html: wrap_html(&title, &body),
        subject: title,
        text,
    }
}

pub fn status_change_email(
    recipient: &Recipient,
    subject: &EventSubject,
    from: &str,
    to: &str,
    base_url: &str,
) -> OutgoingEmail {
    let title = format!(
        "{} {} moved to {}",
        subject.entity_type.label(),
        subject.title,
        to
    );
    let link = item_link(base_url, subject.entity_type, subject.entity_id);

    let text = format!(
        "Hello {},\n\n{} \"{}\" changed status from {} to {}.\n\nOpen it at {}\n",
        recipient.greeting_name(),
        subject.entity_type.label(),
        subject.title,
        from,
        to,
        link
    );
    let body = format!(
        r#"<p>Hello {},</p>
<p>{} <strong>{}</strong> changed status from <code>{}</code> to <code>{}</code>.</p>
<p><a href="{}">Open it</a></p>"#,
        html_escape(recipient.greeting_name()),
        subject.entity_type.label(),
        html_escape(&subject.title),
        html_escape(from),
        html_escape(to),
        html_escape(&link)
    );

    OutgoingEmail {
        to: recipient.email.clone(),
        html: wrap_html(&title, &body),
        subject: title,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn recipient() -> Recipient {
        Recipient {
            user_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            email: "ana@example.com".into(),
            display_name: Some("Ana".into()),
        }
    }

    fn item(title: &str, due: NaiveDate) -> DueItem {
        DueItem {
            entity_type: EntityType::Assessment,
            entity_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            title: title.into(),
            status: "in_progress".into(),
            due_date: due,
        }
    }

    #[test]
    fn test_reminder_escapes_titles() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let email = reminder_email(
            &recipient(),
            &item("<script>x</script>", today),
            ReminderType::DueToday,
            0,
            "http://grc.local/",
        );
        assert!(email.subject.starts_with("[Due today]"));
        assert!(!email.html.contains("<script>"));
        assert!(email.text.contains("is due today"));
        assert!(email.text.contains("http://grc.local/api/assessments/"));
    }

    #[test]
    fn test_digest_groups_by_due_date() {
        let today = NaiveDate::from_ymd_opt(2026, 5, 4).unwrap();
        let digest = DigestContent::from_items(
            vec![
                item("late", today - chrono::Duration::days(2)),
                item("soon", today + chrono::Duration::days(3)),
                item("later", today + chrono::Duration::days(30)),
            ],
            today,
        );
        assert_eq!(digest.overdue.len(), 1);
        assert_eq!(digest.due_this_week.len(), 1);
        assert_eq!(digest.later.len(), 1);

        let email = digest_email(&recipient(), &digest, today, "http://grc.local");
        assert!(email.subject.contains("3 open items, 1 overdue"));
        assert!(email.text.contains("Coming up (1)"));
    }

    #[test]
    fn test_due_phrases() {
        assert_eq!(due_phrase(3), "is due in 3 days");
        assert_eq!(due_phrase(-4), "is 4 days overdue");
    }
}
