use crate::registration::NotificationKind;

const FALLBACK_LABEL: &str = "Momentum Sports";
const SIGNATURE: &str = "<p>Kind regards,<br>The Organizing Team<br><strong>Momentum Sports Africa</strong></p>";

/// A rendered e-mail ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub recipient: String,
    pub subject: String,
    pub html_body: String,
}

/// `basketball` becomes `Basketball`; a missing value becomes the brand name.
pub fn event_label(event_type: Option<&str>) -> String {
    let normalized = match event_type.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value.to_lowercase(),
        None => return FALLBACK_LABEL.to_string(),
    };
    let mut chars = normalized.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => FALLBACK_LABEL.to_string(),
    }
}

pub fn compose(
    kind: NotificationKind,
    recipient: &str,
    name: Option<&str>,
    event_type: Option<&str>,
) -> OutgoingMessage {
    let label = event_label(event_type);
    let default_name = match kind {
        NotificationKind::Acceptance => "Applicant",
        NotificationKind::Rejection => "Athlete",
    };
    let name = name
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default_name);
    let name = escape_html(name);
    let label_html = escape_html(&label);

    let (subject, html_body) = match kind {
        NotificationKind::Acceptance => (
            format!("Momentum Sports {label} - Acceptance"),
            acceptance_body(&name, &label_html),
        ),
        NotificationKind::Rejection => (
            format!("Momentum Sports {label} - Update"),
            rejection_body(&name, &label_html),
        ),
    };

    OutgoingMessage {
        recipient: recipient.trim().to_string(),
        subject,
        html_body,
    }
}

fn acceptance_body(name: &str, label: &str) -> String {
    format!(
        "<p>Dear {name},</p>\
<p>We are pleased to inform you that your application has been successfully reviewed, and you have been \
accepted to participate in the upcoming evaluation event ({label}).</p>\
<p>This acceptance confirms that you have met the initial application requirements and are eligible to \
take part in the official evaluation process.</p>\
<p><strong>What Happens Next</strong></p>\
<p>You will shortly receive a follow-up communication containing:</p>\
<ul>\
<li>Payment instructions and deadlines (where applicable)</li>\
<li>Event dates and venue details</li>\
<li>Reporting time and session allocation</li>\
<li>Required documentation and equipment</li>\
</ul>\
<p>Please note that participation in the event does not guarantee progression or selection. All outcomes \
are determined strictly on performance and evaluation standards during the assessment.</p>\
<p><strong>Important Notice</strong></p>\
<p>Your place is provisionally reserved and will only be fully confirmed upon:</p>\
<ul>\
<li>Completion of any required payment</li>\
<li>Submission of requested documents within the specified timelines</li>\
</ul>\
<p>Failure to complete these steps may result in forfeiture of your slot.</p>\
<p>We commend you for taking this important step in your sporting journey and look forward to seeing you \
perform in a professional, competitive environment.</p>\
<p>Should you have any questions, please await the next communication or contact us via the official \
channels provided.</p>\
{SIGNATURE}"
    )
}

fn rejection_body(name: &str, label: &str) -> String {
    format!(
        "<p>Hi {name},</p>\
<p>Thank you for applying to the {label} Talent Identification Camp. After careful review, we are unable \
to offer you a spot at this time.</p>\
<p>We appreciate the effort you put into your application and encourage you to keep developing your game. \
We hope to see you apply for future Momentum Sports events and opportunities.</p>\
{SIGNATURE}"
    )
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_title_cased_with_brand_fallback() {
        assert_eq!(event_label(Some(" BASKETBALL ")), "Basketball");
        assert_eq!(event_label(Some("football")), "Football");
        assert_eq!(event_label(Some("  ")), "Momentum Sports");
        assert_eq!(event_label(None), "Momentum Sports");
    }

    #[test]
    fn acceptance_uses_defaults_and_subject() {
        let message = compose(NotificationKind::Acceptance, " ada@example.org ", None, Some("football"));
        assert_eq!(message.recipient, "ada@example.org");
        assert_eq!(message.subject, "Momentum Sports Football - Acceptance");
        assert!(message.html_body.starts_with("<p>Dear Applicant,</p>"));
        assert!(message.html_body.contains("evaluation event (Football)"));
        assert!(message.html_body.ends_with("Momentum Sports Africa</strong></p>"));
    }

    #[test]
    fn rejection_escapes_recipient_name() {
        let message = compose(
            NotificationKind::Rejection,
            "parent@example.org",
            Some("<b>Tolu</b> & co"),
            None,
        );
        assert_eq!(message.subject, "Momentum Sports Momentum Sports - Update");
        assert!(message
            .html_body
            .starts_with("<p>Hi &lt;b&gt;Tolu&lt;/b&gt; &amp; co,</p>"));

        let fallback = compose(NotificationKind::Rejection, "x@example.org", Some(" "), None);
        assert!(fallback.html_body.starts_with("<p>Hi Athlete,</p>"));
    }
}
