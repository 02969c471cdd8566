use crate::models::DocumentKind;

use super::OutgoingEmail;

pub fn welcome(to: &str, company: &str, password: &str, site_url: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Welcome to the client portal - your login details".to_string(),
        text: format!(
            "Hello {company},\n\n\
             We have created a client portal account for you.\n\n\
             Login: {to}\n\
             Password: {password}\n\n\
             Sign in here: {site_url}\n\n\
             Please change your password after the first login.\n"
        ),
    }
}

pub fn password_reset(to: &str, link: &str, valid_minutes: i64) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_string(),
        subject: "Password reset".to_string(),
        text: format!(
            "Use this link to reset your password: {link}\n\
             The link is valid for {valid_minutes} minutes and can be used once.\n\n\
             If you did not ask for a reset you can ignore this message.\n"
        ),
    }
}

pub fn new_document(
    to: &str,
    company: &str,
    kind: DocumentKind,
    title: &str,
    site_url: &str,
) -> OutgoingEmail {
    let (subject, label) = match kind {
        DocumentKind::Invoice => (format!("New invoice: {title}"), "Invoice"),
        DocumentKind::Contract => (format!("New document: {title}"), "Contract/document"),
    };

    OutgoingEmail {
        to: to.to_string(),
        subject,
        text: format!(
            "Hello {company},\n\n\
             A new document is available in your client portal.\n\
             Type: {label}\n\
             Title: {title}\n\n\
             Sign in to download it: {site_url}\n"
        ),
    }
}

pub struct LeadEmail<'a> {
    pub summary: &'a str,
    pub client_block: &'a str,
    pub next_steps: &'a [String],
    pub attribution: &'a [(String, String)],
    pub transcript: &'a str,
}

pub fn lead_notification(to: &str, lead: &LeadEmail<'_>) -> OutgoingEmail {
    let next_steps = if lead.next_steps.is_empty() {
        "-".to_string()
    } else {
        lead.next_steps
            .iter()
            .enumerate()
            .map(|(idx, step)| format!("{}. {step}", idx + 1))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let attribution = if lead.attribution.is_empty() {
        "-".to_string()
    } else {
        lead.attribution
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    OutgoingEmail {
        to: to.to_string(),
        subject: "New chatbot lead".to_string(),
        text: format!(
            "New lead from the website chatbot\n\n\
             === CONVERSATION SUMMARY ===\n{}\n\n\
             === CLIENT DATA ===\n{}\n\n\
             === SUGGESTED NEXT STEPS ===\n{next_steps}\n\n\
             === CAMPAIGN ===\n{attribution}\n\n\
             === FULL TRANSCRIPT ===\n{}",
            lead.summary, lead.client_block, lead.transcript
        ),
    }
}
