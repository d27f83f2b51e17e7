//! Outbound email content.

use crate::{settings::Organization, setups::OutgoingEmail};
use chrono::{DateTime, Utc};
use std::{fmt::Write as _, time::Duration};

/// The email carrying a one-time passcode.
pub fn otp_email(
    organization: &Organization,
    to: &str,
    code: &str,
    ttl: Duration,
) -> OutgoingEmail {
    let brand = &organization.brand_name;
    let minutes = ttl.as_secs().div_ceil(60).max(1);
    let unit = if minutes == 1 { "minute" } else { "minutes" };

    let text = format!(
        "Your {brand} verification code is {code}.\n\n\
         It expires in {minutes} {unit}. If you didn't request it, you can ignore this email.\n\n\
         {legal}\n{address}\n{website}\n",
        legal = organization.legal_name,
        address = organization.registered_address,
        website = organization.website_url,
    );

    let html = format!(
        "<!DOCTYPE html>\
         <html><body style=\"font-family:sans-serif;color:#111\">\
         <p>Your {brand} verification code is:</p>\
         <p style=\"font-size:28px;font-weight:bold;letter-spacing:4px\">{code}</p>\
         <p>It expires in {minutes} {unit}. If you didn't request it, you can ignore this email.</p>\
         <hr><p style=\"font-size:12px;color:#666\">{legal}<br>{address}<br>\
         <a href=\"{website}\">{website_text}</a></p>\
         </body></html>",
        brand = escape_html(brand),
        code = escape_html(code),
        legal = escape_html(&organization.legal_name),
        address = escape_html(&organization.registered_address),
        website = escape_html(&organization.website_url),
        website_text = escape_html(&organization.website_url),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("Your {brand} verification code"),
        text,
        html,
    }
}

/// The acknowledgement sent in response to a subject access request.
pub fn subject_access_notice(
    organization: &Organization,
    to: &str,
    received_at: DateTime<Utc>,
) -> OutgoingEmail {
    let Organization {
        brand_name,
        legal_name,
        registered_address,
        privacy_email,
        support_email,
        website_url,
        privacy_policy_url,
        response_days,
    } = organization;

    let received = received_at.format("%Y-%m-%d %H:%M UTC");

    let sections: [(&str, String); 6] = [
        (
            "Your request",
            format!(
                "We received a subject access request for {to} on {received}. \
                 You are entitled to confirmation of whether we process personal data about you, \
                 a copy of that data, and information about how it is processed."
            ),
        ),
        (
            "Data controller",
            format!("{legal_name} ({brand_name}), {registered_address}."),
        ),
        (
            "Verifying your identity",
            "To protect your data we only disclose it to the person it concerns. \
             We may contact you at this address to confirm your identity before responding. \
             Please do not send identity documents unless we ask for them."
                .to_string(),
        ),
        (
            "What you will receive",
            "The categories of personal data we hold, the purposes of processing, \
             the recipients it has been disclosed to, how long it is retained, \
             where it was obtained if not from you, and a copy of the data itself."
                .to_string(),
        ),
        (
            "Timeline",
            format!(
                "We will respond within {response_days} days of receiving your request. \
                 If the request is complex we may extend this period and will tell you why."
            ),
        ),
        (
            "Your other rights",
            format!(
                "You may also ask us to correct or erase your data, restrict or object to its processing, \
                 or receive it in a portable format. Our privacy policy is at {privacy_policy_url}. \
                 You have the right to lodge a complaint with your local data protection authority."
            ),
        ),
    ];

    let mut text = String::from("Subject Access Request Received\n\n");
    for (title, body) in &sections {
        let _ = write!(text, "{title}\n{body}\n\n");
    }
    let _ = write!(
        text,
        "Questions about this request: {privacy_email}\n\
         Anything else: {support_email}\n\n\
         {legal_name}\n{registered_address}\n{website_url}\n"
    );

    let mut html = String::from(
        "<!DOCTYPE html><html><body style=\"font-family:sans-serif;color:#111;max-width:640px\">\
         <h1 style=\"font-size:20px\">Subject Access Request Received</h1>",
    );
    for (title, body) in &sections {
        let _ = write!(
            html,
            "<h2 style=\"font-size:16px\">{}</h2><p>{}</p>",
            escape_html(title),
            escape_html(body)
        );
    }
    let _ = write!(
        html,
        "<p>Questions about this request: <a href=\"mailto:{privacy}\">{privacy}</a><br>\
         Anything else: <a href=\"mailto:{support}\">{support}</a></p>\
         <hr><p style=\"font-size:12px;color:#666\">{legal}<br>{address}<br>\
         <a href=\"{website}\">{website}</a></p></body></html>",
        privacy = escape_html(privacy_email),
        support = escape_html(support_email),
        legal = escape_html(legal_name),
        address = escape_html(registered_address),
        website = escape_html(website_url),
    );

    OutgoingEmail {
        to: to.to_string(),
        subject: format!("{brand_name}: your subject access request"),
        text,
        html,
    }
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}
