//! Email identifiers, syntax checks and the corporate email classifier

use std::{borrow::Cow, collections::HashSet};
use validator::ValidationError;

/// Free and personal mail providers that are not accepted as business emails.
pub const DEFAULT_PERSONAL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "yahoo.com",
    "yahoo.co.uk",
    "yahoo.co.in",
    "yahoo.fr",
    "yahoo.de",
    "ymail.com",
    "rocketmail.com",
    "hotmail.com",
    "hotmail.co.uk",
    "hotmail.fr",
    "outlook.com",
    "live.com",
    "msn.com",
    "aol.com",
    "icloud.com",
    "me.com",
    "mac.com",
    "protonmail.com",
    "proton.me",
    "pm.me",
    "gmx.com",
    "gmx.de",
    "gmx.net",
    "web.de",
    "mail.com",
    "email.com",
    "yandex.com",
    "yandex.ru",
    "mail.ru",
    "zoho.com",
    "tutanota.com",
    "fastmail.com",
    "hey.com",
    "qq.com",
    "163.com",
    "126.com",
    "rediffmail.com",
    "comcast.net",
    "verizon.net",
    "att.net",
];

/// Normalize an email so it can key rate limits and passcode records.
pub fn normalize_identifier(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic syntactic email check.
pub fn is_valid_email(email: &str) -> bool {
    validator::validate_email(email.trim())
}

/// [is_valid_email] as a `validator` custom rule.
pub fn validate_email_address(email: &str) -> Result<(), ValidationError> {
    if is_valid_email(email) {
        Ok(())
    } else {
        let mut err = ValidationError::new("email");
        err.message = Some(Cow::Borrowed("Please provide a valid email address."));
        Err(err)
    }
}

/// Checks that a phone number consists of an optional leading `+` and 7 to 15 digits,
/// ignoring common separators.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let compact: String = phone
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let digits = compact.strip_prefix('+').unwrap_or(&compact);

    if (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some(Cow::Borrowed("Please provide a valid phone number."));
        Err(err)
    }
}

/// The outcome of classifying an email address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmailVerdict {
    /// The domain isn't a known free/personal provider
    Corporate,
    /// The domain belongs to a free/personal provider (or there's no domain)
    Personal,
}

/// Rejects email addresses hosted by free/personal mail providers.
#[derive(Clone, Debug)]
pub struct EmailClassifier {
    personal_domains: HashSet<String>,
}

impl Default for EmailClassifier {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

impl EmailClassifier {
    /// The default provider list, extended with `extra_domains`.
    pub fn new<I, S>(extra_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let personal_domains = DEFAULT_PERSONAL_DOMAINS
            .iter()
            .map(|domain| domain.to_string())
            .chain(
                extra_domains
                    .into_iter()
                    .map(|domain| domain.as_ref().trim().to_lowercase()),
            )
            .filter(|domain| !domain.is_empty())
            .collect();

        Self { personal_domains }
    }

    /// Classify an email address. Expects the address to be syntactically valid already.
    pub fn classify(&self, email: &str) -> EmailVerdict {
        let email = normalize_identifier(email);

        let Some((_, domain)) = email.rsplit_once('@') else {
            return EmailVerdict::Personal;
        };

        if domain.is_empty() || self.personal_domains.contains(domain) {
            tracing::debug!(domain, "Classified email domain as personal");
            EmailVerdict::Personal
        } else {
            EmailVerdict::Corporate
        }
    }

    /// Whether the email belongs to a business domain
    pub fn is_corporate(&self, email: &str) -> bool {
        self.classify(email) == EmailVerdict::Corporate
    }
}
