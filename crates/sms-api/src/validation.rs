//! Submission validation
//!
//! Pure function over the request: collects every violation instead of
//! stopping at the first, so clients see the full list in one response.

use regex::Regex;
use std::sync::OnceLock;

use crate::dto::SendMessageRequest;

/// Standard single-segment SMS limit.
pub const MAX_CONTENT_LENGTH: usize = 160;

/// Optional `+`, first digit 1-9, 7-15 digits total (E.164 shape).
fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[1-9]\d{6,14}$").expect("address pattern is valid"))
}

pub fn validate_submission(request: &SendMessageRequest) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    check_address(&request.source_address, "Source", &mut errors);
    check_address(&request.destination_address, "Destination", &mut errors);

    if request.content.trim().is_empty() {
        errors.push("Message content is required".to_string());
    } else if request.content.chars().count() > MAX_CONTENT_LENGTH {
        errors.push(format!(
            "Message content cannot exceed {MAX_CONTENT_LENGTH} characters"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(address: &str, field: &str, errors: &mut Vec<String>) {
    if address.trim().is_empty() {
        errors.push(format!("{field} address is required"));
    } else if !address_pattern().is_match(address) {
        errors.push(format!(
            "Invalid {} address format. Use international format (e.g., +306912345678)",
            field.to_lowercase()
        ));
    }
}
