//! Contact/shipping input sanitization for checkout.
//!
//! Strips markup from free-text fields and validates the structured ones
//! (email, Canadian postal code/province, phone). All field failures are
//! accumulated so the client gets the full picture in one response.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)on\w+\s*=\s*["'][^"']*["']"#).expect("valid regex"));
static JS_PROTOCOL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)javascript:").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("valid regex")
});
static POSTAL_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]\d[A-Z]\d[A-Z]\d$").expect("valid regex"));

const PROVINCES: [&str; 13] = [
    "AB", "BC", "MB", "NB", "NL", "NT", "NS", "NU", "ON", "PE", "QC", "SK", "YT",
];

/// Raw contact/shipping fields as submitted by the client.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutContactInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub street_address: Option<String>,
    #[serde(default)]
    pub address_line2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Sanitized, validated shipping info ready to freeze into an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingInfo {
    pub name: String,
    pub email: String,
    pub street_address: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub province: String,
    pub postal_code: String,
    pub country: String,
    pub phone: Option<String>,
}

/// Removes markup and dangerous fragments from a free-text field.
pub fn sanitize_text(input: &str, max_length: usize) -> String {
    let cleaned = HTML_TAG.replace_all(input.trim(), "");
    let cleaned = EVENT_HANDLER.replace_all(&cleaned, "");
    let cleaned = JS_PROTOCOL.replace_all(&cleaned, "");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ");
    cleaned.chars().take(max_length).collect::<String>()
}

/// Validates and normalizes an email address (lowercased, length-capped).
pub fn validate_email(email: &str) -> Result<String, String> {
    let sanitized: String = email.trim().to_lowercase().chars().take(254).collect();
    if sanitized.is_empty() {
        return Err("Email is required".to_string());
    }
    if !EMAIL.is_match(&sanitized) {
        return Err("Invalid email format".to_string());
    }
    Ok(sanitized)
}

/// Validates a Canadian postal code, normalizing to the `A1A 1A1` form.
pub fn validate_postal_code(postal_code: &str) -> Result<String, String> {
    let compact: String = postal_code
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .take(7)
        .collect();
    if compact.is_empty() {
        return Err("Postal code is required".to_string());
    }
    if !POSTAL_CODE.is_match(&compact) {
        return Err("Invalid Canadian postal code format (A1A 1A1)".to_string());
    }
    Ok(format!("{} {}", &compact[..3], &compact[3..]))
}

/// Validates a two-letter Canadian province code.
pub fn validate_province(province: &str) -> Result<String, String> {
    let sanitized = province.trim().to_ascii_uppercase();
    if sanitized.is_empty() {
        return Err("Province is required".to_string());
    }
    if !PROVINCES.contains(&sanitized.as_str()) {
        return Err("Invalid Canadian province".to_string());
    }
    Ok(sanitized)
}

/// Validates an optional phone number, formatting as `(XXX) XXX-XXXX`.
pub fn validate_phone(phone: &str) -> Result<Option<String>, String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Ok(None);
    }
    match digits.len() {
        10 => Ok(Some(format!(
            "({}) {}-{}",
            &digits[..3],
            &digits[3..6],
            &digits[6..]
        ))),
        11 if digits.starts_with('1') => Ok(Some(format!(
            "+1 ({}) {}-{}",
            &digits[1..4],
            &digits[4..7],
            &digits[7..]
        ))),
        _ => Err("Invalid phone number (10 digits required)".to_string()),
    }
}

/// Applies all sanitization rules to the checkout contact fields,
/// accumulating every field error rather than stopping at the first.
pub fn sanitize_checkout_info(
    input: &CheckoutContactInput,
) -> Result<ShippingInfo, BTreeMap<String, String>> {
    let mut errors = BTreeMap::new();

    let name = sanitize_text(input.name.as_deref().unwrap_or(""), 100);
    if name.is_empty() {
        errors.insert("name".to_string(), "Name is required".to_string());
    }

    let email = match validate_email(input.email.as_deref().unwrap_or("")) {
        Ok(email) => email,
        Err(msg) => {
            errors.insert("email".to_string(), msg);
            String::new()
        }
    };

    let street_address = sanitize_text(input.street_address.as_deref().unwrap_or(""), 200);
    if street_address.is_empty() {
        errors.insert(
            "street_address".to_string(),
            "Street address is required".to_string(),
        );
    }

    let address_line2 = {
        let line = sanitize_text(input.address_line2.as_deref().unwrap_or(""), 200);
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    };

    let city = sanitize_text(input.city.as_deref().unwrap_or(""), 100);
    if city.is_empty() {
        errors.insert("city".to_string(), "City is required".to_string());
    }

    let province = match validate_province(input.province.as_deref().unwrap_or("")) {
        Ok(province) => province,
        Err(msg) => {
            errors.insert("province".to_string(), msg);
            String::new()
        }
    };

    let postal_code = match validate_postal_code(input.postal_code.as_deref().unwrap_or("")) {
        Ok(code) => code,
        Err(msg) => {
            errors.insert("postal_code".to_string(), msg);
            String::new()
        }
    };

    let country = sanitize_text(input.country.as_deref().unwrap_or(""), 50);
    if country != "Canada" {
        errors.insert(
            "country".to_string(),
            "Only Canadian orders are accepted".to_string(),
        );
    }

    let phone = match validate_phone(input.phone.as_deref().unwrap_or("")) {
        Ok(phone) => phone,
        Err(msg) => {
            errors.insert("phone".to_string(), msg);
            None
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ShippingInfo {
        name,
        email,
        street_address,
        address_line2,
        city,
        province,
        postal_code,
        country,
        phone,
    })
}
