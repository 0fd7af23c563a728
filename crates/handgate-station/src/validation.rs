//! Input validation for registry records
//!
//! Every validator returns the normalized value (trimmed, and uppercased
//! where the format is case-insensitive) so callers store exactly what was
//! checked.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, StationError};

const EMAIL_MAX_LEN: usize = 254;
const NAME_MIN_LEN: usize = 2;
const NAME_MAX_LEN: usize = 60;

/// Ecuador has 24 provinces
const PROVINCE_COUNT: u32 = 24;

struct Patterns {
    email: Regex,
    name: Regex,
    banner: Regex,
}

impl Patterns {
    fn new() -> Self {
        Self {
            email: Regex::new(
                r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)+$",
            )
            .expect("valid email regex"),
            name: Regex::new(
                r"^[A-Za-zÁÉÍÓÚÜÑáéíóúüñ]+(?:[ '\-][A-Za-zÁÉÍÓÚÜÑáéíóúüñ]+)*$",
            )
            .expect("valid name regex"),
            banner: Regex::new(r"^A\d{8}$").expect("valid banner id regex"),
        }
    }
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(Patterns::new)
}

/// Ecuadorian national id (cédula): 10 digits, a valid province, a third
/// digit below 6 and a matching check digit
pub fn validate_national_id(value: &str) -> Result<String> {
    let id = value.trim();
    let digits: Vec<u32> = id.chars().filter_map(|c| c.to_digit(10)).collect();
    if id.len() != 10 || digits.len() != 10 {
        return Err(invalid("national id", id, "must be exactly 10 digits"));
    }

    let province = digits[0] * 10 + digits[1];
    if !(1..=PROVINCE_COUNT).contains(&province) {
        return Err(invalid("national id", id, "unknown province code"));
    }
    if digits[2] > 5 {
        return Err(invalid("national id", id, "third digit must be 0-5"));
    }

    let sum: u32 = digits[..9]
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let product = if i % 2 == 0 { d * 2 } else { *d };
            if product >= 10 {
                product - 9
            } else {
                product
            }
        })
        .sum();
    let check = (10 - sum % 10) % 10;
    if check != digits[9] {
        return Err(invalid("national id", id, "check digit mismatch"));
    }
    Ok(id.to_string())
}

/// Email address, at most 254 characters
pub fn validate_email(value: &str) -> Result<String> {
    let email = value.trim();
    if email.len() > EMAIL_MAX_LEN || !patterns().email.is_match(email) {
        return Err(invalid("email", email, "not a valid address"));
    }
    Ok(email.to_string())
}

/// Person name: letters (including Spanish accents), single spaces,
/// apostrophes or hyphens between words, 2 to 60 characters
pub fn validate_name(value: &str) -> Result<String> {
    let name = value.trim();
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(invalid(
            "name",
            name,
            &format!("must be {}-{} characters", NAME_MIN_LEN, NAME_MAX_LEN),
        ));
    }
    if !patterns().name.is_match(name) {
        return Err(invalid("name", name, "contains invalid characters"));
    }
    Ok(name.to_string())
}

/// Institutional banner id: `A` followed by 8 digits
pub fn validate_banner_id(value: &str) -> Result<String> {
    let banner = value.trim().to_uppercase();
    if !patterns().banner.is_match(&banner) {
        return Err(invalid("banner id", &banner, "expected A followed by 8 digits"));
    }
    Ok(banner)
}

fn invalid(field: &str, value: &str, reason: &str) -> StationError {
    StationError::Validation(format!("{} {:?}: {}", field, value, reason))
}
