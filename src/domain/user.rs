use super::phone::PhoneNumber;
use crate::error::Error;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}$").expect("email pattern is valid")
});

const MIN_PASSWORD_LEN: usize = 6;
const MIN_NAME_LEN: usize = 2;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(default)]
    pub national_id: Option<String>,
    #[serde(default)]
    pub profile_completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

impl LoginCredentials {
    pub fn new(email: &str, password: &str) -> Result<Self, Error> {
        Ok(Self {
            email: validate_email(email)?,
            password: validate_password(password)?,
        })
    }
}

#[derive(Debug, Serialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCredentials {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub phone_number: PhoneNumber,
}

impl RegisterCredentials {
    pub fn new(
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
        phone_number: &str,
    ) -> Result<Self, Error> {
        Ok(Self {
            first_name: validate_name("First name", first_name)?,
            last_name: validate_name("Last name", last_name)?,
            email: validate_email(email)?,
            password: validate_password(password)?,
            phone_number: PhoneNumber::parse(phone_number)?,
        })
    }
}

/// Partial profile update for `PUT /user`; unset fields are left alone.
#[derive(Debug, Serialize, Default, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<PhoneNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub national_id: Option<String>,
}

fn validate_name(field: &str, value: &str) -> Result<String, Error> {
    let value = value.trim();
    if value.chars().count() < MIN_NAME_LEN {
        return Err(Error::ValidationError(format!(
            "{field} must be at least {MIN_NAME_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

fn validate_email(value: &str) -> Result<String, Error> {
    let value = value.trim();
    if !EMAIL_REGEX.is_match(value) {
        return Err(Error::ValidationError("Invalid email address".to_string()));
    }
    Ok(value.to_string())
}

fn validate_password(value: &str) -> Result<String, Error> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::ValidationError(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_credentials_normalize_phone() {
        let creds =
            RegisterCredentials::new("Jane", "Wanjiku", "jane@example.co.ke", "secret1", "0712345678")
                .unwrap();
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["phoneNumber"], "254712345678");
        assert_eq!(json["firstName"], "Jane");
    }

    #[test]
    fn test_credential_validation() {
        assert!(LoginCredentials::new("JANE@EXAMPLE.COM", "secret1").is_ok());
        assert!(matches!(
            LoginCredentials::new("not-an-email", "secret1"),
            Err(Error::ValidationError(_))
        ));
        assert!(matches!(
            LoginCredentials::new("jane@example.com", "12345"),
            Err(Error::ValidationError(_))
        ));
        assert!(matches!(
            RegisterCredentials::new("J", "Wanjiku", "jane@example.com", "secret1", "0712345678"),
            Err(Error::ValidationError(_))
        ));
    }

    #[test]
    fn test_profile_update_omits_unset_fields() {
        let update = ProfileUpdate {
            national_id: Some("12345678".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({ "nationalId": "12345678" })
        );
    }
}
