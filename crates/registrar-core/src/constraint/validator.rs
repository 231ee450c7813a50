//! Payload validation for client-supplied rows.

use thiserror::Error;
use uuid::Uuid;

use crate::model::{CourseInput, StudentInput};

/// Minimum length of names, codes and usernames.
pub const MIN_NAME_LEN: usize = 2;

/// Shortest course duration in months.
pub const MIN_COURSE_DURATION: i64 = 1;

/// Longest course duration in months.
pub const MAX_COURSE_DURATION: i64 = 120;

/// Validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field was omitted.
    #[error("{field} is required")]
    Missing {
        /// Field name.
        field: &'static str,
    },

    /// A text field is shorter than allowed.
    #[error("{field} must be at least {min} characters")]
    TooShort {
        /// Field name.
        field: &'static str,
        /// Minimum length in characters.
        min: usize,
    },

    /// A number is outside its range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Inclusive lower bound.
        min: i64,
        /// Inclusive upper bound.
        max: i64,
        /// Supplied value.
        value: i64,
    },

    /// The email address is malformed.
    #[error("{field} is not a valid email address")]
    InvalidEmail {
        /// Field name.
        field: &'static str,
    },
}

/// A course payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCourse {
    pub name: String,
    /// Uppercased code.
    pub code: String,
    pub duration: i32,
}

/// A student payload that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidStudent {
    pub name: String,
    /// Trimmed, lowercased email.
    pub email: String,
    pub course_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

fn require_len(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.chars().count() < MIN_NAME_LEN {
        return Err(ValidationError::TooShort {
            field,
            min: MIN_NAME_LEN,
        });
    }
    Ok(trimmed.to_string())
}

/// Validate a course payload.
///
/// The code is uppercased so that uniqueness is case-insensitive. A missing
/// duration is an error, never defaulted.
pub fn validate_course(input: &CourseInput) -> Result<ValidCourse, ValidationError> {
    let name = require_len("name", &input.name)?;
    let code = require_len("code", &input.code)?.to_uppercase();
    let duration = input
        .duration
        .ok_or(ValidationError::Missing { field: "duration" })?;
    if !(MIN_COURSE_DURATION..=MAX_COURSE_DURATION).contains(&duration) {
        return Err(ValidationError::OutOfRange {
            field: "duration",
            min: MIN_COURSE_DURATION,
            max: MAX_COURSE_DURATION,
            value: duration,
        });
    }

    Ok(ValidCourse {
        name,
        code,
        duration: duration as i32,
    })
}

/// Validate a student payload.
pub fn validate_student(input: &StudentInput) -> Result<ValidStudent, ValidationError> {
    let name = require_len("name", &input.name)?;
    let email = input.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ValidationError::InvalidEmail { field: "email" });
    }

    Ok(ValidStudent {
        name,
        email,
        course_id: input.course_id,
        user_id: input.user_id,
    })
}

/// Validate an optional username. Blank values become `None`.
pub fn validate_username(username: Option<&str>) -> Result<Option<String>, ValidationError> {
    match username.map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) => require_len("username", name).map(Some),
    }
}

/// Check the `local@domain.tld` shape of an address.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty()
        && !tld.is_empty()
        && !domain.starts_with('.')
        && !domain.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(name: &str, code: &str, duration: Option<i64>) -> CourseInput {
        CourseInput {
            name: name.to_string(),
            code: code.to_string(),
            duration,
        }
    }

    #[test]
    fn test_course_code_uppercased() {
        let valid = validate_course(&course("Computer Science", "cs101", Some(36))).unwrap();
        assert_eq!(valid.code, "CS101");
        assert_eq!(valid.duration, 36);
    }

    #[test]
    fn test_course_short_fields() {
        assert_eq!(
            validate_course(&course("A", "CS", Some(1))),
            Err(ValidationError::TooShort {
                field: "name",
                min: 2
            })
        );
        assert_eq!(
            validate_course(&course("Art", " c ", Some(1))),
            Err(ValidationError::TooShort {
                field: "code",
                min: 2
            })
        );
    }

    #[test]
    fn test_course_duration_missing_or_zero() {
        assert_eq!(
            validate_course(&course("Art", "AR", None)),
            Err(ValidationError::Missing { field: "duration" })
        );
        assert!(matches!(
            validate_course(&course("Art", "AR", Some(0))),
            Err(ValidationError::OutOfRange { value: 0, .. })
        ));
        assert!(validate_course(&course("Art", "AR", Some(121))).is_err());
        assert!(validate_course(&course("Art", "AR", Some(120))).is_ok());
        assert!(validate_course(&course("Art", "AR", Some(1))).is_ok());
    }

    #[test]
    fn test_student_email() {
        let input = StudentInput {
            name: "Alice".to_string(),
            email: "  Alice@Example.com ".to_string(),
            ..Default::default()
        };
        assert_eq!(validate_student(&input).unwrap().email, "alice@example.com");

        let bad = StudentInput {
            name: "Alice".to_string(),
            email: "alice.example.com".to_string(),
            ..Default::default()
        };
        assert_eq!(
            validate_student(&bad),
            Err(ValidationError::InvalidEmail { field: "email" })
        );
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@uni.example.edu"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a@.co"));
        assert!(!is_valid_email("a@b..co"));
        assert!(!is_valid_email("a@@b.co"));
        assert!(!is_valid_email("a b@c.co"));
    }

    #[test]
    fn test_username() {
        assert_eq!(validate_username(None), Ok(None));
        assert_eq!(validate_username(Some("   ")), Ok(None));
        assert_eq!(validate_username(Some(" bob ")), Ok(Some("bob".to_string())));
        assert!(validate_username(Some("b")).is_err());
    }
}
