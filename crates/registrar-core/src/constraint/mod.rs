//! Constraint enforcement.
//!
//! - Unique constraints backed by a secondary index tree
//! - Payload validation for courses, students and profiles

mod unique_index;
mod validator;

pub use unique_index::{UniqueIndex, UNIQUE_INDEX_TREE};
pub use validator::{
    is_valid_email, validate_course, validate_student, validate_username, ValidCourse,
    ValidStudent, ValidationError, MAX_COURSE_DURATION, MIN_COURSE_DURATION, MIN_NAME_LEN,
};
