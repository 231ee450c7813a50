//! Authorized access to the registrar tables.
//!
//! A [`Session`] binds a request's [`SecurityContext`] to the data-access
//! layer. Every operation consults the policy set before touching storage:
//! reads drop rows the caller cannot see, writes are refused unless a policy
//! grants them.

use serde::Serialize;
use uuid::Uuid;

use super::audit::{AuditEvent, AuditLogger, MutationOp};
use super::context::SecurityContext;
use super::resolver::Resolver;
use super::rls::{Decision, PolicyRow, PolicySet, RlsOperation, RowView};
use super::SecurityError;
use crate::cascade::CascadeResult;
use crate::catalog::Table;
use crate::constraint::{validate_course, validate_student, validate_username};
use crate::database::Database;
use crate::error::Error;
use crate::model::{
    Course, CourseInput, Profile, ProfileInput, Role, RoleAssignment, Student, StudentInput,
};

/// Row counts visible to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Courses offered.
    pub courses: usize,
    /// Student rows the caller can see.
    pub students: usize,
    /// Visible students enrolled in a course.
    pub enrolled_students: usize,
    /// Profiles the caller can see.
    pub profiles: usize,
    /// Role used to pick the caller's view.
    pub role: Role,
}

/// Per-request authorized view of the database.
pub struct Session<'a> {
    db: &'a Database,
    policies: &'a PolicySet,
    context: SecurityContext,
    audit: &'a dyn AuditLogger,
}

impl<'a> Session<'a> {
    /// Create a session for a request.
    pub fn new(
        db: &'a Database,
        policies: &'a PolicySet,
        context: SecurityContext,
        audit: &'a dyn AuditLogger,
    ) -> Self {
        Self {
            db,
            policies,
            context,
            audit,
        }
    }

    /// The security context of this session.
    pub fn context(&self) -> &SecurityContext {
        &self.context
    }

    /// The caller's identity, if authenticated.
    pub fn identity(&self) -> Option<Uuid> {
        self.context.identity
    }

    // ------------------------------------------------------------------
    // Courses
    // ------------------------------------------------------------------

    /// Every course visible to the caller, ordered by code.
    pub fn list_courses(&self) -> Result<Vec<Course>, Error> {
        self.precheck(Table::Courses, RlsOperation::Select)?;
        Ok(self.visible_only(self.db.list_courses()?))
    }

    pub fn get_course(&self, id: Uuid) -> Result<Course, Error> {
        self.precheck(Table::Courses, RlsOperation::Select)?;
        self.visible_or_not_found(self.db.get_course(id)?, id)
    }

    /// Create a course. Only administrators may do so, whatever the payload.
    pub fn create_course(&self, input: &CourseInput) -> Result<Course, Error> {
        self.precheck(Table::Courses, RlsOperation::Insert)?;
        let valid = validate_course(input)?;

        let now = chrono::Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            name: valid.name,
            code: valid.code,
            duration: valid.duration,
            created_at: now,
            updated_at: now,
        };
        self.authorize(Table::Courses, RlsOperation::Insert, Some(&course.row_view()))?;

        self.db.insert_course(&course)?;
        self.audit_mutation(Table::Courses, MutationOp::Insert, course.id, 0);
        Ok(course)
    }

    /// Replace a course's fields. Every field is required.
    pub fn update_course(&self, id: Uuid, input: &CourseInput) -> Result<Course, Error> {
        self.precheck(Table::Courses, RlsOperation::Update)?;
        let current = self.get_course(id)?;
        let valid = validate_course(input)?;

        let next = Course {
            name: valid.name,
            code: valid.code,
            duration: valid.duration,
            ..current.clone()
        };
        self.authorize_update(&current, &next)?;

        let stored = self.db.update_course(&next)?;
        self.audit_mutation(Table::Courses, MutationOp::Update, id, 0);
        Ok(stored)
    }

    /// Delete a course. Students enrolled in it stay, with their course cleared.
    pub fn delete_course(&self, id: Uuid) -> Result<CascadeResult, Error> {
        self.precheck(Table::Courses, RlsOperation::Delete)?;
        let current = self.get_course(id)?;
        self.authorize(Table::Courses, RlsOperation::Delete, Some(&current.row_view()))?;

        let result = self.db.delete_course(id)?;
        self.audit_mutation(
            Table::Courses,
            MutationOp::Delete,
            id,
            result.affected_count(),
        );
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Students
    // ------------------------------------------------------------------

    /// Student rows visible to the caller: all of them for an administrator,
    /// at most the caller's own row otherwise.
    pub fn list_students(&self) -> Result<Vec<Student>, Error> {
        self.precheck(Table::Students, RlsOperation::Select)?;
        Ok(self.visible_only(self.db.list_students()?))
    }

    pub fn get_student(&self, id: Uuid) -> Result<Student, Error> {
        self.precheck(Table::Students, RlsOperation::Select)?;
        self.visible_or_not_found(self.db.get_student(id)?, id)
    }

    /// The student row the caller owns, if any.
    pub fn own_student(&self) -> Result<Option<Student>, Error> {
        self.precheck(Table::Students, RlsOperation::Select)?;
        let Some(student_id) = self.resolver().student_id_for(self.identity()) else {
            return Ok(None);
        };
        Ok(self
            .db
            .get_student(student_id)?
            .filter(|student| self.can_see(student)))
    }

    pub fn create_student(&self, input: &StudentInput) -> Result<Student, Error> {
        self.precheck(Table::Students, RlsOperation::Insert)?;
        let valid = validate_student(input)?;

        let now = chrono::Utc::now();
        let student = Student {
            id: Uuid::new_v4(),
            name: valid.name,
            email: valid.email,
            course_id: valid.course_id,
            user_id: valid.user_id,
            created_at: now,
            updated_at: now,
        };
        self.authorize(Table::Students, RlsOperation::Insert, Some(&student.row_view()))?;

        self.db.insert_student(&student)?;
        self.audit_mutation(Table::Students, MutationOp::Insert, student.id, 0);
        Ok(student)
    }

    pub fn update_student(&self, id: Uuid, input: &StudentInput) -> Result<Student, Error> {
        self.precheck(Table::Students, RlsOperation::Update)?;
        let current = self.get_student(id)?;
        let valid = validate_student(input)?;

        let next = Student {
            name: valid.name,
            email: valid.email,
            course_id: valid.course_id,
            user_id: valid.user_id,
            ..current.clone()
        };
        self.authorize_update(&current, &next)?;

        let stored = self.db.update_student(&next)?;
        self.audit_mutation(Table::Students, MutationOp::Update, id, 0);
        Ok(stored)
    }

    pub fn delete_student(&self, id: Uuid) -> Result<CascadeResult, Error> {
        self.precheck(Table::Students, RlsOperation::Delete)?;
        let current = self.get_student(id)?;
        self.authorize(Table::Students, RlsOperation::Delete, Some(&current.row_view()))?;

        let result = self.db.delete_student(id)?;
        self.audit_mutation(
            Table::Students,
            MutationOp::Delete,
            id,
            result.affected_count(),
        );
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Roles
    // ------------------------------------------------------------------

    /// Role assignments visible to the caller.
    pub fn list_roles(&self) -> Result<Vec<RoleAssignment>, Error> {
        self.precheck(Table::UserRoles, RlsOperation::Select)?;
        Ok(self.visible_only(self.db.list_roles()?))
    }

    /// Grant a role to an identity.
    pub fn grant_role(&self, user_id: Uuid, role: Role) -> Result<RoleAssignment, Error> {
        self.precheck(Table::UserRoles, RlsOperation::Insert)?;

        let assignment = RoleAssignment::new(user_id, role);
        self.authorize(
            Table::UserRoles,
            RlsOperation::Insert,
            Some(&assignment.row_view()),
        )?;

        self.db.insert_role(&assignment)?;
        self.audit_mutation(
            Table::UserRoles,
            MutationOp::Insert,
            format!("{}, {}", user_id, role),
            0,
        );
        Ok(assignment)
    }

    /// Revoke a role from an identity.
    pub fn revoke_role(&self, user_id: Uuid, role: Role) -> Result<(), Error> {
        self.precheck(Table::UserRoles, RlsOperation::Delete)?;

        let key = format!("{}, {}", user_id, role);
        let assignment = self
            .db
            .roles_for(user_id)?
            .into_iter()
            .find(|a| a.role == role && self.can_see(a))
            .ok_or_else(|| Error::not_found(Table::UserRoles, &key))?;
        self.authorize(
            Table::UserRoles,
            RlsOperation::Delete,
            Some(&assignment.row_view()),
        )?;

        self.db.delete_role(user_id, role)?;
        self.audit_mutation(Table::UserRoles, MutationOp::Delete, key, 0);
        Ok(())
    }

    /// Roles held by the caller.
    pub fn my_roles(&self) -> Result<Vec<Role>, Error> {
        self.precheck(Table::UserRoles, RlsOperation::Select)?;
        let identity = self.context.require_identity()?;
        Ok(self
            .visible_only(self.db.roles_for(identity)?)
            .into_iter()
            .map(|a| a.role)
            .collect())
    }

    /// The role that picks the caller's view: admin if held, student otherwise.
    ///
    /// An identity without any role row is shown the student view.
    pub fn effective_role(&self) -> Result<Role, Error> {
        let identity = self.context.require_identity()?;
        if self.resolver().has_role(Some(identity), Role::Admin) {
            Ok(Role::Admin)
        } else {
            Ok(Role::Student)
        }
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    /// Profiles visible to the caller.
    pub fn list_profiles(&self) -> Result<Vec<Profile>, Error> {
        self.precheck(Table::Profiles, RlsOperation::Select)?;
        Ok(self.visible_only(self.db.list_profiles()?))
    }

    pub fn get_profile(&self, id: Uuid) -> Result<Profile, Error> {
        self.precheck(Table::Profiles, RlsOperation::Select)?;
        self.visible_or_not_found(self.db.get_profile(id)?, id)
    }

    /// Create the caller's own profile.
    pub fn create_profile(&self, input: &ProfileInput) -> Result<Profile, Error> {
        self.precheck(Table::Profiles, RlsOperation::Insert)?;
        let identity = self.context.require_identity()?;
        let username = validate_username(input.username.as_deref())?;

        let now = chrono::Utc::now();
        let profile = Profile {
            id: identity,
            username,
            created_at: now,
            updated_at: now,
        };
        self.authorize(Table::Profiles, RlsOperation::Insert, Some(&profile.row_view()))?;

        self.db.insert_profile(&profile)?;
        self.audit_mutation(Table::Profiles, MutationOp::Insert, identity, 0);
        Ok(profile)
    }

    /// Update a profile. Only its own identity may do so.
    pub fn update_profile(&self, id: Uuid, input: &ProfileInput) -> Result<Profile, Error> {
        self.precheck(Table::Profiles, RlsOperation::Update)?;
        let current = self.get_profile(id)?;
        let username = validate_username(input.username.as_deref())?;

        let next = Profile {
            username,
            ..current.clone()
        };
        self.authorize_update(&current, &next)?;

        let stored = self.db.update_profile(&next)?;
        self.audit_mutation(Table::Profiles, MutationOp::Update, id, 0);
        Ok(stored)
    }

    // ------------------------------------------------------------------
    // Dashboard
    // ------------------------------------------------------------------

    /// Counts of what the caller can see.
    pub fn summary(&self) -> Result<Summary, Error> {
        let courses = self.list_courses()?.len();
        let students = self.list_students()?;
        let profiles = self.list_profiles()?.len();

        Ok(Summary {
            courses,
            enrolled_students: students.iter().filter(|s| s.course_id.is_some()).count(),
            students: students.len(),
            profiles,
            role: self.effective_role()?,
        })
    }

    // ------------------------------------------------------------------
    // Policy enforcement
    // ------------------------------------------------------------------

    fn resolver(&self) -> Resolver<'a> {
        Resolver::new(self.db)
    }

    /// Refuse before any lookup when the decision cannot depend on the row.
    ///
    /// Every predicate needs an identity, so anonymous callers stop here too.
    fn precheck(&self, table: Table, operation: RlsOperation) -> Result<(), Error> {
        if !self.context.is_authenticated() {
            return Err(self.deny(table, operation, "authentication required"));
        }
        if self.policies.is_row_independent(table, operation) {
            self.authorize(table, operation, None)?;
        }
        Ok(())
    }

    fn authorize(
        &self,
        table: Table,
        operation: RlsOperation,
        row: Option<&RowView>,
    ) -> Result<(), Error> {
        match self
            .policies
            .decide(&self.resolver(), &self.context, table, operation, row)
        {
            Decision::Granted(policy) => {
                tracing::trace!(policy, table = %table, operation = %operation, "policy granted");
                Ok(())
            }
            Decision::Denied => Err(self.deny(table, operation, "no policy granted the operation")),
        }
    }

    /// Updates must be allowed on the stored row and on the row it becomes.
    fn authorize_update<T: PolicyRow>(&self, current: &T, next: &T) -> Result<(), Error> {
        self.authorize(T::TABLE, RlsOperation::Update, Some(&current.row_view()))?;
        self.authorize(T::TABLE, RlsOperation::Update, Some(&next.row_view()))
    }

    fn deny(&self, table: Table, operation: RlsOperation, reason: &str) -> Error {
        self.audit
            .log(AuditEvent::access_denied(&self.context, table, operation, reason));

        if self.context.is_authenticated() {
            SecurityError::PermissionDenied { table, operation }.into()
        } else {
            SecurityError::AuthenticationRequired.into()
        }
    }

    fn can_see<T: PolicyRow>(&self, row: &T) -> bool {
        self.policies
            .decide(
                &self.resolver(),
                &self.context,
                T::TABLE,
                RlsOperation::Select,
                Some(&row.row_view()),
            )
            .is_granted()
    }

    fn visible_only<T: PolicyRow>(&self, rows: Vec<T>) -> Vec<T> {
        rows.into_iter().filter(|row| self.can_see(row)).collect()
    }

    fn visible_or_not_found<T: PolicyRow>(&self, row: Option<T>, id: Uuid) -> Result<T, Error> {
        match row {
            Some(row) if self.can_see(&row) => Ok(row),
            _ => Err(Error::not_found(T::TABLE, id)),
        }
    }

    fn audit_mutation(
        &self,
        table: Table,
        operation: MutationOp,
        key: impl ToString,
        cascaded: usize,
    ) {
        self.audit.log(AuditEvent::mutation(
            &self.context,
            table,
            operation,
            key.to_string(),
            cascaded,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::provisioning::{Provisioner, SignupMetadata};
    use crate::security::MemoryAuditLogger;

    struct Fixture {
        db: Database,
        policies: PolicySet,
        audit: MemoryAuditLogger,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                db: Database::temporary().unwrap(),
                policies: PolicySet::standard(),
                audit: MemoryAuditLogger::new(),
            }
        }

        fn signup(&self, username: &str) -> Uuid {
            let id = Uuid::new_v4();
            Provisioner::new(&self.db)
                .provision(
                    id,
                    None,
                    &SignupMetadata {
                        username: Some(username.to_string()),
                    },
                )
                .unwrap();
            id
        }

        fn admin(&self) -> Uuid {
            let id = self.signup("admin");
            self.db.bootstrap_role(id, Role::Admin).unwrap();
            id
        }

        fn session(&self, identity: Option<Uuid>) -> Session<'_> {
            Session::new(
                &self.db,
                &self.policies,
                SecurityContext::new(identity),
                &self.audit,
            )
        }
    }

    fn course_input(code: &str) -> CourseInput {
        CourseInput {
            name: "Operating Systems".to_string(),
            code: code.to_string(),
            duration: Some(6),
        }
    }

    #[test]
    fn test_admin_manages_courses() {
        let f = Fixture::new();
        let admin = f.session(Some(f.admin()));

        let course = admin.create_course(&course_input("os101")).unwrap();
        assert_eq!(course.code, "OS101");

        let updated = admin
            .update_course(
                course.id,
                &CourseInput {
                    duration: Some(9),
                    ..course_input("os101")
                },
            )
            .unwrap();
        assert_eq!(updated.duration, 9);
        assert!(updated.updated_at >= course.updated_at);

        admin.delete_course(course.id).unwrap();
        assert!(admin.list_courses().unwrap().is_empty());
        assert_eq!(f.audit.len(), 3);
    }

    #[test]
    fn test_student_cannot_write_courses_even_with_bad_payload() {
        let f = Fixture::new();
        let student = f.session(Some(f.signup("neo")));

        let invalid = CourseInput {
            name: "x".to_string(),
            code: String::new(),
            duration: None,
        };
        for input in [course_input("CS1"), invalid] {
            let err = student.create_course(&input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Denied);
        }

        // Denied before the lookup, so a missing course is not revealed.
        let err = student.delete_course(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Denied);
        assert_eq!(f.audit.denials().len(), 3);
    }

    #[test]
    fn test_anonymous_is_unauthenticated() {
        let f = Fixture::new();
        let anonymous = f.session(None);
        assert_eq!(
            anonymous.list_courses().unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
        assert_eq!(
            anonymous.effective_role().unwrap_err().kind(),
            ErrorKind::Unauthenticated
        );
    }

    #[test]
    fn test_student_sees_only_own_row() {
        let f = Fixture::new();
        let admin = f.session(Some(f.admin()));
        let neo = f.signup("neo");
        let trinity = f.signup("trinity");

        let own = admin
            .create_student(&StudentInput {
                name: "Neo".to_string(),
                email: "Neo@Example.com".to_string(),
                course_id: None,
                user_id: Some(neo),
            })
            .unwrap();
        let other = admin
            .create_student(&StudentInput {
                name: "Trinity".to_string(),
                email: "trinity@example.com".to_string(),
                course_id: None,
                user_id: Some(trinity),
            })
            .unwrap();
        assert_eq!(own.email, "neo@example.com");

        let session = f.session(Some(neo));
        assert_eq!(session.list_students().unwrap(), vec![own.clone()]);
        assert_eq!(session.own_student().unwrap(), Some(own.clone()));
        assert_eq!(
            session.get_student(other.id).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(admin.list_students().unwrap().len(), 2);

        // A student without a row sees nothing.
        let morpheus = f.session(Some(f.signup("morpheus")));
        assert!(morpheus.list_students().unwrap().is_empty());
        assert_eq!(morpheus.own_student().unwrap(), None);
    }

    #[test]
    fn test_profile_update_is_owner_only() {
        let f = Fixture::new();
        let admin_id = f.admin();
        let neo = f.signup("neo");

        let own = f.session(Some(neo));
        let updated = own
            .update_profile(
                neo,
                &ProfileInput {
                    username: Some("the_one".to_string()),
                },
            )
            .unwrap();
        assert_eq!(updated.username.as_deref(), Some("the_one"));

        // Visible to the admin, but not theirs to edit.
        let admin = f.session(Some(admin_id));
        let err = admin
            .update_profile(neo, &ProfileInput { username: None })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Denied);

        // Invisible to another student.
        let other = f.session(Some(f.signup("trinity")));
        let err = other
            .update_profile(neo, &ProfileInput { username: None })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_roles() {
        let f = Fixture::new();
        let admin = f.session(Some(f.admin()));
        let neo = f.signup("neo");
        let student = f.session(Some(neo));

        assert_eq!(student.my_roles().unwrap(), vec![Role::Student]);
        assert_eq!(student.effective_role().unwrap(), Role::Student);
        assert_eq!(student.list_roles().unwrap().len(), 1);
        assert_eq!(
            student.grant_role(neo, Role::Admin).unwrap_err().kind(),
            ErrorKind::Denied
        );

        admin.grant_role(neo, Role::Admin).unwrap();
        assert_eq!(student.effective_role().unwrap(), Role::Admin);
        assert!(admin.grant_role(neo, Role::Admin).unwrap_err().is_duplicate());

        admin.revoke_role(neo, Role::Admin).unwrap();
        assert_eq!(student.effective_role().unwrap(), Role::Student);
        assert_eq!(
            admin.revoke_role(neo, Role::Admin).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_summary() {
        let f = Fixture::new();
        let admin = f.session(Some(f.admin()));
        let course = admin.create_course(&course_input("ML1")).unwrap();
        admin
            .create_student(&StudentInput {
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                course_id: Some(course.id),
                user_id: None,
            })
            .unwrap();

        let summary = admin.summary().unwrap();
        assert_eq!(summary.courses, 1);
        assert_eq!(summary.students, 1);
        assert_eq!(summary.enrolled_students, 1);
        assert_eq!(summary.profiles, 1);
        assert_eq!(summary.role, Role::Admin);

        let student = f.session(Some(f.signup("neo")));
        let summary = student.summary().unwrap();
        assert_eq!(summary.courses, 1);
        assert_eq!(summary.students, 0);
        assert_eq!(summary.profiles, 1);
        assert_eq!(summary.role, Role::Student);
    }
}
