use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datetime::calendar_date_serde;
use crate::error::PlanError;

/// Profile of a planner user. Credentials live with the identity provider and
/// are never stored here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub age: u32,
    #[serde(with = "calendar_date_serde")]
    pub date_of_birth: NaiveDate,
    pub phone_number: String,
}

/// Sign-up and profile edits share one payload: an id means "edit".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserUpsert {
    #[serde(default)]
    pub id: Option<u64>,
    pub name: String,
    pub email: String,
    pub age: u32,
    #[serde(with = "calendar_date_serde")]
    pub date_of_birth: NaiveDate,
    pub phone_number: String,
}

fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

pub fn find_by_email<'a>(users: &'a [User], email: &str) -> Result<&'a User, PlanError> {
    users
        .iter()
        .find(|u| same_email(&u.email, email))
        .ok_or_else(|| PlanError::UnknownUser(email.to_string()))
}

/// Applies an upsert to the user list and returns the stored record.
pub fn upsert_user(users: &mut Vec<User>, upsert: UserUpsert) -> Result<User, PlanError> {
    let clash = users
        .iter()
        .any(|u| Some(u.id) != upsert.id && same_email(&u.email, &upsert.email));
    if clash {
        return Err(PlanError::DuplicateEmail(upsert.email));
    }

    let email = upsert.email.trim().to_string();
    match upsert.id {
        Some(id) => {
            let user = users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or(PlanError::UserNotFound(id))?;
            user.name = upsert.name;
            user.email = email;
            user.age = upsert.age;
            user.date_of_birth = upsert.date_of_birth;
            user.phone_number = upsert.phone_number;
            debug!(user_id = id, "updated user profile");
            Ok(user.clone())
        }
        None => {
            let id = users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
            let user = User {
                id,
                name: upsert.name,
                email,
                age: upsert.age,
                date_of_birth: upsert.date_of_birth,
                phone_number: upsert.phone_number,
            };
            users.push(user.clone());
            debug!(user_id = id, "registered user");
            Ok(user)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(email: &str) -> UserUpsert {
        UserUpsert {
            id: None,
            name: "Ana".to_string(),
            email: email.to_string(),
            age: 30,
            date_of_birth: NaiveDate::from_ymd_opt(1994, 5, 1).expect("valid date"),
            phone_number: "555-0100".to_string(),
        }
    }

    #[test]
    fn signup_assigns_ids_and_rejects_duplicate_email() {
        let mut users = vec![];
        let first = upsert_user(&mut users, signup("ana@example.com")).expect("first");
        let second = upsert_user(&mut users, signup("bo@example.com")).expect("second");
        assert_eq!((first.id, second.id), (1, 2));

        let err = upsert_user(&mut users, signup("ANA@example.com")).expect_err("duplicate");
        assert_eq!(err, PlanError::DuplicateEmail("ANA@example.com".to_string()));
    }

    #[test]
    fn edit_keeps_id_and_may_keep_own_email() {
        let mut users = vec![];
        let user = upsert_user(&mut users, signup("ana@example.com")).expect("signup");

        let mut edit = signup("ana@example.com");
        edit.id = Some(user.id);
        edit.age = 31;
        let edited = upsert_user(&mut users, edit).expect("edit");

        assert_eq!(edited.id, user.id);
        assert_eq!(edited.age, 31);
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn edit_of_missing_user_fails() {
        let mut users = vec![];
        let mut edit = signup("ana@example.com");
        edit.id = Some(42);
        assert_eq!(
            upsert_user(&mut users, edit).expect_err("missing"),
            PlanError::UserNotFound(42)
        );
    }

    #[test]
    fn lookup_ignores_case() {
        let mut users = vec![];
        upsert_user(&mut users, signup("ana@example.com")).expect("signup");
        assert!(find_by_email(&users, " Ana@Example.com ").is_ok());
        assert!(matches!(
            find_by_email(&users, "nobody@example.com"),
            Err(PlanError::UnknownUser(_))
        ));
    }
}
