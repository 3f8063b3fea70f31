//! Registration, login and profile management.

use serde::{Deserialize, Serialize};

use super::required;
use crate::auth::{hash_password, verify_password, TokenIssuer, TokenPair};
use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Clinic, ClinicUpdate, ProfileUpdate, User};
use crate::validation::{
    normalize_email, validate_password, FieldErrors, RegistrationRequest, NON_FIELD_ERRORS,
};

/// A signed-in user.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
    pub clinic: Option<Clinic>,
    pub tokens: TokenPair,
}

/// The user as shown on their profile page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub user: User,
    pub clinic: Option<Clinic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordChange {
    pub old_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

pub struct AccountService<'a> {
    db: &'a Database,
    issuer: &'a dyn TokenIssuer,
}

impl<'a> AccountService<'a> {
    pub fn new(db: &'a Database, issuer: &'a dyn TokenIssuer) -> Self {
        Self { db, issuer }
    }

    fn clinic_of(&self, user: &User) -> ServiceResult<Option<Clinic>> {
        match &user.clinic_id {
            Some(id) => Ok(self.db.get_clinic(id)?),
            None => Ok(None),
        }
    }

    /// Create a user and attach them to the named clinic, creating the clinic
    /// if it does not exist yet. Nothing is written unless the whole form is
    /// valid.
    pub fn register(&self, request: &RegistrationRequest) -> ServiceResult<Session> {
        let form = request.validate()?;
        if self.db.get_user_by_email(&form.email)?.is_some() {
            return Err(ServiceError::validation(
                "email",
                "user with this email already exists.",
            ));
        }
        let password_hash = hash_password(&form.password)?;

        let (user, clinic, tokens) = self.db.atomic(|db| -> ServiceResult<(User, Clinic, TokenPair)> {
            let clinic = match db.find_clinic_by_name(&form.clinic_name)? {
                Some(mut existing) => {
                    existing.address = form.clinic_address.clone();
                    existing.phone = form.clinic_phone.clone();
                    existing.email = form.clinic_email.clone();
                    db.update_clinic(&existing)?;
                    existing
                }
                None => {
                    let mut clinic = Clinic::new(form.clinic_name.clone());
                    clinic.address = form.clinic_address.clone();
                    clinic.phone = form.clinic_phone.clone();
                    clinic.email = form.clinic_email.clone();
                    db.insert_clinic(&clinic)?;
                    clinic
                }
            };

            let mut user = User::new(form.email.clone(), form.first_name.clone(), form.last_name.clone());
            user.phone = form.phone.clone();
            user.clinic_id = Some(clinic.id.clone());
            user.password_hash = password_hash;
            db.insert_user(&user)?;

            let tokens = self.issuer.issue(&user)?;
            Ok((user, clinic, tokens))
        })?;

        log::info!("Registered user {} in clinic {}", user.id, clinic.name);
        Ok(Session {
            user,
            clinic: Some(clinic),
            tokens,
        })
    }

    /// Exchange credentials for a session. Unknown email, wrong password and
    /// inactive account all fail the same way.
    pub fn login(&self, email: &str, password: &str) -> ServiceResult<Session> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ServiceError::validation(
                NON_FIELD_ERRORS,
                "Email and password are required",
            ));
        }

        let user = self.db.get_user_by_email(&email.trim().to_lowercase())?;
        let stored = user.as_ref().map(|u| u.password_hash.as_str());
        let verified = verify_password(password, stored);

        let user = match user {
            Some(user) if verified && user.active => user,
            _ => {
                log::warn!("Failed login attempt");
                return Err(ServiceError::Unauthorized("Invalid credentials".to_string()));
            }
        };

        self.db.touch_last_login(&user.id)?;
        let tokens = self.issuer.issue(&user)?;
        let clinic = self.clinic_of(&user)?;

        log::info!("User {} logged in", user.id);
        Ok(Session { user, clinic, tokens })
    }

    pub fn logout(&self, refresh: &str) -> ServiceResult<()> {
        self.issuer.blacklist(refresh).map_err(|e| {
            log::warn!("Logout with unusable refresh token: {}", e);
            ServiceError::validation(NON_FIELD_ERRORS, "Invalid token")
        })
    }

    pub fn profile(&self, actor: &User) -> ServiceResult<Profile> {
        Ok(Profile {
            user: actor.clone(),
            clinic: self.clinic_of(actor)?,
        })
    }

    pub fn update_profile(&self, actor: &User, update: ProfileUpdate) -> ServiceResult<Profile> {
        let mut user = actor.clone();
        if let Some(first_name) = update.first_name {
            user.first_name = required("first_name", &first_name)?;
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(phone) = update.phone {
            user.phone = phone.trim().to_string();
        }

        self.db.update_user(&user)?;
        let user = self
            .db
            .get_user(&user.id)?
            .ok_or_else(|| ServiceError::not_found(format!("User {}", user.id)))?;
        self.profile(&user)
    }

    pub fn change_password(&self, actor: &User, change: &PasswordChange) -> ServiceResult<()> {
        let mut errors = FieldErrors::new();
        if !verify_password(&change.old_password, Some(actor.password_hash.as_str())) {
            errors.add("old_password", "Wrong password.");
        }
        for problem in validate_password(&change.new_password) {
            errors.add("new_password", problem);
        }
        if change.new_password != change.new_password_confirm {
            errors.add("new_password", "Password fields didn't match.");
        }
        errors.into_result()?;

        let mut user = actor.clone();
        user.password_hash = hash_password(&change.new_password)?;
        self.db.update_user(&user)?;
        log::info!("User {} changed their password", user.id);
        Ok(())
    }

    /// Edit the contact details of the actor's own clinic.
    pub fn update_clinic(&self, actor: &User, update: ClinicUpdate) -> ServiceResult<Clinic> {
        let mut clinic = self
            .clinic_of(actor)?
            .ok_or_else(|| ServiceError::not_found("User does not have an associated clinic"))?;

        let mut errors = FieldErrors::new();
        if let Some(name) = update.name {
            match required("name", &name) {
                Ok(name) => clinic.name = name,
                Err(_) => errors.add("name", "This field is required."),
            }
        }
        if let Some(email) = update.email {
            match normalize_email(&email) {
                Ok(email) => clinic.email = email,
                Err(message) => errors.add("email", message),
            }
        }
        errors.into_result()?;

        if let Some(address) = update.address {
            clinic.address = address.trim().to_string();
        }
        if let Some(phone) = update.phone {
            clinic.phone = phone.trim().to_string();
        }
        if update.logo_url.is_some() {
            clinic.logo_url = update.logo_url;
        }

        self.db.update_clinic(&clinic)?;
        self.db
            .get_clinic(&clinic.id)?
            .ok_or_else(|| ServiceError::not_found(format!("Clinic {}", clinic.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::LocalTokenIssuer;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            name: "Ada Lovelace".into(),
            email: " Ada@Example.com ".into(),
            password: "analytical1".into(),
            password_confirm: "analytical1".into(),
            phone: "555-0100".into(),
            clinic_name: "Engine Clinic".into(),
            clinic_address: "1 Babbage Way".into(),
            clinic_phone: "555-0101".into(),
            clinic_email: "front@engine.example".into(),
        }
    }

    #[test]
    fn test_register_then_login() {
        let db = setup_db();
        let issuer = LocalTokenIssuer::new(&db);
        let accounts = AccountService::new(&db, &issuer);

        let session = accounts.register(&request()).unwrap();
        assert_eq!(session.user.email, "ada@example.com");
        assert_eq!(session.user.last_name, "Lovelace");
        assert_eq!(session.clinic.as_ref().unwrap().address, "1 Babbage Way");
        assert_eq!(issuer.resolve_access(&session.tokens.access).unwrap(), session.user.id);

        let login = accounts.login("ADA@example.com", "analytical1").unwrap();
        assert_eq!(login.user.id, session.user.id);
        assert!(db.get_user(&login.user.id).unwrap().unwrap().last_login.is_some());
    }

    #[test]
    fn test_register_joins_existing_clinic() {
        let db = setup_db();
        let issuer = LocalTokenIssuer::new(&db);
        let accounts = AccountService::new(&db, &issuer);

        let first = accounts.register(&request()).unwrap();
        let second = accounts
            .register(&RegistrationRequest {
                email: "charles@example.com".into(),
                clinic_phone: "555-0199".into(),
                ..request()
            })
            .unwrap();

        assert_eq!(first.user.clinic_id, second.user.clinic_id);
        assert_eq!(db.count_clinics().unwrap(), 1);
        assert_eq!(second.clinic.unwrap().phone, "555-0199");
    }

    #[test]
    fn test_register_rejects_duplicates_and_mismatch() {
        let db = setup_db();
        let issuer = LocalTokenIssuer::new(&db);
        let accounts = AccountService::new(&db, &issuer);

        let err = accounts
            .register(&RegistrationRequest {
                password_confirm: "different1".into(),
                ..request()
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert_eq!(db.count_users().unwrap(), 0);
        assert_eq!(db.count_clinics().unwrap(), 0);

        accounts.register(&request()).unwrap();
        match accounts.register(&request()).unwrap_err() {
            ServiceError::Validation(errors) => assert!(errors.get("email").is_some()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_login_failures_look_alike() {
        let db = setup_db();
        let issuer = LocalTokenIssuer::new(&db);
        let accounts = AccountService::new(&db, &issuer);
        let session = accounts.register(&request()).unwrap();

        let wrong = accounts.login("ada@example.com", "nope").unwrap_err();
        let unknown = accounts.login("who@example.com", "analytical1").unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
        assert_eq!(wrong.status_code(), 401);

        let mut user = session.user;
        user.active = false;
        db.update_user(&user).unwrap();
        assert!(matches!(
            accounts.login("ada@example.com", "analytical1"),
            Err(ServiceError::Unauthorized(_))
        ));

        assert!(matches!(accounts.login("", ""), Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_logout_blacklists() {
        let db = setup_db();
        let issuer = LocalTokenIssuer::new(&db);
        let accounts = AccountService::new(&db, &issuer);
        let session = accounts.register(&request()).unwrap();

        accounts.logout(&session.tokens.refresh).unwrap();
        assert!(issuer.resolve_access(&session.tokens.access).is_err());
        assert!(matches!(
            accounts.logout(&session.tokens.refresh),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_change_password() {
        let db = setup_db();
        let issuer = LocalTokenIssuer::new(&db);
        let accounts = AccountService::new(&db, &issuer);
        let user = accounts.register(&request()).unwrap().user;

        let err = accounts
            .change_password(
                &user,
                &PasswordChange {
                    old_password: "wrong".into(),
                    new_password: "123".into(),
                    new_password_confirm: "124".into(),
                },
            )
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                assert!(errors.get("old_password").is_some());
                assert!(errors.get("new_password").unwrap().len() >= 2);
            }
            other => panic!("unexpected {other:?}"),
        }

        accounts
            .change_password(
                &user,
                &PasswordChange {
                    old_password: "analytical1".into(),
                    new_password: "difference2".into(),
                    new_password_confirm: "difference2".into(),
                },
            )
            .unwrap();
        assert!(accounts.login("ada@example.com", "difference2").is_ok());
    }

    #[test]
    fn test_profile_and_clinic_updates() {
        let db = setup_db();
        let issuer = LocalTokenIssuer::new(&db);
        let accounts = AccountService::new(&db, &issuer);
        let user = accounts.register(&request()).unwrap().user;

        let profile = accounts
            .update_profile(
                &user,
                ProfileUpdate {
                    phone: Some(" 555-0111 ".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(profile.user.phone, "555-0111");
        assert_eq!(profile.clinic.unwrap().name, "Engine Clinic");

        assert!(matches!(
            accounts.update_clinic(
                &user,
                ClinicUpdate {
                    email: Some("not-an-email".into()),
                    ..Default::default()
                }
            ),
            Err(ServiceError::Validation(_))
        ));
        let clinic = accounts
            .update_clinic(
                &user,
                ClinicUpdate {
                    email: Some("Billing@Engine.example".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(clinic.email, "billing@engine.example");
    }
}
