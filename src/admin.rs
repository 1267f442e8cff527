use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use email_address::EmailAddress;
use log::info;
use rand::{Rng, distr::Alphanumeric};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ProxyError;

#[derive(Debug, Clone)]
struct AdminAccount {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    date_created: DateTime<Utc>,
}

// Login session handed out as a bearer token
#[derive(Debug, Clone)]
struct Session {
    admin_id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub date_created: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub admin: AdminProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyGuideRequest {
    pub guide_id: String,
    pub name: String,
    #[serde(default)]
    pub license_number: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GuideStatus {
    Unverified,
    Verified,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuideRecord {
    pub guide_id: String,
    pub name: String,
    pub license_number: Option<String>,
    pub status: GuideStatus,
    pub verified_by: Uuid,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuideStatusResponse {
    pub guide_id: String,
    pub status: GuideStatus,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
}

/// In-memory admin accounts, sessions and guide verifications
pub struct AdminService {
    admins: RwLock<HashMap<Uuid, AdminAccount>>,
    sessions: RwLock<HashMap<String, Session>>,
    guides: RwLock<HashMap<String, GuideRecord>>,
    session_expiry: Duration,
}

impl Default for AdminService {
    fn default() -> Self {
        Self::new()
    }
}

impl AdminService {
    pub fn new() -> Self {
        Self {
            admins: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            guides: RwLock::new(HashMap::new()),
            session_expiry: Duration::from_secs(24 * 60 * 60), // 24 hours
        }
    }

    fn profile(account: &AdminAccount) -> AdminProfile {
        AdminProfile {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            date_created: account.date_created,
        }
    }

    // Argon2 PHC string, salt included
    fn hash_password(password: &str) -> Result<String, ProxyError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ProxyError::Internal(format!("Failed to hash password: {}", e)))
    }

    fn verify_password(password: &str, hash: &str) -> Result<bool, ProxyError> {
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| ProxyError::Internal(format!("Failed to parse hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    fn generate_session_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(48)
            .map(char::from)
            .collect()
    }

    fn validate_email(email: &str) -> Result<(), ProxyError> {
        if !EmailAddress::is_valid(email) {
            return Err(ProxyError::Validation("Invalid email address".into()));
        }
        Ok(())
    }

    fn validate_password(password: &str) -> Result<(), ProxyError> {
        if password.len() < 8 {
            return Err(ProxyError::Validation(
                "Password must be at least 8 characters long".into(),
            ));
        }

        let has_number = password.chars().any(|c| c.is_numeric());
        let has_letter = password.chars().any(|c| c.is_alphabetic());
        if !has_number || !has_letter {
            return Err(ProxyError::Validation(
                "Password must contain at least one letter and one number".into(),
            ));
        }
        Ok(())
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AdminProfile, ProxyError> {
        if req.username.trim().is_empty() {
            return Err(ProxyError::Validation("username is required".into()));
        }
        Self::validate_email(&req.email)?;
        Self::validate_password(&req.password)?;

        let password_hash = Self::hash_password(&req.password)?;

        let mut admins = self.admins.write().await;
        if admins
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&req.email))
        {
            return Err(ProxyError::Conflict("Email already in use".into()));
        }

        let account = AdminAccount {
            id: Uuid::new_v4(),
            username: req.username.trim().to_string(),
            email: req.email,
            password_hash,
            date_created: Utc::now(),
        };
        info!("Registered admin {}", account.id);
        let profile = Self::profile(&account);
        admins.insert(account.id, account);
        Ok(profile)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ProxyError> {
        let account = self
            .admins
            .read()
            .await
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(&req.email))
            .cloned()
            // Same message for unknown email and wrong password
            .ok_or_else(|| ProxyError::Unauthorized("Invalid email or password".into()))?;

        if !Self::verify_password(&req.password, &account.password_hash)? {
            return Err(ProxyError::Unauthorized("Invalid email or password".into()));
        }

        let token = Self::generate_session_token();
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| !self.is_expired(session, now));
        sessions.insert(
            token.clone(),
            Session {
                admin_id: account.id,
                created_at: now,
            },
        );
        drop(sessions);
        Ok(LoginResponse {
            token,
            admin: Self::profile(&account),
        })
    }

    /// Admin id for a live session token
    pub async fn authenticate(&self, token: &str) -> Option<Uuid> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            let session = sessions.get(token)?;
            if !self.is_expired(session, now) {
                return Some(session.admin_id);
            }
        }
        self.sessions.write().await.remove(token);
        None
    }

    fn is_expired(&self, session: &Session, now: DateTime<Utc>) -> bool {
        let age = now.timestamp() - session.created_at.timestamp();
        age > self.session_expiry.as_secs() as i64
    }

    pub async fn verify_guide(
        &self,
        admin_id: Uuid,
        req: VerifyGuideRequest,
    ) -> Result<GuideRecord, ProxyError> {
        let guide_id = req.guide_id.trim();
        if guide_id.is_empty() {
            return Err(ProxyError::Validation("guide_id is required".into()));
        }
        if req.name.trim().is_empty() {
            return Err(ProxyError::Validation("name is required".into()));
        }

        let record = GuideRecord {
            guide_id: guide_id.to_string(),
            name: req.name.trim().to_string(),
            license_number: req.license_number,
            status: GuideStatus::Verified,
            verified_by: admin_id,
            verified_at: Utc::now(),
        };
        info!("Admin {} verified guide {}", admin_id, record.guide_id);
        self.guides
            .write()
            .await
            .insert(record.guide_id.clone(), record.clone());
        Ok(record)
    }

    pub async fn guide_status(&self, guide_id: &str) -> GuideStatusResponse {
        match self.guides.read().await.get(guide_id) {
            Some(record) => GuideStatusResponse {
                guide_id: record.guide_id.clone(),
                status: record.status,
                verified_at: Some(record.verified_at),
            },
            None => GuideStatusResponse {
                guide_id: guide_id.to_string(),
                status: GuideStatus::Unverified,
                verified_at: None,
            },
        }
    }

    /// Verified guides, most recent first
    pub async fn list_guides(&self) -> Vec<GuideRecord> {
        let mut guides: Vec<GuideRecord> = self.guides.read().await.values().cloned().collect();
        guides.sort_by(|a, b| b.verified_at.cmp(&a.verified_at));
        guides
    }
}
