//! User record as stored on disk

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assessment::{AssessmentRecord, ParamitaScores};

/// Account status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
}

fn default_spiritual_level() -> String {
    "beginner".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

/// Full user record, one JSON file per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    /// Argon2 PHC hash; named `password` on disk
    #[serde(rename = "password")]
    pub password_hash: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default = "default_spiritual_level")]
    pub spiritual_level: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default = "default_language")]
    pub language_preference: String,
    #[serde(default)]
    pub paramita_progress: ParamitaScores,
    #[serde(default)]
    pub assessment_history: Vec<AssessmentRecord>,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// New active user with a fresh id and default profile
    pub fn new(email: String, password_hash: String, first_name: String, last_name: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            password_hash,
            first_name,
            last_name,
            status: UserStatus::Active,
            spiritual_level: default_spiritual_level(),
            roles: Vec::new(),
            language_preference: default_language(),
            paramita_progress: ParamitaScores::default(),
            assessment_history: Vec::new(),
            joined_at: Utc::now(),
            last_login: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn to_public(&self) -> PublicUser {
        PublicUser::from(self)
    }
}

/// User as returned over the API; never carries the password hash
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub status: UserStatus,
    pub spiritual_level: String,
    pub roles: Vec<String>,
    pub language_preference: String,
    pub paramita_progress: ParamitaScores,
    pub assessment_history: Vec<AssessmentRecord>,
    pub joined_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&UserRecord> for PublicUser {
    fn from(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            email: record.email.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            status: record.status,
            spiritual_level: record.spiritual_level.clone(),
            roles: record.roles.clone(),
            language_preference: record.language_preference.clone(),
            paramita_progress: record.paramita_progress,
            assessment_history: record.assessment_history.clone(),
            joined_at: record.joined_at,
            last_login: record.last_login,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_record_without_roles() {
        // Shape written by earlier deployments: no roles, password under "password"
        let json = r#"{
            "id": "7f1c9a44-2b1e-4f4c-9d55-0d6c1a3e2f10",
            "email": "seeker@example.com",
            "password": "$argon2id$v=19$m=19456,t=2,p=1$abc$def",
            "firstName": "Tara",
            "lastName": "Green",
            "spiritualLevel": "intermediate",
            "languagePreference": "en",
            "status": "active",
            "joinedAt": "2024-03-01T10:00:00.000Z",
            "paramitaProgress": {"dana": 10, "sila": 20, "ksanti": 30, "virya": 40, "dhyana": 50, "prajna": 60},
            "assessmentHistory": [],
            "lastLogin": "2024-03-02T10:00:00.000Z"
        }"#;

        let record: UserRecord = serde_json::from_str(json).unwrap();
        assert!(record.roles.is_empty());
        assert!(record.is_active());
        assert_eq!(record.paramita_progress.prajna, 60);
        assert!(record.password_hash.starts_with("$argon2id"));
    }

    #[test]
    fn test_public_view_omits_password() {
        let record = UserRecord::new(
            "a@b.test".into(),
            "secret-hash".into(),
            "A".into(),
            "B".into(),
        );
        let json = serde_json::to_value(record.to_public()).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["spiritualLevel"], "beginner");
        assert_eq!(json["status"], "active");
    }
}
