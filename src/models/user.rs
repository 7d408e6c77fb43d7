//! User Models
//!
//! The read-only slice of the user directory the core consumes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Registered,
    Verified,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserState {
    Active,
    Suspended,
    Deleted,
}

/// Profile as returned by the user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub state: UserState,
    pub email_verified: bool,
    pub city_id: Option<i64>,
    /// Display name of the city, resolved by the directory.
    pub city: Option<String>,
    /// Preferred notification language.
    pub language: String,
}

impl UserProfile {
    /// Bidding requires an active, email-verified account with at least the
    /// verified role.
    pub fn can_bid(&self) -> bool {
        self.state == UserState::Active
            && self.email_verified
            && matches!(self.role, UserRole::Verified | UserRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.state == UserState::Active && self.role == UserRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: UserRole, state: UserState, verified: bool) -> UserProfile {
        UserProfile {
            id: 9,
            name: "Bidder".to_string(),
            email: "bidder@example.com".to_string(),
            phone: None,
            role,
            state,
            email_verified: verified,
            city_id: None,
            city: None,
            language: "en".to_string(),
        }
    }

    #[test]
    fn bidding_eligibility() {
        assert!(profile(UserRole::Verified, UserState::Active, true).can_bid());
        assert!(profile(UserRole::Admin, UserState::Active, true).can_bid());
        assert!(!profile(UserRole::Registered, UserState::Active, true).can_bid());
        assert!(!profile(UserRole::Verified, UserState::Suspended, true).can_bid());
        assert!(!profile(UserRole::Verified, UserState::Active, false).can_bid());
    }

    #[test]
    fn admin_requires_active_state() {
        assert!(profile(UserRole::Admin, UserState::Active, true).is_admin());
        assert!(!profile(UserRole::Admin, UserState::Suspended, true).is_admin());
    }
}
