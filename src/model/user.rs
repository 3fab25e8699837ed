use crate::model::Currency;
use serde::{Deserialize, Serialize};

/// Per-user preferences that drive what the views display.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub currency: Currency,
    /// How many days into the future transactions stay visible. `None` means no cutoff, `0`
    /// hides everything after today.
    #[serde(default)]
    pub future_transaction_visibility_days: Option<u32>,
    #[serde(default)]
    pub dark_mode: Option<bool>,
}

/// The authenticated user. The local store holds exactly one of these per session.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(alias = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub settings: Settings,
    #[serde(default)]
    pub total_transaction_count: u64,
    pub registration_date: String,
}

/// The body of `createUser`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_json_from_server() {
        let json = r#"{
            "_id": "6700000000000000000000aa",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.com",
            "settings": {
                "currency": {"code": "EUR", "symbol": "€"},
                "futureTransactionVisibilityDays": null,
                "darkMode": true
            },
            "totalTransactionCount": 12,
            "registrationDate": "2024-01-02T10:00:00.000Z"
        }"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, "6700000000000000000000aa");
        assert_eq!(user.settings.currency.code(), "EUR");
        assert_eq!(user.settings.future_transaction_visibility_days, None);
        assert_eq!(user.settings.dark_mode, Some(true));
    }
}
