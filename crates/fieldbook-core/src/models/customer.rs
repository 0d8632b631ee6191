//! Customer model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{lenient, EntityKind, Record, RecordPatch, Timestamp};
use crate::util::generate_id;

/// A customer of the business
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Customer {
    /// Opaque, client-generated identifier. Never changes once assigned.
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(deserialize_with = "lenient::string")]
    pub name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub phone: String,
    #[serde(deserialize_with = "lenient::string")]
    pub email: String,
    #[serde(deserialize_with = "lenient::string")]
    pub address: String,
    #[serde(deserialize_with = "lenient::string")]
    pub notes: String,
    #[serde(
        deserialize_with = "lenient::optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_added: Option<Timestamp>,
    #[serde(
        deserialize_with = "lenient::optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<Timestamp>,
    /// Fields this version does not model, kept so they survive a round trip
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Customer {
    /// Create a new customer with a fresh id and both timestamps set to now
    #[must_use]
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id: generate_id(EntityKind::Customer.id_prefix()),
            name: name.into(),
            phone: phone.into(),
            date_added: Some(now.clone()),
            last_updated: Some(now),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Identity match used by find-or-create: case-insensitive name and
    /// exact phone, where two empty phones count as equal.
    #[must_use]
    pub fn matches_identity(&self, name: &str, phone: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase() && self.phone == phone
    }
}

impl Record for Customer {
    const KIND: EntityKind = EntityKind::Customer;

    fn id(&self) -> &str {
        &self.id
    }

    fn assign_id(&mut self, id: String) {
        self.id = id;
    }

    fn last_updated(&self) -> Option<&Timestamp> {
        self.last_updated.as_ref()
    }

    fn set_last_updated(&mut self, timestamp: Timestamp) {
        self.last_updated = Some(timestamp);
    }
}

/// Partial customer update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

impl CustomerPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl RecordPatch<Customer> for CustomerPatch {
    fn apply_to(self, record: &mut Customer) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(phone) = self.phone {
            record.phone = phone;
        }
        if let Some(email) = self.email {
            record.email = email;
        }
        if let Some(address) = self.address {
            record.address = address;
        }
        if let Some(notes) = self.notes {
            record.notes = notes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_customer_new() {
        let customer = Customer::new("Alice", "555");
        assert!(customer.id.starts_with("cust_"));
        assert_eq!(customer.name, "Alice");
        assert_eq!(customer.date_added, customer.last_updated);
        assert!(customer.updated_millis() > 0);
    }

    #[test]
    fn test_matches_identity() {
        let customer = Customer::new("Alice Smith", "555");
        assert!(customer.matches_identity("alice SMITH", "555"));
        assert!(!customer.matches_identity("alice smith", "556"));

        let no_phone = Customer::new("Bob", "");
        assert!(no_phone.matches_identity("bob", ""));
    }

    #[test]
    fn test_deserialize_legacy_shape() {
        let customer: Customer = serde_json::from_str(
            r#"{"id":"c1","name":"Bob","phone":5551234,"email":null,"lastUpdated":"2024-01-01","favoriteColor":"blue"}"#,
        )
        .unwrap();

        assert_eq!(customer.phone, "5551234");
        assert_eq!(customer.email, "");
        assert_eq!(customer.address, "");
        assert_eq!(
            customer.last_updated,
            Some(Timestamp::Text("2024-01-01".to_string()))
        );
        assert_eq!(customer.extra.get("favoriteColor"), Some(&Value::from("blue")));
    }

    #[test]
    fn test_serialize_camel_case_and_extra() {
        let mut customer = Customer::new("Alice", "555");
        customer
            .extra
            .insert("tier".to_string(), Value::from("gold"));
        let json = serde_json::to_value(&customer).unwrap();

        assert!(json.get("dateAdded").is_some());
        assert!(json.get("lastUpdated").is_some());
        assert_eq!(json.get("tier"), Some(&Value::from("gold")));
    }

    #[test]
    fn test_patch_only_touches_present_fields() {
        let mut customer = Customer::new("Alice", "555").with_email("a@example.com");
        CustomerPatch {
            phone: Some("777".to_string()),
            ..CustomerPatch::default()
        }
        .apply_to(&mut customer);

        assert_eq!(customer.phone, "777");
        assert_eq!(customer.name, "Alice");
        assert_eq!(customer.email, "a@example.com");
    }
}
