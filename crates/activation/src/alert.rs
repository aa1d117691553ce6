//! Alert payload and fan-out results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sos_contacts::EmergencyContact;
use sos_location::Location;
use uuid::Uuid;

use crate::ActivationId;

const MAPS_BASE_URL: &str = "https://maps.google.com/?q=";

/// Everything a recipient is told when a countdown expires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub activation: ActivationId,
    pub timestamp: DateTime<Utc>,
    /// Last known fix at dispatch time. Never fetched on demand.
    pub location: Option<Location>,
    pub user_name: String,
    /// Primary contact first, remaining contacts in registry order.
    pub recipients: Vec<EmergencyContact>,
}

impl Alert {
    pub fn new(
        activation: ActivationId,
        location: Option<Location>,
        user_name: impl Into<String>,
        recipients: Vec<EmergencyContact>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            activation,
            timestamp: Utc::now(),
            location,
            user_name: user_name.into(),
            recipients,
        }
    }

    pub fn has_location(&self) -> bool {
        self.location.is_some()
    }

    /// Map link for the attached fix.
    pub fn maps_url(&self) -> Option<String> {
        self.location.as_ref().map(|loc| {
            format!(
                "{}{:.6},{:.6}",
                MAPS_BASE_URL, loc.latitude, loc.longitude
            )
        })
    }

    /// Text sent to each recipient.
    pub fn message_body(&self) -> String {
        let sender = self.user_name.trim();
        let mut body = if sender.is_empty() {
            "EMERGENCY SOS. I need help.".to_string()
        } else {
            format!("EMERGENCY SOS from {sender}. I need help.")
        };

        match (&self.location, self.maps_url()) {
            (Some(loc), Some(url)) => {
                body.push_str(&format!(" My location: {url}"));
                if let Some(accuracy) = loc.accuracy {
                    body.push_str(&format!(" (accuracy {accuracy:.0} m)"));
                }
                body.push_str(&format!(
                    ", recorded at {} UTC.",
                    loc.timestamp.format("%H:%M:%S")
                ));
            }
            _ => body.push_str(" My location is unavailable."),
        }
        body
    }
}

/// Delivery result for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientOutcome {
    pub contact_id: String,
    pub contact_name: String,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecipientOutcome {
    pub fn delivered(contact: &EmergencyContact) -> Self {
        Self {
            contact_id: contact.id.clone(),
            contact_name: contact.name.clone(),
            delivered: true,
            error: None,
        }
    }

    pub fn failed(contact: &EmergencyContact, error: impl Into<String>) -> Self {
        Self {
            contact_id: contact.id.clone(),
            contact_name: contact.name.clone(),
            delivered: false,
            error: Some(error.into()),
        }
    }
}

/// An alert together with how each delivery went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertReport {
    pub alert: Alert,
    pub outcomes: Vec<RecipientOutcome>,
}

impl AlertReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.delivered)
            .map(|o| o.contact_name.as_str())
            .collect()
    }

    pub fn all_delivered(&self) -> bool {
        !self.outcomes.is_empty() && self.failed() == 0
    }
}
