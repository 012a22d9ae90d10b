//! Event domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A scheduled watch party, owned by its host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub location: String,
    pub host_id: Uuid,
    /// Host e-mail captured at creation, normalized.
    pub host_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn is_host(&self, user_id: Uuid) -> bool {
        self.host_id == user_id
    }
}

/// Data required to persist a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub location: String,
    pub host_id: Uuid,
    pub host_email: String,
}

/// Request to create an event.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 5000, message = "description must be at most 5000 characters"))]
    pub description: Option<String>,

    pub scheduled_at: DateTime<Utc>,

    #[validate(length(min = 1, max = 255, message = "location must be 1-255 characters"))]
    pub location: String,
}

/// Event as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EventResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub scheduled_at: DateTime<Utc>,
    pub location: String,
    pub host_id: Uuid,
    pub host_email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            title: event.title,
            description: event.description,
            scheduled_at: event.scheduled_at,
            location: event.location,
            host_id: event.host_id,
            host_email: event.host_email,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(title: &str, location: &str) -> CreateEventRequest {
        CreateEventRequest {
            title: title.to_string(),
            description: None,
            scheduled_at: Utc::now(),
            location: location.to_string(),
        }
    }

    #[test]
    fn test_create_event_request_validation() {
        assert!(request("Movie night", "Living room").validate().is_ok());
        assert!(request("", "Living room").validate().is_err());
        assert!(request("Movie night", "").validate().is_err());
        assert!(request(&"x".repeat(256), "Living room").validate().is_err());
    }

    #[test]
    fn test_create_event_request_description_is_optional() {
        let json = r#"{"title":"Dune","scheduled_at":"2030-01-01T20:00:00Z","location":"Cinema"}"#;
        let req: CreateEventRequest = serde_json::from_str(json).unwrap();
        assert!(req.description.is_none());
        assert!(req.validate().is_ok());
    }
}
