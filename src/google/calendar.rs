//! Google Calendar v3 client

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::token_source::TokenSource;
use crate::config::google::CALENDAR_API;
use crate::dispatch::pool::ServiceClient;
use crate::error::Result;
use crate::google::{ApiTransport, ClientSettings, Service};

/// Calendar id Google resolves to the account's own calendar
pub const PRIMARY_CALENDAR: &str = "primary";

const DEFAULT_MAX_EVENTS: u32 = 25;

/// One calendar in the account's calendar list
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: String,

    #[serde(default)]
    pub summary: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,

    #[serde(default)]
    pub access_role: String,

    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CalendarList {
    #[serde(default)]
    pub items: Vec<CalendarEntry>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Start or end of an event: `date_time` for timed events, `date` for
/// all-day ones
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,

    #[serde(default)]
    pub summary: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
}

/// One page of events
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EventList {
    #[serde(default)]
    pub items: Vec<Event>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Parameters of an event listing. Recurring events are expanded into
/// single instances and ordered by start time.
#[derive(Debug, Clone, Default)]
pub struct ListEventsRequest {
    pub calendar_id: String,

    /// RFC 3339 lower bound on event end
    pub time_min: Option<String>,

    /// RFC 3339 upper bound on event start
    pub time_max: Option<String>,

    pub max_results: Option<u32>,

    /// Free-text search
    pub query: Option<String>,
}

/// A timed event to create
#[derive(Debug, Clone, Default)]
pub struct NewEvent {
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub attendees: Vec<String>,

    /// Popup reminders, in minutes before the start
    pub reminders: Vec<u32>,
}

impl NewEvent {
    fn body(&self) -> Value {
        let mut body = json!({
            "summary": self.summary,
            "start": { "dateTime": self.start_time },
            "end": { "dateTime": self.end_time },
        });
        if let Some(description) = &self.description {
            body["description"] = json!(description);
        }
        if let Some(location) = &self.location {
            body["location"] = json!(location);
        }
        if !self.attendees.is_empty() {
            let attendees: Vec<Value> = self.attendees.iter().map(|e| json!({ "email": e })).collect();
            body["attendees"] = json!(attendees);
        }
        if !self.reminders.is_empty() {
            let overrides: Vec<Value> = self
                .reminders
                .iter()
                .map(|m| json!({ "method": "popup", "minutes": m }))
                .collect();
            body["reminders"] = json!({ "useDefault": false, "overrides": overrides });
        }
        body
    }
}

/// Calendar client for one account
#[derive(Clone)]
pub struct CalendarClient {
    transport: ApiTransport,
}

impl ServiceClient for CalendarClient {
    const SERVICE: Service = Service::Calendar;

    fn connect(tokens: Arc<dyn TokenSource>, settings: &ClientSettings) -> Result<Self> {
        Ok(Self {
            transport: settings.transport(Service::Calendar, CALENDAR_API, tokens),
        })
    }
}

impl CalendarClient {
    /// Calendars the account can see
    pub async fn list_calendars(&self) -> Result<CalendarList> {
        self.transport.get("users/me/calendarList", &[("maxResults", "250")]).await
    }

    pub async fn list_events(&self, request: &ListEventsRequest) -> Result<EventList> {
        let max_results = request
            .max_results
            .unwrap_or(DEFAULT_MAX_EVENTS)
            .clamp(1, 2500)
            .to_string();

        let mut query: Vec<(&str, &str)> = vec![
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
            ("maxResults", max_results.as_str()),
        ];
        if let Some(time_min) = request.time_min.as_deref() {
            query.push(("timeMin", time_min));
        }
        if let Some(time_max) = request.time_max.as_deref() {
            query.push(("timeMax", time_max));
        }
        if let Some(q) = request.query.as_deref().filter(|q| !q.trim().is_empty()) {
            query.push(("q", q));
        }

        self.transport
            .get(&events_path(&request.calendar_id), &query)
            .await
    }

    pub async fn create_event(&self, calendar_id: &str, event: &NewEvent) -> Result<Event> {
        self.transport
            .post(&events_path(calendar_id), &event.body())
            .await
    }
}

fn events_path(calendar_id: &str) -> String {
    let calendar_id = if calendar_id.trim().is_empty() {
        PRIMARY_CALENDAR
    } else {
        calendar_id
    };
    format!("calendars/{}/events", urlencoding::encode(calendar_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_path_encodes_calendar_id() {
        assert_eq!(events_path(""), "calendars/primary/events");
        assert_eq!(
            events_path("team#holiday@group.v.calendar.google.com"),
            "calendars/team%23holiday%40group.v.calendar.google.com/events"
        );
    }

    #[test]
    fn test_new_event_body() {
        let event = NewEvent {
            summary: "Standup".to_string(),
            location: Some("Room 4".to_string()),
            start_time: "2026-03-02T09:00:00+01:00".to_string(),
            end_time: "2026-03-02T09:15:00+01:00".to_string(),
            attendees: vec!["bob@x.com".to_string()],
            reminders: vec![10],
            ..NewEvent::default()
        };

        let body = event.body();
        assert_eq!(body["start"]["dateTime"], "2026-03-02T09:00:00+01:00");
        assert_eq!(body["location"], "Room 4");
        assert!(body.get("description").is_none());
        assert_eq!(body["attendees"][0]["email"], "bob@x.com");
        assert_eq!(body["reminders"]["useDefault"], false);
        assert_eq!(body["reminders"]["overrides"][0]["minutes"], 10);
    }

    #[test]
    fn test_event_list_deserialize() {
        let json = r#"{
            "items": [
                {"id": "e1", "summary": "Lunch", "start": {"date": "2026-03-02"}, "end": {"date": "2026-03-03"}},
                {"id": "e2", "start": {"dateTime": "2026-03-02T10:00:00Z"}}
            ],
            "nextPageToken": "next"
        }"#;
        let list: EventList = serde_json::from_str(json).unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].start.as_ref().unwrap().date.as_deref(), Some("2026-03-02"));
        assert_eq!(list.items[1].summary, "");
        assert_eq!(list.next_page_token.as_deref(), Some("next"));
    }
}
