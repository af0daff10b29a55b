//! Calendar tools

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Local, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::Dispatcher;
use crate::error::{McpError, Result, WorkspaceMcpError};
use crate::google::calendar::{
    CalendarClient, EventList, ListEventsRequest, NewEvent, PRIMARY_CALENDAR,
};
use crate::handlers::fan_out_json;
use crate::mcp::tools::{
    object_schema, parse_args, resource_def, tool_def, unknown_tool, with_account, ServiceHandler,
};
use crate::mcp::types::{Resource, Tool};

const TODAY_URI: &str = "calendar://today";
const DEFAULT_MAX_PER_ACCOUNT: u32 = 50;

#[derive(Debug, Deserialize)]
struct AccountArgs {
    account: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListEventsArgs {
    account: Option<String>,
    calendar_id: String,
    time_min: Option<String>,
    time_max: Option<String>,
    max_results: Option<u32>,
    query: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateEventArgs {
    account: Option<String>,
    calendar_id: String,
    summary: String,
    description: Option<String>,
    location: Option<String>,
    start_time: String,
    end_time: String,
    #[serde(default)]
    attendees: Vec<String>,
    #[serde(default)]
    reminders: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct ListAllArgs {
    time_min: Option<String>,
    time_max: Option<String>,
    max_results: Option<u32>,
}

pub struct CalendarHandler {
    dispatcher: Dispatcher<CalendarClient>,
}

impl CalendarHandler {
    pub fn new(dispatcher: Dispatcher<CalendarClient>) -> Self {
        Self { dispatcher }
    }

    async fn list_calendars(&self, args: Value) -> Result<Value> {
        let args: AccountArgs = parse_args(args)?;

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let list = client.list_calendars().await?;
                Ok(json!({
                    "count": list.items.len(),
                    "calendars": list.items,
                }))
            })
            .await
    }

    async fn list_events(&self, args: Value) -> Result<Value> {
        let args: ListEventsArgs = parse_args(args)?;
        if let Some(time_min) = args.time_min.as_deref() {
            parse_time("time_min", time_min)?;
        }
        if let Some(time_max) = args.time_max.as_deref() {
            parse_time("time_max", time_max)?;
        }

        // a calendar id that is an email also names the account to use
        let hint = args
            .account
            .or_else(|| args.calendar_id.contains('@').then(|| args.calendar_id.clone()));
        let request = ListEventsRequest {
            calendar_id: args.calendar_id,
            time_min: args.time_min,
            time_max: args.time_max,
            max_results: args.max_results,
            query: args.query,
        };

        self.dispatcher
            .dispatch(hint.as_deref(), |client| async move {
                let list = client.list_events(&request).await?;
                event_list_json(list)
            })
            .await
    }

    async fn create_event(&self, args: Value) -> Result<Value> {
        let args: CreateEventArgs = parse_args(args)?;
        if args.summary.trim().is_empty() {
            return Err(WorkspaceMcpError::invalid_arguments("summary must not be empty"));
        }
        let start = parse_time("start_time", &args.start_time)?;
        let end = parse_time("end_time", &args.end_time)?;
        if end <= start {
            return Err(WorkspaceMcpError::invalid_arguments(
                "end_time must be after start_time",
            ));
        }

        let calendar_id = args.calendar_id;
        let event = NewEvent {
            summary: args.summary,
            description: args.description,
            location: args.location,
            start_time: args.start_time,
            end_time: args.end_time,
            attendees: args.attendees,
            reminders: args.reminders,
        };

        self.dispatcher
            .dispatch(args.account.as_deref(), |client| async move {
                let created = client.create_event(&calendar_id, &event).await?;
                Ok(json!({
                    "message": format!("Event '{}' created", event.summary),
                    "event": created,
                }))
            })
            .await
    }

    async fn list_all(&self, args: Value) -> Result<Value> {
        let args: ListAllArgs = parse_args(args)?;
        let time_min = match args.time_min {
            Some(t) => {
                parse_time("time_min", &t)?;
                t
            }
            None => start_of_today(),
        };
        let time_max = match args.time_max {
            Some(t) => {
                parse_time("time_max", &t)?;
                t
            }
            None => day_after(&time_min)?,
        };
        let max_results = args.max_results.unwrap_or(DEFAULT_MAX_PER_ACCOUNT);

        self.events_everywhere(time_min, time_max, max_results).await
    }

    async fn events_everywhere(
        &self,
        time_min: String,
        time_max: String,
        max_results: u32,
    ) -> Result<Value> {
        let request = ListEventsRequest {
            calendar_id: PRIMARY_CALENDAR.to_string(),
            time_min: Some(time_min.clone()),
            time_max: Some(time_max.clone()),
            max_results: Some(max_results),
            query: None,
        };

        let outcome = self
            .dispatcher
            .fan_out(|client: Arc<CalendarClient>| {
                let request = request.clone();
                async move { client.list_events(&request).await }
            })
            .await?;

        let mut value = fan_out_json(outcome, |list: &EventList| list.items.len())?;
        value["time_range"] = json!({ "start": time_min, "end": time_max });
        Ok(value)
    }
}

fn event_list_json(list: EventList) -> Result<Value> {
    Ok(json!({
        "count": list.items.len(),
        "events": list.items,
        "next_page_token": list.next_page_token,
    }))
}

fn parse_time(field: &str, value: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|e| {
        WorkspaceMcpError::invalid_arguments(format!(
            "{} must be an RFC 3339 timestamp ({}): {}",
            field, e, value
        ))
    })
}

/// Local midnight today, RFC 3339
fn start_of_today() -> String {
    Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|start| start.to_rfc3339())
        .unwrap_or_else(|| Utc::now().to_rfc3339())
}

fn day_after(time_min: &str) -> Result<String> {
    let start = parse_time("time_min", time_min)?;
    Ok((start + Duration::hours(24)).to_rfc3339())
}

#[async_trait]
impl ServiceHandler for CalendarHandler {
    fn tools(&self) -> Vec<Tool> {
        let calendar_id = json!({
            "type": "string",
            "description": "Calendar ID; use 'primary' for the account's main calendar"
        });
        let time_min = json!({ "type": "string", "description": "Start time (RFC 3339)" });
        let time_max = json!({ "type": "string", "description": "End time (RFC 3339)" });

        vec![
            tool_def(
                "calendar_list",
                "List the calendars an account can access",
                with_account(object_schema(json!({}), &[])),
            ),
            tool_def(
                "calendar_events_list",
                "List events from one calendar, optionally within a time range",
                with_account(object_schema(
                    json!({
                        "calendar_id": calendar_id,
                        "time_min": time_min,
                        "time_max": time_max,
                        "max_results": { "type": "integer", "description": "Maximum number of events (default 25)" },
                        "query": { "type": "string", "description": "Free-text search over event fields" }
                    }),
                    &["calendar_id"],
                )),
            ),
            tool_def(
                "calendar_event_create",
                "Create a timed event",
                with_account(object_schema(
                    json!({
                        "calendar_id": calendar_id,
                        "summary": { "type": "string", "description": "Event title" },
                        "description": { "type": "string" },
                        "location": { "type": "string" },
                        "start_time": { "type": "string", "description": "Start time (RFC 3339)" },
                        "end_time": { "type": "string", "description": "End time (RFC 3339)" },
                        "attendees": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Attendee email addresses"
                        },
                        "reminders": {
                            "type": "array",
                            "items": { "type": "integer" },
                            "description": "Popup reminders, minutes before the start"
                        }
                    }),
                    &["calendar_id", "summary", "start_time", "end_time"],
                )),
            ),
            tool_def(
                "calendar_events_list_all_accounts",
                "List primary-calendar events of every account (defaults to today)",
                object_schema(
                    json!({
                        "time_min": { "type": "string", "description": "Start time (RFC 3339, defaults to local midnight today)" },
                        "time_max": { "type": "string", "description": "End time (RFC 3339, defaults to 24 hours after the start)" },
                        "max_results": { "type": "integer", "description": "Maximum number of events per account (default 50)" }
                    }),
                    &[],
                ),
            ),
        ]
    }

    fn resources(&self) -> Vec<Resource> {
        vec![resource_def(
            TODAY_URI,
            "Today's events",
            "Today's primary-calendar events of every account",
        )]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        match name {
            "calendar_list" => self.list_calendars(arguments).await,
            "calendar_events_list" => self.list_events(arguments).await,
            "calendar_event_create" => self.create_event(arguments).await,
            "calendar_events_list_all_accounts" => self.list_all(arguments).await,
            _ => Err(unknown_tool(name)),
        }
    }

    async fn read_resource(&self, uri: &str) -> Result<Value> {
        match uri {
            TODAY_URI => {
                let time_min = start_of_today();
                let time_max = day_after(&time_min)?;
                self.events_everywhere(time_min, time_max, DEFAULT_MAX_PER_ACCOUNT)
                    .await
            }
            _ => Err(WorkspaceMcpError::Mcp(McpError::UnknownResource {
                uri: uri.to_string(),
            })),
        }
    }
}
