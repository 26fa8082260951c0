//! Blocking client for the review system's JSON web API.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;

use super::{ApiError, ReviewApi};
use crate::config::ServerSettings;

const QUERY_LIMIT: &str = "150";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Draft fields settable through `draft/set/<field>/`.
#[derive(Debug, Clone, Copy)]
enum DraftField {
    TargetPeople,
    BugsClosed,
    TargetGroups,
    ChangeDescription,
}

impl DraftField {
    const fn as_str(self) -> &'static str {
        match self {
            Self::TargetPeople => "target_people",
            Self::BugsClosed => "bugs_closed",
            Self::TargetGroups => "target_groups",
            Self::ChangeDescription => "changedescription",
        }
    }
}

fn draft_path(review_id: u64, field: DraftField) -> String {
    format!(
        "/api/json/reviewrequests/{review_id}/draft/set/{}/",
        field.as_str()
    )
}

fn publish_path(review_id: u64) -> String {
    format!("/api/json/reviewrequests/{review_id}/publish/")
}

/// Review system client using HTTP basic authentication.
#[derive(Clone)]
pub struct ReviewboardHttpApi {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for ReviewboardHttpApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewboardHttpApi")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ReviewboardHttpApi {
    pub fn new(server: &ServerSettings) -> Result<Self, ApiError> {
        let base_url = server.base_url().to_string();
        let timeout = server.api_timeout();
        let client = Client::builder()
            .user_agent(concat!("rbsync/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|source| ApiError::Transport {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base_url,
            username: server.username.clone(),
            password: server.password.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn send(&self, url: &str, request: RequestBuilder) -> Result<Value, ApiError> {
        let response = request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .map_err(|source| ApiError::Transport {
                url: url.to_string(),
                source,
            })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;
        check_response(url, status, &body)
    }

    fn post(&self, path: &str, form: &[(&str, &str)]) -> Result<Value, ApiError> {
        let url = self.url(path);
        tracing::debug!(url, "POST");
        self.send(&url, self.client.post(&url).form(form))
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        let url = self.url(path);
        tracing::debug!(url, "GET");
        self.send(&url, self.client.get(&url).query(query))
    }

    fn set_field(&self, review_id: u64, field: DraftField, value: &str) -> Result<(), ApiError> {
        self.post(&draft_path(review_id, field), &[("value", value)])
            .map(|_| ())
    }

    fn search(
        &self,
        path: &str,
        query: &str,
        flag: &str,
        list_key: &str,
        name_key: &str,
    ) -> Result<BTreeSet<String>, ApiError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let body = self.get(
            path,
            &[
                ("q", query),
                ("limit", QUERY_LIMIT),
                ("timestamp", &timestamp),
                (flag, "0"),
            ],
        )?;
        names_from(&self.url(path), &body, list_key, name_key)
    }
}

impl ReviewApi for ReviewboardHttpApi {
    fn set_reviewers(&self, review_id: u64, reviewers: &str) -> Result<(), ApiError> {
        self.set_field(review_id, DraftField::TargetPeople, reviewers)
    }

    fn set_bugs(&self, review_id: u64, bugs: &str) -> Result<(), ApiError> {
        self.set_field(review_id, DraftField::BugsClosed, bugs)
    }

    fn set_groups(&self, review_id: u64, groups: &str) -> Result<(), ApiError> {
        self.set_field(review_id, DraftField::TargetGroups, groups)
    }

    fn set_change_description(&self, review_id: u64, text: &str) -> Result<(), ApiError> {
        self.set_field(review_id, DraftField::ChangeDescription, text)
    }

    fn publish(&self, review_id: u64) -> Result<(), ApiError> {
        self.post(&publish_path(review_id), &[]).map(|_| ())
    }

    fn query_users(&self, query: &str) -> Result<BTreeSet<String>, ApiError> {
        self.search("/api/json/users/", query, "fullname", "users", "username")
    }

    fn query_groups(&self, query: &str) -> Result<BTreeSet<String>, ApiError> {
        self.search("/api/json/groups/", query, "displayname", "groups", "name")
    }
}

/// Accept 2xx/3xx responses whose JSON body reports `stat: ok`.
fn check_response(url: &str, status: u16, body: &str) -> Result<Value, ApiError> {
    if !(200..400).contains(&status) {
        return Err(ApiError::Status {
            url: url.to_string(),
            status,
        });
    }

    let value: Value = serde_json::from_str(body).map_err(|e| ApiError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match value.get("stat").and_then(Value::as_str) {
        Some(stat) if stat.eq_ignore_ascii_case("ok") => Ok(value),
        Some(stat) => {
            let message = value
                .pointer("/err/msg")
                .and_then(Value::as_str)
                .map_or_else(|| format!("stat={stat}"), ToString::to_string);
            Err(ApiError::Rejected {
                url: url.to_string(),
                message,
            })
        }
        None => Err(ApiError::Malformed {
            url: url.to_string(),
            reason: "missing stat".to_string(),
        }),
    }
}

fn names_from(
    url: &str,
    body: &Value,
    list_key: &str,
    name_key: &str,
) -> Result<BTreeSet<String>, ApiError> {
    let entries = body
        .get(list_key)
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::Malformed {
            url: url.to_string(),
            reason: format!("missing {list_key} list"),
        })?;

    Ok(entries
        .iter()
        .filter_map(|entry| entry.get(name_key).and_then(Value::as_str))
        .map(ToString::to_string)
        .collect())
}
