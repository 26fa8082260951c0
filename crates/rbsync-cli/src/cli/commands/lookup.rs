//! Implementation of `rbsync users` and `rbsync groups`.

use anyhow::Result;

use crate::output::{Formatter, OutputFormat};
use rbsync_core::api::{ReviewApi, ReviewboardHttpApi};
use rbsync_core::config::Settings;

#[tracing::instrument(skip(settings, format))]
pub fn run_users(settings: &Settings, query: &str, format: OutputFormat) -> Result<bool> {
    let api = ReviewboardHttpApi::new(&settings.server)?;
    let users: Vec<String> = api.query_users(query)?.into_iter().collect();
    Formatter::new(format).print_list(&users, "No matching users", "users")?;
    Ok(true)
}

#[tracing::instrument(skip(settings, format))]
pub fn run_groups(settings: &Settings, query: &str, format: OutputFormat) -> Result<bool> {
    let api = ReviewboardHttpApi::new(&settings.server)?;
    let groups: Vec<String> = api.query_groups(query)?.into_iter().collect();
    Formatter::new(format).print_list(&groups, "No matching groups", "groups")?;
    Ok(true)
}
