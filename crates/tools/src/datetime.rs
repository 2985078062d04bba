//! Current date/time lookup tool.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use proto::ToolResult;
use serde_json::{Map, Value};
use tracing::debug;

use crate::{Tool, string_arg};

const DEFAULT_TIMEZONE: &str = "UTC";
const OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S %Z";

/// Tool that reports the current time in an IANA timezone.
pub struct DateTimeTool;

impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        "get_datetime"
    }

    fn description(&self) -> &str {
        "Get the current datetime in a timezone (e.g. UTC, Europe/Madrid)."
    }

    fn parameters(&self) -> Vec<(&'static str, &'static str)> {
        vec![("timezone", "string - IANA timezone")]
    }

    fn execute(&self, args: &Map<String, Value>) -> ToolResult {
        let timezone = string_arg(args, "timezone")
            .filter(|tz| !tz.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        debug!(timezone = %timezone, "Resolving current datetime");
        match format_in_zone(Utc::now(), &timezone) {
            Ok(text) => ToolResult::success(self.name(), text),
            Err(message) => ToolResult::error(self.name(), message),
        }
    }
}

/// Formats `now` in `timezone` as `YYYY-MM-DD HH:MM:SS ZONE`.
pub fn format_in_zone(now: DateTime<Utc>, timezone: &str) -> Result<String, String> {
    let tz: Tz = timezone
        .trim()
        .parse()
        .map_err(|_| format!("Error: unknown timezone '{timezone}'"))?;
    Ok(now.with_timezone(&tz).format(OUTPUT_FORMAT).to_string())
}
