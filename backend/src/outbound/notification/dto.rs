//! Wire body posted to the notification relay.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(super) struct NotificationRequestDto<'a> {
    pub(super) to: &'a str,
    pub(super) template: &'a str,
    pub(super) data: &'a Value,
}
