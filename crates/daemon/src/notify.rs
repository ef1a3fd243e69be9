// SPDX-License-Identifier: MIT

//! Desktop notifications for fatal conditions.

/// Best-effort desktop notification; failures are logged and dropped.
pub fn operator(title: &str, body: &str) {
    let title = title.to_string();
    let body = body.to_string();
    // The notification call can block on the session bus
    tokio::task::spawn_blocking(move || {
        if let Err(err) = notify_rust::Notification::new()
            .summary(&title)
            .body(&body)
            .appname("reeve")
            .show()
        {
            tracing::debug!(error = %err, "desktop notification failed");
        }
    });
}
