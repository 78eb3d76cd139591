use log::debug;

/// Channel key used when an event carries no usable identifier at all.
pub const UNKNOWN_CHANNEL_KEY: &str = "unknown";

/// Identifiers the resolver matches on, derived from one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub email: Option<String>,
    pub channel_key: String,
    pub display_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Normalize a raw inbound sender into a `SenderIdentity`. Total: any
/// combination of missing or blank fields still produces a usable identity.
pub fn normalize_sender(
    sender_email: Option<&str>,
    sender_name: Option<&str>,
    channel_id: Option<&str>,
) -> SenderIdentity {
    let email = non_blank(sender_email).map(|e| e.to_lowercase());
    let name = non_blank(sender_name);
    let platform_id = non_blank(channel_id);

    // Ordered by stability: a platform-assigned id survives renames and
    // address changes, an e-mail survives renames, a free-text name is last.
    let candidates = [
        ("channel_id", platform_id.as_deref()),
        ("email", email.as_deref()),
        ("sender_name", name.as_deref()),
    ];
    let (key_source, channel_key) = candidates
        .iter()
        .find_map(|(source, value)| value.map(|v| (*source, v.to_string())))
        .unwrap_or_else(|| ("sentinel", UNKNOWN_CHANNEL_KEY.to_string()));
    debug!("channel key {:?} taken from {}", channel_key, key_source);

    let display_name = name
        .clone()
        .or_else(|| email.clone())
        .unwrap_or_else(|| channel_key.clone());

    let (first_name, last_name) = match name.as_deref() {
        Some(full) => split_name(full),
        None => (None, None),
    };

    SenderIdentity {
        email,
        channel_key,
        display_name,
        first_name,
        last_name,
    }
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Split a display name at the first whitespace run; a single token has no
/// last name.
fn split_name(full: &str) -> (Option<String>, Option<String>) {
    let mut parts = full.splitn(2, char::is_whitespace);
    let first = parts.next().map(str::to_string);
    let last = parts
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    (first, last)
}

#[cfg(test)]
#[path = "identity.test.rs"]
mod tests;
