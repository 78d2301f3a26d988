//! Transport-independent pieces of the HTTP control plane, shared by the
//! host (axum) and ESP32 (esp-idf) servers.

use crate::{error::CommandError, relay::RelayBank};

pub const PATH_ROOT: &str = "/";
pub const PATH_STATUS: &str = "/status";
pub const PATH_RELAY: &str = "/relay";

pub const PARAM_CHANNEL: &str = "ch";
pub const PARAM_STATE: &str = "state";

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain";

pub const NOT_FOUND_MESSAGE: &str = "Not found";
pub const BANNER: &str = "Room Temp Controller API. Use /status or /relay?ch=2&state=1";

/// Sent on every response, preflight included. The API is meant for a trusted LAN.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayCommand {
    pub channel: u8,
    pub on: bool,
}

pub fn parse_relay_command(
    channel: Option<&str>,
    state: Option<&str>,
) -> Result<RelayCommand, CommandError> {
    let (Some(channel), Some(state)) = (channel, state) else {
        return Err(CommandError::MissingParams);
    };

    let channel = parse_int_lenient(channel);
    if !RelayBank::is_valid_channel(channel) {
        return Err(CommandError::ChannelOutOfRange);
    }

    Ok(RelayCommand {
        channel: channel as u8,
        on: parse_int_lenient(state) != 0,
    })
}

/// Integer parse that never fails: skips leading whitespace, accepts one sign,
/// then takes leading digits. Anything without leading digits is 0.
pub fn parse_int_lenient(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0_i64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(i64::from(digit - b'0'))
        });

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Looks up `key` in the query string of `uri`, decoding `+` and `%XX`.
pub fn query_param(uri: &str, key: &str) -> Option<String> {
    query_value(uri.split_once('?')?.1, key)
}

/// Looks up `key` in a raw query string. A repeated key resolves to its first value.
pub fn query_value(query: &str, key: &str) -> Option<String> {
    let query = query.split('#').next().unwrap_or_default();
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
        (percent_decode(name) == key).then(|| percent_decode(value))
    })
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => decoded.push(b' '),
            b'%' if index + 2 < bytes.len()
                && bytes[index + 1].is_ascii_hexdigit()
                && bytes[index + 2].is_ascii_hexdigit() =>
            {
                decoded.push((hex_value(bytes[index + 1]) << 4) | hex_value(bytes[index + 2]));
                index += 2;
            }
            byte => decoded.push(byte),
        }
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_params_required() {
        assert_eq!(
            parse_relay_command(None, None),
            Err(CommandError::MissingParams)
        );
        assert_eq!(
            parse_relay_command(Some("2"), None),
            Err(CommandError::MissingParams)
        );
        assert_eq!(
            parse_relay_command(None, Some("1")),
            Err(CommandError::MissingParams)
        );
    }

    #[test]
    fn channel_must_be_in_range() {
        for channel in ["0", "5", "-1", "abc", ""] {
            assert_eq!(
                parse_relay_command(Some(channel), Some("1")),
                Err(CommandError::ChannelOutOfRange),
                "channel {channel:?}"
            );
        }
    }

    #[test]
    fn nonzero_state_means_on() {
        let on = |state| parse_relay_command(Some("3"), Some(state)).unwrap().on;
        assert!(on("1"));
        assert!(on("7"));
        assert!(on("-2"));
        assert!(!on("0"));
        assert!(!on("off"));
        assert!(!on(""));
    }

    #[test]
    fn command_carries_channel() {
        assert_eq!(
            parse_relay_command(Some("4"), Some("1")),
            Ok(RelayCommand {
                channel: 4,
                on: true
            })
        );
    }

    #[test]
    fn lenient_int_parsing() {
        assert_eq!(parse_int_lenient("2abc"), 2);
        assert_eq!(parse_int_lenient("abc"), 0);
        assert_eq!(parse_int_lenient(" -1"), -1);
        assert_eq!(parse_int_lenient("+3"), 3);
        assert_eq!(parse_int_lenient("-"), 0);
        assert_eq!(parse_int_lenient("1.9"), 1);
        assert_eq!(parse_int_lenient("99999999999999999999999"), i64::MAX);
    }

    #[test]
    fn query_lookup() {
        let uri = "/relay?ch=2&state=1";
        assert_eq!(query_param(uri, "ch").as_deref(), Some("2"));
        assert_eq!(query_param(uri, "state").as_deref(), Some("1"));
        assert_eq!(query_param(uri, "missing"), None);
        assert_eq!(query_param("/relay", "ch"), None);
        assert_eq!(query_param("/relay?ch", "ch").as_deref(), Some(""));
        assert_eq!(query_param("/relay?ch=%33", "ch").as_deref(), Some("3"));
        assert_eq!(query_param("/relay?ch=1%", "ch").as_deref(), Some("1%"));
    }

    #[test]
    fn repeated_key_takes_first_value() {
        assert_eq!(query_value("ch=2&ch=9&state=1", "ch").as_deref(), Some("2"));
        assert_eq!(
            query_param("/relay?ch=2&ch=9&state=1", "ch").as_deref(),
            Some("2")
        );
        assert_eq!(query_value("", "ch"), None);
    }
}
