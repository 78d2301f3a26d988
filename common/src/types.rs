use serde::Serialize;

use crate::relay::RelayStates;

/// Body of `GET /status` and of a successful `GET /relay`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusPayload {
    pub mode: &'static str,
    pub manual_remaining_s: u64,
    pub target_temp: f64,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub relay: RelayStates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Rounds to one decimal place for the wire.
pub fn one_decimal(value: f32) -> f64 {
    (f64::from(value) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn status_serializes_with_fixed_keys() {
        let payload = StatusPayload {
            mode: "AUTO",
            manual_remaining_s: 0,
            target_temp: one_decimal(26.0),
            temperature: None,
            humidity: Some(one_decimal(61.0)),
            relay: RelayStates {
                ch1: false,
                ch2: true,
                ch3: false,
                ch4: false,
            },
        };

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "mode": "AUTO",
                "manual_remaining_s": 0,
                "target_temp": 26.0,
                "temperature": null,
                "humidity": 61.0,
                "relay": {"ch1": false, "ch2": true, "ch3": false, "ch4": false}
            })
        );
    }

    #[test]
    fn one_decimal_rounds_half_away_from_zero() {
        assert_eq!(one_decimal(26.34), 26.3);
        assert_eq!(one_decimal(26.36), 26.4);
        assert_eq!(one_decimal(-3.25), -3.3);
        assert_eq!(serde_json::to_string(&one_decimal(26.3)).unwrap(), "26.3");
    }

    #[test]
    fn error_body_shape() {
        assert_eq!(
            serde_json::to_string(&ErrorBody::new("Not found")).unwrap(),
            r#"{"error":"Not found"}"#
        );
    }
}
