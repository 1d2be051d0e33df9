//! `POST /predict`
//!
//! The body passes four gates in order: structure, presence, type, range.
//! The first failure becomes the 400 response; nothing after it runs.

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{error::ApiError, AppState};
use crate::config::InputBounds;
use crate::ml::{inference::PowerPrediction, WeatherReading};

pub const TEMPERATURE_FIELD: &str = "temperature";
pub const IRRADIATION_FIELD: &str = "irradiation";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("Request must be JSON with Content-Type: application/json")]
    NotJson,

    #[error("Invalid or empty JSON body")]
    InvalidBody,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field '{0}' must be numeric")]
    NotNumeric(&'static str),

    #[error("{field} must be between {min} and {max}{unit}")]
    OutOfRange {
        field: &'static str,
        min: f64,
        max: f64,
        unit: &'static str,
    },
}

/// `application/json` or any `application/*+json`, parameters ignored
fn is_json_content_type(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

fn require<'a>(payload: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, RequestError> {
    payload.get(field).ok_or(RequestError::MissingField(field))
}

// Only the Number variant passes; `true`/`false` are not numbers here.
fn numeric(field: &'static str, value: &Value) -> Result<f64, RequestError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or(RequestError::NotNumeric(field)),
        Value::Bool(_) | Value::String(_) | Value::Null | Value::Array(_) | Value::Object(_) => {
            Err(RequestError::NotNumeric(field))
        }
    }
}

fn in_range(
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
    unit: &'static str,
) -> Result<f64, RequestError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(RequestError::OutOfRange {
            field,
            min,
            max,
            unit,
        })
    }
}

/// Run all four gates and produce a reading ready for inference
pub fn parse_prediction_request(
    content_type: Option<&str>,
    body: &[u8],
    bounds: &InputBounds,
) -> Result<WeatherReading, RequestError> {
    if !is_json_content_type(content_type) {
        return Err(RequestError::NotJson);
    }
    let payload = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => return Err(RequestError::InvalidBody),
    };

    let temperature = require(&payload, TEMPERATURE_FIELD)?;
    let irradiation = require(&payload, IRRADIATION_FIELD)?;

    let temperature = numeric(TEMPERATURE_FIELD, temperature)?;
    let irradiation = numeric(IRRADIATION_FIELD, irradiation)?;

    let temperature_c = in_range(
        TEMPERATURE_FIELD,
        temperature,
        bounds.temperature_min,
        bounds.temperature_max,
        " Celsius",
    )?;
    let irradiation = in_range(
        IRRADIATION_FIELD,
        irradiation,
        bounds.irradiation_min,
        bounds.irradiation_max,
        "",
    )?;

    Ok(WeatherReading {
        temperature_c,
        irradiation,
    })
}

/// POST /predict - Predict AC power for one weather reading
pub async fn predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PowerPrediction>, ApiError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let reading = parse_prediction_request(content_type, &body, &state.bounds)?;

    let prediction = state.predictor.predict(&reading)?;
    tracing::debug!(
        temperature_c = reading.temperature_c,
        irradiation = reading.irradiation,
        watts = prediction.predicted_ac_power_watts,
        "prediction served"
    );
    Ok(Json(prediction))
}
