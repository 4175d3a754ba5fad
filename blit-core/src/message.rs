//! Inbound message classification and control-message parsing.
//!
//! The transport does not tell us whether a message is pixels or a
//! command, so we sniff the first bytes. Text messages are either a
//! `ping` probe or a JSON document with a `type` field:
//!
//! ```text
//! {"type": "blit_config", "frameWidth": 320, "frameHeight": 240,
//!  "mode": "blit", "frameFormat": "rgb565", "frameSize": 153600}
//! {"type": "rive_config", "screenId": "main"}
//! {"type": "rive_sensor", "sensors": {"temp": {"value": 21.5}}}
//! ```

use serde_json::Value;

use crate::error::IngestError;

/// Bytes inspected by [`classify`].
pub const SNIFF_LEN: usize = 16;

// ── Classification ───────────────────────────────────────────────

/// Outcome of sniffing a raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Pixel payload.
    Binary,
    /// Control message (ping or JSON).
    Text,
}

/// Treat the message as binary if any of the first [`SNIFF_LEN`] bytes
/// is a control character other than newline, carriage return or tab.
pub fn classify(raw: &[u8]) -> MessageKind {
    let binary = raw
        .iter()
        .take(SNIFF_LEN)
        .any(|&b| b < 0x20 && !matches!(b, b'\n' | b'\r' | b'\t'));
    if binary {
        MessageKind::Binary
    } else {
        MessageKind::Text
    }
}

// ── ControlMessage ───────────────────────────────────────────────

/// `blit_config`: the sender announces the geometry of upcoming frames.
#[derive(Debug, Clone, PartialEq)]
pub struct BlitConfig {
    /// `None` when the message omits width or height.
    pub geometry: Option<(u16, u16)>,
    pub mode: Option<String>,
    pub frame_format: Option<String>,
    pub frame_size: Option<u64>,
    pub description: Option<String>,
}

/// A single reading from a `sensor` message.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Display(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub name: String,
    pub value: SensorValue,
}

/// A parsed text message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Liveness probe, answered with `pong`.
    Ping,
    BlitConfig(BlitConfig),
    /// `rive_config` / `config`. Informational only.
    ScreenConfig { screen_id: Option<String> },
    /// `rive_sensor` / `sensor`. Informational only.
    Sensors(Vec<SensorReading>),
}

impl ControlMessage {
    /// Parse a text message.
    pub fn parse(text: &str) -> Result<Self, IngestError> {
        if text.starts_with("ping") {
            return Ok(ControlMessage::Ping);
        }

        let doc: Value =
            serde_json::from_str(text).map_err(|e| IngestError::Malformed(e.to_string()))?;
        let kind = doc.get("type").and_then(Value::as_str).unwrap_or("unknown");

        match kind {
            "blit_config" => parse_blit_config(&doc).map(ControlMessage::BlitConfig),
            "rive_config" | "config" => Ok(ControlMessage::ScreenConfig {
                screen_id: doc.get("screenId").map(value_to_string),
            }),
            "rive_sensor" | "sensor" => Ok(ControlMessage::Sensors(parse_sensors(&doc))),
            other => Err(IngestError::UnknownControl(other.to_string())),
        }
    }
}

/// `frameWidth`/`frameHeight` win; `width`/`height` are read only when
/// the long key is absent.
fn parse_blit_config(doc: &Value) -> Result<BlitConfig, IngestError> {
    let width = doc.get("frameWidth").or_else(|| doc.get("width"));
    let height = doc.get("frameHeight").or_else(|| doc.get("height"));

    let geometry = match (width, height) {
        (Some(w), Some(h)) => match (dimension(w), dimension(h)) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => {
                return Err(IngestError::InvalidDimensions {
                    width: value_to_string(w),
                    height: value_to_string(h),
                });
            }
        },
        _ => None,
    };

    Ok(BlitConfig {
        geometry,
        mode: doc.get("mode").map(value_to_string),
        frame_format: doc.get("frameFormat").map(value_to_string),
        frame_size: doc.get("frameSize").and_then(Value::as_u64),
        description: doc.get("description").map(value_to_string),
    })
}

/// A positive integral dimension that fits `u16`. Accepts JSON numbers
/// (including `320.0`) and numeric strings.
fn dimension(v: &Value) -> Option<u16> {
    let n = match v {
        Value::Number(n) => match n.as_u64() {
            Some(u) => u,
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 || f < 0.0 {
                    return None;
                }
                f as u64
            }
        },
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    u16::try_from(n).ok().filter(|&d| d > 0)
}

fn parse_sensors(doc: &Value) -> Vec<SensorReading> {
    let Some(sensors) = doc.get("sensors").and_then(Value::as_object) else {
        return Vec::new();
    };
    sensors
        .iter()
        .filter_map(|(name, sensor)| {
            let value = if let Some(display) = sensor.get("displayValue") {
                SensorValue::Display(value_to_string(display))
            } else {
                SensorValue::Number(sensor.get("value")?.as_f64()?)
            };
            Some(SensorReading {
                name: name.clone(),
                value,
            })
        })
        .collect()
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────
