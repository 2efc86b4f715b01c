//! Telemetry broadcast decoding
//!
//! The drone broadcasts its status roughly ten times a second as a single
//! line of `key:value;` pairs:
//! ```text
//! pitch:0;roll:-1;yaw:12;vgx:0;vgy:0;vgz:0;templ:60;temph:63;tof:10;h:0;bat:87;baro:101.42;time:0;agx:-3.00;agy:1.00;agz:-999.00;
//! ```

use std::fmt::Write;

use crate::error::TelemetryError;

/// Decoded drone status
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryState {
    /// Attitude in degrees
    pub pitch: i32,
    pub roll: i32,
    pub yaw: i32,
    /// Velocity in cm/s
    pub vgx: i32,
    pub vgy: i32,
    pub vgz: i32,
    /// Lowest and highest board temperature in degrees C
    pub templ: i32,
    pub temph: i32,
    /// Time-of-flight distance to ground in cm
    pub tof: i32,
    /// Height above takeoff point in cm
    pub h: i32,
    /// Battery percentage
    pub bat: u32,
    /// Barometer altitude in m
    pub baro: f64,
    /// Motor-on time in seconds
    pub time: u32,
    /// Acceleration in 0.001 g
    pub agx: f64,
    pub agy: f64,
    pub agz: f64,
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, TelemetryError> {
    value.parse().map_err(|_| TelemetryError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl TelemetryState {
    /// Parse one telemetry datagram
    ///
    /// Unknown keys are skipped so newer firmware fields do not break decoding.
    pub fn parse(text: &str) -> Result<Self, TelemetryError> {
        let mut state = Self::default();
        let mut known = 0usize;

        for pair in text.trim().split(';') {
            let Some((key, value)) = pair.split_once(':') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "pitch" => state.pitch = parse_value(key, value)?,
                "roll" => state.roll = parse_value(key, value)?,
                "yaw" => state.yaw = parse_value(key, value)?,
                "vgx" => state.vgx = parse_value(key, value)?,
                "vgy" => state.vgy = parse_value(key, value)?,
                "vgz" => state.vgz = parse_value(key, value)?,
                "templ" => state.templ = parse_value(key, value)?,
                "temph" => state.temph = parse_value(key, value)?,
                "tof" => state.tof = parse_value(key, value)?,
                "h" => state.h = parse_value(key, value)?,
                "bat" => state.bat = parse_value(key, value)?,
                "baro" => state.baro = parse_value(key, value)?,
                "time" => state.time = parse_value(key, value)?,
                "agx" => state.agx = parse_value(key, value)?,
                "agy" => state.agy = parse_value(key, value)?,
                "agz" => state.agz = parse_value(key, value)?,
                _ => continue,
            }
            known += 1;
        }

        if known == 0 {
            return Err(TelemetryError::Empty);
        }

        Ok(state)
    }

    /// Parse a raw datagram
    pub fn from_bytes(raw: &[u8]) -> Result<Self, TelemetryError> {
        let text = std::str::from_utf8(raw).map_err(|_| TelemetryError::NotText)?;
        if !text.is_ascii() {
            return Err(TelemetryError::NotText);
        }
        Self::parse(text)
    }

    /// Render in the drone's broadcast format
    pub fn to_wire(&self) -> String {
        let mut out = String::with_capacity(160);
        let _ = write!(
            out,
            "pitch:{};roll:{};yaw:{};vgx:{};vgy:{};vgz:{};templ:{};temph:{};tof:{};h:{};bat:{};baro:{:.2};time:{};agx:{:.2};agy:{:.2};agz:{:.2};\r\n",
            self.pitch,
            self.roll,
            self.yaw,
            self.vgx,
            self.vgy,
            self.vgz,
            self.templ,
            self.temph,
            self.tof,
            self.h,
            self.bat,
            self.baro,
            self.time,
            self.agx,
            self.agy,
            self.agz,
        );
        out
    }
}
