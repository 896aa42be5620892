use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// one edge-uploader cycle worth of sensor values
/// serialized as the json snapshot that is uploaded next to each photo
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct EdgeReading {
    /// moving average of the last few lux samples
    pub lux: f64,
    /// celsius
    pub temperature: f64,
    /// relative humidity (0-100%)
    pub humidity: f64,
    /// hPa
    pub pressure: f64,
    /// adc voltage scaled to a uv index
    pub uv_index: f64,
}

/// a single light logger record pushed to the realtime database
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub struct LightRecord {
    /// unix time in (fractional) seconds
    pub timestamp: f64,
    pub lux: f64,
}

impl LightRecord {
    pub fn now(lux: f64) -> Self {
        Self { timestamp: unix_seconds(Utc::now()), lux }
    }
}

pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// `photo_20240517_134501.jpg`
pub fn photo_file_name(at: DateTime<Local>) -> String {
    format!("photo_{}.jpg", at.format("%Y%m%d_%H%M%S"))
}

/// `sensor_data_20240517_134501.json`
pub fn snapshot_file_name(at: DateTime<Local>) -> String {
    format!("sensor_data_{}.json", at.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_names_use_second_resolution_stamp() {
        let at = Local.with_ymd_and_hms(2024, 5, 17, 13, 45, 1).unwrap();
        assert_eq!(photo_file_name(at), "photo_20240517_134501.jpg");
        assert_eq!(snapshot_file_name(at), "sensor_data_20240517_134501.json");
    }

    #[test]
    fn test_snapshot_json_keys() {
        let reading = EdgeReading {
            lux: 120.5,
            temperature: 21.0,
            humidity: 40.0,
            pressure: 1013.2,
            uv_index: 0.4,
        };
        let json = serde_json::to_value(reading).unwrap();
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        keys.sort();
        assert_eq!(keys, ["humidity", "lux", "pressure", "temperature", "uv_index"]);
    }

    #[test]
    fn test_light_record_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(unix_seconds(at), 1_704_067_200.0);
        // should be after 2024
        assert!(LightRecord::now(3.0).timestamp > 1_700_000_000.0);
    }
}
