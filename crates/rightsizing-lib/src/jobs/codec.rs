//! Forecast result payload
//!
//! A job result is one opaque string: standard base64 of a 4-byte
//! big-endian length followed by that many bytes of JSON.

use crate::error::{Result, RightsizingError};
use crate::models::ForecastUsage;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

const LENGTH_PREFIX: usize = 4;

pub fn encode_forecast(usages: &[ForecastUsage]) -> Result<String> {
    let json = serde_json::to_vec(usages)?;
    let len = u32::try_from(json.len())
        .map_err(|_| RightsizingError::Decode("forecast payload too large".to_string()))?;

    let mut buf = Vec::with_capacity(LENGTH_PREFIX + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(STANDARD.encode(buf))
}

pub fn decode_forecast(payload: &str) -> Result<Vec<ForecastUsage>> {
    let buf = STANDARD.decode(payload.trim())?;
    if buf.len() < LENGTH_PREFIX {
        return Err(RightsizingError::Decode(
            "payload shorter than its length prefix".to_string(),
        ));
    }

    let (prefix, body) = buf.split_at(LENGTH_PREFIX);
    let mut len = [0u8; LENGTH_PREFIX];
    len.copy_from_slice(prefix);
    let expected = u32::from_be_bytes(len) as usize;
    if expected != body.len() {
        return Err(RightsizingError::Decode(format!(
            "length prefix {} does not match body of {} bytes",
            expected,
            body.len()
        )));
    }

    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TimeSeriesDatapoint, CPU, MEMORY};
    use std::collections::BTreeMap;

    fn forecast(name: &str) -> ForecastUsage {
        let mut usage = ForecastUsage::new(name);
        let mut cpu = BTreeMap::new();
        cpu.insert(
            "yhat".to_string(),
            vec![
                TimeSeriesDatapoint::new(1200, 0.5),
                TimeSeriesDatapoint::new(600, 0.25),
            ],
        );
        cpu.insert("yhat_upper".to_string(), vec![TimeSeriesDatapoint::new(600, 0.75)]);
        usage.usage.insert(CPU.to_string(), cpu);
        usage.usage.insert(MEMORY.to_string(), BTreeMap::new());
        usage
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let original = vec![forecast("ns_a_c1"), forecast("ns_a_c2")];
        let decoded = decode_forecast(&encode_forecast(&original).unwrap()).unwrap();

        assert_eq!(decoded, original);
        // order within a series is kept, not re-sorted
        assert_eq!(decoded[0].usage[CPU]["yhat"][0].timestamp, 1200);
    }

    #[test]
    fn test_empty_result_round_trips() {
        assert!(decode_forecast(&encode_forecast(&[]).unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_corrupt_payloads_are_decode_errors() {
        let not_base64 = decode_forecast("%%%").unwrap_err();
        assert!(matches!(not_base64, RightsizingError::Decode(_)));

        let too_short = decode_forecast(&STANDARD.encode([0u8, 1])).unwrap_err();
        assert!(matches!(too_short, RightsizingError::Decode(_)));

        let mut truncated = STANDARD.decode(encode_forecast(&[forecast("x")]).unwrap()).unwrap();
        truncated.pop();
        let err = decode_forecast(&STANDARD.encode(truncated)).unwrap_err();
        assert!(matches!(err, RightsizingError::Decode(_)));

        let mut bad_json = 3u32.to_be_bytes().to_vec();
        bad_json.extend_from_slice(b"{x}");
        let err = decode_forecast(&STANDARD.encode(bad_json)).unwrap_err();
        assert!(matches!(err, RightsizingError::Decode(_)));
    }
}
