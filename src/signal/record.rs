//! Persisted / wire form of a signal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Signal, SignalType};
use crate::error::{Error, Result};

/// Signal record as written to the store and read by downstream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal_id: String,
    pub signal_type: SignalType,
    pub block_height: u64,
    pub confidence: f64,
    /// Payload fields plus evidence references and extensions
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

impl SignalRecord {
    /// Read a numeric metadata field, falling back to the extensions map
    pub fn metadata_f64(&self, key: &str) -> Option<f64> {
        self.metadata
            .get(key)
            .or_else(|| self.metadata.get("extensions").and_then(|ext| ext.get(key)))
            .and_then(Value::as_f64)
    }

    /// Whether the payload flagged the observation as anomalous
    /// (an exchange-flow anomaly or a mempool fee spike)
    pub fn is_anomalous(&self) -> bool {
        ["is_anomaly", "is_spike"]
            .iter()
            .any(|key| self.metadata.get(*key).and_then(Value::as_bool) == Some(true))
    }
}

impl TryFrom<&Signal> for SignalRecord {
    type Error = Error;

    fn try_from(signal: &Signal) -> Result<Self> {
        let mut metadata = match serde_json::to_value(&signal.payload)? {
            Value::Object(map) => map,
            other => {
                return Err(Error::Serialization(format!(
                    "signal {} payload is not an object: {}",
                    signal.id, other
                )))
            }
        };

        metadata.insert(
            "transaction_ids".to_string(),
            Value::from(signal.transaction_ids.clone()),
        );
        metadata.insert(
            "entity_ids".to_string(),
            Value::from(signal.entity_ids.clone()),
        );
        metadata.insert(
            "is_predictive".to_string(),
            Value::Bool(signal.is_predictive),
        );
        metadata.insert(
            "prediction_interval".to_string(),
            match signal.prediction_interval {
                Some((lower, upper)) => Value::from(vec![lower, upper]),
                None => Value::Null,
            },
        );
        if !signal.extensions.is_empty() {
            metadata.insert(
                "extensions".to_string(),
                Value::Object(signal.extensions.clone().into_iter().collect()),
            );
        }

        Ok(Self {
            signal_id: signal.id.clone(),
            signal_type: signal.signal_type(),
            block_height: signal.block_height,
            confidence: signal.confidence,
            metadata,
            created_at: signal.created_at,
            processed: signal.processed,
            processed_at: signal.processed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{FlowDirection, Forecast, ForecastMethod, SignalPayload, TreasuryPayload};
    use chrono::TimeZone;

    #[test]
    fn test_record_from_signal() {
        let created_at = Utc.with_ymd_and_hms(2024, 4, 20, 0, 9, 27).unwrap();
        let signal = Signal::new(
            SignalPayload::CorporateTreasury(TreasuryPayload {
                entity_id: "corp-1".into(),
                entity_name: "Corp One".into(),
                direction: FlowDirection::Accumulation,
                amount: 250.0,
                txid: "tx-9".into(),
                address: "bc1corp".into(),
            }),
            0.8,
            840_000,
            created_at,
        )
        .unwrap()
        .with_transactions(["tx-9"])
        .with_entities(["corp-1"])
        .with_extension("source", Value::from("unit-test"));

        let record = SignalRecord::try_from(&signal).unwrap();

        assert_eq!(record.signal_id, signal.id);
        assert_eq!(record.signal_type, SignalType::CorporateTreasury);
        assert_eq!(record.created_at, created_at);
        assert!(!record.processed);
        assert_eq!(record.metadata["kind"], "corporate_treasury");
        assert_eq!(record.metadata["direction"], "accumulation");
        assert_eq!(record.metadata_f64("amount"), Some(250.0));
        assert_eq!(record.metadata["transaction_ids"][0], "tx-9");
        assert_eq!(record.metadata["prediction_interval"], Value::Null);
        assert_eq!(record.metadata["extensions"]["source"], "unit-test");

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"created_at\":\"2024-04-20T00:09:27Z\""));
    }

    #[test]
    fn test_predictive_record_keeps_forecast_fields() {
        let signal = Signal::new(
            SignalPayload::Predictive(Forecast::FeeForecast {
                forecast: 21.0,
                lower: 17.0,
                upper: 25.0,
                model_confidence: 0.65,
                sample_count: 30,
                method: ForecastMethod::ExponentialSmoothing,
            }),
            0.65,
            840_001,
            Utc::now(),
        )
        .unwrap();

        let record = SignalRecord::try_from(&signal).unwrap();
        assert_eq!(record.signal_type, SignalType::Predictive);
        assert_eq!(record.metadata["kind"], "predictive");
        assert_eq!(record.metadata["model"], "fee_forecast");
        assert_eq!(record.metadata_f64("forecast"), Some(21.0));
        assert_eq!(record.metadata["method"], "exponential_smoothing");
    }
}
