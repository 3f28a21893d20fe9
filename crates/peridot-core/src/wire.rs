//! JSON encoding for entities crossing the process boundary.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Encode a value as pretty JSON.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::Encode(e.to_string()))
}

/// Decode a value from JSON, reporting bad shapes, negative IDs and
/// unknown enum strings as [`Error::MalformedInput`].
pub fn decode<T: DeserializeOwned>(input: &str) -> Result<T> {
    serde_json::from_str(input).map_err(|e| Error::MalformedInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Job, JobConfig, JobId};

    #[test]
    fn test_decode_config() {
        let config: JobConfig =
            decode(r#"{"codereader":{"primary":{"priorjob_id":2}}}"#).unwrap();
        assert_eq!(
            config.code_reader["primary"].prior_job_id(),
            Some(JobId::new(2))
        );
        assert!(config.kv.is_empty());
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let err = decode::<Job>("{not json").unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));

        let err = decode::<JobId>("-3").unwrap_err();
        assert!(matches!(err, Error::MalformedInput(_)));
    }

    #[test]
    fn test_encode_ids() {
        let js = encode(&vec![JobId::new(1), JobId::new(2)]).unwrap();
        assert_eq!(decode::<Vec<JobId>>(&js).unwrap(), vec![JobId::new(1), JobId::new(2)]);
    }

    #[test]
    fn test_encode_failure_is_not_a_decode_error() {
        let unencodable = std::collections::BTreeMap::from([((1u32, 2u32), "pair")]);
        let err = encode(&unencodable).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }
}
