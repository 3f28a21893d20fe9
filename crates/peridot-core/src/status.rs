//! Run status and health of a long-running operation (repo pulls, jobs).

use crate::codec::coded_enum;

coded_enum! {
    /// Where an operation is in its lifecycle: Startup → Running → Stopped.
    pub enum Status in "status" {
        /// Sentinel meaning "unchanged". Never a persisted job status.
        #[default]
        Same = (0, "same"),
        /// Being set up; not yet begun.
        Startup = (1, "startup"),
        Running = (2, "running"),
        /// Finished, whether or not it succeeded. Terminal.
        Stopped = (3, "stopped"),
    }
}

coded_enum! {
    /// How well an operation is going.
    pub enum Health in "health" {
        /// Sentinel meaning "unchanged". Never a persisted job health.
        #[default]
        Same = (0, "same"),
        Ok = (1, "ok"),
        /// Hit a problem but is expected to continue; still unblocks dependents.
        Degraded = (2, "degraded"),
        /// Unrecoverable; dependents stay blocked.
        Error = (3, "error"),
    }
}

/// Whether an operation in this state unblocks the jobs that depend on it:
/// it has stopped, and not with an error.
pub fn is_terminally_clear(status: Status, health: Health) -> bool {
    status == Status::Stopped && health != Health::Error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips() {
        for &st in Status::ALL {
            assert_eq!(Status::from_code(st.code()).unwrap(), st);
            assert_eq!(st.as_str().parse::<Status>().unwrap(), st);
            let js = serde_json::to_string(&st).unwrap();
            assert_eq!(serde_json::from_str::<Status>(&js).unwrap(), st);
        }
    }

    #[test]
    fn test_health_round_trips() {
        for &h in Health::ALL {
            assert_eq!(Health::from_code(h.code()).unwrap(), h);
            assert_eq!(h.as_str().parse::<Health>().unwrap(), h);
            let js = serde_json::to_string(&h).unwrap();
            assert_eq!(serde_json::from_str::<Health>(&js).unwrap(), h);
        }
    }

    #[test]
    fn test_codes_match_store_values() {
        assert_eq!(Status::Startup.code(), 1);
        assert_eq!(Status::Stopped.code(), 3);
        assert_eq!(Health::Degraded.code(), 2);
        assert_eq!(serde_json::to_string(&Health::Ok).unwrap(), "\"ok\"");
    }

    #[test]
    fn test_out_of_domain_status() {
        let result = Status::from_code(57);
        assert!(matches!(
            result,
            Err(crate::Error::InvalidDomainValue {
                domain: "status",
                ..
            })
        ));
        assert_eq!(result.unwrap_or_default(), Status::Same);
        assert_eq!("paused".parse::<Status>().unwrap_or_default(), Status::Same);
        assert!(serde_json::from_str::<Status>("\"paused\"").is_err());
    }

    #[test]
    fn test_out_of_domain_health() {
        assert_eq!(Health::from_code(-1).unwrap_or_default(), Health::Same);
        assert!("fine".parse::<Health>().is_err());
        assert!(serde_json::from_str::<Health>("1").is_err());
    }

    #[test]
    fn test_terminally_clear() {
        assert!(is_terminally_clear(Status::Stopped, Health::Ok));
        assert!(is_terminally_clear(Status::Stopped, Health::Degraded));
        assert!(!is_terminally_clear(Status::Stopped, Health::Error));
        assert!(!is_terminally_clear(Status::Running, Health::Ok));
        assert!(!is_terminally_clear(Status::Startup, Health::Ok));
    }
}
