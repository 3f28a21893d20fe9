//! SPDX element types.

use crate::codec::coded_enum;

coded_enum! {
    /// What kind of peridot data an SPDX element refers to.
    pub enum SpdxElementType in "SPDX element type" {
        #[default]
        Unknown = (0, "unknown"),
        /// An SPDX Package for the codebase of a repo pull.
        RepoPull = (10, "repopull"),
        /// An SPDX Package for a registered component.
        Component = (20, "component"),
        /// An SPDX File for a file instance, usually inside a repo pull.
        File = (30, "file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips() {
        for &et in SpdxElementType::ALL {
            assert_eq!(SpdxElementType::from_code(et.code()).unwrap(), et);
            assert_eq!(et.as_str().parse::<SpdxElementType>().unwrap(), et);
            let js = serde_json::to_string(&et).unwrap();
            assert_eq!(serde_json::from_str::<SpdxElementType>(&js).unwrap(), et);
        }
    }

    #[test]
    fn test_rejects_unknown_values() {
        assert_eq!(
            SpdxElementType::from_code(15).unwrap_or_default(),
            SpdxElementType::Unknown
        );
        assert!("package".parse::<SpdxElementType>().is_err());
        assert!(serde_json::from_str::<SpdxElementType>("\"snippet\"").is_err());
    }
}
