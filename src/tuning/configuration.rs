//! The tuned tuple and its fixed-width wire form.

use crate::error::{Error, Result};
use crate::options::{
    ContainerOption, DataLayout, LoadEstimatorOption, Newton3Option, TraversalOption,
};
use std::fmt;

/// Length of the serialised record: five option bytes plus the cell size
/// factor as a raw f64.
pub const SERIALIZED_LEN: usize = 13;

/// One point of the search space: everything the engine varies while
/// tuning.
#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub container: ContainerOption,
    pub cell_size_factor: f64,
    pub traversal: TraversalOption,
    pub load_estimator: LoadEstimatorOption,
    pub data_layout: DataLayout,
    pub newton3: Newton3Option,
}

impl Configuration {
    pub fn new(
        container: ContainerOption,
        cell_size_factor: f64,
        traversal: TraversalOption,
        load_estimator: LoadEstimatorOption,
        data_layout: DataLayout,
        newton3: Newton3Option,
    ) -> Self {
        Self {
            container,
            cell_size_factor,
            traversal,
            load_estimator,
            data_layout,
            newton3,
        }
    }

    /// Byte layout: container, traversal, loadEstimator, dataLayout,
    /// newton3, then the cell size factor in host byte order.
    pub fn serialize(&self) -> [u8; SERIALIZED_LEN] {
        let mut out = [0u8; SERIALIZED_LEN];
        out[0] = self.container as u8;
        out[1] = self.traversal as u8;
        out[2] = self.load_estimator as u8;
        out[3] = self.data_layout as u8;
        out[4] = self.newton3 as u8;
        out[5..].copy_from_slice(&self.cell_size_factor.to_ne_bytes());
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SERIALIZED_LEN {
            return Err(Error::MalformedRecord(bytes.len()));
        }
        let mut csf = [0u8; 8];
        csf.copy_from_slice(&bytes[5..]);
        Ok(Self {
            container: ContainerOption::from_code(bytes[0])?,
            traversal: TraversalOption::from_code(bytes[1])?,
            load_estimator: LoadEstimatorOption::from_code(bytes[2])?,
            data_layout: DataLayout::from_code(bytes[3])?,
            newton3: Newton3Option::from_code(bytes[4])?,
            cell_size_factor: f64::from_ne_bytes(csf),
        })
    }
}

impl PartialEq for Configuration {
    fn eq(&self, other: &Self) -> bool {
        self.container == other.container
            && self.traversal == other.traversal
            && self.load_estimator == other.load_estimator
            && self.data_layout == other.data_layout
            && self.newton3 == other.newton3
            && self.cell_size_factor.to_bits() == other.cell_size_factor.to_bits()
    }
}

impl Eq for Configuration {}

impl std::hash::Hash for Configuration {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.container as u8).hash(state);
        (self.traversal as u8).hash(state);
        (self.load_estimator as u8).hash(state);
        (self.data_layout as u8).hash(state);
        (self.newton3 as u8).hash(state);
        self.cell_size_factor.to_bits().hash(state);
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{container: {}, cellSizeFactor: {}, traversal: {}, loadEstimator: {}, dataLayout: {}, newton3: {}}}",
            self.container,
            self.cell_size_factor,
            self.traversal,
            self.load_estimator,
            self.data_layout,
            self.newton3
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let config = Configuration::new(
            ContainerOption::DirectSum,
            1.2,
            TraversalOption::LcSliced,
            LoadEstimatorOption::None,
            DataLayout::Aos,
            Newton3Option::Disabled,
        );
        let passed = Configuration::deserialize(&config.serialize()).unwrap();
        assert_eq!(passed, config);
    }

    #[test]
    fn test_round_trip_every_combination() {
        for container in ContainerOption::ALL {
            for traversal in TraversalOption::ALL {
                for estimator in LoadEstimatorOption::ALL {
                    for layout in DataLayout::ALL {
                        for newton3 in Newton3Option::ALL {
                            let c = Configuration::new(
                                container, 0.987654321, traversal, estimator, layout, newton3,
                            );
                            assert_eq!(Configuration::deserialize(&c.serialize()).unwrap(), c);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_malformed_records_rejected() {
        assert!(Configuration::deserialize(&[0u8; 12]).is_err());
        let mut bytes = [0u8; SERIALIZED_LEN];
        bytes[1] = 200; // not a traversal code
        assert!(Configuration::deserialize(&bytes).is_err());
    }
}
