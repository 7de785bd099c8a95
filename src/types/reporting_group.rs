//! Utility categories reported by the energy metering service.

use crate::error::ValidationError;
use std::fmt;
use std::str::FromStr;

/// The metered utility a monthly energy record belongs to.
///
/// # Examples
///
/// ```
/// use heat_prognosis::ReportingGroup;
///
/// assert_eq!("Heat".parse::<ReportingGroup>().unwrap(), ReportingGroup::Heat);
/// assert!("Steam".parse::<ReportingGroup>().is_err());
/// assert_eq!(ReportingGroup::DistrictCooling.to_string(), "DistrictCooling");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportingGroup {
    Electricity,
    Heat,
    Water,
    DistrictCooling,
}

impl ReportingGroup {
    pub const ALL: [ReportingGroup; 4] = [
        ReportingGroup::Electricity,
        ReportingGroup::Heat,
        ReportingGroup::Water,
        ReportingGroup::DistrictCooling,
    ];

    /// Value of the `ReportingGroup` query parameter.
    pub(crate) fn query_value(&self) -> &'static str {
        match self {
            ReportingGroup::Electricity => "Electricity",
            ReportingGroup::Heat => "Heat",
            ReportingGroup::Water => "Water",
            ReportingGroup::DistrictCooling => "DistrictCooling",
        }
    }
}

impl fmt::Display for ReportingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query_value())
    }
}

impl FromStr for ReportingGroup {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportingGroup::ALL
            .into_iter()
            .find(|group| group.query_value() == s)
            .ok_or_else(|| ValidationError::ReportingGroup(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_group_round_trips_through_its_name() {
        for group in ReportingGroup::ALL {
            assert_eq!(group.to_string().parse::<ReportingGroup>(), Ok(group));
        }
    }

    #[test]
    fn test_names_are_case_sensitive() {
        assert_eq!(
            "heat".parse::<ReportingGroup>(),
            Err(ValidationError::ReportingGroup("heat".to_string()))
        );
    }
}
