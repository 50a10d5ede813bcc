use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::PlanningError;

/// Allocation strategy requested by the operator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    Balanced,
    CostMinimize,
    Reliability,
    Emergency,
}

impl Strategy {
    /// Parse a wire value, rejecting unknown strategies as an invalid request.
    pub fn parse(raw: &str) -> Result<Self, PlanningError> {
        raw.trim()
            .to_lowercase()
            .parse()
            .map_err(|_| PlanningError::InvalidRequest(format!("unknown strategy '{raw}'")))
    }

    /// Human label used in plan explanations ("cost_minimize" -> "Cost Minimize").
    pub fn title(&self) -> String {
        self.to_string()
            .split('_')
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Discrete grid stress classification, ordered from calm to critical.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StressLevel {
    Normal,
    Moderate,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WeatherSensitivity {
    None,
    Heat,
    Cold,
}

/// Customer segment of a cohort.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Segment {
    ResidentialEv,
    ResidentialSolar,
    ResidentialStandard,
    CommercialHvac,
    CommercialLighting,
    Industrial,
}

impl Segment {
    /// Relative responsiveness of the segment to price signals, in [0, 1].
    pub fn price_responsiveness(&self) -> f64 {
        match self {
            Segment::Industrial => 1.0,
            Segment::CommercialHvac | Segment::CommercialLighting => 0.9,
            Segment::ResidentialEv => 0.7,
            Segment::ResidentialSolar => 0.6,
            Segment::ResidentialStandard => 0.5,
        }
    }
}

/// Where a provider value came from. Observability only; the planner treats
/// all provenances the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provenance {
    Live,
    Cached,
    Synthetic,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_strategy_parse() {
        assert_eq!(Strategy::parse("balanced").unwrap(), Strategy::Balanced);
        assert_eq!(Strategy::parse(" COST_MINIMIZE ").unwrap(), Strategy::CostMinimize);
        assert!(matches!(
            Strategy::parse("yolo"),
            Err(PlanningError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_strategy_wire_names_round_trip() {
        for strategy in Strategy::iter() {
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{}\"", strategy));
        }
    }

    #[test]
    fn test_strategy_title() {
        assert_eq!(Strategy::CostMinimize.title(), "Cost Minimize");
        assert_eq!(Strategy::Emergency.title(), "Emergency");
    }

    #[test]
    fn test_stress_level_ordering() {
        assert!(StressLevel::Critical > StressLevel::High);
        assert!(StressLevel::Moderate > StressLevel::Normal);
    }

    #[test]
    fn test_price_responsiveness_bounds() {
        for segment in Segment::iter() {
            let r = segment.price_responsiveness();
            assert!((0.0..=1.0).contains(&r));
        }
        assert!(
            Segment::Industrial.price_responsiveness()
                > Segment::ResidentialStandard.price_responsiveness()
        );
    }
}
