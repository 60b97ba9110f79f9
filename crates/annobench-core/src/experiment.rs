//! Experiment types, matching policies and task configurations.

use crate::capability::CallKind;
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of benchmark an experiment task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExperimentType {
    /// Concepts to knowledge base.
    C2KB,
    /// Disambiguate gold mentions to knowledge base.
    D2KB,
    /// Annotate to knowledge base.
    A2KB,
    /// Scored concepts to knowledge base.
    Sc2KB,
    /// Scored annotations to knowledge base.
    Sa2KB,
    /// Entity extraction.
    EExt,
}

impl ExperimentType {
    pub const ALL: [ExperimentType; 6] = [
        ExperimentType::C2KB,
        ExperimentType::D2KB,
        ExperimentType::A2KB,
        ExperimentType::Sc2KB,
        ExperimentType::Sa2KB,
        ExperimentType::EExt,
    ];

    /// The call kind the runner requests from the gateway.
    pub fn call_kind(&self) -> CallKind {
        match self {
            ExperimentType::C2KB => CallKind::C2W,
            ExperimentType::D2KB => CallKind::D2W,
            ExperimentType::A2KB | ExperimentType::EExt => CallKind::A2W,
            ExperimentType::Sc2KB => CallKind::Sc2W,
            ExperimentType::Sa2KB => CallKind::Sa2W,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExperimentType::C2KB => "C2KB",
            ExperimentType::D2KB => "D2KB",
            ExperimentType::A2KB => "A2KB",
            ExperimentType::Sc2KB => "Sc2KB",
            ExperimentType::Sa2KB => "Sa2KB",
            ExperimentType::EExt => "EExt",
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExperimentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExperimentType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownExperimentType(s.to_string()))
    }
}

/// How strictly a predicted marking has to agree with a gold marking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Matching {
    /// Spans overlap and concepts are equal.
    #[default]
    WeakAnnotationMatch,
    /// Spans are identical and concepts are equal.
    StrongAnnotationMatch,
}

impl Matching {
    pub fn name(&self) -> &'static str {
        match self {
            Matching::WeakAnnotationMatch => "WEAK_ANNOTATION_MATCH",
            Matching::StrongAnnotationMatch => "STRONG_ANNOTATION_MATCH",
        }
    }
}

impl fmt::Display for Matching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Matching {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Matching::WeakAnnotationMatch, Matching::StrongAnnotationMatch]
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::UnknownMatching(s.to_string()))
    }
}

/// Cache key of an experiment task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExperimentTaskConfiguration {
    pub annotator_name: String,
    pub dataset_name: String,
    pub experiment_type: ExperimentType,
    pub matching: Matching,
}

impl ExperimentTaskConfiguration {
    pub fn new(
        annotator_name: impl Into<String>,
        dataset_name: impl Into<String>,
        experiment_type: ExperimentType,
        matching: Matching,
    ) -> Self {
        Self {
            annotator_name: annotator_name.into(),
            dataset_name: dataset_name.into(),
            experiment_type,
            matching,
        }
    }
}

impl fmt::Display for ExperimentTaskConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.annotator_name, self.dataset_name, self.experiment_type, self.matching
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_kinds() {
        assert_eq!(ExperimentType::EExt.call_kind(), CallKind::A2W);
        assert_eq!(ExperimentType::Sc2KB.call_kind(), CallKind::Sc2W);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("a2kb".parse::<ExperimentType>().unwrap(), ExperimentType::A2KB);
        assert_eq!(
            "STRONG_ANNOTATION_MATCH".parse::<Matching>().unwrap(),
            Matching::StrongAnnotationMatch
        );
        assert!("FUZZY".parse::<Matching>().is_err());
    }

    #[test]
    fn test_matching_serde_names() {
        let json = serde_json::to_string(&Matching::WeakAnnotationMatch).unwrap();
        assert_eq!(json, "\"WEAK_ANNOTATION_MATCH\"");
    }
}
