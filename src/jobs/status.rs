use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;

/// Status of an analysis job as reported by the processing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Submitted,
    Processing,
    Completed,
    Failed,
    Other(Cow<'static, str>),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Other(value) => value.as_ref(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "submitted" | "pending" | "queued" => JobStatus::Submitted,
            "processing" | "running" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            other => JobStatus::Other(Cow::Owned(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(JobStatus::parse(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_names_map_to_submitted() {
        assert_eq!(JobStatus::parse("pending"), JobStatus::Submitted);
        assert_eq!(JobStatus::parse("Queued"), JobStatus::Submitted);
        assert_eq!(JobStatus::parse("processing"), JobStatus::Processing);
    }

    #[test]
    fn unknown_status_is_not_terminal() {
        let status: JobStatus = serde_json::from_str("\"validating\"").expect("decode");
        assert_eq!(status, JobStatus::Other(Cow::Owned("validating".into())));
        assert!(!status.is_terminal());
        assert_eq!(serde_json::to_string(&status).expect("encode"), "\"validating\"");
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }
}
