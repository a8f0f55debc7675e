//! Structured records that parameterize conversation instructions.
//!
//! A resume and a job posting are parsed out of uploaded documents by the
//! external parsing service; the onboarding profile is assembled from what
//! the onboarding conversation records.

use crate::collab::DocumentParser;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A candidate's parsed resume/CV.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeProfile {
    pub name: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
}

/// One position in the candidate's work history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub role: String,
    pub company: String,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

impl ResumeProfile {
    /// The JSON Schema handed to the parsing service.
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "headline": { "type": "string" },
                "skills": { "type": "array", "items": { "type": "string" } },
                "experience": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "role": { "type": "string" },
                            "company": { "type": "string" },
                            "duration": { "type": "string" },
                            "highlights": { "type": "array", "items": { "type": "string" } }
                        },
                        "required": ["role", "company"]
                    }
                }
            },
            "required": ["name"]
        })
    }

    /// Parses an uploaded resume document into a profile.
    pub async fn from_document(parser: &dyn DocumentParser, file: &[u8]) -> Result<Self> {
        let value = parser
            .parse(
                file,
                Self::schema(),
                "Extract the candidate's resume: name, headline, skills, and work history.",
            )
            .await
            .context("Resume parsing failed")?;
        serde_json::from_value(value).context("Parsed resume did not match the expected shape")
    }
}

/// A parsed job posting the interview is conducted against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobPosting {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl JobPosting {
    pub fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "company": { "type": "string" },
                "location": { "type": "string" },
                "description": { "type": "string" },
                "requirements": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["title", "company"]
        })
    }

    /// Parses an uploaded job-description document into a posting.
    pub async fn from_document(parser: &dyn DocumentParser, file: &[u8]) -> Result<Self> {
        let value = parser
            .parse(
                file,
                Self::schema(),
                "Extract the job posting: title, company, location, description, requirements.",
            )
            .await
            .context("Job description parsing failed")?;
        serde_json::from_value(value).context("Parsed posting did not match the expected shape")
    }
}

/// The outcome of a completed onboarding conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnboardingProfile {
    pub preferences: Vec<String>,
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}
