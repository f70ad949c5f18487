use serde::{Deserialize, Serialize};
use crate::error::PortalError;

// A degree program instance the student is enrolled in, as listed by the career selector.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Career {
    pub name: String,
    pub raw_option_value: String,
    pub program_code: String,
    pub plan_code: String,
    pub admission_year: String,
    pub admission_period: String,
}

impl Career {
    // Splits an option value such as "29040-2-2021-1" into its four codes.
    pub fn from_option(name: &str, raw_option_value: &str) -> Result<Career, PortalError> {
        let parts: Vec<&str> = raw_option_value.split('-').collect();
        if parts.len() != 4 {
            return Err(PortalError::MalformedOption(raw_option_value.to_string()));
        }

        Ok(Career {
            name: name.to_string(),
            raw_option_value: raw_option_value.to_string(),
            program_code: parts[0].to_string(),
            plan_code: parts[1].to_string(),
            admission_year: parts[2].to_string(),
            admission_period: parts[3].to_string(),
        })
    }
}

// One course listed on the records page. row_index is sent back to the portal as `det`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRow {
    pub course_name: String,
    pub detail_link_payload: Option<String>,
    pub row_index: usize,
}

impl CourseRow {
    pub fn has_detail_link(&self) -> bool {
        self.detail_link_payload.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubEvaluation {
    pub name: String,
    pub weight_factor: u32,
    pub grade: Option<f64>,
}

impl SubEvaluation {
    pub fn has_grade(&self) -> bool {
        matches!(self.grade, Some(g) if g > 0.0)
    }
}

// A graded component of a course. final_grade is 0.0 until a grade is known.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub name: String,
    pub weight_factor: u32,
    pub sub_evaluations: Vec<SubEvaluation>,
    pub final_grade: f64,
}

impl Evaluation {
    pub fn graded(name: &str, weight_factor: u32, grade: Option<f64>) -> Evaluation {
        Evaluation {
            name: name.to_string(),
            weight_factor,
            sub_evaluations: Vec::new(),
            final_grade: grade.unwrap_or(0.0),
        }
    }

    // The final grade is the weighted mean of the graded sub-evaluations only.
    pub fn from_subs(name: &str, weight_factor: u32, sub_evaluations: Vec<SubEvaluation>) -> Evaluation {
        let (weighted, weights) = sub_evaluations
            .iter()
            .filter(|sub| sub.has_grade())
            .fold((0.0, 0.0), |(weighted, weights), sub| {
                let grade = sub.grade.unwrap_or(0.0);
                (weighted + grade * sub.weight_factor as f64, weights + sub.weight_factor as f64)
            });

        let final_grade = if weights > 0.0 { weighted / weights } else { 0.0 };

        Evaluation { name: name.to_string(), weight_factor, sub_evaluations, final_grade }
    }

    pub fn contributes(&self) -> bool {
        self.weight_factor > 0 && self.final_grade > 0.0
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CourseAverage {
    pub name: String,
    pub average: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub full_name: String,
    pub careers: Vec<Career>,
}

// What the outer API layer returns for a login attempt.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<serde_json::Value>,
}

// The persisted credential record, one per identifier.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub identifier: String,
    pub display_name: String,
    pub encrypted_secret: String,
}
