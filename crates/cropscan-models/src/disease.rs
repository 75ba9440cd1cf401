//! Disease metadata and disease-log reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Disease record looked up by detection label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseaseInfo {
    #[serde(rename = "_id")]
    pub id: i64,
    pub name: String,
    pub label: String,
    #[serde(rename = "scientificName", default, skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub disease_category_name: Option<String>,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "treatmentMeasures", default, skip_serializing_if = "Option::is_none")]
    pub treatment_measures: Option<String>,
    #[serde(rename = "preventionMeasures", default, skip_serializing_if = "Option::is_none")]
    pub prevention_measures: Option<String>,
}

/// Disease report filed against a plant plot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseLogRequest {
    pub disease_id: i64,
    pub plant_plot_id: i64,
    pub employee_ids: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_ids: Vec<i64>,
    #[serde(rename = "dateReport")]
    pub date_report: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Stored disease report as echoed back by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiseaseLogRecord {
    #[serde(rename = "_id", alias = "id")]
    pub id: i64,
    pub disease_id: i64,
    #[serde(rename = "dateReport")]
    pub date_report: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Uploaded media reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaUpload {
    #[serde(rename = "_id")]
    pub id: i64,
    #[serde(rename = "mediaURL")]
    pub media_url: String,
    pub directory_id: i64,
}
