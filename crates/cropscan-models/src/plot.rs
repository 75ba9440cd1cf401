//! Plot options assigned to field staff.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotOption {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub acreage: f64,
    #[serde(default)]
    pub number_of_trees: u32,
}
