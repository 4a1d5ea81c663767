use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub salary_min: Option<u32>,
    #[serde(default)]
    pub salary_max: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPage {
    pub items: Vec<Job>,
    pub page: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub has_more: bool,
}
