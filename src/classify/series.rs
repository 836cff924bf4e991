//! Raw acquisition series records

use serde::{Deserialize, Serialize};

/// Header fields of one acquired series, as read from a session listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SeriesRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_number: Option<u32>,

    pub series_description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo_number: Option<u32>,
}

impl SeriesRecord {
    pub fn new(series_description: impl Into<String>) -> Self {
        Self {
            series_number: None,
            series_description: series_description.into(),
            image_type: None,
            echo_number: None,
        }
    }

    pub fn with_series_number(mut self, number: u32) -> Self {
        self.series_number = Some(number);
        self
    }

    pub fn with_image_type(mut self, image_type: impl Into<String>) -> Self {
        self.image_type = Some(image_type.into());
        self
    }

    pub fn with_echo_number(mut self, echo: u32) -> Self {
        self.echo_number = Some(echo);
        self
    }
}
