//! Schema catalog types: models, their categories and field definitions.
//!
//! The core never mutates these. They are read by callers that build edit
//! batches and by [`Model::blank_record_data`] when scaffolding a new record.

use serde::{Deserialize, Serialize};

use crate::field_state::FieldState;
use crate::ids::ModelId;
use crate::record::RecordData;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Email,
    Select,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Date => "date",
            Self::Email => "email",
            Self::Select => "select",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub id: String,
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Only meaningful for [`FieldType::Select`].
    #[serde(default)]
    pub options: Vec<SelectOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Model {
    pub fn category(&self, category_id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == category_id)
    }

    pub fn field(&self, category_id: &str, field_id: &str) -> Option<&FieldDef> {
        self.category(category_id)?
            .fields
            .iter()
            .find(|f| f.id == field_id)
    }

    /// One empty field state per declared field, keyed by category id and field id.
    pub fn blank_record_data(&self) -> RecordData {
        self.categories
            .iter()
            .map(|category| {
                let fields = category
                    .fields
                    .iter()
                    .map(|def| (def.id.clone(), FieldState::new(def.name.clone())))
                    .collect();
                (category.id.clone(), fields)
            })
            .collect()
    }
}
