//! App DTOs

use serde::{Deserialize, Serialize};

use crate::domain::app::App;

/// Entry in the app listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSummary {
    pub id: String,
    pub name: String,
}

impl From<&App> for AppSummary {
    fn from(app: &App) -> Self {
        Self {
            id: app.id.clone(),
            name: app.name.clone(),
        }
    }
}
