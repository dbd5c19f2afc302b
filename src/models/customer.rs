use serde::{Deserialize, Serialize};

use crate::models::driver::Lang;

/// Created lazily on first inbound interaction; keyed by platform user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub lang: Lang,
}

impl Customer {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            lang: Lang::En,
        }
    }
}
