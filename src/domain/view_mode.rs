// View mode - who is looking at the dashboard and whether they watch live data
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Admin,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Live,
    Historical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewMode {
    pub role: Role,
    pub view: View,
}

impl ViewMode {
    /// Only an operator watching live data drives the simulation.
    pub fn polls_live(&self) -> bool {
        self.role == Role::Admin && self.view == View::Live
    }
}
