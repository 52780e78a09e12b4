use crate::error::JaspelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "dokter", alias = "doctor")]
    Doctor,
    #[serde(rename = "paramedis", alias = "paramedic")]
    Paramedic,
    #[serde(rename = "non_paramedis", alias = "non_paramedic")]
    NonParamedic,
    /// Bendahara; validates financial records
    #[serde(rename = "bendahara", alias = "treasurer")]
    Treasurer,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "petugas", alias = "staff")]
    Staff,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Doctor,
        Role::Paramedic,
        Role::NonParamedic,
        Role::Treasurer,
        Role::Admin,
        Role::Staff,
    ];

    /// Roles that receive jaspel
    pub const EARNING: [Role; 3] = [Role::Doctor, Role::Paramedic, Role::NonParamedic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "dokter",
            Role::Paramedic => "paramedis",
            Role::NonParamedic => "non_paramedis",
            Role::Treasurer => "bendahara",
            Role::Admin => "admin",
            Role::Staff => "petugas",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Doctor => "Dokter",
            Role::Paramedic => "Paramedis",
            Role::NonParamedic => "Non Paramedis",
            Role::Treasurer => "Bendahara",
            Role::Admin => "Admin",
            Role::Staff => "Petugas",
        }
    }

    pub fn can_validate(&self) -> bool {
        matches!(self, Role::Treasurer | Role::Admin)
    }

    pub fn is_earning(&self) -> bool {
        Role::EARNING.contains(self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = JaspelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "dokter" | "doctor" => Ok(Role::Doctor),
            "paramedis" | "paramedic" => Ok(Role::Paramedic),
            "non_paramedis" | "non_paramedic" => Ok(Role::NonParamedic),
            "bendahara" | "treasurer" => Ok(Role::Treasurer),
            "admin" => Ok(Role::Admin),
            "petugas" | "staff" => Ok(Role::Staff),
            other => Err(JaspelError::BadRequest(format!("role tidak dikenal: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: u64,
    pub name: String,
    pub role: Role,
}

impl User {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            id: 0,
            name: name.into(),
            role,
        }
    }
}
