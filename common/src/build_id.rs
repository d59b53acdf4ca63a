use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Toolchain {
    pub name: String,
    pub version: String,
}

impl Toolchain {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, version: V) -> Toolchain {
        Toolchain {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Toolchain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub tenant: String,
    pub name: String,
    pub version: String,
}

/// Full identity of a build: one package version built for one
/// (target configuration, package configuration, toolchain) combination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildId {
    pub tenant: String,
    pub package_name: String,
    pub package_version: String,
    pub target: String,
    pub target_config_name: String,
    pub package_config_name: String,
    pub toolchain_name: String,
    pub toolchain_version: String,
}

impl BuildId {
    pub fn package(&self) -> PackageId {
        PackageId {
            tenant: self.tenant.clone(),
            name: self.package_name.clone(),
            version: self.package_version.clone(),
        }
    }

    pub fn toolchain(&self) -> Toolchain {
        Toolchain::new(&self.toolchain_name, &self.toolchain_version)
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}/{}-{}",
            self.tenant,
            self.package_name,
            self.package_version,
            self.target,
            self.target_config_name,
            self.package_config_name,
            self.toolchain_name,
            self.toolchain_version
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildMachine {
    pub name: String,
    pub summary: String,
}
