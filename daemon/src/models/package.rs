use crate::schema::*;
use buildfarm_common::build_config::{BuildConstraint, ClassExpr, PackageBuildConfig};
use buildfarm_common::errors::*;
use buildfarm_common::PackageId;
use diesel::prelude::*;

#[derive(Identifiable, Queryable, Selectable, AsChangeset, Clone, PartialEq, Eq, Debug)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(treat_none_as_null = true)]
#[diesel(table_name = packages)]
pub struct Package {
    pub id: i32,
    pub tenant_id: String,
    pub name: String,
    pub version: String,
    pub buildable: bool,
    pub default_all_classes: bool,
    pub build_exprs: String,
    pub build_constraints: String,
    pub build_configs: String,
}

impl Package {
    pub fn get(pkg: &PackageId, connection: &mut SqliteConnection) -> Result<Option<Package>> {
        use crate::schema::packages::dsl::*;
        let package = packages
            .filter(tenant_id.eq(&pkg.tenant))
            .filter(name.eq(&pkg.name))
            .filter(version.eq(&pkg.version))
            .select(Package::as_select())
            .first(connection)
            .optional()?;
        Ok(package)
    }

    pub fn list_keys(connection: &mut SqliteConnection) -> Result<Vec<(String, String, String)>> {
        use crate::schema::packages::dsl::*;
        let keys = packages
            .select((tenant_id, name, version))
            .load::<(String, String, String)>(connection)?;
        Ok(keys)
    }

    pub fn count_for_tenant(my_tenant: &str, connection: &mut SqliteConnection) -> Result<i64> {
        use crate::schema::packages::dsl::*;
        let n = packages
            .filter(tenant_id.eq(my_tenant))
            .count()
            .get_result(connection)?;
        Ok(n)
    }

    pub fn package_id(&self) -> PackageId {
        PackageId {
            tenant: self.tenant_id.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    pub fn build_exprs(&self) -> Result<Vec<ClassExpr>> {
        serde_json::from_str(&self.build_exprs)
            .with_context(|| anyhow!("Invalid build class expressions of package {}", self.name))
    }

    pub fn build_constraints(&self) -> Result<Vec<BuildConstraint>> {
        serde_json::from_str(&self.build_constraints)
            .with_context(|| anyhow!("Invalid build constraints of package {}", self.name))
    }

    /// Packages without explicit build configurations get a single default
    /// one.
    pub fn build_configs(&self) -> Result<Vec<PackageBuildConfig>> {
        let mut configs: Vec<PackageBuildConfig> = serde_json::from_str(&self.build_configs)
            .with_context(|| anyhow!("Invalid build configurations of package {}", self.name))?;
        if configs.is_empty() {
            configs.push(PackageBuildConfig::default());
        }
        Ok(configs)
    }

    pub fn find_build_config(&self, config_name: &str) -> Result<Option<PackageBuildConfig>> {
        let config = self
            .build_configs()?
            .into_iter()
            .find(|c| c.name == config_name);
        Ok(config)
    }
}

/// What gets stored for a package version admitted to a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub buildable: bool,
    pub default_all_classes: bool,
    pub builds: Vec<ClassExpr>,
    pub constraints: Vec<BuildConstraint>,
    pub configs: Vec<PackageBuildConfig>,
}

impl PackageManifest {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, version: V) -> PackageManifest {
        PackageManifest {
            name: name.into(),
            version: version.into(),
            buildable: true,
            default_all_classes: false,
            builds: Vec::new(),
            constraints: Vec::new(),
            configs: Vec::new(),
        }
    }
}

#[derive(Insertable, PartialEq, Eq, Debug, Clone)]
#[diesel(table_name = packages)]
pub struct NewPackage {
    pub tenant_id: String,
    pub name: String,
    pub version: String,
    pub buildable: bool,
    pub default_all_classes: bool,
    pub build_exprs: String,
    pub build_constraints: String,
    pub build_configs: String,
}

impl NewPackage {
    pub fn from_manifest(tenant_id: &str, manifest: &PackageManifest) -> Result<NewPackage> {
        Ok(NewPackage {
            tenant_id: tenant_id.to_string(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            buildable: manifest.buildable,
            default_all_classes: manifest.default_all_classes,
            build_exprs: serde_json::to_string(&manifest.builds)?,
            build_constraints: serde_json::to_string(&manifest.constraints)?,
            build_configs: serde_json::to_string(&manifest.configs)?,
        })
    }

    pub fn insert(&self, connection: &mut SqliteConnection) -> Result<Package> {
        let package = diesel::insert_into(packages::table)
            .values(self)
            .returning(Package::as_returning())
            .get_result(connection)
            .with_context(|| anyhow!("Failed to insert package {} {}", self.name, self.version))?;
        Ok(package)
    }
}
