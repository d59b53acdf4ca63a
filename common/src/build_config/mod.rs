pub mod class_expr;
pub mod pattern;

pub use self::class_expr::{
    ClassExpr, ClassInheritanceMap, ClassTerm, Operand, Operation, ALL_CLASS, DEFAULT_CLASS,
};
use crate::errors::*;
use serde::{Deserialize, Serialize};

/// A build target configuration offered by the farm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub classes: Vec<String>,
}

/// Include or exclude configurations by name and (optionally) target pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildConstraint {
    pub exclusion: bool,
    pub config: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub comment: String,
}

impl BuildConstraint {
    pub fn exclude(config: &str, target: Option<&str>, comment: &str) -> BuildConstraint {
        BuildConstraint {
            exclusion: true,
            config: config.to_string(),
            target: target.map(String::from),
            comment: comment.to_string(),
        }
    }

    pub fn include(config: &str, target: Option<&str>, comment: &str) -> BuildConstraint {
        BuildConstraint {
            exclusion: false,
            ..BuildConstraint::exclude(config, target, comment)
        }
    }

    fn matches(&self, config_path: &[String], target_path: &[String]) -> bool {
        if !component_match(config_path, &self.config) {
            return false;
        }
        match &self.target {
            Some(target) => component_match(target_path, target),
            None => true,
        }
    }
}

fn component_match(path: &[String], pattern: &str) -> bool {
    match pattern::path_match(path, &pattern::dash_components_to_path(pattern)) {
        Ok(m) => m,
        Err(err) => {
            debug!("Ignoring invalid build constraint pattern: {:#}", err);
            false
        }
    }
}

/// A named build configuration of a package. Empty lists fall back to the
/// package-wide expressions and constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageBuildConfig {
    pub name: String,
    #[serde(default)]
    pub builds: Vec<ClassExpr>,
    #[serde(default)]
    pub constraints: Vec<BuildConstraint>,
    #[serde(default)]
    pub comment: String,
}

impl PackageBuildConfig {
    pub fn new<I: Into<String>>(name: I) -> PackageBuildConfig {
        PackageBuildConfig {
            name: name.into(),
            builds: Vec::new(),
            constraints: Vec::new(),
            comment: String::new(),
        }
    }

    pub fn effective_builds<'a>(&'a self, common: &'a [ClassExpr]) -> &'a [ClassExpr] {
        if self.builds.is_empty() {
            common
        } else {
            &self.builds
        }
    }

    pub fn effective_constraints<'a>(
        &'a self,
        common: &'a [BuildConstraint],
    ) -> &'a [BuildConstraint] {
        if self.constraints.is_empty() {
            common
        } else {
            &self.constraints
        }
    }
}

impl Default for PackageBuildConfig {
    fn default() -> PackageBuildConfig {
        PackageBuildConfig::new("default")
    }
}

/// The configurations the farm builds for, with their class hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfigSet {
    pub configs: Vec<TargetConfig>,
    pub inheritance: ClassInheritanceMap,
}

impl BuildConfigSet {
    /// Classes may be declared as `name:base`, the configuration is then a
    /// member of `name` and `name` derives from `base`.
    pub fn from_declared(configs: Vec<TargetConfig>) -> Result<BuildConfigSet> {
        let mut inheritance = ClassInheritanceMap::new();
        let mut resolved = Vec::with_capacity(configs.len());

        for mut config in configs {
            if resolved
                .iter()
                .any(|c: &TargetConfig| c.name == config.name && c.target == config.target)
            {
                bail!(
                    "Duplicate target configuration: {} ({})",
                    config.name,
                    config.target
                );
            }

            let mut classes = Vec::with_capacity(config.classes.len());
            for class in &config.classes {
                let name = match class.split_once(':') {
                    Some((name, base)) => {
                        if let Some(existing) = inheritance.get(name) {
                            if existing != base {
                                bail!(
                                    "Conflicting base classes for class {:?}: {:?} and {:?}",
                                    name,
                                    existing,
                                    base
                                );
                            }
                        }
                        inheritance.insert(name.to_string(), base.to_string());
                        name
                    }
                    None => class.as_str(),
                };
                if name.is_empty() {
                    bail!("Empty class name in configuration {:?}", config.name);
                }
                classes.push(name.to_string());
            }
            config.classes = classes;
            resolved.push(config);
        }

        Ok(BuildConfigSet {
            configs: resolved,
            inheritance,
        })
    }

    pub fn find(&self, name: &str, target: &str) -> Option<&TargetConfig> {
        self.configs
            .iter()
            .find(|c| c.name == name && c.target == target)
    }
}

/// Keep the first sentence of a comment, lower-casing its first letter if it
/// reads like an ordinary word.
pub fn sanitize_reason(comment: &str) -> String {
    let comment = comment.trim();

    let bytes = comment.as_bytes();
    let end = comment
        .char_indices()
        .find(|(i, c)| {
            *c == '\n'
                || (*c == '.'
                    && bytes
                        .get(i + 1)
                        .map(|b| b.is_ascii_whitespace())
                        .unwrap_or(true))
        })
        .map(|(i, _)| i)
        .unwrap_or(comment.len());
    let sentence = comment[..end].trim_end();

    let mut chars = sentence.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_lowercase() => first
            .to_lowercase()
            .chain(sentence[first.len_utf8()..].chars())
            .collect(),
        _ => sentence.to_string(),
    }
}

/// Decide if the configuration is excluded by the class expressions or the
/// build constraints. `None` means included, otherwise the (possibly empty)
/// exclusion reason is returned.
pub fn excluded(
    exprs: &[ClassExpr],
    constraints: &[BuildConstraint],
    config: &TargetConfig,
    inheritance: &ClassInheritanceMap,
    default_all: bool,
) -> Option<String> {
    let underlying = match exprs.first() {
        Some(expr) if !expr.underlying_classes.is_empty() => expr.underlying_classes.clone(),
        _ => {
            let default = if default_all { ALL_CLASS } else { DEFAULT_CLASS };
            vec![default.to_string()]
        }
    };

    let mut matches = false;
    let mut reason = String::new();
    let mut fold = |expr: &ClassExpr| {
        let previous = matches;
        expr.apply(&config.classes, inheritance, &mut matches);
        if matches {
            reason.clear();
        } else if reason.is_empty() && (previous || expr.starts_with_addition()) {
            reason = sanitize_reason(&expr.comment);
        }
    };

    fold(&ClassExpr::synthetic(Operation::Add, &underlying));
    for expr in exprs {
        fold(expr);
    }
    fold(&ClassExpr::synthetic(Operation::Intersect, &underlying));

    if !matches {
        trace!("Configuration {} excluded by class expressions", config.name);
        return Some(reason);
    }

    if constraints.is_empty() {
        return None;
    }

    let config_path = pattern::dash_components_to_path(&config.name);
    let target_path = pattern::dash_components_to_path(&config.target);
    for constraint in constraints {
        if constraint.matches(&config_path, &target_path) {
            trace!(
                "Configuration {} matched constraint {:?}",
                config.name,
                constraint.config
            );
            return if constraint.exclusion {
                Some(sanitize_reason(&constraint.comment))
            } else {
                None
            };
        }
    }

    None
}

/// Same as [`excluded`] for a package build configuration, falling back to
/// the package-wide expressions and constraints.
pub fn package_excluded(
    package_config: &PackageBuildConfig,
    common_builds: &[ClassExpr],
    common_constraints: &[BuildConstraint],
    config: &TargetConfig,
    inheritance: &ClassInheritanceMap,
    default_all: bool,
) -> Option<String> {
    excluded(
        package_config.effective_builds(common_builds),
        package_config.effective_constraints(common_constraints),
        config,
        inheritance,
        default_all,
    )
}
