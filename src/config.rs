//! Transformer configuration and the submission discovery document.

use std::{
    collections::{BTreeSet, HashMap},
    path::PathBuf,
};

use serde::Deserialize;

use crate::{
    classfile::MethodAccess,
    errors::ConfigError,
    headers::MethodHeader,
    types::{FieldType, MethodDescriptor},
};

/// One reference class the transformer knows about, with the alias names the
/// fuzzy binder accepts for it.
#[derive(Debug, Clone)]
pub struct ReferenceClassEntry {
    /// The internal name of the reference class.
    pub name: String,
    /// Aliases the class-level binder scores as well as the name itself.
    pub aliases: Vec<String>,
}

impl ReferenceClassEntry {
    /// An entry without aliases.
    #[must_use]
    pub fn plain<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
        }
    }
}

/// Redirects calls to `target` (which may live in the standard library) to
/// the static trampoline `replacement`.
#[derive(Debug, Clone)]
pub struct MethodReplacement {
    /// The method whose call sites are rewritten.
    pub target: MethodHeader,
    /// The static trampoline that replaces it. For a virtual target its
    /// descriptor carries one extra leading parameter receiving the
    /// receiver.
    pub replacement: MethodHeader,
}

/// The recognized configuration of a transformation run.
#[derive(Debug, Clone)]
pub struct TransformerConfig {
    /// Internal-name prefix identifying student classes,
    /// e.g. `edu/example/submission/`.
    pub project_prefix: String,
    /// The known reference classes.
    pub reference_classes: Vec<ReferenceClassEntry>,
    /// Fuzzy matching threshold in `[0, 1]`.
    pub similarity_threshold: f64,
    /// Call-site redirections.
    pub method_replacements: Vec<MethodReplacement>,
    /// Whether a field access mismatch confined to the `final` bit forces a
    /// `$submission` mirror field.
    pub mirror_final_mismatch: bool,
    /// Directories (and jars, with the `jar` feature) where external
    /// supertypes of submission classes are looked up.
    pub classpath: Vec<PathBuf>,
}

/// The default fuzzy matching threshold.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.90;

impl TransformerConfig {
    /// A configuration with defaults for everything but the project prefix.
    #[must_use]
    pub fn new<S: Into<String>>(project_prefix: S) -> Self {
        Self {
            project_prefix: project_prefix.into(),
            reference_classes: Vec::new(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            method_replacements: Vec::new(),
            mirror_final_mismatch: false,
            classpath: Vec::new(),
        }
    }

    /// Validates the configuration. Called once when the transformation
    /// context is constructed; every violation is fatal.
    ///
    /// # Errors
    /// See [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::InvalidThreshold(self.similarity_threshold));
        }
        for replacement in &self.method_replacements {
            replacement.validate()?;
        }
        Ok(())
    }
}

impl MethodReplacement {
    /// Checks that the trampoline is static and descriptor-compatible with
    /// the target.
    ///
    /// # Errors
    /// See [`ConfigError`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.replacement.access.contains(MethodAccess::STATIC) {
            return Err(ConfigError::NonStaticReplacement {
                target: self.target.clone(),
                replacement: self.replacement.clone(),
            });
        }
        let Ok(target) = self.target.descriptor.parse::<MethodDescriptor>() else {
            return Err(self.incompatible());
        };
        let Ok(replacement) = self.replacement.descriptor.parse::<MethodDescriptor>() else {
            return Err(self.incompatible());
        };
        let mut expected_parameters = Vec::new();
        if !self.target.is_static() {
            expected_parameters.push(FieldType::Object(self.target.owner.clone()));
        }
        expected_parameters.extend(target.parameters.iter().cloned());
        if replacement.parameters != expected_parameters
            || replacement.return_type != target.return_type
        {
            return Err(self.incompatible());
        }
        Ok(())
    }

    fn incompatible(&self) -> ConfigError {
        ConfigError::IncompatibleReplacement {
            target: self.target.clone(),
            replacement: self.replacement.clone(),
        }
    }
}

/// The discovery document enumerating the submission source set: source-set
/// name → language → fully-qualified source names.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct DiscoveryDocument {
    source_sets: HashMap<String, HashMap<String, Vec<String>>>,
}

impl DiscoveryDocument {
    /// Parses the JSON document.
    ///
    /// # Errors
    /// [`ConfigError::MalformedDiscovery`] when the JSON has the wrong
    /// shape.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The internal names of all discovered submission classes, sorted and
    /// deduplicated. `.java` suffixes are stripped and dots become slashes.
    #[must_use]
    pub fn submission_names(&self) -> BTreeSet<String> {
        self.source_sets
            .values()
            .flat_map(HashMap::values)
            .flatten()
            .map(|source| {
                let stem = source.strip_suffix(".java").unwrap_or(source);
                stem.replace('.', "/")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::classfile::MethodAccess;

    use super::*;

    fn header(owner: &str, name: &str, descriptor: &str, access: MethodAccess) -> MethodHeader {
        MethodHeader {
            owner: owner.to_owned(),
            access,
            name: name.to_owned(),
            descriptor: descriptor.to_owned(),
            signature: None,
            exceptions: Vec::new(),
        }
    }

    #[test]
    fn discovery_normalizes_names() {
        let document = DiscoveryDocument::from_json(
            r#"{"main": {"java": ["edu.example.Widget.java", "edu.example.Gear.java"]}}"#,
        )
        .unwrap();
        let names: Vec<_> = document.submission_names().into_iter().collect();
        assert_eq!(names, vec!["edu/example/Gear", "edu/example/Widget"]);
    }

    #[test]
    fn discovery_rejects_wrong_shape() {
        assert!(DiscoveryDocument::from_json(r#"{"main": ["a.java"]}"#).is_err());
    }

    #[test]
    fn replacement_must_be_static() {
        let replacement = MethodReplacement {
            target: header("java/util/Random", "nextInt", "(I)I", MethodAccess::PUBLIC),
            replacement: header("test/Fixed", "nextInt", "(Ljava/util/Random;I)I", MethodAccess::PUBLIC),
        };
        assert!(matches!(
            replacement.validate(),
            Err(ConfigError::NonStaticReplacement { .. })
        ));
    }

    #[test]
    fn virtual_replacement_takes_leading_receiver() {
        let valid = MethodReplacement {
            target: header("java/util/Random", "nextInt", "(I)I", MethodAccess::PUBLIC),
            replacement: header(
                "test/Fixed",
                "nextInt",
                "(Ljava/util/Random;I)I",
                MethodAccess::PUBLIC | MethodAccess::STATIC,
            ),
        };
        assert!(valid.validate().is_ok());

        let missing_receiver = MethodReplacement {
            target: header("java/util/Random", "nextInt", "(I)I", MethodAccess::PUBLIC),
            replacement: header(
                "test/Fixed",
                "nextInt",
                "(I)I",
                MethodAccess::PUBLIC | MethodAccess::STATIC,
            ),
        };
        assert!(matches!(
            missing_receiver.validate(),
            Err(ConfigError::IncompatibleReplacement { .. })
        ));
    }

    #[test]
    fn static_replacement_keeps_parameters() {
        let valid = MethodReplacement {
            target: header(
                "java/lang/Math",
                "random",
                "()D",
                MethodAccess::PUBLIC | MethodAccess::STATIC,
            ),
            replacement: header(
                "test/Fixed",
                "random",
                "()D",
                MethodAccess::PUBLIC | MethodAccess::STATIC,
            ),
        };
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn threshold_is_validated() {
        let mut config = TransformerConfig::new("edu/example/");
        config.similarity_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));
    }
}
