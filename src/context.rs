//! The process-wide transformation context: configuration, reference
//! classes, submission analyses, and the name/descriptor translation every
//! rewrite step consults.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    path::Path,
    sync::{Arc, Mutex, OnceLock, RwLock},
};

use log::debug;

use crate::{
    classfile::Class,
    config::TransformerConfig,
    errors::{ConfigError, TransformError},
    forced::ForcedSignature,
    headers::MethodHeader,
    reference::ReferenceClass,
    similarity::{MatchCandidate, SimilarityMatcher},
    submission::SubmissionClassInfo,
    types::{FieldType, MethodDescriptor},
};

/// The key of the method-replacement table.
type ReplacementKey = (String, String, String);

/// Shared state of one transformation run.
///
/// The caches are thread-safe: multiple classes may be transformed
/// concurrently, each owned by one thread from read through emit.
pub struct TransformContext {
    config: TransformerConfig,
    references: HashMap<String, ReferenceClass>,
    registered: RwLock<BTreeSet<String>>,
    scanned: RwLock<HashMap<String, Class>>,
    resolved: RwLock<HashMap<String, Arc<SubmissionClassInfo>>>,
    in_progress: Mutex<HashSet<String>>,
    forced_bindings: RwLock<HashMap<String, String>>,
    bindings: OnceLock<HashMap<String, String>>,
    replacements: HashMap<ReplacementKey, MethodHeader>,
    external_cache: RwLock<HashMap<String, Option<Arc<Class>>>>,
}

impl std::fmt::Debug for TransformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformContext")
            .field("project_prefix", &self.config.project_prefix)
            .field("references", &self.references.len())
            .field(
                "registered",
                &self.registered.read().expect("poisoned lock").len(),
            )
            .finish_non_exhaustive()
    }
}

impl TransformContext {
    /// Creates a context over an already-loaded reference set.
    ///
    /// # Errors
    /// [`ConfigError`] when the configuration is invalid.
    pub fn new(
        config: TransformerConfig,
        references: HashMap<String, ReferenceClass>,
    ) -> Result<Self, TransformError> {
        config.validate()?;
        let replacements = config
            .method_replacements
            .iter()
            .map(|it| {
                (
                    (
                        it.target.owner.clone(),
                        it.target.name.clone(),
                        it.target.descriptor.clone(),
                    ),
                    it.replacement.clone(),
                )
            })
            .collect();
        Ok(Self {
            config,
            references,
            registered: RwLock::new(BTreeSet::new()),
            scanned: RwLock::new(HashMap::new()),
            resolved: RwLock::new(HashMap::new()),
            in_progress: Mutex::new(HashSet::new()),
            forced_bindings: RwLock::new(HashMap::new()),
            bindings: OnceLock::new(),
            replacements,
            external_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a context loading the reference classes from a `.bin`
    /// resource tree.
    ///
    /// # Errors
    /// Configuration or reference-loading failures.
    pub fn from_reference_dir(
        config: TransformerConfig,
        reference_root: &Path,
    ) -> Result<Self, TransformError> {
        let references = crate::reference::load_directory(reference_root)?;
        Self::new(config, references)
    }

    /// The configuration of this run.
    #[must_use]
    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    /// Registers (scans) a submission class file. All submissions must be
    /// registered before the first transformation; class-level fuzzy
    /// binding is computed once over the full registered set.
    ///
    /// # Errors
    /// Parse failures, and [`ConfigError::PinnedCollision`] when two classes
    /// pin the same reference.
    pub fn register_submission(&self, bytes: &[u8]) -> Result<String, TransformError> {
        let class = Class::from_bytes(bytes)?;
        let name = class.name.clone();
        if let Some(forced) = ForcedSignature::of_class(&class) {
            let mut forced_bindings = self.forced_bindings.write().expect("poisoned lock");
            let colliding = forced_bindings
                .iter()
                .find(|(existing, target)| **target == forced.identifier && **existing != name);
            if let Some((existing, _)) = colliding {
                return Err(ConfigError::PinnedCollision {
                    owner: name.clone(),
                    first: existing.clone(),
                    second: name,
                    target: forced.identifier,
                }
                .into());
            }
            debug!("`{name}` pins reference `{}`", forced.identifier);
            forced_bindings.insert(name.clone(), forced.identifier);
        }
        self.registered
            .write()
            .expect("poisoned lock")
            .insert(name.clone());
        self.scanned
            .write()
            .expect("poisoned lock")
            .insert(name.clone(), class);
        Ok(name)
    }

    /// Whether an internal name belongs to the student project.
    #[must_use]
    pub fn is_submission_class(&self, internal_name: &str) -> bool {
        internal_name.starts_with(&self.config.project_prefix)
    }

    /// The reference class bound to a student class, or `None`. Pinned
    /// bindings win over the one-shot fuzzy binding; each submission binds
    /// to at most one reference, stably for the lifetime of the context.
    #[must_use]
    pub fn solution_class_name(&self, student_name: &str) -> Option<String> {
        if let Some(pinned) = self
            .forced_bindings
            .read()
            .expect("poisoned lock")
            .get(student_name)
        {
            return Some(pinned.clone());
        }
        self.class_bindings().get(student_name).cloned()
    }

    fn class_bindings(&self) -> &HashMap<String, String> {
        self.bindings.get_or_init(|| {
            let registered = self.registered.read().expect("poisoned lock");
            let forced = self.forced_bindings.read().expect("poisoned lock");
            let rows: Vec<&String> = registered
                .iter()
                .filter(|name| !forced.contains_key(*name))
                .collect();
            let row_names: Vec<&str> = rows.iter().map(|it| simple_name(it)).collect();

            let mut column_names: Vec<&String> = self.references.keys().collect();
            column_names.sort();
            let alias_map: HashMap<&str, &[String]> = self
                .config
                .reference_classes
                .iter()
                .map(|it| (it.name.as_str(), it.aliases.as_slice()))
                .collect();
            let candidates: Vec<MatchCandidate<'_>> = column_names
                .iter()
                .map(|name| MatchCandidate {
                    name: simple_name(name),
                    aliases: alias_map.get(name.as_str()).copied().unwrap_or(&[]),
                })
                .collect();

            let matcher = SimilarityMatcher::new(self.config.similarity_threshold);
            let matches = matcher.match_sets(&row_names, &candidates);
            matches
                .into_iter()
                .map(|(row, column)| (rows[row].clone(), column_names[column].clone()))
                .collect()
        })
    }

    /// The parsed reference class of the given name.
    #[must_use]
    pub fn reference_class(&self, name: &str) -> Option<&ReferenceClass> {
        self.references.get(name)
    }

    /// The resolved analysis of a registered submission class. Resolution
    /// runs once; later calls return the cached analysis.
    ///
    /// # Errors
    /// [`TransformError::UnresolvedType`] when the name was never
    /// registered or resolution recurses into itself.
    pub fn submission_info(&self, name: &str) -> Result<Arc<SubmissionClassInfo>, TransformError> {
        if let Some(ready) = self.resolved.read().expect("poisoned lock").get(name) {
            return Ok(Arc::clone(ready));
        }
        {
            let mut in_progress = self.in_progress.lock().expect("poisoned lock");
            if !in_progress.insert(name.to_owned()) {
                return Err(TransformError::UnresolvedType {
                    name: name.to_owned(),
                    required_by: name.to_owned(),
                });
            }
        }
        let result = self.resolve_submission(name);
        self.in_progress
            .lock()
            .expect("poisoned lock")
            .remove(name);
        result
    }

    fn resolve_submission(&self, name: &str) -> Result<Arc<SubmissionClassInfo>, TransformError> {
        let scanned = self.scanned.write().expect("poisoned lock").remove(name);
        let Some(class) = scanned else {
            // Lost a race, or the class was never registered.
            if let Some(ready) = self.resolved.read().expect("poisoned lock").get(name) {
                return Ok(Arc::clone(ready));
            }
            return Err(TransformError::UnresolvedType {
                name: name.to_owned(),
                required_by: name.to_owned(),
            });
        };
        let info = Arc::new(SubmissionClassInfo::resolve(class, self)?);
        self.resolved
            .write()
            .expect("poisoned lock")
            .insert(name.to_owned(), Arc::clone(&info));
        Ok(info)
    }

    /// Translates an internal name (or array descriptor) by replacing any
    /// submission-class reference with its computed counterpart. Array
    /// dimensions pass through unchanged.
    #[must_use]
    pub fn computed_internal_name(&self, internal_name: &str) -> String {
        if let Some(rest) = internal_name.strip_prefix('[') {
            // Array-typed owners keep their dimension prefix.
            let translated = match rest.strip_prefix('L').and_then(|it| it.strip_suffix(';')) {
                Some(element) => format!("L{};", self.computed_internal_name(element)),
                None => self.computed_internal_name(rest),
            };
            return format!("[{translated}");
        }
        if self.is_submission_class(internal_name) {
            if let Some(reference) = self.solution_class_name(internal_name) {
                return reference;
            }
        }
        internal_name.to_owned()
    }

    /// Translates a field or method descriptor through
    /// [`computed_internal_name`](Self::computed_internal_name).
    #[must_use]
    pub fn computed_descriptor(&self, descriptor: &str) -> String {
        let rename = |name: &str| {
            let computed = self.computed_internal_name(name);
            (computed != name).then_some(computed)
        };
        if descriptor.starts_with('(') {
            match descriptor.parse::<MethodDescriptor>() {
                Ok(parsed) => parsed.map_class_names(&rename).to_string(),
                Err(_) => descriptor.to_owned(),
            }
        } else {
            match descriptor.parse::<FieldType>() {
                Ok(parsed) => parsed.map_class_names(&rename).descriptor(),
                Err(_) => descriptor.to_owned(),
            }
        }
    }

    /// Whether the method-replacement table redirects the given method.
    #[must_use]
    pub fn method_has_replacement(&self, owner: &str, name: &str, descriptor: &str) -> bool {
        self.method_replacement(owner, name, descriptor).is_some()
    }

    /// The trampoline that replaces the given method, if any.
    #[must_use]
    pub fn method_replacement(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<&MethodHeader> {
        self.replacements
            .get(&(owner.to_owned(), name.to_owned(), descriptor.to_owned()))
    }

    /// Looks up an external (non-submission) class on the configured
    /// classpath. Results, including misses, are cached.
    #[must_use]
    pub fn external_class(&self, internal_name: &str) -> Option<Arc<Class>> {
        if let Some(cached) = self
            .external_cache
            .read()
            .expect("poisoned lock")
            .get(internal_name)
        {
            return cached.clone();
        }
        let loaded = self.load_external(internal_name).map(Arc::new);
        self.external_cache
            .write()
            .expect("poisoned lock")
            .insert(internal_name.to_owned(), loaded.clone());
        loaded
    }

    fn load_external(&self, internal_name: &str) -> Option<Class> {
        for root in &self.config.classpath {
            if root.is_dir() {
                let candidate = root.join(format!("{internal_name}.class"));
                if let Ok(bytes) = std::fs::read(&candidate) {
                    if let Ok(class) = Class::from_bytes(&bytes) {
                        return Some(class);
                    }
                }
            }
            #[cfg(feature = "jar")]
            if root.extension().and_then(|it| it.to_str()) == Some("jar") {
                if let Some(class) = load_from_jar(root, internal_name) {
                    return Some(class);
                }
            }
        }
        None
    }
}

#[cfg(feature = "jar")]
fn load_from_jar(path: &Path, internal_name: &str) -> Option<Class> {
    let file = std::fs::File::open(path).ok()?;
    let mut archive = zip::ZipArchive::new(file).ok()?;
    let mut entry = archive.by_name(&format!("{internal_name}.class")).ok()?;
    let mut bytes = Vec::new();
    std::io::Read::read_to_end(&mut entry, &mut bytes).ok()?;
    Class::from_bytes(&bytes).ok()
}

/// The part of an internal name after the last package separator.
fn simple_name(internal_name: &str) -> &str {
    internal_name
        .rsplit_once('/')
        .map_or(internal_name, |(_, simple)| simple)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_names() {
        assert_eq!(simple_name("edu/example/Widget"), "Widget");
        assert_eq!(simple_name("Widget"), "Widget");
    }
}
