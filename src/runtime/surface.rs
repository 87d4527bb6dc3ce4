//! The process-global control surface consulted by the dispatch prologue.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, OnceLock, RwLock},
};

use crate::headers::MethodHeader;

use super::{Invocation, Value};

/// The key every registry operation uses: owner plus the loose method
/// identity.
#[derive(Debug, PartialEq, Eq, Hash, Clone, derive_more::Display)]
#[display("{owner}.{name}{descriptor}")]
pub struct MethodKey {
    /// The internal name of the owning class.
    pub owner: String,
    /// The method name.
    pub name: String,
    /// The method descriptor.
    pub descriptor: String,
}

impl MethodKey {
    /// Builds the key of a method header.
    #[must_use]
    pub fn of(header: &MethodHeader) -> Self {
        Self {
            owner: header.owner.clone(),
            name: header.name.clone(),
            descriptor: header.descriptor.clone(),
        }
    }
}

/// A test-supplied substitute for a merged method.
pub trait MethodSubstitution: Send + Sync {
    /// Produces the substituted result for the captured invocation.
    fn execute(&self, invocation: &Invocation) -> Value;

    /// For constructor substitutes: which constructor the merged `<init>`
    /// must chain to before `execute` runs. The default substitute is not a
    /// constructor substitute.
    fn constructor_invocation(&self, _invocation: &Invocation) -> Option<ConstructorInvocation> {
        None
    }
}

impl<F> MethodSubstitution for F
where
    F: Fn(&Invocation) -> Value + Send + Sync,
{
    fn execute(&self, invocation: &Invocation) -> Value {
        self(invocation)
    }
}

/// The constructor call a constructor substitute selects: either a
/// constructor of the merged class itself or of its direct superclass.
#[derive(Debug, PartialEq, Clone)]
pub struct ConstructorInvocation {
    /// The internal name of the class whose constructor to chain to.
    pub owner: String,
    /// The descriptor of the constructor.
    pub descriptor: String,
    /// The arguments to pass, boxed.
    pub args: Vec<Value>,
}

/// A captured enum constant: name, ordinal, and constructor arguments.
#[derive(Debug, PartialEq, Clone)]
pub struct EnumConstantRecord {
    /// The constant name.
    pub name: String,
    /// The declaration position.
    pub ordinal: i32,
    /// The remaining constructor arguments, boxed.
    pub args: Vec<Value>,
}

/// An error surfaced by the control registry.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SurfaceError {
    /// `call_original` was used without a registered invoker.
    #[error("no original-method invoker registered for {0}")]
    MissingInvoker(MethodKey),
    /// A constructor substitute selected a constructor that exists neither
    /// on the merged class nor on its direct superclass.
    #[error("no constructor {descriptor} on `{owner}` or its direct superclass")]
    NoMatchingConstructor {
        /// The owner the substitute named.
        owner: String,
        /// The descriptor the substitute named.
        descriptor: String,
    },
}

type Invoker = dyn Fn(&Invocation) -> Value + Send + Sync;

/// The process-global registries the dispatch prologue queries.
///
/// Tests mutate registrations in their setup phase, the merged code reads
/// them while running, and fixtures call [`reset`](Self::reset) on teardown.
/// Delegation is on by default: a method with a reference body runs it
/// unless the method is put into the exclusion set.
#[derive(Default)]
pub struct ExecutionRegistry {
    logged: RwLock<HashMap<MethodKey, Vec<Invocation>>>,
    substitutions: RwLock<HashMap<MethodKey, Arc<dyn MethodSubstitution>>>,
    delegation_excluded: RwLock<HashSet<MethodKey>>,
    invokers: RwLock<HashMap<MethodKey, Arc<Invoker>>>,
    enum_constants: RwLock<HashMap<String, Vec<EnumConstantRecord>>>,
}

impl std::fmt::Debug for ExecutionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRegistry")
            .field("logged", &self.logged.read().expect("poisoned lock").len())
            .field(
                "substitutions",
                &self.substitutions.read().expect("poisoned lock").len(),
            )
            .field(
                "delegation_excluded",
                &self.delegation_excluded.read().expect("poisoned lock").len(),
            )
            .finish_non_exhaustive()
    }
}

static GLOBAL: OnceLock<ExecutionRegistry> = OnceLock::new();

impl ExecutionRegistry {
    /// Creates an isolated registry, mainly for tests of the registry
    /// itself.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-global registry observed by emitted code.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::default)
    }

    // Logging

    /// Starts recording invocations of the method.
    pub fn enable_logging(&self, header: &MethodHeader) {
        self.logged
            .write()
            .expect("poisoned lock")
            .entry(MethodKey::of(header))
            .or_default();
    }

    /// Stops recording and discards what was recorded.
    pub fn disable_logging(&self, header: &MethodHeader) {
        self.logged
            .write()
            .expect("poisoned lock")
            .remove(&MethodKey::of(header));
    }

    /// An immutable snapshot of the recorded invocations, or `None` if the
    /// method is unmonitored.
    #[must_use]
    pub fn invocations(&self, header: &MethodHeader) -> Option<Vec<Invocation>> {
        self.logged
            .read()
            .expect("poisoned lock")
            .get(&MethodKey::of(header))
            .cloned()
    }

    /// Clears every log registration.
    pub fn reset_logging(&self) {
        self.logged.write().expect("poisoned lock").clear();
    }

    // Substitution

    /// Installs a substitute for the method.
    pub fn enable_substitution<S>(&self, header: &MethodHeader, substitute: S)
    where
        S: MethodSubstitution + 'static,
    {
        self.substitutions
            .write()
            .expect("poisoned lock")
            .insert(MethodKey::of(header), Arc::new(substitute));
    }

    /// Removes the substitute for the method.
    pub fn disable_substitution(&self, header: &MethodHeader) {
        self.substitutions
            .write()
            .expect("poisoned lock")
            .remove(&MethodKey::of(header));
    }

    /// Clears every substitution.
    pub fn reset_substitutions(&self) {
        self.substitutions.write().expect("poisoned lock").clear();
    }

    // Delegation

    /// Disables delegation for the method: the student body runs even when a
    /// reference body exists.
    pub fn disable_delegation(&self, header: &MethodHeader) {
        self.delegation_excluded
            .write()
            .expect("poisoned lock")
            .insert(MethodKey::of(header));
    }

    /// Restores the default delegation for the method.
    pub fn enable_delegation(&self, header: &MethodHeader) {
        self.delegation_excluded
            .write()
            .expect("poisoned lock")
            .remove(&MethodKey::of(header));
    }

    /// Empties the delegation exclusion set.
    pub fn reset_delegation(&self) {
        self.delegation_excluded
            .write()
            .expect("poisoned lock")
            .clear();
    }

    /// Clears all three registries, the enum captures, and the invokers.
    /// Test fixtures call this on teardown.
    pub fn reset(&self) {
        self.reset_logging();
        self.reset_substitutions();
        self.reset_delegation();
        self.invokers.write().expect("poisoned lock").clear();
        self.enum_constants.write().expect("poisoned lock").clear();
    }

    // The internal accessors called by emitted code (via the JVM-side
    // support library) and by `Invocation::call_original`.

    /// Whether invocations of the method are being recorded.
    #[must_use]
    pub fn log_invocation(&self, header: &MethodHeader) -> bool {
        self.logged
            .read()
            .expect("poisoned lock")
            .contains_key(&MethodKey::of(header))
    }

    /// Appends a captured invocation to the method's log.
    pub fn add_invocation(&self, header: &MethodHeader, invocation: Invocation) {
        if let Some(log) = self
            .logged
            .write()
            .expect("poisoned lock")
            .get_mut(&MethodKey::of(header))
        {
            log.push(invocation);
        }
    }

    /// Whether a substitute is installed for the method.
    #[must_use]
    pub fn use_substitution(&self, header: &MethodHeader) -> bool {
        self.substitutions
            .read()
            .expect("poisoned lock")
            .contains_key(&MethodKey::of(header))
    }

    /// The installed substitute, if any.
    #[must_use]
    pub fn get_substitution(&self, header: &MethodHeader) -> Option<Arc<dyn MethodSubstitution>> {
        self.substitutions
            .read()
            .expect("poisoned lock")
            .get(&MethodKey::of(header))
            .cloned()
    }

    /// Whether the student body must run although a reference body exists.
    #[must_use]
    pub fn use_submission_impl(&self, header: &MethodHeader) -> bool {
        self.delegation_excluded
            .read()
            .expect("poisoned lock")
            .contains(&MethodKey::of(header))
    }

    // Original-method invokers, the stand-in for reflective dispatch.

    /// Registers the callable that `Invocation::call_original` dispatches
    /// through for the method.
    pub fn register_original<F>(&self, header: &MethodHeader, invoker: F)
    where
        F: Fn(&Invocation) -> Value + Send + Sync + 'static,
    {
        self.invokers
            .write()
            .expect("poisoned lock")
            .insert(MethodKey::of(header), Arc::new(invoker));
    }

    pub(super) fn original_invoker(&self, key: &MethodKey) -> Option<Arc<Invoker>> {
        self.invokers.read().expect("poisoned lock").get(key).cloned()
    }

    /// Temporarily removes the method's substitution and forces the
    /// delegation state, returning a guard that restores both.
    pub(super) fn suspend_for_call_original<'r>(
        &'r self,
        key: &MethodKey,
        delegate: bool,
    ) -> CallOriginalGuard<'r> {
        let saved_substitution = self
            .substitutions
            .write()
            .expect("poisoned lock")
            .remove(key);
        let mut excluded = self.delegation_excluded.write().expect("poisoned lock");
        let was_excluded = excluded.contains(key);
        if delegate {
            excluded.remove(key);
        } else {
            excluded.insert(key.clone());
        }
        drop(excluded);
        CallOriginalGuard {
            registry: self,
            key: key.clone(),
            saved_substitution,
            was_excluded,
        }
    }

    // Enum constant capture

    /// Records a constructed enum constant of the named class.
    pub fn record_enum_constant(&self, class_name: &str, record: EnumConstantRecord) {
        self.enum_constants
            .write()
            .expect("poisoned lock")
            .entry(class_name.to_owned())
            .or_default()
            .push(record);
    }

    /// The captured enum constants of the class, in construction order.
    #[must_use]
    pub fn enum_constants(&self, class_name: &str) -> Vec<EnumConstantRecord> {
        self.enum_constants
            .read()
            .expect("poisoned lock")
            .get(class_name)
            .cloned()
            .unwrap_or_default()
    }
}

/// Restores substitution and delegation state after `call_original`.
#[must_use]
pub(super) struct CallOriginalGuard<'r> {
    registry: &'r ExecutionRegistry,
    key: MethodKey,
    saved_substitution: Option<Arc<dyn MethodSubstitution>>,
    was_excluded: bool,
}

impl Drop for CallOriginalGuard<'_> {
    fn drop(&mut self) {
        if let Some(substitution) = self.saved_substitution.take() {
            self.registry
                .substitutions
                .write()
                .expect("poisoned lock")
                .insert(self.key.clone(), substitution);
        }
        let mut excluded = self
            .registry
            .delegation_excluded
            .write()
            .expect("poisoned lock");
        if self.was_excluded {
            excluded.insert(self.key.clone());
        } else {
            excluded.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::classfile::MethodAccess;

    use super::*;

    fn header(name: &str) -> MethodHeader {
        MethodHeader {
            owner: "sub/Widget".into(),
            access: MethodAccess::PUBLIC,
            name: name.to_owned(),
            descriptor: "(I)I".into(),
            signature: None,
            exceptions: Vec::new(),
        }
    }

    fn captured(name: &str, argument: i32) -> Invocation {
        let mut invocation = Invocation::new(header(name), Vec::new());
        invocation.add_parameter(Value::Int(argument));
        invocation
    }

    #[test]
    fn logging_is_opt_in_and_ordered() {
        let registry = ExecutionRegistry::new();
        let h = header("count");
        assert!(!registry.log_invocation(&h));
        registry.add_invocation(&h, captured("count", 1));
        assert_eq!(registry.invocations(&h), None);

        registry.enable_logging(&h);
        assert!(registry.log_invocation(&h));
        registry.add_invocation(&h, captured("count", 41));
        registry.add_invocation(&h, captured("count", 42));
        let log = registry.invocations(&h).unwrap();
        assert_eq!(log, vec![captured("count", 41), captured("count", 42)]);

        registry.disable_logging(&h);
        assert_eq!(registry.invocations(&h), None);
    }

    #[test]
    fn delegation_defaults_on() {
        let registry = ExecutionRegistry::new();
        let h = header("roll");
        assert!(!registry.use_submission_impl(&h));
        registry.disable_delegation(&h);
        assert!(registry.use_submission_impl(&h));
        registry.enable_delegation(&h);
        assert!(!registry.use_submission_impl(&h));
    }

    #[test]
    fn substitution_round_trip() {
        let registry = ExecutionRegistry::new();
        let h = header("roll");
        registry.enable_substitution(&h, |_: &Invocation| Value::Int(4));
        assert!(registry.use_substitution(&h));
        let substitute = registry.get_substitution(&h).unwrap();
        assert_eq!(
            substitute.execute(&captured("roll", 0)),
            Value::Int(4)
        );
        registry.disable_substitution(&h);
        assert!(!registry.use_substitution(&h));
    }

    #[test]
    fn call_original_restores_state() {
        let registry = ExecutionRegistry::new();
        let h = header("count");
        registry.enable_substitution(&h, |_: &Invocation| Value::Int(0));
        registry.disable_delegation(&h);
        registry.register_original(&h, |invocation: &Invocation| {
            match invocation.parameters() {
                [Value::Int(it)] => Value::Int(it + 1),
                _ => Value::Null,
            }
        });

        let invocation = captured("count", 5);
        let result = invocation
            .call_original(&registry, true, vec![Value::Int(5)])
            .unwrap();
        assert_eq!(result, Value::Int(6));
        // Both toggles restored after the call.
        assert!(registry.use_substitution(&h));
        assert!(registry.use_submission_impl(&h));
    }

    #[test]
    fn reset_clears_everything() {
        let registry = ExecutionRegistry::new();
        let h = header("count");
        registry.enable_logging(&h);
        registry.enable_substitution(&h, |_: &Invocation| Value::Null);
        registry.disable_delegation(&h);
        registry.record_enum_constant(
            "sub/Suit",
            EnumConstantRecord {
                name: "HEARTS".into(),
                ordinal: 0,
                args: Vec::new(),
            },
        );
        registry.reset();
        assert!(!registry.log_invocation(&h));
        assert!(!registry.use_substitution(&h));
        assert!(!registry.use_submission_impl(&h));
        assert!(registry.enum_constants("sub/Suit").is_empty());
    }
}
