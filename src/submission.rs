//! Per-class analysis of a student submission: the original/computed member
//! maps every later stage consumes.
//!
//! Analysis is split in two phases. Registration with the
//! [`TransformContext`](crate::context::TransformContext) *scans* the class:
//! the declared structure is recorded without touching any other class, so
//! mutually recursive submissions can all be registered first. *Resolution*
//! (strictly once per class) then binds the class to a reference, maps every
//! member (pinned mapping, then fuzzy matching, then identity), and merges
//! inherited members by recursing over the already-scanned neighbors.

use std::collections::HashMap;

use log::{debug, warn};

use crate::{
    classfile::{Class, Field, FieldAccess, Method, MethodAccess},
    context::TransformContext,
    errors::{ConfigError, TransformError},
    forced::ForcedSignature,
    headers::{ClassHeader, FieldHeader, MethodHeader},
    reference::ReferenceClass,
    similarity::{MatchCandidate, SimilarityMatcher},
};

/// The resolved analysis of one submission class.
///
/// Read-only once constructed; every original member maps to exactly one
/// computed counterpart (the reference's version when bound, itself
/// otherwise).
#[derive(Debug)]
pub struct SubmissionClassInfo {
    class: Class,
    original_header: ClassHeader,
    computed_header: ClassHeader,
    solution_name: Option<String>,
    fields: HashMap<FieldHeader, FieldHeader>,
    methods: HashMap<MethodHeader, MethodHeader>,
    super_constructors: HashMap<MethodHeader, MethodHeader>,
}

impl SubmissionClassInfo {
    /// Resolves a scanned class against the context. Called by the context,
    /// exactly once per class.
    pub(crate) fn resolve(
        class: Class,
        context: &TransformContext,
    ) -> Result<Self, TransformError> {
        let original_header = ClassHeader::of(&class);
        let solution_name = context.solution_class_name(&class.name);
        let reference = solution_name
            .as_deref()
            .and_then(|name| context.reference_class(name));
        if let Some(reference) = reference {
            debug!("`{}` binds to reference `{}`", class.name, reference.name());
        } else {
            debug!("`{}` has no bound reference", class.name);
        }

        let computed_header = match reference {
            Some(reference) => reference.header().clone(),
            None => original_header.clone(),
        };

        let mut info = Self {
            original_header,
            computed_header,
            solution_name,
            fields: HashMap::new(),
            methods: HashMap::new(),
            super_constructors: HashMap::new(),
            class,
        };
        info.resolve_declared_fields(reference, context)?;
        info.resolve_declared_methods(reference, context)?;
        info.resolve_supertypes(context)?;
        Ok(info)
    }

    fn matcher(context: &TransformContext) -> SimilarityMatcher {
        SimilarityMatcher::new(context.config().similarity_threshold)
    }

    fn resolve_declared_fields(
        &mut self,
        reference: Option<&ReferenceClass>,
        context: &TransformContext,
    ) -> Result<(), TransformError> {
        let owner = self.class.name.clone();
        let mut pinned: HashMap<String, String> = HashMap::new();
        let mut unpinned: Vec<FieldHeader> = Vec::new();

        for field in &self.class.fields {
            let original = FieldHeader::of(&owner, field);
            if field.is_synthetic() {
                self.fields.insert(original.clone(), original);
                continue;
            }
            match ForcedSignature::of_field(field) {
                Some(forced) => {
                    if let Some(previous) =
                        pinned.insert(forced.identifier.clone(), field.name.clone())
                    {
                        return Err(ConfigError::PinnedCollision {
                            owner,
                            first: previous,
                            second: field.name.clone(),
                            target: forced.identifier,
                        }
                        .into());
                    }
                    let computed = reference
                        .and_then(|it| it.field(&forced.identifier))
                        .map(|it| FieldHeader::of(reference.expect("bound").name(), it));
                    match computed {
                        Some(computed) => {
                            self.fields.insert(original, computed);
                        }
                        None => {
                            warn!(
                                "`{owner}.{}` pins `{}` but the reference has no such field",
                                field.name, forced.identifier
                            );
                            self.fields.insert(original.clone(), original);
                        }
                    }
                }
                None => unpinned.push(original),
            }
        }

        let Some(reference) = reference else {
            for original in unpinned {
                self.fields.insert(original.clone(), original);
            }
            return Ok(());
        };

        let pinned_targets: std::collections::HashSet<&String> = pinned.keys().collect();
        let columns: Vec<&Field> = reference
            .fields()
            .iter()
            .filter(|it| !it.is_synthetic() && !pinned_targets.contains(&it.name))
            .collect();
        let candidates: Vec<MatchCandidate<'_>> = columns
            .iter()
            .map(|it| MatchCandidate::plain(&it.name))
            .collect();
        let rows: Vec<&str> = unpinned.iter().map(|it| it.name.as_str()).collect();
        let matches = Self::matcher(context).match_sets(&rows, &candidates);

        for (row_index, original) in unpinned.into_iter().enumerate() {
            let computed = matches
                .get(&row_index)
                .map(|column| FieldHeader::of(reference.name(), columns[*column]));
            match computed {
                Some(computed) => {
                    debug!("field `{}` maps to `{}`", original.name, computed.name);
                    self.fields.insert(original, computed);
                }
                None => {
                    self.fields.insert(original.clone(), original);
                }
            }
        }
        Ok(())
    }

    fn resolve_declared_methods(
        &mut self,
        reference: Option<&ReferenceClass>,
        context: &TransformContext,
    ) -> Result<(), TransformError> {
        let owner = self.class.name.clone();
        let mut pinned: HashMap<(String, String), String> = HashMap::new();
        let mut unpinned: Vec<(MethodHeader, String)> = Vec::new();

        for method in &self.class.methods {
            let original = MethodHeader::of(&owner, method);
            let translated_descriptor = context.computed_descriptor(&method.descriptor);

            if method.is_lambda_helper() || method.is_static_initializer() {
                self.methods.insert(original.clone(), original);
                continue;
            }
            if method.is_constructor() {
                // Constructors bind by translated-descriptor equality only.
                let computed = reference
                    .and_then(|it| it.method(&original.name, &translated_descriptor))
                    .map(|it| MethodHeader::of(reference.expect("bound").name(), it));
                match computed {
                    Some(computed) => self.methods.insert(original, computed),
                    None => self.methods.insert(original.clone(), original),
                };
                continue;
            }
            match ForcedSignature::of_method(method) {
                Some(forced) => {
                    let target_descriptor = forced
                        .descriptor
                        .clone()
                        .unwrap_or_else(|| translated_descriptor.clone());
                    let key = (forced.identifier.clone(), target_descriptor.clone());
                    if let Some(previous) = pinned.insert(key, method.name.clone()) {
                        return Err(ConfigError::PinnedCollision {
                            owner,
                            first: previous,
                            second: method.name.clone(),
                            target: format!("{}{target_descriptor}", forced.identifier),
                        }
                        .into());
                    }
                    let computed = reference
                        .and_then(|it| it.method(&forced.identifier, &target_descriptor))
                        .map(|it| MethodHeader::of(reference.expect("bound").name(), it));
                    match computed {
                        Some(computed) => {
                            self.methods.insert(original, computed);
                        }
                        None => {
                            warn!(
                                "`{owner}.{}` pins `{}` but the reference has no such method",
                                method.name, forced.identifier
                            );
                            self.methods.insert(original.clone(), original);
                        }
                    }
                }
                None => unpinned.push((original, translated_descriptor)),
            }
        }

        let Some(reference) = reference else {
            for (original, _) in unpinned {
                self.methods.insert(original.clone(), original);
            }
            return Ok(());
        };

        // Fuzzy matching on names, restricted to reference methods whose
        // descriptor equals the translated descriptor; overloads stay apart.
        let pinned_targets: std::collections::HashSet<(String, String)> =
            pinned.keys().cloned().collect();
        let mut assignments: Vec<Option<MethodHeader>> = vec![None; unpinned.len()];
        let mut grouped: HashMap<&str, Vec<usize>> = HashMap::new();
        for (index, (_, translated)) in unpinned.iter().enumerate() {
            grouped.entry(translated.as_str()).or_default().push(index);
        }
        let matcher = Self::matcher(context);
        for (descriptor, row_indices) in grouped {
            let columns: Vec<&Method> = reference
                .methods()
                .iter()
                .filter(|it| {
                    it.descriptor == descriptor
                        && !it.is_lambda_helper()
                        && !it.is_constructor()
                        && !it.is_static_initializer()
                        && !pinned_targets.contains(&(it.name.clone(), it.descriptor.clone()))
                })
                .collect();
            if columns.is_empty() {
                continue;
            }
            let candidates: Vec<MatchCandidate<'_>> = columns
                .iter()
                .map(|it| MatchCandidate::plain(&it.name))
                .collect();
            let rows: Vec<&str> = row_indices
                .iter()
                .map(|&index| unpinned[index].0.name.as_str())
                .collect();
            for (local_row, column) in matcher.match_sets(&rows, &candidates) {
                let header = MethodHeader::of(reference.name(), columns[column]);
                assignments[row_indices[local_row]] = Some(header);
            }
        }

        for ((original, _), computed) in unpinned.into_iter().zip(assignments) {
            match computed {
                Some(computed) => {
                    debug!(
                        "method `{}{}` maps to `{}{}`",
                        original.name, original.descriptor, computed.name, computed.descriptor
                    );
                    self.methods.insert(original, computed);
                }
                None => {
                    self.methods.insert(original.clone(), original);
                }
            }
        }
        Ok(())
    }

    /// Walks the supertype chain: the direct parent's constructors feed the
    /// super-constructor map, and public/protected members join the member
    /// maps under put-if-absent semantics.
    fn resolve_supertypes(&mut self, context: &TransformContext) -> Result<(), TransformError> {
        let mut current = self.class.super_name.clone();
        let mut direct_parent = true;
        while let Some(super_name) = current {
            if let Some(constructors) = well_known_root_constructors(&super_name) {
                if direct_parent {
                    for header in constructors {
                        self.super_constructors.insert(header.clone(), header);
                    }
                }
                break;
            }
            if context.is_submission_class(&super_name) {
                let parent = context.submission_info(&super_name)?;
                if direct_parent {
                    for (original, computed) in &parent.methods {
                        if original.is_constructor() {
                            self.super_constructors
                                .insert(original.clone(), computed.clone());
                        }
                    }
                }
                for (original, computed) in &parent.fields {
                    if inheritable_field(original.access) {
                        self.fields
                            .entry(original.clone())
                            .or_insert_with(|| computed.clone());
                    }
                }
                for (original, computed) in &parent.methods {
                    if original.is_constructor() || original.is_static_initializer() {
                        continue;
                    }
                    if inheritable_method(original.access) {
                        self.methods
                            .entry(original.clone())
                            .or_insert_with(|| computed.clone());
                    }
                }
                // The parent's maps already cover its own ancestors.
                break;
            }

            let external = context.external_class(&super_name).ok_or_else(|| {
                TransformError::UnresolvedType {
                    name: super_name.clone(),
                    required_by: self.class.name.clone(),
                }
            })?;
            if direct_parent {
                for method in &external.methods {
                    if method.is_constructor() && !method.access.contains(MethodAccess::PRIVATE) {
                        let header = MethodHeader::of(&external.name, method);
                        self.super_constructors.insert(header.clone(), header);
                    }
                }
            }
            for field in &external.fields {
                if inheritable_field(field.access) {
                    let header = FieldHeader::of(&external.name, field);
                    self.fields.entry(header.clone()).or_insert(header);
                }
            }
            for method in &external.methods {
                if method.is_constructor() || method.is_static_initializer() {
                    continue;
                }
                if inheritable_method(method.access) {
                    let header = MethodHeader::of(&external.name, method);
                    self.methods.entry(header.clone()).or_insert(header);
                }
            }
            current = external.super_name.clone();
            direct_parent = false;
        }
        Ok(())
    }

    /// The parsed class this analysis describes.
    #[must_use]
    pub fn class(&self) -> &Class {
        &self.class
    }

    /// The header as the student declared it.
    #[must_use]
    pub fn original_header(&self) -> &ClassHeader {
        &self.original_header
    }

    /// The header the merged class is emitted under.
    #[must_use]
    pub fn computed_header(&self) -> &ClassHeader {
        &self.computed_header
    }

    /// The bound reference class name, if any.
    #[must_use]
    pub fn solution_name(&self) -> Option<&str> {
        self.solution_name.as_deref()
    }

    /// The original → computed field map, including inherited members.
    #[must_use]
    pub fn fields(&self) -> &HashMap<FieldHeader, FieldHeader> {
        &self.fields
    }

    /// The original → computed method map, including inherited members.
    #[must_use]
    pub fn methods(&self) -> &HashMap<MethodHeader, MethodHeader> {
        &self.methods
    }

    /// The constructors of the direct supertype, original → computed.
    #[must_use]
    pub fn super_constructors(&self) -> &HashMap<MethodHeader, MethodHeader> {
        &self.super_constructors
    }

    /// The computed counterpart of a declared or inherited field, by
    /// original name. Falls back to `None` for unknown names.
    #[must_use]
    pub fn computed_field(&self, name: &str) -> Option<&FieldHeader> {
        self.fields.get(&field_probe(name))
    }

    /// The original header of a declared or inherited field, by name.
    #[must_use]
    pub fn original_field(&self, name: &str) -> Option<&FieldHeader> {
        self.fields.get_key_value(&field_probe(name)).map(|(k, _)| k)
    }

    /// The computed counterpart of a declared or inherited method, by
    /// original name and descriptor.
    #[must_use]
    pub fn computed_method(&self, name: &str, descriptor: &str) -> Option<&MethodHeader> {
        self.methods.get(&method_probe(name, descriptor))
    }

    /// The original header of a declared or inherited method.
    #[must_use]
    pub fn original_method(&self, name: &str, descriptor: &str) -> Option<&MethodHeader> {
        self.methods
            .get_key_value(&method_probe(name, descriptor))
            .map(|(k, _)| k)
    }
}

const fn inheritable_field(access: FieldAccess) -> bool {
    access.contains(FieldAccess::PUBLIC) || access.contains(FieldAccess::PROTECTED)
}

const fn inheritable_method(access: MethodAccess) -> bool {
    access.contains(MethodAccess::PUBLIC) || access.contains(MethodAccess::PROTECTED)
}

/// The constructors of the well-known roots a submission may extend without
/// a classpath entry: `Object`, `Enum`, and `Record`. The walk stops here;
/// these roots contribute no further mappable members.
fn well_known_root_constructors(name: &str) -> Option<Vec<MethodHeader>> {
    let (descriptors, access): (&[&str], MethodAccess) = match name {
        "java/lang/Object" => (&["()V"], MethodAccess::PUBLIC),
        "java/lang/Record" => (&["()V"], MethodAccess::PROTECTED),
        "java/lang/Enum" => (&["(Ljava/lang/String;I)V"], MethodAccess::PROTECTED),
        _ => return None,
    };
    let constructors = descriptors
        .iter()
        .map(|descriptor| MethodHeader {
            owner: name.to_owned(),
            access,
            name: crate::classfile::CONSTRUCTOR_NAME.to_owned(),
            descriptor: (*descriptor).to_owned(),
            signature: None,
            exceptions: Vec::new(),
        })
        .collect();
    Some(constructors)
}

fn field_probe(name: &str) -> FieldHeader {
    FieldHeader {
        owner: String::new(),
        access: FieldAccess::empty(),
        name: name.to_owned(),
        descriptor: String::new(),
        signature: None,
    }
}

fn method_probe(name: &str, descriptor: &str) -> MethodHeader {
    MethodHeader {
        owner: String::new(),
        access: MethodAccess::empty(),
        name: name.to_owned(),
        descriptor: descriptor.to_owned(),
        signature: None,
        exceptions: Vec::new(),
    }
}
