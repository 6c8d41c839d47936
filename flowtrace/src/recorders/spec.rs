//! Recorder specification mini-language.
//!
//! A specification is a comma-separated list of items, each
//! `<scope>[/<ctx>]:<entities>[/<ctx>][:<ctx>]`:
//!
//! * scope `g` records over the whole analysis-entry scope (one recorder),
//!   scope `f` records per executed function (one recorder per function and
//!   scope context);
//! * entities are one letter each: `b` block frequencies, `i` infeasible
//!   blocks, `l` loop bounds, `c` call targets;
//! * a `/<n>` after the scope sets the scope context length, after the
//!   entities (or as a trailing `:<n>`) the entity context length; both
//!   default to the global call-string length.
//!
//! For function scopes the entity context doubles as the virtual-inlining
//! depth: calls deeper than that many frames below the scope function are
//! still attributed to it.

use crate::domain::SpecError;

/// What a recorder records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    BlockFrequencies,
    InfeasibleBlocks,
    LoopBounds,
    CallTargets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Global,
    Function,
}

/// Entity selection and context configuration of one recorder family.
#[derive(Debug, Clone)]
pub struct RecorderSpec {
    entity_types: Vec<EntityType>,
    /// Call-string length for recorded program points.
    pub entity_context: usize,
    /// Virtual-inlining depth for function scopes; `None` means unlimited.
    pub call_limit: Option<usize>,
}

impl RecorderSpec {
    #[must_use]
    pub fn records(&self, entity: EntityType) -> bool {
        self.entity_types.contains(&entity)
    }
}

/// One parsed specification item.
#[derive(Debug, Clone)]
pub struct ScopedSpec {
    pub scope: ScopeKind,
    /// Call-string length distinguishing scope instances (function scopes).
    pub scope_context: usize,
    pub spec: RecorderSpec,
}

/// Parse a full specification string. `default_context` is the global
/// call-string length, used wherever an item omits its own.
pub fn parse_specs(input: &str, default_context: usize) -> Result<Vec<ScopedSpec>, SpecError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_item(item, default_context))
        .collect()
}

fn parse_item(item: &str, default_context: usize) -> Result<ScopedSpec, SpecError> {
    let fields: Vec<&str> = item.split(':').collect();
    let (scope_field, entity_field, ctx_field) = match fields.as_slice() {
        [s, e] => (*s, *e, None),
        [s, e, c] => (*s, *e, Some(*c)),
        _ => return Err(SpecError::BadItem(item.to_owned())),
    };

    let (scope_name, scope_context) = split_context(item, scope_field, default_context)?;
    let scope = match scope_name {
        "g" => ScopeKind::Global,
        "f" => ScopeKind::Function,
        other => {
            return Err(SpecError::UnknownScope { fragment: item.to_owned(), scope: other.to_owned() })
        }
    };

    let (entity_names, mut entity_context) = split_context(item, entity_field, default_context)?;
    if entity_names.is_empty() {
        return Err(SpecError::BadItem(item.to_owned()));
    }
    let entity_types = entity_names
        .chars()
        .map(|c| match c {
            'b' => Ok(EntityType::BlockFrequencies),
            'i' => Ok(EntityType::InfeasibleBlocks),
            'l' => Ok(EntityType::LoopBounds),
            'c' => Ok(EntityType::CallTargets),
            other => Err(SpecError::UnknownEntity { fragment: item.to_owned(), entity: other }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(ctx) = ctx_field {
        entity_context = parse_context(item, ctx)?;
    }

    let call_limit = match scope {
        ScopeKind::Global => None,
        ScopeKind::Function => Some(entity_context),
    };
    Ok(ScopedSpec {
        scope,
        scope_context,
        spec: RecorderSpec { entity_types, entity_context, call_limit },
    })
}

/// Split `name[/ctx]`, defaulting the context length.
fn split_context<'a>(
    item: &str,
    field: &'a str,
    default_context: usize,
) -> Result<(&'a str, usize), SpecError> {
    match field.split_once('/') {
        None => Ok((field, default_context)),
        Some((name, ctx)) => Ok((name, parse_context(item, ctx)?)),
    }
}

fn parse_context(item: &str, value: &str) -> Result<usize, SpecError> {
    value
        .parse()
        .map_err(|_| SpecError::BadInteger { fragment: item.to_owned(), value: value.to_owned() })
}
