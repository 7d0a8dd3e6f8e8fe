//! Capability records and resolved instrument definitions.
//!
//! An instrument type is described by a chain of [`CapabilityRecord`]s, self
//! first, then its parent, grandparent and so on. Each record may declare
//! parameters and instruction templates. [`InstrumentDefinition::resolve`]
//! flattens the chain once: a name declared closer to the leaf shadows the
//! same name further up.
//!
//! An *ancestor* that carries no parameter or instruction map at all is a
//! broken hierarchy and fails resolution. The leaf itself may omit its maps,
//! which counts as declaring nothing of its own.

use crate::error::{CapabilityMap, DefinitionError, ParameterError};
use crate::parameter::{Parameter, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use strfmt::strfmt;
use tracing::debug;

/// Parameters keyed by name.
pub type ParameterMap = BTreeMap<String, Parameter>;

/// Instruction templates keyed by instruction name.
pub type InstructionMap = BTreeMap<String, InstructionTemplate>;

// ─── InstructionTemplate ────────────────────────────────────────────

/// A bus command with `{placeholder}` fields filled from parameter values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionTemplate(String);

impl InstructionTemplate {
    /// Wrap a format string.
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Raw template text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render with instance values, then `extra` pairs which take precedence.
    ///
    /// # Errors
    ///
    /// `ParameterError::Template` if a placeholder has no value.
    pub fn render(
        &self,
        name: &str,
        values: &ParameterValues,
        extra: &[(&str, String)],
    ) -> Result<String, ParameterError> {
        let mut context: HashMap<String, String> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (key, value) in extra {
            context.insert((*key).to_string(), value.clone());
        }
        strfmt(&self.0, &context).map_err(|e| ParameterError::Template {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

impl From<&str> for InstructionTemplate {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ─── CapabilityRecord ───────────────────────────────────────────────

/// One level of an instrument hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityRecord {
    /// Record name.
    pub name: String,
    /// Parent record, if any.
    pub parent: Option<String>,
    /// Own parameters. `None` means no map was declared.
    pub parameters: Option<ParameterMap>,
    /// Own instruction templates. `None` means no map was declared.
    pub instructions: Option<InstructionMap>,
}

impl CapabilityRecord {
    /// A root record with empty maps.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            parameters: Some(ParameterMap::new()),
            instructions: Some(InstructionMap::new()),
        }
    }

    /// Set the parent record.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declare a parameter, creating the map if absent.
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters
            .get_or_insert_with(ParameterMap::new)
            .insert(parameter.name().to_string(), parameter);
        self
    }

    /// Declare an instruction template, creating the map if absent.
    pub fn with_instruction(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.instructions
            .get_or_insert_with(InstructionMap::new)
            .insert(name.into(), InstructionTemplate::new(template));
        self
    }

    /// Drop the parameter map entirely.
    pub fn without_parameter_map(mut self) -> Self {
        self.parameters = None;
        self
    }

    /// Drop the instruction map entirely.
    pub fn without_instruction_map(mut self) -> Self {
        self.instructions = None;
        self
    }
}

// ─── Resolution ─────────────────────────────────────────────────────

fn merge_chain<T: Clone>(
    chain: &[CapabilityRecord],
    map: CapabilityMap,
    select: impl Fn(&CapabilityRecord) -> Option<&BTreeMap<String, T>>,
) -> Result<BTreeMap<String, T>, DefinitionError> {
    let (leaf, ancestors) = chain.split_first().ok_or(DefinitionError::EmptyChain)?;
    let mut merged = select(leaf).cloned().unwrap_or_default();
    for ancestor in ancestors {
        let own = select(ancestor).ok_or_else(|| DefinitionError::MissingCapabilityMap {
            capability: ancestor.name.clone(),
            map,
        })?;
        for (name, item) in own {
            merged
                .entry(name.clone())
                .or_insert_with(|| item.clone());
        }
    }
    Ok(merged)
}

/// Flatten parameters along a closest-first chain. Closer records win.
pub fn merged_parameters(chain: &[CapabilityRecord]) -> Result<ParameterMap, DefinitionError> {
    merge_chain(chain, CapabilityMap::Parameters, |r| r.parameters.as_ref())
}

/// Flatten instruction templates along a closest-first chain. Closer records win.
pub fn merged_instructions(chain: &[CapabilityRecord]) -> Result<InstructionMap, DefinitionError> {
    merge_chain(chain, CapabilityMap::Instructions, |r| r.instructions.as_ref())
}

// ─── InstrumentDefinition ───────────────────────────────────────────

/// A capability chain resolved into flat parameter and instruction maps.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentDefinition {
    name: String,
    chain: Vec<String>,
    parameters: ParameterMap,
    instructions: InstructionMap,
}

impl InstrumentDefinition {
    /// Resolve a closest-first chain. `chain[0]` names the definition.
    pub fn resolve(chain: &[CapabilityRecord]) -> Result<Self, DefinitionError> {
        let parameters = merged_parameters(chain)?;
        let instructions = merged_instructions(chain)?;
        let names: Vec<String> = chain.iter().map(|r| r.name.clone()).collect();
        let name = names.first().cloned().ok_or(DefinitionError::EmptyChain)?;
        debug!(
            definition = %name,
            chain = ?names,
            parameters = parameters.len(),
            instructions = instructions.len(),
            "Resolved instrument definition"
        );
        Ok(Self {
            name,
            chain: names,
            parameters,
            instructions,
        })
    }

    /// Leaf record name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record names, closest first.
    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// True if `capability` appears anywhere in the chain.
    pub fn inherits(&self, capability: &str) -> bool {
        self.chain.iter().any(|c| c == capability)
    }

    /// Merged parameters.
    pub fn parameters(&self) -> &ParameterMap {
        &self.parameters
    }

    /// Merged instruction templates.
    pub fn instructions(&self) -> &InstructionMap {
        &self.instructions
    }

    /// Look up a merged parameter.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// Look up a merged instruction template.
    pub fn instruction(&self, name: &str) -> Option<&InstructionTemplate> {
        self.instructions.get(name)
    }

    /// Validate a full set of values.
    ///
    /// Supplied names must equal the declared names exactly. On mismatch
    /// every missing and every extra name is reported, then each value is
    /// checked against its domain.
    pub fn instantiate(
        &self,
        supplied: BTreeMap<String, Value>,
    ) -> Result<ParameterValues, ParameterError> {
        let declared: BTreeSet<&str> = self.parameters.keys().map(String::as_str).collect();
        let given: BTreeSet<&str> = supplied.keys().map(String::as_str).collect();

        let missing: Vec<String> = declared.difference(&given).map(|s| s.to_string()).collect();
        let extra: Vec<String> = given.difference(&declared).map(|s| s.to_string()).collect();
        if !missing.is_empty() || !extra.is_empty() {
            return Err(ParameterError::Mismatch {
                definition: self.name.clone(),
                missing,
                extra,
            });
        }

        for (name, value) in &supplied {
            if let Some(parameter) = self.parameters.get(name) {
                parameter.check(value)?;
            }
        }
        Ok(ParameterValues { values: supplied })
    }

    /// Validate and store one value.
    pub fn assign(
        &self,
        values: &mut ParameterValues,
        name: &str,
        value: Value,
    ) -> Result<(), ParameterError> {
        let parameter = self.parameters.get(name).ok_or_else(|| ParameterError::Unknown {
            definition: self.name.clone(),
            name: name.to_string(),
        })?;
        parameter.check(&value)?;
        values.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Render a named instruction from `values` and `extra`.
    pub fn render(
        &self,
        instruction: &str,
        values: &ParameterValues,
        extra: &[(&str, String)],
    ) -> Result<String, ParameterError> {
        self.instructions
            .get(instruction)
            .ok_or_else(|| ParameterError::UnknownInstruction {
                definition: self.name.clone(),
                name: instruction.to_string(),
            })?
            .render(instruction, values, extra)
    }
}

// ─── ParameterValues ────────────────────────────────────────────────

/// Validated values for every declared parameter of one instance.
///
/// Only produced by [`InstrumentDefinition::instantiate`]; updates go
/// through [`InstrumentDefinition::assign`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterValues {
    values: BTreeMap<String, Value>,
}

impl ParameterValues {
    /// Value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// String value by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Integer value by name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Numeric value by name, widening integers.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the definition declares no parameters.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ─── CapabilityCatalog ──────────────────────────────────────────────

/// Named capability records, from which definitions are resolved by name.
#[derive(Debug, Clone, Default)]
pub struct CapabilityCatalog {
    records: BTreeMap<String, CapabilityRecord>,
}

impl CapabilityCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record.
    ///
    /// # Errors
    ///
    /// `DefinitionError::Duplicate` if the name is taken.
    pub fn register(&mut self, record: CapabilityRecord) -> Result<(), DefinitionError> {
        if self.records.contains_key(&record.name) {
            return Err(DefinitionError::Duplicate(record.name));
        }
        debug!(capability = %record.name, parent = ?record.parent, "Registered capability");
        self.records.insert(record.name.clone(), record);
        Ok(())
    }

    /// Record by name.
    pub fn get(&self, name: &str) -> Option<&CapabilityRecord> {
        self.records.get(name)
    }

    /// True if a record exists.
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Registered names in order.
    pub fn names(&self) -> Vec<&str> {
        self.records.keys().map(String::as_str).collect()
    }

    /// Closest-first chain starting at `name`.
    ///
    /// # Errors
    ///
    /// `Unknown` for a missing start record, `UnknownParent` for a dangling
    /// parent link and `Cycle` if a record is reached twice.
    pub fn chain(&self, name: &str) -> Result<Vec<CapabilityRecord>, DefinitionError> {
        let mut record = self
            .records
            .get(name)
            .ok_or_else(|| DefinitionError::Unknown(name.to_string()))?;
        let mut seen = BTreeSet::new();
        let mut chain = Vec::new();
        loop {
            if !seen.insert(record.name.as_str()) {
                return Err(DefinitionError::Cycle(name.to_string()));
            }
            chain.push(record.clone());
            let Some(parent) = record.parent.as_deref() else {
                break;
            };
            record = self
                .records
                .get(parent)
                .ok_or_else(|| DefinitionError::UnknownParent {
                    capability: record.name.clone(),
                    parent: parent.to_string(),
                })?;
        }
        Ok(chain)
    }

    /// Resolve the definition rooted at `name`.
    pub fn definition(&self, name: &str) -> Result<InstrumentDefinition, DefinitionError> {
        InstrumentDefinition::resolve(&self.chain(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Domain;

    fn values(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn base_mid_leaf() -> Vec<CapabilityRecord> {
        vec![
            CapabilityRecord::new("leaf")
                .with_parent("mid")
                .with_parameter(Parameter::new("x", Domain::int_range(0, 1))),
            CapabilityRecord::new("mid")
                .with_parent("base")
                .with_parameter(Parameter::new("x", Domain::int_range(0, 10)))
                .with_parameter(Parameter::new("y", Domain::float(None, None))),
            CapabilityRecord::new("base")
                .with_parameter(Parameter::new("x", Domain::int_range(0, 100)))
                .with_instruction("id", "*IDN?"),
        ]
    }

    #[test]
    fn closest_declaration_wins() {
        let merged = merged_parameters(&base_mid_leaf()).unwrap();
        assert_eq!(merged["x"].domain(), &Domain::int_range(0, 1));
        assert!(merged.contains_key("y"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn instructions_inherit_from_root() {
        let merged = merged_instructions(&base_mid_leaf()).unwrap();
        assert_eq!(merged["id"].as_str(), "*IDN?");
    }

    #[test]
    fn ancestor_without_map_is_fatal() {
        let mut chain = base_mid_leaf();
        chain[1] = chain[1].clone().without_parameter_map();
        let err = merged_parameters(&chain).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::MissingCapabilityMap {
                capability: "mid".to_string(),
                map: CapabilityMap::Parameters,
            }
        );
    }

    #[test]
    fn leaf_without_map_declares_nothing() {
        let mut chain = base_mid_leaf();
        chain[0] = CapabilityRecord::new("leaf")
            .with_parent("mid")
            .without_instruction_map()
            .without_parameter_map();
        let def = InstrumentDefinition::resolve(&chain).unwrap();
        assert_eq!(def.parameter("x").unwrap().domain(), &Domain::int_range(0, 10));
        assert!(def.instruction("id").is_some());
    }

    #[test]
    fn instantiate_reports_missing_and_extra() {
        let def = InstrumentDefinition::resolve(&[CapabilityRecord::new("pair")
            .with_parameter(Parameter::new("a", Domain::int(None, None)))
            .with_parameter(Parameter::new("b", Domain::int(None, None)))])
        .unwrap();

        let err = def
            .instantiate(values(&[("a", Value::Int(1)), ("b", Value::Int(2)), ("c", Value::Int(3))]))
            .unwrap_err();
        assert!(matches!(&err, ParameterError::Mismatch { extra, missing, .. }
            if extra == &["c".to_string()] && missing.is_empty()));
        assert!(err.to_string().contains("\"c\""));

        let err = def.instantiate(values(&[("a", Value::Int(1))])).unwrap_err();
        assert!(matches!(&err, ParameterError::Mismatch { missing, .. }
            if missing == &["b".to_string()]));

        let ok = def
            .instantiate(values(&[("a", Value::Int(1)), ("b", Value::Int(2))]))
            .unwrap();
        assert_eq!(ok.get_i64("b"), Some(2));
    }

    #[test]
    fn instantiate_validates_domains() {
        let def = InstrumentDefinition::resolve(&base_mid_leaf()).unwrap();
        let err = def
            .instantiate(values(&[("x", Value::Int(5)), ("y", Value::Float(0.0))]))
            .unwrap_err();
        assert_eq!(
            err,
            ParameterError::Invalid {
                name: "x".to_string(),
                value: "5".to_string(),
            }
        );
    }

    #[test]
    fn assign_validates_and_rejects_unknown() {
        let def = InstrumentDefinition::resolve(&base_mid_leaf()).unwrap();
        let mut vals = def
            .instantiate(values(&[("x", Value::Int(0)), ("y", Value::Float(1.5))]))
            .unwrap();
        def.assign(&mut vals, "x", Value::Int(1)).unwrap();
        assert_eq!(vals.get_i64("x"), Some(1));
        assert!(def.assign(&mut vals, "x", Value::Int(2)).is_err());
        assert!(matches!(
            def.assign(&mut vals, "z", Value::Int(0)),
            Err(ParameterError::Unknown { .. })
        ));
    }

    #[test]
    fn render_fills_placeholders_with_extra_precedence() {
        let def = InstrumentDefinition::resolve(&[CapabilityRecord::new("synth")
            .with_parameter(Parameter::new("unit", Domain::options(["Hz", "MHz"])))
            .with_instruction("set_freq", "FREQ:CW {freq} {unit}")])
        .unwrap();
        let vals = def.instantiate(values(&[("unit", Value::from("MHz"))])).unwrap();
        let cmd = def
            .render("set_freq", &vals, &[("freq", "2870".to_string())])
            .unwrap();
        assert_eq!(cmd, "FREQ:CW 2870 MHz");

        assert!(matches!(
            def.render("set_freq", &vals, &[]),
            Err(ParameterError::Template { .. })
        ));
        assert!(matches!(
            def.render("sweep", &vals, &[]),
            Err(ParameterError::UnknownInstruction { .. })
        ));
    }

    #[test]
    fn catalog_walks_parents() {
        let mut catalog = CapabilityCatalog::new();
        for record in base_mid_leaf() {
            catalog.register(record).unwrap();
        }
        let def = catalog.definition("leaf").unwrap();
        assert_eq!(def.chain(), ["leaf", "mid", "base"]);
        assert!(def.inherits("base"));
        assert!(!def.inherits("other"));
        assert_eq!(
            catalog.register(CapabilityRecord::new("mid")),
            Err(DefinitionError::Duplicate("mid".to_string()))
        );
    }

    #[test]
    fn catalog_detects_broken_links() {
        let mut catalog = CapabilityCatalog::new();
        catalog
            .register(CapabilityRecord::new("a").with_parent("b"))
            .unwrap();
        assert!(matches!(
            catalog.chain("a"),
            Err(DefinitionError::UnknownParent { .. })
        ));
        catalog
            .register(CapabilityRecord::new("b").with_parent("a"))
            .unwrap();
        assert_eq!(catalog.chain("a"), Err(DefinitionError::Cycle("a".to_string())));
        assert_eq!(
            catalog.definition("zz"),
            Err(DefinitionError::Unknown("zz".to_string()))
        );
    }
}
