//! Side effects of candidate evaluation and how to revert them.
//!
//! An [`Effect`] is one storage location that changed, together with its value before and
//! after. Array-valued locations carry a snapshot of the array contents so that element
//! writes (which no watchpoint reports) can be restored too.

mod filters;
mod handler;

use std::fmt;

use nova_synth_bridge::{
    BridgeError, EventContext, ExecutionBridge, FieldRef, ObjectId, Type, Value,
};

use crate::{SynthError, SynthResult};

pub use handler::SideEffectHandler;

/// A storage location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LVal {
    /// An instance field, or a static field when `object` is `None`.
    Field {
        object: Option<ObjectId>,
        field: FieldRef,
    },
    /// A local variable of the paused frame.
    Variable(String),
    ArrayElement { array: ObjectId, index: usize },
    /// The contents of an array passed as a call argument.
    ArgumentArray(ObjectId),
}

impl LVal {
    pub fn field(object: Option<ObjectId>, field: FieldRef) -> Self {
        LVal::Field { object, field }
    }
}

impl fmt::Display for LVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LVal::Field {
                object: Some(id),
                field,
            } => write!(f, "#{id}.{}", field.name),
            LVal::Field { object: None, field } => write!(f, "{field}"),
            LVal::Variable(name) => f.write_str(name),
            LVal::ArrayElement { array, index } => write!(f, "#{array}[{index}]"),
            LVal::ArgumentArray(array) => write!(f, "#{array}[*]"),
        }
    }
}

/// A value stored in an [`LVal`]; arrays remember their contents at capture time.
#[derive(Debug, Clone, PartialEq)]
pub enum RVal {
    Plain(Value),
    Array { value: Value, elements: Vec<Value> },
}

impl RVal {
    /// Captures `value`, snapshotting its elements when it is an array.
    pub fn capture<C: EventContext + ?Sized>(value: &Value, cx: &mut C) -> Result<RVal, BridgeError> {
        match array_id(value) {
            Some(id) => Ok(RVal::Array {
                value: value.clone(),
                elements: cx.array_values(id)?,
            }),
            None => Ok(RVal::Plain(value.clone())),
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            RVal::Plain(value) | RVal::Array { value, .. } => value,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, RVal::Array { .. })
    }

    /// Writes the captured contents back into the array, if any.
    fn restore_elements(&self, bridge: &mut dyn ExecutionBridge) -> Result<(), BridgeError> {
        match self {
            RVal::Array { value, elements } => match value.object_id() {
                Some(id) => bridge.set_array_values(id, elements),
                None => Ok(()),
            },
            RVal::Plain(_) => Ok(()),
        }
    }
}

impl fmt::Display for RVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RVal::Plain(value) => write!(f, "{value:?}"),
            RVal::Array { elements, .. } => write!(f, "{elements:?}"),
        }
    }
}

/// The object id of `value` if it is an array reference.
pub(crate) fn array_id(value: &Value) -> Option<ObjectId> {
    match value {
        Value::Object(obj) if Type::parse(&obj.runtime_type).is_array() => Some(obj.id),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub lval: LVal,
    pub before: RVal,
    pub after: RVal,
}

impl Effect {
    pub fn new(lval: LVal, before: RVal, after: RVal) -> Self {
        Self { lval, before, after }
    }

    /// Restores the location (and array contents) to `before`.
    pub fn undo(&self, bridge: &mut dyn ExecutionBridge) -> SynthResult<()> {
        self.apply(&self.before, bridge)
    }

    /// Re-applies `after`.
    pub fn redo(&self, bridge: &mut dyn ExecutionBridge) -> SynthResult<()> {
        self.apply(&self.after, bridge)
    }

    fn apply(&self, target: &RVal, bridge: &mut dyn ExecutionBridge) -> SynthResult<()> {
        let result = match &self.lval {
            LVal::Field { object, field } => bridge
                .set_field_value(*object, field, target.value())
                .and_then(|()| target.restore_elements(bridge)),
            LVal::Variable(name) => bridge
                .set_local(name, target.value())
                .and_then(|()| target.restore_elements(bridge)),
            LVal::ArrayElement { array, index } => {
                set_element(bridge, *array, *index, target.value())
                    .and_then(|()| target.restore_elements(bridge))
            }
            LVal::ArgumentArray(_) => target.restore_elements(bridge),
        };
        result.map_err(|source| SynthError::Undo {
            location: self.lval.clone(),
            value: target.value().clone(),
            source,
        })
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {}", self.lval, self.before, self.after)
    }
}

fn set_element(
    bridge: &mut dyn ExecutionBridge,
    array: ObjectId,
    index: usize,
    value: &Value,
) -> Result<(), BridgeError> {
    let mut values = bridge.array_values(array)?;
    let Some(slot) = values.get_mut(index) else {
        return Err(BridgeError::Other(format!(
            "index {index} out of bounds for array #{array}"
        )));
    };
    *slot = value.clone();
    bridge.set_array_values(array, &values[..=index])
}

/// Reverts `effects`, last change first.
pub fn undo_effects(effects: &[Effect], bridge: &mut dyn ExecutionBridge) -> SynthResult<()> {
    for effect in effects.iter().rev() {
        tracing::trace!(target: "nova.synth.effects", %effect, "undo");
        effect.undo(bridge)?;
    }
    Ok(())
}

pub fn redo_effects(effects: &[Effect], bridge: &mut dyn ExecutionBridge) -> SynthResult<()> {
    for effect in effects {
        tracing::trace!(target: "nova.synth.effects", %effect, "redo");
        effect.redo(bridge)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use nova_synth_bridge::mock::MockVm;
    use nova_synth_bridge::{ClassInfo, Modifiers};
    use pretty_assertions::assert_eq;

    use super::*;

    fn vm_with_counter() -> (MockVm, Value) {
        let mut vm = MockVm::new();
        vm.define_class(
            ClassInfo::new("Counter")
                .field("count", Type::int(), Modifiers::PRIVATE)
                .field("slots", Type::array_of(Type::int()), Modifiers::PRIVATE),
        );
        let counter = vm.new_object("Counter").unwrap();
        (vm, counter)
    }

    #[test]
    fn field_effect_round_trips() {
        let (mut vm, counter) = vm_with_counter();
        vm.set_field(&counter, "count", Value::Int(5)).unwrap();
        let effect = Effect::new(
            LVal::field(counter.object_id(), FieldRef::new("Counter", "count")),
            RVal::Plain(Value::Int(5)),
            RVal::Plain(Value::Int(7)),
        );

        effect.redo(&mut vm).unwrap();
        assert_eq!(vm.get_field(&counter, "count").unwrap(), Value::Int(7));
        effect.undo(&mut vm).unwrap();
        assert_eq!(vm.get_field(&counter, "count").unwrap(), Value::Int(5));
    }

    #[test]
    fn array_contents_are_restored_with_the_field() {
        let (mut vm, counter) = vm_with_counter();
        let slots = vm.new_array(Type::int(), vec![Value::Int(1), Value::Int(2)]);
        vm.set_field(&counter, "slots", slots.clone()).unwrap();
        let before = RVal::capture(&slots, &mut vm).unwrap();
        vm.array_set(&slots, 0, Value::Int(9)).unwrap();
        let after = RVal::capture(&slots, &mut vm).unwrap();
        let effect = Effect::new(
            LVal::field(counter.object_id(), FieldRef::new("Counter", "slots")),
            before,
            after,
        );

        undo_effects(std::slice::from_ref(&effect), &mut vm).unwrap();
        assert_eq!(vm.array(&slots).unwrap(), vec![Value::Int(1), Value::Int(2)]);
        redo_effects(std::slice::from_ref(&effect), &mut vm).unwrap();
        assert_eq!(vm.array(&slots).unwrap(), vec![Value::Int(9), Value::Int(2)]);
    }

    #[test]
    fn element_and_local_effects() {
        let mut vm = MockVm::new();
        let array = vm.new_array(Type::int(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        vm.add_local("x", Type::int(), Value::Int(1));
        let id = array.object_id().unwrap();
        let effects = vec![
            Effect::new(
                LVal::ArrayElement { array: id, index: 1 },
                RVal::Plain(Value::Int(2)),
                RVal::Plain(Value::Int(20)),
            ),
            Effect::new(
                LVal::Variable("x".to_owned()),
                RVal::Plain(Value::Int(1)),
                RVal::Plain(Value::Int(4)),
            ),
        ];

        redo_effects(&effects, &mut vm).unwrap();
        assert_eq!(vm.array(&array).unwrap(), vec![Value::Int(1), Value::Int(20), Value::Int(3)]);
        assert_eq!(vm.local("x"), Some(&Value::Int(4)));
        undo_effects(&effects, &mut vm).unwrap();
        assert_eq!(vm.array(&array).unwrap(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(vm.local("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn failed_undo_names_the_location() {
        let mut vm = MockVm::new();
        let effect = Effect::new(
            LVal::Variable("missing".to_owned()),
            RVal::Plain(Value::Int(1)),
            RVal::Plain(Value::Int(2)),
        );
        let err = effect.undo(&mut vm).unwrap_err();
        assert!(matches!(err, SynthError::Undo { ref location, .. } if *location == effect.lval));
        assert!(err.to_string().starts_with("failed to restore missing"));
    }
}
