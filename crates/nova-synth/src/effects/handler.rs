use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use nova_synth_bridge::{
    BridgeError, EventContext, ExecutionBridge, FieldInfo, FieldRef, FrameInfo, InterceptEvent,
    InterceptListener, InterceptorId, InterceptorKind, ObjectId, ObjectRef, Type, Value, STRING,
};
use nova_synth_config::EffectsConfig;
use parking_lot::Mutex;

use super::filters::{can_be_array, is_useful_field, is_useful_root, is_useful_type, is_watchable};
use super::{array_id, redo_effects, undo_effects, Effect, LVal, RVal};
use crate::SynthResult;

const REFLECT_FIELD: &str = "java.lang.reflect.Field";

/// `Field` methods that write or read a field behind the watchpoints' back.
const REFLECTIVE_ACCESSORS: &[&str] = &[
    "set",
    "setBoolean",
    "setByte",
    "setChar",
    "setShort",
    "setInt",
    "setLong",
    "setFloat",
    "setDouble",
    "get",
];

#[derive(Debug, Clone, Copy)]
struct Watchpoint {
    /// Static and per-instance watchpoints may be disarmed once they fire too often.
    can_disable: bool,
}

/// What one batch did to the heap so far.
#[derive(Debug, Default)]
struct BatchEffects {
    /// Field writes, keyed by location: `(value before the batch, latest value)`.
    writes: BTreeMap<LVal, (RVal, RVal)>,
    /// Array-valued fields that were read, with their contents before the batch.
    read_arrays: BTreeMap<LVal, RVal>,
    arg_arrays: Vec<(ObjectId, RVal)>,
    backed_up: BTreeSet<ObjectId>,
    changed: BTreeSet<LVal>,
    /// Effects applied by the synthesizer itself rather than by evaluated code.
    manual: Vec<Effect>,
    access_counts: HashMap<InterceptorId, u32>,
    disabled: Vec<InterceptorId>,
}

#[derive(Debug, Default)]
struct HandlerState {
    enabled: bool,
    /// Objects allocated after setup are new and never need restoring.
    max_id: ObjectId,
    watchpoints: BTreeMap<InterceptorId, Watchpoint>,
    prepare_hook: Option<InterceptorId>,
    reflection_hooks: Vec<InterceptorId>,
    /// Objects kept from collection, with how many recorded values hold each.
    pinned: HashMap<ObjectId, usize>,
    /// First bridge failure seen inside a callback; reported when the batch finishes.
    error: Option<BridgeError>,
    batch: Option<BatchEffects>,
}

/// Records the heap changes candidate evaluation makes, so they can be undone.
///
/// Field writes are caught by modification watchpoints. Array element stores are invisible to
/// watchpoints, so array-holding fields are also watched for reads and their contents are
/// snapshotted on first access. Arrays passed as call arguments are snapshotted up front.
///
/// The handler is shared with the bridge as its [`InterceptListener`]; all state sits behind
/// one lock.
#[derive(Debug)]
pub struct SideEffectHandler {
    config: EffectsConfig,
    state: Mutex<HandlerState>,
}

impl SideEffectHandler {
    pub fn new(config: EffectsConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(HandlerState::default()),
        })
    }

    /// Whether watchpoints are installed and effects are being tracked.
    pub fn is_active(&self) -> bool {
        self.state.lock().enabled
    }

    /// Installs watchpoints on every useful field reachable from the frame, plus the
    /// class-prepare and reflection hooks, and registers `self` as the bridge listener.
    ///
    /// Does nothing when tracking is disabled or the bridge cannot intercept.
    ///
    /// If installation fails part way, whatever was installed is removed again before the
    /// error is returned.
    pub fn start(self: &Arc<Self>, bridge: &mut dyn ExecutionBridge, frame: &FrameInfo) -> SynthResult<()> {
        let installed = self.install(bridge, frame);
        if installed.is_err() {
            if let Err(err) = self.stop(bridge) {
                tracing::warn!(
                    target: "nova.synth.effects",
                    error = %err,
                    "failed to remove hooks after an aborted setup"
                );
            }
        }
        installed
    }

    fn install(self: &Arc<Self>, bridge: &mut dyn ExecutionBridge, frame: &FrameInfo) -> SynthResult<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if !bridge.supports_interception() {
            tracing::info!(
                target: "nova.synth.effects",
                "bridge cannot intercept field accesses; side effects will not be tracked"
            );
            return Ok(());
        }
        let span = tracing::debug_span!("effects_setup");
        let _guard = span.enter();

        let loaded = bridge.loaded_classes()?;
        let reachable = reachable_objects(bridge, frame, &loaded)?;
        let mut superclasses = HashMap::new();
        let mut instances: HashMap<String, Vec<ObjectId>> = HashMap::new();
        let mut seen_types = BTreeSet::new();
        let mut fields: BTreeMap<FieldRef, FieldInfo> = BTreeMap::new();
        for (id, runtime_type) in &reachable {
            if Type::parse(runtime_type).is_array() {
                continue;
            }
            if seen_types.insert(runtime_type.clone()) && is_useful_type(runtime_type) {
                for (field, _) in bridge.object_fields(*id)? {
                    add_field(&mut fields, field, runtime_type);
                }
            }
            for class in superclass_chain(bridge, &mut superclasses, runtime_type)? {
                instances.entry(class).or_default().push(*id);
            }
        }
        for class in loaded.iter().filter(|c| is_useful_type(c)) {
            for (field, _) in bridge.static_fields(class)? {
                add_field(&mut fields, field, class);
            }
        }

        let mut state = self.state.lock();
        state.enabled = true;
        state.max_id = reachable.keys().next_back().copied().unwrap_or(0);
        for field in fields.values() {
            let split = (!field.is_static())
                .then(|| instances.get(&field.declaring))
                .flatten()
                .filter(|objs| self.config.split_per_instance(&field.declaring, objs.len()));
            match split {
                Some(objs) => {
                    for object in objs {
                        let id = watch(bridge, field, Some(*object))?;
                        state.watchpoints.insert(id, Watchpoint { can_disable: true });
                    }
                }
                None => {
                    let id = watch(bridge, field, None)?;
                    state.watchpoints.insert(
                        id,
                        Watchpoint {
                            can_disable: field.is_static(),
                        },
                    );
                }
            }
        }
        state.prepare_hook = Some(bridge.install_interceptor(InterceptorKind::ClassPrepare)?);
        for method in REFLECTIVE_ACCESSORS {
            let id = bridge.install_interceptor(InterceptorKind::MethodEntry {
                class: REFLECT_FIELD.to_owned(),
                method: (*method).to_owned(),
            })?;
            state.reflection_hooks.push(id);
        }
        tracing::debug!(
            target: "nova.synth.effects",
            reachable = reachable.len(),
            fields = fields.len(),
            watchpoints = state.watchpoints.len(),
            max_id = state.max_id,
            "installed side-effect watchpoints"
        );
        drop(state);

        let listener: Arc<dyn InterceptListener> = self.clone();
        bridge.set_listener(Some(listener));
        Ok(())
    }

    /// Begins recording for one batch.
    pub fn start_batch(&self) {
        let mut state = self.state.lock();
        if state.enabled && state.batch.is_none() {
            state.batch = Some(BatchEffects::default());
        }
    }

    /// Snapshots an array about to be passed to a call, since element stores are not
    /// observable.
    pub fn check_argument<C: EventContext + ?Sized>(&self, value: &Value, cx: &mut C) -> SynthResult<()> {
        let mut state = self.state.lock();
        let HandlerState { batch, pinned, .. } = &mut *state;
        let (Some(batch), Some(id)) = (batch.as_mut(), array_id(value)) else {
            return Ok(());
        };
        if batch.backed_up.insert(id) {
            let snapshot = RVal::capture(value, cx)?;
            pin(cx, value, pinned)?;
            batch.arg_arrays.push((id, snapshot));
        }
        Ok(())
    }

    /// Ends the batch: collects its effects, re-arms disarmed watchpoints and undoes the
    /// effects, leaving the heap as it was when the batch started.
    ///
    /// A failure recorded by a callback during the batch is returned only after whatever was
    /// recorded has been undone.
    pub fn finish_batch(&self, bridge: &mut dyn ExecutionBridge) -> SynthResult<Vec<Effect>> {
        let mut state = self.state.lock();
        let Some(batch) = state.batch.take() else {
            return Ok(Vec::new());
        };
        let mut first_error = state.error.take();
        let disabled = batch.disabled.clone();
        let collected = collect_effects(bridge, batch, &mut state.pinned);
        drop(state);
        for id in disabled {
            keep_first(&mut first_error, bridge.set_interceptor_enabled(id, true));
        }

        let effects = collected?;
        if !effects.is_empty() {
            tracing::debug!(target: "nova.synth.effects", count = effects.len(), "undoing side effects");
        }
        undo_effects(&effects, bridge)?;
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(effects),
        }
    }

    /// Re-applies `effects` (usually a chosen candidate's) and records them in the current
    /// batch so that finishing the batch reverts them again.
    pub fn redo_and_record_effects(&self, effects: &[Effect], bridge: &mut dyn ExecutionBridge) -> SynthResult<()> {
        {
            let mut state = self.state.lock();
            let HandlerState { batch, pinned, .. } = &mut *state;
            if let Some(batch) = batch.as_mut() {
                for effect in effects {
                    match &effect.lval {
                        LVal::Field { .. } if effect.before.is_array() => {
                            batch.backup_array(bridge, pinned, effect.lval.clone(), effect.before.value())?;
                        }
                        LVal::Field { .. } => {
                            batch.record_write(
                                bridge,
                                pinned,
                                effect.lval.clone(),
                                effect.before.value(),
                                effect.after.value(),
                            )?;
                        }
                        LVal::Variable(_) | LVal::ArrayElement { .. } => batch.manual.push(effect.clone()),
                        LVal::ArgumentArray(_) => {}
                    }
                }
            }
        }
        redo_effects(effects, bridge)
    }

    /// Removes every hook (the class-prepare hook first, since it adds watchpoints), detaches
    /// the listener and releases pinned objects.
    pub fn stop(&self, bridge: &mut dyn ExecutionBridge) -> SynthResult<()> {
        let mut state = self.state.lock();
        let installed = state.enabled || state.prepare_hook.is_some() || !state.watchpoints.is_empty();
        state.enabled = false;
        state.batch = None;
        let mut first_error = None;
        if let Some(id) = state.prepare_hook.take() {
            keep_first(&mut first_error, bridge.remove_interceptor(id));
        }
        for id in std::mem::take(&mut state.watchpoints).into_keys() {
            keep_first(&mut first_error, bridge.remove_interceptor(id));
        }
        for id in std::mem::take(&mut state.reflection_hooks) {
            keep_first(&mut first_error, bridge.remove_interceptor(id));
        }
        for id in std::mem::take(&mut state.pinned).into_keys() {
            keep_first(&mut first_error, bridge.enable_collection(id));
        }
        drop(state);
        if installed {
            bridge.set_listener(None);
            tracing::debug!(target: "nova.synth.effects", "side-effect tracking stopped");
        }
        first_error.map_or(Ok(()), |err| Err(err.into()))
    }

    fn handle_event(&self, event: &InterceptEvent, cx: &mut dyn EventContext) -> Result<(), BridgeError> {
        let mut state = self.state.lock();
        if !state.enabled {
            return Ok(());
        }
        let HandlerState {
            max_id,
            watchpoints,
            pinned,
            batch,
            ..
        } = &mut *state;
        match event {
            InterceptEvent::ClassPrepare { class, .. } => {
                for (id, watchpoint) in watch_new_class(cx, class)? {
                    watchpoints.insert(id, watchpoint);
                }
                Ok(())
            }
            InterceptEvent::FieldModification {
                object,
                field,
                current,
                to_be,
                in_static_initializer,
                ..
            } => {
                let Some(batch) = batch.as_mut() else {
                    return Ok(());
                };
                // Static initializers set up newly loaded classes; that is not undoable.
                if *in_static_initializer || is_new(object.as_ref(), *max_id) {
                    return Ok(());
                }
                let lval = LVal::field(object.as_ref().map(|o| o.id), field.clone());
                batch.record_write(cx, pinned, lval, current, to_be)
            }
            InterceptEvent::FieldAccess {
                interceptor,
                object,
                field,
                current,
                ..
            } => {
                let Some(batch) = batch.as_mut() else {
                    return Ok(());
                };
                if is_new(object.as_ref(), *max_id) || array_id(current).is_none() {
                    return Ok(());
                }
                let lval = LVal::field(object.as_ref().map(|o| o.id), field.clone());
                batch.backup_array(cx, pinned, lval.clone(), current)?;
                let can_disable = watchpoints.get(interceptor).is_some_and(|w| w.can_disable);
                if can_disable && !batch.changed.contains(&lval) {
                    let count = batch.access_counts.entry(*interceptor).or_default();
                    *count += 1;
                    if *count >= self.config.access_threshold {
                        cx.set_interceptor_enabled(*interceptor, false)?;
                        batch.disabled.push(*interceptor);
                        tracing::trace!(target: "nova.synth.effects", %field, "disarmed frequently read watchpoint");
                    }
                }
                Ok(())
            }
            InterceptEvent::MethodEntry {
                class,
                receiver,
                args,
                ..
            } if class == REFLECT_FIELD => match batch.as_mut() {
                Some(batch) => batch.reflective_access(cx, pinned, receiver.as_ref(), args),
                None => Ok(()),
            },
            InterceptEvent::MethodEntry { .. } => Ok(()),
        }
    }
}

impl InterceptListener for SideEffectHandler {
    fn on_event(&self, event: &InterceptEvent, cx: &mut dyn EventContext) {
        if let Err(err) = self.handle_event(event, cx) {
            tracing::warn!(target: "nova.synth.effects", error = %err, "failed to record side effect");
            self.state.lock().error.get_or_insert(err);
        }
    }
}

impl BatchEffects {
    fn record_write<C: EventContext + ?Sized>(
        &mut self,
        cx: &mut C,
        pinned: &mut HashMap<ObjectId, usize>,
        lval: LVal,
        old: &Value,
        new: &Value,
    ) -> Result<(), BridgeError> {
        // A field of static type `Object` can be seen both as a write and as an array read.
        if old == new || self.read_arrays.contains_key(&lval) {
            return Ok(());
        }
        let after = RVal::capture(new, cx)?;
        match self.writes.get_mut(&lval) {
            None => {
                self.changed.insert(lval.clone());
                let before = RVal::capture(old, cx)?;
                pin(cx, old, pinned)?;
                self.writes.insert(lval, (before, after));
            }
            Some((before, _)) if before.value() == new => {
                let original = before.value().clone();
                self.writes.remove(&lval);
                unpin(cx, &original, pinned)?;
            }
            Some((_, latest)) => *latest = after,
        }
        Ok(())
    }

    fn backup_array<C: EventContext + ?Sized>(
        &mut self,
        cx: &mut C,
        pinned: &mut HashMap<ObjectId, usize>,
        lval: LVal,
        current: &Value,
    ) -> Result<(), BridgeError> {
        if self.changed.contains(&lval) || self.read_arrays.contains_key(&lval) {
            return Ok(());
        }
        let snapshot = RVal::capture(current, cx)?;
        pin(cx, current, pinned)?;
        self.read_arrays.insert(lval, snapshot);
        Ok(())
    }

    /// `Field.set*(target, value)` and `Field.get(target)`.
    fn reflective_access(
        &mut self,
        cx: &mut dyn EventContext,
        pinned: &mut HashMap<ObjectId, usize>,
        receiver: Option<&ObjectRef>,
        args: &[Value],
    ) -> Result<(), BridgeError> {
        let Some(receiver) = receiver else {
            return Ok(());
        };
        let Some(field) = reflected_field(cx, receiver.id)? else {
            return Ok(());
        };
        let target = if field.is_static() {
            None
        } else {
            match args.first().and_then(Value::object_id) {
                Some(id) => Some(id),
                // The call itself throws.
                None => return Ok(()),
            }
        };
        let lval = LVal::field(target, field.field_ref());
        let old = cx.field_value(target, &field.field_ref())?;
        match args {
            [_, new] => {
                let new = unbox(cx, &field.ty, new)?;
                self.record_write(cx, pinned, lval, &old, &new)
            }
            _ if array_id(&old).is_some() => self.backup_array(cx, pinned, lval, &old),
            _ => Ok(()),
        }
    }
}

fn collect_effects(
    bridge: &mut dyn ExecutionBridge,
    batch: BatchEffects,
    pinned: &mut HashMap<ObjectId, usize>,
) -> Result<Vec<Effect>, BridgeError> {
    let mut effects = Vec::new();
    for (lval, (before, after)) in batch.writes {
        // Element stores after the write are only visible now.
        let after = RVal::capture(after.value(), bridge)?;
        effects.push(Effect::new(lval, before, after));
    }
    for (lval, before) in batch.read_arrays {
        let LVal::Field { object, field } = &lval else {
            continue;
        };
        let current = bridge.field_value(*object, field)?;
        let after = RVal::capture(&current, bridge)?;
        if after == before {
            unpin(bridge, before.value(), pinned)?;
        } else {
            effects.push(Effect::new(lval, before, after));
        }
    }
    // Last, since the same array may already be covered through a field.
    for (id, before) in batch.arg_arrays {
        let after = RVal::capture(before.value(), bridge)?;
        if after == before {
            unpin(bridge, before.value(), pinned)?;
        } else {
            effects.push(Effect::new(LVal::ArgumentArray(id), before, after));
        }
    }
    effects.extend(batch.manual);
    for effect in &effects {
        pin(bridge, effect.after.value(), pinned)?;
    }
    Ok(effects)
}

fn is_new(object: Option<&ObjectRef>, max_id: ObjectId) -> bool {
    object.is_some_and(|o| o.id > max_id)
}

fn keep_first(first: &mut Option<BridgeError>, result: Result<(), BridgeError>) {
    if let Err(err) = result {
        tracing::warn!(target: "nova.synth.effects", error = %err, "cleanup step failed");
        first.get_or_insert(err);
    }
}

fn watch<C: EventContext + ?Sized>(
    cx: &mut C,
    field: &FieldInfo,
    instance: Option<ObjectId>,
) -> Result<InterceptorId, BridgeError> {
    cx.install_interceptor(InterceptorKind::Field {
        field: field.field_ref(),
        instance,
        access: can_be_array(&field.ty),
        modification: !field.modifiers.is_final,
    })
}

fn add_field(fields: &mut BTreeMap<FieldRef, FieldInfo>, field: FieldInfo, object_type: &str) {
    if is_useful_type(&field.declaring)
        && is_useful_field(&field.declaring, &field.name, object_type)
        && is_watchable(&field)
    {
        fields.entry(field.field_ref()).or_insert(field);
    }
}

/// Static-field watchpoints for a class loaded after setup.
fn watch_new_class(cx: &mut dyn EventContext, class: &str) -> Result<Vec<(InterceptorId, Watchpoint)>, BridgeError> {
    let Some(info) = cx.class_info(class)? else {
        return Ok(Vec::new());
    };
    if !is_useful_type(&info.name) {
        return Ok(Vec::new());
    }
    let mut added = Vec::new();
    for field in info
        .fields
        .iter()
        .filter(|f| f.is_static() && is_watchable(f) && is_useful_field(&info.name, &f.name, &info.name))
    {
        added.push((watch(cx, field, None)?, Watchpoint { can_disable: true }));
    }
    tracing::trace!(target: "nova.synth.effects", class, watchpoints = added.len(), "watching newly loaded class");
    Ok(added)
}

/// The field a `java.lang.reflect.Field` object denotes.
fn reflected_field(cx: &mut dyn EventContext, reflect_field: ObjectId) -> Result<Option<FieldInfo>, BridgeError> {
    let clazz = cx.field_value(Some(reflect_field), &FieldRef::new(REFLECT_FIELD, "clazz"))?;
    let name = cx.field_value(Some(reflect_field), &FieldRef::new(REFLECT_FIELD, "name"))?;
    let (Some(clazz), Some(name)) = (clazz.object_id(), name.object_id()) else {
        return Ok(None);
    };
    let declaring = cx.reflected_type(clazz)?;
    let name = cx.string_value(name)?;
    Ok(cx
        .class_info(&declaring)?
        .and_then(|info| info.declared_field(&name).cloned()))
}

/// Reflective setters take boxed values for primitive fields.
fn unbox(cx: &mut dyn EventContext, field_type: &Type, value: &Value) -> Result<Value, BridgeError> {
    match value {
        Value::Object(obj) if field_type.is_primitive() => {
            cx.field_value(Some(obj.id), &FieldRef::new(obj.runtime_type.clone(), "value"))
        }
        other => Ok(other.clone()),
    }
}

/// Every object reachable from the frame and from static fields, with its runtime type.
fn reachable_objects(
    bridge: &mut dyn ExecutionBridge,
    frame: &FrameInfo,
    loaded: &[String],
) -> Result<BTreeMap<ObjectId, String>, BridgeError> {
    let mut stack: Vec<Value> = frame
        .this
        .iter()
        .cloned()
        .chain(frame.locals.iter().map(|l| l.value.clone()))
        .collect();
    for class in loaded {
        for (field, value) in bridge.static_fields(class)? {
            if is_useful_root(class, &field.name) {
                stack.push(value);
            }
        }
    }
    let mut seen = BTreeMap::new();
    while let Some(value) = stack.pop() {
        let Value::Object(obj) = value else {
            continue;
        };
        if seen.insert(obj.id, obj.runtime_type.clone()).is_some() {
            continue;
        }
        match Type::parse(&obj.runtime_type).component() {
            Some(component) => {
                if component.is_reference() && component.class_name() != Some(STRING) {
                    stack.extend(bridge.array_values(obj.id)?);
                }
            }
            None => {
                for (field, value) in bridge.object_fields(obj.id)? {
                    if is_useful_root(&field.declaring, &field.name) {
                        stack.push(value);
                    }
                }
            }
        }
    }
    Ok(seen)
}

fn superclass_chain(
    bridge: &mut dyn ExecutionBridge,
    cache: &mut HashMap<String, Option<String>>,
    class: &str,
) -> Result<Vec<String>, BridgeError> {
    let mut chain: Vec<String> = Vec::new();
    let mut current = Some(class.to_owned());
    while let Some(name) = current {
        if chain.contains(&name) {
            break;
        }
        let superclass = match cache.get(&name) {
            Some(superclass) => superclass.clone(),
            None => {
                let superclass = bridge.class_info(&name)?.and_then(|info| info.superclass);
                cache.insert(name.clone(), superclass.clone());
                superclass
            }
        };
        chain.push(name);
        current = superclass;
    }
    Ok(chain)
}

/// Keeps `value` (and, for arrays, everything in it) from being collected.
///
/// Pins are counted per object; collection is re-enabled once the last holder lets go.
fn pin<C: EventContext + ?Sized>(
    cx: &mut C,
    value: &Value,
    pinned: &mut HashMap<ObjectId, usize>,
) -> Result<(), BridgeError> {
    let mut visited = BTreeSet::new();
    let mut stack = vec![value.clone()];
    while let Some(value) = stack.pop() {
        let Some(id) = value.object_id() else {
            continue;
        };
        if !visited.insert(id) {
            continue;
        }
        match pinned.get_mut(&id) {
            Some(holders) => *holders += 1,
            None => {
                cx.disable_collection(id)?;
                pinned.insert(id, 1);
            }
        }
        if array_id(&value).is_some() {
            stack.extend(cx.array_values(id)?);
        }
    }
    Ok(())
}

fn unpin<C: EventContext + ?Sized>(
    cx: &mut C,
    value: &Value,
    pinned: &mut HashMap<ObjectId, usize>,
) -> Result<(), BridgeError> {
    let mut visited = BTreeSet::new();
    let mut stack = vec![value.clone()];
    while let Some(value) = stack.pop() {
        let Some(id) = value.object_id() else {
            continue;
        };
        if !visited.insert(id) {
            continue;
        }
        if let Some(holders) = pinned.get_mut(&id) {
            *holders -= 1;
            if *holders == 0 {
                pinned.remove(&id);
                cx.enable_collection(id)?;
            }
        }
        if array_id(&value).is_some() {
            stack.extend(cx.array_values(id)?);
        }
    }
    Ok(())
}
