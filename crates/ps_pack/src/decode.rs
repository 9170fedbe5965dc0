use alloc::string::ToString;
use alloc::vec::Vec;

use hashbrown::HashMap;
use log::{debug, trace};
use ps_io::{RandomAccess, ReadError, RecordReader};
use ps_record::{FieldName, PropertySheet, Record, RecordRef, TypeTag, Value, ValueKind};

use crate::error::{ConstructError, UnpackError, owned};
use crate::factory::ConstructObjects;
use crate::object::Obj;

// -----------------------------------------------------------------------------
// Dependencies

/// One resolved dependency.
pub enum Dep {
    /// The dependency is fully constructed.
    Ready(Obj),
    /// The dependency participates in a cycle that is still being built.
    /// The walker back-patches the field through
    /// [`Construct::patch`](crate::Construct::patch) once the dependency
    /// completes; store a placeholder for now.
    Deferred,
}

/// The view a construction strategy gets of its record's dependencies.
///
/// Dependencies are addressed by field name; the named field must hold a
/// reference (or, for [`objects`](Dependencies::objects), a list of them).
/// The walker guarantees that every reference the record contains was either
/// constructed before the strategy runs or is part of a cycle through the
/// record itself.
pub struct Dependencies<'a> {
    record: &'a Record,
    slots: Option<&'a HashMap<RecordRef, SlotState>>,
    deferred: Vec<(FieldName, RecordRef)>,
}

impl<'a> Dependencies<'a> {
    pub(crate) fn with_slots(record: &'a Record, slots: &'a HashMap<RecordRef, SlotState>) -> Self {
        Self {
            record,
            slots: Some(slots),
            deferred: Vec::new(),
        }
    }

    /// A dependency view with no session behind it: every lookup reports the
    /// dependency as not ready. Useful for driving
    /// [`ObjectFactory::construct`](crate::ObjectFactory::construct) directly
    /// with records that have no object-valued fields.
    pub fn detached(record: &'a Record) -> Self {
        Self {
            record,
            slots: None,
            deferred: Vec::new(),
        }
    }

    fn lookup(&self, field: &str) -> Result<RecordRef, ConstructError> {
        match self.record.get(field) {
            None => Err(ConstructError::missing_field(self.record, field)),
            Some(Value::Ref(r)) => Ok(*r),
            Some(other) => Err(ConstructError::field_type(
                field,
                ValueKind::Ref,
                other.kind(),
            )),
        }
    }

    fn ready(&self, reference: RecordRef) -> Option<Obj> {
        match self.slots?.get(&reference) {
            Some(SlotState::Ready(obj)) => Some(obj.clone()),
            _ => None,
        }
    }

    /// Resolves the object behind a reference field, tolerating cycles.
    ///
    /// A [`Dep::Deferred`] result obliges the strategy's
    /// [`patch`](crate::Construct::patch) to accept the field later.
    pub fn object(&mut self, field: &str) -> Result<Dep, ConstructError> {
        let reference = self.lookup(field)?;
        match self.ready(reference) {
            Some(obj) => Ok(Dep::Ready(obj)),
            None => {
                self.deferred.push((owned(field), reference));
                Ok(Dep::Deferred)
            }
        }
    }

    /// Resolves the object behind a reference field, demanding it finished.
    ///
    /// Fails with [`ConstructError::DependencyNotReady`] when the dependency
    /// is still under construction; the walker re-runs the strategy once the
    /// dependency completes, and reports an unresolvable cycle of such
    /// demands as a cyclic-construction failure.
    pub fn require(&mut self, field: &str) -> Result<Obj, ConstructError> {
        let reference = self.lookup(field)?;
        self.ready(reference)
            .ok_or_else(|| ConstructError::not_ready(field))
    }

    /// Resolves a list field of references, demanding every member finished.
    ///
    /// Cyclic edges must go through named scalar fields instead, so that
    /// back-patching stays unambiguous.
    pub fn objects(&mut self, field: &str) -> Result<Vec<Obj>, ConstructError> {
        let items = match self.record.get(field) {
            None => return Err(ConstructError::missing_field(self.record, field)),
            Some(Value::List(items)) => items,
            Some(other) => {
                return Err(ConstructError::field_type(
                    field,
                    ValueKind::List,
                    other.kind(),
                ));
            }
        };
        let mut objects = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::Ref(r) => match self.ready(*r) {
                    Some(obj) => objects.push(obj),
                    None => return Err(ConstructError::not_ready(field)),
                },
                other => {
                    return Err(ConstructError::field_type(
                        field,
                        ValueKind::Ref,
                        other.kind(),
                    ));
                }
            }
        }
        Ok(objects)
    }
}

// -----------------------------------------------------------------------------
// DecodeSession

pub(crate) enum SlotState {
    /// The record is known but construction has not started.
    Pending,
    /// The record is on the construction path; a reference back to it is a
    /// cycle.
    InProgress,
    Ready(Obj),
}

struct PatchEdge {
    on: RecordRef,
    field: FieldName,
    target: RecordRef,
    target_tag: TypeTag,
}

struct StalledRecord {
    reference: RecordRef,
    blocked_on: RecordRef,
    tag: TypeTag,
}

enum Outcome {
    Built(Obj, Vec<(FieldName, RecordRef)>),
    Stalled { blocked_on: RecordRef },
    Fail(ConstructError),
}

struct DecodeSession<'a> {
    factory: &'a dyn ConstructObjects,
    hints: &'a PropertySheet,
    fetch: Option<&'a mut dyn RandomAccess>,
    records: HashMap<RecordRef, Record>,
    order: Vec<RecordRef>,
    slots: HashMap<RecordRef, SlotState>,
    patches: Vec<PatchEdge>,
    stalled: Vec<StalledRecord>,
}

fn read_err(error: ReadError) -> UnpackError {
    match error {
        ReadError::MalformedRecord { reference, detail } => {
            UnpackError::MalformedRecord { reference, detail }
        }
        other => UnpackError::Read(other),
    }
}

fn construct_failure(reference: RecordRef, tag: TypeTag, error: ConstructError) -> UnpackError {
    match error {
        ConstructError::UnknownTypeTag { tag } => UnpackError::UnknownTypeTag { tag, reference },
        source => UnpackError::Construct {
            reference,
            tag,
            source,
        },
    }
}

impl<'a> DecodeSession<'a> {
    fn new(
        factory: &'a dyn ConstructObjects,
        hints: &'a PropertySheet,
        fetch: Option<&'a mut dyn RandomAccess>,
    ) -> Self {
        Self {
            factory,
            hints,
            fetch,
            records: HashMap::new(),
            order: Vec::new(),
            slots: HashMap::new(),
            patches: Vec::new(),
            stalled: Vec::new(),
        }
    }

    /// Validates a record and takes it into the session.
    fn admit(&mut self, record: Record) -> Result<(), UnpackError> {
        record
            .validate()
            .map_err(|fault| UnpackError::MalformedRecord {
                reference: record.reference(),
                detail: fault.to_string().into(),
            })?;
        let reference = record.reference();
        if self.records.insert(reference, record).is_some() {
            return Err(UnpackError::MalformedRecord {
                reference,
                detail: "reference is defined by more than one record in this session".into(),
            });
        }
        self.order.push(reference);
        self.slots.insert(reference, SlotState::Pending);
        Ok(())
    }

    fn drain(&mut self, reader: &mut dyn RecordReader) -> Result<(), UnpackError> {
        loop {
            match reader.next_record() {
                Ok(Some(record)) => self.admit(record)?,
                Ok(None) => return Ok(()),
                Err(error) => return Err(read_err(error)),
            }
        }
    }

    /// Checks that every reference used anywhere resolves to a record in the
    /// session.
    fn check_references(&self) -> Result<(), UnpackError> {
        for reference in &self.order {
            let Some(record) = self.records.get(reference) else {
                continue;
            };
            for (field, used) in record.references() {
                if !self.records.contains_key(&used) {
                    return Err(UnpackError::DanglingReference {
                        origin: record.reference(),
                        field: owned(field),
                        reference: used,
                    });
                }
            }
        }
        Ok(())
    }

    /// Makes a record available, fetching it by reference when the session
    /// runs over a random-access reader.
    fn ensure_record(
        &mut self,
        reference: RecordRef,
        origin: Option<(RecordRef, &str)>,
    ) -> Result<(), UnpackError> {
        if self.records.contains_key(&reference) {
            return Ok(());
        }
        let missing = match origin {
            Some((origin, field)) => UnpackError::DanglingReference {
                origin,
                field: owned(field),
                reference,
            },
            None => UnpackError::TargetNotFound { reference },
        };
        let Some(fetch) = self.fetch.as_deref_mut() else {
            return Err(missing);
        };
        match fetch.record_at(reference) {
            Ok(record) => {
                if record.reference() != reference {
                    return Err(UnpackError::MalformedRecord {
                        reference,
                        detail: "reader returned a record under a different reference".into(),
                    });
                }
                self.admit(record)
            }
            Err(ReadError::MissingRecord { .. }) => Err(missing),
            Err(error) => Err(read_err(error)),
        }
    }

    /// Constructs the closure of records reachable from `target`.
    ///
    /// An explicit work list replaces language-level recursion: a record's
    /// untouched dependencies are processed before the record itself, a
    /// dependency that is already on the path is a cycle and stays deferred,
    /// and strategies that demanded a finished dependency are re-run when it
    /// completes. No progress on the stalled set means the cycle can never
    /// resolve.
    fn build(&mut self, target: RecordRef) -> Result<(), UnpackError> {
        self.ensure_record(target, None)?;
        let mut stack = alloc::vec![target];

        while let Some(&current) = stack.last() {
            if matches!(self.slots.get(&current), Some(SlotState::Ready(_))) {
                stack.pop();
                continue;
            }
            self.slots.insert(current, SlotState::InProgress);

            let refs: Vec<(FieldName, RecordRef)> = match self.records.get(&current) {
                Some(record) => record.references().map(|(f, r)| (owned(f), r)).collect(),
                None => return Err(UnpackError::TargetNotFound { reference: current }),
            };
            let mut next_dep = None;
            for (field, dep) in &refs {
                self.ensure_record(*dep, Some((current, field.as_ref())))?;
                if matches!(self.slots.get(dep), Some(SlotState::Pending)) {
                    next_dep = Some(*dep);
                    break;
                }
            }
            if let Some(dep) = next_dep {
                stack.push(dep);
                continue;
            }

            stack.pop();
            self.construct(current, &mut stack)?;
        }

        if let Some(stall) = self.stalled.first() {
            return Err(UnpackError::CyclicConstruction {
                reference: stall.reference,
                tag: stall.tag.clone(),
            });
        }
        if let Some(patch) = self.patches.first() {
            return Err(UnpackError::CyclicConstruction {
                reference: patch.target,
                tag: patch.target_tag.clone(),
            });
        }
        Ok(())
    }

    fn construct(&mut self, current: RecordRef, stack: &mut Vec<RecordRef>) -> Result<(), UnpackError> {
        let factory = self.factory;
        let hints = self.hints;

        let (tag, outcome) = {
            let Some(record) = self.records.get(&current) else {
                return Err(UnpackError::TargetNotFound { reference: current });
            };
            let tag = record.tag().clone();
            let Some(strategy) = factory.strategy(&tag) else {
                return Err(UnpackError::UnknownTypeTag {
                    tag,
                    reference: current,
                });
            };
            trace!("constructing record {current} tagged `{tag}`");
            let mut deps = Dependencies::with_slots(record, &self.slots);
            let result = strategy.construct(record, &mut deps, hints);
            let deferred = deps.deferred;
            let outcome = match result {
                Ok(obj) => Outcome::Built(obj, deferred),
                Err(ConstructError::DependencyNotReady { field }) => {
                    match record.get(&field).and_then(Value::as_reference) {
                        Some(blocked_on)
                            if !matches!(
                                self.slots.get(&blocked_on),
                                Some(SlotState::Ready(_))
                            ) =>
                        {
                            Outcome::Stalled { blocked_on }
                        }
                        _ => Outcome::Fail(ConstructError::DependencyNotReady { field }),
                    }
                }
                Err(error) => Outcome::Fail(error),
            };
            (tag, outcome)
        };

        match outcome {
            Outcome::Built(obj, deferred) => {
                self.slots.insert(current, SlotState::Ready(obj));
                for (field, target) in deferred {
                    let target_tag = match self.records.get(&target) {
                        Some(record) => record.tag().clone(),
                        None => return Err(UnpackError::TargetNotFound { reference: target }),
                    };
                    self.patches.push(PatchEdge {
                        on: current,
                        field,
                        target,
                        target_tag,
                    });
                }
                self.on_ready(current, stack)
            }
            Outcome::Stalled { blocked_on } => {
                trace!("record {current} stalled on {blocked_on}");
                self.stalled.push(StalledRecord {
                    reference: current,
                    blocked_on,
                    tag,
                });
                Ok(())
            }
            Outcome::Fail(error) => Err(construct_failure(current, tag, error)),
        }
    }

    /// Reacts to a record becoming fully constructed: back-patches deferred
    /// edges pointing at it and wakes strategies that stalled on it.
    fn on_ready(&mut self, reference: RecordRef, stack: &mut Vec<RecordRef>) -> Result<(), UnpackError> {
        if self.patches.iter().any(|edge| edge.target == reference) {
            let (due, rest): (Vec<_>, Vec<_>) = core::mem::take(&mut self.patches)
                .into_iter()
                .partition(|edge| edge.target == reference);
            self.patches = rest;
            for edge in due {
                self.apply_patch(edge)?;
            }
        }
        if self.stalled.iter().any(|stall| stall.blocked_on == reference) {
            let (woken, rest): (Vec<_>, Vec<_>) = core::mem::take(&mut self.stalled)
                .into_iter()
                .partition(|stall| stall.blocked_on == reference);
            self.stalled = rest;
            for stall in woken {
                trace!("record {} unblocked by {reference}", stall.reference);
                stack.push(stall.reference);
            }
        }
        Ok(())
    }

    fn apply_patch(&mut self, edge: PatchEdge) -> Result<(), UnpackError> {
        let tag = match self.records.get(&edge.on) {
            Some(record) => record.tag().clone(),
            None => return Err(UnpackError::TargetNotFound { reference: edge.on }),
        };
        let Some(strategy) = self.factory.strategy(&tag) else {
            return Err(UnpackError::UnknownTypeTag {
                tag,
                reference: edge.on,
            });
        };
        let (on_obj, target_obj) = match (self.slots.get(&edge.on), self.slots.get(&edge.target)) {
            (Some(SlotState::Ready(on)), Some(SlotState::Ready(target))) => {
                (on.clone(), target.clone())
            }
            _ => {
                return Err(UnpackError::CyclicConstruction {
                    reference: edge.target,
                    tag: edge.target_tag,
                });
            }
        };
        trace!("patching field `{}` of {} with {}", edge.field, edge.on, edge.target);
        strategy
            .patch(&on_obj, &edge.field, target_obj)
            .map_err(|error| construct_failure(edge.on, tag, error))
    }

    fn take(&self, target: RecordRef) -> Result<Obj, UnpackError> {
        match self.slots.get(&target) {
            Some(SlotState::Ready(obj)) => Ok(obj.clone()),
            _ => Err(UnpackError::TargetNotFound { reference: target }),
        }
    }
}

// -----------------------------------------------------------------------------
// Entry points

/// Reconstructs the object graph rooted at the stream's first record.
///
/// The reader, factory, and hints are per-call capabilities: the same record
/// stream deserialized through two different factories yields two different
/// sets of concrete types, and nothing is resolved through process-wide
/// state. Any [`UnpackError`] aborts the whole session; no partially
/// reconstructed graph is ever returned.
///
/// # Examples
///
/// ```
/// use ps_io::{MemoryReader, MemoryWriter};
/// use ps_pack::{ConstructError, ObjectFactory, PackBuilder, PackError, Packable};
/// use ps_pack::{downcast, obj, pack_graph, unpack_graph};
/// use ps_record::{PropertySheet, TypeTag, Value};
///
/// struct Point { x: i64, y: i64 }
///
/// impl Packable for Point {
///     fn state_tag(&self) -> TypeTag { TypeTag::new("geo.point") }
///     fn pack(&self, rec: &mut PackBuilder<'_>) -> Result<(), PackError> {
///         rec.field("x", self.x)?;
///         rec.field("y", self.y)
///     }
/// }
///
/// let hints = PropertySheet::new();
/// let mut writer = MemoryWriter::new();
/// pack_graph(&obj(Point { x: 3, y: 4 }), &mut writer, &hints).unwrap();
/// let set = writer.finish().unwrap();
///
/// let mut factory = ObjectFactory::new();
/// factory.register_fn("geo.point", |state, _deps, _hints| {
///     let x = state.get("x").and_then(Value::as_int)
///         .ok_or_else(|| ConstructError::missing_field(state, "x"))?;
///     let y = state.get("y").and_then(Value::as_int)
///         .ok_or_else(|| ConstructError::missing_field(state, "y"))?;
///     Ok(obj(Point { x, y }))
/// });
///
/// let mut reader = MemoryReader::new(&set);
/// let root = unpack_graph(&mut reader, &factory, &hints).unwrap();
/// let point = downcast::<Point>(&root).unwrap();
/// assert_eq!((point.x, point.y), (3, 4));
/// ```
pub fn unpack_graph(
    reader: &mut dyn RecordReader,
    factory: &dyn ConstructObjects,
    hints: &PropertySheet,
) -> Result<Obj, UnpackError> {
    let mut session = DecodeSession::new(factory, hints, None);
    session.drain(reader)?;
    let Some(&target) = session.order.first() else {
        return Err(UnpackError::EmptyStream);
    };
    session.check_references()?;
    session.build(target)?;
    debug!("unpacked {} records; root {target}", session.order.len());
    session.take(target)
}

/// Reconstructs the object graph rooted at `target`, draining the stream.
///
/// Records outside the closure of `target` are read and validated but not
/// constructed.
pub fn unpack_ref(
    reader: &mut dyn RecordReader,
    factory: &dyn ConstructObjects,
    target: RecordRef,
    hints: &PropertySheet,
) -> Result<Obj, UnpackError> {
    let mut session = DecodeSession::new(factory, hints, None);
    session.drain(reader)?;
    session.check_references()?;
    session.build(target)?;
    session.take(target)
}

/// Reconstructs the object graph rooted at `target` over a random-access
/// reader, fetching only the records the closure actually needs.
///
/// Records outside the closure are never read, and therefore never
/// validated.
pub fn unpack_at(
    reader: &mut dyn RandomAccess,
    factory: &dyn ConstructObjects,
    target: RecordRef,
    hints: &PropertySheet,
) -> Result<Obj, UnpackError> {
    let mut session = DecodeSession::new(factory, hints, Some(reader));
    session.build(target)?;
    session.take(target)
}

/// Reconstructs a single object from a standalone [`Record`].
///
/// Runs as a one-record session: a self-reference resolves to the object
/// under construction, any other reference dangles.
pub fn unpack_object(
    record: &Record,
    factory: &dyn ConstructObjects,
    hints: &PropertySheet,
) -> Result<Obj, UnpackError> {
    let mut session = DecodeSession::new(factory, hints, None);
    session.admit(record.clone())?;
    session.check_references()?;
    session.build(record.reference())?;
    session.take(record.reference())
}

// -----------------------------------------------------------------------------
// Tests
